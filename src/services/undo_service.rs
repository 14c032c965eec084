use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::operation::{ExecutionRequest, ExecutionResult, FileOperation};
use crate::services::execution_service::ExecutionEngine;

/// Everything needed to reverse one executed batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UndoPlan {
    pub batch_id: String,
    /// Inverse of every successful move, last applied first.
    pub operations: Vec<FileOperation>,
    /// Directories the batch created, in creation order.
    pub created_dirs: Vec<PathBuf>,
}

impl UndoPlan {
    pub fn from_results(result: &ExecutionResult) -> Self {
        let operations = result
            .operations
            .iter()
            .rev()
            .filter(|r| r.success)
            .map(|r| r.operation.inverse())
            .collect();
        let created_dirs = result
            .successful()
            .flat_map(|r| r.created_dirs.iter().cloned())
            .collect();

        Self {
            batch_id: result.batch_id.clone(),
            operations,
            created_dirs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Replays the inverse batch through `engine`, then removes the directories
/// the original batch created, longest path first. Directory removal is best
/// effort and adds to `cleaned_dirs`.
pub fn undo(
    engine: &mut ExecutionEngine<'_>,
    plan: &UndoPlan,
    base_path: &Path,
) -> Result<ExecutionResult, AppError> {
    if plan.is_empty() {
        return Err(AppError::General("nothing to undo".to_string()));
    }
    tracing::info!(
        "undoing batch {} ({} operations)",
        plan.batch_id,
        plan.operations.len()
    );

    let request = ExecutionRequest {
        operations: plan.operations.clone(),
        base_path: base_path.to_path_buf(),
        clean_empty: false,
    };
    let mut result = engine.execute(&request)?;

    let mut dirs = plan.created_dirs.clone();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.as_os_str().len()));
    dirs.dedup();
    for dir in dirs {
        match std::fs::remove_dir(&dir) {
            Ok(()) => {
                result.cleaned_dirs += 1;
                tracing::debug!("removed created directory: {}", dir.display());
            }
            Err(e) => tracing::debug!("kept directory {}: {e}", dir.display()),
        }
    }

    tracing::info!(
        "undo complete: {} restored, {} failed",
        result.success_count,
        result.fail_count
    );
    Ok(result)
}
