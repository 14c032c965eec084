//! Execution Engine: applies approved moves under a base directory, checks
//! file counts before and after, and keeps the index in step with what
//! actually moved.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::AppError;
use crate::models::changes::IndexSnapshot;
use crate::models::indexed_file::{FileType, IndexedFile};
use crate::models::operation::{ExecutionRequest, ExecutionResult, FileOperation};
use crate::scope_path;
use crate::services::file_service;
use crate::services::ignore_service::IgnoreMatcher;
use crate::services::index_service::IndexStore;

/// Directories whose file counts bound a batch: the base directory plus the
/// parent of every endpoint outside it, collapsed to their common ancestor
/// when there is more than one. Everything is made absolute first.
pub fn verification_scope(
    operations: &[FileOperation],
    base_path: &Path,
) -> Result<Vec<PathBuf>, AppError> {
    let base = scope_path::absolutize(base_path)?;
    let mut paths: BTreeSet<PathBuf> = BTreeSet::new();
    paths.insert(base.clone());

    for op in operations {
        for endpoint in [&op.from, &op.to] {
            let absolute = scope_path::absolutize(endpoint)?;
            let Some(parent) = absolute.parent() else {
                continue;
            };
            if !parent.starts_with(&base) && paths.insert(parent.to_path_buf()) {
                tracing::debug!("added external verification path: {}", parent.display());
            }
        }
    }

    let paths: Vec<PathBuf> = paths.into_iter().collect();
    if paths.len() > 1 {
        let ancestor = scope_path::common_ancestor(&paths).ok_or_else(|| {
            AppError::General("could not determine verification scope".to_string())
        })?;
        tracing::info!(
            "multi-path verification: using common ancestor {}",
            ancestor.display()
        );
        return Ok(vec![ancestor]);
    }
    Ok(paths)
}

pub struct ExecutionEngine<'a> {
    matcher: &'a IgnoreMatcher,
    index: Option<&'a mut dyn IndexStore>,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(matcher: &'a IgnoreMatcher) -> Self {
        Self {
            matcher,
            index: None,
        }
    }

    /// Keeps `store` in step with successful moves.
    pub fn with_index(mut self, store: &'a mut dyn IndexStore) -> Self {
        self.index = Some(store);
        self
    }

    fn count_scope(&self, scope: &[PathBuf]) -> Result<usize, String> {
        let mut total = 0;
        for path in scope {
            total += file_service::count_files(path, self.matcher)
                .map_err(|e| format!("{}: {e}", path.display()))?;
        }
        Ok(total)
    }

    /// Runs a batch. Per-operation failures land in the result; only a scope
    /// that cannot be determined or counted up front is returned as an error.
    pub fn execute(&mut self, request: &ExecutionRequest) -> Result<ExecutionResult, AppError> {
        tracing::info!("starting execution of {} operations", request.operations.len());
        let mut result = ExecutionResult::new();

        let base = scope_path::absolutize(&request.base_path)?;
        let scope = verification_scope(&request.operations, &base)?;
        result.initial_file_count = self
            .count_scope(&scope)
            .map_err(|e| AppError::General(format!("integrity check failed for {e}")))?;
        result.verification_paths = scope;

        let snapshot = match self.index.as_deref() {
            Some(store) => match store.create_snapshot(&request.operations) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::error!("failed to create index snapshot: {e}");
                    None
                }
            },
            None => None,
        };

        for op in &request.operations {
            let op_result = file_service::execute_operation(op);
            if op_result.success {
                result.success_count += 1;
            } else {
                result.fail_count += 1;
            }
            result.operations.push(op_result);
        }

        if request.clean_empty {
            match file_service::clean_empty_directories(&base, self.matcher) {
                Ok(cleaned) => result.cleaned_dirs = cleaned,
                Err(e) => tracing::error!("failed to clean empty directories: {e}"),
            }
        }

        match self.count_scope(&result.verification_paths) {
            Ok(count) => result.final_file_count = count,
            Err(e) => {
                result.verification_error = Some(format!("post-execution count failed for {e}"))
            }
        }

        if result.success_count > 0 {
            if let Some(store) = self.index.as_deref_mut() {
                let moved: Vec<FileOperation> =
                    result.successful().map(|r| r.operation.clone()).collect();
                if let Err(e) = sync_index(store, &moved, snapshot.as_ref()) {
                    result.index_error = Some(e.to_string());
                }
            }
        }

        if result.verification_mismatch() {
            tracing::warn!(
                "file count mismatch after execution: {} before, {} after",
                result.initial_file_count,
                result.final_file_count
            );
        }
        tracing::info!(
            "execution complete: {} successful, {} failed",
            result.success_count,
            result.fail_count
        );
        result.finished_at = Some(Utc::now());
        Ok(result)
    }
}

/// Applies `moved` to the index inside one transaction. On failure the
/// transaction is rolled back and, when available, the pre-batch snapshot is
/// replayed.
fn sync_index(
    store: &mut dyn IndexStore,
    moved: &[FileOperation],
    snapshot: Option<&IndexSnapshot>,
) -> Result<(), AppError> {
    store.begin()?;

    let applied = moved.iter().try_for_each(|op| update_index_for(store, op));
    match applied {
        Ok(()) => {
            store.commit()?;
            tracing::info!("index updated for {} moved paths", moved.len());
            Ok(())
        }
        Err(e) => {
            tracing::error!("failed to update index after execution: {e}");
            if let Err(rb) = store.rollback() {
                tracing::error!("failed to roll back index transaction: {rb}");
            }
            if let Some(snapshot) = snapshot {
                tracing::info!("restoring index from snapshot");
                if let Err(restore) = store.restore_snapshot(snapshot) {
                    tracing::error!("failed to restore index snapshot: {restore}");
                }
            }
            Err(AppError::Transaction(format!("index update failed: {e}")))
        }
    }
}

fn update_index_for(store: &mut dyn IndexStore, op: &FileOperation) -> Result<(), AppError> {
    let from = op.from.to_string_lossy().to_string();
    let to = op.to.to_string_lossy().to_string();
    let metadata = std::fs::symlink_metadata(&op.to)?;

    if metadata.is_dir() {
        for row in store.list_under(&from)? {
            let old = PathBuf::from(&row.path);
            let suffix = old.strip_prefix(&op.from).unwrap_or(Path::new(""));
            let new = op.to.join(suffix);
            store.update_path(&row.path, &new.to_string_lossy())?;
        }
        return Ok(());
    }

    if store.is_indexed(&from)? {
        store.update_path(&from, &to)
    } else {
        let record = IndexedFile::from_disk(&op.to, "", FileType::from_path(&op.to))?;
        store.upsert(&record)
    }
}
