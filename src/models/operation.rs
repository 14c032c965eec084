use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single proposed move. Both endpoints are absolute and lexically clean.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileOperation {
    pub from: PathBuf,
    pub to: PathBuf,
}

impl FileOperation {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn inverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from.display(), self.to.display())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation: FileOperation,
    pub success: bool,
    pub error: Option<String>,
    /// Directories created for this move, outermost first.
    pub created_dirs: Vec<PathBuf>,
    /// Original link target when the source was a symbolic link.
    pub symlink_target: Option<String>,
}

impl OperationResult {
    pub fn pending(operation: FileOperation) -> Self {
        Self {
            operation,
            success: false,
            error: None,
            created_dirs: Vec::new(),
            symlink_target: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub operations: Vec<FileOperation>,
    pub base_path: PathBuf,
    pub clean_empty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success_count: usize,
    pub fail_count: usize,
    pub initial_file_count: usize,
    pub final_file_count: usize,
    pub cleaned_dirs: usize,
    pub verification_paths: Vec<PathBuf>,
    pub operations: Vec<OperationResult>,
    pub verification_error: Option<String>,
    pub index_error: Option<String>,
}

impl ExecutionResult {
    pub fn new() -> Self {
        Self {
            batch_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            success_count: 0,
            fail_count: 0,
            initial_file_count: 0,
            final_file_count: 0,
            cleaned_dirs: 0,
            verification_paths: Vec::new(),
            operations: Vec::new(),
            verification_error: None,
            index_error: None,
        }
    }

    /// Counts were taken on both sides and disagree.
    pub fn verification_mismatch(&self) -> bool {
        self.verification_error.is_none() && self.initial_file_count != self.final_file_count
    }

    pub fn is_verified(&self) -> bool {
        self.verification_error.is_none() && self.initial_file_count == self.final_file_count
    }

    pub fn successful(&self) -> impl Iterator<Item = &OperationResult> {
        self.operations.iter().filter(|r| r.success)
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_swaps_endpoints() {
        let op = FileOperation::new("/base/a.txt", "/base/sub/a.txt");
        let inv = op.inverse();
        assert_eq!(inv.from, PathBuf::from("/base/sub/a.txt"));
        assert_eq!(inv.to, PathBuf::from("/base/a.txt"));
        assert_eq!(inv.inverse(), op);
    }

    #[test]
    fn verification_flags() {
        let mut result = ExecutionResult::new();
        result.initial_file_count = 3;
        result.final_file_count = 3;
        assert!(result.is_verified());
        assert!(!result.verification_mismatch());

        result.final_file_count = 2;
        assert!(result.verification_mismatch());

        result.verification_error = Some("post-execution count failed".into());
        assert!(!result.verification_mismatch());
        assert!(!result.is_verified());
    }

    #[test]
    fn operation_deserializes_from_model_shape() {
        let op: FileOperation = serde_json::from_str(r#"{"from":"a.txt","to":"b/a.txt"}"#).unwrap();
        assert_eq!(op.from, PathBuf::from("a.txt"));
        assert_eq!(op.to, PathBuf::from("b/a.txt"));
    }
}
