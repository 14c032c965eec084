use std::path::Path;

use crate::error::AppError;
use crate::models::operation::FileOperation;
use crate::scope_path;

/// Operating-system roots no batch may move into or out of.
const SYSTEM_ROOTS: &[&str] = &[
    "/Applications",
    "/Library",
    "/System",
    "/bin",
    "/etc",
    "/sbin",
    "/usr",
    "C:/Program Files",
    "C:/Program Files (x86)",
    "C:/Windows",
];

/// Drive-letter roots compare case-insensitively, Unix roots exactly.
pub fn is_protected_path(path: &str) -> bool {
    let candidate = scope_path::normalize(path.trim());
    SYSTEM_ROOTS.iter().any(|root| {
        if has_drive_letter(root) {
            scope_path::is_within_scope(&candidate.to_ascii_lowercase(), &root.to_ascii_lowercase())
        } else {
            scope_path::is_within_scope(&candidate, root)
        }
    })
}

fn has_drive_letter(path: &str) -> bool {
    matches!(path.as_bytes(), [letter, b':', ..] if letter.is_ascii_alphabetic())
}

pub fn validate_not_protected(path: &Path) -> Result<(), AppError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(AppError::ProtectedPath("empty path".to_string()));
    }
    if is_protected_path(&text) {
        return Err(AppError::ProtectedPath(text.into_owned()));
    }
    Ok(())
}

/// Both endpoints of a move must stay clear of operating-system roots.
pub fn validate_operation(op: &FileOperation) -> Result<(), AppError> {
    validate_not_protected(&op.from)?;
    validate_not_protected(&op.to)
}
