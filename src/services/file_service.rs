use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::operation::{FileOperation, OperationResult};
use crate::safety;
use crate::scope_path;
use crate::services::ignore_service::IgnoreMatcher;

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn relative_key(root: &Path, path: &Path) -> String {
    scope_path::to_slash(path.strip_prefix(root).unwrap_or(path))
}

/// Rejects an operation before anything on disk is touched. A dangling
/// symlink source still counts as present.
pub fn validate_operation(op: &FileOperation) -> Result<(), AppError> {
    if op.from == op.to {
        return Err(AppError::IdenticalEndpoints(op.from.to_string_lossy().to_string()));
    }
    safety::validate_operation(op)?;
    if !exists_no_follow(&op.from) {
        return Err(AppError::SourceMissing(op.from.to_string_lossy().to_string()));
    }
    if exists_no_follow(&op.to) {
        return Err(AppError::DestinationExists(op.to.to_string_lossy().to_string()));
    }
    Ok(())
}

/// Counts non-directory entries under `root`, skipping ignored files and
/// ignored subtrees. Symlinks count as files and are never followed.
pub fn count_files(root: &Path, matcher: &IgnoreMatcher) -> Result<usize, AppError> {
    let mut count = 0;
    let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !matcher.should_ignore(
                    &relative_key(root, entry.path()),
                    entry.file_type().is_dir(),
                )
        });

    for entry in walker {
        if !entry?.file_type().is_dir() {
            count += 1;
        }
    }
    Ok(count)
}

/// Removes every empty directory below `root`, deepest paths first so
/// nested empties collapse in one pass. `root` itself is kept, and ignored
/// subtrees are left alone.
pub fn clean_empty_directories(root: &Path, matcher: &IgnoreMatcher) -> Result<usize, AppError> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !matcher.should_ignore(&relative_key(root, entry.path()), entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }

    dirs.sort_by_key(|d| std::cmp::Reverse(d.as_os_str().len()));

    let mut removed = 0;
    for dir in dirs {
        if fs::remove_dir(&dir).is_ok() {
            removed += 1;
            tracing::debug!("removed empty directory: {}", dir.display());
        }
    }
    Ok(removed)
}

/// Ancestors of `dir` (inclusive) that do not exist yet, outermost first.
pub fn missing_ancestors(dir: &Path) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(path) = current {
        if path.as_os_str().is_empty() || path.exists() {
            break;
        }
        missing.push(path.to_path_buf());
        current = path.parent();
    }
    missing.reverse();
    missing
}

/// Link target to write at the new location. Absolute targets are kept;
/// relative ones are re-anchored at the destination's directory, falling
/// back to the absolute target when no relative form exists.
pub fn retarget_symlink(link_target: &Path, from: &Path, to: &Path) -> PathBuf {
    if link_target.is_absolute() {
        return link_target.to_path_buf();
    }
    let from_dir = from.parent().unwrap_or(Path::new(""));
    let absolute = scope_path::clean(&from_dir.join(link_target));
    let to_dir = to.parent().unwrap_or(Path::new(""));

    match scope_path::relative_to(to_dir, &absolute) {
        Some(relative) => relative,
        None => {
            tracing::debug!("converting symlink to absolute target: {}", absolute.display());
            absolute
        }
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    let resolved = link.parent().unwrap_or(Path::new("")).join(target);
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

fn move_symlink(op: &FileOperation, result: &mut OperationResult) -> Result<(), AppError> {
    let original = fs::read_link(&op.from)?;
    result.symlink_target = Some(original.to_string_lossy().to_string());

    let new_target = retarget_symlink(&original, &op.from, &op.to);
    fs::remove_file(&op.from)?;

    if let Err(e) = create_symlink(&new_target, &op.to) {
        return match create_symlink(&original, &op.from) {
            Ok(()) => Err(AppError::General(format!("failed to create new symlink: {e}"))),
            Err(restore) => Err(AppError::General(format!(
                "failed to create new symlink and restore original: {e} (restore error: {restore})"
            ))),
        };
    }

    if new_target != original {
        tracing::debug!(
            "moved symlink with adjusted target: {op} ({} -> {})",
            original.display(),
            new_target.display()
        );
    } else {
        tracing::debug!("moved symlink: {op} (target: {})", original.display());
    }
    Ok(())
}

fn apply(op: &FileOperation, result: &mut OperationResult) -> Result<(), AppError> {
    validate_operation(op)?;

    let dest_dir = op.to.parent().unwrap_or(Path::new(""));
    let created = missing_ancestors(dest_dir);
    if !dest_dir.as_os_str().is_empty() {
        fs::create_dir_all(dest_dir)
            .map_err(|e| AppError::General(format!("could not create directory: {e}")))?;
    }
    result.created_dirs = created;

    let metadata = fs::symlink_metadata(&op.from)?;
    if metadata.file_type().is_symlink() {
        return move_symlink(op, result);
    }

    fs::rename(&op.from, &op.to)?;
    tracing::debug!("moved: {op}");
    Ok(())
}

/// Performs one move. Failures are recorded on the result, never raised.
pub fn execute_operation(op: &FileOperation) -> OperationResult {
    let mut result = OperationResult::pending(op.clone());
    match apply(op, &mut result) {
        Ok(()) => result.success = true,
        Err(e) => {
            if e.is_validation() {
                tracing::debug!("skipping {op}: {e}");
            } else {
                tracing::warn!("failed to move {op}: {e}");
            }
            result.error = Some(e.to_string());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_creates_missing_dirs_outermost_first() {
        let base = tempfile::tempdir().unwrap();
        let src = base.path().join("a.txt");
        fs::write(&src, "content").unwrap();
        let dest = base.path().join("x").join("y").join("a.txt");

        let result = execute_operation(&FileOperation::new(&src, &dest));

        assert!(result.success, "{:?}", result.error);
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "content");
        assert_eq!(
            result.created_dirs,
            vec![base.path().join("x"), base.path().join("x").join("y")]
        );
    }

    #[test]
    fn test_execute_rejects_existing_destination() {
        let base = tempfile::tempdir().unwrap();
        let src = base.path().join("a.txt");
        let dest = base.path().join("b.txt");
        fs::write(&src, "a").unwrap();
        fs::write(&dest, "b").unwrap();

        let result = execute_operation(&FileOperation::new(&src, &dest));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("destination already exists"));
        assert_eq!(fs::read_to_string(&src).unwrap(), "a");
    }

    #[test]
    fn test_execute_missing_source() {
        let base = tempfile::tempdir().unwrap();
        let op = FileOperation::new(base.path().join("ghost.txt"), base.path().join("sub/ghost.txt"));
        let result = execute_operation(&op);
        assert!(!result.success);
        assert!(result.created_dirs.is_empty());
        assert!(!base.path().join("sub").exists());
    }

    #[test]
    fn test_rename_protected_path_rejected() {
        let result = execute_operation(&FileOperation::new("/bin/ls", "/tmp/ls_stolen"));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("protected"));
    }

    #[test]
    fn test_execute_moves_directories() {
        let base = tempfile::tempdir().unwrap();
        let src = base.path().join("photos");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("1.jpg"), "img").unwrap();
        let dest = base.path().join("media").join("photos");

        let result = execute_operation(&FileOperation::new(&src, &dest));
        assert!(result.success);
        assert!(dest.join("1.jpg").exists());
    }

    #[test]
    fn test_count_files_honours_ignore_rules() {
        let base = tempfile::tempdir().unwrap();
        fs::create_dir_all(base.path().join(".git").join("objects")).unwrap();
        fs::write(base.path().join(".git").join("objects").join("pack"), "p").unwrap();
        fs::create_dir(base.path().join("docs")).unwrap();
        fs::write(base.path().join("docs").join("a.md"), "a").unwrap();
        fs::write(base.path().join("b.txt"), "b").unwrap();
        fs::write(base.path().join(".DS_Store"), "x").unwrap();

        assert_eq!(count_files(base.path(), &IgnoreMatcher::empty()).unwrap(), 4);
        let matcher = IgnoreMatcher::new(".git/\n.DS_Store").unwrap();
        assert_eq!(count_files(base.path(), &matcher).unwrap(), 2);
    }

    #[test]
    fn test_count_files_missing_root_fails() {
        let base = tempfile::tempdir().unwrap();
        assert!(count_files(&base.path().join("nope"), &IgnoreMatcher::empty()).is_err());
    }

    #[test]
    fn test_clean_empty_directories_nested() {
        let base = tempfile::tempdir().unwrap();
        fs::create_dir_all(base.path().join("a").join("b").join("c")).unwrap();
        fs::create_dir_all(base.path().join("keep")).unwrap();
        fs::write(base.path().join("keep").join("f.txt"), "f").unwrap();
        fs::create_dir_all(base.path().join(".git").join("refs")).unwrap();

        let matcher = IgnoreMatcher::new(".git/").unwrap();
        let removed = clean_empty_directories(base.path(), &matcher).unwrap();

        assert_eq!(removed, 3);
        assert!(!base.path().join("a").exists());
        assert!(base.path().join("keep").exists());
        assert!(base.path().join(".git").join("refs").exists());
        assert!(base.path().exists());
    }

    #[test]
    fn test_retarget_relative_symlink() {
        let target = retarget_symlink(
            Path::new("../target.txt"),
            Path::new("/root/dir1/link"),
            Path::new("/root/dir2/nested/link"),
        );
        assert_eq!(target, PathBuf::from("../../target.txt"));

        let absolute = retarget_symlink(
            Path::new("/etc/hosts"),
            Path::new("/root/dir1/link"),
            Path::new("/root/dir2/link"),
        );
        assert_eq!(absolute, PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_retarget_falls_back_to_absolute() {
        let target = retarget_symlink(
            Path::new("target.txt"),
            Path::new("/root/dir1/link"),
            Path::new("relative/link"),
        );
        assert_eq!(target, PathBuf::from("/root/dir1/target.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_move_keeps_pointing_at_target() {
        let base = tempfile::tempdir().unwrap();
        fs::write(base.path().join("target.txt"), "payload").unwrap();
        fs::create_dir(base.path().join("dir1")).unwrap();
        let link = base.path().join("dir1").join("link");
        std::os::unix::fs::symlink("../target.txt", &link).unwrap();

        let dest = base.path().join("dir2").join("deeper").join("link");
        let result = execute_operation(&FileOperation::new(&link, &dest));

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.symlink_target.as_deref(), Some("../target.txt"));
        assert_eq!(fs::read_link(&dest).unwrap(), PathBuf::from("../../target.txt"));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
        assert!(fs::symlink_metadata(&link).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_movable() {
        let base = tempfile::tempdir().unwrap();
        let link = base.path().join("dangling");
        std::os::unix::fs::symlink("missing.txt", &link).unwrap();

        let dest = base.path().join("sub").join("dangling");
        let result = execute_operation(&FileOperation::new(&link, &dest));
        assert!(result.success, "{:?}", result.error);
        assert_eq!(fs::read_link(&dest).unwrap(), PathBuf::from("../missing.txt"));
    }
}
