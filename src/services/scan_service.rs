use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::changes::DirectoryChanges;
use crate::models::indexed_file::IndexedFile;
use crate::scope_path;
use crate::services::ignore_service::IgnoreMatcher;
use crate::services::index_service::IndexStore;

fn relative_key(root: &Path, path: &Path) -> String {
    scope_path::to_slash(path.strip_prefix(root).unwrap_or(path))
}

fn segment_count(relative: &str) -> usize {
    relative.split('/').filter(|s| !s.is_empty()).count()
}

/// Classifies every in-scope file under `directory` against the index.
///
/// `max_depth == 0` walks the whole tree. Ignored directories are not
/// descended. Indexed paths that were not seen on disk are reported deleted
/// only when they fall inside the same depth and ignore scope. Any walk or
/// stat failure aborts the scan.
pub fn scan_directory_changes(
    store: &dyn IndexStore,
    matcher: &IgnoreMatcher,
    directory: &Path,
    max_depth: usize,
) -> Result<DirectoryChanges, AppError> {
    let root = scope_path::absolutize(directory)?;
    if !root.is_dir() {
        return Err(AppError::General(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let root_key = root.to_string_lossy().to_string();
    let indexed: HashMap<String, IndexedFile> = store
        .list_under(&root_key)?
        .into_iter()
        .map(|f| (f.path.clone(), f))
        .collect();

    let mut walker = walkdir::WalkDir::new(&root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    if max_depth > 0 {
        walker = walker.max_depth(max_depth);
    }

    let mut changes = DirectoryChanges::default();
    let mut seen: HashSet<String> = HashSet::new();

    let entries = walker.into_iter().filter_entry(|entry| {
        let relative = relative_key(&root, entry.path());
        let skip = matcher.should_ignore(&relative, entry.file_type().is_dir());
        if skip {
            tracing::debug!("ignoring {relative}");
        }
        !skip
    });

    for entry in entries {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path().to_string_lossy().to_string();
        let live: DateTime<Utc> = entry.metadata()?.modified()?.into();
        match indexed.get(&path) {
            None => changes.new_files.push(path.clone()),
            Some(record) if record.last_modified != live => {
                changes.modified_files.push(path.clone())
            }
            Some(_) => changes.unchanged_files.push(path.clone()),
        }
        seen.insert(path);
    }

    let mut stale_paths: Vec<&String> = indexed.keys().filter(|p| !seen.contains(*p)).collect();
    stale_paths.sort();
    for path in stale_paths {
        let relative = relative_key(&root, &PathBuf::from(path));
        let depth = segment_count(&relative);
        if depth == 0 || (max_depth > 0 && depth > max_depth) {
            continue;
        }
        if matcher.is_excluded(&relative, false) {
            continue;
        }
        changes.deleted_files.push(path.clone());
    }

    tracing::info!(
        "scan of {}: {} new, {} modified, {} deleted, {} unchanged",
        root.display(),
        changes.new_files.len(),
        changes.modified_files.len(),
        changes.deleted_files.len(),
        changes.unchanged_files.len()
    );
    Ok(changes)
}
