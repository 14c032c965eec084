//! Pre-suggestion pipeline: everything that happens to a directory before the
//! model is asked for moves.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::changes::DirectoryChanges;
use crate::scope_path;
use crate::services::analysis_service::{self, Analyzer, IndexingSummary};
use crate::services::ignore_service::IgnoreMatcher;
use crate::services::index_service::IndexStore;
use crate::services::{scan_service, structure_service};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeRequest {
    pub directory: PathBuf,
    pub instructions: String,
    #[serde(default)]
    pub max_depth: usize,
    #[serde(default)]
    pub deep_analysis: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreparedOrganize {
    pub directory: PathBuf,
    pub instructions: String,
    /// Listing handed to the model, with descriptions when deep analysis ran.
    pub structure: String,
    pub changes: Option<DirectoryChanges>,
    pub indexing: Option<IndexingSummary>,
    pub orphans_removed: usize,
}

impl PreparedOrganize {
    pub fn user_prompt(&self) -> String {
        format!(
            "Base directory: {}\n\nDirectory structure:\n{}\n\nUser instructions: {}",
            self.directory.display(),
            self.structure,
            self.instructions
        )
    }
}

pub fn validate_request(request: &OrganizeRequest) -> Result<(), AppError> {
    if request.directory.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(AppError::General("directory path cannot be empty".to_string()));
    }
    if !request.directory.is_dir() {
        return Err(AppError::General(format!(
            "not a directory: {}",
            request.directory.display()
        )));
    }
    if request.instructions.trim().is_empty() {
        return Err(AppError::General(
            "organization instructions cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Index maintenance failures are logged and the listing falls back to the
/// plain form; only an invalid request or an unreadable tree is an error.
pub fn prepare(
    store: &mut dyn IndexStore,
    analyzer: &dyn Analyzer,
    matcher: &IgnoreMatcher,
    request: &OrganizeRequest,
) -> Result<PreparedOrganize, AppError> {
    validate_request(request)?;
    let absolute = scope_path::absolutize(&request.directory)?;
    let directory = absolute.as_path();
    let mut prepared = PreparedOrganize {
        directory: directory.to_path_buf(),
        instructions: request.instructions.clone(),
        ..Default::default()
    };

    if request.deep_analysis {
        refresh_index(store, analyzer, matcher, directory, request.max_depth, &mut prepared);
    }

    tracing::info!(
        "scanning directory: {} (depth: {})",
        directory.display(),
        request.max_depth
    );
    let structure = structure_service::describe_tree(directory, request.max_depth, matcher)?;

    prepared.structure = if request.deep_analysis {
        match structure_service::enrich_with_descriptions(directory, &structure, store) {
            Ok(enriched) => enriched,
            Err(e) => {
                tracing::error!("failed to enrich structure with descriptions: {e}");
                structure
            }
        }
    } else {
        structure
    };
    Ok(prepared)
}

fn refresh_index(
    store: &mut dyn IndexStore,
    analyzer: &dyn Analyzer,
    matcher: &IgnoreMatcher,
    directory: &Path,
    max_depth: usize,
    prepared: &mut PreparedOrganize,
) {
    match store.remove_orphaned(&directory.to_string_lossy()) {
        Ok(removed) => prepared.orphans_removed = removed,
        Err(e) => tracing::error!("failed to remove orphaned entries: {e}"),
    }

    let changes = match scan_service::scan_directory_changes(store, matcher, directory, max_depth) {
        Ok(changes) => changes,
        Err(e) => {
            tracing::error!("failed to scan directory changes: {e}");
            return;
        }
    };

    if changes.pending_count() > 0 || !changes.deleted_files.is_empty() {
        tracing::info!("found {} files to index", changes.pending_count());
        let progress = |current: usize, total: usize, path: &str| {
            tracing::debug!("indexing file {current}/{total}: {path}");
        };
        match analysis_service::index_changes(store, analyzer, &changes, progress) {
            Ok(summary) => prepared.indexing = Some(summary),
            Err(e) => tracing::error!("failed to index directory: {e}"),
        }
    } else {
        tracing::info!("no files need indexing, using existing index");
    }
    prepared.changes = Some(changes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryIndexStore;
    use crate::models::indexed_file::{FileType, IndexedFile};
    use std::fs;

    struct Describer;

    impl Analyzer for Describer {
        fn analyze(&self, path: &Path) -> anyhow::Result<(String, FileType)> {
            let name = path.file_name().map(|n| n.to_string_lossy().to_string());
            Ok((format!("file named {}", name.unwrap_or_default()), FileType::from_path(path)))
        }
    }

    fn request(dir: &Path, deep: bool) -> OrganizeRequest {
        OrganizeRequest {
            directory: dir.to_path_buf(),
            instructions: "group by type".to_string(),
            max_depth: 0,
            deep_analysis: deep,
        }
    }

    #[test]
    fn deep_analysis_indexes_and_enriches() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules").join("x.js"), "x").unwrap();

        let mut store = MemoryIndexStore::new();
        let ghost = dir.path().join("ghost.txt");
        fs::write(&ghost, "g").unwrap();
        store
            .upsert(&IndexedFile::from_disk(&ghost, "", FileType::Text).unwrap())
            .unwrap();
        fs::remove_file(&ghost).unwrap();

        let matcher = IgnoreMatcher::new("node_modules/").unwrap();
        let prepared = prepare(&mut store, &Describer, &matcher, &request(dir.path(), true)).unwrap();

        assert_eq!(prepared.orphans_removed, 1);
        assert_eq!(prepared.indexing.as_ref().unwrap().indexed, 1);
        assert_eq!(prepared.structure, "a.txt [file named a.txt] (1 bytes)\nnode_modules/\n");
        assert!(prepared.user_prompt().contains("User instructions: group by type"));
        assert_eq!(store.len(), 1);

        let again = prepare(&mut store, &Describer, &matcher, &request(dir.path(), true)).unwrap();
        assert!(again.indexing.is_none());
        assert_eq!(again.changes.unwrap().unchanged_files.len(), 1);
    }

    #[test]
    fn relative_directory_matches_absolute_index_keys() {
        let dir = tempfile::tempdir_in(".").unwrap();
        let absolute = scope_path::absolutize(dir.path()).unwrap();
        let relative = PathBuf::from(dir.path().file_name().unwrap());
        fs::write(absolute.join("a.txt"), "a").unwrap();

        let ghost = absolute.join("ghost.txt");
        fs::write(&ghost, "g").unwrap();
        let mut store = MemoryIndexStore::new();
        let kept = IndexedFile::from_disk(&absolute.join("a.txt"), "kept", FileType::Text).unwrap();
        store.upsert(&kept).unwrap();
        store
            .upsert(&IndexedFile::from_disk(&ghost, "", FileType::Text).unwrap())
            .unwrap();
        fs::remove_file(&ghost).unwrap();

        let prepared = prepare(&mut store, &Describer, &IgnoreMatcher::empty(), &request(&relative, true)).unwrap();
        assert_eq!(prepared.directory, absolute);
        assert_eq!(prepared.orphans_removed, 1);
        assert!(prepared.indexing.is_none());
        assert_eq!(prepared.structure, "a.txt [kept] (1 bytes)\n");
    }

    #[test]
    fn plain_listing_without_deep_analysis() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let mut store = MemoryIndexStore::new();
        let prepared =
            prepare(&mut store, &Describer, &IgnoreMatcher::empty(), &request(dir.path(), false)).unwrap();
        assert_eq!(prepared.structure, "a.txt (1 bytes)\n");
        assert!(prepared.changes.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn rejects_invalid_requests() {
        let dir = tempfile::tempdir().unwrap();
        let mut blank = request(dir.path(), false);
        blank.instructions = "   ".to_string();
        assert!(validate_request(&blank).is_err());

        let missing = request(&dir.path().join("missing"), false);
        assert!(validate_request(&missing).is_err());

        let empty = request(Path::new(""), false);
        assert!(validate_request(&empty).unwrap_err().to_string().contains("empty"));
    }
}
