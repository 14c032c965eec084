use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::changes::DirectoryChanges;
use crate::models::indexed_file::{FileType, IndexedFile};
use crate::services::index_service::IndexStore;

/// Produces a description and type tag for one file. Errors mean "do not
/// index this file now" and never stop a batch.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, path: &Path) -> anyhow::Result<(String, FileType)>;
}

/// Analyzer that records files without reading them: empty description,
/// type from the extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionAnalyzer;

impl Analyzer for ExtensionAnalyzer {
    fn analyze(&self, path: &Path) -> anyhow::Result<(String, FileType)> {
        Ok((String::new(), FileType::from_path(path)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingSummary {
    pub indexed: usize,
    pub skipped: usize,
    pub removed: usize,
    /// One message per file the analyzer could not describe.
    pub failures: Vec<String>,
}

/// Analyzes every new or modified path, writes the results back, and drops
/// rows for deleted paths. `on_progress` receives `(current, total, path)`
/// for each analyzed file.
pub fn index_changes<F>(
    store: &mut dyn IndexStore,
    analyzer: &dyn Analyzer,
    changes: &DirectoryChanges,
    mut on_progress: F,
) -> Result<IndexingSummary, AppError>
where
    F: FnMut(usize, usize, &str),
{
    let mut summary = IndexingSummary::default();
    let total = changes.pending_count();

    for (i, path) in changes.pending().enumerate() {
        on_progress(i + 1, total, path);

        let (description, file_type) = match analyzer.analyze(Path::new(path)) {
            Ok(analysis) => analysis,
            Err(e) => {
                let err = AppError::from(e);
                tracing::warn!("skipping {path}: {err}");
                summary.failures.push(format!("{path}: {err}"));
                summary.skipped += 1;
                continue;
            }
        };

        match IndexedFile::from_disk(Path::new(path), &description, file_type) {
            Ok(record) => {
                store.upsert(&record)?;
                summary.indexed += 1;
                tracing::debug!("indexed {path}");
            }
            Err(e) => {
                tracing::warn!("could not stat {path}: {e}");
                summary.skipped += 1;
            }
        }
    }

    for path in &changes.deleted_files {
        summary.removed += store.remove(path)?;
    }

    tracing::info!(
        "indexing complete: {} indexed, {} skipped, {} removed",
        summary.indexed,
        summary.skipped,
        summary.removed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryIndexStore;
    use std::fs;

    struct FailingOn(&'static str);

    impl Analyzer for FailingOn {
        fn analyze(&self, path: &Path) -> anyhow::Result<(String, FileType)> {
            if path.ends_with(self.0) {
                anyhow::bail!("model refused {}", path.display());
            }
            Ok((format!("about {}", path.display()), FileType::Text))
        }
    }

    #[test]
    fn indexes_pending_and_removes_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();
        let a_key = a.to_string_lossy().to_string();
        let b_key = b.to_string_lossy().to_string();

        let mut store = MemoryIndexStore::new();
        let stale = IndexedFile::from_disk(&b, "old", FileType::Text).unwrap();
        let mut gone = stale.clone();
        gone.path = dir.path().join("gone.txt").to_string_lossy().to_string();
        store.upsert(&gone).unwrap();

        let changes = DirectoryChanges {
            new_files: vec![a_key.clone()],
            modified_files: vec![b_key.clone()],
            deleted_files: vec![gone.path.clone()],
            unchanged_files: Vec::new(),
        };

        let mut seen = Vec::new();
        let summary = index_changes(&mut store, &FailingOn("nothing"), &changes, |i, total, p| {
            seen.push((i, total, p.to_string()))
        })
        .unwrap();

        assert_eq!(
            summary,
            IndexingSummary { indexed: 2, skipped: 0, removed: 1, failures: Vec::new() }
        );
        assert_eq!(seen, vec![(1, 2, a_key.clone()), (2, 2, b_key.clone())]);
        assert!(store.get(&a_key).unwrap().unwrap().description.starts_with("about"));
        assert!(store.get(&gone.path).unwrap().is_none());
    }

    #[test]
    fn analyzer_failure_skips_only_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let ok = dir.path().join("ok.txt");
        let bad = dir.path().join("bad.bin");
        fs::write(&ok, "ok").unwrap();
        fs::write(&bad, "bad").unwrap();

        let changes = DirectoryChanges {
            new_files: vec![
                bad.to_string_lossy().to_string(),
                ok.to_string_lossy().to_string(),
            ],
            ..Default::default()
        };
        let mut store = MemoryIndexStore::new();
        let summary = index_changes(&mut store, &FailingOn("bad.bin"), &changes, |_, _, _| {}).unwrap();

        assert_eq!(summary.indexed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].contains("Analysis error: model refused"));
        assert!(!store.is_indexed(&bad.to_string_lossy()).unwrap());
    }

    #[test]
    fn extension_analyzer_uses_file_type() {
        let (description, file_type) = ExtensionAnalyzer.analyze(Path::new("/x/movie.mkv")).unwrap();
        assert!(description.is_empty());
        assert_eq!(file_type, FileType::Video);
    }
}
