use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::indexed_file::IndexedFile;

/// Result of one scan. Every in-scope path lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryChanges {
    pub new_files: Vec<String>,
    pub modified_files: Vec<String>,
    pub deleted_files: Vec<String>,
    pub unchanged_files: Vec<String>,
}

impl DirectoryChanges {
    /// Paths that need a fresh analysis.
    pub fn pending(&self) -> impl Iterator<Item = &String> {
        self.new_files.iter().chain(self.modified_files.iter())
    }

    pub fn pending_count(&self) -> usize {
        self.new_files.len() + self.modified_files.len()
    }

    pub fn total(&self) -> usize {
        self.new_files.len()
            + self.modified_files.len()
            + self.deleted_files.len()
            + self.unchanged_files.len()
    }
}

/// Prior state of specific index rows. `None` records that no row existed.
/// Ordered by path so replay is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub entries: BTreeMap<String, Option<IndexedFile>>,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn captured(&self, path: &str) -> Option<&Option<IndexedFile>> {
        self.entries.get(path)
    }
}
