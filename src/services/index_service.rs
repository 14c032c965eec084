//! Index Store: persisted `IndexedFile` rows with single-flight transactions
//! and point-in-time snapshots.
//!
//! Backends implement the storage primitives of [`IndexStore`]; staleness,
//! path rewrites, snapshots and orphan handling are shared provided methods
//! built on those primitives.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::data::{migrations, repository};
use crate::error::AppError;
use crate::models::changes::IndexSnapshot;
use crate::models::indexed_file::{FileType, IndexedFile};
use crate::models::operation::FileOperation;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total: usize,
    pub by_type: BTreeMap<FileType, usize>,
}

pub trait IndexStore: Send {
    fn get(&self, path: &str) -> Result<Option<IndexedFile>, AppError>;
    fn upsert(&mut self, file: &IndexedFile) -> Result<(), AppError>;
    fn remove(&mut self, path: &str) -> Result<usize, AppError>;
    fn list_under(&self, directory: &str) -> Result<Vec<IndexedFile>, AppError>;
    fn all_paths(&self) -> Result<Vec<String>, AppError>;
    fn remove_under(&mut self, directory: &str) -> Result<usize, AppError>;
    fn rewrite_path(
        &mut self,
        old_path: &str,
        new_path: &str,
        size: u64,
        last_modified: DateTime<Utc>,
        symlink_target: Option<&str>,
    ) -> Result<usize, AppError>;

    /// Fails if a transaction is already open; there is no nesting.
    fn begin(&mut self) -> Result<(), AppError>;
    fn commit(&mut self) -> Result<(), AppError>;
    fn rollback(&mut self) -> Result<(), AppError>;
    fn in_transaction(&self) -> bool;

    fn is_indexed(&self, path: &str) -> Result<bool, AppError> {
        Ok(self.get(path)?.is_some())
    }

    /// True when the live mtime differs from the stored one.
    fn needs_reindex(&self, path: &str) -> Result<bool, AppError> {
        let stored = self
            .get(path)?
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;
        let live = DateTime::<Utc>::from(std::fs::symlink_metadata(path)?.modified()?);
        Ok(live != stored.last_modified)
    }

    /// Re-keys a row after a move, refreshing size, mtime and link target
    /// from the file now at `new_path`.
    fn update_path(&mut self, old_path: &str, new_path: &str) -> Result<(), AppError> {
        let metadata = std::fs::symlink_metadata(new_path)?;
        let symlink_target = if metadata.file_type().is_symlink() {
            Some(std::fs::read_link(new_path)?.to_string_lossy().to_string())
        } else {
            None
        };
        let updated = self.rewrite_path(
            old_path,
            new_path,
            metadata.len(),
            DateTime::<Utc>::from(metadata.modified()?),
            symlink_target.as_deref(),
        )?;
        if updated == 0 {
            return Err(AppError::NotFound(old_path.to_string()));
        }
        tracing::debug!("index path updated: {old_path} -> {new_path}");
        Ok(())
    }

    fn update_description(&mut self, path: &str, description: &str) -> Result<(), AppError> {
        let mut file = self
            .get(path)?
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;
        file.description = description.to_string();
        file.last_modified = DateTime::<Utc>::from(std::fs::symlink_metadata(path)?.modified()?);
        file.updated_at = Utc::now();
        self.upsert(&file)
    }

    /// Captures the current row (or its absence) for every endpoint in
    /// `operations`. A directory source also captures the rows beneath it
    /// and the keys they would move to.
    fn create_snapshot(&self, operations: &[FileOperation]) -> Result<IndexSnapshot, AppError> {
        let mut snapshot = IndexSnapshot::default();
        let mut capture = |store: &Self, key: String| -> Result<(), AppError> {
            if !snapshot.entries.contains_key(&key) {
                let current = store.get(&key)?;
                snapshot.entries.insert(key, current);
            }
            Ok(())
        };

        for op in operations {
            capture(self, op.from.to_string_lossy().to_string())?;
            capture(self, op.to.to_string_lossy().to_string())?;

            let is_dir = std::fs::symlink_metadata(&op.from).is_ok_and(|m| m.is_dir());
            if !is_dir {
                continue;
            }
            for row in self.list_under(&op.from.to_string_lossy())? {
                let moved = match Path::new(&row.path).strip_prefix(&op.from) {
                    Ok(suffix) => op.to.join(suffix),
                    Err(_) => continue,
                };
                capture(self, row.path)?;
                capture(self, moved.to_string_lossy().to_string())?;
            }
        }
        tracing::debug!("created index snapshot with {} entries", snapshot.len());
        Ok(snapshot)
    }

    /// Replays a snapshot inside its own transaction; all or nothing.
    fn restore_snapshot(&mut self, snapshot: &IndexSnapshot) -> Result<(), AppError> {
        self.begin()?;

        for (path, captured) in &snapshot.entries {
            let step = match captured {
                Some(file) => self.upsert(file),
                None => self.remove(path).map(|_| ()),
            };
            if let Err(e) = step {
                if let Err(rb) = self.rollback() {
                    tracing::error!("rollback after failed restore also failed: {rb}");
                }
                return Err(AppError::Transaction(format!(
                    "failed to restore {path}: {e}"
                )));
            }
        }

        self.commit()?;
        tracing::info!("restored index snapshot with {} entries", snapshot.len());
        Ok(())
    }

    /// Stored paths whose backing file is gone.
    fn validate_index(&self) -> Result<Vec<String>, AppError> {
        let orphaned: Vec<String> = self
            .all_paths()?
            .into_iter()
            .filter(|p| !exists_no_follow(Path::new(p)))
            .collect();
        tracing::debug!("found {} orphaned index entries", orphaned.len());
        Ok(orphaned)
    }

    fn remove_orphaned(&mut self, directory: &str) -> Result<usize, AppError> {
        let mut removed = 0;
        for file in self.list_under(directory)? {
            if exists_no_follow(Path::new(&file.path)) {
                continue;
            }
            match self.remove(&file.path) {
                Ok(_) => {
                    removed += 1;
                    tracing::debug!("removed orphaned entry: {}", file.path);
                }
                Err(e) => tracing::error!("failed to remove orphaned entry {}: {e}", file.path),
            }
        }
        tracing::info!("removed {removed} orphaned entries from {directory}");
        Ok(removed)
    }

    fn stats_under(&self, directory: &str) -> Result<IndexStats, AppError> {
        let mut stats = IndexStats::default();
        for file in self.list_under(directory)? {
            stats.total += 1;
            *stats.by_type.entry(file.file_type).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

/// Link-aware existence: a dangling symlink still exists.
pub fn exists_no_follow(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

pub struct SqliteIndexStore {
    conn: Connection,
    in_tx: bool,
}

impl SqliteIndexStore {
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrations::run_migrations(&conn)?;
        tracing::info!("index database initialized at {}", db_path.display());
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self { conn, in_tx: false }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

impl IndexStore for SqliteIndexStore {
    fn get(&self, path: &str) -> Result<Option<IndexedFile>, AppError> {
        repository::get_by_path(&self.conn, path)
    }

    fn upsert(&mut self, file: &IndexedFile) -> Result<(), AppError> {
        repository::upsert_file(&self.conn, file)
    }

    fn remove(&mut self, path: &str) -> Result<usize, AppError> {
        repository::delete_by_path(&self.conn, path)
    }

    fn list_under(&self, directory: &str) -> Result<Vec<IndexedFile>, AppError> {
        repository::list_under(&self.conn, directory)
    }

    fn all_paths(&self) -> Result<Vec<String>, AppError> {
        repository::all_paths(&self.conn)
    }

    fn remove_under(&mut self, directory: &str) -> Result<usize, AppError> {
        repository::delete_under(&self.conn, directory)
    }

    fn rewrite_path(
        &mut self,
        old_path: &str,
        new_path: &str,
        size: u64,
        last_modified: DateTime<Utc>,
        symlink_target: Option<&str>,
    ) -> Result<usize, AppError> {
        repository::rewrite_path(&self.conn, old_path, new_path, size, last_modified, symlink_target)
    }

    fn needs_reindex(&self, path: &str) -> Result<bool, AppError> {
        let stored = repository::get_last_modified(&self.conn, path)?
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;
        let live = DateTime::<Utc>::from(std::fs::symlink_metadata(path)?.modified()?);
        Ok(live != stored)
    }

    fn update_description(&mut self, path: &str, description: &str) -> Result<(), AppError> {
        let live = DateTime::<Utc>::from(std::fs::symlink_metadata(path)?.modified()?);
        if repository::update_description(&self.conn, path, description, live)? == 0 {
            return Err(AppError::NotFound(path.to_string()));
        }
        Ok(())
    }

    fn stats_under(&self, directory: &str) -> Result<IndexStats, AppError> {
        let mut stats = IndexStats::default();
        for (raw, count) in repository::count_by_type(&self.conn, directory)? {
            let file_type = raw.parse().unwrap_or(FileType::Other);
            stats.total += count;
            *stats.by_type.entry(file_type).or_insert(0) += count;
        }
        Ok(stats)
    }

    fn begin(&mut self) -> Result<(), AppError> {
        if self.in_tx {
            return Err(AppError::Transaction(
                "transaction already in progress".to_string(),
            ));
        }
        self.conn.execute_batch("BEGIN")?;
        self.in_tx = true;
        tracing::debug!("index transaction started");
        Ok(())
    }

    fn commit(&mut self) -> Result<(), AppError> {
        if !self.in_tx {
            return Err(AppError::Transaction("no transaction in progress".to_string()));
        }
        let result = self.conn.execute_batch("COMMIT");
        self.in_tx = !self.conn.is_autocommit();
        result.map_err(|e| AppError::Transaction(format!("failed to commit: {e}")))?;
        tracing::debug!("index transaction committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), AppError> {
        if !self.in_tx {
            return Err(AppError::Transaction("no transaction in progress".to_string()));
        }
        let result = self.conn.execute_batch("ROLLBACK");
        self.in_tx = !self.conn.is_autocommit();
        result.map_err(|e| AppError::Transaction(format!("failed to roll back: {e}")))?;
        tracing::debug!("index transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }
}
