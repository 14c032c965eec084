use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::indexed_file::IndexedFile;
use crate::scope_path;
use crate::services::index_service::IndexStore;

/// Process-local index. A transaction keeps a copy of the rows taken at
/// `begin` and puts it back on `rollback`.
#[derive(Debug, Default)]
pub struct MemoryIndexStore {
    files: BTreeMap<String, IndexedFile>,
    backup: Option<BTreeMap<String, IndexedFile>>,
    failing_path: Option<String>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write that stores a row at `path` fail, for exercising
    /// rollback paths. Removals still succeed.
    pub fn fail_writes_to(&mut self, path: impl Into<String>) {
        self.failing_path = Some(path.into());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn check_writable(&self, path: &str) -> Result<(), AppError> {
        match &self.failing_path {
            Some(failing) if failing == path => {
                Err(AppError::General(format!("write rejected for {path}")))
            }
            _ => Ok(()),
        }
    }

    fn is_under(path: &str, directory: &str) -> bool {
        let exact = scope_path::clean(std::path::Path::new(directory))
            .to_string_lossy()
            .to_string();
        path == exact || path.starts_with(&scope_path::dir_prefix(directory))
    }
}

impl IndexStore for MemoryIndexStore {
    fn get(&self, path: &str) -> Result<Option<IndexedFile>, AppError> {
        Ok(self.files.get(path).cloned())
    }

    fn upsert(&mut self, file: &IndexedFile) -> Result<(), AppError> {
        self.check_writable(&file.path)?;
        let mut record = file.clone();
        if let Some(existing) = self.files.get(&file.path) {
            record.indexed_at = existing.indexed_at;
        }
        self.files.insert(record.path.clone(), record);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<usize, AppError> {
        Ok(usize::from(self.files.remove(path).is_some()))
    }

    fn list_under(&self, directory: &str) -> Result<Vec<IndexedFile>, AppError> {
        Ok(self
            .files
            .values()
            .filter(|f| Self::is_under(&f.path, directory))
            .cloned()
            .collect())
    }

    fn all_paths(&self) -> Result<Vec<String>, AppError> {
        Ok(self.files.keys().cloned().collect())
    }

    fn remove_under(&mut self, directory: &str) -> Result<usize, AppError> {
        let doomed: Vec<String> = self
            .files
            .keys()
            .filter(|p| Self::is_under(p, directory))
            .cloned()
            .collect();
        for path in &doomed {
            self.files.remove(path);
        }
        Ok(doomed.len())
    }

    fn rewrite_path(
        &mut self,
        old_path: &str,
        new_path: &str,
        size: u64,
        last_modified: DateTime<Utc>,
        symlink_target: Option<&str>,
    ) -> Result<usize, AppError> {
        self.check_writable(new_path)?;
        let Some(mut record) = self.files.remove(old_path) else {
            return Ok(0);
        };
        record.path = new_path.to_string();
        record.size = size;
        record.last_modified = last_modified;
        record.updated_at = Utc::now();
        record.symlink_target = symlink_target.map(str::to_string);
        self.files.insert(new_path.to_string(), record);
        Ok(1)
    }

    fn begin(&mut self) -> Result<(), AppError> {
        if self.backup.is_some() {
            return Err(AppError::Transaction(
                "transaction already in progress".to_string(),
            ));
        }
        self.backup = Some(self.files.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), AppError> {
        self.backup
            .take()
            .map(|_| ())
            .ok_or_else(|| AppError::Transaction("no transaction in progress".to_string()))
    }

    fn rollback(&mut self) -> Result<(), AppError> {
        let backup = self
            .backup
            .take()
            .ok_or_else(|| AppError::Transaction("no transaction in progress".to_string()))?;
        self.files = backup;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.backup.is_some()
    }
}
