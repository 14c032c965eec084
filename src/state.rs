use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::config::CoreConfig;
use crate::error::AppError;
use crate::services::ignore_service::IgnoreMatcher;
use crate::services::index_service::SqliteIndexStore;

pub struct AppContext {
    config: RwLock<CoreConfig>,
    store: Arc<Mutex<SqliteIndexStore>>,
    matcher: RwLock<Arc<IgnoreMatcher>>,
}

impl AppContext {
    pub fn open(config: CoreConfig) -> Result<Self, AppError> {
        let store = SqliteIndexStore::open(&config.database_path)?;
        tracing::info!("index database: {}", config.database_path.display());
        Self::with_store(config, store)
    }

    pub fn in_memory(config: CoreConfig) -> Result<Self, AppError> {
        Self::with_store(config, SqliteIndexStore::open_in_memory()?)
    }

    fn with_store(config: CoreConfig, store: SqliteIndexStore) -> Result<Self, AppError> {
        let matcher = IgnoreMatcher::new(&config.ignore_patterns)?;
        Ok(Self {
            config: RwLock::new(config),
            store: Arc::new(Mutex::new(store)),
            matcher: RwLock::new(Arc::new(matcher)),
        })
    }

    pub fn config(&self) -> CoreConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn store(&self) -> MutexGuard<'_, SqliteIndexStore> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn matcher(&self) -> Arc<IgnoreMatcher> {
        self.matcher
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Recompiles the matcher. Invalid text leaves the previous rules active.
    pub fn set_ignore_patterns(&self, pattern_text: &str) -> Result<(), AppError> {
        let matcher = Arc::new(IgnoreMatcher::new(pattern_text)?);
        *self
            .matcher
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = matcher;
        self.config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .ignore_patterns = pattern_text.to_string();
        tracing::info!("ignore patterns updated");
        Ok(())
    }
}
