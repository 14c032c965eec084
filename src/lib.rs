pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod models;
pub mod safety;
pub mod scope_path;
pub mod services;
pub mod state;

pub use config::CoreConfig;
pub use error::AppError;
pub use models::changes::{DirectoryChanges, IndexSnapshot};
pub use models::indexed_file::{FileType, IndexedFile};
pub use models::operation::{ExecutionRequest, ExecutionResult, FileOperation, OperationResult};
pub use services::execution_service::ExecutionEngine;
pub use services::ignore_service::IgnoreMatcher;
pub use services::index_service::{IndexStore, SqliteIndexStore};
pub use services::stream_parser::{OperationParser, OperationStream};
pub use state::AppContext;

/// Installs logging from `config` and opens the index it points at.
pub fn bootstrap(config: CoreConfig) -> Result<AppContext, AppError> {
    logging::init_tracing(&config.log_filter);
    let ctx = AppContext::open(config)?;
    tracing::info!("vibesort core ready");
    Ok(ctx)
}
