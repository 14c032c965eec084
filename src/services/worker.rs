//! Blocking pipeline stages moved onto tokio's blocking pool.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::AppError;
use crate::models::changes::DirectoryChanges;
use crate::models::operation::{ExecutionRequest, ExecutionResult, FileOperation};
use crate::services::execution_service::ExecutionEngine;
use crate::services::scan_service;
use crate::services::stream_parser::{self, StreamSummary};
use crate::state::AppContext;

fn join_error(e: tokio::task::JoinError) -> AppError {
    AppError::General(format!("background task failed: {e}"))
}

pub async fn scan_in_background(
    ctx: Arc<AppContext>,
    directory: PathBuf,
    max_depth: usize,
) -> Result<DirectoryChanges, AppError> {
    tokio::task::spawn_blocking(move || {
        let matcher = ctx.matcher();
        let store = ctx.store();
        scan_service::scan_directory_changes(&*store, &matcher, &directory, max_depth)
    })
    .await
    .map_err(join_error)?
}

/// Executes against the context's index when deep analysis is enabled.
pub async fn execute_in_background(
    ctx: Arc<AppContext>,
    request: ExecutionRequest,
) -> Result<ExecutionResult, AppError> {
    tokio::task::spawn_blocking(move || {
        let matcher = ctx.matcher();
        if !ctx.config().deep_analysis {
            return ExecutionEngine::new(&matcher).execute(&request);
        }
        let mut store = ctx.store();
        let mut engine = ExecutionEngine::new(&matcher).with_index(&mut *store);
        engine.execute(&request)
    })
    .await
    .map_err(join_error)?
}

/// Parses a model response off-thread. Each operation is also forwarded to
/// `sink` as it arrives; a closed receiver does not stop parsing.
pub async fn parse_in_background<R>(
    reader: R,
    base: PathBuf,
    sink: Option<mpsc::UnboundedSender<FileOperation>>,
) -> Result<StreamSummary, AppError>
where
    R: Read + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        stream_parser::collect_operations(reader, &base, |op| {
            if let Some(tx) = &sink {
                let _ = tx.send(op.clone());
            }
        })
    })
    .await
    .map_err(join_error)
}
