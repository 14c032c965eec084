//! Streaming Operation Parser: turns a server-sent-event chat completion
//! stream into move operations as soon as each line of model output is
//! complete.
//!
//! Two buffers are kept. Raw transport bytes wait until a full envelope line
//! (`data: {...}`) has arrived, so chunk boundaries may split lines and UTF-8
//! sequences freely. Decoded delta text is appended to an accumulator that is
//! split on newlines; each complete line is parsed as one `{"from", "to"}`
//! object. Callbacks run synchronously on the thread that feeds the parser.

use std::collections::VecDeque;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::operation::FileOperation;
use crate::scope_path;

const DONE_MARKER: &str = "[DONE]";
const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeEvent {
    Content(String),
    Done,
    Skip,
}

/// Decodes one SSE line. Anything that is not a `data:` line carrying a
/// content delta is skipped.
pub fn decode_envelope_line(line: &str) -> EnvelopeEvent {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(payload) = line.strip_prefix("data:") else {
        return EnvelopeEvent::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_MARKER {
        return EnvelopeEvent::Done;
    }

    match serde_json::from_str::<StreamResponse>(payload) {
        Ok(response) => match response.choices.into_iter().next() {
            Some(choice) => match choice.delta.content {
                Some(content) if !content.is_empty() => EnvelopeEvent::Content(content),
                _ => EnvelopeEvent::Skip,
            },
            None => EnvelopeEvent::Skip,
        },
        Err(e) => {
            tracing::debug!("failed to decode stream chunk: {e}");
            EnvelopeEvent::Skip
        }
    }
}

fn strip_artifacts(line: &str) -> &str {
    let mut line = line.trim();
    line = line.strip_prefix("```json").unwrap_or(line);
    line = line.strip_prefix("```").unwrap_or(line);
    line = line.strip_suffix("```").unwrap_or(line);
    line = line.trim();
    line.strip_suffix(',').unwrap_or(line)
}

/// Joins `path` below `base` even when it carries a root or drive prefix.
fn anchor_at(base: &Path, path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    scope_path::clean(&base.join(relative))
}

/// Parses one line of model output into an operation anchored at `base`.
pub fn parse_operation_line(line: &str, base: &Path) -> Result<FileOperation, AppError> {
    let cleaned = strip_artifacts(line);
    if cleaned.is_empty() {
        return Err(AppError::Parse("empty operation line".to_string()));
    }

    let raw: FileOperation = serde_json::from_str(cleaned)
        .map_err(|e| AppError::Parse(format!("{e}: {cleaned}")))?;
    let from = anchor_at(base, &raw.from);
    let to = anchor_at(base, &raw.to);

    if from == to {
        return Err(AppError::IdenticalEndpoints(from.to_string_lossy().to_string()));
    }
    Ok(FileOperation::new(from, to))
}

/// Incremental parser state for one model response.
#[derive(Debug)]
pub struct OperationParser {
    base: PathBuf,
    envelope: Vec<u8>,
    accumulator: String,
    done: bool,
}

impl OperationParser {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            envelope: Vec::new(),
            accumulator: String::new(),
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds raw transport bytes and returns the operations they completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<FileOperation> {
        let mut operations = Vec::new();
        if self.done {
            return operations;
        }

        self.envelope.extend_from_slice(chunk);
        while let Some(pos) = self.envelope.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.envelope.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            match decode_envelope_line(&line) {
                EnvelopeEvent::Content(text) => operations.extend(self.push_content(&text)),
                EnvelopeEvent::Done => {
                    self.done = true;
                    self.envelope.clear();
                    break;
                }
                EnvelopeEvent::Skip => {}
            }
        }
        operations
    }

    /// Appends decoded model text and parses every complete line.
    pub fn push_content(&mut self, text: &str) -> Vec<FileOperation> {
        self.accumulator.push_str(text);
        let Some(last_newline) = self.accumulator.rfind('\n') else {
            return Vec::new();
        };

        let complete: String = self.accumulator.drain(..=last_newline).collect();
        complete
            .split('\n')
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// Ends the stream: a pending envelope line and any unterminated model
    /// line are parsed one last time.
    pub fn finish(&mut self) -> Vec<FileOperation> {
        let mut operations = Vec::new();
        if !self.done && !self.envelope.is_empty() {
            let line = String::from_utf8_lossy(&self.envelope).to_string();
            if let EnvelopeEvent::Content(text) = decode_envelope_line(&line) {
                operations.extend(self.push_content(&text));
            }
        }
        self.envelope.clear();
        self.done = true;

        let remaining = std::mem::take(&mut self.accumulator);
        operations.extend(self.parse_line(&remaining));
        operations
    }

    fn parse_line(&self, line: &str) -> Option<FileOperation> {
        if strip_artifacts(line).is_empty() {
            return None;
        }
        match parse_operation_line(line, &self.base) {
            Ok(op) => {
                tracing::debug!("parsed operation: {op}");
                Some(op)
            }
            Err(AppError::IdenticalEndpoints(_)) => None,
            Err(e) => {
                tracing::warn!("skipping malformed operation line: {e}");
                None
            }
        }
    }
}

/// Lazy, single-pass sequence of operations read from `reader`.
pub struct OperationStream<R> {
    reader: R,
    parser: OperationParser,
    pending: VecDeque<FileOperation>,
    finished: bool,
    error: Option<std::io::Error>,
}

impl<R: Read> OperationStream<R> {
    pub fn new(reader: R, base: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            parser: OperationParser::new(base),
            pending: VecDeque::new(),
            finished: false,
            error: None,
        }
    }

    /// The read error that ended the stream early, if any.
    pub fn take_error(&mut self) -> Option<AppError> {
        self.error.take().map(AppError::from)
    }

    fn finalize(&mut self) {
        self.pending.extend(self.parser.finish());
        self.finished = true;
    }
}

impl<R: Read> Iterator for OperationStream<R> {
    type Item = FileOperation;

    fn next(&mut self) -> Option<FileOperation> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            if let Some(op) = self.pending.pop_front() {
                return Some(op);
            }
            if self.finished {
                return None;
            }
            if self.parser.is_done() {
                self.finalize();
                continue;
            }

            match self.reader.read(&mut buf) {
                Ok(0) => self.finalize(),
                Ok(n) => {
                    let ops = self.parser.push_chunk(&buf[..n]);
                    self.pending.extend(ops);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("stream reading error: {e}");
                    self.error = Some(e);
                    self.finalize();
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamSummary {
    pub operations: Vec<FileOperation>,
    /// Set when the source failed before the end-of-stream marker.
    pub interrupted: Option<String>,
}

/// Drains `reader`, handing every operation to `on_operation` as soon as it
/// is parsed. Operations delivered before a read failure are kept.
pub fn collect_operations<R, F>(reader: R, base: &Path, mut on_operation: F) -> StreamSummary
where
    R: Read,
    F: FnMut(&FileOperation),
{
    let mut stream = OperationStream::new(reader, base);
    let mut summary = StreamSummary::default();
    for op in stream.by_ref() {
        on_operation(&op);
        summary.operations.push(op);
    }
    summary.interrupted = stream.take_error().map(|e| e.to_string());

    tracing::info!("received {} operations from stream", summary.operations.len());
    summary
}
