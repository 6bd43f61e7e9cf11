use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the backup/restore engine.
///
/// Fatality is decided by the orchestrator, not encoded here: connection,
/// serialization and compression errors abort an operation, while per-table
/// read errors and native-tool errors only skip a table or trigger the
/// fallback chain.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("failed to read schema of `{table}`: {reason}")]
    SchemaRead { table: String, reason: String },

    #[error("failed to read rows of `{table}`: {reason}")]
    RowRead { table: String, reason: String },

    #[error("dump serialization failed: {0}")]
    Serialization(String),

    #[error("compression failed for {path}: {reason}")]
    Compression { path: PathBuf, reason: String },

    #[error("native tool `{0}` not available")]
    NativeToolUnavailable(&'static str),

    #[error("native tool `{tool}` failed: {stderr}")]
    NativeToolExecution { tool: &'static str, stderr: String },

    #[error("could not parse restore input: {0}")]
    RestoreParse(String),

    #[error("restore statement failed: {0}")]
    RestoreStatement(String),

    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("another backup or restore operation is already running")]
    Busy,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structured outcome of a public engine operation.
///
/// Every entry point on the orchestrator converts internal errors into this
/// shape; callers never see a raw `EngineError` escape.
#[derive(Debug)]
pub struct OpReport {
    pub success: bool,
    /// Set when the operation completed but skipped one or more tables.
    pub partial: bool,
    pub message: String,
    /// Per-table / per-statement warnings accumulated along the way.
    pub details: Vec<String>,
    pub archive: Option<PathBuf>,
    pub size_mb: Option<f64>,
}

impl OpReport {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            partial: false,
            message: message.into(),
            details: Vec::new(),
            archive: None,
            size_mb: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            partial: false,
            message: message.into(),
            details: Vec::new(),
            archive: None,
            size_mb: None,
        }
    }
}
