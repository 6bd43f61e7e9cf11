use crate::error::EngineError;

/// A single field value as read from (or written to) the database.
///
/// The engine only distinguishes the categories that matter for dump
/// encoding: NULL, unquoted numerics, and everything else as text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

pub type Row = Vec<Value>;

/// Result of a statement execution: any rows produced plus the affected
/// row count reported by the server.
#[derive(Debug, Default)]
pub struct ExecOutcome {
    pub rows: Vec<Row>,
    pub affected: u64,
}

/// Live database session, provided by the caller.
///
/// The engine never opens sockets itself; whatever backs this trait (a real
/// client, a subprocess shim, an in-memory fake) is the collaborator's
/// concern. `stream` exists so large tables are never buffered whole: the
/// callback sees one row at a time.
pub trait Connection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome, EngineError>;

    /// Run a row-producing statement, invoking `on_row` per row. Returns the
    /// number of rows seen.
    fn stream(
        &mut self,
        sql: &str,
        on_row: &mut dyn FnMut(Row) -> Result<(), EngineError>,
    ) -> Result<u64, EngineError>;

    fn commit(&mut self) -> Result<(), EngineError>;

    fn rollback(&mut self) -> Result<(), EngineError>;

    fn is_alive(&mut self) -> bool;
}

/// Opens sessions on demand. `database: None` yields a server-level session
/// (for `SHOW DATABASES`, `CREATE DATABASE`); `Some(name)` selects a schema.
pub trait Connector {
    fn connect(&self, database: Option<&str>) -> Result<Box<dyn Connection>, EngineError>;
}

/// Progress sink implemented by the calling layer (CLI spinner, UI bar).
/// `fraction` is clamped to 0..=1 by convention; the engine reports coarse
/// stage-level progress plus periodic in-stage updates.
pub trait ProgressReporter {
    fn report(&mut self, fraction: f64, message: &str);
}

/// Reporter that discards everything; used by tests and batch callers.
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&mut self, _fraction: f64, _message: &str) {}
}

impl Value {
    /// Lossy text rendering used by the CLI when printing result rows.
    pub fn display(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    /// Parse a raw text field the way the mysql batch protocol presents it:
    /// `NULL` marker, then integer, then float, else text.
    pub fn from_raw(raw: &str) -> Value {
        if raw == "NULL" {
            return Value::Null;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(raw.to_string())
    }
}
