use std::io::Write;

use chrono::Local;

use crate::catalog::TIMESTAMP_FORMAT;
use crate::conn::{Row, Value};
use crate::error::EngineError;
use crate::utils::ident;

/// Rows per INSERT statement. A batch boundary never splits a row, so a
/// table with N rows always yields ceil(N / 100) INSERT statements.
pub const BATCH_SIZE: usize = 100;

/// Streaming writer for the dump document format:
///
/// ```text
/// -- Backup of database: <db>
/// -- Generated: <timestamp>
/// SET FOREIGN_KEY_CHECKS=0;
///
/// CREATE DATABASE IF NOT EXISTS `<db>`;
/// USE `<db>`;
///
/// <per table: CREATE TABLE ...; then batched INSERTs>
/// SET FOREIGN_KEY_CHECKS=1;
/// ```
///
/// Table order is discovery order; reload correctness relies on the
/// FOREIGN_KEY_CHECKS toggle, not on dependency sorting. The value encoding
/// is deterministic: identical rows always produce byte-identical text.
pub struct DumpWriter<W: Write> {
    out: W,
    table: Option<OpenTable>,
}

struct OpenTable {
    insert_head: String,
    batch: Vec<String>,
    statements: u64,
}

impl<W: Write> DumpWriter<W> {
    pub fn begin(mut out: W, database: &str) -> Result<Self, EngineError> {
        let db = ident::quoted(database)?;
        writeln!(out, "-- Backup of database: {database}")
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        writeln!(
            out,
            "-- Generated: {}",
            Local::now().format(TIMESTAMP_FORMAT)
        )
        .map_err(|e| EngineError::Serialization(e.to_string()))?;
        writeln!(out, "SET FOREIGN_KEY_CHECKS=0;\n")
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        writeln!(out, "CREATE DATABASE IF NOT EXISTS {db};")
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        writeln!(out, "USE {db};\n").map_err(|e| EngineError::Serialization(e.to_string()))?;
        Ok(Self { out, table: None })
    }

    /// Write one table's schema statement and open it for row batches.
    pub fn begin_table(
        &mut self,
        table: &str,
        schema_sql: &str,
        columns: &[String],
    ) -> Result<(), EngineError> {
        self.finish_table()?;
        let quoted_table = ident::quoted(table)?;
        let quoted_cols = columns
            .iter()
            .map(|c| ident::quoted(c))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");

        writeln!(self.out, "--\n-- Schema for table {quoted_table}\n--")
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        writeln!(self.out, "{};\n", schema_sql.trim_end_matches(';').trim_end())
            .map_err(|e| EngineError::Serialization(e.to_string()))?;

        self.table = Some(OpenTable {
            insert_head: format!("INSERT INTO {quoted_table} ({quoted_cols}) VALUES"),
            batch: Vec::with_capacity(BATCH_SIZE),
            statements: 0,
        });
        Ok(())
    }

    /// Append one row to the open table, flushing a full batch as one
    /// INSERT statement.
    pub fn push_row(&mut self, row: &Row) -> Result<(), EngineError> {
        let tuple = encode_tuple(row);
        let table = self
            .table
            .as_mut()
            .ok_or_else(|| EngineError::Serialization("row written outside a table".into()))?;
        table.batch.push(tuple);
        if table.batch.len() == BATCH_SIZE {
            Self::flush_batch(&mut self.out, table)?;
        }
        Ok(())
    }

    /// Close the open table, flushing any partial batch. Returns the number
    /// of INSERT statements emitted for it.
    pub fn finish_table(&mut self) -> Result<u64, EngineError> {
        let Some(mut table) = self.table.take() else {
            return Ok(0);
        };
        if !table.batch.is_empty() {
            Self::flush_batch(&mut self.out, &mut table)?;
        }
        if table.statements > 0 {
            writeln!(self.out).map_err(|e| EngineError::Serialization(e.to_string()))?;
        }
        Ok(table.statements)
    }

    /// Write the trailer and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, EngineError> {
        self.finish_table()?;
        writeln!(self.out, "SET FOREIGN_KEY_CHECKS=1;")
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        self.out
            .flush()
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        Ok(self.out)
    }

    fn flush_batch(out: &mut W, table: &mut OpenTable) -> Result<(), EngineError> {
        writeln!(
            out,
            "{}\n{};",
            table.insert_head,
            table.batch.join(",\n")
        )
        .map_err(|e| EngineError::Serialization(e.to_string()))?;
        table.batch.clear();
        table.statements += 1;
        Ok(())
    }
}

/// Encode one row as a parenthesised value tuple.
pub fn encode_tuple(row: &Row) -> String {
    let fields: Vec<String> = row.iter().map(encode_value).collect();
    format!("({})", fields.join(", "))
}

/// Encode a single value per the dump format: NULL stays literal, numerics
/// pass through unquoted, everything else is escaped (backslash first, then
/// single quotes doubled) and single-quoted.
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => format!("'{}'", escape_text(s)),
    }
}

fn escape_text(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}
