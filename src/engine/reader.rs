use crate::conn::{Connection, Row, Value};
use crate::error::EngineError;
use crate::utils::ident;

/// Databases that belong to the server itself and are never backed up.
pub const SYSTEM_DATABASES: [&str; 4] =
    ["information_schema", "mysql", "performance_schema", "sys"];

/// Reads schema and row data from a live session.
///
/// Table enumeration failures are fatal to the operation; per-table schema
/// or row failures are surfaced as errors the orchestrator downgrades to
/// skip-and-warn.
pub struct SchemaReader<'a> {
    conn: &'a mut dyn Connection,
}

impl<'a> SchemaReader<'a> {
    pub fn new(conn: &'a mut dyn Connection) -> Self {
        Self { conn }
    }

    /// All user databases on the server, discovery order, system schemas
    /// filtered out.
    pub fn databases(&mut self) -> Result<Vec<String>, EngineError> {
        let outcome = self.conn.execute("SHOW DATABASES", &[])?;
        Ok(outcome
            .rows
            .into_iter()
            .filter_map(|row| first_text(row))
            .filter(|name| !SYSTEM_DATABASES.contains(&name.as_str()))
            .collect())
    }

    /// Tables of the selected database, discovery order.
    pub fn tables(&mut self) -> Result<Vec<String>, EngineError> {
        let outcome = self
            .conn
            .execute("SHOW TABLES", &[])
            .map_err(|e| EngineError::SchemaRead {
                table: "*".into(),
                reason: e.to_string(),
            })?;
        Ok(outcome.rows.into_iter().filter_map(first_text).collect())
    }

    /// Authoritative CREATE TABLE text, as reported by the server.
    pub fn table_schema(&mut self, table: &str) -> Result<String, EngineError> {
        let quoted = ident::quoted(table)?;
        let outcome = self
            .conn
            .execute(&format!("SHOW CREATE TABLE {quoted}"), &[])
            .map_err(|e| EngineError::SchemaRead {
                table: table.to_string(),
                reason: e.to_string(),
            })?;
        // SHOW CREATE TABLE yields [table, create_statement].
        outcome
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().nth(1))
            .and_then(|v| match v {
                Value::Text(s) => Some(s),
                _ => None,
            })
            .ok_or_else(|| EngineError::SchemaRead {
                table: table.to_string(),
                reason: "server returned no schema statement".into(),
            })
    }

    /// Column names of a table, in definition order.
    pub fn columns(&mut self, table: &str) -> Result<Vec<String>, EngineError> {
        let quoted = ident::quoted(table)?;
        let outcome = self
            .conn
            .execute(&format!("SHOW COLUMNS FROM {quoted}"), &[])
            .map_err(|e| EngineError::SchemaRead {
                table: table.to_string(),
                reason: e.to_string(),
            })?;
        let columns: Vec<String> = outcome.rows.into_iter().filter_map(first_text).collect();
        if columns.is_empty() {
            return Err(EngineError::SchemaRead {
                table: table.to_string(),
                reason: "table has no columns".into(),
            });
        }
        Ok(columns)
    }

    /// Stream every row of a table through `on_row` without buffering the
    /// table. Returns the row count.
    pub fn stream_rows(
        &mut self,
        table: &str,
        on_row: &mut dyn FnMut(Row) -> Result<(), EngineError>,
    ) -> Result<u64, EngineError> {
        let quoted = ident::quoted(table)?;
        self.conn
            .stream(&format!("SELECT * FROM {quoted}"), on_row)
            .map_err(|e| match e {
                err @ EngineError::Serialization(_) => err,
                other => EngineError::RowRead {
                    table: table.to_string(),
                    reason: other.to_string(),
                },
            })
    }
}

fn first_text(row: Row) -> Option<String> {
    row.into_iter().next().map(|v| match v {
        Value::Text(s) => s,
        other => other.display(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_databases_are_the_known_four() {
        assert!(SYSTEM_DATABASES.contains(&"mysql"));
        assert!(SYSTEM_DATABASES.contains(&"sys"));
        assert!(!SYSTEM_DATABASES.contains(&"shop"));
    }
}
