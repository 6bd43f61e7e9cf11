use crate::conn::{Connection, ProgressReporter};
use crate::error::EngineError;
use crate::utils::ident;

/// Statements between progress reports; reporting every statement would
/// swamp the reporter on large dumps.
const REPORT_EVERY: usize = 10;

/// Error classes that are benign during a replay: re-creating something the
/// target already has is expected when restoring over a non-empty database.
const BENIGN_ERRORS: [&str; 1] = ["already exists"];

#[derive(Debug, Default)]
pub struct RestoreSummary {
    pub executed: usize,
    /// Statements that failed with a benign error and were not replayed.
    pub suppressed: usize,
    /// Dump-embedded CREATE DATABASE/USE statements skipped in favour of
    /// the caller's target; these are not errors.
    pub redirected: usize,
    pub warnings: Vec<String>,
}

/// Replays a dump document into a target database.
///
/// The target is created if absent and used regardless of the database name
/// embedded in the dump text. Statement failures never abort the replay:
/// benign ones are suppressed, the rest become warnings. A single commit at
/// the end means a failed run can leave a partially loaded target; rolling
/// that back automatically is out of scope.
pub struct RestoreExecutor<'a> {
    conn: &'a mut dyn Connection,
}

impl<'a> RestoreExecutor<'a> {
    pub fn new(conn: &'a mut dyn Connection) -> Self {
        Self { conn }
    }

    pub fn run(
        &mut self,
        dump_text: &str,
        target: &str,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<RestoreSummary, EngineError> {
        let quoted_target = ident::quoted(target)?;
        self.conn
            .execute(&format!("CREATE DATABASE IF NOT EXISTS {quoted_target}"), &[])
            .map_err(|e| EngineError::Connection(format!("cannot create target: {e}")))?;
        self.conn
            .execute(&format!("USE {quoted_target}"), &[])
            .map_err(|e| EngineError::Connection(format!("cannot select target: {e}")))?;

        let statements = split_statements(dump_text);
        let total = statements.len().max(1);
        let mut summary = RestoreSummary::default();

        for (i, statement) in statements.iter().enumerate() {
            if redirects_database(statement) {
                // The dump carries its own CREATE DATABASE/USE for the
                // source name; the executor already selected the target.
                summary.redirected += 1;
            } else {
                match self.conn.execute(statement, &[]) {
                    Ok(_) => summary.executed += 1,
                    Err(err) if is_benign(&err.to_string()) => summary.suppressed += 1,
                    Err(err) => summary
                        .warnings
                        .push(format!("statement {}: {err}", i + 1)),
                }
            }

            if i % REPORT_EVERY == 0 {
                reporter.report(
                    (i + 1) as f64 / total as f64,
                    &format!("Executing statement {}/{}", i + 1, total),
                );
            }
        }

        reporter.report(1.0, "Committing restore");
        self.conn.commit()?;
        Ok(summary)
    }
}

/// Naive top-level split on `;`.
///
/// Known limitation carried over from the source design: semicolons inside
/// string literals or comments mis-split the document. A real tokenizer is
/// the recommended fix; the dump serializer never emits such values today
/// because escaping keeps literals on one statement, but foreign dumps may
/// trip this.
pub fn split_statements(text: &str) -> Vec<String> {
    text.split(';')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .filter(|chunk| !comment_only(chunk))
        .map(str::to_string)
        .collect()
}

fn comment_only(chunk: &str) -> bool {
    chunk
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

fn redirects_database(statement: &str) -> bool {
    let head = statement
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("--"))
        .unwrap_or("");
    let upper = head.to_uppercase();
    upper.starts_with("CREATE DATABASE") || upper.starts_with("USE ") || upper == "USE"
}

fn is_benign(error_text: &str) -> bool {
    let lower = error_text.to_lowercase();
    BENIGN_ERRORS.iter().any(|pattern| lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_drops_empty_and_comment_chunks() {
        let doc = "-- header\nSET FOREIGN_KEY_CHECKS=0;\n\nCREATE TABLE `t` (`id` INT);\n-- trailer comment;\nSET FOREIGN_KEY_CHECKS=1;\n";
        let statements = split_statements(doc);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("SET FOREIGN_KEY_CHECKS=0"));
        assert!(statements[1].starts_with("CREATE TABLE"));
        assert_eq!(statements[2], "SET FOREIGN_KEY_CHECKS=1");
    }

    #[test]
    fn split_is_naive_about_literals() {
        // Documented parity behavior: a semicolon inside a string literal
        // splits the statement.
        let statements = split_statements("INSERT INTO `t` VALUES ('a;b');");
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn database_redirection_is_detected() {
        assert!(redirects_database("CREATE DATABASE IF NOT EXISTS `shop`"));
        assert!(redirects_database("USE `shop`"));
        assert!(redirects_database("-- comment\nUSE `shop`"));
        assert!(!redirects_database("CREATE TABLE `shop_items` (`id` INT)"));
        assert!(!redirects_database("INSERT INTO `users` VALUES (1)"));
    }

    #[test]
    fn benign_matching_is_case_insensitive() {
        assert!(is_benign("Table 'clients' Already Exists"));
        assert!(!is_benign("syntax error near VALUES"));
    }
}
