use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};

use crate::config::settings::ServerAuth;
use crate::conn::{Connection, Connector, ExecOutcome, Row, Value};
use crate::error::EngineError;

/// `Connector` over the `mysql` command-line client in batch mode.
///
/// Each statement runs as its own client invocation, so there is no real
/// session: `USE` is tracked locally and replayed as the schema argument,
/// and commit/rollback are no-ops under the client's autocommit. Good
/// enough for the CLI; callers needing transactional restores should wire
/// a real client behind `Connection` instead.
pub struct MysqlShellConnector {
    auth: ServerAuth,
}

impl MysqlShellConnector {
    pub fn new(auth: ServerAuth) -> Self {
        Self { auth }
    }
}

impl Connector for MysqlShellConnector {
    fn connect(&self, database: Option<&str>) -> Result<Box<dyn Connection>, EngineError> {
        let mut conn = MysqlShellConnection {
            auth: self.auth.clone(),
            database: database.map(str::to_string),
        };
        if !conn.is_alive() {
            return Err(EngineError::Connection(format!(
                "cannot reach MySQL at {}:{}",
                self.auth.host, self.auth.port
            )));
        }
        Ok(Box::new(conn))
    }
}

pub struct MysqlShellConnection {
    auth: ServerAuth,
    database: Option<String>,
}

impl MysqlShellConnection {
    fn command(&self) -> Command {
        let mut cmd = Command::new("mysql");
        cmd.arg("-h")
            .arg(&self.auth.host)
            .arg("-u")
            .arg(&self.auth.user)
            .arg(format!("--port={}", self.auth.port))
            .arg("--batch")
            .arg("--skip-column-names");
        if let Some(password) = &self.auth.password {
            cmd.arg(format!("--password={password}"));
        }
        if let Some(db) = &self.database {
            cmd.arg(db);
        }
        cmd
    }

    fn run(&self, sql: &str) -> Result<std::process::Output, EngineError> {
        self.command()
            .arg("-e")
            .arg(sql)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| EngineError::Connection(format!("mysql client: {e}")))
    }
}

impl Connection for MysqlShellConnection {
    fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<ExecOutcome, EngineError> {
        // No session survives between invocations; emulate USE locally.
        if let Some(db) = parse_use(sql) {
            self.database = Some(db);
            return Ok(ExecOutcome::default());
        }

        let output = self.run(sql)?;
        if !output.status.success() {
            return Err(EngineError::RestoreStatement(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let rows = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(parse_batch_line)
            .collect();
        Ok(ExecOutcome { rows, affected: 0 })
    }

    fn stream(
        &mut self,
        sql: &str,
        on_row: &mut dyn FnMut(Row) -> Result<(), EngineError>,
    ) -> Result<u64, EngineError> {
        let mut child = self
            .command()
            .arg("-e")
            .arg(sql)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Connection(format!("mysql client: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Connection("mysql client produced no stdout".into()))?;
        let mut count = 0u64;
        for line in BufReader::new(stdout).lines() {
            let line = line.map_err(|e| EngineError::Connection(e.to_string()))?;
            on_row(parse_batch_line(&line))?;
            count += 1;
        }

        let status = child
            .wait()
            .map_err(|e| EngineError::Connection(e.to_string()))?;
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                use std::io::Read;
                let _ = err.read_to_string(&mut stderr);
            }
            return Err(EngineError::Connection(stderr.trim().to_string()));
        }
        Ok(count)
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        // Autocommit per invocation; nothing buffered to commit.
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.run("SELECT 1")
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

fn parse_use(sql: &str) -> Option<String> {
    let trimmed = sql.trim();
    let rest = trimmed
        .strip_prefix("USE ")
        .or_else(|| trimmed.strip_prefix("use "))?;
    Some(rest.trim().trim_matches('`').to_string())
}

/// One tab-separated batch-mode line into a row of typed values.
fn parse_batch_line(line: &str) -> Row {
    line.split('\t')
        .map(|field| Value::from_raw(&unescape_batch_field(field)))
        .collect()
}

/// The mysql client escapes tab, newline, NUL and backslash in batch output.
fn unescape_batch_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
