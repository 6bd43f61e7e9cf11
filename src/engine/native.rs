use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::settings::ServerAuth;
use crate::error::EngineError;
use crate::utils::ident;

/// How long a bare-name `--version` probe may run before the tool is
/// declared absent. Keeps detection from stalling the caller.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// stderr fragments that indicate an authentication problem worth one
/// retry without the password flag (default XAMPP installs run root with
/// no password).
const AUTH_ERROR_PATTERNS: [&str; 2] = ["using password", "access denied"];

/// Candidate install locations for the MySQL client tools, covering the
/// common XAMPP/LAMPP layouts plus the stock system path.
fn candidate_paths(tool: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if cfg!(windows) {
        for drive in ["C:", "D:", "E:"] {
            paths.push(PathBuf::from(format!(
                "{drive}\\xampp\\mysql\\bin\\{tool}.exe"
            )));
        }
    } else {
        paths.push(PathBuf::from(format!("/opt/lampp/bin/{tool}")));
        paths.push(PathBuf::from(format!("/Applications/XAMPP/bin/{tool}")));
        paths.push(PathBuf::from(format!("/usr/bin/{tool}")));
        paths.push(PathBuf::from(format!("/usr/local/bin/{tool}")));
    }
    paths
}

/// Locates and drives the external `mysqldump`/`mysql` pair.
///
/// Every failure here is non-fatal by contract: the orchestrator falls back
/// to the internal engine, so a missing tool never surfaces to the user as
/// long as the internal path succeeds.
pub struct NativeToolAdapter {
    auth: ServerAuth,
    /// Extra locations to search first; tests use this to pin detection.
    extra_paths: Vec<PathBuf>,
    /// When false, the default install locations are not searched.
    search_defaults: bool,
    /// When false, the bare-name PATH probe is skipped entirely.
    probe_path: bool,
}

impl NativeToolAdapter {
    pub fn new(auth: ServerAuth) -> Self {
        Self {
            auth,
            extra_paths: Vec::new(),
            search_defaults: true,
            probe_path: true,
        }
    }

    /// An adapter that only looks at explicitly supplied locations; with
    /// none it can never find the tools. Tests use this to force the
    /// internal engine regardless of what the host has installed.
    pub fn disabled(auth: ServerAuth) -> Self {
        Self {
            auth,
            extra_paths: Vec::new(),
            search_defaults: false,
            probe_path: false,
        }
    }

    pub fn with_extra_path(mut self, path: PathBuf) -> Self {
        self.extra_paths.push(path);
        self
    }

    /// Resolve a tool to an invocable program, or report it unavailable.
    fn locate(&self, tool: &'static str) -> Result<PathBuf, EngineError> {
        for base in &self.extra_paths {
            let candidate = base.join(tool);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        if self.search_defaults {
            for candidate in candidate_paths(tool) {
                if candidate.exists() {
                    return Ok(candidate);
                }
            }
        }
        if self.probe_path && probe_version(Path::new(tool)) {
            return Ok(PathBuf::from(tool));
        }
        Err(EngineError::NativeToolUnavailable(tool))
    }

    /// True when both the dump and load tools can be invoked.
    pub fn detect(&self) -> bool {
        self.locate("mysqldump").is_ok() && self.locate("mysql").is_ok()
    }

    /// Dump `database` into `dest_path` via mysqldump.
    pub fn dump(&self, database: &str, dest_path: &Path) -> Result<(), EngineError> {
        ident::validate(database)?;
        let tool = self.locate("mysqldump")?;

        let run = |with_password: bool| -> Result<(i32, String), EngineError> {
            let out_file = File::create(dest_path)?;
            let mut cmd = Command::new(&tool);
            cmd.arg("-h")
                .arg(&self.auth.host)
                .arg("-u")
                .arg(&self.auth.user)
                .arg(format!("--port={}", self.auth.port));
            if with_password {
                if let Some(password) = &self.auth.password {
                    cmd.arg(format!("--password={password}"));
                }
            }
            cmd.arg("--skip-comments")
                .arg("--complete-insert")
                .arg("--single-transaction")
                .arg(database)
                .stdout(Stdio::from(out_file))
                .stderr(Stdio::piped());
            let output = cmd
                .output()
                .map_err(|e| EngineError::NativeToolExecution {
                    tool: "mysqldump",
                    stderr: e.to_string(),
                })?;
            Ok((
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        };

        let (code, stderr) = run(true)?;
        if code == 0 {
            return Ok(());
        }
        if is_auth_error(&stderr) {
            let (code, stderr) = run(false)?;
            if code == 0 {
                return Ok(());
            }
            return Err(EngineError::NativeToolExecution {
                tool: "mysqldump",
                stderr,
            });
        }
        Err(EngineError::NativeToolExecution {
            tool: "mysqldump",
            stderr,
        })
    }

    /// Load a dump file into `target` via the mysql client, creating the
    /// target database first.
    pub fn load(&self, sql_path: &Path, target: &str) -> Result<(), EngineError> {
        let quoted_target = ident::quoted(target)?;
        let tool = self.locate("mysql")?;

        let run = |with_password: bool, args: &[&str], stdin: Option<&Path>| -> Result<(i32, String), EngineError> {
            let mut cmd = Command::new(&tool);
            cmd.arg("-h")
                .arg(&self.auth.host)
                .arg("-u")
                .arg(&self.auth.user)
                .arg(format!("--port={}", self.auth.port));
            if with_password {
                if let Some(password) = &self.auth.password {
                    cmd.arg(format!("--password={password}"));
                }
            }
            cmd.args(args);
            match stdin {
                Some(path) => {
                    cmd.stdin(Stdio::from(File::open(path)?));
                }
                None => {
                    cmd.stdin(Stdio::null());
                }
            }
            cmd.stdout(Stdio::null()).stderr(Stdio::piped());
            let output = cmd
                .output()
                .map_err(|e| EngineError::NativeToolExecution {
                    tool: "mysql",
                    stderr: e.to_string(),
                })?;
            Ok((
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        };

        let create = format!("CREATE DATABASE IF NOT EXISTS {quoted_target}");
        let attempt = |with_password: bool| -> Result<(i32, String), EngineError> {
            let (code, stderr) = run(with_password, &["-e", create.as_str()], None)?;
            if code != 0 {
                return Ok((code, stderr));
            }
            run(with_password, &[target], Some(sql_path))
        };

        let (code, stderr) = attempt(true)?;
        if code == 0 {
            return Ok(());
        }
        if is_auth_error(&stderr) {
            let (code, stderr) = attempt(false)?;
            if code == 0 {
                return Ok(());
            }
            return Err(EngineError::NativeToolExecution {
                tool: "mysql",
                stderr,
            });
        }
        Err(EngineError::NativeToolExecution {
            tool: "mysql",
            stderr,
        })
    }
}

fn is_auth_error(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    AUTH_ERROR_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Try `<tool> --version` with a short timeout. Spawning can hang on some
/// PATH setups, so the child is polled and killed at the deadline.
fn probe_version(tool: &Path) -> bool {
    let child = Command::new(tool)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    let Ok(mut child) = child else {
        return false;
    };
    let deadline = Instant::now() + PROBE_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return status.success(),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return false;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(_) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> ServerAuth {
        ServerAuth {
            host: "localhost".into(),
            port: 3306,
            user: "root".into(),
            password: None,
        }
    }

    #[test]
    fn auth_error_patterns_match_mysql_messages() {
        assert!(is_auth_error(
            "ERROR 1045 (28000): Access denied for user 'root'@'localhost' (using password: YES)"
        ));
        assert!(is_auth_error("access denied for user"));
        assert!(!is_auth_error("Unknown database 'shop'"));
    }

    #[test]
    fn disabled_adapter_detects_nothing() {
        let adapter = NativeToolAdapter::disabled(auth());
        assert!(!adapter.detect());
        assert!(matches!(
            adapter.dump("shop", Path::new("/tmp/never.sql")),
            Err(EngineError::NativeToolUnavailable("mysqldump"))
        ));
    }

    #[test]
    fn candidate_lists_cover_both_tools() {
        assert!(!candidate_paths("mysqldump").is_empty());
        assert!(!candidate_paths("mysql").is_empty());
        for path in candidate_paths("mysqldump") {
            assert!(path.to_string_lossy().contains("mysqldump"));
        }
    }

    #[test]
    fn invalid_identifiers_never_reach_the_shell() {
        let adapter = NativeToolAdapter::disabled(auth());
        assert!(matches!(
            adapter.dump("shop; rm -rf /", Path::new("/tmp/never.sql")),
            Err(EngineError::InvalidIdentifier(_))
        ));
    }
}
