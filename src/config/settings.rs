use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const AUTO_SUBDIR: &str = "automatic";
pub const MANUAL_SUBDIR: &str = "manual";

/// Connection coordinates handed to the native tools and the CLI driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAuth {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for ServerAuth {
    fn default() -> Self {
        // XAMPP defaults: root with no password on localhost.
        Self {
            host: "localhost".into(),
            port: 3306,
            user: "root".into(),
            password: None,
        }
    }
}

/// Explicit operation context passed into every engine call; there is no
/// ambient "current connection" state anywhere in the crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub auth: ServerAuth,
    pub backups_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auth: ServerAuth::default(),
            backups_dir: PathBuf::from("backups"),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| EngineError::Config(format!("invalid settings file: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn auto_dir(&self) -> PathBuf {
        self.backups_dir.join(AUTO_SUBDIR)
    }

    pub fn manual_dir(&self) -> PathBuf {
        self.backups_dir.join(MANUAL_SUBDIR)
    }

    /// Create the backups root and its automatic/manual subdirectories.
    pub fn ensure_layout(&self) -> Result<(), EngineError> {
        fs::create_dir_all(&self.backups_dir)?;
        fs::create_dir_all(self.auto_dir())?;
        fs::create_dir_all(self.manual_dir())?;
        Ok(())
    }
}
