use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const CATALOG_FILE: &str = "backup_log.csv";

/// Timestamp format shared by catalog rows and archive file names.
/// Lexicographic order equals chronological order, which `list` relies on.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Manual,
    Automatic,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Manual => "manual",
            BackupKind::Automatic => "automatic",
        }
    }
}

/// One completed backup. Immutable once appended; the engine never deletes
/// records, so a record can go stale if its archive is removed by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub timestamp: String,
    pub database: String,
    pub filename: String,
    pub kind: BackupKind,
    pub size_mb: f64,
}

impl BackupRecord {
    pub fn new(database: &str, filename: &str, kind: BackupKind, size_mb: f64) -> Self {
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            database: database.to_string(),
            filename: filename.to_string(),
            kind,
            size_mb,
        }
    }
}

/// Append-only metadata log of completed backups, backed by a flat CSV file
/// with a header row.
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    pub fn new(backups_root: &Path) -> Self {
        Self {
            path: backups_root.join(CATALOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole log, add one row, write the whole log back.
    ///
    /// Not safe under concurrent writers: two simultaneous appends can lose
    /// a record. The orchestrator's busy gate keeps the single-process case
    /// serialized; cross-process races are a documented limitation.
    pub fn append(&self, record: BackupRecord) -> Result<(), EngineError> {
        let mut records = self.read_all()?;
        records.push(record);
        self.write_all(&records)
    }

    /// All records, newest first. Sorting happens at read time; the file
    /// itself stays in append order.
    pub fn list(&self) -> Result<Vec<BackupRecord>, EngineError> {
        let mut records = self.read_all()?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    fn read_all(&self) -> Result<Vec<BackupRecord>, EngineError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| EngineError::Catalog(format!("unreadable: {e}")))?;
        let mut records = Vec::new();
        for row in reader.deserialize::<BackupRecord>() {
            match row {
                Ok(r) => records.push(r),
                // A mangled row should not make the whole history
                // unreadable; skip it.
                Err(_) => continue,
            }
        }
        Ok(records)
    }

    fn write_all(&self, records: &[BackupRecord]) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&self.path)
            .map_err(|e| EngineError::Catalog(format!("unwritable: {e}")))?;
        for record in records {
            writer
                .serialize(record)
                .map_err(|e| EngineError::Catalog(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| EngineError::Catalog(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_accumulates_records() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path());

        for i in 0..3 {
            catalog
                .append(BackupRecord {
                    timestamp: format!("2026-08-0{} 10:00:00", i + 1),
                    database: "shop".into(),
                    filename: format!("shop_{i}.zip"),
                    kind: BackupKind::Manual,
                    size_mb: 0.5 + i as f64,
                })
                .unwrap();
        }

        let records = catalog.list().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.size_mb > 0.0));
    }

    #[test]
    fn list_returns_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path());

        catalog
            .append(BackupRecord {
                timestamp: "2026-01-01 08:00:00".into(),
                database: "old".into(),
                filename: "old.zip".into(),
                kind: BackupKind::Automatic,
                size_mb: 1.0,
            })
            .unwrap();
        catalog
            .append(BackupRecord {
                timestamp: "2026-06-01 08:00:00".into(),
                database: "new".into(),
                filename: "new.zip".into(),
                kind: BackupKind::Manual,
                size_mb: 1.0,
            })
            .unwrap();

        let records = catalog.list().unwrap();
        assert_eq!(records[0].database, "new");
        assert_eq!(records[1].database, "old");
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path());
        assert!(catalog.list().unwrap().is_empty());
    }

    #[test]
    fn header_row_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path());
        catalog
            .append(BackupRecord::new("shop", "shop_x.zip", BackupKind::Manual, 0.01))
            .unwrap();
        let text = std::fs::read_to_string(catalog.path()).unwrap();
        assert!(text.starts_with("timestamp,database,filename,kind,size_mb"));
        assert!(text.contains(",manual,"));
    }
}
