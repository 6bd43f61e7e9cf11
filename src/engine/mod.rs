pub mod dump;
pub mod native;
pub mod reader;
pub mod restore;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;

use crate::archive;
use crate::catalog::{BackupKind, BackupRecord, Catalog};
use crate::config::settings::Settings;
use crate::conn::{Connector, ProgressReporter};
use crate::error::{EngineError, OpReport};
use dump::DumpWriter;
use native::NativeToolAdapter;
use reader::SchemaReader;
use restore::{RestoreExecutor, RestoreSummary};

/// Timestamp embedded in archive file names.
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Lifecycle of a single backup operation. Any stage before `Cataloging`
/// may transition to `Failed`, in which case no catalog entry is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Connecting,
    ReadingSchema,
    Serializing,
    Compressing,
    Cataloging,
    Done,
    Failed,
}

impl Stage {
    fn fraction(self) -> f64 {
        match self {
            Stage::Pending => 0.0,
            Stage::Connecting => 0.05,
            Stage::ReadingSchema => 0.15,
            Stage::Serializing => 0.30,
            Stage::Compressing => 0.85,
            Stage::Cataloging => 0.95,
            Stage::Done | Stage::Failed => 1.0,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Stage::Pending => "Pending",
            Stage::Connecting => "Connecting",
            Stage::ReadingSchema => "Reading schema",
            Stage::Serializing => "Serializing",
            Stage::Compressing => "Compressing",
            Stage::Cataloging => "Cataloging",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        }
    }
}

fn enter(reporter: &mut dyn ProgressReporter, stage: Stage) {
    reporter.report(stage.fraction(), stage.label());
}

struct DumpRequest<'a> {
    database: &'a str,
    sql_path: &'a Path,
}

#[derive(Default)]
struct DumpOutcome {
    /// Tables skipped with the reason; non-empty means a partial backup.
    skipped: Vec<String>,
}

/// One link of the dump fallback chain. Strategies are tried in order;
/// native-tool errors hand control to the next link, anything else aborts
/// the operation.
trait DumpStrategy {
    fn label(&self) -> &'static str;
    fn attempt(
        &self,
        req: &DumpRequest<'_>,
        connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<DumpOutcome, EngineError>;
}

trait LoadStrategy {
    fn label(&self) -> &'static str;
    fn attempt(
        &self,
        sql_path: &Path,
        target: &str,
        connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<RestoreSummary, EngineError>;
}

struct NativeDump<'a> {
    adapter: &'a NativeToolAdapter,
}

impl DumpStrategy for NativeDump<'_> {
    fn label(&self) -> &'static str {
        "mysqldump"
    }

    fn attempt(
        &self,
        req: &DumpRequest<'_>,
        _connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<DumpOutcome, EngineError> {
        reporter.report(0.1, "Running mysqldump");
        self.adapter.dump(req.database, req.sql_path)?;
        Ok(DumpOutcome::default())
    }
}

struct InternalDump;

impl DumpStrategy for InternalDump {
    fn label(&self) -> &'static str {
        "internal engine"
    }

    fn attempt(
        &self,
        req: &DumpRequest<'_>,
        connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<DumpOutcome, EngineError> {
        enter(reporter, Stage::Connecting);
        let mut conn = connector.connect(Some(req.database))?;
        let mut reader = SchemaReader::new(conn.as_mut());

        enter(reporter, Stage::ReadingSchema);
        let tables = reader.tables()?;

        enter(reporter, Stage::Serializing);
        let file = File::create(req.sql_path)?;
        let mut writer = DumpWriter::begin(BufWriter::new(file), req.database)?;
        let mut outcome = DumpOutcome::default();
        let total = tables.len().max(1);

        for (i, table) in tables.iter().enumerate() {
            reporter.report(
                Stage::Serializing.fraction() + 0.5 * i as f64 / total as f64,
                &format!("Dumping table `{table}` ({}/{})", i + 1, tables.len()),
            );

            let schema = match reader.table_schema(table) {
                Ok(schema) => schema,
                Err(err) => {
                    outcome.skipped.push(format!("{table}: {err}"));
                    continue;
                }
            };
            let columns = match reader.columns(table) {
                Ok(columns) => columns,
                Err(err) => {
                    outcome.skipped.push(format!("{table}: {err}"));
                    continue;
                }
            };

            writer.begin_table(table, &schema, &columns)?;
            match reader.stream_rows(table, &mut |row| writer.push_row(&row)) {
                Ok(_) => {}
                Err(EngineError::RowRead { table, reason }) => {
                    outcome.skipped.push(format!("{table}: {reason}"));
                }
                Err(fatal) => return Err(fatal),
            }
            writer.finish_table()?;
        }

        writer.finish()?;
        Ok(outcome)
    }
}

struct NativeLoad<'a> {
    adapter: &'a NativeToolAdapter,
}

impl LoadStrategy for NativeLoad<'_> {
    fn label(&self) -> &'static str {
        "mysql client"
    }

    fn attempt(
        &self,
        sql_path: &Path,
        target: &str,
        _connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<RestoreSummary, EngineError> {
        reporter.report(0.2, "Replaying dump via mysql client");
        self.adapter.load(sql_path, target)?;
        Ok(RestoreSummary::default())
    }
}

struct InternalLoad;

impl LoadStrategy for InternalLoad {
    fn label(&self) -> &'static str {
        "internal engine"
    }

    fn attempt(
        &self,
        sql_path: &Path,
        target: &str,
        connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<RestoreSummary, EngineError> {
        let dump_text = fs::read_to_string(sql_path)?;
        let mut conn = connector.connect(None)?;
        let mut executor = RestoreExecutor::new(conn.as_mut());
        executor.run(&dump_text, target, reporter)
    }
}

/// Sequences reader, serializer, packager, catalog and the native-tool
/// fallback chain for single-database and whole-server operations.
///
/// Execution is single-threaded and synchronous; a busy gate rejects a
/// second concurrent invocation because neither the catalog append nor a
/// target under restore tolerates concurrent writers.
pub struct Engine {
    settings: Settings,
    native: NativeToolAdapter,
    catalog: Catalog,
    busy: AtomicBool,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Engine {
    pub fn new(settings: Settings, native: NativeToolAdapter) -> Self {
        let catalog = Catalog::new(&settings.backups_dir);
        Self {
            settings,
            native,
            catalog,
            busy: AtomicBool::new(false),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn native_tools_available(&self) -> bool {
        self.native.detect()
    }

    fn acquire(&self) -> Result<BusyGuard<'_>, EngineError> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| EngineError::Busy)?;
        Ok(BusyGuard(&self.busy))
    }

    /// Back up one database into the directory for `kind`. Never panics or
    /// leaks an error; the outcome is always an `OpReport`.
    pub fn backup_database(
        &self,
        connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
        database: &str,
        kind: BackupKind,
    ) -> OpReport {
        let _guard = match self.acquire() {
            Ok(guard) => guard,
            Err(err) => return OpReport::failure(err.to_string()),
        };
        self.backup_one(connector, reporter, database, kind)
    }

    /// Single-database backup without the busy gate; callers hold the guard.
    fn backup_one(
        &self,
        connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
        database: &str,
        kind: BackupKind,
    ) -> OpReport {
        match self.run_backup(connector, reporter, database, kind) {
            Ok(report) => report,
            Err(err) => {
                enter(reporter, Stage::Failed);
                OpReport::failure(format!("Backup of '{database}' failed: {err}"))
            }
        }
    }

    fn run_backup(
        &self,
        connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
        database: &str,
        kind: BackupKind,
    ) -> Result<OpReport, EngineError> {
        crate::utils::ident::validate(database)?;
        self.settings.ensure_layout()?;
        enter(reporter, Stage::Pending);

        let dest_dir = match kind {
            BackupKind::Manual => self.settings.manual_dir(),
            BackupKind::Automatic => self.settings.auto_dir(),
        };
        let stem = format!(
            "{database}_{}",
            Local::now().format(FILE_TIMESTAMP_FORMAT)
        );
        let sql_path = dest_dir.join(format!("{stem}.sql"));

        let request = DumpRequest {
            database,
            sql_path: &sql_path,
        };
        let native = NativeDump {
            adapter: &self.native,
        };
        let strategies: [&dyn DumpStrategy; 2] = [&native, &InternalDump];

        let mut fallback_notes = Vec::new();
        let mut produced: Option<(&'static str, DumpOutcome)> = None;
        for strategy in strategies {
            match strategy.attempt(&request, connector, reporter) {
                Ok(outcome) => {
                    produced = Some((strategy.label(), outcome));
                    break;
                }
                Err(
                    err @ (EngineError::NativeToolUnavailable(_)
                    | EngineError::NativeToolExecution { .. }),
                ) => {
                    fallback_notes.push(format!("{}: {err}", strategy.label()));
                }
                Err(fatal) => {
                    let _ = fs::remove_file(&sql_path);
                    return Err(fatal);
                }
            }
        }
        let Some((method, outcome)) = produced else {
            let _ = fs::remove_file(&sql_path);
            return Err(EngineError::NativeToolUnavailable("mysqldump"));
        };

        enter(reporter, Stage::Compressing);
        let packed = match archive::pack(&sql_path) {
            Ok(packed) => packed,
            Err(err) => {
                // No uncompressed artifact may masquerade as the result.
                let _ = fs::remove_file(&sql_path);
                return Err(err);
            }
        };

        enter(reporter, Stage::Cataloging);
        let filename = packed
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{stem}.zip"));
        self.catalog
            .append(BackupRecord::new(database, &filename, kind, packed.size_mb))?;

        enter(reporter, Stage::Done);
        let mut report = OpReport::success(format!(
            "Backup of '{database}' created successfully ({method})"
        ));
        report.partial = !outcome.skipped.is_empty();
        report.details = fallback_notes;
        report
            .details
            .extend(outcome.skipped.iter().map(|s| format!("skipped table {s}")));
        report.archive = Some(packed.path);
        report.size_mb = Some(packed.size_mb);
        Ok(report)
    }

    /// Back up every non-system database sequentially into the automatic
    /// directory. Overall success requires every database to succeed. The
    /// busy gate is held for the entire run, not per database.
    pub fn backup_all(
        &self,
        connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
    ) -> OpReport {
        let _guard = match self.acquire() {
            Ok(guard) => guard,
            Err(err) => return OpReport::failure(err.to_string()),
        };
        let databases = {
            let mut conn = match connector.connect(None) {
                Ok(conn) => conn,
                Err(err) => return OpReport::failure(format!("Whole-server backup failed: {err}")),
            };
            match SchemaReader::new(conn.as_mut()).databases() {
                Ok(list) => list,
                Err(err) => return OpReport::failure(format!("Whole-server backup failed: {err}")),
            }
        };
        if databases.is_empty() {
            return OpReport::failure("No databases found to back up");
        }

        let total = databases.len();
        let mut details = Vec::new();
        let mut succeeded = 0usize;
        for (i, database) in databases.iter().enumerate() {
            reporter.report(
                i as f64 / total as f64,
                &format!("Backing up database '{database}' ({}/{total})", i + 1),
            );
            let mut sub = crate::conn::NullReporter;
            let report = self.backup_one(connector, &mut sub, database, BackupKind::Automatic);
            if report.success {
                succeeded += 1;
                details.push(format!("{database}: ok ({})", report.message));
            } else {
                details.push(format!("{database}: FAILED ({})", report.message));
            }
        }
        reporter.report(1.0, "Whole-server backup finished");

        let mut report = if succeeded == total {
            OpReport::success(format!("{succeeded}/{total} databases backed up"))
        } else {
            OpReport::failure(format!("{succeeded}/{total} databases backed up"))
        };
        report.details = details;
        report
    }

    /// Restore an archive (or raw dump file) into `target`, creating it if
    /// absent.
    pub fn restore(
        &self,
        connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
        archive_path: &Path,
        target: &str,
    ) -> OpReport {
        let _guard = match self.acquire() {
            Ok(guard) => guard,
            Err(err) => return OpReport::failure(err.to_string()),
        };
        match self.run_restore(connector, reporter, archive_path, target) {
            Ok(report) => report,
            Err(err) => OpReport::failure(format!("Restore into '{target}' failed: {err}")),
        }
    }

    fn run_restore(
        &self,
        connector: &dyn Connector,
        reporter: &mut dyn ProgressReporter,
        archive_path: &Path,
        target: &str,
    ) -> Result<OpReport, EngineError> {
        crate::utils::ident::validate(target)?;
        reporter.report(0.0, "Extracting archive");

        let work_dir = archive_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let sql_path = archive::extract_dump(archive_path, &work_dir)?;
        let extracted = sql_path != archive_path;

        let native = NativeLoad {
            adapter: &self.native,
        };
        let strategies: [&dyn LoadStrategy; 2] = [&native, &InternalLoad];

        let mut fallback_notes = Vec::new();
        let mut result: Option<(&'static str, RestoreSummary)> = None;
        let mut fatal: Option<EngineError> = None;
        for strategy in strategies {
            match strategy.attempt(&sql_path, target, connector, reporter) {
                Ok(summary) => {
                    result = Some((strategy.label(), summary));
                    break;
                }
                Err(
                    err @ (EngineError::NativeToolUnavailable(_)
                    | EngineError::NativeToolExecution { .. }),
                ) => {
                    fallback_notes.push(format!("{}: {err}", strategy.label()));
                }
                Err(err) => {
                    fatal = Some(err);
                    break;
                }
            }
        }

        if extracted {
            let _ = fs::remove_file(&sql_path);
        }
        if let Some(err) = fatal {
            return Err(err);
        }
        let Some((method, summary)) = result else {
            return Err(EngineError::NativeToolUnavailable("mysql"));
        };

        let mut report = OpReport::success(format!(
            "Database '{target}' restored successfully ({method})"
        ));
        report.details = fallback_notes;
        report.details.extend(summary.warnings);
        if summary.suppressed > 0 {
            report.details.push(format!(
                "{} benign statement error(s) suppressed",
                summary.suppressed
            ));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_progress_monotonically() {
        let order = [
            Stage::Pending,
            Stage::Connecting,
            Stage::ReadingSchema,
            Stage::Serializing,
            Stage::Compressing,
            Stage::Cataloging,
            Stage::Done,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].fraction() < pair[1].fraction() || pair[1] == Stage::Done);
        }
    }

    #[test]
    fn busy_gate_rejects_second_acquisition() {
        let settings = Settings::default();
        let native = NativeToolAdapter::disabled(settings.auth.clone());
        let engine = Engine::new(settings, native);

        let first = engine.acquire().unwrap();
        assert!(matches!(engine.acquire(), Err(EngineError::Busy)));
        drop(first);
        assert!(engine.acquire().is_ok());
    }
}
