use anyhow::{Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::archive::round_mb;
use crate::catalog::BackupKind;
use crate::cli::Cli;
use crate::config::settings::Settings;
use crate::conn::{Connector, ProgressReporter};
use crate::drivers::mysql::MysqlShellConnector;
use crate::engine::Engine;
use crate::engine::native::NativeToolAdapter;
use crate::engine::reader::SchemaReader;
use crate::error::OpReport;
use colored::*;
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets::UTF8_FULL};
use walkdir::WalkDir;

/// Merge the settings file (if any) with CLI flag overrides into the
/// explicit context struct every engine call receives.
pub fn build_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.auth.host = cli.host.clone();
    settings.auth.port = cli.port;
    settings.auth.user = cli.user.clone();
    if let Some(password) = &cli.password {
        settings.auth.password = Some(password.clone());
    }
    if cli.ask_password {
        settings.auth.password = Some(prompt_password(&format!(
            "Password for {}@{}: ",
            settings.auth.user, settings.auth.host
        ))?);
    }
    if let Some(dir) = &cli.backups_dir {
        settings.backups_dir = dir.clone();
    }
    Ok(settings)
}

pub fn build_engine(settings: Settings) -> Engine {
    let native = NativeToolAdapter::new(settings.auth.clone());
    Engine::new(settings, native)
}

pub fn build_connector(settings: &Settings) -> MysqlShellConnector {
    MysqlShellConnector::new(settings.auth.clone())
}

pub fn do_backup(engine: &Engine, connector: &dyn Connector, database: &str) -> Result<()> {
    let bar = create_progress_bar(&format!("Backing up '{database}'"));
    let mut reporter = BarReporter(&bar);
    let report = engine.backup_database(connector, &mut reporter, database, BackupKind::Manual);
    bar.finish_and_clear();
    render_report(&report)?;
    if let (Some(archive), Some(size_mb)) = (&report.archive, report.size_mb) {
        println!(
            "{} {}",
            "i".yellow().bold(),
            format!("Archive: {} ({size_mb} MB)", archive.display()).yellow()
        );
    }
    Ok(())
}

pub fn do_backup_all(engine: &Engine, connector: &dyn Connector) -> Result<()> {
    let bar = create_progress_bar("Backing up all databases");
    let mut reporter = BarReporter(&bar);
    let report = engine.backup_all(connector, &mut reporter);
    bar.finish_and_clear();
    for line in &report.details {
        if line.contains("FAILED") {
            eprintln!("{} {}", "!".yellow().bold(), line.yellow());
        } else {
            println!("{} {}", "✔".green().bold(), line.green());
        }
    }
    if report.success {
        println!("{} {}", "✔".green().bold(), report.message.green());
        Ok(())
    } else {
        Err(anyhow!(report.message))
    }
}

pub fn do_restore(
    engine: &Engine,
    connector: &dyn Connector,
    archive: &Path,
    target: Option<String>,
) -> Result<()> {
    let target = match target {
        Some(name) => name,
        None => infer_target(archive)
            .ok_or_else(|| anyhow!("cannot infer target database from file name; use --target"))?,
    };

    let bar = create_progress_bar(&format!("Restoring into '{target}'"));
    let mut reporter = BarReporter(&bar);
    let report = engine.restore(connector, &mut reporter, archive, &target);
    bar.finish_and_clear();
    render_report(&report)
}

pub fn do_history(engine: &Engine) -> Result<()> {
    let records = engine.catalog().list()?;
    if records.is_empty() {
        println!("{} {}", "i".yellow().bold(), "No backups recorded yet".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Timestamp").add_attribute(Attribute::Bold),
            Cell::new("Database").add_attribute(Attribute::Bold),
            Cell::new("Archive").add_attribute(Attribute::Bold),
            Cell::new("Kind").add_attribute(Attribute::Bold),
            Cell::new("Size (MB)").add_attribute(Attribute::Bold),
        ]);
    for record in &records {
        table.add_row(vec![
            Cell::new(&record.timestamp),
            Cell::new(&record.database),
            Cell::new(&record.filename),
            Cell::new(record.kind.as_str()),
            Cell::new(format!("{:.2}", record.size_mb)),
        ]);
    }
    println!("{table}");

    let total_mb: f64 = records.iter().map(|r| r.size_mb).sum();
    let manual = records
        .iter()
        .filter(|r| r.kind == BackupKind::Manual)
        .count();
    println!(
        "{} {}",
        "i".yellow().bold(),
        format!(
            "{} backup(s), {:.1} MB total, {} manual",
            records.len(),
            total_mb,
            manual
        )
        .yellow()
    );
    Ok(())
}

/// Walk the backups directory and list every archive actually on disk.
/// This can disagree with the catalog when files were deleted by hand;
/// that staleness is shown, not repaired.
pub fn do_archives(engine: &Engine) -> Result<()> {
    let root = &engine.settings().backups_dir;
    let mut entries: Vec<(String, String, f64, String)> = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !(name.ends_with(".zip") || name.ends_with(".sql")) {
            continue;
        }
        let meta = entry.metadata()?;
        let modified: chrono::DateTime<chrono::Local> = meta.modified()?.into();
        let kind = if entry.path().to_string_lossy().contains("automatic") {
            "automatic"
        } else {
            "manual"
        };
        entries.push((
            name,
            modified.format("%Y-%m-%d %H:%M:%S").to_string(),
            round_mb(meta.len()),
            kind.to_string(),
        ));
    }

    if entries.is_empty() {
        println!("{} {}", "i".yellow().bold(), "No archives on disk".yellow());
        return Ok(());
    }
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Archive").add_attribute(Attribute::Bold),
            Cell::new("Modified").add_attribute(Attribute::Bold),
            Cell::new("Size (MB)").add_attribute(Attribute::Bold),
            Cell::new("Kind").add_attribute(Attribute::Bold),
        ]);
    for (name, modified, size_mb, kind) in &entries {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(modified),
            Cell::new(format!("{size_mb:.2}")),
            Cell::new(kind),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn do_databases(connector: &dyn Connector) -> Result<()> {
    let mut conn = connector.connect(None)?;
    let databases = SchemaReader::new(conn.as_mut()).databases()?;
    if databases.is_empty() {
        println!("{} {}", "i".yellow().bold(), "No user databases found".yellow());
        return Ok(());
    }
    for database in databases {
        println!("{} {}", "•".cyan().bold(), database);
    }
    Ok(())
}

fn render_report(report: &OpReport) -> Result<()> {
    for detail in &report.details {
        eprintln!("{} {}", "!".yellow().bold(), detail.yellow());
    }
    if report.success {
        if report.partial {
            println!(
                "{} {}",
                "!".yellow().bold(),
                format!("{} (partial: some tables skipped)", report.message).yellow()
            );
        } else {
            println!("{} {}", "✔".green().bold(), report.message.green());
        }
        Ok(())
    } else {
        Err(anyhow!(report.message.clone()))
    }
}

/// Restore targets default to the archive name prefix before the first
/// underscore: `shop_20260830_120000.zip` restores into `shop`.
fn infer_target(archive: &Path) -> Option<String> {
    let stem = archive.file_stem()?.to_str()?;
    let prefix = stem.split('_').next()?;
    if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_string())
    }
}

struct BarReporter<'a>(&'a ProgressBar);

impl ProgressReporter for BarReporter<'_> {
    fn report(&mut self, fraction: f64, message: &str) {
        self.0
            .set_message(format!("{message} ({:.0}%)", fraction * 100.0));
    }
}

fn create_progress_bar(prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
    );
    bar.set_message(prefix.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar
}

fn prompt_password(message: &str) -> Result<String> {
    print!("{} {}", "?".cyan().bold(), message.cyan());
    std::io::Write::flush(&mut std::io::stdout())?;
    let password = rpassword::read_password()?; // input hidden
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn target_inferred_from_archive_prefix() {
        assert_eq!(
            infer_target(&PathBuf::from("backups/manual/shop_20260830_120000.zip")),
            Some("shop".to_string())
        );
        assert_eq!(
            infer_target(&PathBuf::from("plain.sql")),
            Some("plain".to_string())
        );
        assert_eq!(infer_target(&PathBuf::from("_odd.zip")), None);
    }
}
