use anyhow::Result;
use clap::Parser;

use sqlstash::cli::{Cli, Commands};
use sqlstash::ops;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = ops::build_settings(&cli)?;
    let connector = ops::build_connector(&settings);
    let engine = ops::build_engine(settings);

    match cli.command {
        Commands::Backup { database } => {
            ops::do_backup(&engine, &connector, &database)?;
        }
        Commands::BackupAll => {
            ops::do_backup_all(&engine, &connector)?;
        }
        Commands::Restore { archive, target } => {
            ops::do_restore(&engine, &connector, &archive, target)?;
        }
        Commands::History => {
            ops::do_history(&engine)?;
        }
        Commands::Archives => {
            ops::do_archives(&engine)?;
        }
        Commands::Databases => {
            ops::do_databases(&connector)?;
        }
    }

    Ok(())
}
