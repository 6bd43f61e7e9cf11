use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// sqlstash: logical backup & restore for MySQL-flavoured databases
#[derive(Parser, Debug)]
#[command(name = "sqlstash", version, about = "Create and restore compressed logical database backups.", long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Database server host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Database server port
    #[arg(long, default_value_t = 3306)]
    pub port: u16,

    /// User to connect as
    #[arg(short = 'u', long, default_value = "root")]
    pub user: String,

    /// Password (omit for passwordless accounts)
    #[arg(long, value_name = "password")]
    pub password: Option<String>,

    /// Prompt for the password instead of passing it on the command line
    #[arg(long)]
    pub ask_password: bool,

    /// Root directory for backup archives and the catalog log
    #[arg(long, value_name = "dir")]
    pub backups_dir: Option<PathBuf>,

    /// Settings file (JSON); CLI flags override its values
    #[arg(short = 'c', long, value_name = "file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up one database into the manual backups directory
    Backup {
        /// Database to back up
        database: String,
    },

    /// Back up every non-system database into the automatic directory
    BackupAll,

    /// Restore an archive (or raw .sql dump) into a target database
    Restore {
        /// Path to the .zip archive or .sql file
        archive: PathBuf,

        /// Target database name (defaults to the archive name prefix)
        #[arg(short = 't', long)]
        target: Option<String>,
    },

    /// Show the backup catalog, newest first
    History,

    /// List archive files present under the backups directory
    Archives,

    /// List databases on the server
    Databases,
}
