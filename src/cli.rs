//! 命令行界面定义
//!
//! 定义了主程序的命令行参数和子命令
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nonce-gate")]
#[command(version)]
#[command(about = "Gated eth_getTransactionCount JSON-RPC service backed by a time-bounded whitelist")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    /// Configuration file path (defaults to searching standard locations)
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub(crate) config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Serve the JSON-RPC gateway
    Run {
        /// Port for the HTTP server to listen on
        #[arg(long, env = "SCAR_PORT")]
        port: Option<u16>,

        /// Path to the SQLite database
        #[arg(long, env = "SCAR_DB_PATH")]
        db_path: Option<PathBuf>,

        /// Create the whitelist table before serving if it does not exist
        #[arg(long)]
        create_db: bool,
    },

    /// Create the database file and whitelist table
    CreateDb {
        /// Path to the SQLite database
        #[arg(long, env = "SCAR_DB_PATH")]
        db_path: Option<PathBuf>,
    },

    /// Import whitelist records from a CSV export
    ImportCsv {
        /// CSV file exported from the project spreadsheet
        csv_file: PathBuf,

        /// Path to the SQLite database
        #[arg(long, env = "SCAR_DB_PATH")]
        db_path: Option<PathBuf>,

        /// Nonce stored for rows without a nonce column
        #[arg(long)]
        nonce: Option<String>,

        /// UTC offset of the times in the CSV, in minutes (e.g. 480 for UTC+8)
        #[arg(long, allow_hyphen_values = true)]
        utc_offset_minutes: Option<i32>,
    },

    /// Test configuration file
    Test {
        /// Configuration file path (optional, defaults to config.toml)
        #[arg(index = 1)]
        config_file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "nonce-gate",
            "run",
            "--port",
            "9000",
            "--db-path",
            "/tmp/w.sqlite",
            "--create-db",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                port,
                db_path,
                create_db,
            } => {
                assert_eq!(port, Some(9000));
                assert_eq!(db_path, Some(PathBuf::from("/tmp/w.sqlite")));
                assert!(create_db);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_parse_import_with_negative_offset() {
        let cli = Cli::try_parse_from([
            "nonce-gate",
            "--config",
            "gate.toml",
            "import-csv",
            "projects.csv",
            "--utc-offset-minutes",
            "-300",
            "--nonce",
            "0x1",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("gate.toml"));
        match cli.command {
            Commands::ImportCsv {
                csv_file,
                utc_offset_minutes,
                nonce,
                ..
            } => {
                assert_eq!(csv_file, PathBuf::from("projects.csv"));
                assert_eq!(utc_offset_minutes, Some(-300));
                assert_eq!(nonce.as_deref(), Some("0x1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["nonce-gate"]).is_err());
    }
}
