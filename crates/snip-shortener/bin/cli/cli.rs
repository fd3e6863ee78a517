use clap::{Parser, Subcommand, ValueEnum};
use snip_storage::StorageMode;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const STORAGE_BACKEND_ENV: &str = "SNIP_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const OPERATION_TIMEOUT_ENV: &str = "SNIP_OPERATION_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "SNIP_LOG_FORMAT";

pub const DEFAULT_FILE_STORAGE_PATH: &str = "./repo.json";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "memory")]
    Memory,
    #[value(name = "file")]
    File,
    #[value(name = "database")]
    Database,
}

impl From<StorageBackendArg> for StorageMode {
    fn from(value: StorageBackendArg) -> Self {
        match value {
            StorageBackendArg::Memory => StorageMode::Memory,
            StorageBackendArg::File => StorageMode::File,
            StorageBackendArg::Database => StorageMode::Database,
        }
    }
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", StorageMode::from(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Deterministic URL shortener")]
pub struct CLI {
    #[arg(
        long,
        global = true,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::Memory
    )]
    pub storage: StorageBackendArg,

    #[arg(
        long,
        global = true,
        env = FILE_STORAGE_PATH_ENV,
        default_value = DEFAULT_FILE_STORAGE_PATH
    )]
    pub file_storage_path: PathBuf,

    #[arg(long, global = true, env = DATABASE_DSN_ENV, required_if_eq("storage", "database"))]
    pub database_dsn: Option<String>,

    #[arg(long, global = true, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(
        long,
        global = true,
        env = OPERATION_TIMEOUT_ENV,
        default_value_t = DEFAULT_OPERATION_TIMEOUT_SECS
    )]
    pub timeout_secs: u64,

    #[arg(long, global = true, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one URL and print the short URL.
    Shorten {
        url: String,
        #[arg(long)]
        user: Option<i32>,
    },
    /// Shorten a JSON array of `{correlation_id, original_url}` items.
    Batch {
        /// Input file; stdin when omitted.
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        user: Option<i32>,
    },
    /// Print the URL behind a short code.
    Resolve { code: String },
    /// List the links of a user.
    Urls {
        #[arg(long)]
        user: i32,
    },
    /// Delete short codes of a user in the background.
    Delete {
        #[arg(long)]
        user: i32,
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Check that the storage backend is reachable.
    Ping,
}
