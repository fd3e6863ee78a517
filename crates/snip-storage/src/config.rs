use crate::deletion::DEFAULT_WORKERS;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use typed_builder::TypedBuilder;

pub const DEFAULT_FILE_PATH: &str = "./repo.json";

/// Which backend a [`StorageBackend`][crate::StorageBackend] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    #[default]
    Memory,
    File,
    Database,
}

impl Display for StorageMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Memory => write!(f, "memory"),
            StorageMode::File => write!(f, "file"),
            StorageMode::Database => write!(f, "database"),
        }
    }
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StorageMode::Memory),
            "file" => Ok(StorageMode::File),
            "database" | "postgres" => Ok(StorageMode::Database),
            other => Err(format!("unknown storage mode: {other}")),
        }
    }
}

/// Storage selection consumed at construction time.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StorageConfig {
    #[builder(default)]
    pub mode: StorageMode,
    /// Backing file of the file mode.
    #[builder(default = PathBuf::from(DEFAULT_FILE_PATH), setter(into))]
    pub file_path: PathBuf,
    /// Connection string of the database mode.
    #[builder(default)]
    pub database_dsn: Option<String>,
    /// Worker count of the database deletion pipeline.
    #[builder(default = DEFAULT_WORKERS)]
    pub delete_workers: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
