use crate::config::{StorageConfig, StorageMode};
use crate::deletion::DeletionPipeline;
use crate::file::FileRepository;
use crate::memory::InMemoryRepository;
use crate::postgres::PostgresRepository;
use async_trait::async_trait;
use snip_core::{LinkRecord, ReadRepository, Repository, Result, ShortCode, StorageError, UserId};
use tracing::info;

/// The backend selected by configuration.
///
/// Built once by [`StorageBackend::open`]; the service never inspects the
/// variant afterwards.
#[derive(Debug)]
pub enum StorageBackend {
    InMemory(InMemoryRepository),
    File(FileRepository),
    Postgres(PostgresRepository),
}

impl StorageBackend {
    /// Opens the backend described by `config`, loading or connecting as needed.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let backend = match config.mode {
            StorageMode::Memory => StorageBackend::InMemory(InMemoryRepository::new()),
            StorageMode::File => {
                StorageBackend::File(FileRepository::open(config.file_path.clone()).await?)
            }
            StorageMode::Database => {
                let dsn = config.database_dsn.as_deref().ok_or_else(|| {
                    StorageError::MalformedInput(
                        "database dsn is required when storage mode is database".to_string(),
                    )
                })?;
                StorageBackend::Postgres(
                    PostgresRepository::connect(dsn, DeletionPipeline::new(config.delete_workers))
                        .await?,
                )
            }
        };

        info!(mode = %backend.mode(), "storage backend ready");
        Ok(backend)
    }

    pub fn mode(&self) -> StorageMode {
        match self {
            StorageBackend::InMemory(_) => StorageMode::Memory,
            StorageBackend::File(_) => StorageMode::File,
            StorageBackend::Postgres(_) => StorageMode::Database,
        }
    }

    /// Releases backend resources. Only the database holds any.
    pub async fn close(&self) {
        if let StorageBackend::Postgres(repo) = self {
            repo.close().await;
        }
    }

    fn as_repository(&self) -> &dyn Repository {
        match self {
            StorageBackend::InMemory(repo) => repo,
            StorageBackend::File(repo) => repo,
            StorageBackend::Postgres(repo) => repo,
        }
    }
}

#[async_trait]
impl ReadRepository for StorageBackend {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        self.as_repository().get(code).await
    }

    async fn get_by_url(&self, url: &str) -> Result<ShortCode> {
        self.as_repository().get_by_url(url).await
    }

    async fn urls(&self, user_id: UserId) -> Result<Vec<LinkRecord>> {
        self.as_repository().urls(user_id).await
    }

    async fn ping(&self) -> bool {
        self.as_repository().ping().await
    }
}

#[async_trait]
impl Repository for StorageBackend {
    async fn create(&self, record: LinkRecord) -> Result<()> {
        self.as_repository().create(record).await
    }

    async fn batch_create(&self, records: Vec<LinkRecord>) -> Result<()> {
        self.as_repository().batch_create(records).await
    }

    async fn batch_delete(&self, user_id: UserId, codes: Vec<ShortCode>) -> Result<()> {
        self.as_repository().batch_delete(user_id, codes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn opens_memory_by_default() {
        let backend = StorageBackend::open(&StorageConfig::default())
            .await
            .unwrap();

        assert_eq!(backend.mode(), StorageMode::Memory);
        assert!(backend.ping().await);
    }

    #[tokio::test]
    async fn opens_file_backend_at_configured_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        let config = StorageConfig::builder()
            .mode(StorageMode::File)
            .file_path(path.clone())
            .build();

        let backend = StorageBackend::open(&config).await.unwrap();
        backend
            .create(LinkRecord::new(
                ShortCode::new_unchecked("b8da4f2d"),
                "www.ya.ru",
                None,
            ))
            .await
            .unwrap();

        assert_eq!(backend.mode(), StorageMode::File);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn database_mode_requires_a_dsn() {
        let config = StorageConfig::builder()
            .mode(StorageMode::Database)
            .build();

        let err = StorageBackend::open(&config).await.unwrap_err();

        assert!(matches!(err, StorageError::MalformedInput(_)));
    }
}
