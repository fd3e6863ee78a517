use snip_core::{
    BatchItem, BatchResult, Crc32Calculator, LinkRecord, Repository, Result, ShortCode,
    ShortCodeCalculator, StorageError, UserId,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of a successful create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStatus {
    /// A new link was stored.
    Created,
    /// The URL was already shortened; the existing code is returned.
    Conflict,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceConfig {
    /// Upper bound for every backend call made by the service.
    #[builder(default = DEFAULT_OPERATION_TIMEOUT)]
    pub operation_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The facade transport layers talk to.
///
/// Codes are derived from the URL by the calculator, so the same URL always
/// maps to the same code. A create that hits an existing record is answered
/// with the stored code and [`CreateStatus::Conflict`] instead of an error.
#[derive(Debug)]
pub struct StorageService<R, C = Crc32Calculator> {
    repository: Arc<R>,
    calculator: Arc<C>,
    config: ServiceConfig,
}

impl<R, C> Clone for StorageService<R, C> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            calculator: Arc::clone(&self.calculator),
            config: self.config.clone(),
        }
    }
}

impl<R: Repository> StorageService<R> {
    /// Creates a service with the CRC-32 calculator and default config.
    pub fn new(repository: R) -> Self {
        Self::with_calculator(repository, Crc32Calculator::new(), ServiceConfig::default())
    }
}

impl<R: Repository, C: ShortCodeCalculator> StorageService<R, C> {
    pub fn with_calculator(repository: R, calculator: C, config: ServiceConfig) -> Self {
        Self {
            repository: Arc::new(repository),
            calculator: Arc::new(calculator),
            config,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Shortens `url`, owned by `user_id` when given.
    pub async fn create(
        &self,
        url: &str,
        user_id: Option<UserId>,
    ) -> Result<(ShortCode, CreateStatus)> {
        ensure_url(url)?;
        let code = self.calculator.calculate(url);
        let record = LinkRecord::new(code.clone(), url, user_id);

        match self.bounded("create", self.repository.create(record)).await {
            Ok(()) => {
                debug!(code = %code, "link created");
                Ok((code, CreateStatus::Created))
            }
            Err(StorageError::DuplicateKey(_)) => self.recover_duplicate(code, url).await,
            Err(e) => Err(e),
        }
    }

    /// Resolves the code a duplicate create collided with.
    async fn recover_duplicate(
        &self,
        code: ShortCode,
        url: &str,
    ) -> Result<(ShortCode, CreateStatus)> {
        match self
            .bounded("get_by_url", self.repository.get_by_url(url))
            .await
        {
            Ok(existing) => {
                debug!(code = %existing, "link already exists");
                Ok((existing, CreateStatus::Conflict))
            }
            // The code is taken by a different URL.
            Err(StorageError::NotFound(_)) => {
                warn!(code = %code, url, "short code collision");
                Err(StorageError::Collision {
                    code: code.into_inner(),
                    url: url.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Shortens every item as one backend batch.
    ///
    /// Results keep the order and correlation ids of `items`.
    pub async fn batch_create(
        &self,
        items: Vec<BatchItem>,
        user_id: Option<UserId>,
    ) -> Result<Vec<BatchResult>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        for item in &items {
            ensure_url(&item.original_url)?;
        }

        let mut records = Vec::with_capacity(items.len());
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let code = self.calculator.calculate(&item.original_url);
            records.push(LinkRecord::new(code.clone(), item.original_url, user_id));
            results.push(BatchResult {
                correlation_id: item.correlation_id,
                short_code: code,
            });
        }

        self.bounded("batch_create", self.repository.batch_create(records))
            .await?;
        debug!(links = results.len(), "batch created");
        Ok(results)
    }

    /// Returns the URL stored under `code`.
    pub async fn get(&self, code: &str) -> Result<String> {
        let code = ShortCode::new(code)?;
        self.bounded("get", self.repository.get(&code)).await
    }

    /// Returns the code `url` was shortened to.
    pub async fn get_by_url(&self, url: &str) -> Result<ShortCode> {
        ensure_url(url)?;
        self.bounded("get_by_url", self.repository.get_by_url(url))
            .await
    }

    pub async fn urls(&self, user_id: UserId) -> Result<Vec<LinkRecord>> {
        self.bounded("urls", self.repository.urls(user_id)).await
    }

    /// Deletes the codes owned by `user_id`. Runs to completion on the
    /// calling task; use a [`DeletionQueue`](crate::DeletionQueue) to detach it.
    pub async fn batch_delete(&self, user_id: UserId, codes: Vec<ShortCode>) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }
        self.bounded("batch_delete", self.repository.batch_delete(user_id, codes))
            .await
    }

    pub async fn ping(&self) -> bool {
        match tokio::time::timeout(self.config.operation_timeout, self.repository.ping()).await {
            Ok(alive) => alive,
            Err(_) => {
                warn!(timeout = ?self.config.operation_timeout, "ping timed out");
                false
            }
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.config.operation_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout = ?limit, "storage operation timed out");
                Err(StorageError::Timeout(format!(
                    "{operation} did not finish within {limit:?}"
                )))
            }
        }
    }
}

fn ensure_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(StorageError::MalformedInput(
            "url must not be empty".to_string(),
        ));
    }
    Ok(())
}
