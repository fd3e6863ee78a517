use crate::error::Result;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identifier of the user owning a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i32);

impl UserId {
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl From<i32> for UserId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored link in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// The short code, unique within a backend.
    pub short_code: ShortCode,
    /// The original URL that was shortened.
    pub original_url: String,
    /// The owner, `None` for anonymous links.
    pub user_id: Option<UserId>,
    /// Soft-delete marker. Only the database backend ever sets it.
    pub deleted: bool,
}

impl LinkRecord {
    pub fn new(
        short_code: ShortCode,
        original_url: impl Into<String>,
        user_id: Option<UserId>,
    ) -> Self {
        Self {
            short_code,
            original_url: original_url.into(),
            user_id,
            deleted: false,
        }
    }
}

/// A read-only view of a repository.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the original URL for a given short code.
    ///
    /// Returns `Err(NotFound)` if the code does not exist and `Err(Gone)`
    /// if the record was soft deleted.
    async fn get(&self, code: &ShortCode) -> Result<String>;

    /// Reverse lookup: retrieves the short code stored for a URL.
    /// Returns `Err(NotFound)` if the URL was never stored.
    async fn get_by_url(&self, url: &str) -> Result<ShortCode>;

    /// Returns every non-deleted record owned by `user_id`.
    async fn urls(&self, user_id: UserId) -> Result<Vec<LinkRecord>>;

    /// Liveness check of the backend.
    async fn ping(&self) -> bool;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a new record keyed by its short code.
    /// Returns `Err(DuplicateKey)` if the record already exists.
    async fn create(&self, record: LinkRecord) -> Result<()>;

    /// Inserts several records. Atomicity depends on the backend.
    async fn batch_create(&self, records: Vec<LinkRecord>) -> Result<()>;

    /// Marks the given codes owned by `user_id` as deleted.
    async fn batch_delete(&self, user_id: UserId, codes: Vec<ShortCode>) -> Result<()>;
}
