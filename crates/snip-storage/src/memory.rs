use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use snip_core::{LinkRecord, ReadRepository, Repository, Result, ShortCode, StorageError, UserId};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// In-memory storage entry for a link.
#[derive(Debug, Clone)]
struct StoredLink {
    original_url: String,
    user_id: Option<UserId>,
}

impl StoredLink {
    /// Ownerless links predate user scoping and stay visible to everyone.
    fn visible_to(&self, user_id: UserId) -> bool {
        self.user_id.map_or(true, |owner| owner == user_id)
    }

    fn into_record(self, short_code: ShortCode) -> LinkRecord {
        LinkRecord::new(short_code, self.original_url, self.user_id)
    }
}

/// In-memory implementation of the Repository trait using DashMap.
///
/// DashMap provides better concurrency than RwLock<HashMap> because it
/// uses sharded locks, allowing concurrent reads and writes to different
/// buckets without blocking.
///
/// Deletion is not supported: [`Repository::batch_delete`] is a no-op and
/// records are never marked deleted.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    storage: DashMap<ShortCode, StoredLink>,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self {
            storage: DashMap::new(),
        }
    }

    /// Creates a new in-memory repository with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: DashMap::with_capacity(capacity),
        }
    }

    /// Creates a repository holding the given code to URL mapping.
    ///
    /// The mapping carries no owners, so every loaded link is ownerless.
    pub fn from_mapping(mapping: BTreeMap<String, String>) -> Self {
        let repo = Self::with_capacity(mapping.len());
        for (code, original_url) in mapping {
            repo.storage.insert(
                ShortCode::new_unchecked(code),
                StoredLink {
                    original_url,
                    user_id: None,
                },
            );
        }
        repo
    }

    /// Returns a sorted copy of the code to URL mapping.
    pub fn mapping(&self) -> BTreeMap<String, String> {
        self.storage
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().original_url.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drops the link stored under `code`, returning its URL.
    pub fn remove(&self, code: &ShortCode) -> Option<String> {
        self.storage
            .remove(code)
            .map(|(_, link)| link.original_url)
    }

    fn insert(&self, record: LinkRecord) -> Result<()> {
        // The entry guard holds the shard write lock, so check-and-insert is atomic.
        match self.storage.entry(record.short_code) {
            Entry::Occupied(existing) if existing.get().original_url == record.original_url => {
                trace!(code = %existing.key(), "link already stored");
                Err(StorageError::DuplicateKey(existing.key().to_string()))
            }
            Entry::Occupied(existing) => Err(StorageError::Collision {
                code: existing.key().to_string(),
                url: record.original_url,
            }),
            Entry::Vacant(slot) => {
                trace!(code = %slot.key(), "storing link");
                slot.insert(StoredLink {
                    original_url: record.original_url,
                    user_id: record.user_id,
                });
                Ok(())
            }
        }
    }

    /// Inserts `records` one at a time and stops at the first failure.
    ///
    /// Not atomic: records applied before a failure stay applied. A record
    /// whose code already maps to the same URL is accepted as is. Returns
    /// the codes that were newly inserted along with the outcome.
    pub(crate) fn apply_batch(&self, records: Vec<LinkRecord>) -> (Vec<ShortCode>, Result<()>) {
        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            let code = record.short_code.clone();
            match self.insert(record) {
                Ok(()) => inserted.push(code),
                Err(StorageError::DuplicateKey(_)) => {}
                Err(e) => return (inserted, Err(e)),
            }
        }
        (inserted, Ok(()))
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        let Some(entry) = self.storage.get(code) else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        Ok(entry.original_url.clone())
    }

    async fn get_by_url(&self, url: &str) -> Result<ShortCode> {
        // No reverse index: a full scan, like the file backend on top of it.
        self.storage
            .iter()
            .find(|entry| entry.value().original_url == url)
            .map(|entry| entry.key().clone())
            .ok_or_else(|| StorageError::NotFound(url.to_string()))
    }

    async fn urls(&self, user_id: UserId) -> Result<Vec<LinkRecord>> {
        let mut records: Vec<LinkRecord> = self
            .storage
            .iter()
            .filter(|entry| entry.value().visible_to(user_id))
            .map(|entry| entry.value().clone().into_record(entry.key().clone()))
            .collect();
        records.sort_by(|a, b| a.short_code.cmp(&b.short_code));
        Ok(records)
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create(&self, record: LinkRecord) -> Result<()> {
        self.insert(record)
    }

    async fn batch_create(&self, records: Vec<LinkRecord>) -> Result<()> {
        self.apply_batch(records).1
    }

    async fn batch_delete(&self, user_id: UserId, codes: Vec<ShortCode>) -> Result<()> {
        debug!(
            user_id = %user_id,
            count = codes.len(),
            "in-memory storage does not support deletion, ignoring"
        );
        Ok(())
    }
}
