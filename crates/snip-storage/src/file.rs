use crate::memory::InMemoryRepository;
use async_trait::async_trait;
use snip_core::{LinkRecord, ReadRepository, Repository, Result, ShortCode, StorageError, UserId};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// A file-backed repository decorator.
///
/// Composes an [`InMemoryRepository`] that serves every read, and rewrites
/// the whole code to URL mapping as a single JSON object after every write
/// before returning to the caller. Writes are serialised so that an older
/// snapshot can never land on disk after a newer one.
///
/// Owners are not persisted: after a restart every link is ownerless.
#[derive(Debug)]
pub struct FileRepository {
    inner: InMemoryRepository,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRepository {
    /// Opens the repository stored at `path`.
    ///
    /// A missing or empty file is a first run and yields an empty repository.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mapping = load_mapping(&path).await?;
        info!(path = %path.display(), links = mapping.len(), "loaded file storage");

        Ok(Self {
            inner: InMemoryRepository::from_mapping(mapping),
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a reference to the in-memory core.
    pub fn inner(&self) -> &InMemoryRepository {
        &self.inner
    }

    /// Overwrites the backing file with the current mapping.
    ///
    /// Callers must hold `write_lock`.
    async fn persist(&self) -> Result<()> {
        let mapping = self.inner.mapping();
        let json = serde_json::to_vec(&mapping)
            .map_err(|e| StorageError::Persistence(format!("failed to encode mapping: {e}")))?;

        tokio::fs::write(&self.path, json).await.map_err(|e| {
            error!(path = %self.path.display(), error = %e, "failed to write storage file");
            StorageError::Persistence(format!("failed to write {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), links = mapping.len(), "storage file rewritten");
        Ok(())
    }

    /// Persists the mapping, dropping `inserted` from memory again when the
    /// write fails so memory never holds links the file does not.
    ///
    /// Callers must hold `write_lock`.
    async fn persist_or_forget(&self, inserted: &[ShortCode]) -> Result<()> {
        let Err(e) = self.persist().await else {
            return Ok(());
        };
        for code in inserted {
            self.inner.remove(code);
        }
        Err(e)
    }
}

async fn load_mapping(path: &Path) -> Result<BTreeMap<String, String>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "storage file not found, probably first run");
            return Ok(BTreeMap::new());
        }
        Err(e) => {
            return Err(StorageError::Persistence(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        info!(path = %path.display(), "storage file is empty, probably first run");
        return Ok(BTreeMap::new());
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        StorageError::InvalidData(format!("failed to parse {}: {e}", path.display()))
    })
}

#[async_trait]
impl ReadRepository for FileRepository {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        self.inner.get(code).await
    }

    async fn get_by_url(&self, url: &str) -> Result<ShortCode> {
        self.inner.get_by_url(url).await
    }

    async fn urls(&self, user_id: UserId) -> Result<Vec<LinkRecord>> {
        self.inner.urls(user_id).await
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn create(&self, record: LinkRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let code = record.short_code.clone();
        self.inner.create(record).await?;
        self.persist_or_forget(&[code]).await
    }

    async fn batch_create(&self, records: Vec<LinkRecord>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let (inserted, applied) = self.inner.apply_batch(records);
        if inserted.is_empty() {
            return applied;
        }
        // Whatever prefix was applied before a failure is persisted as well.
        self.persist_or_forget(&inserted).await?;
        applied
    }

    async fn batch_delete(&self, user_id: UserId, codes: Vec<ShortCode>) -> Result<()> {
        self.inner.batch_delete(user_id, codes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn record(c: &str, url: &str) -> LinkRecord {
        LinkRecord::new(code(c), url, None)
    }

    fn storage_path(dir: &TempDir) -> PathBuf {
        dir.path().join("repo.json")
    }

    #[tokio::test]
    async fn missing_file_is_first_run() {
        let dir = TempDir::new().unwrap();

        let repo = FileRepository::open(storage_path(&dir)).await.unwrap();

        assert!(repo.inner().is_empty());
    }

    #[tokio::test]
    async fn empty_file_is_first_run() {
        let dir = TempDir::new().unwrap();
        let path = storage_path(&dir);
        std::fs::write(&path, "").unwrap();

        let repo = FileRepository::open(&path).await.unwrap();

        assert!(repo.inner().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = storage_path(&dir);
        std::fs::write(&path, "{not json").unwrap();

        let err = FileRepository::open(&path).await.unwrap_err();

        assert!(matches!(err, StorageError::InvalidData(_)));
    }

    #[tokio::test]
    async fn create_rewrites_file_before_returning() {
        let dir = TempDir::new().unwrap();
        let path = storage_path(&dir);
        let repo = FileRepository::open(&path).await.unwrap();

        repo.create(record("b8da4f2d", "www.ya.ru")).await.unwrap();

        let on_disk: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get("b8da4f2d").map(String::as_str), Some("www.ya.ru"));
    }

    #[tokio::test]
    async fn records_survive_restart() {
        let dir = TempDir::new().unwrap();
        let path = storage_path(&dir);

        {
            let repo = FileRepository::open(&path).await.unwrap();
            repo.create(record("aaa", "https://a.example")).await.unwrap();
            repo.create(record("bbb", "https://b.example")).await.unwrap();
            repo.create(record("ccc", "https://c.example")).await.unwrap();
        }

        let reopened = FileRepository::open(&path).await.unwrap();

        assert_eq!(reopened.get(&code("aaa")).await.unwrap(), "https://a.example");
        assert_eq!(reopened.get(&code("bbb")).await.unwrap(), "https://b.example");
        assert_eq!(reopened.get(&code("ccc")).await.unwrap(), "https://c.example");
        assert_eq!(
            reopened.get_by_url("https://b.example").await.unwrap(),
            code("bbb")
        );
    }

    #[tokio::test]
    async fn failed_create_does_not_touch_file() {
        let dir = TempDir::new().unwrap();
        let path = storage_path(&dir);
        let repo = FileRepository::open(&path).await.unwrap();
        repo.create(record("abc", "https://a.example")).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        let err = repo
            .create(record("abc", "https://a.example"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::DuplicateKey(_)));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn partial_batch_is_persisted() {
        let dir = TempDir::new().unwrap();
        let path = storage_path(&dir);
        let repo = FileRepository::open(&path).await.unwrap();
        repo.create(record("taken", "https://taken.example")).await.unwrap();

        let result = repo
            .batch_create(vec![
                record("first", "https://first.example"),
                record("taken", "https://other.example"),
                record("last", "https://last.example"),
            ])
            .await;
        assert!(matches!(result, Err(StorageError::Collision { .. })));

        let reopened = FileRepository::open(&path).await.unwrap();
        assert!(reopened.get(&code("first")).await.is_ok());
        assert!(reopened.get(&code("last")).await.is_err());
    }

    #[tokio::test]
    async fn resubmitted_batch_is_accepted_and_persisted() {
        let dir = TempDir::new().unwrap();
        let path = storage_path(&dir);
        let repo = FileRepository::open(&path).await.unwrap();
        let batch = vec![
            record("b8da4f2d", "www.ya.ru"),
            record("b8da4f2d", "www.ya.ru"),
            record("other", "https://other.example"),
        ];

        repo.batch_create(batch.clone()).await.unwrap();
        repo.batch_create(batch).await.unwrap();

        let reopened = FileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.inner().len(), 2);
        assert_eq!(reopened.get(&code("other")).await.unwrap(), "https://other.example");
    }

    #[tokio::test]
    async fn unwritable_path_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let parent = dir.path().join("missing-dir");
        let path = parent.join("repo.json");
        let repo = FileRepository::open(&path).await.unwrap();

        let err = repo
            .create(record("b8da4f2d", "www.ya.ru"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Persistence(_)));
        assert!(repo.inner().is_empty());

        // once the directory exists the retry is a fresh, durable create
        std::fs::create_dir(&parent).unwrap();
        repo.create(record("b8da4f2d", "www.ya.ru")).await.unwrap();

        let reopened = FileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.get(&code("b8da4f2d")).await.unwrap(), "www.ya.ru");
    }

    #[tokio::test]
    async fn failed_batch_write_leaves_memory_untouched() {
        let dir = TempDir::new().unwrap();
        let parent = dir.path().join("missing-dir");
        let repo = FileRepository::open(parent.join("repo.json")).await.unwrap();

        let err = repo
            .batch_create(vec![
                record("one", "https://one.example"),
                record("two", "https://two.example"),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Persistence(_)));
        assert!(repo.inner().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_all_reach_disk() {
        let dir = TempDir::new().unwrap();
        let path = storage_path(&dir);
        let repo = std::sync::Arc::new(FileRepository::open(&path).await.unwrap());

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.create(record(&format!("c{i}"), &format!("https://e.example/{i}")))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = FileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.inner().len(), 32);
    }
}
