use std::time::Duration;

use snip_core::ShortCode;
use snip_storage::postgres::ensure_schema;
use snip_storage::{
    DeletionPipeline, LinkRecord, PostgresRepository, ReadRepository, Repository, StorageBackend,
    StorageConfig, StorageError, StorageMode, UserId,
};
use snip_test_infra::postgres::{PostgresConfig, PostgresServer};

struct Fixture {
    _postgres: PostgresServer,
    url: String,
    repo: PostgresRepository,
}

impl Fixture {
    /// Starts an empty database; the schema is created by `connect`.
    async fn start() -> Self {
        let postgres = PostgresServer::new(PostgresConfig::builder().build())
            .await
            .expect("start postgres");
        let url = postgres.database_url().await.expect("postgres url");
        let repo = connect_with_retry(&url).await;

        Self {
            _postgres: postgres,
            url,
            repo,
        }
    }
}

async fn connect_with_retry(url: &str) -> PostgresRepository {
    let mut last_error = None;

    for _ in 0..20 {
        match PostgresRepository::connect(url, DeletionPipeline::default()).await {
            Ok(repo) => return repo,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

fn code(value: &str) -> ShortCode {
    ShortCode::new_unchecked(value)
}

fn owned(c: &str, url: &str, user: i32) -> LinkRecord {
    LinkRecord::new(code(c), url, Some(UserId::new(user)))
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn create_and_get() {
    let fixture = Fixture::start().await;

    fixture
        .repo
        .create(LinkRecord::new(code("b8da4f2d"), "www.ya.ru", None))
        .await
        .unwrap();

    assert_eq!(fixture.repo.get(&code("b8da4f2d")).await.unwrap(), "www.ya.ru");
    assert_eq!(
        fixture.repo.get_by_url("www.ya.ru").await.unwrap(),
        code("b8da4f2d")
    );
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn missing_code_and_url_are_not_found() {
    let fixture = Fixture::start().await;

    assert!(matches!(
        fixture.repo.get(&code("nope")).await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        fixture.repo.get_by_url("https://nope.example").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn duplicate_code_or_url_is_duplicate_key() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .create(owned("abc", "https://a.example", 1))
        .await
        .unwrap();

    let same_code = fixture
        .repo
        .create(owned("abc", "https://other.example", 1))
        .await;
    let same_url = fixture
        .repo
        .create(owned("xyz", "https://a.example", 2))
        .await;

    assert!(matches!(same_code, Err(StorageError::DuplicateKey(_))));
    assert!(matches!(same_url, Err(StorageError::DuplicateKey(_))));
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn urls_lists_only_the_owner_in_insertion_order() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .batch_create(vec![
            owned("zzz", "https://z.example", 7),
            owned("aaa", "https://a.example", 7),
            owned("mmm", "https://m.example", 8),
        ])
        .await
        .unwrap();

    let links = fixture.repo.urls(UserId::new(7)).await.unwrap();

    let codes: Vec<_> = links.iter().map(|l| l.short_code.as_str()).collect();
    assert_eq!(codes, vec!["zzz", "aaa"]);
    assert!(links.iter().all(|l| l.user_id == Some(UserId::new(7))));
    assert!(fixture.repo.urls(UserId::new(9)).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn failed_batch_rolls_back_every_row() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .create(owned("dup", "https://dup.example", 1))
        .await
        .unwrap();

    let result = fixture
        .repo
        .batch_create(vec![
            owned("first", "https://first.example", 1),
            owned("dup", "https://dup.example", 1),
        ])
        .await;

    assert!(matches!(result, Err(StorageError::DuplicateKey(_))));
    assert!(matches!(
        fixture.repo.get(&code("first")).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn batch_delete_marks_owned_rows_gone() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .batch_create(vec![
            owned("one", "https://one.example", 1),
            owned("two", "https://two.example", 1),
            owned("keep", "https://keep.example", 1),
        ])
        .await
        .unwrap();

    fixture
        .repo
        .batch_delete(UserId::new(1), vec![code("one"), code("two"), code("absent")])
        .await
        .unwrap();

    assert!(matches!(
        fixture.repo.get(&code("one")).await,
        Err(StorageError::Gone(_))
    ));
    assert!(matches!(
        fixture.repo.get(&code("two")).await,
        Err(StorageError::Gone(_))
    ));
    assert_eq!(
        fixture.repo.get(&code("keep")).await.unwrap(),
        "https://keep.example"
    );

    let remaining = fixture.repo.urls(UserId::new(1)).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].short_code, code("keep"));
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn batch_delete_ignores_codes_of_other_users() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .create(owned("mine", "https://mine.example", 1))
        .await
        .unwrap();

    fixture
        .repo
        .batch_delete(UserId::new(2), vec![code("mine")])
        .await
        .unwrap();

    assert_eq!(
        fixture.repo.get(&code("mine")).await.unwrap(),
        "https://mine.example"
    );
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn ping_and_schema_check_are_idempotent() {
    let fixture = Fixture::start().await;

    assert!(fixture.repo.ping().await);
    ensure_schema(fixture.repo.pool()).await.unwrap();

    fixture.repo.close().await;
    assert!(!fixture.repo.ping().await);
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn failed_rows_do_not_undo_the_rest_of_a_batch_delete() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .batch_create(vec![
            owned("one", "https://one.example", 1),
            owned("two", "https://two.example", 1),
        ])
        .await
        .unwrap();

    // postgres rejects NUL bytes in text parameters, so this row fails
    fixture
        .repo
        .batch_delete(
            UserId::new(1),
            vec![code("one"), code("bad\0code"), code("two")],
        )
        .await
        .unwrap();

    assert!(matches!(
        fixture.repo.get(&code("one")).await,
        Err(StorageError::Gone(_))
    ));
    assert!(matches!(
        fixture.repo.get(&code("two")).await,
        Err(StorageError::Gone(_))
    ));
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn backend_opens_database_mode_from_config() {
    let fixture = Fixture::start().await;
    let config = StorageConfig::builder()
        .mode(StorageMode::Database)
        .database_dsn(Some(fixture.url.clone()))
        .build();

    let backend = StorageBackend::open(&config).await.unwrap();
    backend
        .create(LinkRecord::new(code("b8da4f2d"), "www.ya.ru", None))
        .await
        .unwrap();

    assert_eq!(backend.mode(), StorageMode::Database);
    assert_eq!(fixture.repo.get(&code("b8da4f2d")).await.unwrap(), "www.ya.ru");
    backend.close().await;
}
