use crate::deletion::{DeletionPipeline, SoftDeleter};
use async_trait::async_trait;
use snip_core::{LinkRecord, ReadRepository, Repository, Result, ShortCode, StorageError, UserId};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, PgConnection, Postgres, Row, Transaction};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

const TABLE: &str = "short_urls";

const SCHEMA_DDL: &str = include_str!("../ddl/postgres/short_urls.sql");

const INSERT_SQL: &str = r#"
    INSERT INTO short_urls (user_id, short_url, url)
    VALUES ($1, $2, $3)
"#;

const SOFT_DELETE_SQL: &str = r#"
    UPDATE short_urls
    SET is_deleted = TRUE
    WHERE user_id = $1
      AND short_url = $2
"#;

/// PostgreSQL implementation of the repository contract.
///
/// Both `short_url` and `url` carry their own unique constraint. Deletes are
/// soft: `is_deleted` is set and reads report [`StorageError::Gone`]. Batch
/// creates and batch deletes each run in exactly one transaction.
#[derive(Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    pipeline: DeletionPipeline,
    shutdown: watch::Sender<bool>,
}

impl PostgresRepository {
    /// Creates a repository from an existing connection pool.
    ///
    /// The schema is not checked; see [`PostgresRepository::connect`].
    pub fn new(pool: PgPool, pipeline: DeletionPipeline) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pool,
            pipeline,
            shutdown,
        }
    }

    /// Opens a connection pool and creates the schema if it is missing.
    pub async fn connect(database_url: &str, pipeline: DeletionPipeline) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        ensure_schema(&pool).await?;
        Ok(Self::new(pool, pipeline))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cancels running deletion pipelines and closes the pool.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        self.pool.close().await;
    }
}

/// Creates the `short_urls` table when the catalog does not know it yet.
///
/// Two processes running this concurrently against an empty database can
/// both see the table missing; the slower `CREATE TABLE` then fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    let existing = sqlx::query("SELECT schemaname FROM pg_stat_user_tables WHERE relname = $1")
        .bind(TABLE)
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx_error)?;

    if existing.is_some() {
        debug!(table = TABLE, "schema already present");
        return Ok(());
    }

    info!(table = TABLE, "creating schema");
    sqlx::query(SCHEMA_DDL)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn map_insert_error(err: sqlx::Error, code: &ShortCode) -> StorageError {
    if is_unique_violation(&err) {
        StorageError::DuplicateKey(code.to_string())
    } else {
        map_sqlx_error(err)
    }
}

async fn insert(conn: &mut PgConnection, record: &LinkRecord) -> Result<()> {
    sqlx::query(INSERT_SQL)
        .bind(record.user_id.map(UserId::get))
        .bind(record.short_code.as_str())
        .bind(record.original_url.as_str())
        .execute(conn)
        .await
        .map_err(|e| map_insert_error(e, &record.short_code))?;
    Ok(())
}

/// Runs the soft-delete statement for pipeline workers on one shared
/// transaction. sqlx keeps the prepared statement cached on the connection.
///
/// Every row runs inside its own savepoint: a failed statement would
/// otherwise abort the whole transaction and turn the final commit into a
/// rollback.
struct TransactionDeleter {
    tx: Mutex<Transaction<'static, Postgres>>,
}

#[async_trait]
impl SoftDeleter for TransactionDeleter {
    async fn soft_delete(&self, user_id: UserId, code: &ShortCode) -> Result<u64> {
        let mut tx = self.tx.lock().await;
        let conn: &mut PgConnection = &mut **tx;
        let mut savepoint = conn.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(SOFT_DELETE_SQL)
            .bind(user_id.get())
            .bind(code.as_str())
            .execute(&mut *savepoint)
            .await;

        match result {
            Ok(done) => {
                savepoint.commit().await.map_err(map_sqlx_error)?;
                Ok(done.rows_affected())
            }
            Err(e) => {
                savepoint.rollback().await.map_err(map_sqlx_error)?;
                Err(map_sqlx_error(e))
            }
        }
    }
}

#[async_trait]
impl ReadRepository for PostgresRepository {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT url, is_deleted
            FROM short_urls
            WHERE short_url = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if is_deleted {
            return Err(StorageError::Gone(code.to_string()));
        }

        row.try_get("url").map_err(map_sqlx_error)
    }

    async fn get_by_url(&self, url: &str) -> Result<ShortCode> {
        let row = sqlx::query(
            r#"
            SELECT short_url
            FROM short_urls
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(url.to_string()));
        };

        let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
        Ok(ShortCode::new_unchecked(short_url))
    }

    async fn urls(&self, user_id: UserId) -> Result<Vec<LinkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT short_url, url
            FROM short_urls
            WHERE user_id = $1
              AND is_deleted = FALSE
            ORDER BY id
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
                let url: String = row.try_get("url").map_err(map_sqlx_error)?;
                Ok(LinkRecord::new(
                    ShortCode::new_unchecked(short_url),
                    url,
                    Some(user_id),
                ))
            })
            .collect()
    }

    async fn ping(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "database ping failed");
                false
            }
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create(&self, record: LinkRecord) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        insert(&mut conn, &record).await
    }

    async fn batch_create(&self, records: Vec<LinkRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for record in &records {
            if let Err(e) = insert(&mut tx, record).await {
                debug!(code = %record.short_code, error = %e, "batch insert failed, rolling back");
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "batch rollback failed");
                }
                return Err(e);
            }
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    /// Soft-deletes the codes owned by `user_id` in one transaction.
    ///
    /// Rows whose statement fails are rolled back to their savepoint and
    /// skipped; the remaining rows are committed.
    async fn batch_delete(&self, user_id: UserId, codes: Vec<ShortCode>) -> Result<()> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let deleter = Arc::new(TransactionDeleter { tx: Mutex::new(tx) });

        let report = self
            .pipeline
            .run(
                Arc::clone(&deleter),
                user_id,
                codes,
                self.shutdown.subscribe(),
            )
            .await;

        let Ok(deleter) = Arc::try_unwrap(deleter) else {
            return Err(StorageError::Operation(
                "deletion workers still hold the transaction".to_string(),
            ));
        };
        let tx = deleter.tx.into_inner();

        if report.cancelled {
            warn!(user_id = %user_id, "batch delete cancelled, rolling back");
            return tx.rollback().await.map_err(map_sqlx_error);
        }

        // Committed even when some rows failed; those rows are only logged.
        tx.commit().await.map_err(map_sqlx_error)?;
        if report.failed > 0 {
            warn!(
                user_id = %user_id,
                failed = report.failed,
                "batch delete skipped failed rows"
            );
        }
        info!(
            user_id = %user_id,
            requested = report.requested,
            deleted = report.deleted,
            failed = report.failed,
            "batch delete committed"
        );
        Ok(())
    }
}
