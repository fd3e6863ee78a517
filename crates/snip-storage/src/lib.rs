//! Storage backends for the snip URL shortener.
//!
//! Three interchangeable implementations of the [`Repository`] contract:
//!
//! - [`InMemoryRepository`]: a concurrent map, lost on restart.
//! - [`FileRepository`]: the in-memory map plus a JSON file rewritten after
//!   every write.
//! - [`PostgresRepository`]: a `short_urls` table with soft deletes, batch
//!   deletes go through the [`DeletionPipeline`].
//!
//! [`StorageBackend`] picks one of them from a [`StorageConfig`].

pub mod backend;
pub mod config;
pub mod deletion;
pub mod file;
pub mod memory;
pub mod postgres;

pub use backend::StorageBackend;
pub use config::{StorageConfig, StorageMode};
pub use deletion::{DeletionPipeline, DeletionReport, SoftDeleter};
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use snip_core::{LinkRecord, ReadRepository, Repository, Result, StorageError, UserId};
