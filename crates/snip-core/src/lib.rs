//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the types shared by the storage backends and the
//! storage service: short codes and how they are calculated, link records,
//! the repository contract and the storage error taxonomy.

pub mod batch;
pub mod calculator;
pub mod error;
pub mod repository;
pub mod shortcode;

pub use batch::{BatchItem, BatchResult};
pub use calculator::{Crc32Calculator, ShortCodeCalculator};
pub use error::{Result, StorageError};
pub use repository::{LinkRecord, ReadRepository, Repository, UserId};
pub use shortcode::ShortCode;
