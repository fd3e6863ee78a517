//! Storage facade of the snip URL shortener.
//!
//! [`StorageService`] derives codes, recovers duplicate creates and bounds
//! every backend call with a timeout. [`DeletionQueue`] runs batch deletes
//! in the background so callers can answer before they finish.

pub mod deleter;
pub mod error;
pub mod service;

pub use deleter::DeletionQueue;
pub use error::QueueError;
pub use service::{CreateStatus, ServiceConfig, StorageService, DEFAULT_OPERATION_TIMEOUT};
