use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("deletion queue is closed")]
    Closed,
    #[error("deletion worker failed: {0}")]
    Worker(String),
}
