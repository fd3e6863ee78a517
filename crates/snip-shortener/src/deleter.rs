use crate::error::QueueError;
use crate::service::StorageService;
use snip_core::{Repository, ShortCode, ShortCodeCalculator, UserId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug)]
struct DeletionRequest {
    user_id: UserId,
    codes: Vec<ShortCode>,
}

/// Runs batch deletes on a background task.
///
/// [`DeletionQueue::enqueue`] returns as soon as the request is queued, so a
/// transport can acknowledge before the delete happens. Requests run one
/// after another; failures are logged and never reach the caller.
#[derive(Debug)]
pub struct DeletionQueue {
    sender: mpsc::UnboundedSender<DeletionRequest>,
    worker: JoinHandle<usize>,
}

impl DeletionQueue {
    pub fn spawn<R, C>(service: StorageService<R, C>) -> Self
    where
        R: Repository,
        C: ShortCodeCalculator,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<DeletionRequest>();

        let worker = tokio::spawn(async move {
            let mut processed = 0;
            while let Some(request) = receiver.recv().await {
                let requested = request.codes.len();
                match service.batch_delete(request.user_id, request.codes).await {
                    Ok(()) => {
                        info!(user_id = %request.user_id, requested, "batch delete finished")
                    }
                    Err(e) => {
                        error!(user_id = %request.user_id, requested, error = %e, "batch delete failed")
                    }
                }
                processed += 1;
            }
            processed
        });

        Self { sender, worker }
    }

    /// Queues a delete of `codes` owned by `user_id`.
    pub fn enqueue(&self, user_id: UserId, codes: Vec<ShortCode>) -> Result<(), QueueError> {
        self.sender
            .send(DeletionRequest { user_id, codes })
            .map_err(|_| QueueError::Closed)
    }

    /// Stops accepting requests and waits until every queued one has run.
    ///
    /// Returns the number of requests processed over the queue's lifetime.
    pub async fn shutdown(self) -> Result<usize, QueueError> {
        let Self { sender, worker } = self;
        drop(sender);

        let processed = worker
            .await
            .map_err(|e| QueueError::Worker(e.to_string()))?;
        info!(processed, "deletion queue drained");
        Ok(processed)
    }
}
