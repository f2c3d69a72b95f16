use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to attach to worker queue {0:?}: {1}")]
    Attach(String, #[source] shmqueue::ShmQueueError),

    #[error("failed to map completed entry's data for worker-side access: {0}")]
    Map(#[source] shmqueue::ShmQueueError),
}
