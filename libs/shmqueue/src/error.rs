use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShmQueueError {
    #[error("shared memory object {0:?} not found (worker queue not yet created?)")]
    NotFound(String),

    #[error("shared memory object name {0:?} is not a valid C string")]
    InvalidName(String),

    #[error("attempted to map zero bytes of shared memory")]
    ZeroLengthMapping,

    #[error("queue header magic mismatch: segment is not an initialized worker queue")]
    BadMagic,

    #[error("shared memory operation on {0:?} failed: {1}")]
    Shm(String, #[source] nix::Error),

    #[error("timed out waiting for worker queue at {0:?} to finish initializing")]
    JoinTimeout(String),
}
