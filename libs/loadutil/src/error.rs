use thiserror::Error;

/// Failure modes the loader can attach to a completed request (spec.md
/// §7). These travel back to the worker as the entry's outcome, not as a
/// process-level panic: a single bad request must never take down the
/// loader or another worker's in-flight request.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("open {path:?} failed: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stat {path:?} failed: {source}")]
    Stat {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?} is {size} bytes, exceeding the configured max_file_size of {limit} bytes")]
    FileTooLarge {
        path: String,
        size: u64,
        limit: u64,
    },

    #[error("submitting read for {path:?} to io_uring failed: {source}")]
    SubmitFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io_uring completion for {path:?} reported an error: {source}")]
    CompletionFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create shared memory object {name:?} for {path:?}: {source}")]
    ShmCreate {
        path: String,
        name: String,
        #[source]
        source: nix::Error,
    },
}

impl LoadError {
    pub fn path(&self) -> &str {
        match self {
            LoadError::Open { path, .. }
            | LoadError::Stat { path, .. }
            | LoadError::FileTooLarge { path, .. }
            | LoadError::SubmitFailed { path, .. }
            | LoadError::CompletionFailed { path, .. }
            | LoadError::ShmCreate { path, .. } => path,
        }
    }
}
