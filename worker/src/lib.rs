//! Library surface used by worker processes: non-blocking `try_request`,
//! `try_get`, and `release` over a queue segment created by the loader
//! (spec.md §4.2, §6).

pub mod api;
pub mod error;

pub use api::{LoadedEntry, WorkerQueue};
pub use error::WorkerError;
