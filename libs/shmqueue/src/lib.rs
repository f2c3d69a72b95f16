//! Shared-memory FIFO request/response queues between a loader process and
//! its worker processes.
//!
//! A [`queue::WorkerQueueShm`] is a named shared-memory segment holding a
//! fixed array of [`entry::Entry`] slots threaded onto three
//! [`list::FifoList`]s: free, ready, and completed. Workers push filepath
//! requests onto `ready`; the loader process pops them, performs the I/O,
//! and pushes the same slot onto `completed`. All list links are indices,
//! not pointers, so the segment means the same thing in every process that
//! attaches to it.

pub mod entry;
pub mod error;
pub mod list;
pub mod queue;
pub mod shmobj;
pub mod spinlock;

pub use entry::{round_up_size, Entry, MAX_PATH_LEN, NIL, SIZE_ROUND};
pub use error::ShmQueueError;
pub use list::FifoList;
pub use queue::{Attached, Created, WorkerQueueShm};
pub use spinlock::RawSpinlock;
