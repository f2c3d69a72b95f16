//! Process-wide loader state: the worker queues, the kernel submission
//! ring, and the reorder staging buffer (spec.md §2, §5).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use io_uring::IoUring;
use shmqueue::{Created, WorkerQueueShm};

use crate::config::LoaderConfig;
use crate::reorder::ReorderBuffer;

/// Owns every piece of process-wide loader state. Reader and responder
/// each hold an `Arc<LoaderState>` and touch only the parts they need.
///
/// The ring is wrapped in a `Mutex` rather than split unsynchronized
/// across the reader/responder threads: spec §5 explicitly allows this
/// ("a single-producer/single-consumer split... requires no additional
/// user-level lock if the underlying library permits this access
/// pattern; otherwise a dedicated ring lock must be added"). Locking is
/// held only across the `push_sqe`/`submit` or `submit_and_wait`/`completion`
/// calls themselves, never across the blocking I/O those calls wait on
/// in a way that would stall the other thread's unrelated progress.
pub struct LoaderState {
    pub config: LoaderConfig,
    pub queues: Vec<WorkerQueueShm<Created>>,
    pub ring: Mutex<IoUring>,
    pub reorder: Option<Mutex<ReorderBuffer>>,
    pub consecutive_cqe_errors: AtomicU32,
}

/// Loader aborts the process after this many consecutive completion
/// errors (spec.md §4.4, §7).
pub const MAX_CONSECUTIVE_CQE_ERRORS: u32 = 32;

impl LoaderState {
    pub fn new(config: LoaderConfig) -> anyhow::Result<Self> {
        let ring = IoUring::new(config.ring_entries)?;
        let mut queues = Vec::with_capacity(config.n_workers as usize);
        for worker_id in 0..config.n_workers {
            let name = config.queue_name(worker_id);
            let queue = WorkerQueueShm::<Created>::create(&name, worker_id, config.queue_depth)?;
            queues.push(queue);
        }

        let reorder = config
            .reorder
            .then(|| Mutex::new(ReorderBuffer::with_capacity(config.dispatch_n)));

        Ok(Self {
            config,
            queues,
            ring: Mutex::new(ring),
            reorder,
            consecutive_cqe_errors: AtomicU32::new(0),
        })
    }

    pub fn n_workers(&self) -> u32 {
        self.queues.len() as u32
    }

    /// Encode `(worker_id, entry_idx)` into an `io_uring` `user_data` value
    /// so the responder can route a completion back to its owning queue and
    /// slot without a side table.
    pub fn encode_user_data(worker_id: u32, entry_idx: u32) -> u64 {
        ((worker_id as u64) << 32) | entry_idx as u64
    }

    pub fn decode_user_data(user_data: u64) -> (u32, u32) {
        ((user_data >> 32) as u32, user_data as u32)
    }

    pub fn record_cqe_error(&self) -> u32 {
        self.consecutive_cqe_errors.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_cqe_success(&self) {
        self.consecutive_cqe_errors.store(0, Ordering::SeqCst);
    }
}
