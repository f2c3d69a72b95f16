//! The responder thread: waits on completions and routes entries to their
//! owning worker's completed list (spec.md §4.4).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use loadutil::LoadError;
use tracing::{error, info, warn};

use crate::state::{LoaderState, MAX_CONSECUTIVE_CQE_ERRORS};

pub fn run(state: Arc<LoaderState>) {
    loop {
        wait_and_route(&state);
    }
}

/// Block for at least one completion, then route every available
/// completion to its owning queue's completed list. Split out of [`run`]
/// so tests can drive a single wait/route cycle deterministically.
pub fn wait_and_route(state: &LoaderState) {
    let completions: Vec<(u64, i32)> = {
        let mut ring = state.ring.lock().expect("ring mutex poisoned");
        if let Err(err) = ring.submit_and_wait(1) {
            error!(%err, "wait_cqe failed");
            return;
        }
        // Collect into an owned buffer before processing so the lock is
        // released quickly and entry pushes never happen while holding it.
        ring.completion().map(|cqe| (cqe.user_data(), cqe.result())).collect()
    };

    for (user_data, result) in completions {
        let (worker_id, idx) = LoaderState::decode_user_data(user_data);
        let queue = &state.queues[worker_id as usize];
        let entry = &queue.entries()[idx as usize];

        if result < 0 {
            let path = String::from_utf8_lossy(entry.path()).into_owned();
            let err = LoadError::CompletionFailed {
                path,
                source: std::io::Error::from_raw_os_error(-result),
            };
            let streak = state.record_cqe_error();
            warn!(worker_id, idx, streak, %err, "completion reported an error");
            if streak >= MAX_CONSECUTIVE_CQE_ERRORS {
                error!(streak, "too many consecutive completion errors, aborting loader");
                std::process::abort();
            }
            continue;
        }
        state.record_cqe_success();

        let fd = entry.fd.load(Ordering::Relaxed);
        if fd >= 0 {
            let _ = nix::unistd::close(fd);
        }
        entry.fd.store(-1, Ordering::Relaxed);

        queue.completed().push(queue.entries(), idx);
        info!(worker_id, idx, "request completed");
    }
}
