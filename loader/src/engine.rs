//! Thread spawning for the reader and responder, in the teacher's
//! catch-unwind-then-decide-to-exit shape (`task_mgr::task_wrapper`).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info_span};

use crate::state::LoaderState;
use crate::{reader, responder};

/// Spawn the reader and responder threads. `start` never returns on
/// success; a panicking thread aborts the process rather than leaving the
/// loader half-alive with only one side of the ring being serviced.
pub fn start(state: Arc<LoaderState>) -> ! {
    let reader_handle = spawn_named("reader", {
        let state = Arc::clone(&state);
        move || reader::run(state)
    });
    let responder_handle = spawn_named("responder", {
        let state = Arc::clone(&state);
        move || responder::run(state)
    });

    // Either thread returning at all is itself abnormal: both `run` loops
    // are infinite. Block on whichever exits first and abort.
    join_or_abort("reader", reader_handle);
    join_or_abort("responder", responder_handle);
    unreachable!("both loader threads run forever; one must have aborted first")
}

fn spawn_named<F>(name: &'static str, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let span = info_span!("loader_thread", name);
            let _enter = span.enter();
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "<non-string panic payload>".to_string());
                error!(thread = name, panic = %msg, "loader thread panicked");
                std::process::abort();
            }
        })
        .expect("failed to spawn loader thread")
}

fn join_or_abort(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!(thread = name, "loader thread exited via panic");
    } else {
        error!(thread = name, "loader thread returned unexpectedly");
    }
    std::process::abort();
}
