//! The reader thread: round-robins worker queues, drains ready requests,
//! and submits reads into the kernel ring (spec.md §4.3).

use std::os::unix::io::RawFd;
use std::sync::Arc;

use io_uring::{opcode, types};
use loadutil::LoadError;
use shmqueue::shmobj;
use shmqueue::round_up_size;
use tracing::{debug, warn};

use crate::reorder::StagedRequest;
use crate::state::LoaderState;

pub fn run(state: Arc<LoaderState>) {
    let n_workers = state.n_workers();
    let mut worker_cursor: u32 = 0;
    let mut idle_streak: u32 = 0;

    loop {
        let worker_id = worker_cursor;
        worker_cursor = (worker_cursor + 1) % n_workers;

        if visit_one(&state, worker_id) {
            idle_streak = 0;
        } else {
            idle_streak += 1;
            if idle_streak > n_workers {
                std::thread::yield_now();
            }
        }
    }
}

/// One round-robin visit to `worker_id`'s ready list: pop at most one
/// entry and drive it through the direct or reorder-staging path.
/// Returns `true` if a request was found (whether or not it was fully
/// submitted), `false` if the list was empty. Split out of [`run`] so
/// tests can drive individual visits deterministically.
pub fn visit_one(state: &LoaderState, worker_id: u32) -> bool {
    let queue = &state.queues[worker_id as usize];
    let Some(idx) = queue.ready().pop(queue.entries()) else {
        if let Some(reorder) = &state.reorder {
            let mut buf = reorder.lock().expect("reorder buffer poisoned");
            buf.note_idle();
            if buf.should_dispatch(state.config.max_idle_iters, state.n_workers()) {
                dispatch_batch(state, buf.take_sorted());
            }
        }
        return false;
    };

    if state.reorder.is_some() {
        stage_for_reorder(state, worker_id, idx);
    } else if let Err(err) = prepare_and_submit(state, worker_id, idx) {
        warn!(worker_id, idx, error = %err, "direct submission failed, requeued");
    }
    true
}

/// Steps 3-8 of spec.md §4.3, run back-to-back (the direct, non-reorder
/// path).
fn prepare_and_submit(state: &LoaderState, worker_id: u32, idx: u32) -> Result<(), LoadError> {
    let queue = &state.queues[worker_id as usize];
    let entry = &queue.entries()[idx as usize];

    let path_bytes = entry.path().to_vec();
    let path = String::from_utf8_lossy(&path_bytes).into_owned();

    let fd = match open_for_read(state, &path) {
        Ok(fd) => fd,
        Err(source) => {
            queue.ready().push(queue.entries(), idx);
            return Err(LoadError::Open { path, source });
        }
    };

    unmap_stale(entry);

    if let Err(err) = finish_setup_and_submit(state, worker_id, idx, &path, fd) {
        let _ = nix::unistd::close(fd);
        queue.ready().push(queue.entries(), idx);
        return Err(err);
    }

    Ok(())
}

/// Steps 3 and 6: open the file and take an extent-map hint, then stage
/// the request for later reordering. Keeps `fd` open across the staging
/// period and records it on the entry so a failed re-dispatch can close
/// it instead of leaking (spec.md §9, Open Question #3).
fn stage_for_reorder(state: &LoaderState, worker_id: u32, idx: u32) {
    let queue = &state.queues[worker_id as usize];
    let entry = &queue.entries()[idx as usize];
    let path_bytes = entry.path().to_vec();
    let path = String::from_utf8_lossy(&path_bytes).into_owned();

    let fd = match open_for_read(state, &path) {
        Ok(fd) => fd,
        Err(source) => {
            warn!(worker_id, idx, %path, %source, "open failed, requeued");
            queue.ready().push(queue.entries(), idx);
            return;
        }
    };

    let lba = loadutil::first_extent_physical_offset(fd).unwrap_or(0);
    entry.fd.store(fd, std::sync::atomic::Ordering::Relaxed);
    entry.lba.store(lba, std::sync::atomic::Ordering::Relaxed);

    let reorder = state.reorder.as_ref().expect("reorder enabled by caller");
    let mut buf = reorder.lock().expect("reorder buffer poisoned");
    buf.stage(StagedRequest {
        worker_id,
        entry_idx: idx,
        lba,
    });
    if buf.should_dispatch(state.config.max_idle_iters, state.n_workers()) {
        let batch = buf.take_sorted();
        drop(buf);
        dispatch_batch(state, batch);
    }
}

/// Steps 4-8 of spec.md §4.3 for a batch of staged, already-opened,
/// LBA-sorted requests (spec.md §4.6).
fn dispatch_batch(state: &LoaderState, batch: Vec<StagedRequest>) {
    for req in batch {
        let queue = &state.queues[req.worker_id as usize];
        let entry = &queue.entries()[req.entry_idx as usize];
        let fd = entry.fd.load(std::sync::atomic::Ordering::Relaxed);

        let path_bytes = entry.path().to_vec();
        let path = String::from_utf8_lossy(&path_bytes).into_owned();

        unmap_stale(entry);

        if let Err(err) = finish_setup_and_submit(state, req.worker_id, req.entry_idx, &path, fd) {
            warn!(worker_id = req.worker_id, idx = req.entry_idx, %err, "reordered submission failed, requeued");
            let _ = nix::unistd::close(fd);
            queue.ready().push(queue.entries(), req.entry_idx);
        }
    }
}

fn open_for_read(state: &LoaderState, path: &str) -> Result<RawFd, std::io::Error> {
    let flags = state.config.open_flags();
    let fd = nix::fcntl::open(path, flags, nix::sys::stat::Mode::empty())
        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
    Ok(fd)
}

fn unmap_stale(entry: &shmqueue::Entry) {
    if entry.is_loader_mapped() {
        let ptr = entry.shm_ldata.load(std::sync::atomic::Ordering::Relaxed) as *mut u8;
        let len = entry.size.load(std::sync::atomic::Ordering::Relaxed) as usize;
        unsafe { shmobj::unmap(ptr, len) };
        let shm_lfd = entry.shm_lfd.load(std::sync::atomic::Ordering::Relaxed);
        if shm_lfd >= 0 {
            let _ = nix::unistd::close(shm_lfd);
        }
        entry.set_loader_mapped(false);
        debug!("unmapped stale loader-side mapping before reuse");
    }
}

/// Steps 5, 6 (if not already done), 7, and 8: size query, shm object
/// creation, and ring submission.
fn finish_setup_and_submit(
    state: &LoaderState,
    worker_id: u32,
    idx: u32,
    path: &str,
    fd: RawFd,
) -> Result<(), LoadError> {
    let queue = &state.queues[worker_id as usize];
    let entry = &queue.entries()[idx as usize];

    let raw_size = loadutil::query_size(fd).map_err(|e| LoadError::Stat {
        path: path.to_string(),
        source: std::io::Error::from_raw_os_error(e as i32),
    })?;

    if raw_size > state.config.max_file_size {
        return Err(LoadError::FileTooLarge {
            path: path.to_string(),
            size: raw_size,
            limit: state.config.max_file_size,
        });
    }
    let size = round_up_size(raw_size);
    entry.size.store(size, std::sync::atomic::Ordering::Relaxed);

    if entry.lba.load(std::sync::atomic::Ordering::Relaxed) == 0 {
        let lba = loadutil::first_extent_physical_offset(fd).unwrap_or(0);
        entry.lba.store(lba, std::sync::atomic::Ordering::Relaxed);
    }

    let shm_name = loadutil::derive_shm_name(worker_id, idx, state.config.shm_namespace.as_deref());
    let shm_fd = shmobj::create_sized(&shm_name, size as usize, false).map_err(|e| LoadError::ShmCreate {
        path: path.to_string(),
        name: shm_name.clone(),
        source: match e {
            shmqueue::ShmQueueError::Shm(_, inner) => inner,
            _ => nix::Error::EIO,
        },
    })?;
    let shm_ptr = match unsafe { shmobj::map_rw(shm_fd, size as usize) } {
        Ok(ptr) => ptr,
        Err(e) => {
            let _ = nix::unistd::close(shm_fd);
            let _ = shmobj::unlink(&shm_name);
            return Err(LoadError::ShmCreate {
                path: path.to_string(),
                name: shm_name.clone(),
                source: match e {
                    shmqueue::ShmQueueError::Shm(_, inner) => inner,
                    _ => nix::Error::EIO,
                },
            });
        }
    };

    entry.set_shm_name(shm_name.as_bytes());
    entry.shm_lfd.store(shm_fd, std::sync::atomic::Ordering::Relaxed);
    entry
        .shm_ldata
        .store(shm_ptr as usize, std::sync::atomic::Ordering::Relaxed);
    entry.set_loader_mapped(true);
    entry.fd.store(fd, std::sync::atomic::Ordering::Relaxed);

    let user_data = LoaderState::encode_user_data(worker_id, idx);
    let read_e = opcode::Read::new(types::Fd(fd), shm_ptr, size as u32)
        .offset(0)
        .build()
        .user_data(user_data);

    let mut ring = state.ring.lock().expect("ring mutex poisoned");
    unsafe {
        while ring.submission().push(&read_e).is_err() {
            ring.submit().map_err(|source| LoadError::SubmitFailed {
                path: path.to_string(),
                source,
            })?;
        }
    }
    ring.submit().map_err(|source| LoadError::SubmitFailed {
        path: path.to_string(),
        source,
    })?;

    Ok(())
}
