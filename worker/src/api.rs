//! The worker-facing library surface: `try_request`, `try_get`, `release`
//! (spec.md §4.2, §6). Every operation here is non-blocking.

use std::sync::atomic::Ordering;

use shmqueue::{Attached, WorkerQueueShm};
use tracing::debug;

use crate::error::WorkerError;

/// A worker's attachment to its queue segment, created by the loader
/// before this process started.
pub struct WorkerQueue {
    shm: WorkerQueueShm<Attached>,
}

impl WorkerQueue {
    pub fn attach(name: &str) -> Result<Self, WorkerError> {
        let shm = WorkerQueueShm::<Attached>::attach(name)
            .map_err(|e| WorkerError::Attach(name.to_string(), e))?;
        Ok(Self { shm })
    }

    /// Pop one entry from `free`; if none, return `false`. Copy `path`
    /// (truncated at `MAX_PATH_LEN`, NUL-terminated) into the entry and push
    /// it to `ready`, per spec.md §4.2 — an over-long path is truncated,
    /// never rejected.
    pub fn try_request(&self, path: &[u8]) -> Result<bool, WorkerError> {
        let Some(idx) = self.shm.free().pop(self.shm.entries()) else {
            return Ok(false);
        };

        let entry = &self.shm.entries()[idx as usize];
        entry.set_path(path);
        self.shm.ready().push(self.shm.entries(), idx);
        Ok(true)
    }

    /// Racy empty check on `completed`; if apparently non-empty, pop under
    /// lock. On a successful pop, map the entry's shared-memory object for
    /// worker-side access. Returns `None` both when the list looked empty
    /// and when the subsequent pop raced and found nothing.
    pub fn try_get(&self) -> Result<Option<LoadedEntry<'_>>, WorkerError> {
        if self.shm.completed().is_probably_empty() {
            return Ok(None);
        }
        let Some(idx) = self.shm.completed().pop(self.shm.entries()) else {
            return Ok(None);
        };

        let entry = &self.shm.entries()[idx as usize];
        let shm_name = String::from_utf8_lossy(entry.shm_name()).into_owned();
        let size = entry.size.load(Ordering::Relaxed) as usize;

        let fd = shmqueue::shmobj::open_existing(&shm_name).map_err(WorkerError::Map)?;
        let ptr = unsafe { shmqueue::shmobj::map_rw(fd, size) }.map_err(WorkerError::Map)?;

        entry.shm_wfd.store(fd, Ordering::Relaxed);
        entry.shm_wdata.store(ptr as usize, Ordering::Relaxed);

        Ok(Some(LoadedEntry {
            queue: self,
            idx,
            shm_name,
            ptr,
            len: size,
        }))
    }

    fn release(&self, idx: u32) {
        self.shm.free().push(self.shm.entries(), idx);
    }
}

/// A completed request, mapped for worker-side reading. Dropping this
/// without calling [`LoadedEntry::release`] leaks the shared-memory
/// object and leaves the slot off every list; callers must always release.
pub struct LoadedEntry<'a> {
    queue: &'a WorkerQueue,
    idx: u32,
    shm_name: String,
    ptr: *mut u8,
    len: usize,
}

impl LoadedEntry<'_> {
    pub fn path(&self) -> Vec<u8> {
        self.queue.shm.entries()[self.idx as usize].path().to_vec()
    }

    pub fn size(&self) -> u64 {
        self.queue.shm.entries()[self.idx as usize]
            .size
            .load(Ordering::Relaxed)
    }

    /// The loaded bytes, mapped read/write into this worker's address
    /// space.
    pub fn data(&self) -> &[u8] {
        // Safety: `ptr`/`len` come from a live `mmap` established in
        // `try_get` and torn down only by `release`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Unlink the shared-memory object, close the worker-side descriptor,
    /// unmap the worker-side pointer, and return the entry to its owning
    /// worker's free list.
    pub fn release(self) {
        unsafe { shmqueue::shmobj::unmap(self.ptr, self.len) };
        let entry = &self.queue.shm.entries()[self.idx as usize];
        let fd = entry.shm_wfd.swap(-1, Ordering::Relaxed);
        if fd >= 0 {
            let _ = nix::unistd::close(fd);
        }
        if let Err(err) = shmqueue::shmobj::unlink(&self.shm_name) {
            debug!(name = %self.shm_name, %err, "shm_unlink on release failed, tolerated per spec §4.2");
        }
        entry.shm_wdata.store(0, Ordering::Relaxed);
        self.queue.release(self.idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shmqueue::Created;

    /// Stand in for the loader side of spec.md §4.3-§4.4: pop the ready
    /// entry a real `try_request` staged, write payload bytes into a fresh
    /// shared-memory object, and push the slot onto `completed` the way
    /// `loader::reader`/`loader::responder` would.
    fn fake_loader_complete(loader_side: &WorkerQueueShm<Created>, shm_name: &str, payload: &[u8]) {
        let idx = loader_side.ready().pop(loader_side.entries()).expect("ready entry");
        let entry = &loader_side.entries()[idx as usize];

        let fd = shmqueue::shmobj::create_sized(shm_name, payload.len(), false).unwrap();
        let ptr = unsafe { shmqueue::shmobj::map_rw(fd, payload.len()).unwrap() };
        unsafe { std::ptr::copy_nonoverlapping(payload.as_ptr(), ptr, payload.len()) };
        unsafe { shmqueue::shmobj::unmap(ptr, payload.len()) };
        nix::unistd::close(fd).unwrap();

        entry.set_shm_name(shm_name.as_bytes());
        entry.size.store(payload.len() as u64, Ordering::Relaxed);
        loader_side.completed().push(loader_side.entries(), idx);
    }

    #[test]
    fn request_get_release_round_trip_frees_the_slot() {
        let queue_name = format!("/worker-api-test-queue-{}", std::process::id());
        let shm_name = format!("/worker-api-test-data-{}", std::process::id());
        let loader_side = WorkerQueueShm::<Created>::create(&queue_name, 0, 1).unwrap();

        let worker = WorkerQueue::attach(&queue_name).unwrap();

        assert!(worker.try_request(b"/tmp/payload.bin").unwrap());
        // The slot is the only one this queue has; a second request must
        // report queue-full until the first is released.
        assert!(!worker.try_request(b"/tmp/other.bin").unwrap());

        fake_loader_complete(&loader_side, &shm_name, b"hello shared memory");

        let loaded = worker.try_get().unwrap().expect("completed entry available");
        assert_eq!(loaded.path(), b"/tmp/payload.bin");
        assert_eq!(loaded.size(), 19);
        assert_eq!(loaded.data(), b"hello shared memory");
        loaded.release();

        // Releasing frees the slot for a subsequent request.
        assert!(worker.try_request(b"/tmp/payload2.bin").unwrap());
    }
}
