//! The per-slot request/response record, shared between the loader and
//! exactly one worker process.
//!
//! `prev`/`next` are indices into the owning `WorkerQueue`'s entry array,
//! not pointers: workers attach to the queue's shared-memory segment
//! independently rather than inheriting it across `fork()`, so a pointer
//! computed in one process's address space would be meaningless in
//! another's.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Longest filepath this loader will accept, matching `spec.md` §3.
pub const MAX_PATH_LEN: usize = 128;
/// Storage for `path`: `MAX_PATH_LEN` bytes plus a NUL terminator.
pub const PATH_STORAGE_LEN: usize = MAX_PATH_LEN + 1;
/// Storage for `shm_name`: a leading `/`, up to `MAX_PATH_LEN` transformed
/// path bytes, and a NUL terminator.
pub const SHM_NAME_STORAGE_LEN: usize = MAX_PATH_LEN + 2;

/// Sentinel for "no entry" in an index-based list link.
pub const NIL: u32 = u32::MAX;

/// Reads are rounded up to this boundary (see `spec.md` §4.3 rationale).
pub const SIZE_ROUND: u64 = 4096;

/// One request/response slot. `#[repr(C)]` because its layout is shared
/// between the loader and worker binaries (and must be stable across
/// rebuilds of either side of the shared-memory segment).
#[repr(C)]
pub struct Entry {
    pub(crate) prev: AtomicU32,
    pub(crate) next: AtomicU32,

    /// Worker id owning this entry's containing `WorkerQueue`. Folded into
    /// `io_uring` completion `user_data` so the responder can route a
    /// completion back to the right queue without a side table.
    pub owner: AtomicU32,

    /// Loader-side file descriptor; meaningful only while I/O is in flight.
    pub fd: AtomicI32,
    /// Bytes to read, already rounded up to `SIZE_ROUND`.
    pub size: AtomicU64,
    /// Physical block address of the first extent; 0 if unavailable.
    pub lba: AtomicU64,

    pub shm_lfd: AtomicI32,
    pub shm_ldata: AtomicUsize,
    shm_lmapped: AtomicU32,

    pub shm_wfd: AtomicI32,
    pub shm_wdata: AtomicUsize,

    path_len: AtomicU32,
    path: UnsafeCell<[u8; PATH_STORAGE_LEN]>,

    shm_name_len: AtomicU32,
    shm_name: UnsafeCell<[u8; SHM_NAME_STORAGE_LEN]>,
}

// Safety: `path`/`shm_name` are only ever written by the party that
// currently owns the entry (the list it sits on, or the kernel / worker
// holding it off-list per the ownership model in spec.md §3), never by
// two parties at once.
unsafe impl Sync for Entry {}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

impl Entry {
    /// Build a fresh, idle entry. Used when laying out a new queue segment
    /// and in tests; never called on an entry that's already part of a list.
    pub fn new() -> Self {
        Self {
            prev: AtomicU32::new(NIL),
            next: AtomicU32::new(NIL),
            owner: AtomicU32::new(0),
            fd: AtomicI32::new(-1),
            size: AtomicU64::new(0),
            lba: AtomicU64::new(0),
            shm_lfd: AtomicI32::new(-1),
            shm_ldata: AtomicUsize::new(0),
            shm_lmapped: AtomicU32::new(0),
            shm_wfd: AtomicI32::new(-1),
            shm_wdata: AtomicUsize::new(0),
            path_len: AtomicU32::new(0),
            path: UnsafeCell::new([0; PATH_STORAGE_LEN]),
            shm_name_len: AtomicU32::new(0),
            shm_name: UnsafeCell::new([0; SHM_NAME_STORAGE_LEN]),
        }
    }

    /// Reset an already-placed entry back to idle. Used only during queue
    /// creation, before any list link is meaningful.
    pub fn init_idle(&self) {
        self.prev.store(NIL, Ordering::Relaxed);
        self.next.store(NIL, Ordering::Relaxed);
        self.owner.store(0, Ordering::Relaxed);
        self.fd.store(-1, Ordering::Relaxed);
        self.size.store(0, Ordering::Relaxed);
        self.lba.store(0, Ordering::Relaxed);
        self.shm_lfd.store(-1, Ordering::Relaxed);
        self.shm_ldata.store(0, Ordering::Relaxed);
        self.shm_lmapped.store(0, Ordering::Relaxed);
        self.shm_wfd.store(-1, Ordering::Relaxed);
        self.shm_wdata.store(0, Ordering::Relaxed);
        self.path_len.store(0, Ordering::Relaxed);
        self.shm_name_len.store(0, Ordering::Relaxed);
    }

    pub fn is_loader_mapped(&self) -> bool {
        self.shm_lmapped.load(Ordering::Acquire) != 0
    }

    pub fn set_loader_mapped(&self, mapped: bool) {
        self.shm_lmapped
            .store(mapped as u32, Ordering::Release);
    }

    /// Copy `bytes` in as the entry's path, truncated to `MAX_PATH_LEN`
    /// and NUL-terminated in storage, per spec.md §4.2.
    pub fn set_path(&self, bytes: &[u8]) {
        let len = bytes.len().min(MAX_PATH_LEN);
        // Safety: sole owner of this entry at this point in the protocol.
        let storage = unsafe { &mut *self.path.get() };
        storage[..len].copy_from_slice(&bytes[..len]);
        storage[len] = 0;
        self.path_len.store(len as u32, Ordering::Release);
    }

    pub fn path(&self) -> &[u8] {
        let len = self.path_len.load(Ordering::Acquire) as usize;
        // Safety: readers only observe `path` after `set_path` happened-before
        // via the list spinlock release/acquire pair on the transition that
        // made this entry visible to them.
        let storage = unsafe { &*self.path.get() };
        &storage[..len]
    }

    pub fn set_shm_name(&self, bytes: &[u8]) {
        let len = bytes.len().min(SHM_NAME_STORAGE_LEN - 1);
        let storage = unsafe { &mut *self.shm_name.get() };
        storage[..len].copy_from_slice(&bytes[..len]);
        storage[len] = 0;
        self.shm_name_len.store(len as u32, Ordering::Release);
    }

    pub fn shm_name(&self) -> &[u8] {
        let len = self.shm_name_len.load(Ordering::Acquire) as usize;
        let storage = unsafe { &*self.shm_name.get() };
        &storage[..len]
    }
}

/// Round `size` up to the next `SIZE_ROUND`-byte boundary. A zero-byte file
/// still gets one full page, per spec.md §8's zero-size boundary case.
pub fn round_up_size(size: u64) -> u64 {
    if size == 0 {
        return SIZE_ROUND;
    }
    let rem = size % SIZE_ROUND;
    if rem == 0 {
        size
    } else {
        size + (SIZE_ROUND - rem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_entry() -> Entry {
        Entry::new()
    }

    #[test]
    fn path_round_trips_and_truncates() {
        let e = fresh_entry();
        e.set_path(b"/data/file.bin");
        assert_eq!(e.path(), b"/data/file.bin");

        let long = vec![b'a'; MAX_PATH_LEN + 50];
        e.set_path(&long);
        assert_eq!(e.path().len(), MAX_PATH_LEN);
    }

    #[test]
    fn size_rounding() {
        assert_eq!(round_up_size(0), 4096);
        assert_eq!(round_up_size(1), 4096);
        assert_eq!(round_up_size(4096), 4096);
        assert_eq!(round_up_size(4097), 8192);
    }
}
