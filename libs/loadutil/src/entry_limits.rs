//! Size limits shared between this crate and `shmqueue`'s entry layout.
//! Kept here (rather than imported from `shmqueue`) so `loadutil` stays
//! usable by callers that only need naming/sizing helpers, not the queue
//! itself.

/// Matches `shmqueue::entry::SHM_NAME_STORAGE_LEN - 1`: the longest name a
/// queue entry's `shm_name` field can hold.
pub const MAX_NAME_LEN: usize = 129;
