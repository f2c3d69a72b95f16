//! Derive a portable POSIX shared-memory object name for a queue slot
//! (spec.md §4.7, §6, redesigned per §9's "Shared-memory name collisions"
//! flag).
//!
//! The original name derivation was a pure function of `path`, which
//! collides whenever two workers (or the same worker) have the same path
//! in flight at once. This salts the name with the requesting worker's id
//! and the slot's index in that worker's entry array instead, so it is
//! collision-free independent of what path the slot happens to be loading.
//! `shm_open` names are only portable when they look like `/single-segment`
//! (one leading slash, no others), which this format satisfies directly.

use crate::entry_limits::MAX_NAME_LEN;

/// Build the shared-memory object name for worker `worker_id`'s slot
/// `entry_idx`, optionally scoped under `namespace` so multiple loader
/// instances on one host don't collide on `/dev/shm`.
pub fn derive_shm_name(worker_id: u32, entry_idx: u32, namespace: Option<&str>) -> String {
    let mut name = String::with_capacity(32);
    name.push('/');
    if let Some(ns) = namespace {
        name.push_str(ns);
        name.push('_');
    }
    name.push_str(&format!("w{worker_id}_e{entry_idx}"));

    if name.len() > MAX_NAME_LEN {
        name.truncate(MAX_NAME_LEN);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_worker_and_slot() {
        assert_eq!(derive_shm_name(0, 3, None), "/w0_e3");
    }

    #[test]
    fn applies_namespace_prefix() {
        assert_eq!(derive_shm_name(2, 7, Some("loader1")), "/loader1_w2_e7");
    }

    #[test]
    fn distinct_slots_never_collide_regardless_of_path() {
        // Two requests for the identical path from different workers (or
        // different slots of the same worker) must still get distinct names.
        assert_ne!(derive_shm_name(0, 0, None), derive_shm_name(0, 1, None));
        assert_ne!(derive_shm_name(0, 0, None), derive_shm_name(1, 0, None));
    }
}
