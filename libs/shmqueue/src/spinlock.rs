//! A process-shareable spinlock.
//!
//! Unlike a `pthread_spinlock_t` initialized with `PTHREAD_PROCESS_SHARED`,
//! this needs no FFI initialization step: it is plain bytes in whatever
//! memory it's placed in, so mapping the same page into a second process
//! makes it shared for free. Critical sections guarded by this lock must
//! stay O(1) and must never perform a syscall.

use std::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Adaptive spin/yield backoff, the same shape as `parking_lot`'s spinning
/// and as the `SpinWait` helper used for the to-worker/from-worker rings
/// this crate's sibling shared-memory pipe.
#[derive(Default)]
struct SpinWait(u32);

impl SpinWait {
    fn spin(&mut self) {
        self.0 += 1;
        if self.0 < 10 {
            for _ in 0..(1u32 << self.0) {
                std::hint::spin_loop();
            }
        } else {
            self.0 = 10;
            std::thread::yield_now();
        }
    }
}

#[repr(transparent)]
pub struct RawSpinlock(AtomicU32);

impl RawSpinlock {
    pub const fn new() -> Self {
        Self(AtomicU32::new(UNLOCKED))
    }

    /// Acquire the lock, spinning until it's free. The returned guard
    /// releases the lock on drop. Hold no syscall inside the critical
    /// section guarded by this.
    pub fn lock(&self) -> SpinlockGuard<'_> {
        let mut spin = SpinWait::default();
        while self
            .0
            .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin.spin();
        }
        SpinlockGuard { lock: self }
    }
}

impl Default for RawSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SpinlockGuard<'a> {
    lock: &'a RawSpinlock,
}

impl Drop for SpinlockGuard<'_> {
    fn drop(&mut self) {
        self.lock.0.store(UNLOCKED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn mutual_exclusion_under_contention() {
        let lock = Arc::new(RawSpinlock::new());
        let counter = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let _g = lock.lock();
                        let cur = counter.load(Ordering::Relaxed);
                        counter.store(cur + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }
}
