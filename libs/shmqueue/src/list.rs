//! The intrusive, circular, doubly linked FIFO lists that hold entries in
//! the free/ready/completed states (spec.md §4.1).

use std::sync::atomic::Ordering;

use crate::entry::{Entry, NIL};
use crate::spinlock::RawSpinlock;

/// A FIFO list head: one spinlock, one index into the owning queue's entry
/// array. Push/pop are O(1) and never hold the lock across a syscall.
pub struct FifoList {
    lock: RawSpinlock,
    head: std::sync::atomic::AtomicU32,
}

impl FifoList {
    pub const fn new() -> Self {
        Self {
            lock: RawSpinlock::new(),
            head: std::sync::atomic::AtomicU32::new(NIL),
        }
    }

    /// Push `idx` onto the tail of this list.
    pub fn push(&self, entries: &[Entry], idx: u32) {
        let _guard = self.lock.lock();
        let head = self.head.load(Ordering::Relaxed);

        if head == NIL {
            entries[idx as usize].next.store(idx, Ordering::Relaxed);
            entries[idx as usize].prev.store(idx, Ordering::Relaxed);
            self.head.store(idx, Ordering::Release);
            return;
        }

        let tail = entries[head as usize].prev.load(Ordering::Relaxed);
        entries[tail as usize].next.store(idx, Ordering::Relaxed);
        entries[idx as usize].prev.store(tail, Ordering::Relaxed);
        entries[idx as usize].next.store(head, Ordering::Relaxed);
        entries[head as usize].prev.store(idx, Ordering::Release);
    }

    /// Pop the head of this list, or `None` if empty.
    pub fn pop(&self, entries: &[Entry]) -> Option<u32> {
        let _guard = self.lock.lock();
        let head = self.head.load(Ordering::Relaxed);
        if head == NIL {
            return None;
        }

        let next = entries[head as usize].next.load(Ordering::Relaxed);
        if next == head {
            // singleton: list becomes empty
            self.head.store(NIL, Ordering::Release);
        } else {
            let prev = entries[head as usize].prev.load(Ordering::Relaxed);
            entries[next as usize].prev.store(prev, Ordering::Relaxed);
            entries[prev as usize].next.store(next, Ordering::Relaxed);
            self.head.store(next, Ordering::Release);
        }

        Some(head)
    }

    /// Racy, lock-free hint used only to decide whether a `pop` is worth
    /// attempting (spec.md §4.2, §5: "reads outside the lock are explicitly
    /// racy and used only as an empty-hint").
    pub fn is_probably_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed) == NIL
    }
}

impl Default for FifoList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entries(n: usize) -> Vec<Entry> {
        (0..n).map(|_| Entry::new()).collect()
    }

    #[test]
    fn fifo_within_list() {
        let entries = make_entries(4);
        let list = FifoList::new();

        list.push(&entries, 0);
        list.push(&entries, 1);
        list.push(&entries, 2);

        assert_eq!(list.pop(&entries), Some(0));
        assert_eq!(list.pop(&entries), Some(1));
        assert_eq!(list.pop(&entries), Some(2));
        assert_eq!(list.pop(&entries), None);
    }

    #[test]
    fn singleton_push_pop() {
        let entries = make_entries(1);
        let list = FifoList::new();

        list.push(&entries, 0);
        assert!(!list.is_probably_empty());
        assert_eq!(entries[0].next.load(Ordering::Relaxed), 0);
        assert_eq!(entries[0].prev.load(Ordering::Relaxed), 0);

        assert_eq!(list.pop(&entries), Some(0));
        assert!(list.is_probably_empty());
    }

    #[test]
    fn round_trip_all_entries() {
        let entries = make_entries(8);
        let list = FifoList::new();

        for i in 0..8 {
            list.push(&entries, i);
        }
        let mut popped = Vec::new();
        while let Some(idx) = list.pop(&entries) {
            popped.push(idx);
        }
        assert_eq!(popped, (0..8).collect::<Vec<_>>());
    }
}
