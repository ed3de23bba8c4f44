//! Active-events list with lock-free readers
//!
//! A singly linked list of `{family, event_id}` entries. Readers traverse
//! it under an epoch guard and never block; writers are serialized by an
//! internal mutex. Nodes are published with a release store of the link
//! after their fields are written, so a reader that observes the link also
//! observes a fully initialized node. A removed node is unlinked at once
//! for new traversals and handed to the epoch collector, which frees it
//! only after every guard pinned before the unlink has been dropped.

use crate::error::SliError;
use crate::event::EventId;
use crate::faults::FaultInjector;
use crossbeam::epoch::{self, Atomic, Owned, Shared};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

struct Node {
    event: EventId,
    next: Atomic<Node>,
}

pub struct ActiveEventList {
    head: Atomic<Node>,
    len: AtomicUsize,
    writer: Mutex<()>,
}

impl ActiveEventList {
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
            len: AtomicUsize::new(0),
            writer: Mutex::new(()),
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish `event` at the head of the list
    ///
    /// Returns `Ok(false)` if the event is already present.
    pub fn insert(&self, event: EventId, faults: &FaultInjector) -> Result<bool, SliError> {
        let _writer = self.lock_writer();
        if self.contains(event) {
            return Ok(false);
        }
        faults.check("active event node")?;

        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);
        let node = Owned::new(Node {
            event,
            next: Atomic::null(),
        });
        node.next.store(head, Ordering::Relaxed);
        // Release: event and next must be visible before the node is reachable.
        self.head.store(node, Ordering::Release);
        self.len.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Unlink `event`, deferring reclamation of its node
    pub fn remove(&self, event: EventId) -> bool {
        let _writer = self.lock_writer();
        let guard = epoch::pin();

        let mut link = &self.head;
        loop {
            let cur = link.load(Ordering::Acquire, &guard);
            // SAFETY: nodes reachable from the list are only reclaimed through
            // the epoch collector, and `guard` is pinned.
            let Some(node) = (unsafe { cur.as_ref() }) else {
                return false;
            };
            if node.event == event {
                let next = node.next.load(Ordering::Acquire, &guard);
                link.store(next, Ordering::Release);
                self.len.fetch_sub(1, Ordering::Relaxed);
                // SAFETY: the node is unlinked and writers are serialized, so
                // no new reference to it can be created.
                unsafe { guard.defer_destroy(cur) };
                return true;
            }
            link = &node.next;
        }
    }

    /// Unlink every entry
    pub fn clear(&self) {
        let _writer = self.lock_writer();
        let guard = epoch::pin();

        let mut cur = self.head.swap(Shared::null(), Ordering::AcqRel, &guard);
        // SAFETY: the detached chain is unreachable for new readers; readers
        // pinned before the swap keep it alive until they unpin.
        while let Some(node) = unsafe { cur.as_ref() } {
            let next = node.next.load(Ordering::Acquire, &guard);
            unsafe { guard.defer_destroy(cur) };
            cur = next;
        }
        self.len.store(0, Ordering::Relaxed);
    }

    /// Visit every entry without blocking writers
    pub fn try_for_each<E>(&self, mut f: impl FnMut(EventId) -> Result<(), E>) -> Result<(), E> {
        let guard = epoch::pin();
        let mut cur = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: see `remove`.
        while let Some(node) = unsafe { cur.as_ref() } {
            f(node.event)?;
            cur = node.next.load(Ordering::Acquire, &guard);
        }
        Ok(())
    }

    pub fn for_each(&self, mut f: impl FnMut(EventId)) {
        let _ = self.try_for_each(|event| {
            f(event);
            Ok::<(), ()>(())
        });
    }

    pub fn contains(&self, event: EventId) -> bool {
        self.try_for_each(|e| if e == event { Err(()) } else { Ok(()) })
            .is_err()
    }

    pub fn to_vec(&self) -> Vec<EventId> {
        let mut events = Vec::with_capacity(self.len());
        self.for_each(|e| events.push(e));
        events
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActiveEventList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActiveEventList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

impl Drop for ActiveEventList {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out concurrent readers and writers; nodes
        // still linked were never handed to the collector.
        unsafe {
            let guard = epoch::unprotected();
            let mut cur = self.head.load(Ordering::Relaxed, guard);
            while let Some(node) = cur.as_ref() {
                let next = node.next.load(Ordering::Relaxed, guard);
                drop(cur.into_owned());
                cur = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LongTermEvent, MemLatEvent, SchedLatEvent};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    const WAIT: EventId = EventId::Sched(SchedLatEvent::Wait);
    const SWAPIN: EventId = EventId::Mem(MemLatEvent::DirectSwapin);
    const LT_IRQ: EventId = EventId::LongTerm(LongTermEvent::IrqTime);

    #[test]
    fn test_insert_and_contains() {
        let list = ActiveEventList::new();
        let faults = FaultInjector::new();
        assert!(list.is_empty());
        assert!(list.insert(WAIT, &faults).unwrap());
        assert!(list.insert(SWAPIN, &faults).unwrap());
        assert!(list.contains(WAIT));
        assert!(list.contains(SWAPIN));
        assert!(!list.contains(LT_IRQ));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_duplicate_insert_is_ignored() {
        let list = ActiveEventList::new();
        let faults = FaultInjector::new();
        assert!(list.insert(WAIT, &faults).unwrap());
        assert!(!list.insert(WAIT, &faults).unwrap());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let list = ActiveEventList::new();
        let faults = FaultInjector::new();
        for e in [WAIT, SWAPIN, LT_IRQ] {
            list.insert(e, &faults).unwrap();
        }
        assert!(list.remove(SWAPIN));
        assert_eq!(list.to_vec(), vec![LT_IRQ, WAIT]);
        assert!(list.remove(LT_IRQ));
        assert!(list.remove(WAIT));
        assert!(!list.remove(WAIT));
        assert!(list.is_empty());
    }

    #[test]
    fn test_insert_allocation_failure_leaves_list_unchanged() {
        let list = ActiveEventList::new();
        let faults = FaultInjector::new();
        faults.fail_nth(1);
        assert!(list.insert(WAIT, &faults).is_err());
        assert!(list.is_empty());
        assert!(!list.contains(WAIT));
    }

    #[test]
    fn test_clear() {
        let list = ActiveEventList::new();
        let faults = FaultInjector::new();
        list.insert(WAIT, &faults).unwrap();
        list.insert(LT_IRQ, &faults).unwrap();
        list.clear();
        assert!(list.is_empty());
        assert!(list.to_vec().is_empty());
    }

    #[test]
    fn test_readers_tolerate_concurrent_writers() {
        let list = Arc::new(ActiveEventList::new());
        let stop = Arc::new(AtomicBool::new(false));
        let all: Vec<EventId> = EventId::all().collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let list = Arc::clone(&list);
                let stop = Arc::clone(&stop);
                let all = all.clone();
                std::thread::spawn(move || {
                    let mut seen = 0usize;
                    while !stop.load(Ordering::Relaxed) {
                        list.for_each(|e| {
                            assert!(all.contains(&e));
                            seen += 1;
                        });
                    }
                    seen
                })
            })
            .collect();

        let faults = FaultInjector::new();
        for _ in 0..200 {
            for &e in &all {
                list.insert(e, &faults).unwrap();
            }
            for &e in &all {
                assert!(list.remove(e));
            }
        }
        stop.store(true, Ordering::Relaxed);
        for r in readers {
            r.join().unwrap();
        }
        assert!(list.is_empty());
    }
}
