//! Lock-free Michael-Scott queue with tagged head/tail (spec §4.5).
//!
//! Grounded on `original_source/src/cds/queue/lockfree_queue_impl.h` for
//! the helping-CAS shape and on
//! `examples/other_examples/3e40d67f_doublegate-VeridianOS__kernel-src-sync-lockfree_queue.rs.rs`
//! for idiomatic Rust structure around a tagged sentinel. As with the
//! stack (§4.4), reclamation is hazard pointers, closing the same
//! use-after-free gap spec §4.5 flags by deferring the free of a node
//! until a scan finds it unprotected.

use std::boxed::Box;
use std::ptr;
use std::sync::atomic::Ordering;

use crate::backoff::Backoff;
use crate::hazard::HazardDomain;
use crate::queue::Queue;
use crate::tagged_ptr::{AtomicTaggedPtr, TaggedPtr};

struct Node<T> {
    value: Option<T>,
    next: AtomicTaggedPtr<Node<T>>,
}

const HAZARD_HEAD: usize = 0;
const HAZARD_NEXT: usize = 1;

/// A lock-free FIFO queue.
///
/// One sentinel node is always present; `head` never observes null
/// (spec §4.5's invariant). `enqueue` helps a lagging `tail` forward
/// before attempting its own link, and `dequeue` helps swing `tail` when
/// it finds `head == tail` but the sentinel already has a successor.
pub struct MsQueue<T> {
    head: AtomicTaggedPtr<Node<T>>,
    tail: AtomicTaggedPtr<Node<T>>,
    hazards: HazardDomain,
}

impl<T> MsQueue<T> {
    /// Create a new, empty queue with its sentinel already in place.
    pub fn new() -> Self {
        let sentinel = Box::into_raw(Box::new(Node { value: None, next: AtomicTaggedPtr::null() }));
        let initial = TaggedPtr::new(sentinel, 0);
        Self {
            head: AtomicTaggedPtr::new(initial),
            tail: AtomicTaggedPtr::new(initial),
            hazards: HazardDomain::new(),
        }
    }
}

impl<T> Default for MsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> for MsQueue<T> {
    fn enqueue(&self, value: T) {
        let node = Box::into_raw(Box::new(Node { value: Some(value), next: AtomicTaggedPtr::null() }));
        let guard = self.hazards.local();
        let mut backoff = Backoff::new();

        loop {
            let t = self.tail.load(Ordering::Acquire);
            guard.protect(HAZARD_HEAD, t.ptr());
            if self.tail.load(Ordering::Acquire) != t {
                guard.clear(HAZARD_HEAD);
                backoff.spin();
                continue;
            }

            let next = unsafe { (*t.ptr()).next.load(Ordering::Acquire) };
            if self.tail.load(Ordering::Acquire) != t {
                guard.clear(HAZARD_HEAD);
                backoff.spin();
                continue;
            }

            if next.is_null() {
                let desired = next.advance(node);
                let linked = unsafe {
                    (*t.ptr())
                        .next
                        .compare_exchange_weak(next, desired, Ordering::Release, Ordering::Relaxed)
                };
                if linked.is_ok() {
                    let _ = self.tail.compare_exchange(
                        t,
                        t.advance(node),
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    guard.clear(HAZARD_HEAD);
                    return;
                }
            } else {
                let _ = self.tail.compare_exchange(
                    t,
                    t.advance(next.ptr()),
                    Ordering::Release,
                    Ordering::Relaxed,
                );
            }
            guard.clear(HAZARD_HEAD);
            backoff.spin();
        }
    }

    fn dequeue(&self) -> Option<T> {
        let guard = self.hazards.local();
        let mut backoff = Backoff::new();

        loop {
            let h = self.head.load(Ordering::Acquire);
            guard.protect(HAZARD_HEAD, h.ptr());
            if self.head.load(Ordering::Acquire) != h {
                guard.clear(HAZARD_HEAD);
                backoff.spin();
                continue;
            }

            let t = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*h.ptr()).next.load(Ordering::Acquire) };
            guard.protect(HAZARD_NEXT, next.ptr());

            if self.head.load(Ordering::Acquire) != h {
                guard.clear_all();
                backoff.spin();
                continue;
            }

            if next.is_null() {
                guard.clear_all();
                return None;
            }

            if h.ptr() == t.ptr() {
                let _ = self.tail.compare_exchange(
                    t,
                    t.advance(next.ptr()),
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                guard.clear_all();
                backoff.spin();
                continue;
            }

            match self.head.compare_exchange_weak(
                h,
                h.advance(next.ptr()),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    // Only the thread that wins this CAS may touch
                    // `next`'s value field - losers never race on it,
                    // since they retry from a fresh `head.load` instead.
                    let value = unsafe { (*next.ptr()).value.take() };
                    guard.clear_all();
                    unsafe {
                        guard.retire(h.ptr());
                    }
                    return value;
                }
                Err(_) => {
                    guard.clear_all();
                    backoff.spin();
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        let guard = self.hazards.local();
        loop {
            let h = self.head.load(Ordering::Acquire);
            guard.protect(HAZARD_HEAD, h.ptr());
            if self.head.load(Ordering::Acquire) != h {
                continue;
            }
            let next = unsafe { (*h.ptr()).next.load(Ordering::Acquire) };
            guard.clear_all();
            return next.is_null();
        }
    }
}

unsafe impl<T: Send> Send for MsQueue<T> {}
unsafe impl<T: Send> Sync for MsQueue<T> {}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
        let sentinel = self.head.load(Ordering::Acquire).ptr();
        unsafe {
            drop(Box::from_raw(sentinel));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn new_queue_is_empty() {
        let queue: MsQueue<i32> = MsQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn s2_scenario_enqueue_then_dequeue_is_fifo() {
        let queue = MsQueue::new();
        queue.enqueue(10);
        queue.enqueue(20);
        queue.enqueue(30);

        assert_eq!(queue.dequeue(), Some(10));
        assert_eq!(queue.dequeue(), Some(20));
        assert_eq!(queue.dequeue(), Some(30));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn drop_frees_remaining_nodes_and_sentinel() {
        let queue = MsQueue::new();
        for i in 0..1000 {
            queue.enqueue(i);
        }
        queue.dequeue();
    }

    #[test]
    fn s4_scenario_multiple_producers_and_consumers_see_every_value_once() {
        let queue = Arc::new(MsQueue::new());

        let producers: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..5_000 {
                        queue.enqueue(t * 5_000 + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut seen = HashSet::new();
        while let Some(v) = queue.dequeue() {
            assert!(seen.insert(v), "value {v} dequeued twice");
        }
        assert_eq!(seen.len(), 20_000);
    }
}
