//! Lock-free Treiber stack with tagged top (spec §4.4).
//!
//! Grounded on `original_source/src/cds/stack/lockfree_stack_impl.h` for
//! the CAS loop shape and on
//! `examples/other_examples/2e1e06e2_redox-os-tfs__conc-src-sync-treiber.rs.rs`
//! for idiomatic Rust structure. Reclamation is hazard pointers
//! ([`crate::hazard`]) - the correctness gap spec §4.4 calls out ("a
//! racing pop might still read `observed.ptr->next` after this free") is
//! closed by protecting `observed.ptr` with a hazard slot for the duration
//! of the dereference, and only retiring the popped node afterward.

use std::boxed::Box;
use std::ptr;
use std::sync::atomic::Ordering;

use crate::backoff::Backoff;
use crate::hazard::HazardDomain;
use crate::stack::Stack;
use crate::tagged_ptr::{AtomicTaggedPtr, TaggedPtr};

struct Node<T> {
    value: std::mem::ManuallyDrop<T>,
    next: *mut Node<T>,
}

const HAZARD_TOP: usize = 0;

/// A lock-free LIFO stack.
///
/// `push` and `pop` both loop on a weak CAS of the tagged `top` cell, per
/// spec §4.4; the counter half of the tag defeats ABA on the pointer half,
/// and the hazard-pointer domain defeats the use-after-free a tag alone
/// cannot.
pub struct TreiberStack<T> {
    top: AtomicTaggedPtr<Node<T>>,
    hazards: HazardDomain,
}

impl<T> TreiberStack<T> {
    /// Create a new, empty stack.
    pub const fn new() -> Self {
        Self { top: AtomicTaggedPtr::null(), hazards: HazardDomain::new() }
    }
}

impl<T> Default for TreiberStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Stack<T> for TreiberStack<T> {
    fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            value: std::mem::ManuallyDrop::new(value),
            next: ptr::null_mut(),
        }));

        let mut backoff = Backoff::new();
        loop {
            let observed = self.top.load(Ordering::Acquire);
            unsafe {
                (*node).next = observed.ptr();
            }
            let desired = observed.advance(node);
            if self
                .top
                .compare_exchange_weak(observed, desired, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            backoff.spin();
        }
    }

    fn pop(&self) -> Option<T> {
        let guard = self.hazards.local();
        let mut backoff = Backoff::new();

        loop {
            let observed = self.top.load(Ordering::Acquire);
            if observed.is_null() {
                return None;
            }

            guard.protect(HAZARD_TOP, observed.ptr());
            // Re-check: the node may have been popped and freed between
            // the load above and the hazard publish.
            if self.top.load(Ordering::Acquire) != observed {
                guard.clear(HAZARD_TOP);
                backoff.spin();
                continue;
            }

            let next = unsafe { (*observed.ptr()).next };
            let desired = observed.advance(next);

            match self.top.compare_exchange_weak(
                observed,
                desired,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    guard.clear(HAZARD_TOP);
                    let node = observed.ptr();
                    let value = unsafe { std::mem::ManuallyDrop::take(&mut (*node).value) };
                    unsafe {
                        guard.retire(node);
                    }
                    return Some(value);
                }
                Err(_) => {
                    guard.clear(HAZARD_TOP);
                    backoff.spin();
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.top.load(Ordering::Acquire).is_null()
    }
}

unsafe impl<T: Send> Send for TreiberStack<T> {}
unsafe impl<T: Send> Sync for TreiberStack<T> {}

impl<T> Drop for TreiberStack<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}
