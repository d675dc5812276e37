//! Lock-based LIFO stack (spec §4.2): one mutex over the top pointer.
//!
//! Grounded on `original_source/src/cds/stack/locked_stack.h` for the
//! shape (a `node` chain, exclusively owned behind one lock) and on
//! `phdye-ck-rust/src/spinlock.rs` for the lock itself - this crate's own
//! `TicketLock` plays the role the source's `std::mutex` does.

use std::boxed::Box;
use std::ptr;

use crate::spinlock::TicketLock;
use crate::stack::Stack;

struct Node<T> {
    value: T,
    next: *mut Node<T>,
}

/// A lock-based LIFO stack.
///
/// Every `push`/`pop` acquires the same [`TicketLock`] over the top
/// pointer; the critical section is the assignment under the lock, which
/// is this container's linearization point (spec §4.2).
pub struct LockStack<T> {
    top: TicketLock<*mut Node<T>>,
}

impl<T> LockStack<T> {
    /// Create a new, empty stack.
    pub const fn new() -> Self {
        Self { top: TicketLock::new(ptr::null_mut()) }
    }
}

impl<T> Default for LockStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Stack<T> for LockStack<T> {
    fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node { value, next: ptr::null_mut() }));
        let mut top = self.top.lock();
        unsafe {
            (*node).next = *top;
        }
        *top = node;
    }

    fn pop(&self) -> Option<T> {
        let mut top = self.top.lock();
        if top.is_null() {
            return None;
        }
        let node = *top;
        unsafe {
            *top = (*node).next;
            drop(top);
            let boxed = Box::from_raw(node);
            Some(boxed.value)
        }
    }

    fn is_empty(&self) -> bool {
        self.top.lock().is_null()
    }
}

unsafe impl<T: Send> Send for LockStack<T> {}
unsafe impl<T: Send> Sync for LockStack<T> {}

impl<T> Drop for LockStack<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stack_is_empty() {
        let stack: LockStack<i32> = LockStack::new();
        assert!(stack.is_empty());
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn s1_scenario_push_then_pop_is_lifo() {
        let stack = LockStack::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);

        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn drop_frees_remaining_nodes() {
        let stack = LockStack::new();
        for i in 0..100 {
            stack.push(i);
        }
        // Dropped here; under a sanitizer this would catch any leak/UAF.
    }

    #[test]
    fn concurrent_push_pop_preserves_count() {
        use std::sync::Arc;
        use std::thread;

        let stack = Arc::new(LockStack::new());
        let producers: Vec<_> = (0..4)
            .map(|t| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    for i in 0..2500 {
                        stack.push(t * 2500 + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        while let Some(v) = stack.pop() {
            assert!(seen.insert(v), "value {v} popped twice");
        }
        assert_eq!(seen.len(), 10_000);
    }
}
