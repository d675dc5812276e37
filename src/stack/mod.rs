//! LIFO stacks (spec §4.2, §4.4).
//!
//! Two independently-synchronized implementations share one trait:
//! [`LockStack`] (one mutex over the top pointer) and [`TreiberStack`]
//! (lock-free, tagged top, hazard-pointer reclamation). Both are
//! linearizable against the sequential stack specification (spec §8,
//! invariant 1).

mod lock_based;
mod lock_free;

pub use lock_based::LockStack;
pub use lock_free::TreiberStack;

/// Uniform push/pop surface over any LIFO container in this crate.
///
/// `pop` returns `None` instead of blocking when the stack is empty, per
/// spec §1's Non-goals ("no blocking").
pub trait Stack<T> {
    /// Push `value` onto the stack. Never fails (spec §4.2).
    fn push(&self, value: T);

    /// Pop the most recently pushed value, or `None` if empty.
    fn pop(&self) -> Option<T>;

    /// `true` iff the stack currently holds no elements.
    fn is_empty(&self) -> bool;
}
