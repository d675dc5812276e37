//! FIFO queues (spec §4.3, §4.5).
//!
//! [`LockQueue`] is a two-lock Michael-Scott queue: independent head and
//! tail mutexes, a permanent sentinel node, and the co-modification of
//! head and tail on the very first enqueue called out in spec §4.3.
//! [`MsQueue`] is its lock-free counterpart - tagged head/tail, the same
//! sentinel discipline, hazard-pointer reclamation.

mod lock_based;
mod lock_free;

pub use lock_based::LockQueue;
pub use lock_free::MsQueue;

/// Uniform enqueue/dequeue surface over any FIFO container in this crate.
pub trait Queue<T> {
    /// Enqueue `value` at the tail. Never fails (spec §4.3/§4.5).
    fn enqueue(&self, value: T);

    /// Dequeue the oldest value, or `None` if empty.
    fn dequeue(&self) -> Option<T>;

    /// `true` iff the queue currently holds no elements.
    fn is_empty(&self) -> bool;
}
