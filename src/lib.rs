//! # Concurrent data structures, a memento-backed transaction framework
//!
//! Lock-based and lock-free stacks and queues, a split-ordered lock-free
//! hash table, and a serial extendible hash table driving a command/
//! transaction layer with snapshot-based undo.
//!
//! Ported from a C++ implementation of the same five container algorithms
//! (Treiber stack, two-lock and lock-free Michael–Scott queues, the
//! split-ordered table of Shalev & Shavit, and a serial extendible hash
//! table used as a transactional back end), onto the foundation primitives
//! — fences, backoff, spinlocks, an rwlock, hazard-pointer reclamation —
//! of a Rust port of [Concurrency Kit](http://concurrencykit.org/).
//!
//! ## Module organization
//!
//! ### Foundation
//! - [`cc`] — bit-twiddling (`ffs`/`ctz`/`popcount`/`reverse_bits`)
//! - [`pr`] — atomic fences and memory barriers
//! - [`error`] — the fatal-path error taxonomy
//! - [`config`] — tunables the source hardcodes as magic numbers
//!
//! ### Synchronization primitives
//! - [`mod@backoff`] — exponential backoff for CAS-retry loops
//! - [`spinlock`] — `TicketLock`, a fair FIFO mutex
//! - [`rwlock`] — a reader-writer lock
//! - [`hazard`] — hazard-pointer memory reclamation
//! - [`tagged_ptr`] — a `{ptr, counter}` wide-atomic cell
//!
//! ### Containers
//! - [`stack`] — `LockStack` and `TreiberStack`
//! - [`queue`] — `LockQueue` and `MsQueue`
//! - [`split_ordered`] — `SplitOrderedMap` and `SplitOrderedSet`
//! - [`extendible`] — `ExtendibleHashTable`, `Page`, `DirectoryEntry`, `Memento`
//!
//! ### Transaction framework
//! - [`transaction`] — `Command`, `DBTransaction`, the `Engine` trait
//! - [`engine`] — the process-wide `DatabaseEngine` singleton

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_inception)]

/// Compiler compatibility utilities: bit-twiddling and branch hints.
pub mod cc;

/// Atomic primitives and memory barriers.
pub mod pr;

/// Fatal-path error taxonomy.
pub mod error;

/// Tunables carried over from the source's hardcoded constants.
pub mod config;

/// Exponential backoff for contention management.
pub mod backoff;

/// Fair FIFO spinlock.
pub mod spinlock;

/// Reader-writer lock.
pub mod rwlock;

/// Hazard-pointer memory reclamation.
pub mod hazard;

/// A `{pointer, counter}` wide-atomic cell for lock-free containers.
pub mod tagged_ptr;

/// LIFO stacks: lock-based and lock-free.
pub mod stack;

/// FIFO queues: lock-based (two-lock Michael–Scott) and lock-free.
pub mod queue;

/// Split-ordered lock-free hash table and set.
pub mod split_ordered;

/// Serial extendible hash table, the transaction framework's back end.
pub mod extendible;

/// Command/transaction framework over the extendible hash table.
pub mod transaction;

/// Process-wide transaction engine singleton.
pub mod engine;

pub use cc::{ctz, ffs, popcount};
pub use queue::{LockQueue, MsQueue, Queue};
pub use stack::{LockStack, Stack, TreiberStack};
