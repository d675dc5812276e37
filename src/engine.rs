//! Process-wide transaction pipeline (spec §4.8).
//!
//! Grounded on `original_source/src/cds/hashtable/database_engine.{h,cpp}`:
//! six named `LockedQueue<DBTransaction>` queues, only one of which
//! (`m_PendingQueue`) has an actual producer in the source - `addTransaction`
//! enqueues there and nothing else touches the other five. They're kept
//! here as documented, unused fields rather than dropped, exactly as spec
//! §4.8/§9 direct: "treat as reserved pipeline stages pending a scheduling
//! policy decision."

use std::sync::OnceLock;

use crate::queue::{LockQueue, Queue};
use crate::transaction::{DBTransaction, Engine};

/// The process-wide transaction engine.
///
/// Published lazily through a [`OnceLock`] - construct-on-first-use, never
/// torn down before process exit. This is the Rust resolution of the
/// source's Meyers singleton (`static DatabaseEngine uniqueInstance` inside
/// `instance()`), which already gives the same one-time, thread-safe
/// initialization guarantee.
pub struct DatabaseEngine {
    io: LockQueue<DBTransaction>,
    cp1: LockQueue<DBTransaction>,
    cp2: LockQueue<DBTransaction>,
    delay: LockQueue<DBTransaction>,
    pending: LockQueue<DBTransaction>,
    blocking: LockQueue<DBTransaction>,
}

static INSTANCE: OnceLock<DatabaseEngine> = OnceLock::new();

impl DatabaseEngine {
    fn new() -> Self {
        Self {
            io: LockQueue::new(),
            cp1: LockQueue::new(),
            cp2: LockQueue::new(),
            delay: LockQueue::new(),
            pending: LockQueue::new(),
            blocking: LockQueue::new(),
        }
    }

    /// The single, process-wide engine instance.
    pub fn instance() -> &'static DatabaseEngine {
        INSTANCE.get_or_init(Self::new)
    }

    /// Enqueue `transaction` onto the pending queue.
    pub fn add_transaction(&self, transaction: DBTransaction) {
        self.pending.enqueue(transaction);
    }

    /// Pop the next pending transaction, if any.
    pub fn next_pending(&self) -> Option<DBTransaction> {
        self.pending.dequeue()
    }

    /// The reserved IO-stage queue. No producer or consumer in this port,
    /// same as the source; exposed so a future staged pipeline has
    /// somewhere to attach.
    pub fn io_queue(&self) -> &LockQueue<DBTransaction> {
        &self.io
    }

    /// The reserved first-checkpoint-stage queue. See [`Self::io_queue`].
    pub fn cp1_queue(&self) -> &LockQueue<DBTransaction> {
        &self.cp1
    }

    /// The reserved second-checkpoint-stage queue. See [`Self::io_queue`].
    pub fn cp2_queue(&self) -> &LockQueue<DBTransaction> {
        &self.cp2
    }

    /// The reserved delay-stage queue. See [`Self::io_queue`].
    pub fn delay_queue(&self) -> &LockQueue<DBTransaction> {
        &self.delay
    }

    /// The reserved blocking-stage queue. See [`Self::io_queue`].
    pub fn blocking_queue(&self) -> &LockQueue<DBTransaction> {
        &self.blocking
    }
}

impl Default for DatabaseEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for DatabaseEngine {
    fn add_transaction(&self, transaction: DBTransaction) {
        self.pending.enqueue(transaction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extendible::ExtendibleHashTable;
    use crate::transaction::{Command, Receiver};
    use std::sync::{Arc, Mutex};

    fn receiver() -> Receiver {
        Arc::new(Mutex::new(ExtendibleHashTable::new()))
    }

    #[test]
    fn add_transaction_only_touches_pending() {
        let engine = DatabaseEngine::default();
        let table = receiver();
        let mut tx = DBTransaction::new();
        tx.add_command(Command::insert(Arc::clone(&table), 1));
        tx.commit();

        engine.add_transaction(tx);

        assert!(engine.io_queue().is_empty());
        assert!(engine.cp1_queue().is_empty());
        assert!(engine.cp2_queue().is_empty());
        assert!(engine.delay_queue().is_empty());
        assert!(engine.blocking_queue().is_empty());
        assert!(engine.next_pending().is_some());
        assert!(engine.next_pending().is_none());
    }

    #[test]
    fn instance_is_process_wide_and_stable() {
        let a = DatabaseEngine::instance() as *const DatabaseEngine;
        let b = DatabaseEngine::instance() as *const DatabaseEngine;
        assert_eq!(a, b);
    }

    #[test]
    fn instance_accepts_transactions_via_engine_trait() {
        fn enqueue_via_trait(engine: &dyn Engine, tx: DBTransaction) {
            engine.add_transaction(tx);
        }

        let table = receiver();
        let mut tx = DBTransaction::new();
        tx.add_command(Command::insert(table, 42));
        tx.commit();

        enqueue_via_trait(DatabaseEngine::instance(), tx);
        assert!(DatabaseEngine::instance().next_pending().is_some());
    }
}
