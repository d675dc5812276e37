//! Transaction/command framework over the serial extendible hashtable
//! (spec §4.8).
//!
//! Grounded on `original_source/src/cds/hashtable/{command,insert_command,
//! erase_command,update_command,transaction}.{h,cpp}`: the source's virtual
//! `Command` base with three subclasses becomes one tagged enum per the
//! redesign guidance "map to tagged variants... dispatch is a small match,
//! not virtual calls". Each variant still carries its own receiver handle
//! and captured memento, exactly as the source's `Command::m_receiver` /
//! `m_memento` members do.

use std::sync::{Arc, Mutex};

use crate::extendible::{ExtendibleHashTable, Memento};

/// The item type the transaction framework operates over.
///
/// The source passes raw `int`s through `LockedHashTable`, and nothing in
/// `Command`/`DBTransaction`/`DatabaseEngine` is generic over item type
/// there either (only the hashtable itself, §4.7, was generalized, since
/// only `pseudoKey` needed `Hash`). Fixing one concrete item type here
/// keeps `DatabaseEngine::instance` a single process-wide static instead
/// of a family of them, one per instantiation.
pub type Item = i64;

/// A hashtable shared between a transaction's commands and, potentially,
/// other transactions - the source's `shared_ptr<LockedHashTable>`.
pub type Receiver = Arc<Mutex<ExtendibleHashTable<Item>>>;

/// One undoable mutation against a shared [`ExtendibleHashTable`].
///
/// `execute` captures a memento of the receiver before mutating it;
/// `undo` reinstalls that memento, discarding whatever happened since.
pub enum Command {
    Insert { receiver: Receiver, item: Item, memento: Option<Memento<Item>> },
    Erase { receiver: Receiver, item: Item, memento: Option<Memento<Item>> },
    Update { receiver: Receiver, old: Item, new: Item, memento: Option<Memento<Item>> },
}

impl Command {
    /// Build a command that inserts `item` into `receiver` on execute.
    pub fn insert(receiver: Receiver, item: Item) -> Self {
        Command::Insert { receiver, item, memento: None }
    }

    /// Build a command that erases `item` from `receiver` on execute.
    pub fn erase(receiver: Receiver, item: Item) -> Self {
        Command::Erase { receiver, item, memento: None }
    }

    /// Build a command that replaces `old` with `new` in `receiver` on
    /// execute.
    pub fn update(receiver: Receiver, old: Item, new: Item) -> Self {
        Command::Update { receiver, old, new, memento: None }
    }

    fn execute(&mut self) {
        match self {
            Command::Insert { receiver, item, memento } => {
                let mut table = receiver.lock().unwrap();
                *memento = Some(table.create_memento());
                table.insert(*item);
            }
            Command::Erase { receiver, item, memento } => {
                let mut table = receiver.lock().unwrap();
                *memento = Some(table.create_memento());
                table.erase(item);
            }
            Command::Update { receiver, old, new, memento } => {
                let mut table = receiver.lock().unwrap();
                *memento = Some(table.create_memento());
                table.update(old, *new);
            }
        }
    }

    fn undo(&self) {
        let (receiver, memento) = match self {
            Command::Insert { receiver, memento, .. } => (receiver, memento),
            Command::Erase { receiver, memento, .. } => (receiver, memento),
            Command::Update { receiver, memento, .. } => (receiver, memento),
        };
        if let Some(memento) = memento {
            receiver.lock().unwrap().set_memento(memento.clone());
        }
    }
}

/// An ordered sequence of commands (spec §4.8's `DBTransaction`).
#[derive(Default)]
pub struct DBTransaction {
    commands: Vec<Command>,
}

impl DBTransaction {
    /// An empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `command` to the end of this transaction.
    pub fn add_command(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Execute every command, in the order they were added.
    pub fn commit(&mut self) {
        for command in &mut self.commands {
            command.execute();
        }
    }

    /// Undo every command, in reverse order, each restoring the memento it
    /// captured at commit time.
    pub fn rollback(&mut self) {
        for command in self.commands.iter().rev() {
            command.undo();
        }
    }
}

/// The surface a transaction engine exposes to the rest of the crate.
///
/// [`crate::engine::DatabaseEngine`] implements this against its
/// process-wide singleton; callers who'd rather not depend on a global can
/// build their own `DatabaseEngine` value and inject it through this trait
/// instead (spec §9: "Prefer injection unless a single engine per process
/// is a contract").
pub trait Engine {
    /// Enqueue `transaction` for later processing.
    fn add_transaction(&self, transaction: DBTransaction);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receiver() -> Receiver {
        Arc::new(Mutex::new(ExtendibleHashTable::new()))
    }

    #[test]
    fn commit_applies_commands_in_order() {
        let table = receiver();
        let mut tx = DBTransaction::new();
        tx.add_command(Command::insert(Arc::clone(&table), 1));
        tx.add_command(Command::insert(Arc::clone(&table), 2));
        tx.add_command(Command::erase(Arc::clone(&table), 1));
        tx.commit();

        let guard = table.lock().unwrap();
        assert!(!guard.find(&1));
        assert!(guard.find(&2));
    }

    #[test]
    fn rollback_undoes_in_reverse_restoring_each_memento() {
        let table = receiver();
        let mut tx = DBTransaction::new();
        tx.add_command(Command::insert(Arc::clone(&table), 1));
        tx.add_command(Command::insert(Arc::clone(&table), 2));
        tx.add_command(Command::update(Arc::clone(&table), 1, 3));
        tx.commit();
        {
            let guard = table.lock().unwrap();
            assert!(guard.find(&2));
            assert!(guard.find(&3));
            assert!(!guard.find(&1));
        }

        tx.rollback();

        let guard = table.lock().unwrap();
        assert!(!guard.find(&1));
        assert!(!guard.find(&2));
        assert!(!guard.find(&3));
    }

    #[test]
    fn round_trip_commit_then_rollback_is_observationally_empty() {
        let table = receiver();
        let mut tx = DBTransaction::new();
        tx.add_command(Command::insert(Arc::clone(&table), 10));
        tx.add_command(Command::insert(Arc::clone(&table), 20));
        tx.commit();
        tx.rollback();

        let guard = table.lock().unwrap();
        assert!(!guard.find(&10));
        assert!(!guard.find(&20));
    }
}
