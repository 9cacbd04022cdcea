//! The storage backend contract and the in-memory implementation.

use std::collections::BTreeMap;

use crate::error::Result;

/// One persisted entry in serialized form.
///
/// `key` is the statement's canonical key; `statement` and `native` are JSON
/// documents. Backends treat all three as opaque text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEntry {
    /// Primary key text.
    pub key: String,
    /// Serialized statement.
    pub statement: String,
    /// Serialized native value.
    pub native: String,
}

/// One staged change against the committed entry set.
#[derive(Clone, Debug)]
pub enum EntryOp {
    /// Insert or overwrite the entry at `entry.key`.
    Put(RawEntry),
    /// Remove the entry at `key`; absent keys are ignored.
    Delete {
        /// Primary key text of the entry to drop.
        key: String,
    },
}

/// Durable storage for one index.
///
/// A backend keeps a committed entry set and at most one open staging area.
/// Staged operations must stay invisible to [`load`] until
/// [`commit_staged`], which applies them in staging order, atomically with
/// respect to process failure. [`replace_all`] and [`clear`] are only called
/// with no staging area open, but must drop one defensively if present.
///
/// [`load`]: StorageBackend::load
/// [`commit_staged`]: StorageBackend::commit_staged
/// [`replace_all`]: StorageBackend::replace_all
/// [`clear`]: StorageBackend::clear
pub trait StorageBackend: Send {
    /// Reads the committed entry set.
    fn load(&mut self) -> Result<Vec<RawEntry>>;

    /// Adds operations to the staging area, opening one if needed.
    fn stage(&mut self, ops: &[EntryOp]) -> Result<()>;

    /// Applies and closes the staging area. No-op when nothing is staged.
    fn commit_staged(&mut self) -> Result<()>;

    /// Discards and closes the staging area. No-op when nothing is staged.
    fn rollback_staged(&mut self) -> Result<()>;

    /// Atomically replaces the committed entry set.
    fn replace_all(&mut self, entries: &[RawEntry]) -> Result<()>;

    /// Removes every committed entry.
    fn clear(&mut self) -> Result<()>;
}

/// Backend keeping entries in process memory only.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    committed: BTreeMap<String, RawEntry>,
    staged: Vec<EntryOp>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&mut self) -> Result<Vec<RawEntry>> {
        Ok(self.committed.values().cloned().collect())
    }

    fn stage(&mut self, ops: &[EntryOp]) -> Result<()> {
        self.staged.extend(ops.iter().cloned());
        Ok(())
    }

    fn commit_staged(&mut self) -> Result<()> {
        for op in self.staged.drain(..) {
            match op {
                EntryOp::Put(entry) => {
                    self.committed.insert(entry.key.clone(), entry);
                }
                EntryOp::Delete { key } => {
                    self.committed.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn rollback_staged(&mut self) -> Result<()> {
        self.staged.clear();
        Ok(())
    }

    fn replace_all(&mut self, entries: &[RawEntry]) -> Result<()> {
        self.staged.clear();
        self.committed = entries
            .iter()
            .map(|e| (e.key.clone(), e.clone()))
            .collect();
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.staged.clear();
        self.committed.clear();
        Ok(())
    }
}
