//! The entry store: a shared committed view over a storage backend.
//!
//! All connection handles of one index share a single `IndexStore` (cheap to
//! clone; clones share state). The committed view is an immutable map from
//! statement to native value; a commit builds the next map and swaps it in
//! under a brief write-lock hold, so readers never observe a partial
//! transaction and an open snapshot never blocks a commit. The backend
//! persists the same entries in serialized form.

pub mod backend;
pub mod sqlite;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::codec::NativeValue;
use crate::error::{IndexError, Result};
use crate::model::Statement;
use crate::settings::BackendConfig;
use backend::{EntryOp, MemoryBackend, RawEntry, StorageBackend};
use sqlite::SqliteBackend;

/// Committed entries of one index, shared across connection handles.
#[derive(Clone)]
pub struct IndexStore<N: NativeValue> {
    view: Arc<RwLock<Arc<BTreeMap<Statement, N>>>>,
    backend: Arc<Mutex<Box<dyn StorageBackend>>>,
}

impl<N: NativeValue> IndexStore<N> {
    /// Opens the backend described by `config` and loads its entries.
    pub fn open(config: &BackendConfig) -> Result<Self> {
        let backend: Box<dyn StorageBackend> = match config {
            BackendConfig::Memory => Box::new(MemoryBackend::new()),
            BackendConfig::Sqlite { path } => Box::new(SqliteBackend::open(path)?),
        };
        Self::with_backend(backend)
    }

    /// Wraps a caller-supplied backend and loads its entries.
    pub fn with_backend(mut backend: Box<dyn StorageBackend>) -> Result<Self> {
        let mut view = BTreeMap::new();
        for raw in backend.load()? {
            let (statement, native) = decode_entry(&raw)?;
            view.insert(statement, native);
        }
        Ok(Self {
            view: Arc::new(RwLock::new(Arc::new(view))),
            backend: Arc::new(Mutex::new(backend)),
        })
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.view.read().len()
    }

    /// True when no entries are committed.
    pub fn is_empty(&self) -> bool {
        self.view.read().is_empty()
    }

    /// Looks up the committed native value for a statement.
    pub fn get(&self, statement: &Statement) -> Option<N> {
        self.view.read().get(statement).cloned()
    }

    /// True when the statement has a committed entry.
    pub fn contains(&self, statement: &Statement) -> bool {
        self.view.read().contains_key(statement)
    }

    /// Captures a stable read view: the committed entries as of now, shaded
    /// by the caller's staged overlay. Holds no lock, so a live snapshot
    /// never delays a commit from any handle.
    pub(crate) fn snapshot(&self, overlay: BTreeMap<Statement, Option<N>>) -> Snapshot<N> {
        Snapshot {
            committed: Arc::clone(&self.view.read()),
            overlay,
        }
    }

    /// Forwards changes to the backend's staging area. `Some` stages an
    /// upsert, `None` a delete.
    pub(crate) fn stage(&self, changes: &[(&Statement, Option<&N>)]) -> Result<()> {
        let mut ops = Vec::with_capacity(changes.len());
        for &(statement, native) in changes {
            match native {
                Some(n) => ops.push(EntryOp::Put(encode_entry(statement, n)?)),
                None => ops.push(EntryOp::Delete {
                    key: statement.canonical_key(),
                }),
            }
        }
        self.backend.lock().stage(&ops)
    }

    /// Commits the backend's staging area, then publishes `overlay` by
    /// building the next committed map and swapping it in. Snapshots taken
    /// earlier keep the map they captured.
    pub(crate) fn commit_staged(&self, overlay: &BTreeMap<Statement, Option<N>>) -> Result<()> {
        let mut backend = self.backend.lock();
        backend.commit_staged()?;
        let mut next = (**self.view.read()).clone();
        for (statement, change) in overlay {
            match change {
                Some(native) => {
                    next.insert(statement.clone(), native.clone());
                }
                None => {
                    next.remove(statement);
                }
            }
        }
        *self.view.write() = Arc::new(next);
        Ok(())
    }

    /// Discards the backend's staging area.
    pub(crate) fn rollback_staged(&self) -> Result<()> {
        self.backend.lock().rollback_staged()
    }

    /// Atomically replaces every entry, in the backend and the shared view.
    pub(crate) fn replace_all(&self, content: BTreeMap<Statement, N>) -> Result<()> {
        let mut entries = Vec::with_capacity(content.len());
        for (statement, native) in &content {
            entries.push(encode_entry(statement, native)?);
        }
        let mut backend = self.backend.lock();
        backend.replace_all(&entries)?;
        *self.view.write() = Arc::new(content);
        Ok(())
    }

    /// Removes every entry, in the backend and the shared view.
    pub(crate) fn clear(&self) -> Result<()> {
        let mut backend = self.backend.lock();
        backend.clear()?;
        *self.view.write() = Arc::new(BTreeMap::new());
        Ok(())
    }
}

fn encode_entry<N: NativeValue>(statement: &Statement, native: &N) -> Result<RawEntry> {
    Ok(RawEntry {
        key: statement.canonical_key(),
        statement: serde_json::to_string(statement)
            .map_err(|e| IndexError::Serialization(e.to_string()))?,
        native: serde_json::to_string(native)
            .map_err(|e| IndexError::Serialization(e.to_string()))?,
    })
}

fn decode_entry<N: NativeValue>(raw: &RawEntry) -> Result<(Statement, N)> {
    let statement = serde_json::from_str(&raw.statement)
        .map_err(|e| IndexError::Serialization(format!("entry '{}': {e}", raw.key)))?;
    let native = serde_json::from_str(&raw.native)
        .map_err(|e| IndexError::Serialization(format!("entry '{}': {e}", raw.key)))?;
    Ok((statement, native))
}

/// A stable read view: committed entries shaded by one handle's overlay.
///
/// Owns the committed map captured at snapshot time, so result cursors stay
/// stable against later commits without holding any lock.
pub(crate) struct Snapshot<N: NativeValue> {
    committed: Arc<BTreeMap<Statement, N>>,
    overlay: BTreeMap<Statement, Option<N>>,
}

impl<N: NativeValue> Snapshot<N> {
    /// Iterates visible entries: committed minus overlay deletions, plus
    /// overlay upserts.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Statement, &N)> + '_ {
        self.committed
            .iter()
            .filter(|(statement, _)| !self.overlay.contains_key(*statement))
            .chain(
                self.overlay
                    .iter()
                    .filter_map(|(statement, slot)| slot.as_ref().map(|n| (statement, n))),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;

    fn st(n: u32) -> Statement {
        Statement::new(
            Term::iri(format!("http://example.com/{n}")),
            "http://example.com/p",
            Term::literal(n.to_string()),
        )
    }

    fn store() -> IndexStore<String> {
        IndexStore::open(&BackendConfig::Memory).unwrap()
    }

    #[test]
    fn commit_applies_overlay_to_shared_view() {
        let store = store();
        let other = store.clone();
        let mut overlay = BTreeMap::new();
        overlay.insert(st(1), Some("one".to_owned()));
        overlay.insert(st(2), Some("two".to_owned()));
        store
            .stage(&[
                (&st(1), Some(&"one".to_owned())),
                (&st(2), Some(&"two".to_owned())),
            ])
            .unwrap();
        assert!(other.is_empty());
        store.commit_staged(&overlay).unwrap();
        assert_eq!(other.len(), 2);
        assert_eq!(other.get(&st(1)).as_deref(), Some("one"));
    }

    #[test]
    fn snapshot_shades_deletes_and_upserts() {
        let store = store();
        let mut overlay = BTreeMap::new();
        overlay.insert(st(1), Some("one".to_owned()));
        store.stage(&[(&st(1), Some(&"one".to_owned()))]).unwrap();
        store.commit_staged(&overlay).unwrap();

        let mut pending = BTreeMap::new();
        pending.insert(st(1), None);
        pending.insert(st(2), Some("two".to_owned()));
        let snapshot = store.snapshot(pending);
        let visible: Vec<_> = snapshot
            .iter()
            .map(|(s, n)| (s.clone(), n.clone()))
            .collect();
        assert_eq!(visible, vec![(st(2), "two".to_owned())]);
    }

    #[test]
    fn replace_all_swaps_view() {
        let store = store();
        let mut overlay = BTreeMap::new();
        overlay.insert(st(1), Some("one".to_owned()));
        store.stage(&[(&st(1), Some(&"one".to_owned()))]).unwrap();
        store.commit_staged(&overlay).unwrap();

        let mut content = BTreeMap::new();
        content.insert(st(7), "seven".to_owned());
        store.replace_all(content).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains(&st(7)));
        assert!(!store.contains(&st(1)));
    }

    #[test]
    fn commit_proceeds_while_snapshot_held() {
        let store = store();
        let mut first = BTreeMap::new();
        first.insert(st(1), Some("one".to_owned()));
        store.stage(&[(&st(1), Some(&"one".to_owned()))]).unwrap();
        store.commit_staged(&first).unwrap();

        let snapshot = store.snapshot(BTreeMap::new());
        assert_eq!(snapshot.iter().count(), 1);

        // Same thread, snapshot still alive: the commit must go through and
        // the captured view must stay as it was.
        let mut second = BTreeMap::new();
        second.insert(st(2), Some("two".to_owned()));
        store.stage(&[(&st(2), Some(&"two".to_owned()))]).unwrap();
        store.commit_staged(&second).unwrap();
        assert_eq!(snapshot.iter().count(), 1);
        assert_eq!(store.len(), 2);
    }
}
