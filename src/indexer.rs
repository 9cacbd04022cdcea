//! The indexer: one named secondary index attached to a triple store.
//!
//! [`StatementIndexer`] pairs a [`StatementFilter`] with an [`IndexCodec`]
//! and an [`IndexStore`], and exposes the operation surface the host store
//! drives: batch mutation inside the host's transaction, flush/commit/
//! rollback mirroring the host's transaction boundaries, full rebuild, plan
//! rewriting, and cursor evaluation.
//!
//! Each handle owns a private mutation buffer and staged overlay; handles of
//! the same index share one committed store. The state machine:
//!
//! ```text
//! Uninitialized --initialize--> Ready --add/remove--> Dirty --flush--> Flushed
//!       Flushed --commit--> Ready      Dirty/Flushed --rollback--> Ready
//!       (flush/commit failure) --> Faulted --rollback--> Ready
//!       any --close--> Closed (terminal)
//! ```

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::algebra::{BindingSet, Dataset, IndexExpr, PlanNode};
use crate::buffer::{MutationBuffer, PendingOp};
use crate::codec::IndexCodec;
use crate::cursor::IndexCursor;
use crate::error::{EvalError, EvalResult, IndexError, Result};
use crate::filter::StatementFilter;
use crate::model::Statement;
use crate::rewrite;
use crate::settings::IndexerSettings;
use crate::source::StatementSource;
use crate::store::IndexStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Uninitialized,
    Ready,
    Dirty,
    Flushed,
    Faulted,
    Closed,
}

impl State {
    fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Dirty => "dirty",
            Self::Flushed => "flushed",
            Self::Faulted => "faulted",
            Self::Closed => "closed",
        }
    }
}

/// The operation surface of one named index, as driven by the host store.
///
/// Mutation calls happen inside a host transaction; `flush`, `commit`, and
/// `rollback` are called at the host's transaction boundaries. `optimize`
/// and `iterator` serve query planning and evaluation.
pub trait Indexer {
    /// Transitions a fresh indexer into service. Fails when called twice.
    fn initialize(&mut self) -> Result<()>;

    /// Buffers additions for statements passing the filter; other
    /// statements are silently ignored. All-or-nothing: an encoding failure
    /// leaves the buffer untouched.
    ///
    /// `source` exposes the primary store as of this transaction, for
    /// implementations that validate against it.
    fn add_batch(&mut self, source: &dyn StatementSource, statements: &[Statement]) -> Result<()>;

    /// Buffers removals for statements passing the filter.
    fn remove_batch(
        &mut self,
        source: &dyn StatementSource,
        statements: &[Statement],
    ) -> Result<()>;

    /// [`add_batch`](Indexer::add_batch) with the error reported as a log
    /// line and `false`, for hosts that treat index failures as non-fatal.
    fn execute_batch_add(
        &mut self,
        source: &dyn StatementSource,
        statements: &[Statement],
    ) -> bool;

    /// [`remove_batch`](Indexer::remove_batch) with the error reported as a
    /// log line and `false`.
    fn execute_batch_remove(
        &mut self,
        source: &dyn StatementSource,
        statements: &[Statement],
    ) -> bool;

    /// Pushes buffered mutations into the staged overlay and the backend's
    /// staging area. Staged changes are visible to this handle's cursors
    /// only; other handles see nothing until [`commit`](Indexer::commit).
    fn flush(&mut self) -> Result<()>;

    /// Flushes any remaining buffer, then atomically publishes the staged
    /// overlay to every handle of this index.
    fn commit(&mut self) -> Result<()>;

    /// Discards buffered and staged changes. Also the recovery path from a
    /// flush or commit failure.
    fn rollback(&mut self) -> Result<()>;

    /// Rolls back anything pending and retires the handle. All later calls
    /// fail.
    fn close(&mut self) -> Result<()>;

    /// Rebuilds the index from scratch out of `source`. Requires a clean
    /// transaction (nothing buffered or staged). All-or-nothing: on any
    /// failure the previous content stays.
    fn reindex(&mut self, source: &dyn StatementSource) -> Result<()>;

    /// Removes all index content, discarding pending changes first.
    fn clear(&mut self) -> Result<()>;

    /// Rewrites a plan, claiming fragments this index covers. A plan with
    /// nothing claimable comes back unchanged; so does any plan while the
    /// indexer is not serving queries.
    fn optimize(
        &self,
        plan: PlanNode,
        dataset: Option<&Dataset>,
        bindings: &BindingSet,
    ) -> PlanNode;

    /// Opens a cursor over a claimed expression under the given call-time
    /// bindings. The cursor sees committed entries plus this handle's
    /// flushed changes, pinned against concurrent commits.
    fn iterator<'a>(
        &'a self,
        expr: &IndexExpr,
        bindings: &BindingSet,
    ) -> EvalResult<Box<dyn Iterator<Item = EvalResult<BindingSet>> + 'a>>;

    /// The index's unique name.
    fn name(&self) -> &str;

    /// Renames the index. Expressions rewritten under the old name stop
    /// evaluating here.
    fn set_name(&mut self, name: String);

    /// The settings this indexer was built from.
    fn settings(&self) -> &IndexerSettings;
}

/// The standard [`Indexer`]: filter, codec, and store glued to the
/// transactional state machine.
pub struct StatementIndexer<C: IndexCodec> {
    settings: IndexerSettings,
    codec: C,
    filter: StatementFilter,
    store: IndexStore<C::Native>,
    buffer: MutationBuffer<C::Native>,
    staged: BTreeMap<Statement, Option<C::Native>>,
    state: State,
}

impl<C: IndexCodec> StatementIndexer<C> {
    /// Opens the backend named in `settings` and wraps it.
    pub fn new(settings: IndexerSettings, codec: C) -> Result<Self> {
        let store = IndexStore::open(settings.backend())?;
        Ok(Self::with_store(settings, codec, store))
    }

    /// Creates a handle over an existing store, sharing its committed view.
    /// This is how additional connections to one index are opened.
    pub fn with_store(settings: IndexerSettings, codec: C, store: IndexStore<C::Native>) -> Self {
        let filter = StatementFilter::new(settings.selection().clone());
        Self {
            settings,
            codec,
            filter,
            store,
            buffer: MutationBuffer::new(),
            staged: BTreeMap::new(),
            state: State::Uninitialized,
        }
    }

    /// A shareable handle on this index's store, for opening sibling
    /// connections via [`with_store`](StatementIndexer::with_store).
    pub fn store(&self) -> IndexStore<C::Native> {
        self.store.clone()
    }

    /// The codec in use.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    fn queryable(&self) -> bool {
        matches!(self.state, State::Ready | State::Dirty | State::Flushed)
    }

    fn guard_mutation(&self, op: &'static str) -> Result<()> {
        if self.queryable() {
            Ok(())
        } else {
            Err(IndexError::InvalidState {
                op,
                state: self.state.as_str(),
            })
        }
    }
}

impl<C: IndexCodec> Indexer for StatementIndexer<C> {
    fn initialize(&mut self) -> Result<()> {
        if self.state != State::Uninitialized {
            return Err(IndexError::InvalidState {
                op: "initialize",
                state: self.state.as_str(),
            });
        }
        self.state = State::Ready;
        info!(
            indexer = %self.settings.name(),
            codec = self.codec.name(),
            entries = self.store.len(),
            "indexer initialized"
        );
        Ok(())
    }

    fn add_batch(&mut self, _source: &dyn StatementSource, statements: &[Statement]) -> Result<()> {
        self.guard_mutation("add")?;
        let mut encoded = Vec::new();
        let mut skipped = 0usize;
        for statement in statements {
            if !self.filter.accepts(statement) {
                skipped += 1;
                continue;
            }
            let native = self.codec.encode(&statement.object)?;
            encoded.push((statement.clone(), native));
        }
        if encoded.is_empty() {
            debug!(indexer = %self.settings.name(), skipped, "batch add selected nothing");
            return Ok(());
        }
        debug!(
            indexer = %self.settings.name(),
            selected = encoded.len(),
            skipped,
            "buffered additions"
        );
        self.buffer.push_adds(encoded);
        self.state = State::Dirty;
        Ok(())
    }

    fn remove_batch(
        &mut self,
        _source: &dyn StatementSource,
        statements: &[Statement],
    ) -> Result<()> {
        self.guard_mutation("remove")?;
        let selected: Vec<Statement> = statements
            .iter()
            .filter(|st| self.filter.accepts(st))
            .cloned()
            .collect();
        if selected.is_empty() {
            return Ok(());
        }
        debug!(
            indexer = %self.settings.name(),
            selected = selected.len(),
            "buffered removals"
        );
        self.buffer.push_removes(selected);
        self.state = State::Dirty;
        Ok(())
    }

    fn execute_batch_add(
        &mut self,
        source: &dyn StatementSource,
        statements: &[Statement],
    ) -> bool {
        match self.add_batch(source, statements) {
            Ok(()) => true,
            Err(err) => {
                warn!(indexer = %self.settings.name(), error = %err, "batch add failed");
                false
            }
        }
    }

    fn execute_batch_remove(
        &mut self,
        source: &dyn StatementSource,
        statements: &[Statement],
    ) -> bool {
        match self.remove_batch(source, statements) {
            Ok(()) => true,
            Err(err) => {
                warn!(indexer = %self.settings.name(), error = %err, "batch remove failed");
                false
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.guard_mutation("flush")?;
        if self.buffer.is_empty() {
            return Ok(());
        }
        let ops = self.buffer.drain();
        let changes: Vec<(&Statement, Option<&C::Native>)> = ops
            .iter()
            .map(|op| match op {
                PendingOp::Add(st, native) => (st, Some(native)),
                PendingOp::Remove(st) => (st, None),
            })
            .collect();
        if let Err(err) = self.store.stage(&changes) {
            self.state = State::Faulted;
            warn!(
                indexer = %self.settings.name(),
                error = %err,
                "flush failed; rollback required"
            );
            return Err(err);
        }
        for op in ops {
            match op {
                PendingOp::Add(st, native) => {
                    self.staged.insert(st, Some(native));
                }
                PendingOp::Remove(st) => {
                    self.staged.insert(st, None);
                }
            }
        }
        self.state = State::Flushed;
        debug!(
            indexer = %self.settings.name(),
            staged = self.staged.len(),
            "flushed buffered mutations"
        );
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.guard_mutation("commit")?;
        if !self.buffer.is_empty() {
            self.flush()?;
        }
        if self.staged.is_empty() {
            self.state = State::Ready;
            return Ok(());
        }
        let started = Instant::now();
        let staged = std::mem::take(&mut self.staged);
        if let Err(err) = self.store.commit_staged(&staged) {
            self.staged = staged;
            self.state = State::Faulted;
            warn!(
                indexer = %self.settings.name(),
                error = %err,
                "commit failed; rollback required"
            );
            return Err(err);
        }
        let applied = staged.len();
        self.state = State::Ready;
        info!(
            indexer = %self.settings.name(),
            applied,
            duration_ms = started.elapsed().as_millis() as u64,
            "index transaction committed"
        );
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.queryable() && self.state != State::Faulted {
            return Err(IndexError::InvalidState {
                op: "rollback",
                state: self.state.as_str(),
            });
        }
        let dropped = self.buffer.len() + self.staged.len();
        self.buffer.clear();
        self.staged.clear();
        if let Err(err) = self.store.rollback_staged() {
            self.state = State::Faulted;
            return Err(err);
        }
        self.state = State::Ready;
        debug!(indexer = %self.settings.name(), dropped, "index transaction rolled back");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Err(IndexError::InvalidState {
                op: "close",
                state: "closed",
            });
        }
        let mut result = Ok(());
        if matches!(self.state, State::Dirty | State::Flushed | State::Faulted) {
            warn!(
                indexer = %self.settings.name(),
                "closing with uncommitted changes; rolling back"
            );
            self.buffer.clear();
            self.staged.clear();
            if let Err(err) = self.store.rollback_staged() {
                result = Err(err);
            }
        }
        self.state = State::Closed;
        debug!(indexer = %self.settings.name(), "indexer closed");
        result
    }

    fn reindex(&mut self, source: &dyn StatementSource) -> Result<()> {
        match self.state {
            State::Ready => {}
            State::Dirty | State::Flushed => {
                return Err(IndexError::InvalidState {
                    op: "reindex",
                    state: "a transaction has pending changes",
                })
            }
            other => {
                return Err(IndexError::InvalidState {
                    op: "reindex",
                    state: other.as_str(),
                })
            }
        }
        let started = Instant::now();
        let mut content = BTreeMap::new();
        let mut skipped = 0usize;
        for statement in source.statements()? {
            let statement = statement?;
            if !self.filter.accepts(&statement) {
                skipped += 1;
                continue;
            }
            let native = self.codec.encode(&statement.object)?;
            content.insert(statement, native);
        }
        let entries = content.len();
        if let Err(err) = self.store.replace_all(content) {
            self.state = State::Faulted;
            return Err(err);
        }
        info!(
            indexer = %self.settings.name(),
            entries,
            skipped,
            duration_ms = started.elapsed().as_millis() as u64,
            "index rebuilt"
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.guard_mutation("clear")?;
        let dropped = self.buffer.len() + self.staged.len();
        self.buffer.clear();
        self.staged.clear();
        if let Err(err) = self.store.rollback_staged() {
            self.state = State::Faulted;
            return Err(err);
        }
        if let Err(err) = self.store.clear() {
            self.state = State::Faulted;
            return Err(err);
        }
        self.state = State::Ready;
        if dropped > 0 {
            warn!(
                indexer = %self.settings.name(),
                dropped,
                "index cleared, pending changes discarded"
            );
        } else {
            info!(indexer = %self.settings.name(), "index cleared");
        }
        Ok(())
    }

    fn optimize(
        &self,
        plan: PlanNode,
        dataset: Option<&Dataset>,
        bindings: &BindingSet,
    ) -> PlanNode {
        if !self.queryable() {
            return plan;
        }
        rewrite::optimize(
            self.settings.name(),
            &self.filter,
            &self.codec,
            plan,
            dataset,
            bindings,
        )
    }

    fn iterator<'a>(
        &'a self,
        expr: &IndexExpr,
        bindings: &BindingSet,
    ) -> EvalResult<Box<dyn Iterator<Item = EvalResult<BindingSet>> + 'a>> {
        if !self.queryable() {
            return Err(EvalError::Index(IndexError::InvalidState {
                op: "iterate",
                state: self.state.as_str(),
            }));
        }
        if expr.indexer != self.settings.name() {
            return Err(EvalError::ForeignExpression {
                addressed: expr.indexer.clone(),
                this: self.settings.name().to_owned(),
            });
        }
        let snapshot = self.store.snapshot(self.staged.clone());
        let cursor = IndexCursor::build(&self.codec, expr.clone(), bindings, snapshot)?;
        Ok(Box::new(cursor))
    }

    fn name(&self) -> &str {
        self.settings.name()
    }

    fn set_name(&mut self, name: String) {
        self.settings.set_name(name);
    }

    fn settings(&self) -> &IndexerSettings {
        &self.settings
    }
}

impl<C: IndexCodec> Drop for StatementIndexer<C> {
    fn drop(&mut self) {
        if matches!(self.state, State::Dirty | State::Flushed | State::Faulted) {
            warn!(
                indexer = %self.settings.name(),
                "indexer dropped with uncommitted changes; rolling back"
            );
            let _ = self.store.rollback_staged();
        }
    }
}
