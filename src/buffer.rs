//! Pending mutations between batch calls and flush.

use crate::model::Statement;

/// One buffered mutation, already filtered and encoded.
#[derive(Clone, Debug)]
pub(crate) enum PendingOp<N> {
    Add(Statement, N),
    Remove(Statement),
}

/// Accumulates mutations in call order until the next flush.
///
/// Encoding happens before anything is pushed, so a failed batch leaves the
/// buffer exactly as it was.
#[derive(Debug, Default)]
pub(crate) struct MutationBuffer<N> {
    ops: Vec<PendingOp<N>>,
}

impl<N> MutationBuffer<N> {
    pub(crate) fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub(crate) fn push_adds(&mut self, entries: Vec<(Statement, N)>) {
        self.ops
            .extend(entries.into_iter().map(|(st, n)| PendingOp::Add(st, n)));
    }

    pub(crate) fn push_removes(&mut self, statements: Vec<Statement>) {
        self.ops.extend(statements.into_iter().map(PendingOp::Remove));
    }

    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Takes all buffered operations, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<PendingOp<N>> {
        std::mem::take(&mut self.ops)
    }

    pub(crate) fn clear(&mut self) {
        self.ops.clear();
    }
}
