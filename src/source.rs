//! Read access to the primary statement store.
//!
//! Batch mutation and [`reindex`](crate::indexer::Indexer::reindex) receive a
//! [`StatementSource`] so an index can be rebuilt from, or validated against,
//! the store's current statements without this crate knowing how the host
//! stores them. In-memory collections implement the trait directly, which is
//! what the tests use.

use crate::error::Result;
use crate::model::Statement;

/// A stream of statements from the primary store.
pub trait StatementSource {
    /// Opens an iterator over all statements.
    ///
    /// Items are `Result` so a host can surface storage failures mid-stream;
    /// consumers stop at the first error.
    fn statements(&self) -> Result<Box<dyn Iterator<Item = Result<Statement>> + '_>>;
}

impl StatementSource for [Statement] {
    fn statements(&self) -> Result<Box<dyn Iterator<Item = Result<Statement>> + '_>> {
        Ok(Box::new(self.iter().cloned().map(Ok)))
    }
}

impl StatementSource for Vec<Statement> {
    fn statements(&self) -> Result<Box<dyn Iterator<Item = Result<Statement>> + '_>> {
        self.as_slice().statements()
    }
}
