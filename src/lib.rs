//! Pluggable transactional secondary indexes for triple stores.
//!
//! A host store attaches one or more named indexers, each configured with a
//! [`SelectionRule`] deciding which statements it covers and an
//! [`IndexCodec`] deciding how object values are represented and queried.
//! Index mutation rides the host's transactions: batches buffer, `flush`
//! stages them (visible to the flushing handle only), `commit` publishes
//! them atomically to every handle, `rollback` discards them. On the query
//! side, [`Indexer::optimize`] rewrites plan fragments the index provably
//! covers into [`PlanNode::IndexLookup`] nodes, and [`Indexer::iterator`]
//! evaluates those against a pinned snapshot.
//!
//! Two dialects ship in-tree: [`spatial`] (WKT geometries, envelope
//! queries) and [`keyword`] (token containment). New dialects implement
//! [`IndexCodec`]; new storage lives behind
//! [`store::backend::StorageBackend`].

#![forbid(unsafe_code)]

pub mod algebra;
mod buffer;
pub mod codec;
mod cursor;
pub mod error;
pub mod filter;
pub mod indexer;
pub mod keyword;
pub mod model;
mod rewrite;
pub mod settings;
pub mod source;
pub mod spatial;
pub mod store;
pub mod vocab;

pub use algebra::{
    BindingSet, Constraint, Dataset, IndexExpr, PatternTerm, PlanNode, TriplePattern, Var,
};
pub use codec::{IndexCodec, NativeValue};
pub use error::{EvalError, EvalResult, IndexError, Result};
pub use filter::{CustomRule, SelectionRule, StatementFilter};
pub use indexer::{Indexer, StatementIndexer};
pub use keyword::KeywordCodec;
pub use model::{Iri, Statement, Term};
pub use settings::{BackendConfig, IndexerSettings};
pub use source::StatementSource;
pub use spatial::GeometryCodec;
pub use store::IndexStore;
