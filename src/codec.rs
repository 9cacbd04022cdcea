//! The codec seam: how a dialect plugs into the generic index machinery.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::model::{Iri, Term};

/// Bounds every native value representation must satisfy.
///
/// Entries are shared across connection handles and serialized into storage
/// backends, hence the `Send + Sync` and serde requirements.
pub trait NativeValue:
    Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> NativeValue for T where
    T: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// A dialect: translates object terms into a native representation and
/// interprets the query functions the rewriter may absorb for it.
///
/// A codec is consulted in three places. At mutation time [`encode`] turns
/// each selected statement's object into a native value, failing the batch
/// if the value is malformed. At rewrite time [`recognizes`] tells the
/// rewriter which function constraints restrict a variable to indexable
/// values. At evaluation time [`compile`] turns a recognized function with
/// ground parameters into a native query, and [`matches`] tests candidates
/// against it.
///
/// [`encode`]: IndexCodec::encode
/// [`recognizes`]: IndexCodec::recognizes
/// [`compile`]: IndexCodec::compile
/// [`matches`]: IndexCodec::matches
pub trait IndexCodec: Send + Sync {
    /// Native representation stored per entry.
    type Native: NativeValue;

    /// Compiled form of a recognized query function.
    type Query: Clone + Debug;

    /// Short dialect name for logs, e.g. `spatial-wkt`.
    fn name(&self) -> &str;

    /// Encodes a statement object into its native representation.
    ///
    /// Must be deterministic. Errors reject the whole mutation batch, so a
    /// codec should fail only for values it can never index.
    fn encode(&self, object: &Term) -> Result<Self::Native>;

    /// Renders a native value back into a term.
    ///
    /// The result is a canonical form; it need not reproduce the original
    /// lexical text.
    fn decode(&self, native: &Self::Native) -> Term;

    /// True when this codec interprets the given query function.
    fn recognizes(&self, function: &Iri) -> bool;

    /// Compiles a recognized function into a native query.
    ///
    /// `params` holds the ground arguments after the tested slot (`args[0]`
    /// of the constraint). Fails for wrong arity or malformed parameters.
    fn compile(&self, function: &Iri, params: &[Term]) -> Result<Self::Query>;

    /// Tests one native value against a compiled query.
    fn matches(&self, query: &Self::Query, value: &Self::Native) -> bool;
}
