//! Error types shared across the crate.

use thiserror::Error;

/// Convenience alias for fallible index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Convenience alias for fallible query evaluation.
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Errors raised by index lifecycle and mutation operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An object value could not be encoded or a query argument was invalid.
    #[error("codec: {0}")]
    Codec(String),

    /// The storage backend rejected an operation.
    #[error("backend: {0}")]
    Backend(String),

    /// An embedded SQLite backend failed.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An entry could not be serialized or deserialized.
    #[error("serialization: {0}")]
    Serialization(String),

    /// The primary store failed while streaming statements.
    #[error("statement source: {0}")]
    Source(String),

    /// A settings document was malformed.
    #[error("config: {0}")]
    Config(String),

    /// The operation is not permitted in the indexer's current state.
    #[error("cannot {op} while {state}")]
    InvalidState {
        /// The rejected operation.
        op: &'static str,
        /// The state the indexer was in.
        state: &'static str,
    },

    /// An I/O error outside of SQLite.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while rewriting or evaluating index expressions.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Caller-supplied bindings conflict with the expression or have the
    /// wrong shape for a recognized function.
    #[error("malformed bindings: {0}")]
    MalformedBindings(String),

    /// The expression references a function no codec recognizes.
    #[error("unrecognized index function <{0}>")]
    UnknownFunction(String),

    /// The expression was produced for a different indexer.
    #[error("expression addressed to indexer '{addressed}', evaluated by '{this}'")]
    ForeignExpression {
        /// Indexer name recorded in the expression.
        addressed: String,
        /// Name of the indexer asked to evaluate it.
        this: String,
    },

    /// An index-level failure surfaced during evaluation.
    #[error(transparent)]
    Index(#[from] IndexError),
}
