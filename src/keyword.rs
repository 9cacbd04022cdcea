//! Keyword dialect: string literals tokenized into lowercase word sets,
//! queried with `search:matches` (all query tokens must be present).

use std::collections::BTreeSet;

use crate::codec::IndexCodec;
use crate::error::{IndexError, Result};
use crate::model::{Iri, Term};
use crate::vocab;

/// Codec tokenizing string-valued objects for containment queries.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordCodec;

impl KeywordCodec {
    /// Creates the codec.
    pub fn new() -> Self {
        Self
    }
}

/// Lowercases and splits on non-alphanumeric characters; empty tokens drop.
fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

impl IndexCodec for KeywordCodec {
    type Native = BTreeSet<String>;
    type Query = Vec<String>;

    fn name(&self) -> &str {
        "keyword"
    }

    fn encode(&self, object: &Term) -> Result<Self::Native> {
        let lexical = object
            .lexical()
            .ok_or_else(|| IndexError::Codec(format!("not a literal: {object}")))?;
        Ok(tokenize(lexical))
    }

    /// Canonical form: tokens joined by spaces. The original text is not
    /// recoverable.
    fn decode(&self, native: &Self::Native) -> Term {
        let joined = native.iter().cloned().collect::<Vec<_>>().join(" ");
        Term::literal(joined)
    }

    fn recognizes(&self, function: &Iri) -> bool {
        function.as_str() == vocab::search::MATCHES
    }

    fn compile(&self, function: &Iri, params: &[Term]) -> Result<Self::Query> {
        if function.as_str() != vocab::search::MATCHES {
            return Err(IndexError::Codec(format!(
                "unsupported keyword function {function}"
            )));
        }
        let [query] = params else {
            return Err(IndexError::Codec(format!(
                "{function} wants one query argument, got {}",
                params.len()
            )));
        };
        let lexical = query
            .lexical()
            .ok_or_else(|| IndexError::Codec(format!("query must be a literal, got {query}")))?;
        let tokens: Vec<String> = tokenize(lexical).into_iter().collect();
        if tokens.is_empty() {
            return Err(IndexError::Codec("empty keyword query".into()));
        }
        Ok(tokens)
    }

    fn matches(&self, query: &Self::Query, value: &Self::Native) -> bool {
        query.iter().all(|token| value.contains(token))
    }
}
