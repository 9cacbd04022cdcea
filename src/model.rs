//! Value model for the triples this subsystem indexes.
//!
//! The types here are deliberately small: an IRI newtype, a term enum, and an
//! immutable statement. Statement identity is the full (subject, predicate,
//! object, contexts) tuple; [`Statement::canonical_key`] renders that identity
//! as a stable N-Quads-style line used as the key text in storage backends.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vocab;

/// An IRI reference, stored as its full text.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(pub String);

impl Iri {
    /// Returns the IRI text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl From<&str> for Iri {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Iri {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single RDF term: IRI, blank node, or literal.
///
/// Term equality is lexical. Two literals with the same lexical form but
/// different datatypes are distinct terms; two WKT literals spelled
/// differently are distinct even when geometrically equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    /// An IRI term.
    Iri(Iri),
    /// A blank node with a store-local label.
    BNode(String),
    /// A literal with lexical form, datatype, and optional language tag.
    Literal {
        /// The lexical form exactly as written.
        lexical: String,
        /// Datatype IRI; plain literals carry `xsd:string`.
        datatype: Iri,
        /// Language tag for language-tagged strings.
        language: Option<String>,
    },
}

impl Term {
    /// Creates an IRI term.
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri(Iri(value.into()))
    }

    /// Creates a blank node term.
    pub fn bnode(label: impl Into<String>) -> Self {
        Self::BNode(label.into())
    }

    /// Creates a plain (`xsd:string`) literal.
    pub fn literal(lexical: impl Into<String>) -> Self {
        Self::Literal {
            lexical: lexical.into(),
            datatype: Iri::from(vocab::xsd::STRING),
            language: None,
        }
    }

    /// Creates a literal with an explicit datatype.
    pub fn typed_literal(lexical: impl Into<String>, datatype: impl Into<Iri>) -> Self {
        Self::Literal {
            lexical: lexical.into(),
            datatype: datatype.into(),
            language: None,
        }
    }

    /// Creates a language-tagged string literal.
    pub fn lang_literal(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal {
            lexical: lexical.into(),
            datatype: Iri::from(vocab::rdf::LANG_STRING),
            language: Some(language.into()),
        }
    }

    /// Returns the literal's lexical form, if this term is a literal.
    pub fn lexical(&self) -> Option<&str> {
        match self {
            Self::Literal { lexical, .. } => Some(lexical),
            _ => None,
        }
    }

    /// Returns the literal's datatype, if this term is a literal.
    pub fn datatype(&self) -> Option<&Iri> {
        match self {
            Self::Literal { datatype, .. } => Some(datatype),
            _ => None,
        }
    }

    /// True when this term is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal { .. })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "{iri}"),
            Self::BNode(label) => write!(f, "_:{label}"),
            Self::Literal {
                lexical,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", escape_literal(lexical))?;
                if let Some(lang) = language {
                    write!(f, "@{lang}")
                } else if datatype.as_str() == vocab::xsd::STRING {
                    Ok(())
                } else {
                    write!(f, "^^{datatype}")
                }
            }
        }
    }
}

impl From<Iri> for Term {
    fn from(value: Iri) -> Self {
        Self::Iri(value)
    }
}

/// One triple plus zero or more context (named graph) identifiers.
///
/// Statements are immutable value types. Identity, and therefore the key an
/// index entry is stored under, is the full tuple including contexts: the
/// same triple asserted in two graphs is two distinct statements.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Statement {
    /// Subject term (IRI or blank node by convention; not enforced here).
    pub subject: Term,
    /// Predicate IRI.
    pub predicate: Iri,
    /// Object term.
    pub object: Term,
    /// Context identifiers; empty for the default graph.
    pub contexts: Vec<Term>,
}

impl Statement {
    /// Creates a statement in the default graph.
    pub fn new(subject: Term, predicate: impl Into<Iri>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
            contexts: Vec::new(),
        }
    }

    /// Returns the same statement with the given contexts.
    pub fn with_contexts(mut self, contexts: Vec<Term>) -> Self {
        self.contexts = contexts;
        self
    }

    /// Renders the statement's identity as a stable, human-readable line.
    ///
    /// The format follows N-Quads conventions (all contexts appended before
    /// the terminating dot) and is injective: distinct statements produce
    /// distinct keys. Backends use this as their primary key text.
    pub fn canonical_key(&self) -> String {
        use fmt::Write;
        let mut out = String::with_capacity(64);
        let _ = write!(out, "{} {} {}", self.subject, self.predicate, self.object);
        for ctx in &self.contexts {
            let _ = write!(out, " {ctx}");
        }
        out.push_str(" .");
        out
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_key())
    }
}

fn escape_literal(lexical: &str) -> String {
    let mut out = String::with_capacity(lexical.len());
    for ch in lexical.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}
