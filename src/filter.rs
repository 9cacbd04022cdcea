//! Statement selection: which statements belong to an index.
//!
//! A [`SelectionRule`] is evaluated per statement at mutation time, and the
//! same rule decides at rewrite time whether a triple pattern can only ever
//! match indexed statements (see [`StatementFilter::covers`]). Those two
//! judgements agreeing is what makes plan rewriting safe.

use std::fmt::Debug;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::algebra::{PatternTerm, TriplePattern, Var};
use crate::model::{Iri, Statement, Term};

/// An opaque, caller-supplied selection predicate.
///
/// Custom rules never participate in plan rewriting: the rewriter cannot
/// prove anything about them, so patterns they select are left to the host.
pub trait CustomRule: Debug + Send + Sync {
    /// True when the statement belongs to the index.
    fn matches(&self, statement: &Statement) -> bool;
}

/// Declarative rule for selecting statements into an index.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Statements with exactly this predicate.
    Predicate(Iri),
    /// Statements whose object is a literal of exactly this datatype.
    Datatype(Iri),
    /// Statements matching at least one sub-rule. Empty matches nothing.
    AnyOf(Vec<SelectionRule>),
    /// Statements matching every sub-rule. Empty matches everything.
    AllOf(Vec<SelectionRule>),
    /// An opaque predicate; not serializable and never claimed at rewrite.
    #[serde(skip)]
    Custom(Arc<dyn CustomRule>),
}

impl SelectionRule {
    /// Evaluates the rule against one statement.
    pub fn accepts(&self, statement: &Statement) -> bool {
        match self {
            Self::Predicate(p) => statement.predicate == *p,
            Self::Datatype(d) => statement.object.datatype() == Some(d),
            Self::AnyOf(rules) => rules.iter().any(|r| r.accepts(statement)),
            Self::AllOf(rules) => rules.iter().all(|r| r.accepts(statement)),
            Self::Custom(rule) => rule.matches(statement),
        }
    }
}

impl PartialEq for SelectionRule {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Predicate(a), Self::Predicate(b)) => a == b,
            (Self::Datatype(a), Self::Datatype(b)) => a == b,
            (Self::AnyOf(a), Self::AnyOf(b)) => a == b,
            (Self::AllOf(a), Self::AllOf(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Applies a [`SelectionRule`] to statements and to triple patterns.
#[derive(Clone, Debug)]
pub struct StatementFilter {
    rule: SelectionRule,
}

impl StatementFilter {
    /// Wraps a selection rule.
    pub fn new(rule: SelectionRule) -> Self {
        Self { rule }
    }

    /// The underlying rule.
    pub fn rule(&self) -> &SelectionRule {
        &self.rule
    }

    /// True when the statement belongs to the index.
    pub fn accepts(&self, statement: &Statement) -> bool {
        self.rule.accepts(statement)
    }

    /// True when every statement the pattern can match is selected by the
    /// rule, so an index scan loses nothing against a full-store scan.
    ///
    /// `constrained` names the variables restricted by a recognized function
    /// constraint in scope; a datatype rule covers a variable object slot
    /// only through such a constraint, whose semantics are defined as
    /// index-native.
    pub fn covers(&self, pattern: &TriplePattern, constrained: &FxHashSet<Var>) -> bool {
        Self::rule_covers(&self.rule, pattern, constrained)
    }

    fn rule_covers(
        rule: &SelectionRule,
        pattern: &TriplePattern,
        constrained: &FxHashSet<Var>,
    ) -> bool {
        match rule {
            SelectionRule::Predicate(p) => matches!(
                pattern.predicate.as_const(),
                Some(Term::Iri(iri)) if iri == p
            ),
            SelectionRule::Datatype(d) => match &pattern.object {
                PatternTerm::Const(term) => term.datatype() == Some(d),
                PatternTerm::Var(v) => constrained.contains(v),
            },
            SelectionRule::AnyOf(rules) => rules
                .iter()
                .any(|r| Self::rule_covers(r, pattern, constrained)),
            SelectionRule::AllOf(rules) => rules
                .iter()
                .all(|r| Self::rule_covers(r, pattern, constrained)),
            SelectionRule::Custom(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab;

    #[derive(Debug)]
    struct SubjectPrefix(&'static str);

    impl CustomRule for SubjectPrefix {
        fn matches(&self, statement: &Statement) -> bool {
            matches!(&statement.subject, Term::Iri(iri) if iri.as_str().starts_with(self.0))
        }
    }

    fn geo_statement() -> Statement {
        Statement::new(
            Term::iri("http://example.com/a"),
            Iri::from(vocab::geo::HAS_WKT),
            Term::typed_literal("POINT (1 1)", Iri::from(vocab::geo::WKT)),
        )
    }

    fn label_statement() -> Statement {
        Statement::new(
            Term::iri("http://example.com/a"),
            Iri::from("http://example.com/label"),
            Term::literal("city park"),
        )
    }

    #[test]
    fn predicate_rule_matches_exact_predicate() {
        let rule = SelectionRule::Predicate(Iri::from(vocab::geo::HAS_WKT));
        assert!(rule.accepts(&geo_statement()));
        assert!(!rule.accepts(&label_statement()));
    }

    #[test]
    fn datatype_rule_requires_literal_object() {
        let rule = SelectionRule::Datatype(Iri::from(vocab::geo::WKT));
        assert!(rule.accepts(&geo_statement()));
        assert!(!rule.accepts(&label_statement()));
        let iri_object = Statement::new(
            Term::iri("http://example.com/a"),
            Iri::from(vocab::geo::HAS_WKT),
            Term::iri("http://example.com/geom"),
        );
        assert!(!rule.accepts(&iri_object));
    }

    #[test]
    fn empty_combinators() {
        let st = geo_statement();
        assert!(!SelectionRule::AnyOf(Vec::new()).accepts(&st));
        assert!(SelectionRule::AllOf(Vec::new()).accepts(&st));
    }

    #[test]
    fn custom_rule_applies() {
        let rule = SelectionRule::Custom(Arc::new(SubjectPrefix("http://example.com/")));
        assert!(rule.accepts(&geo_statement()));
        let other = Statement::new(
            Term::iri("http://other.org/x"),
            Iri::from("http://example.com/label"),
            Term::literal("x"),
        );
        assert!(!rule.accepts(&other));
    }

    #[test]
    fn predicate_rule_covers_constant_predicate() {
        let filter = StatementFilter::new(SelectionRule::Predicate(Iri::from(
            vocab::geo::HAS_WKT,
        )));
        let covered = TriplePattern::new(
            PatternTerm::var("s"),
            Term::iri(vocab::geo::HAS_WKT),
            PatternTerm::var("o"),
        );
        let uncovered = TriplePattern::new(
            PatternTerm::var("s"),
            PatternTerm::var("p"),
            PatternTerm::var("o"),
        );
        let none = FxHashSet::default();
        assert!(filter.covers(&covered, &none));
        assert!(!filter.covers(&uncovered, &none));
    }

    #[test]
    fn datatype_rule_covers_via_constraint_scope() {
        let filter = StatementFilter::new(SelectionRule::Datatype(Iri::from(vocab::geo::WKT)));
        let pattern = TriplePattern::new(
            PatternTerm::var("s"),
            Term::iri(vocab::geo::HAS_WKT),
            PatternTerm::var("g"),
        );
        let none = FxHashSet::default();
        assert!(!filter.covers(&pattern, &none));
        let mut scoped = FxHashSet::default();
        scoped.insert(Var::from("g"));
        assert!(filter.covers(&pattern, &scoped));
    }

    #[test]
    fn datatype_rule_covers_constant_object_of_that_datatype() {
        let filter = StatementFilter::new(SelectionRule::Datatype(Iri::from(vocab::geo::WKT)));
        let none = FxHashSet::default();
        let matching = TriplePattern::new(
            PatternTerm::var("s"),
            PatternTerm::var("p"),
            Term::typed_literal("POINT (0 0)", Iri::from(vocab::geo::WKT)),
        );
        assert!(filter.covers(&matching, &none));
        let plain = TriplePattern::new(
            PatternTerm::var("s"),
            PatternTerm::var("p"),
            Term::literal("POINT (0 0)"),
        );
        assert!(!filter.covers(&plain, &none));
    }

    #[test]
    fn custom_rule_never_covers() {
        let filter = StatementFilter::new(SelectionRule::Custom(Arc::new(SubjectPrefix(
            "http://example.com/",
        ))));
        let pattern = TriplePattern::new(
            Term::iri("http://example.com/a"),
            Term::iri(vocab::geo::HAS_WKT),
            PatternTerm::var("o"),
        );
        assert!(!filter.covers(&pattern, &FxHashSet::default()));
    }
}
