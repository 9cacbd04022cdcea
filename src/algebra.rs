//! A narrow query-plan algebra shared with the host store.
//!
//! The host hands [`PlanNode`] trees to [`Indexer::optimize`] and evaluates
//! whatever comes back; the only node the rewriter ever introduces is
//! [`PlanNode::IndexLookup`]. The algebra is deliberately small (patterns,
//! inner joins, and constraint filters) because that is the fragment an
//! index can claim.
//!
//! [`Indexer::optimize`]: crate::indexer::Indexer::optimize

use std::collections::BTreeMap;
use std::fmt;

use crate::model::{Iri, Term};

/// A named query variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(pub String);

impl Var {
    /// Returns the variable name without decoration.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

impl From<&str> for Var {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// One slot of a triple pattern: a variable or a constant term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternTerm {
    /// An unbound slot, named by a variable.
    Var(Var),
    /// A fixed term the slot must equal.
    Const(Term),
}

impl PatternTerm {
    /// Shorthand for a variable slot.
    pub fn var(name: &str) -> Self {
        Self::Var(Var::from(name))
    }

    /// Returns the variable if this slot is one.
    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Self::Var(v) => Some(v),
            Self::Const(_) => None,
        }
    }

    /// Returns the constant term if this slot is one.
    pub fn as_const(&self) -> Option<&Term> {
        match self {
            Self::Var(_) => None,
            Self::Const(t) => Some(t),
        }
    }
}

impl fmt::Display for PatternTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(v) => v.fmt(f),
            Self::Const(t) => t.fmt(f),
        }
    }
}

impl From<Term> for PatternTerm {
    fn from(value: Term) -> Self {
        Self::Const(value)
    }
}

impl From<Iri> for PatternTerm {
    fn from(value: Iri) -> Self {
        Self::Const(Term::Iri(value))
    }
}

impl From<Var> for PatternTerm {
    fn from(value: Var) -> Self {
        Self::Var(value)
    }
}

/// A subject/predicate/object pattern over the statement set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriplePattern {
    /// Subject slot.
    pub subject: PatternTerm,
    /// Predicate slot.
    pub predicate: PatternTerm,
    /// Object slot.
    pub object: PatternTerm,
}

impl TriplePattern {
    /// Creates a pattern from its three slots.
    pub fn new(
        subject: impl Into<PatternTerm>,
        predicate: impl Into<PatternTerm>,
        object: impl Into<PatternTerm>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Iterates the variables appearing in this pattern.
    pub fn vars(&self) -> impl Iterator<Item = &Var> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .filter_map(PatternTerm::as_var)
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A function constraint such as `search:within(?geo, shape)`.
///
/// By convention the first argument is the value being tested; the remaining
/// arguments parameterize the function. Which functions mean anything is up
/// to the codec of whichever index claims the constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraint {
    /// Function IRI.
    pub function: Iri,
    /// Arguments; `args[0]` is the tested value.
    pub args: Vec<PatternTerm>,
}

impl Constraint {
    /// Creates a constraint from a function IRI and its arguments.
    pub fn new(function: impl Into<Iri>, args: Vec<PatternTerm>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }

    /// Returns the tested slot (`args[0]`), if present.
    pub fn tested(&self) -> Option<&PatternTerm> {
        self.args.first()
    }

    /// Iterates the variables appearing in the arguments.
    pub fn vars(&self) -> impl Iterator<Item = &Var> {
        self.args.iter().filter_map(PatternTerm::as_var)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            arg.fmt(f)?;
        }
        f.write_str(")")
    }
}

/// A query-plan fragment, as handed over by the host store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanNode {
    /// Scan the statement set for matches of one pattern.
    Pattern(TriplePattern),
    /// Inner join of two sub-plans on their shared variables.
    Join {
        /// Left input.
        left: Box<PlanNode>,
        /// Right input.
        right: Box<PlanNode>,
    },
    /// Keep only solutions satisfying a function constraint.
    Filter {
        /// The constraint to test.
        constraint: Constraint,
        /// The filtered input.
        input: Box<PlanNode>,
    },
    /// A fragment claimed by an index; evaluated through
    /// [`Indexer::iterator`](crate::indexer::Indexer::iterator).
    IndexLookup(IndexExpr),
}

impl PlanNode {
    /// Joins two sub-plans.
    pub fn join(left: PlanNode, right: PlanNode) -> Self {
        Self::Join {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Filters a sub-plan by a constraint.
    pub fn filter(constraint: Constraint, input: PlanNode) -> Self {
        Self::Filter {
            constraint,
            input: Box::new(input),
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            Self::Pattern(p) => writeln!(f, "{pad}Pattern {p}"),
            Self::Join { left, right } => {
                writeln!(f, "{pad}Join")?;
                left.fmt_indented(f, depth + 1)?;
                right.fmt_indented(f, depth + 1)
            }
            Self::Filter { constraint, input } => {
                writeln!(f, "{pad}Filter {constraint}")?;
                input.fmt_indented(f, depth + 1)
            }
            Self::IndexLookup(expr) => {
                writeln!(f, "{pad}IndexLookup [{}]", expr.indexer)?;
                for p in &expr.patterns {
                    writeln!(f, "{pad}  {p}")?;
                }
                for c in &expr.constraints {
                    writeln!(f, "{pad}  {c}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// The plan fragment an index has claimed: the patterns it will resolve,
/// the constraints it will apply natively, and the context captured from
/// the rewrite call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexExpr {
    /// Name of the indexer this expression belongs to.
    pub indexer: String,
    /// Claimed patterns, joined on shared variables.
    pub patterns: Vec<TriplePattern>,
    /// Absorbed constraints, applied natively during the scan.
    pub constraints: Vec<Constraint>,
    /// Bindings captured when the plan was rewritten.
    pub pre_bound: BindingSet,
    /// Graph restriction captured from the dataset, if any.
    pub graphs: Option<Vec<Term>>,
}

impl IndexExpr {
    /// Iterates the variables appearing in patterns and constraints.
    pub fn vars(&self) -> impl Iterator<Item = &Var> {
        self.patterns
            .iter()
            .flat_map(TriplePattern::vars)
            .chain(self.constraints.iter().flat_map(Constraint::vars))
    }

    /// True when the expression binds the given variable.
    pub fn binds(&self, var: &Var) -> bool {
        self.patterns.iter().any(|p| p.vars().any(|v| v == var))
    }
}

/// A set of variable-to-term bindings, one solution row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingSet(BTreeMap<Var, Term>);

impl BindingSet {
    /// Creates an empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the set with `var` bound to `term` (builder style).
    pub fn bind(mut self, var: impl Into<Var>, term: Term) -> Self {
        self.0.insert(var.into(), term);
        self
    }

    /// Binds `var` to `term`, replacing any previous binding.
    pub fn set(&mut self, var: Var, term: Term) {
        self.0.insert(var, term);
    }

    /// Binds `var` to `term` unless it is already bound to a different term.
    ///
    /// Returns false on conflict, leaving the set unchanged.
    pub fn set_checked(&mut self, var: Var, term: Term) -> bool {
        match self.0.get(&var) {
            Some(existing) => *existing == term,
            None => {
                self.0.insert(var, term);
                true
            }
        }
    }

    /// Looks up the term bound to `var`.
    pub fn get(&self, var: &Var) -> Option<&Term> {
        self.0.get(var)
    }

    /// True when `var` is bound.
    pub fn contains(&self, var: &Var) -> bool {
        self.0.contains_key(var)
    }

    /// Number of bound variables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates bindings in variable order.
    pub fn iter(&self) -> impl Iterator<Item = (&Var, &Term)> {
        self.0.iter()
    }
}

impl fmt::Display for BindingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (var, term)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{var}={term}")?;
        }
        f.write_str("}")
    }
}

impl FromIterator<(Var, Term)> for BindingSet {
    fn from_iter<I: IntoIterator<Item = (Var, Term)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The active dataset of a query: which graphs are in scope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dataset {
    /// Graph identifiers in scope; a statement qualifies when any of its
    /// contexts is listed.
    pub graphs: Vec<Term>,
}

impl Dataset {
    /// Creates a dataset restricted to the given graphs.
    pub fn new(graphs: Vec<Term>) -> Self {
        Self { graphs }
    }
}
