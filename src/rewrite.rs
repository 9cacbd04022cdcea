//! Plan rewriting: replace covered plan fragments with index lookups.
//!
//! The rewriter walks the host's plan bottom-up. A pattern becomes a lookup
//! when the filter proves every statement it can match is indexed
//! ([`StatementFilter::covers`]); adjacent lookups of the same index fuse
//! when they share a variable; a recognized function constraint is pushed
//! into a lookup that can resolve all its variables. Anything unprovable is
//! returned unchanged for the host to evaluate.

use rustc_hash::FxHashSet;

use crate::algebra::{
    BindingSet, Constraint, Dataset, IndexExpr, PatternTerm, PlanNode, TriplePattern, Var,
};
use crate::codec::IndexCodec;
use crate::filter::StatementFilter;

pub(crate) fn optimize<C: IndexCodec>(
    indexer: &str,
    filter: &StatementFilter,
    codec: &C,
    plan: PlanNode,
    dataset: Option<&Dataset>,
    bindings: &BindingSet,
) -> PlanNode {
    let rewriter = Rewriter {
        indexer,
        filter,
        codec,
        dataset,
        bindings,
    };
    rewriter.rewrite(plan, &FxHashSet::default())
}

struct Rewriter<'a, C: IndexCodec> {
    indexer: &'a str,
    filter: &'a StatementFilter,
    codec: &'a C,
    dataset: Option<&'a Dataset>,
    bindings: &'a BindingSet,
}

impl<C: IndexCodec> Rewriter<'_, C> {
    /// `scope` holds variables restricted by a recognized constraint in an
    /// enclosing filter; a datatype rule may cover a variable object slot
    /// only through that restriction.
    fn rewrite(&self, node: PlanNode, scope: &FxHashSet<Var>) -> PlanNode {
        match node {
            PlanNode::Pattern(pattern) => {
                if self.filter.covers(&pattern, scope) {
                    PlanNode::IndexLookup(self.lookup(pattern))
                } else {
                    PlanNode::Pattern(pattern)
                }
            }
            PlanNode::Join { left, right } => {
                let left = self.rewrite(*left, scope);
                let right = self.rewrite(*right, scope);
                self.fuse(left, right)
            }
            PlanNode::Filter { constraint, input } => {
                let recognized = self.codec.recognizes(&constraint.function);
                let input = if recognized {
                    let mut inner = scope.clone();
                    if let Some(PatternTerm::Var(v)) = constraint.tested() {
                        inner.insert(v.clone());
                    }
                    self.rewrite(*input, &inner)
                } else {
                    self.rewrite(*input, scope)
                };
                if recognized {
                    match self.absorb(input, constraint) {
                        Ok(node) => node,
                        Err((input, constraint)) => PlanNode::filter(constraint, input),
                    }
                } else {
                    PlanNode::filter(constraint, input)
                }
            }
            // Lookups already claimed (by this index or another) pass through.
            PlanNode::IndexLookup(expr) => PlanNode::IndexLookup(expr),
        }
    }

    fn lookup(&self, pattern: TriplePattern) -> IndexExpr {
        IndexExpr {
            indexer: self.indexer.to_owned(),
            patterns: vec![pattern],
            constraints: Vec::new(),
            pre_bound: self.bindings.clone(),
            graphs: self.dataset.map(|d| d.graphs.clone()),
        }
    }

    /// Merges two lookups of this index into one when they share a variable,
    /// so the cursor joins them natively.
    fn fuse(&self, left: PlanNode, right: PlanNode) -> PlanNode {
        match (left, right) {
            (PlanNode::IndexLookup(a), PlanNode::IndexLookup(b))
                if a.indexer == self.indexer
                    && b.indexer == self.indexer
                    && shares_var(&a, &b) =>
            {
                let mut fused = a;
                fused.patterns.extend(b.patterns);
                fused.constraints.extend(b.constraints);
                PlanNode::IndexLookup(fused)
            }
            (left, right) => PlanNode::join(left, right),
        }
    }

    /// Pushes a recognized constraint into a lookup that anchors it,
    /// descending through joins. `Err` hands back both pieces unchanged.
    fn absorb(
        &self,
        node: PlanNode,
        constraint: Constraint,
    ) -> Result<PlanNode, (PlanNode, Constraint)> {
        match node {
            PlanNode::IndexLookup(expr)
                if expr.indexer == self.indexer && anchors(&expr, &constraint) =>
            {
                let mut expr = expr;
                expr.constraints.push(constraint);
                Ok(PlanNode::IndexLookup(expr))
            }
            PlanNode::Join { left, right } => match self.absorb(*left, constraint) {
                Ok(node) => Ok(PlanNode::join(node, *right)),
                Err((left, constraint)) => match self.absorb(*right, constraint) {
                    Ok(node) => Ok(PlanNode::join(left, node)),
                    Err((right, constraint)) => Err((PlanNode::join(left, right), constraint)),
                },
            },
            other => Err((other, constraint)),
        }
    }
}

/// Every constraint variable is resolvable inside the expression: bound by
/// its patterns or fixed in its captured bindings.
fn anchors(expr: &IndexExpr, constraint: &Constraint) -> bool {
    constraint
        .vars()
        .all(|v| expr.binds(v) || expr.pre_bound.contains(v))
}

fn shares_var(a: &IndexExpr, b: &IndexExpr) -> bool {
    let left: FxHashSet<&Var> = a.vars().collect();
    b.vars().any(|v| left.contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SelectionRule;
    use crate::keyword::KeywordCodec;
    use crate::model::{Iri, Term};
    use crate::spatial::GeometryCodec;
    use crate::vocab;

    const LABEL: &str = "http://example.com/label";

    fn label_filter() -> StatementFilter {
        StatementFilter::new(SelectionRule::Predicate(Iri::from(LABEL)))
    }

    fn geo_filter() -> StatementFilter {
        StatementFilter::new(SelectionRule::Datatype(Iri::from(vocab::geo::WKT)))
    }

    fn label_pattern(subject: &str, object: &str) -> TriplePattern {
        TriplePattern::new(
            PatternTerm::var(subject),
            Term::iri(LABEL),
            PatternTerm::var(object),
        )
    }

    fn matches_constraint(var: &str, query: &str) -> Constraint {
        Constraint::new(
            vocab::search::MATCHES,
            vec![PatternTerm::var(var), Term::literal(query).into()],
        )
    }

    fn within_constraint(var: &str, shape: &str) -> Constraint {
        Constraint::new(
            vocab::search::WITHIN,
            vec![PatternTerm::var(var), Term::literal(shape).into()],
        )
    }

    fn run(filter: &StatementFilter, codec: &impl IndexCodec, plan: PlanNode) -> PlanNode {
        optimize("idx", filter, codec, plan, None, &BindingSet::new())
    }

    #[test]
    fn covered_pattern_becomes_lookup() {
        let plan = PlanNode::Pattern(label_pattern("s", "o"));
        let rewritten = run(&label_filter(), &KeywordCodec::new(), plan);
        match rewritten {
            PlanNode::IndexLookup(expr) => {
                assert_eq!(expr.indexer, "idx");
                assert_eq!(expr.patterns, vec![label_pattern("s", "o")]);
                assert!(expr.constraints.is_empty());
                assert_eq!(expr.graphs, None);
            }
            other => panic!("expected lookup, got {other:?}"),
        }
    }

    #[test]
    fn uncovered_plan_is_returned_unchanged() {
        let plan = PlanNode::Pattern(TriplePattern::new(
            PatternTerm::var("s"),
            PatternTerm::var("p"),
            PatternTerm::var("o"),
        ));
        let rewritten = run(&label_filter(), &KeywordCodec::new(), plan.clone());
        assert_eq!(rewritten, plan);
    }

    #[test]
    fn recognized_filter_is_absorbed() {
        let plan = PlanNode::filter(
            matches_constraint("o", "park"),
            PlanNode::Pattern(label_pattern("s", "o")),
        );
        let rewritten = run(&label_filter(), &KeywordCodec::new(), plan);
        match rewritten {
            PlanNode::IndexLookup(expr) => {
                assert_eq!(expr.constraints, vec![matches_constraint("o", "park")]);
            }
            other => panic!("expected lookup, got {other:?}"),
        }
    }

    #[test]
    fn datatype_rule_needs_the_constraint_in_scope() {
        let pattern = TriplePattern::new(
            PatternTerm::var("s"),
            Term::iri(vocab::geo::HAS_WKT),
            PatternTerm::var("g"),
        );
        let bare = PlanNode::Pattern(pattern.clone());
        let rewritten = run(&geo_filter(), &GeometryCodec::new(), bare.clone());
        assert_eq!(rewritten, bare);

        let constrained = PlanNode::filter(
            within_constraint("g", "ENVELOPE (0, 10, 10, 0)"),
            PlanNode::Pattern(pattern),
        );
        let rewritten = run(&geo_filter(), &GeometryCodec::new(), constrained);
        match rewritten {
            PlanNode::IndexLookup(expr) => assert_eq!(expr.constraints.len(), 1),
            other => panic!("expected lookup, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_function_is_left_to_the_host() {
        let plan = PlanNode::filter(
            Constraint::new(
                "http://example.com/fn#regex",
                vec![PatternTerm::var("o"), Term::literal("^a").into()],
            ),
            PlanNode::Pattern(label_pattern("s", "o")),
        );
        let rewritten = run(&label_filter(), &KeywordCodec::new(), plan);
        match rewritten {
            PlanNode::Filter { constraint, input } => {
                assert_eq!(constraint.function, Iri::from("http://example.com/fn#regex"));
                assert!(matches!(*input, PlanNode::IndexLookup(_)));
            }
            other => panic!("expected filter over lookup, got {other:?}"),
        }
    }

    #[test]
    fn lookups_sharing_a_variable_fuse() {
        let rule = SelectionRule::AnyOf(vec![
            SelectionRule::Predicate(Iri::from(LABEL)),
            SelectionRule::Predicate(Iri::from("http://example.com/alias")),
        ]);
        let filter = StatementFilter::new(rule);
        let alias_pattern = TriplePattern::new(
            PatternTerm::var("s"),
            Term::iri("http://example.com/alias"),
            PatternTerm::var("a"),
        );
        let plan = PlanNode::join(
            PlanNode::Pattern(label_pattern("s", "o")),
            PlanNode::Pattern(alias_pattern.clone()),
        );
        let rewritten = run(&filter, &KeywordCodec::new(), plan);
        match rewritten {
            PlanNode::IndexLookup(expr) => {
                assert_eq!(expr.patterns, vec![label_pattern("s", "o"), alias_pattern]);
            }
            other => panic!("expected fused lookup, got {other:?}"),
        }
    }

    #[test]
    fn disjoint_lookups_stay_joined() {
        let plan = PlanNode::join(
            PlanNode::Pattern(label_pattern("s1", "o1")),
            PlanNode::Pattern(label_pattern("s2", "o2")),
        );
        let rewritten = run(&label_filter(), &KeywordCodec::new(), plan);
        match rewritten {
            PlanNode::Join { left, right } => {
                assert!(matches!(*left, PlanNode::IndexLookup(_)));
                assert!(matches!(*right, PlanNode::IndexLookup(_)));
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn constraint_descends_into_join_branch() {
        let uncovered = TriplePattern::new(
            PatternTerm::var("s"),
            PatternTerm::var("p"),
            PatternTerm::var("x"),
        );
        let plan = PlanNode::filter(
            matches_constraint("o", "park"),
            PlanNode::join(
                PlanNode::Pattern(label_pattern("s", "o")),
                PlanNode::Pattern(uncovered.clone()),
            ),
        );
        let rewritten = run(&label_filter(), &KeywordCodec::new(), plan);
        match rewritten {
            PlanNode::Join { left, right } => {
                match *left {
                    PlanNode::IndexLookup(expr) => assert_eq!(expr.constraints.len(), 1),
                    other => panic!("expected lookup, got {other:?}"),
                }
                assert_eq!(*right, PlanNode::Pattern(uncovered));
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn foreign_lookup_passes_through() {
        let foreign = IndexExpr {
            indexer: "someone-else".into(),
            patterns: vec![label_pattern("s", "o")],
            constraints: Vec::new(),
            pre_bound: BindingSet::new(),
            graphs: None,
        };
        let plan = PlanNode::join(
            PlanNode::IndexLookup(foreign.clone()),
            PlanNode::Pattern(label_pattern("s", "o2")),
        );
        let rewritten = run(&label_filter(), &KeywordCodec::new(), plan);
        match rewritten {
            PlanNode::Join { left, right } => {
                assert_eq!(*left, PlanNode::IndexLookup(foreign));
                assert!(matches!(*right, PlanNode::IndexLookup(_)));
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn dataset_and_bindings_are_captured() {
        let bindings = BindingSet::new().bind("s", Term::iri("http://example.com/a"));
        let dataset = Dataset::new(vec![Term::iri("http://example.com/g")]);
        let plan = PlanNode::Pattern(label_pattern("s", "o"));
        let rewritten = optimize(
            "idx",
            &label_filter(),
            &KeywordCodec::new(),
            plan,
            Some(&dataset),
            &bindings,
        );
        match rewritten {
            PlanNode::IndexLookup(expr) => {
                assert_eq!(expr.pre_bound, bindings);
                assert_eq!(expr.graphs, Some(vec![Term::iri("http://example.com/g")]));
            }
            other => panic!("expected lookup, got {other:?}"),
        }
    }
}
