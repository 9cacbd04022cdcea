//! Cursor evaluation of index expressions.
//!
//! A cursor joins the expression's patterns by backtracking: patterns are
//! ordered most-selective-first (fewest slots unbound under the seed
//! bindings), and each depth scans the snapshot for candidates compatible
//! with the bindings accumulated so far. Constraints are checked at the
//! first depth where all their arguments are resolvable; a constraint
//! testing the object of the pattern being scanned is compiled once and
//! applied natively during that scan.
//!
//! The snapshot pins the committed view for the cursor's whole lifetime, so
//! results are stable against concurrent commits and reflect the owning
//! handle's flushed-but-uncommitted changes.

use rustc_hash::FxHashSet;

use crate::algebra::{BindingSet, Constraint, IndexExpr, PatternTerm, TriplePattern, Var};
use crate::codec::IndexCodec;
use crate::error::{EvalError, EvalResult, IndexError};
use crate::model::Term;
use crate::store::Snapshot;

pub(crate) struct IndexCursor<'c, C: IndexCodec> {
    codec: &'c C,
    patterns: Vec<TriplePattern>,
    constraints: Vec<Constraint>,
    /// Constraint indices first checkable after extending each depth.
    schedule: Vec<Vec<usize>>,
    graphs: Option<Vec<Term>>,
    snapshot: Snapshot<C::Native>,
    seed: BindingSet,
    stack: Vec<Frame>,
    primed: bool,
    done: bool,
}

struct Frame {
    rows: std::vec::IntoIter<BindingSet>,
}

enum Resolved {
    Ground(Term),
    Free(Var),
}

fn resolve(slot: &PatternTerm, bindings: &BindingSet) -> Resolved {
    match slot {
        PatternTerm::Const(term) => Resolved::Ground(term.clone()),
        PatternTerm::Var(var) => match bindings.get(var) {
            Some(term) => Resolved::Ground(term.clone()),
            None => Resolved::Free(var.clone()),
        },
    }
}

/// Compile takes caller-supplied argument values; failures are reported as
/// malformed bindings rather than index faults.
fn compile_error(err: IndexError) -> EvalError {
    EvalError::MalformedBindings(err.to_string())
}

impl<'c, C: IndexCodec> IndexCursor<'c, C> {
    pub(crate) fn build(
        codec: &'c C,
        expr: IndexExpr,
        bindings: &BindingSet,
        snapshot: Snapshot<C::Native>,
    ) -> EvalResult<Self> {
        let IndexExpr {
            patterns,
            constraints,
            pre_bound,
            graphs,
            ..
        } = expr;
        if patterns.is_empty() {
            return Err(EvalError::MalformedBindings(
                "index expression has no patterns".into(),
            ));
        }

        let mut seed = pre_bound;
        for (var, term) in bindings.iter() {
            if !seed.set_checked(var.clone(), term.clone()) {
                return Err(EvalError::MalformedBindings(format!(
                    "{var} already fixed by the expression, conflicting binding {term}"
                )));
            }
        }

        for constraint in &constraints {
            if !codec.recognizes(&constraint.function) {
                return Err(EvalError::UnknownFunction(
                    constraint.function.as_str().to_owned(),
                ));
            }
            if constraint.args.is_empty() {
                return Err(EvalError::MalformedBindings(format!(
                    "{} lacks a tested argument",
                    constraint.function
                )));
            }
        }

        let mut patterns = patterns;
        patterns.sort_by_key(|p| p.vars().filter(|v| !seed.contains(v)).count());

        // Prefix variable sets: what is bound once depth d has extended.
        let mut bound: FxHashSet<Var> = seed.iter().map(|(v, _)| v.clone()).collect();
        let mut prefixes = Vec::with_capacity(patterns.len());
        for pattern in &patterns {
            bound.extend(pattern.vars().cloned());
            prefixes.push(bound.clone());
        }

        let mut schedule = vec![Vec::new(); patterns.len()];
        let mut immediate = Vec::new();
        for (ci, constraint) in constraints.iter().enumerate() {
            if constraint.vars().all(|v| seed.contains(v)) {
                immediate.push(ci);
                continue;
            }
            let depth = prefixes
                .iter()
                .position(|prefix| constraint.vars().all(|v| prefix.contains(v)));
            match depth {
                Some(d) => schedule[d].push(ci),
                None => {
                    return Err(EvalError::MalformedBindings(format!(
                        "constraint {constraint} uses a variable the expression never binds"
                    )))
                }
            }
        }

        let mut cursor = Self {
            codec,
            patterns,
            constraints,
            schedule,
            graphs,
            snapshot,
            seed,
            stack: Vec::new(),
            primed: false,
            done: false,
        };

        // Constraints ground under the seed hold for every solution or none.
        for ci in immediate {
            let constraint = cursor.constraints[ci].clone();
            if !cursor.eval_constraint(&constraint, &cursor.seed.clone())? {
                cursor.done = true;
                break;
            }
        }
        Ok(cursor)
    }

    fn advance(&mut self) -> EvalResult<Option<BindingSet>> {
        if self.done {
            return Ok(None);
        }
        if !self.primed {
            self.primed = true;
            let seed = self.seed.clone();
            let rows = self.extensions(0, &seed)?;
            self.stack.push(Frame {
                rows: rows.into_iter(),
            });
        }
        loop {
            let Some(frame) = self.stack.last_mut() else {
                break;
            };
            let Some(bindings) = frame.rows.next() else {
                self.stack.pop();
                continue;
            };
            let depth = self.stack.len();
            if depth == self.patterns.len() {
                return Ok(Some(bindings));
            }
            let rows = self.extensions(depth, &bindings)?;
            self.stack.push(Frame {
                rows: rows.into_iter(),
            });
        }
        self.done = true;
        Ok(None)
    }

    /// Scans the snapshot for bindings extending `bindings` over the pattern
    /// at `depth`, applying every constraint scheduled there.
    fn extensions(&self, depth: usize, bindings: &BindingSet) -> EvalResult<Vec<BindingSet>> {
        let pattern = &self.patterns[depth];
        let subject = resolve(&pattern.subject, bindings);
        let predicate = resolve(&pattern.predicate, bindings);
        let object = resolve(&pattern.object, bindings);

        // Split scheduled constraints into natively applicable queries
        // (testing this pattern's free object, parameters already ground)
        // and residual checks evaluated per extension.
        let mut pushed: Vec<C::Query> = Vec::new();
        let mut residual: Vec<usize> = Vec::new();
        for &ci in &self.schedule[depth] {
            let constraint = &self.constraints[ci];
            let targets_object = matches!(
                (&object, constraint.tested()),
                (Resolved::Free(v), Some(PatternTerm::Var(tv))) if v == tv
            );
            if targets_object {
                if let Some(params) = ground_params(constraint, bindings) {
                    pushed.push(
                        self.codec
                            .compile(&constraint.function, &params)
                            .map_err(compile_error)?,
                    );
                    continue;
                }
            }
            residual.push(ci);
        }

        let mut rows = Vec::new();
        'candidates: for (statement, native) in self.snapshot.iter() {
            if let Resolved::Ground(term) = &subject {
                if statement.subject != *term {
                    continue;
                }
            }
            match &predicate {
                Resolved::Ground(Term::Iri(iri)) => {
                    if statement.predicate != *iri {
                        continue;
                    }
                }
                Resolved::Ground(_) => continue,
                Resolved::Free(_) => {}
            }
            match &object {
                Resolved::Ground(term) => {
                    if statement.object != *term {
                        continue;
                    }
                }
                Resolved::Free(_) => {
                    for query in &pushed {
                        if !self.codec.matches(query, native) {
                            continue 'candidates;
                        }
                    }
                }
            }
            if let Some(graphs) = &self.graphs {
                if !statement.contexts.iter().any(|c| graphs.contains(c)) {
                    continue;
                }
            }

            let mut extended = bindings.clone();
            if let Resolved::Free(var) = &subject {
                if !extended.set_checked(var.clone(), statement.subject.clone()) {
                    continue;
                }
            }
            if let Resolved::Free(var) = &predicate {
                if !extended.set_checked(var.clone(), Term::Iri(statement.predicate.clone())) {
                    continue;
                }
            }
            if let Resolved::Free(var) = &object {
                if !extended.set_checked(var.clone(), statement.object.clone()) {
                    continue;
                }
            }

            for &ci in &residual {
                if !self.eval_constraint(&self.constraints[ci], &extended)? {
                    continue 'candidates;
                }
            }
            rows.push(extended);
        }
        Ok(rows)
    }

    /// Evaluates one constraint under fully resolving bindings. A tested
    /// value the codec cannot encode fails the constraint rather than the
    /// cursor, mirroring error-as-false filter semantics.
    fn eval_constraint(&self, constraint: &Constraint, bindings: &BindingSet) -> EvalResult<bool> {
        let tested = resolve_term(&constraint.args[0], bindings)?;
        let params = match ground_params(constraint, bindings) {
            Some(params) => params,
            None => {
                return Err(EvalError::MalformedBindings(format!(
                    "unresolved argument in {constraint}"
                )))
            }
        };
        let query = self
            .codec
            .compile(&constraint.function, &params)
            .map_err(compile_error)?;
        match self.codec.encode(&tested) {
            Ok(native) => Ok(self.codec.matches(&query, &native)),
            Err(_) => Ok(false),
        }
    }
}

fn resolve_term(slot: &PatternTerm, bindings: &BindingSet) -> EvalResult<Term> {
    match slot {
        PatternTerm::Const(term) => Ok(term.clone()),
        PatternTerm::Var(var) => bindings.get(var).cloned().ok_or_else(|| {
            EvalError::MalformedBindings(format!("{var} is not bound at evaluation"))
        }),
    }
}

/// Resolves `args[1..]` to ground terms, or None when a parameter variable
/// is still unbound.
fn ground_params(constraint: &Constraint, bindings: &BindingSet) -> Option<Vec<Term>> {
    constraint.args[1..]
        .iter()
        .map(|arg| match arg {
            PatternTerm::Const(term) => Some(term.clone()),
            PatternTerm::Var(var) => bindings.get(var).cloned(),
        })
        .collect()
}

impl<C: IndexCodec> Iterator for IndexCursor<'_, C> {
    type Item = EvalResult<BindingSet>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(bindings)) => Some(Ok(bindings)),
            Ok(None) => None,
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
