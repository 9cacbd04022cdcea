use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use tern::{
    BindingSet, IndexExpr, Indexer, IndexerSettings, Iri, KeywordCodec, PatternTerm,
    SelectionRule, Statement, StatementIndexer, Term, TriplePattern, Var,
};

const LABEL: &str = "http://example.com/label";

#[derive(Debug, Clone)]
enum Operation {
    Add(u8, u8),
    Remove(u8, u8),
    Flush,
    Commit,
    Rollback,
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        (0u8..4, 0u8..4).prop_map(|(s, t)| Operation::Add(s, t)),
        (0u8..4, 0u8..4).prop_map(|(s, t)| Operation::Remove(s, t)),
        Just(Operation::Flush),
        Just(Operation::Commit),
        Just(Operation::Rollback),
    ]
}

fn statement(s: u8, t: u8) -> Statement {
    Statement::new(
        Term::iri(format!("http://example.com/s{s}")),
        LABEL,
        Term::literal(format!("token{t}")),
    )
}

fn empty() -> Vec<Statement> {
    Vec::new()
}

fn keyword_indexer() -> StatementIndexer<KeywordCodec> {
    let settings = IndexerSettings::new("labels", SelectionRule::Predicate(Iri::from(LABEL)));
    let mut indexer = StatementIndexer::new(settings, KeywordCodec::new()).unwrap();
    indexer.initialize().unwrap();
    indexer
}

fn lookup() -> IndexExpr {
    IndexExpr {
        indexer: "labels".to_owned(),
        patterns: vec![TriplePattern::new(
            PatternTerm::var("s"),
            Term::iri(LABEL),
            PatternTerm::var("o"),
        )],
        constraints: Vec::new(),
        pre_bound: BindingSet::new(),
        graphs: None,
    }
}

/// What a cursor over the handle sees right now, as (subject, object) pairs.
fn observed(indexer: &StatementIndexer<KeywordCodec>) -> BTreeSet<(String, String)> {
    indexer
        .iterator(&lookup(), &BindingSet::new())
        .unwrap()
        .map(|row| {
            let row = row.unwrap();
            let subject = match row.get(&Var::from("s")) {
                Some(Term::Iri(iri)) => iri.as_str().to_owned(),
                other => panic!("unexpected subject binding {other:?}"),
            };
            let object = row
                .get(&Var::from("o"))
                .and_then(|term| term.lexical())
                .map(str::to_owned)
                .unwrap();
            (subject, object)
        })
        .collect()
}

fn as_pairs(keys: BTreeSet<(u8, u8)>) -> BTreeSet<(String, String)> {
    keys.into_iter()
        .map(|(s, t)| (format!("http://example.com/s{s}"), format!("token{t}")))
        .collect()
}

/// Reference model of one handle: committed entries, the flushed overlay,
/// and the not-yet-flushed batch buffer.
#[derive(Default)]
struct Model {
    committed: BTreeSet<(u8, u8)>,
    staged: BTreeMap<(u8, u8), bool>,
    buffered: Vec<(bool, (u8, u8))>,
}

impl Model {
    fn flush(&mut self) {
        for (add, key) in self.buffered.drain(..) {
            self.staged.insert(key, add);
        }
    }

    fn commit(&mut self) {
        self.flush();
        for (key, add) in std::mem::take(&mut self.staged) {
            if add {
                self.committed.insert(key);
            } else {
                self.committed.remove(&key);
            }
        }
    }

    fn rollback(&mut self) {
        self.buffered.clear();
        self.staged.clear();
    }

    /// Cursor-visible content: committed entries shaded by the flushed
    /// overlay. Buffered ops stay invisible until flush.
    fn visible(&self) -> BTreeSet<(u8, u8)> {
        let mut content = self.committed.clone();
        for (key, add) in &self.staged {
            if *add {
                content.insert(*key);
            } else {
                content.remove(key);
            }
        }
        content
    }
}

fn arb_object() -> impl Strategy<Value = Term> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(|s| Term::iri(format!("http://example.com/{s}"))),
        "[a-z]{1,6}".prop_map(Term::bnode),
        "[a-z\"\\\\\\n ]{0,8}".prop_map(Term::literal),
        ("[a-z ]{0,6}", "[a-z]{1,4}").prop_map(|(s, dt)| {
            Term::typed_literal(s, Iri::from(format!("http://example.com/dt/{dt}")))
        }),
        ("[a-z]{1,5}", "(en|de|fr)").prop_map(|(s, lang)| Term::lang_literal(s, lang)),
    ]
}

fn arb_statement() -> impl Strategy<Value = Statement> {
    (
        prop_oneof![
            "[a-z]{1,6}".prop_map(|s| Term::iri(format!("http://example.com/{s}"))),
            "[a-z]{1,6}".prop_map(Term::bnode),
        ],
        "[a-z]{1,4}",
        arb_object(),
        prop::collection::vec(
            "[a-z]{1,4}".prop_map(|g| Term::iri(format!("http://example.com/g/{g}"))),
            0..=2,
        ),
    )
        .prop_map(|(subject, predicate, object, contexts)| {
            Statement::new(subject, format!("http://example.com/p/{predicate}"), object)
                .with_contexts(contexts)
        })
}

proptest! {
    #[test]
    fn prop_transaction_sequences_match_model(
        ops in prop::collection::vec(arb_operation(), 1..60)
    ) {
        let mut indexer = keyword_indexer();
        let mut model = Model::default();

        for op in ops {
            match op {
                Operation::Add(s, t) => {
                    indexer.add_batch(&empty(), &[statement(s, t)]).unwrap();
                    model.buffered.push((true, (s, t)));
                }
                Operation::Remove(s, t) => {
                    indexer.remove_batch(&empty(), &[statement(s, t)]).unwrap();
                    model.buffered.push((false, (s, t)));
                }
                Operation::Flush => {
                    indexer.flush().unwrap();
                    model.flush();
                    prop_assert_eq!(observed(&indexer), as_pairs(model.visible()));
                }
                Operation::Commit => {
                    indexer.commit().unwrap();
                    model.commit();
                    prop_assert_eq!(observed(&indexer), as_pairs(model.visible()));
                    prop_assert_eq!(indexer.store().len(), model.committed.len());
                }
                Operation::Rollback => {
                    indexer.rollback().unwrap();
                    model.rollback();
                    prop_assert_eq!(observed(&indexer), as_pairs(model.visible()));
                }
            }
        }

        indexer.commit().unwrap();
        model.commit();
        prop_assert_eq!(observed(&indexer), as_pairs(model.visible()));
        prop_assert_eq!(indexer.store().len(), model.committed.len());
        for &(s, t) in &model.committed {
            prop_assert!(indexer.store().contains(&statement(s, t)));
        }
    }

    #[test]
    fn prop_rollback_leaves_no_trace(
        baseline in prop::collection::vec((0u8..4, 0u8..4), 1..20),
        doomed in prop::collection::vec((any::<bool>(), 0u8..4, 0u8..4), 1..20),
        flush_before_rollback in any::<bool>(),
    ) {
        let mut indexer = keyword_indexer();
        let statements: Vec<Statement> =
            baseline.iter().map(|&(s, t)| statement(s, t)).collect();
        indexer.add_batch(&empty(), &statements).unwrap();
        indexer.commit().unwrap();
        let before = observed(&indexer);

        for (add, s, t) in doomed {
            if add {
                indexer.add_batch(&empty(), &[statement(s, t)]).unwrap();
            } else {
                indexer.remove_batch(&empty(), &[statement(s, t)]).unwrap();
            }
        }
        if flush_before_rollback {
            indexer.flush().unwrap();
        }
        indexer.rollback().unwrap();

        prop_assert_eq!(indexer.store().len(), before.len());
        prop_assert_eq!(observed(&indexer), before);
    }

    #[test]
    fn prop_flush_nets_interleaved_ops_in_call_order(
        ops in prop::collection::vec((any::<bool>(), 0u8..4, 0u8..4), 1..30)
    ) {
        let mut indexer = keyword_indexer();
        let mut net: BTreeMap<(u8, u8), bool> = BTreeMap::new();
        for &(add, s, t) in &ops {
            if add {
                indexer.add_batch(&empty(), &[statement(s, t)]).unwrap();
            } else {
                indexer.remove_batch(&empty(), &[statement(s, t)]).unwrap();
            }
            net.insert((s, t), add);
        }
        indexer.flush().unwrap();

        let expected: BTreeSet<(u8, u8)> = net
            .into_iter()
            .filter_map(|(key, add)| add.then_some(key))
            .collect();
        prop_assert_eq!(observed(&indexer), as_pairs(expected));
        // Nothing reaches the shared committed view before commit.
        prop_assert_eq!(indexer.store().len(), 0);
    }

    #[test]
    fn prop_distinct_statements_have_distinct_keys(
        statements in prop::collection::vec(arb_statement(), 1..40)
    ) {
        let mut by_key: BTreeMap<String, Statement> = BTreeMap::new();
        for st in statements {
            match by_key.entry(st.canonical_key()) {
                Entry::Occupied(slot) => {
                    prop_assert_eq!(slot.get(), &st);
                }
                Entry::Vacant(slot) => {
                    slot.insert(st);
                }
            }
        }
    }
}
