//! Cross-backend equivalence properties.
//!
//! For any generated record set and rule, the records selected by direct
//! AST evaluation must equal the records returned by the in-memory
//! backend and by SQLite, and the two engines must agree on traversal
//! order. This is the contract that makes backends interchangeable.

#![allow(clippy::unwrap_used)] // Tests use unwrap for simplicity
#![allow(clippy::expect_used)] // Tests use expect for simplicity

use std::collections::{BTreeMap, BTreeSet};

use garnet::{
    Capability, CompareOp, MemoryKv, Model, Record, RecordError, Rule, SemanticType, SqliteBackend,
    Store, Value,
};
use proptest::prelude::*;

// ============================================================================
// Fixture model
// ============================================================================

/// Every non-key field is optional, so null and missing are generated as
/// often as real values.
#[derive(Debug, Clone, PartialEq)]
struct Doc {
    device: String,
    seq: i64,
    level: Option<i64>,
    tag: Option<String>,
    ok: Option<bool>,
}

impl Model for Doc {
    fn capability() -> Capability {
        Capability::builder("docs")
            .field("device", SemanticType::Text)
            .field("seq", SemanticType::Integer)
            .field("level", SemanticType::Integer)
            .field("tag", SemanticType::Text)
            .field("ok", SemanticType::Boolean)
            .hash_key("device")
            .range_key("seq")
            .global_index("by-tag", "tag", Some("level"))
            .build()
            .expect("valid capability")
    }

    fn to_record(&self) -> Result<Record, RecordError> {
        let mut record = Record::new()
            .with("device", self.device.as_str())
            .with("seq", self.seq);
        if let Some(level) = self.level {
            record.set("level", level);
        }
        if let Some(tag) = &self.tag {
            record.set("tag", tag.as_str());
        }
        if let Some(ok) = self.ok {
            record.set("ok", ok);
        }
        Ok(record)
    }

    fn from_record(record: &Record) -> Result<Self, RecordError> {
        let present = |field: &str| record.get(field).is_some_and(|value| !value.is_null());
        Ok(Doc {
            device: record.get_text("device")?.to_string(),
            seq: record.get_integer("seq")?,
            level: present("level")
                .then(|| record.get_integer("level"))
                .transpose()?,
            tag: present("tag")
                .then(|| record.get_text("tag").map(ToString::to_string))
                .transpose()?,
            ok: present("ok").then(|| record.get_boolean("ok")).transpose()?,
        })
    }
}

fn doc_key(doc: &Doc) -> (String, i64) {
    (doc.device.clone(), doc.seq)
}

fn stores() -> (Store<Doc>, Store<Doc>) {
    let memory: Store<Doc> = Store::new(Box::new(MemoryKv::new()));
    let sqlite: Store<Doc> = Store::new(Box::new(SqliteBackend::in_memory().unwrap()));
    (memory, sqlite)
}

fn seed(store: &Store<Doc>, docs: &[Doc]) {
    store.initialize().unwrap();
    store.batch_save(docs).unwrap();
}

/// Keys the direct evaluator selects from `docs`.
fn selected(docs: &[Doc], rule: &Rule) -> BTreeSet<(String, i64)> {
    let capability = Doc::capability();
    docs.iter()
        .filter(|doc| {
            let record = doc.to_record().unwrap();
            rule.eval(&capability, &record).unwrap()
        })
        .map(doc_key)
        .collect()
}

// ============================================================================
// Generators
// ============================================================================

fn arb_doc() -> impl Strategy<Value = Doc> {
    (
        "[a-c]",
        -3i64..3,
        prop::option::of(-2i64..3),
        prop::option::of(prop_oneof![Just("x".to_string()), Just("y".to_string())]),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(device, seq, level, tag, ok)| Doc {
            device,
            seq,
            level,
            tag,
            ok,
        })
}

/// Record sets with unique base keys; a later duplicate would only
/// overwrite the earlier record on save anyway.
fn arb_docs() -> impl Strategy<Value = Vec<Doc>> {
    prop::collection::vec(arb_doc(), 0..10).prop_map(|docs| {
        let mut unique = BTreeMap::new();
        for doc in docs {
            unique.insert(doc_key(&doc), doc);
        }
        unique.into_values().collect()
    })
}

fn arb_op() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Lt),
        Just(CompareOp::Le),
        Just(CompareOp::Gt),
        Just(CompareOp::Ge),
    ]
}

/// A declared field paired with a literal of its semantic type. Small
/// domains keep hits and misses both frequent.
fn arb_field_value() -> impl Strategy<Value = (&'static str, Value)> {
    prop_oneof![
        "[a-c]".prop_map(|s| ("device", Value::Text(s))),
        (-3i64..3).prop_map(|n| ("seq", Value::Integer(n))),
        (-2i64..3).prop_map(|n| ("level", Value::Integer(n))),
        prop_oneof![Just("x"), Just("y"), Just("w")]
            .prop_map(|s| ("tag", Value::Text(s.to_string()))),
        any::<bool>().prop_map(|b| ("ok", Value::Boolean(b))),
    ]
}

/// Comparison leaves. Null literals appear only under `eq`/`ne`, where
/// they read as presence tests; ordering against null is rejected by
/// every compiler and the direct evaluator alike.
fn arb_leaf() -> impl Strategy<Value = Rule> {
    let compared = (arb_field_value(), arb_op())
        .prop_map(|((field, value), op)| Rule::compare(field, op, value));
    let presence = prop_oneof![
        Just(Rule::eq("tag", Value::Null)),
        Just(Rule::ne("level", Value::Null)),
        Just(Rule::eq("ok", Value::Null)),
    ];
    prop_oneof![4 => compared, 1 => presence]
}

fn arb_membership() -> impl Strategy<Value = Rule> {
    let tag_member = prop_oneof![
        Just(Value::Text("x".to_string())),
        Just(Value::Text("y".to_string())),
        Just(Value::Null),
    ];
    prop_oneof![
        prop::collection::vec(-3i64..3, 0..3).prop_map(|vs| Rule::is_in("seq", vs)),
        prop::collection::vec(tag_member, 0..3).prop_map(|vs| Rule::is_in("tag", vs)),
    ]
}

fn arb_rule() -> impl Strategy<Value = Rule> {
    let leaf = prop_oneof![arb_leaf(), arb_membership()];
    leaf.prop_recursive(3, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.and(b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.or(b)),
            inner.prop_map(Rule::negate),
        ]
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// The acceptance property: direct evaluation, the in-memory engine,
    /// and SQLite all select the same records, and the engines return
    /// them in the same order.
    #[test]
    fn backends_agree_with_direct_evaluation(docs in arb_docs(), rule in arb_rule()) {
        let (memory, sqlite) = stores();
        seed(&memory, &docs);
        seed(&sqlite, &docs);

        let from_memory = memory.query().matching(rule.clone()).fetch().unwrap().items;
        let from_sqlite = sqlite.query().matching(rule.clone()).fetch().unwrap().items;
        prop_assert_eq!(&from_memory, &from_sqlite, "engines disagree on rows or order");

        let got: BTreeSet<(String, i64)> = from_memory.iter().map(doc_key).collect();
        prop_assert_eq!(got, selected(&docs, &rule));

        let total = from_memory.len() as u64;
        prop_assert_eq!(memory.query().matching(rule.clone()).count().unwrap(), total);
        prop_assert_eq!(sqlite.query().matching(rule).count().unwrap(), total);
    }

    /// The standalone filter composes with the main rule identically on
    /// both engines: it narrows results exactly like a conjunction even
    /// though it never participates in index choice.
    #[test]
    fn filters_compose_identically(
        docs in arb_docs(),
        rule in arb_rule(),
        filter in arb_rule(),
    ) {
        let (memory, sqlite) = stores();
        seed(&memory, &docs);
        seed(&sqlite, &docs);

        let from_memory = memory
            .query()
            .matching(rule.clone())
            .filter(filter.clone())
            .fetch()
            .unwrap()
            .items;
        let from_sqlite = sqlite
            .query()
            .matching(rule.clone())
            .filter(filter.clone())
            .fetch()
            .unwrap()
            .items;
        prop_assert_eq!(&from_memory, &from_sqlite);

        let expected: BTreeSet<(String, i64)> = selected(&docs, &rule)
            .intersection(&selected(&docs, &filter))
            .cloned()
            .collect();
        let got: BTreeSet<(String, i64)> = from_memory.iter().map(doc_key).collect();
        prop_assert_eq!(got, expected);
    }

    /// Chained pages over the base traversal reassemble the unbounded
    /// result without repeats for any page size, on both engines.
    #[test]
    fn scan_pagination_reassembles(docs in arb_docs(), page_size in 1usize..4) {
        let (memory, sqlite) = stores();
        for store in [&memory, &sqlite] {
            seed(store, &docs);
            let unbounded = store.query().fetch().unwrap().items;

            let mut chained = Vec::new();
            let mut token = None;
            let mut hops = 0;
            loop {
                let mut query = store.query().limit(page_size);
                if let Some(token) = token.take() {
                    query = query.start_after(token);
                }
                let page = query.fetch().unwrap();
                chained.extend(page.items);
                hops += 1;
                prop_assert!(hops <= docs.len() + 2, "pagination failed to terminate");
                match page.next_token {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
            prop_assert_eq!(chained, unbounded);
        }
    }
}
