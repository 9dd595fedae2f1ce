//! Pagination behavior through the facade: chained pages reassemble the
//! unbounded result, tokens bind to their model and plan, and boundaries
//! on records without a resume position are refused.

#![allow(clippy::unwrap_used)] // Tests use unwrap for simplicity
#![allow(clippy::expect_used)] // Tests use expect for simplicity

use std::collections::BTreeSet;

use garnet::{
    Capability, Error, MemoryKv, Model, Order, QueryError, Record, RecordError, Rule, SemanticType,
    SqliteBackend, Store,
};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Event {
    device: String,
    seq: i64,
    tag: String,
    level: Option<i64>,
}

impl Model for Event {
    fn capability() -> Capability {
        Capability::builder("events")
            .field("device", SemanticType::Text)
            .field("seq", SemanticType::Integer)
            .field("tag", SemanticType::Text)
            .field("level", SemanticType::Integer)
            .hash_key("device")
            .range_key("seq")
            .global_index("by-tag", "tag", Some("level"))
            .build()
            .expect("valid capability")
    }

    fn to_record(&self) -> Result<Record, RecordError> {
        let mut record = Record::new()
            .with("device", self.device.as_str())
            .with("seq", self.seq)
            .with("tag", self.tag.as_str());
        if let Some(level) = self.level {
            record.set("level", level);
        }
        Ok(record)
    }

    fn from_record(record: &Record) -> Result<Self, RecordError> {
        Ok(Event {
            device: record.get_text("device")?.to_string(),
            seq: record.get_integer("seq")?,
            tag: record.get_text("tag")?.to_string(),
            level: match record.get("level") {
                Some(value) if !value.is_null() => Some(record.get_integer("level")?),
                _ => None,
            },
        })
    }
}

fn event(device: &str, seq: i64, tag: &str, level: Option<i64>) -> Event {
    Event {
        device: device.to_string(),
        seq,
        tag: tag.to_string(),
        level,
    }
}

fn stores() -> Vec<Store<Event>> {
    let stores: Vec<Store<Event>> = vec![
        Store::new(Box::new(MemoryKv::new())),
        Store::new(Box::new(SqliteBackend::in_memory().unwrap())),
    ];
    for store in &stores {
        store.initialize().unwrap();
        store
            .batch_save(&[
                event("a", 1, "alert", Some(5)),
                event("a", 2, "info", None),
                event("a", 3, "alert", Some(1)),
                event("b", 1, "info", Some(2)),
                event("b", 2, "alert", Some(4)),
                event("b", 3, "drill", None),
                event("c", 1, "alert", Some(3)),
                event("c", 2, "info", None),
                event("c", 3, "alert", Some(2)),
            ])
            .unwrap();
    }
    stores
}

/// Follows continuation tokens until exhaustion and returns the
/// concatenated items.
fn chain(store: &Store<Event>, page_size: usize, rule: Option<&Rule>, order: Order) -> Vec<Event> {
    let mut items = Vec::new();
    let mut token = None;
    let mut hops = 0;
    loop {
        let mut query = store.query().limit(page_size).order(order);
        if let Some(rule) = rule {
            query = query.matching(rule.clone());
        }
        if let Some(token) = token.take() {
            query = query.start_after(token);
        }
        let page = query.fetch().unwrap();
        assert!(page.items.len() <= page_size);
        items.extend(page.items);
        hops += 1;
        assert!(hops <= 32, "pagination failed to terminate");
        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    items
}

// ============================================================================
// Chain reassembly
// ============================================================================

#[test]
fn test_chained_scan_pages_match_one_unbounded_query() {
    for store in stores() {
        let unbounded = store.query().fetch().unwrap().items;
        assert_eq!(unbounded.len(), 9);
        for page_size in 1..=4 {
            let chained = chain(&store, page_size, None, Order::Ascending);
            assert_eq!(chained, unbounded, "page size {page_size}");
            let distinct: BTreeSet<(String, i64)> = chained
                .iter()
                .map(|e| (e.device.clone(), e.seq))
                .collect();
            assert_eq!(distinct.len(), chained.len());
        }
    }
}

#[test]
fn test_chained_key_query_pages_match_descending_order() {
    let rule = Rule::eq("device", "a");
    for store in stores() {
        let unbounded = store
            .query()
            .matching(rule.clone())
            .order(Order::Descending)
            .fetch()
            .unwrap()
            .items;
        let seqs: Vec<i64> = unbounded.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 2, 1]);

        let chained = chain(&store, 1, Some(&rule), Order::Descending);
        assert_eq!(chained, unbounded);
    }
}

#[test]
fn test_index_chain_walks_the_sort_order() {
    let rule = Rule::eq("tag", "alert");
    for store in stores() {
        let unbounded = store.query().matching(rule.clone()).fetch().unwrap().items;
        let levels: Vec<Option<i64>> = unbounded.iter().map(|e| e.level).collect();
        assert_eq!(
            levels,
            vec![Some(1), Some(2), Some(3), Some(4), Some(5)],
            "index traversal orders by sort value"
        );

        let chained = chain(&store, 2, Some(&rule), Order::Ascending);
        assert_eq!(chained, unbounded);
    }
}

#[test]
fn test_final_page_carries_no_token() {
    for store in stores() {
        let page = store.query().limit(9).fetch().unwrap();
        assert_eq!(page.items.len(), 9);
        assert!(page.next_token.is_none());

        let page = store
            .query()
            .matching(Rule::eq("device", "a"))
            .limit(4)
            .fetch()
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next_token.is_none());
    }
}

#[test]
fn test_count_respects_a_resume_token() {
    for store in stores() {
        let page = store.query().limit(4).fetch().unwrap();
        let token = page.next_token.expect("more rows remain");
        let remaining = store.query().start_after(token).count().unwrap();
        assert_eq!(remaining, 5);
    }
}

// ============================================================================
// Token binding
// ============================================================================

#[test]
fn test_token_is_rejected_on_a_different_plan() {
    for store in stores() {
        let token = store
            .query()
            .limit(2)
            .fetch()
            .unwrap()
            .next_token
            .expect("more rows remain");
        let err = store
            .query()
            .matching(Rule::eq("tag", "alert"))
            .start_after(token)
            .fetch()
            .unwrap_err();
        assert!(
            matches!(err, Error::Query(QueryError::InvalidToken(_))),
            "got {err}"
        );
    }
}

#[test]
fn test_token_is_rejected_on_a_different_model() {
    #[derive(Debug, Clone, PartialEq)]
    struct Audit {
        id: i64,
    }

    impl Model for Audit {
        fn capability() -> Capability {
            Capability::builder("audit")
                .field("id", SemanticType::Integer)
                .hash_key("id")
                .build()
                .expect("valid capability")
        }

        fn to_record(&self) -> Result<Record, RecordError> {
            Ok(Record::new().with("id", self.id))
        }

        fn from_record(record: &Record) -> Result<Self, RecordError> {
            Ok(Audit {
                id: record.get_integer("id")?,
            })
        }
    }

    for store in stores() {
        let token = store
            .query()
            .limit(2)
            .fetch()
            .unwrap()
            .next_token
            .expect("more rows remain");

        let audits: Store<Audit> = Store::new(Box::new(MemoryKv::new()));
        audits.initialize().unwrap();
        let err = audits.query().start_after(token).fetch().unwrap_err();
        assert!(
            matches!(err, Error::Query(QueryError::InvalidToken(_))),
            "got {err}"
        );
    }
}

#[test]
fn test_garbage_token_is_rejected() {
    for store in stores() {
        let err = store
            .query()
            .start_after(garnet::PageToken::new("@@nope@@"))
            .fetch()
            .unwrap_err();
        assert!(
            matches!(err, Error::Query(QueryError::InvalidToken(_))),
            "got {err}"
        );
    }
}

// ============================================================================
// Boundaries without a resume position
// ============================================================================

/// Records may omit an index sort value, and such records still appear in
/// index traversals, first in ascending order. A page boundary cannot
/// land on one though: the token would have no resume position, so the
/// fetch is refused.
#[test]
fn test_boundary_on_a_record_without_its_sort_value_is_refused() {
    let rule = Rule::eq("tag", "info");
    for store in stores() {
        // All three info rows come back when no boundary is cut.
        let page = store.query().matching(rule.clone()).limit(3).fetch().unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next_token.is_none());
        assert_eq!(page.items[0].level, None);

        // A boundary at the first row lands on a record with no level.
        let err = store
            .query()
            .matching(rule.clone())
            .limit(1)
            .fetch()
            .unwrap_err();
        assert!(
            matches!(err, Error::Query(QueryError::InvalidToken(_))),
            "got {err}"
        );
    }
}
