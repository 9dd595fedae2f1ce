//! Property-based tests using proptest.
//!
//! Invariants that must hold for every rule and record the planner and
//! renderers can see, not just the hand-picked cases.

use garnet_types::{Record, SemanticType, Value};
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::{Capability, CompareOp, QueryPlan, Rule, cursor, kv, plan, sql};

fn capability() -> Capability {
    Capability::builder("item")
        .field("id", SemanticType::Integer)
        .field("ts", SemanticType::Integer)
        .field("name", SemanticType::Text)
        .field("score", SemanticType::Decimal)
        .hash_key("id")
        .range_key("ts")
        .global_index("by-name", "name", Some("ts"))
        .range_conditions(true)
        .build()
        .expect("valid capability")
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
/// domains keep collisions frequent enough to exercise both truth values.
fn arb_field_value() -> impl Strategy<Value = (&'static str, Value)> {
    prop_oneof![
        (-4i64..4).prop_map(|n| ("id", Value::Integer(n))),
        (-4i64..4).prop_map(|n| ("ts", Value::Integer(n))),
        "[a-c]{0,2}".prop_map(|s| ("name", Value::Text(s))),
        (-40i64..40, 0u32..2)
            .prop_map(|(m, s)| ("score", Value::Decimal(Decimal::new(m, s)))),
    ]
}

fn arb_leaf() -> impl Strategy<Value = Rule> {
    (arb_field_value(), arb_op())
        .prop_map(|((field, value), op)| Rule::compare(field, op, value))
}

fn arb_membership() -> impl Strategy<Value = Rule> {
    prop_oneof![
        prop::collection::vec(-4i64..4, 0..4).prop_map(|vs| Rule::is_in("id", vs)),
        prop::collection::vec("[a-c]{0,2}", 0..4).prop_map(|vs| Rule::is_in("name", vs)),
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

fn arb_conjunction() -> impl Strategy<Value = Rule> {
    prop::collection::vec(prop_oneof![arb_leaf(), arb_membership()], 1..5)
        .prop_map(|leaves| Rule::fold_and(leaves).expect("non-empty conjunction"))
}

/// Records with every subset of fields present, so missing-field logic
/// is exercised throughout.
fn arb_record() -> impl Strategy<Value = Record> {
    (
        prop::option::of(-4i64..4),
        prop::option::of(-4i64..4),
        prop::option::of("[a-c]{0,2}"),
        prop::option::of((-40i64..40, 0u32..2)),
    )
        .prop_map(|(id, ts, name, score)| {
            let mut record = Record::new();
            if let Some(id) = id {
                record.set("id", id);
            }
            if let Some(ts) = ts {
                record.set("ts", ts);
            }
            if let Some(name) = name {
                record.set("name", name);
            }
            if let Some((m, s)) = score {
                record.set("score", Decimal::new(m, s));
            }
            record
        })
}

proptest! {
    // ========================================================================
    // Planner shape invariants
    // ========================================================================

    /// Equality on the hash key always drives the base table.
    #[test]
    fn hash_equality_never_scans(id in any::<i64>()) {
        let capability = capability();
        let plan = plan(Some(&Rule::eq("id", id)), &capability).unwrap();
        prop_assert!(!plan.is_scan);
        prop_assert!(plan.chosen_index.is_none());
        prop_assert!(plan.key_condition.is_some());
    }

    /// A top-level `or` always scans, with the whole rule as residual.
    #[test]
    fn top_level_or_scans_whole_rule(a in arb_leaf(), b in arb_leaf()) {
        let capability = capability();
        let rule = a.or(b);
        let plan = plan(Some(&rule), &capability).unwrap();
        prop_assert!(plan.is_scan);
        prop_assert!(plan.key_condition.is_none());
        prop_assert_eq!(plan.residual_filter, Some(rule));
    }

    /// Planning never changes what a rule selects: on every record, the
    /// absorbed key condition AND the residual agree with the original.
    #[test]
    fn plan_split_preserves_selection(rule in arb_conjunction(), record in arb_record()) {
        let capability = capability();
        let plan = plan(Some(&rule), &capability).unwrap();
        let whole = rule.eval(&capability, &record).unwrap();
        let key = match &plan.key_condition {
            Some(condition) => condition.eval(&capability, &record).unwrap(),
            None => true,
        };
        let residual = match &plan.residual_filter {
            Some(filter) => filter.eval(&capability, &record).unwrap(),
            None => true,
        };
        prop_assert_eq!(whole, key && residual);
    }

    // ========================================================================
    // Renderer invariants
    // ========================================================================

    /// Whatever direct evaluation accepts, both renderers compile; and the
    /// SQL form binds exactly one parameter per placeholder.
    #[test]
    fn renderers_accept_what_eval_accepts(rule in arb_rule(), record in arb_record()) {
        let capability = capability();
        let evaluated = rule.eval(&capability, &record);
        let lowered = kv::compile_filter(&rule, &capability);
        let rendered = sql::compile_filter(&rule, &capability);

        prop_assert_eq!(evaluated.is_ok(), lowered.is_ok());
        prop_assert_eq!(evaluated.is_ok(), rendered.is_ok());
        if let Ok(fragment) = rendered {
            prop_assert_eq!(fragment.sql.matches('?').count(), fragment.params.len());
        }
    }

    // ========================================================================
    // Token invariants
    // ========================================================================

    /// Tokens round-trip the resume tuple exactly for any key pair.
    #[test]
    fn token_round_trip(id in any::<i64>(), ts in any::<i64>()) {
        let capability = capability();
        let plan = QueryPlan::scan(None);
        let last = Record::new().with("id", id).with("ts", ts);
        let token = cursor::encode(&capability, &plan, &last).unwrap();
        let resumed = cursor::resume(&capability, &plan, &token).unwrap();
        prop_assert_eq!(resumed.get("id"), Some(&Value::Integer(id)));
        prop_assert_eq!(resumed.get("ts"), Some(&Value::Integer(ts)));
        prop_assert_eq!(resumed.len(), 2);
    }
}
