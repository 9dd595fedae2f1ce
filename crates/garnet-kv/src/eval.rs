//! Wire-attribute comparison and condition evaluation.
//!
//! Rows are stored as wire attribute maps, so comparisons happen on
//! [`AttrValue`], not on runtime values: numbers as exact decimals parsed
//! from their `N` text, strings and datetimes byte-wise on their `S`
//! text, documents by their canonical JSON text. The null logic is the
//! two-valued contract of direct rule evaluation: any comparison or
//! membership against a missing or null attribute is false, a null
//! operand is the presence test, and `not` negates plainly.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use garnet_query::CompareOp;
use garnet_query::kv::{KeyCondition, KeyOp, KvCondition};
use garnet_types::{AttrValue, SemanticType};
use rust_decimal::Decimal;

/// A stored row: field name to wire attribute.
pub(crate) type Row = BTreeMap<String, AttrValue>;

/// One comparable component of a row's ordering tuple.
///
/// The variants cover every attribute that can order: numbers compare as
/// exact decimals, text byte-wise, booleans false before true, and
/// documents by canonical JSON text. Missing and null attributes have no
/// part; orderings carry them as `None`, which sorts first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum SortPart {
    /// Numeric attribute, exact.
    Num(Decimal),
    /// Textual attribute, byte order.
    Text(String),
    /// Boolean attribute.
    Bool(bool),
}

/// Extracts the ordering component of an attribute, `None` when it has
/// none.
pub(crate) fn sort_part(attr: &AttrValue) -> Option<SortPart> {
    match attr {
        AttrValue::N(text) => text.parse::<Decimal>().ok().map(SortPart::Num),
        AttrValue::S(text) => Some(SortPart::Text(text.clone())),
        AttrValue::Bool(b) => Some(SortPart::Bool(*b)),
        AttrValue::Null(_) => None,
        AttrValue::M(_) | AttrValue::L(_) => json_text(attr).map(SortPart::Text),
    }
}

/// Compares two attributes of the same kind; mixed kinds and nulls are
/// incomparable.
pub(crate) fn compare_attrs(a: &AttrValue, b: &AttrValue) -> Option<Ordering> {
    match (a, b) {
        (AttrValue::N(x), AttrValue::N(y)) => {
            let x = x.parse::<Decimal>().ok()?;
            let y = y.parse::<Decimal>().ok()?;
            Some(x.cmp(&y))
        }
        (AttrValue::S(x), AttrValue::S(y)) => Some(x.as_str().cmp(y.as_str())),
        (AttrValue::Bool(x), AttrValue::Bool(y)) => Some(x.cmp(y)),
        (AttrValue::M(_) | AttrValue::L(_), AttrValue::M(_) | AttrValue::L(_)) => {
            Some(json_text(a)?.cmp(&json_text(b)?))
        }
        _ => None,
    }
}

/// The canonical JSON text of a document attribute, the same text direct
/// evaluation orders documents by.
fn json_text(attr: &AttrValue) -> Option<String> {
    let value = attr.to_value(SemanticType::Json).ok()?;
    value.as_json().map(ToString::to_string)
}

/// Evaluates a compiled key condition as a plain predicate over a row.
///
/// Key conditions address storage on a real key/value service; here they
/// are just another filter, which keeps a plan's result set identical to
/// evaluating the original rule record by record.
pub(crate) fn matches_key(row: &Row, key: &KeyCondition) -> bool {
    let hash_matches = row.get(&key.hash_field).is_some_and(|stored| {
        !stored.is_null() && compare_attrs(stored, &key.hash_value) == Some(Ordering::Equal)
    });
    if !hash_matches {
        return false;
    }
    match &key.range {
        None => true,
        Some(range) => row.get(&range.field).is_some_and(|stored| {
            !stored.is_null()
                && compare_attrs(stored, &range.value)
                    .is_some_and(|ord| key_op_holds(range.op, ord))
        }),
    }
}

fn key_op_holds(op: KeyOp, ord: Ordering) -> bool {
    match op {
        KeyOp::Eq => ord == Ordering::Equal,
        KeyOp::Lt => ord == Ordering::Less,
        KeyOp::Le => ord != Ordering::Greater,
        KeyOp::Gt => ord == Ordering::Greater,
        KeyOp::Ge => ord != Ordering::Less,
    }
}

/// Evaluates a compiled filter tree over a row.
pub(crate) fn eval_condition(row: &Row, condition: &KvCondition) -> bool {
    match condition {
        KvCondition::Compare { field, op, value } => {
            let stored = row.get(field).filter(|attr| !attr.is_null());
            if value.is_null() {
                let absent = stored.is_none();
                return match op {
                    CompareOp::Eq => absent,
                    CompareOp::Ne => !absent,
                    // the compilers reject ordering against null
                    _ => false,
                };
            }
            stored.is_some_and(|stored| {
                compare_attrs(stored, value).is_some_and(|ord| op.holds(ord))
            })
        }
        KvCondition::MemberOf { field, values } => {
            match row.get(field).filter(|attr| !attr.is_null()) {
                // A null member is the presence test.
                None => values.iter().any(AttrValue::is_null),
                Some(stored) => values.iter().any(|member| {
                    !member.is_null() && compare_attrs(stored, member) == Some(Ordering::Equal)
                }),
            }
        }
        KvCondition::And(left, right) => {
            eval_condition(row, left) && eval_condition(row, right)
        }
        KvCondition::Or(left, right) => eval_condition(row, left) || eval_condition(row, right),
        KvCondition::Not(inner) => !eval_condition(row, inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, AttrValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn n(text: &str) -> AttrValue {
        AttrValue::N(text.into())
    }

    #[test]
    fn numbers_compare_numerically_not_lexically() {
        assert_eq!(compare_attrs(&n("10"), &n("9")), Some(Ordering::Greater));
        assert_eq!(compare_attrs(&n("2.50"), &n("2.5")), Some(Ordering::Equal));
        assert_eq!(compare_attrs(&n("-1"), &n("1")), Some(Ordering::Less));
    }

    #[test]
    fn mixed_kinds_are_incomparable() {
        assert_eq!(compare_attrs(&n("1"), &AttrValue::S("1".into())), None);
        assert_eq!(compare_attrs(&AttrValue::null(), &n("1")), None);
    }

    #[test]
    fn comparison_against_missing_attribute_is_false() {
        let row = row(&[("id", n("1"))]);
        let condition = KvCondition::Compare {
            field: "name".into(),
            op: CompareOp::Ne,
            value: AttrValue::S("a".into()),
        };
        assert!(!eval_condition(&row, &condition));
    }

    #[test]
    fn null_operand_tests_presence() {
        let present = row(&[("name", AttrValue::S("a".into()))]);
        let absent = row(&[]);
        let marked = row(&[("name", AttrValue::null())]);

        let is_null = KvCondition::Compare {
            field: "name".into(),
            op: CompareOp::Eq,
            value: AttrValue::null(),
        };
        assert!(!eval_condition(&present, &is_null));
        assert!(eval_condition(&absent, &is_null));
        assert!(eval_condition(&marked, &is_null));
    }

    #[test]
    fn membership_matches_exact_members() {
        let stored = row(&[("score", n("2.5"))]);
        let condition = KvCondition::MemberOf {
            field: "score".into(),
            values: vec![n("1"), n("2.50")],
        };
        assert!(eval_condition(&stored, &condition));

        let miss = KvCondition::MemberOf {
            field: "score".into(),
            values: vec![n("3")],
        };
        assert!(!eval_condition(&stored, &miss));
    }

    #[test]
    fn negation_is_two_valued() {
        let absent = row(&[]);
        let inner = KvCondition::Compare {
            field: "name".into(),
            op: CompareOp::Eq,
            value: AttrValue::S("a".into()),
        };
        assert!(!eval_condition(&absent, &inner));
        assert!(eval_condition(&absent, &KvCondition::Not(Box::new(inner))));
    }

    #[test]
    fn key_condition_is_a_plain_predicate() {
        let matching = row(&[("user", AttrValue::S("ada".into())), ("ts", n("5"))]);
        let early = row(&[("user", AttrValue::S("ada".into())), ("ts", n("1"))]);
        let other = row(&[("user", AttrValue::S("brian".into())), ("ts", n("5"))]);

        let key = KeyCondition {
            hash_field: "user".into(),
            hash_value: AttrValue::S("ada".into()),
            range: Some(garnet_query::kv::RangeCondition {
                field: "ts".into(),
                op: KeyOp::Ge,
                value: n("5"),
            }),
        };
        assert!(matches_key(&matching, &key));
        assert!(!matches_key(&early, &key));
        assert!(!matches_key(&other, &key));
    }

    #[test]
    fn sort_parts_order_null_first_via_option() {
        let parts = [
            None,
            sort_part(&n("1")),
            sort_part(&AttrValue::S("a".into())),
        ];
        assert!(parts[0] < parts[1]);
        assert_eq!(sort_part(&AttrValue::null()), None);
    }
}
