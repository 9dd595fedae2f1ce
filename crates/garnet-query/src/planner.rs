//! Splits a rule into a key condition and a residual filter.

use tracing::{debug, trace};

use crate::error::Result;
use crate::plan::QueryPlan;
use crate::rule::{CompareOp, Rule};
use crate::schema::{Capability, IndexDef};

/// Plans how a rule executes against one model.
///
/// Walks the rule's top-level conjunction and tries to pin a partition key
/// with a non-null equality leaf, preferring the base table's own key over
/// any secondary index. Among secondary indexes the one absorbing the most
/// leaves wins, with declaration order breaking ties. Leaves the key
/// condition does not absorb become the residual filter; a rule whose
/// shape can never drive a key lookup (no matching equality, or an `Or`
/// or `Not` at top level) plans as a full scan with the whole rule as
/// residual.
///
/// # Errors
///
/// [`QueryError::UndeclaredField`] when the rule references a field the
/// capability does not declare, even for rules that would otherwise plan
/// as a scan.
///
/// # Examples
///
/// ```
/// use garnet_query::{plan, Capability, Rule, SemanticType};
///
/// let capability = Capability::builder("event")
///     .field("id", SemanticType::Integer)
///     .field("at", SemanticType::DateTime)
///     .hash_key("id")
///     .range_key("at")
///     .range_conditions(true)
///     .build()?;
///
/// let rule = Rule::eq("id", 7).and(Rule::gt("at", "2024-05-17T00:00:00.000000Z"));
/// let plan = plan(Some(&rule), &capability)?;
/// assert!(!plan.is_scan);
/// assert!(plan.residual_filter.is_none());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// [`QueryError::UndeclaredField`]: crate::QueryError::UndeclaredField
pub fn plan(rule: Option<&Rule>, capability: &Capability) -> Result<QueryPlan> {
    let Some(rule) = rule else {
        debug!(model = %capability.model(), "empty rule, planning full scan");
        return Ok(QueryPlan::scan(None));
    };

    // Undeclared fields are a caller bug and fail fast regardless of the
    // plan shape.
    for field in rule.fields() {
        capability.field_type_or_err(field)?;
    }

    if matches!(rule, Rule::Or(_, _) | Rule::Not(_)) {
        debug!(
            model = %capability.model(),
            "disjunctive top level, planning full scan"
        );
        return Ok(QueryPlan::scan(Some(rule.clone())));
    }

    let conjuncts = rule.conjuncts();

    if let Some(key) =
        match_key(&conjuncts, capability, capability.hash_key(), capability.range_key())
    {
        debug!(model = %capability.model(), "planning base-table key condition");
        return Ok(build_keyed(None, &conjuncts, key));
    }

    let mut best: Option<(&IndexDef, KeyMatch)> = None;
    for index in capability.indexes() {
        let Some(key) = match_key(&conjuncts, capability, index.partition_key(), index.sort_key())
        else {
            continue;
        };
        // Strict comparison keeps the earliest-declared index on ties.
        if best.as_ref().is_none_or(|(_, b)| key.leaves() > b.leaves()) {
            best = Some((index, key));
        }
    }

    match best {
        Some((index, key)) => {
            debug!(
                model = %capability.model(),
                index = %index.name(),
                "planning secondary-index key condition"
            );
            Ok(build_keyed(Some(index.name().to_string()), &conjuncts, key))
        }
        None => {
            debug!(model = %capability.model(), "no key match, planning full scan");
            Ok(QueryPlan::scan(Some(rule.clone())))
        }
    }
}

/// Conjunct positions absorbed into a candidate key condition.
#[derive(Debug, Clone, Copy)]
struct KeyMatch {
    hash: usize,
    range: Option<usize>,
}

impl KeyMatch {
    fn leaves(self) -> usize {
        1 + usize::from(self.range.is_some())
    }

    fn absorbs(self, position: usize) -> bool {
        position == self.hash || self.range == Some(position)
    }
}

/// Matches the conjuncts against one candidate key pair.
///
/// The partition key must be pinned by an equality leaf with a non-null
/// literal; a null equality is a presence test and stays residual. A sort
/// key may absorb one further non-null leaf: equality always, an ordering
/// operator only when the capability supports range conditions.
/// Everything else stays out of the key condition.
fn match_key(
    conjuncts: &[&Rule],
    capability: &Capability,
    partition_key: &str,
    sort_key: Option<&str>,
) -> Option<KeyMatch> {
    let hash = conjuncts.iter().position(|conjunct| {
        matches!(
            conjunct,
            Rule::Comparison { field, op: CompareOp::Eq, value }
                if field == partition_key && !value.is_null()
        )
    })?;

    let range = sort_key.and_then(|sort| {
        conjuncts.iter().enumerate().position(|(i, conjunct)| {
            if i == hash {
                return false;
            }
            match conjunct {
                Rule::Comparison { field, op, value } if field == sort && !value.is_null() => {
                    *op == CompareOp::Eq
                        || (op.is_ordering() && capability.supports_range_conditions())
                }
                _ => false,
            }
        })
    });

    Some(KeyMatch { hash, range })
}

fn build_keyed(chosen_index: Option<String>, conjuncts: &[&Rule], key: KeyMatch) -> QueryPlan {
    // The hash leaf renders first regardless of where it sat in the rule.
    let mut key_condition = conjuncts[key.hash].clone();
    if let Some(range) = key.range {
        key_condition = key_condition.and(conjuncts[range].clone());
    }

    let residual: Vec<Rule> = conjuncts
        .iter()
        .enumerate()
        .inspect(|(i, conjunct)| {
            trace!(leaf = ?conjunct, absorbed = key.absorbs(*i), "leaf placement");
        })
        .filter(|(i, _)| !key.absorbs(*i))
        .map(|(_, conjunct)| (*conjunct).clone())
        .collect();

    QueryPlan::keyed(chosen_index, key_condition, Rule::fold_and(residual))
}

#[cfg(test)]
mod tests {
    use garnet_types::{SemanticType, Value};

    use super::*;
    use crate::error::QueryError;

    fn capability() -> Capability {
        Capability::builder("order")
            .field("id", SemanticType::Integer)
            .field("placed", SemanticType::DateTime)
            .field("customer", SemanticType::Text)
            .field("region", SemanticType::Text)
            .field("total", SemanticType::Decimal)
            .hash_key("id")
            .range_key("placed")
            .global_index("by-customer", "customer", Some("placed"))
            .global_index("by-region", "region", None)
            .range_conditions(true)
            .build()
            .expect("valid capability")
    }

    #[test]
    fn absent_rule_plans_as_bare_scan() {
        let plan = plan(None, &capability()).expect("plans");
        assert!(plan.is_scan);
        assert!(plan.key_condition.is_none());
        assert!(plan.residual_filter.is_none());
    }

    #[test]
    fn hash_equality_drives_base_table() {
        let rule = Rule::eq("id", 7);
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert!(!plan.is_scan);
        assert_eq!(plan.chosen_index, None);
        assert_eq!(plan.key_condition, Some(rule));
        assert!(plan.residual_filter.is_none());
    }

    #[test]
    fn range_leaf_is_absorbed_with_hash() {
        let rule = Rule::eq("id", 7).and(Rule::gt("placed", "2024-01-01T00:00:00.000000Z"));
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert!(!plan.is_scan);
        assert_eq!(plan.key_condition, Some(rule));
        assert!(plan.residual_filter.is_none());
    }

    #[test]
    fn unabsorbed_leaves_become_residual() {
        let rule = Rule::eq("id", 7).and(Rule::eq("region", "eu"));
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert!(!plan.is_scan);
        assert_eq!(plan.key_condition, Some(Rule::eq("id", 7)));
        assert_eq!(plan.residual_filter, Some(Rule::eq("region", "eu")));
    }

    #[test]
    fn base_table_wins_over_richer_index() {
        // by-customer could absorb two leaves but the base key still wins.
        let rule = Rule::eq("id", 7)
            .and(Rule::eq("customer", "ada"))
            .and(Rule::gt("placed", "2024-01-01T00:00:00.000000Z"));
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert_eq!(plan.chosen_index, None);
        // id equality plus the placed ordering leaf; customer is residual.
        assert_eq!(
            plan.key_condition,
            Some(Rule::eq("id", 7).and(Rule::gt("placed", "2024-01-01T00:00:00.000000Z")))
        );
        assert_eq!(plan.residual_filter, Some(Rule::eq("customer", "ada")));
    }

    #[test]
    fn most_absorbing_index_wins() {
        let rule = Rule::eq("region", "eu")
            .and(Rule::eq("customer", "ada"))
            .and(Rule::lt("placed", "2025-01-01T00:00:00.000000Z"));
        let plan = plan(Some(&rule), &capability()).expect("plans");
        // by-customer absorbs customer+placed (2 leaves); by-region only 1.
        assert_eq!(plan.chosen_index.as_deref(), Some("by-customer"));
        assert_eq!(plan.residual_filter, Some(Rule::eq("region", "eu")));
    }

    #[test]
    fn declaration_order_breaks_leaf_ties() {
        let rule = Rule::eq("customer", "ada").and(Rule::eq("region", "eu"));
        let plan = plan(Some(&rule), &capability()).expect("plans");
        // Both indexes absorb exactly one leaf; by-customer was declared
        // first.
        assert_eq!(plan.chosen_index.as_deref(), Some("by-customer"));
        assert_eq!(plan.residual_filter, Some(Rule::eq("region", "eu")));
    }

    #[test]
    fn ordering_without_range_support_stays_residual() {
        let capability = Capability::builder("order")
            .field("id", SemanticType::Integer)
            .field("placed", SemanticType::DateTime)
            .hash_key("id")
            .range_key("placed")
            .range_conditions(false)
            .build()
            .expect("valid capability");
        let rule = Rule::eq("id", 7).and(Rule::gt("placed", "2024-01-01T00:00:00.000000Z"));
        let plan = plan(Some(&rule), &capability).expect("plans");
        assert_eq!(plan.key_condition, Some(Rule::eq("id", 7)));
        assert_eq!(
            plan.residual_filter,
            Some(Rule::gt("placed", "2024-01-01T00:00:00.000000Z"))
        );
    }

    #[test]
    fn hash_inequality_cannot_drive_a_key() {
        let rule = Rule::gt("id", 7);
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert!(plan.is_scan);
        assert_eq!(plan.residual_filter, Some(rule));
    }

    #[test]
    fn in_on_hash_key_is_not_an_equality() {
        let rule = Rule::is_in("id", [1, 2, 3]);
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert!(plan.is_scan);
        assert_eq!(plan.residual_filter, Some(rule));
    }

    #[test]
    fn null_equality_never_drives_a_key() {
        // eq-null means "field is absent", which no key position can hold.
        let rule = Rule::eq("id", Value::Null);
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert!(plan.is_scan);
        assert_eq!(plan.residual_filter, Some(rule));

        let rule = Rule::eq("customer", Value::Null).and(Rule::eq("region", "eu"));
        let plan = super::plan(Some(&rule), &capability()).expect("plans");
        assert_eq!(plan.chosen_index.as_deref(), Some("by-region"));
        assert_eq!(plan.residual_filter, Some(Rule::eq("customer", Value::Null)));
    }

    #[test]
    fn top_level_or_always_scans() {
        let rule = Rule::eq("id", 1).or(Rule::eq("id", 2));
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert!(plan.is_scan);
        assert_eq!(plan.residual_filter, Some(rule));
    }

    #[test]
    fn top_level_not_always_scans() {
        let rule = Rule::eq("id", 1).negate();
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert!(plan.is_scan);
        assert_eq!(plan.residual_filter, Some(rule));
    }

    #[test]
    fn nested_or_conjunct_stays_residual() {
        let nested = Rule::eq("region", "eu").or(Rule::eq("region", "us"));
        let rule = Rule::eq("id", 7).and(nested.clone());
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert!(!plan.is_scan);
        assert_eq!(plan.key_condition, Some(Rule::eq("id", 7)));
        assert_eq!(plan.residual_filter, Some(nested));
    }

    #[test]
    fn second_range_leaf_goes_residual() {
        let low = Rule::gt("placed", "2024-01-01T00:00:00.000000Z");
        let high = Rule::lt("placed", "2025-01-01T00:00:00.000000Z");
        let rule = Rule::eq("id", 7).and(low.clone()).and(high.clone());
        let plan = plan(Some(&rule), &capability()).expect("plans");
        assert_eq!(plan.key_condition, Some(Rule::eq("id", 7).and(low)));
        assert_eq!(plan.residual_filter, Some(high));
    }

    #[test]
    fn undeclared_field_fails_even_on_scan_shapes() {
        let rule = Rule::eq("missing", 1).or(Rule::eq("id", 2));
        let err = plan(Some(&rule), &capability()).expect_err("undeclared");
        assert_eq!(
            err,
            QueryError::UndeclaredField {
                model: "order".into(),
                field: "missing".into(),
            }
        );
    }
}
