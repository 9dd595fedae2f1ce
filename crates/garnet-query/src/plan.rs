//! Query plans and execution windows.

use garnet_types::Record;

use crate::error::{QueryError, Result};
use crate::rule::{CompareOp, Rule};
use crate::schema::Capability;

// ============================================================================
// Ordering
// ============================================================================

/// Result-set ordering for query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Ascending key order (default).
    #[default]
    Ascending,
    /// Descending key order. Only valid on a key-condition path.
    Descending,
}

impl Order {
    /// Returns true for [`Order::Descending`].
    pub fn is_descending(self) -> bool {
        matches!(self, Order::Descending)
    }
}

// ============================================================================
// Plans
// ============================================================================

/// How a rule executes against one model: a key-condition path or a scan.
///
/// Transient and per-call: the planner creates it, the compiler and
/// adapter consume it, and it is discarded when the call returns.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// The chosen secondary index; `None` on the key path means the base
    /// table.
    pub chosen_index: Option<String>,
    /// The conjunction absorbed into the key condition.
    pub key_condition: Option<Rule>,
    /// The conjunction left over for post-retrieval filtering.
    pub residual_filter: Option<Rule>,
    /// True when no key condition could be extracted.
    pub is_scan: bool,
}

impl QueryPlan {
    /// A full-scan plan with an optional residual filter.
    pub fn scan(residual_filter: Option<Rule>) -> Self {
        QueryPlan {
            chosen_index: None,
            key_condition: None,
            residual_filter,
            is_scan: true,
        }
    }

    /// A key-condition plan against the base table or a named index.
    pub fn keyed(
        chosen_index: Option<String>,
        key_condition: Rule,
        residual_filter: Option<Rule>,
    ) -> Self {
        QueryPlan {
            chosen_index,
            key_condition: Some(key_condition),
            residual_filter,
            is_scan: false,
        }
    }

    /// Rejects orderings the plan cannot honor.
    ///
    /// # Errors
    ///
    /// [`QueryError::UnsupportedOrder`] for descending order on a scan.
    pub fn check_order(&self, order: Order) -> Result<()> {
        if self.is_scan && order.is_descending() {
            return Err(QueryError::UnsupportedOrder);
        }
        Ok(())
    }
}

/// Validates that a key-condition rule stays inside the key grammar.
///
/// Both flavor renderers run this before lowering: each conjunct must be a
/// comparison, the hash key is pinned by equality exactly once, and the
/// range key takes equality always but ordering operators only when the
/// capability allows range conditions. The planner never emits anything
/// else; this guards hand-assembled plans.
pub(crate) fn validate_key_rule(
    rule: &Rule,
    capability: &Capability,
    hash_field: &str,
    range_field: Option<&str>,
) -> Result<()> {
    let mut hash_pinned = false;
    for conjunct in rule.conjuncts() {
        let (field, op) = match conjunct {
            Rule::Comparison { field, op, .. } => (field.as_str(), *op),
            Rule::In { .. } => return Err(QueryError::key_operator("in")),
            Rule::Or(_, _) => return Err(QueryError::key_operator("or")),
            Rule::Not(_) => return Err(QueryError::key_operator("not")),
            // conjuncts() flattened every And
            Rule::And(_, _) => unreachable!("conjuncts are never conjunctions"),
        };

        if field == hash_field && !hash_pinned {
            if op != CompareOp::Eq {
                return Err(QueryError::key_operator(op.symbol()));
            }
            hash_pinned = true;
        } else if Some(field) == range_field {
            match op {
                CompareOp::Eq => {}
                _ if op.is_ordering() && capability.supports_range_conditions() => {}
                _ => return Err(QueryError::key_operator(op.symbol())),
            }
        } else {
            // A non-key field can only mean the plan was assembled by hand;
            // reject rather than silently widen the key condition.
            return Err(QueryError::key_operator(op.symbol()));
        }
    }

    if !hash_pinned {
        return Err(QueryError::key_operator("missing hash-key equality"));
    }
    Ok(())
}

// ============================================================================
// Windows and raw pages
// ============================================================================

/// One page worth of execution parameters handed to a backend.
#[derive(Debug, Clone, Default)]
pub struct Window {
    /// Iteration direction.
    pub order: Order,
    /// Maximum records to return; `None` means unbounded.
    pub limit: Option<usize>,
    /// Resume strictly after this key tuple (the decoded continuation
    /// token); `None` starts from the beginning.
    pub start_after: Option<Record>,
}

impl Window {
    /// An unbounded ascending window.
    pub fn unbounded() -> Self {
        Window::default()
    }
}

/// A raw result page returned by a backend adapter.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// Matching records, in window order.
    pub items: Vec<Record>,
    /// Key tuple of the last record examined, present only when more
    /// matching records may remain.
    pub last_key: Option<Record>,
}

#[cfg(test)]
mod tests {
    use garnet_types::SemanticType;

    use super::*;
    use crate::schema::Capability;

    fn cap(range_conditions: bool) -> Capability {
        Capability::builder("item")
            .field("id", SemanticType::Integer)
            .field("ts", SemanticType::Integer)
            .field("name", SemanticType::Text)
            .hash_key("id")
            .range_key("ts")
            .range_conditions(range_conditions)
            .build()
            .expect("valid capability")
    }

    #[test]
    fn descending_scan_is_rejected() {
        let plan = QueryPlan::scan(None);
        assert_eq!(
            plan.check_order(Order::Descending),
            Err(QueryError::UnsupportedOrder)
        );
        assert!(plan.check_order(Order::Ascending).is_ok());
    }

    #[test]
    fn descending_keyed_plan_is_allowed() {
        let plan = QueryPlan::keyed(None, Rule::eq("id", 1), None);
        assert!(plan.check_order(Order::Descending).is_ok());
    }

    #[test]
    fn key_rule_accepts_hash_eq_and_range_ordering() {
        let c = cap(true);
        let rule = Rule::eq("id", 1).and(Rule::gt("ts", 5));
        assert!(validate_key_rule(&rule, &c, "id", Some("ts")).is_ok());
    }

    #[test]
    fn key_rule_rejects_non_equality_hash() {
        let c = cap(true);
        let rule = Rule::gt("id", 1);
        assert_eq!(
            validate_key_rule(&rule, &c, "id", Some("ts")),
            Err(QueryError::key_operator(">"))
        );
    }

    #[test]
    fn key_rule_rejects_in_and_or() {
        let c = cap(true);
        assert_eq!(
            validate_key_rule(&Rule::is_in("id", [1, 2]), &c, "id", None),
            Err(QueryError::key_operator("in"))
        );
        let rule = Rule::eq("id", 1).or(Rule::eq("id", 2));
        assert_eq!(
            validate_key_rule(&rule, &c, "id", None),
            Err(QueryError::key_operator("or"))
        );
    }

    #[test]
    fn key_rule_gates_range_ordering_on_capability() {
        let c = cap(false);
        let rule = Rule::eq("id", 1).and(Rule::gt("ts", 5));
        assert_eq!(
            validate_key_rule(&rule, &c, "id", Some("ts")),
            Err(QueryError::key_operator(">"))
        );
        // Equality on the range key is always in-grammar
        let rule = Rule::eq("id", 1).and(Rule::eq("ts", 5));
        assert!(validate_key_rule(&rule, &c, "id", Some("ts")).is_ok());
    }

    #[test]
    fn key_rule_requires_hash_equality_present() {
        let c = cap(true);
        let rule = Rule::eq("ts", 5);
        assert!(validate_key_rule(&rule, &c, "id", Some("ts")).is_err());
    }
}
