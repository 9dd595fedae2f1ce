//! Key/value flavor: lowers rules into wire-typed conditions.
//!
//! The output types mirror what a key/value store consumes over the wire:
//! a key condition (partition equality plus at most one sort comparison)
//! and a filter tree whose leaves carry [`AttrValue`] operands. The engine
//! executing a [`KvQuery`] must apply the same two-valued null logic as
//! [`Rule::eval`]: a comparison against a missing or null attribute is
//! false, and an equality against the null attribute is the presence test.
//!
//! [`Rule::eval`]: crate::Rule::eval

use garnet_types::{AttrValue, SemanticType, Value};

use crate::coerce;
use crate::error::{QueryError, Result};
use crate::plan::{QueryPlan, validate_key_rule};
use crate::rule::{CompareOp, Rule};
use crate::schema::Capability;

// ============================================================================
// Native condition types
// ============================================================================

/// Comparison operator admitted inside a key condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOp {
    /// Equality.
    Eq,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl KeyOp {
    fn from_compare(op: CompareOp) -> Option<Self> {
        match op {
            CompareOp::Eq => Some(KeyOp::Eq),
            CompareOp::Lt => Some(KeyOp::Lt),
            CompareOp::Le => Some(KeyOp::Le),
            CompareOp::Gt => Some(KeyOp::Gt),
            CompareOp::Ge => Some(KeyOp::Ge),
            CompareOp::Ne => None,
        }
    }
}

/// A sort-key comparison inside a key condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeCondition {
    /// Sort-key field name.
    pub field: String,
    /// Comparison operator.
    pub op: KeyOp,
    /// Wire-typed operand.
    pub value: AttrValue,
}

/// A compiled key condition: partition equality plus an optional sort-key
/// comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCondition {
    /// Partition-key field name.
    pub hash_field: String,
    /// Partition-key operand; always an equality.
    pub hash_value: AttrValue,
    /// Optional sort-key comparison.
    pub range: Option<RangeCondition>,
}

/// A compiled filter tree with wire-typed operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCondition {
    /// A single comparison leaf.
    Compare {
        /// Field name.
        field: String,
        /// Comparison operator; the full table is allowed in filters.
        op: CompareOp,
        /// Wire-typed operand.
        value: AttrValue,
    },
    /// Membership in a literal set; the native lowering of `in`.
    MemberOf {
        /// Field name.
        field: String,
        /// Wire-typed members.
        values: Vec<AttrValue>,
    },
    /// Both sides must hold.
    And(Box<KvCondition>, Box<KvCondition>),
    /// Either side must hold.
    Or(Box<KvCondition>, Box<KvCondition>),
    /// Two-valued negation of the inner condition.
    Not(Box<KvCondition>),
}

/// A fully compiled key/value query: key condition and residual filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvQuery {
    /// Secondary index to query; `None` targets the base table.
    pub index: Option<String>,
    /// Key condition; `None` means a full scan.
    pub key: Option<KeyCondition>,
    /// Residual filter applied after key retrieval.
    pub filter: Option<KvCondition>,
}

// ============================================================================
// Compilation
// ============================================================================

/// Compiles a residual or scan filter into a wire-typed condition tree.
///
/// # Errors
///
/// [`QueryError::UndeclaredField`] for unknown fields and
/// [`QueryError::Coercion`] for literals that do not fit their field's
/// semantic type.
///
/// [`QueryError::UndeclaredField`]: crate::QueryError::UndeclaredField
/// [`QueryError::Coercion`]: crate::QueryError::Coercion
pub fn compile_filter(rule: &Rule, capability: &Capability) -> Result<KvCondition> {
    match rule {
        Rule::Comparison { field, op, value } => {
            let semantic = capability.field_type_or_err(field)?;
            let literal = coerce::literal(field, semantic, value)?;
            coerce::check_comparison(field, *op, &literal, semantic)?;
            Ok(KvCondition::Compare {
                field: field.clone(),
                op: *op,
                value: lower(field, &literal, semantic)?,
            })
        }
        Rule::In { field, values } => {
            let semantic = capability.field_type_or_err(field)?;
            let members = values
                .iter()
                .map(|v| {
                    let literal = coerce::literal(field, semantic, v)?;
                    lower(field, &literal, semantic)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(KvCondition::MemberOf {
                field: field.clone(),
                values: members,
            })
        }
        Rule::And(left, right) => Ok(KvCondition::And(
            Box::new(compile_filter(left, capability)?),
            Box::new(compile_filter(right, capability)?),
        )),
        Rule::Or(left, right) => Ok(KvCondition::Or(
            Box::new(compile_filter(left, capability)?),
            Box::new(compile_filter(right, capability)?),
        )),
        Rule::Not(inner) => Ok(KvCondition::Not(Box::new(compile_filter(
            inner, capability,
        )?))),
    }
}

/// Compiles a planner-produced key condition for the base table or the
/// named index.
///
/// Validates the key grammar before lowering even though the planner
/// never emits a violating rule; hand-assembled plans reach this path
/// too.
///
/// # Errors
///
/// [`QueryError::UnsupportedKeyOperator`] for rules outside the key
/// grammar and [`QueryError::Coercion`] for key literals that do not fit
/// or are null.
///
/// [`QueryError::UnsupportedKeyOperator`]: crate::QueryError::UnsupportedKeyOperator
/// [`QueryError::Coercion`]: crate::QueryError::Coercion
pub fn compile_key(
    rule: &Rule,
    capability: &Capability,
    index: Option<&str>,
) -> Result<KeyCondition> {
    let (partition_key, sort_key) = match index {
        Some(name) => {
            let index = capability.index_or_err(name)?;
            (index.partition_key(), index.sort_key())
        }
        None => (capability.hash_key(), capability.range_key()),
    };
    validate_key_rule(rule, capability, partition_key, sort_key)?;

    let mut hash_value = None;
    let mut range = None;
    for conjunct in rule.conjuncts() {
        let Rule::Comparison { field, op, value } = conjunct else {
            // validate_key_rule admits only comparisons
            continue;
        };
        let semantic = capability.field_type_or_err(field)?;
        let literal = coerce::literal(field, semantic, value)?;
        if literal.is_null() {
            // Keys are total; a null never addresses a partition or sort
            // position.
            return Err(QueryError::coercion(field, &Value::Null, semantic));
        }
        let wire = lower(field, &literal, semantic)?;

        if field == partition_key && hash_value.is_none() {
            hash_value = Some(wire);
        } else if let Some(op) = KeyOp::from_compare(*op) {
            range = Some(RangeCondition {
                field: field.clone(),
                op,
                value: wire,
            });
        }
    }

    match hash_value {
        Some(hash_value) => Ok(KeyCondition {
            hash_field: partition_key.to_string(),
            hash_value,
            range,
        }),
        // validate_key_rule already required the equality
        None => Err(QueryError::key_operator("missing hash-key equality")),
    }
}

/// Compiles a whole plan into an executable key/value query.
///
/// # Errors
///
/// [`QueryError::UnknownIndex`] when the plan names an index the
/// capability does not declare, plus everything [`compile_key`] and
/// [`compile_filter`] can raise.
///
/// [`QueryError::UnknownIndex`]: crate::QueryError::UnknownIndex
pub fn compile_plan(plan: &QueryPlan, capability: &Capability) -> Result<KvQuery> {
    if let Some(name) = plan.chosen_index.as_deref() {
        capability.index_or_err(name)?;
    }

    let key = plan
        .key_condition
        .as_ref()
        .map(|rule| compile_key(rule, capability, plan.chosen_index.as_deref()))
        .transpose()?;
    let filter = plan
        .residual_filter
        .as_ref()
        .map(|rule| compile_filter(rule, capability))
        .transpose()?;

    Ok(KvQuery {
        index: plan.chosen_index.clone(),
        key,
        filter,
    })
}

fn lower(field: &str, literal: &Value, semantic: SemanticType) -> Result<AttrValue> {
    AttrValue::from_value(literal, semantic)
        .map_err(|_| QueryError::coercion(field, literal, semantic))
}
