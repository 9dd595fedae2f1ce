//! Relational flavor: renders rules as parameterized SQL predicates.
//!
//! Column storage follows the semantic type map in [`column_type`], and
//! every rendered leaf collapses SQL's three-valued logic back to two
//! values by wrapping the predicate in `ifnull(.., 0)`: a comparison
//! whose column is NULL evaluates to false, exactly as [`Rule::eval`]
//! treats missing fields. Null literals render as the `IS NULL` presence
//! forms instead.
//!
//! Decimals are stored as normalized text so equality is a plain text
//! match, while ordering comparisons go through `CAST(col AS REAL)` with
//! a real-typed parameter. The cast bounds ordering precision at what an
//! IEEE double resolves, roughly fifteen significant digits.
//!
//! [`Rule::eval`]: crate::Rule::eval

use garnet_types::{Record, SemanticType, Value};
use rust_decimal::prelude::ToPrimitive;

use crate::coerce;
use crate::error::{QueryError, Result};
use crate::plan::{Order, QueryPlan, validate_key_rule};
use crate::rule::{CompareOp, Rule};
use crate::schema::Capability;

// ============================================================================
// Parameters and fragments
// ============================================================================

/// An owned SQL bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// SQL NULL.
    Null,
    /// INTEGER affinity.
    Integer(i64),
    /// REAL affinity.
    Real(f64),
    /// TEXT affinity.
    Text(String),
}

/// A SQL snippet plus its positional bind parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlFragment {
    /// The rendered SQL, with `?` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<SqlParam>,
}

impl SqlFragment {
    fn leaf(sql: String, params: Vec<SqlParam>) -> Self {
        SqlFragment { sql, params }
    }

    /// Joins fragments into one conjunction; `None` when empty.
    pub fn and_join(fragments: Vec<SqlFragment>) -> Option<SqlFragment> {
        let mut iter = fragments.into_iter();
        let mut joined = iter.next()?;
        for fragment in iter {
            joined.sql = format!("({} AND {})", joined.sql, fragment.sql);
            joined.params.extend(fragment.params);
        }
        Some(joined)
    }
}

// ============================================================================
// Column mapping
// ============================================================================

/// The column type a semantic type is stored under.
pub fn column_type(semantic: SemanticType) -> &'static str {
    match semantic {
        SemanticType::Integer | SemanticType::Boolean | SemanticType::Timestamp => "INTEGER",
        SemanticType::Double => "REAL",
        SemanticType::Decimal
        | SemanticType::Text
        | SemanticType::DateTime
        | SemanticType::Json => "TEXT",
    }
}

/// Quotes an identifier for embedding in rendered SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The column expression used wherever a field is compared by order.
///
/// Decimal columns cast to REAL so text storage does not leak lexical
/// ordering; every other semantic type orders correctly in its stored
/// affinity.
pub fn order_column(field: &str, semantic: SemanticType) -> String {
    let ident = quote_ident(field);
    if semantic == SemanticType::Decimal {
        format!("CAST({ident} AS REAL)")
    } else {
        ident
    }
}

/// Lowers a value to the parameter bound for storage and equality.
///
/// This is also the lowering used when writing a row, so equality
/// comparisons match stored text byte for byte.
///
/// # Errors
///
/// [`QueryError::Coercion`] when the value does not fit the semantic
/// type.
///
/// [`QueryError::Coercion`]: crate::QueryError::Coercion
pub fn store_param(field: &str, value: &Value, semantic: SemanticType) -> Result<SqlParam> {
    let canonical = coerce::literal(field, semantic, value)?;
    Ok(match canonical {
        Value::Null => SqlParam::Null,
        Value::Integer(n) => SqlParam::Integer(n),
        Value::Double(f) => SqlParam::Real(f),
        Value::Boolean(b) => SqlParam::Integer(i64::from(b)),
        Value::Text(s) => SqlParam::Text(s),
        Value::Decimal(d) => SqlParam::Text(d.to_string()),
        Value::DateTime(dt) => SqlParam::Text(garnet_types::format_datetime(&dt)),
        Value::Json(j) => SqlParam::Text(j.to_string()),
    })
}

/// Lowers a value to the parameter bound in an ordering comparison.
///
/// Matches [`order_column`]: decimals bind as REAL, everything else binds
/// as it stores.
///
/// # Errors
///
/// [`QueryError::Coercion`] when the value does not fit the semantic
/// type, including decimals beyond REAL range.
///
/// [`QueryError::Coercion`]: crate::QueryError::Coercion
pub fn order_param(field: &str, value: &Value, semantic: SemanticType) -> Result<SqlParam> {
    let canonical = coerce::literal(field, semantic, value)?;
    if semantic == SemanticType::Decimal {
        let Value::Decimal(d) = &canonical else {
            return Err(QueryError::coercion(field, value, semantic));
        };
        let real = d
            .to_f64()
            .ok_or_else(|| QueryError::coercion(field, value, semantic))?;
        return Ok(SqlParam::Real(real));
    }
    store_param(field, &canonical, semantic)
}

// ============================================================================
// Predicate rendering
// ============================================================================

/// Renders a residual or scan filter as a parameterized predicate.
///
/// # Errors
///
/// [`QueryError::UndeclaredField`] for unknown fields and
/// [`QueryError::Coercion`] for literals that do not fit their field's
/// semantic type.
///
/// [`QueryError::UndeclaredField`]: crate::QueryError::UndeclaredField
/// [`QueryError::Coercion`]: crate::QueryError::Coercion
pub fn compile_filter(rule: &Rule, capability: &Capability) -> Result<SqlFragment> {
    match rule {
        Rule::Comparison { field, op, value } => {
            let semantic = capability.field_type_or_err(field)?;
            let literal = coerce::literal(field, semantic, value)?;
            coerce::check_comparison(field, *op, &literal, semantic)?;
            render_comparison(field, *op, &literal, semantic)
        }
        Rule::In { field, values } => {
            let semantic = capability.field_type_or_err(field)?;
            let members = values
                .iter()
                .map(|v| coerce::literal(field, semantic, v))
                .collect::<Result<Vec<_>>>()?;
            render_membership(field, &members, semantic)
        }
        Rule::And(left, right) => {
            let l = compile_filter(left, capability)?;
            let r = compile_filter(right, capability)?;
            Ok(binary(l, "AND", r))
        }
        Rule::Or(left, right) => {
            let l = compile_filter(left, capability)?;
            let r = compile_filter(right, capability)?;
            Ok(binary(l, "OR", r))
        }
        Rule::Not(inner) => {
            let inner = compile_filter(inner, capability)?;
            Ok(SqlFragment::leaf(
                format!("(NOT {})", inner.sql),
                inner.params,
            ))
        }
    }
}

/// Renders a planner-produced key condition for the base table or the
/// named index.
///
/// The key condition and residual filter both land in the same `WHERE`
/// clause here, but the key grammar is still validated so hand-assembled
/// plans fail the same way they would against the key/value flavor.
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
) -> Result<SqlFragment> {
    let (partition_key, sort_key) = match index {
        Some(name) => {
            let index = capability.index_or_err(name)?;
            (index.partition_key(), index.sort_key())
        }
        None => (capability.hash_key(), capability.range_key()),
    };
    validate_key_rule(rule, capability, partition_key, sort_key)?;

    let mut parts = Vec::new();
    for conjunct in rule.conjuncts() {
        let Rule::Comparison { field, op, value } = conjunct else {
            // validate_key_rule admits only comparisons
            continue;
        };
        let semantic = capability.field_type_or_err(field)?;
        let literal = coerce::literal(field, semantic, value)?;
        if literal.is_null() {
            return Err(QueryError::coercion(field, &Value::Null, semantic));
        }
        parts.push(render_comparison(field, *op, &literal, semantic)?);
    }

    SqlFragment::and_join(parts)
        .ok_or_else(|| QueryError::key_operator("missing hash-key equality"))
}

/// Renders a whole plan's `WHERE` predicate; `None` for a bare scan.
///
/// # Errors
///
/// [`QueryError::UnknownIndex`] when the plan names an index the
/// capability does not declare, plus everything [`compile_key`] and
/// [`compile_filter`] can raise.
///
/// [`QueryError::UnknownIndex`]: crate::QueryError::UnknownIndex
pub fn compile_plan(plan: &QueryPlan, capability: &Capability) -> Result<Option<SqlFragment>> {
    if let Some(name) = plan.chosen_index.as_deref() {
        capability.index_or_err(name)?;
    }

    let mut parts = Vec::new();
    if let Some(rule) = plan.key_condition.as_ref() {
        parts.push(compile_key(rule, capability, plan.chosen_index.as_deref())?);
    }
    if let Some(rule) = plan.residual_filter.as_ref() {
        parts.push(compile_filter(rule, capability)?);
    }
    Ok(SqlFragment::and_join(parts))
}

/// Renders the strictly-after predicate that resumes a page.
///
/// `columns` is the resume tuple in order; the row-value comparison
/// `(c1, c2, ..) > (?, ?, ..)` (or `<` when descending) positions the
/// cursor strictly after the last returned record.
///
/// # Errors
///
/// [`QueryError::InvalidToken`] when the resume record is missing a
/// tuple field, and [`QueryError::Coercion`] when a resume value does
/// not fit its column.
///
/// [`QueryError::InvalidToken`]: crate::QueryError::InvalidToken
/// [`QueryError::Coercion`]: crate::QueryError::Coercion
pub fn keyset_predicate(
    columns: &[(String, SemanticType)],
    after: &Record,
    order: Order,
) -> Result<SqlFragment> {
    let mut exprs = String::new();
    let mut holes = String::new();
    let mut params = Vec::with_capacity(columns.len());
    for (i, (field, semantic)) in columns.iter().enumerate() {
        if i > 0 {
            exprs.push_str(", ");
            holes.push_str(", ");
        }
        exprs.push_str(&order_column(field, *semantic));
        holes.push('?');
        let value = after
            .get(field)
            .ok_or_else(|| QueryError::token(format!("resume key missing field `{field}`")))?;
        if value.is_null() {
            return Err(QueryError::token(format!("resume key field `{field}` is null")));
        }
        params.push(order_param(field, value, *semantic)?);
    }

    let cmp = if order.is_descending() { "<" } else { ">" };
    Ok(SqlFragment::leaf(
        format!("(({exprs}) {cmp} ({holes}))"),
        params,
    ))
}

fn binary(left: SqlFragment, op: &str, right: SqlFragment) -> SqlFragment {
    let mut params = left.params;
    params.extend(right.params);
    SqlFragment::leaf(format!("({} {} {})", left.sql, op, right.sql), params)
}

fn render_comparison(
    field: &str,
    op: CompareOp,
    literal: &Value,
    semantic: SemanticType,
) -> Result<SqlFragment> {
    let ident = quote_ident(field);

    if literal.is_null() {
        // check_comparison already limited null to the presence tests.
        let sql = match op {
            CompareOp::Eq => format!("({ident} IS NULL)"),
            _ => format!("({ident} IS NOT NULL)"),
        };
        return Ok(SqlFragment::leaf(sql, Vec::new()));
    }

    let (column, param) = if op.is_ordering() {
        (
            order_column(field, semantic),
            order_param(field, literal, semantic)?,
        )
    } else {
        (ident, store_param(field, literal, semantic)?)
    };

    Ok(SqlFragment::leaf(
        format!("ifnull({column} {} ?, 0)", sql_symbol(op)),
        vec![param],
    ))
}

fn render_membership(
    field: &str,
    members: &[Value],
    semantic: SemanticType,
) -> Result<SqlFragment> {
    let ident = quote_ident(field);
    let has_null = members.iter().any(Value::is_null);
    let concrete: Vec<&Value> = members.iter().filter(|m| !m.is_null()).collect();

    // `IN ()` is unsatisfiable and SQLite rejects the empty list anyway.
    if concrete.is_empty() && !has_null {
        return Ok(SqlFragment::leaf("0".to_string(), Vec::new()));
    }

    let mut fragments = Vec::new();
    if has_null {
        fragments.push(SqlFragment::leaf(format!("({ident} IS NULL)"), Vec::new()));
    }
    if !concrete.is_empty() {
        let holes = vec!["?"; concrete.len()].join(", ");
        let params = concrete
            .iter()
            .map(|m| store_param(field, m, semantic))
            .collect::<Result<Vec<_>>>()?;
        fragments.push(SqlFragment::leaf(
            format!("ifnull({ident} IN ({holes}), 0)"),
            params,
        ));
    }

    match fragments.into_iter().reduce(|l, r| binary(l, "OR", r)) {
        Some(joined) => Ok(joined),
        None => Ok(SqlFragment::leaf("0".to_string(), Vec::new())),
    }
}

fn sql_symbol(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "<>",
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
    }
}
