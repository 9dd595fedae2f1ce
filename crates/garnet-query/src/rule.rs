//! Backend-agnostic rule expressions.
//!
//! A [`Rule`] is a boolean predicate over record fields. Callers build one
//! with the combinator methods, the planner splits it into key-condition and
//! residual parts, and the flavor renderers lower each part into a backend's
//! native expression. [`Rule::eval`] is the reference semantics the rendered
//! forms must agree with.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use garnet_types::{Record, Value};

use crate::coerce;
use crate::error::Result;
use crate::schema::Capability;

// ============================================================================
// Operators
// ============================================================================

/// Comparison operators usable in a rule leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// The operator's source-level symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Returns true for the ordering operators (`<`, `<=`, `>`, `>=`).
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge
        )
    }

    /// Applies the operator to an ordering outcome.
    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// ============================================================================
// Rules
// ============================================================================

/// A backend-agnostic boolean predicate over record fields.
///
/// Immutable once constructed. Evaluation semantics are two-valued: a
/// comparison or membership test against a missing or null field value is
/// false, and [`Rule::Not`] is plain negation on top of that. Comparing
/// *to* a null literal is the null test itself: `=` means "is
/// null/missing", `!=` means "is present and non-null".
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// `field <op> literal`.
    Comparison {
        /// Field name; must be declared on the model.
        field: String,
        /// Comparison operator.
        op: CompareOp,
        /// Literal operand, coerced to the field's semantic type.
        value: Value,
    },
    /// Both sides must hold.
    And(Box<Rule>, Box<Rule>),
    /// Either side must hold.
    Or(Box<Rule>, Box<Rule>),
    /// The inner rule must not hold.
    Not(Box<Rule>),
    /// The field's value is a member of the literal set.
    In {
        /// Field name; must be declared on the model.
        field: String,
        /// Literal member set.
        values: Vec<Value>,
    },
}

impl Rule {
    /// Builds a comparison leaf.
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Rule::Comparison {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// `field = value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Rule::compare(field, CompareOp::Eq, value)
    }

    /// `field != value`.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Rule::compare(field, CompareOp::Ne, value)
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Rule::compare(field, CompareOp::Lt, value)
    }

    /// `field <= value`.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Rule::compare(field, CompareOp::Le, value)
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Rule::compare(field, CompareOp::Gt, value)
    }

    /// `field >= value`.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Rule::compare(field, CompareOp::Ge, value)
    }

    /// `field in (values...)`.
    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Rule::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field not in (values...)`.
    pub fn not_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Rule::is_in(field, values).negate()
    }

    /// Conjunction with another rule.
    #[must_use]
    pub fn and(self, other: Rule) -> Self {
        Rule::And(Box::new(self), Box::new(other))
    }

    /// Disjunction with another rule.
    #[must_use]
    pub fn or(self, other: Rule) -> Self {
        Rule::Or(Box::new(self), Box::new(other))
    }

    /// Negation.
    #[must_use]
    pub fn negate(self) -> Self {
        Rule::Not(Box::new(self))
    }

    /// Collects every field name the rule references, in visit order and
    /// with duplicates retained.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Rule::Comparison { field, .. } | Rule::In { field, .. } => out.push(field),
            Rule::And(left, right) | Rule::Or(left, right) => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Rule::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Flattens the top-level `And` chain into its conjuncts.
    ///
    /// A non-`And` rule is its own single conjunct. Nested `Or`/`Not`
    /// subtrees stay intact as opaque conjuncts.
    pub(crate) fn conjuncts(&self) -> Vec<&Rule> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts<'a>(&'a self, out: &mut Vec<&'a Rule>) {
        match self {
            Rule::And(left, right) => {
                left.collect_conjuncts(out);
                right.collect_conjuncts(out);
            }
            other => out.push(other),
        }
    }

    /// Folds a list of rules back into a right-leaning `And` chain.
    pub(crate) fn fold_and(mut rules: Vec<Rule>) -> Option<Rule> {
        let first = if rules.is_empty() {
            return None;
        } else {
            rules.remove(0)
        };
        Some(rules.into_iter().fold(first, Rule::and))
    }

    /// Evaluates the rule directly against a record.
    ///
    /// This is the reference semantics for the flavor renderers: executing
    /// the compiled form of a rule against a backend must select exactly
    /// the records for which `eval` returns true.
    ///
    /// Both sides of `And`/`Or` are always evaluated so coercion failures
    /// surface deterministically, matching compilation (which renders every
    /// leaf).
    ///
    /// # Errors
    ///
    /// [`QueryError::UndeclaredField`] for fields the capability does not
    /// declare and [`QueryError::Coercion`] for literals that do not fit
    /// the field's semantic type.
    ///
    /// [`QueryError::UndeclaredField`]: crate::QueryError::UndeclaredField
    /// [`QueryError::Coercion`]: crate::QueryError::Coercion
    pub fn eval(&self, capability: &Capability, record: &Record) -> Result<bool> {
        match self {
            Rule::Comparison { field, op, value } => {
                let semantic = capability.field_type_or_err(field)?;
                let literal = coerce::literal(field, semantic, value)?;
                coerce::check_comparison(field, *op, &literal, semantic)?;

                // coerce::stored collapses missing, null, and unusable
                // values into None, so the arms below see only usable
                // stored values.
                let stored = coerce::stored(semantic, record.get_or_null(field));
                Ok(match (&literal, stored) {
                    // Null literal: `=` is the null test, `!=` its negation.
                    (Value::Null, stored) => {
                        let is_null = stored.is_none();
                        match op {
                            CompareOp::Eq => is_null,
                            CompareOp::Ne => !is_null,
                            // check_comparison rejected the ordering ops
                            _ => false,
                        }
                    }
                    (_, None) => false,
                    (literal, Some(stored)) => stored
                        .compare(literal)
                        .is_some_and(|ord| op.holds(ord)),
                })
            }
            Rule::In { field, values } => {
                let semantic = capability.field_type_or_err(field)?;
                let members = values
                    .iter()
                    .map(|v| coerce::literal(field, semantic, v))
                    .collect::<Result<Vec<_>>>()?;

                // A null member is the presence test, mirroring the
                // equality lowering of `in` as an or-chain.
                let stored = coerce::stored(semantic, record.get_or_null(field));
                Ok(match stored {
                    None => members.iter().any(Value::is_null),
                    Some(stored) => members.iter().any(|m| {
                        !m.is_null() && stored.compare(m) == Some(Ordering::Equal)
                    }),
                })
            }
            Rule::And(left, right) => {
                let l = left.eval(capability, record)?;
                let r = right.eval(capability, record)?;
                Ok(l && r)
            }
            Rule::Or(left, right) => {
                let l = left.eval(capability, record)?;
                let r = right.eval(capability, record)?;
                Ok(l || r)
            }
            Rule::Not(inner) => Ok(!inner.eval(capability, record)?),
        }
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Comparison { field, op, value } => write!(f, "{field} {op} {value}"),
            Rule::And(left, right) => write!(f, "({left} and {right})"),
            Rule::Or(left, right) => write!(f, "({left} or {right})"),
            Rule::Not(inner) => write!(f, "(not {inner})"),
            Rule::In { field, values } => {
                write!(f, "{field} in [")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}
