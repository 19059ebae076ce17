//! Store predicates and read queries.
//!
//! The service layer compiles its filter wire shape down to these
//! descriptors; delegates evaluate them however their backing store
//! requires. The in-memory store evaluates them directly against records.

use crate::record::{field_or_null, Record};
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison operator for range predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Gte,
}

/// A single store predicate. Predicates in a query always conjoin.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals value. A missing field compares as JSON `null`.
    Equals {
        /// Field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// Field compares against a bound. Null fields never match.
    Range {
        /// Field name.
        field: String,
        /// Comparison operator.
        op: RangeOp,
        /// The bound.
        value: Value,
    },
    /// Field is a member of the set; optionally also matches null.
    InSet {
        /// Field name.
        field: String,
        /// Non-null candidate values.
        values: Vec<Value>,
        /// Whether a null field also matches.
        or_null: bool,
    },
    /// Field is not a member of the set; optionally also matches null.
    ///
    /// Without `or_null`, a null field never matches (SQL `NOT IN`
    /// three-valued semantics).
    NotInSet {
        /// Field name.
        field: String,
        /// Non-null excluded values.
        values: Vec<Value>,
        /// Whether a null field also matches.
        or_null: bool,
    },
    /// Field is null or absent.
    IsNull {
        /// Field name.
        field: String,
    },
    /// Field is present and non-null.
    NotNull {
        /// Field name.
        field: String,
    },
    /// String field contains the token as a substring.
    Contains {
        /// Field name.
        field: String,
        /// Token to look for.
        token: String,
    },
}

impl Predicate {
    /// Evaluates the predicate against a record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::Equals { field, value } => field_or_null(record, field) == value,
            Predicate::Range { field, op, value } => {
                let actual = field_or_null(record, field);
                if actual.is_null() {
                    return false;
                }
                match compare_values(actual, value) {
                    Some(Ordering::Less) => matches!(op, RangeOp::Lt | RangeOp::Lte),
                    Some(Ordering::Equal) => matches!(op, RangeOp::Lte | RangeOp::Gte),
                    Some(Ordering::Greater) => matches!(op, RangeOp::Gt | RangeOp::Gte),
                    None => false,
                }
            }
            Predicate::InSet {
                field,
                values,
                or_null,
            } => {
                let actual = field_or_null(record, field);
                if actual.is_null() {
                    *or_null
                } else {
                    values.contains(actual)
                }
            }
            Predicate::NotInSet {
                field,
                values,
                or_null,
            } => {
                let actual = field_or_null(record, field);
                if actual.is_null() {
                    *or_null
                } else {
                    !values.contains(actual)
                }
            }
            Predicate::IsNull { field } => field_or_null(record, field).is_null(),
            Predicate::NotNull { field } => !field_or_null(record, field).is_null(),
            Predicate::Contains { field, token } => match field_or_null(record, field) {
                Value::String(s) => s.contains(token.as_str()),
                _ => false,
            },
        }
    }
}

/// Returns whether a record satisfies every predicate.
pub fn matches_all(record: &Record, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|p| p.matches(record))
}

/// Sort direction for an ordered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// A read query: conjoined predicates plus optional ordering and limit.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Predicates, all of which must hold.
    pub predicates: Vec<Predicate>,
    /// Optional ordering field and direction.
    pub order_by: Option<(String, SortOrder)>,
    /// Optional maximum number of records to return.
    pub take: Option<usize>,
}

impl Query {
    /// Creates a query from predicates alone.
    #[must_use]
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self {
            predicates,
            order_by: None,
            take: None,
        }
    }

    /// Sets the ordering.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    /// Sets the limit.
    #[must_use]
    pub fn take(mut self, n: usize) -> Self {
        self.take = Some(n);
        self
    }
}

/// Orders two JSON values, when they are comparable.
///
/// Numbers compare numerically, strings lexicographically (which also
/// orders ISO-8601 timestamps chronologically). Mixed or non-scalar
/// shapes are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64()?, y.as_f64()?);
            x.partial_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
