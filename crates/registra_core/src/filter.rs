//! Filter compiler.
//!
//! The wire shape is a flat object keyed by field name. A key is one of:
//!
//! - a plain field name — equality
//! - `ids` — explicit key list
//! - `q` — free text over the derived search column
//! - `<field><suffix>` with a recognized suffix:
//!   `_lte`, `_gte`, `_lt`, `_gt`, `_in`, `_not_in`, `_defined`
//!
//! Parsing produces a closed [`FilterTerm`] union; compilation is
//! exhaustive over the variants and emits store predicates that all
//! conjoin. A recognized suffix with a malformed payload fails fast with
//! [`CoreError::UnknownFilterKey`].

use crate::error::{CoreError, CoreResult};
use registra_store::{Key, Predicate, RangeOp};
use serde_json::{Map, Value};

/// The filter wire shape: a flat field-keyed object.
pub type Filter = Map<String, Value>;

/// A parsed filter term.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterTerm {
    /// Explicit key list (`ids`).
    Ids(Vec<Key>),
    /// Free-text tokens (`q`), all of which must match.
    FreeText(Vec<String>),
    /// Plain equality.
    Equals {
        /// Field name.
        field: String,
        /// Value to match.
        value: Value,
    },
    /// Range bound (`_lt`/`_lte`/`_gt`/`_gte`).
    Range {
        /// Field name.
        field: String,
        /// Comparison operator.
        op: RangeOp,
        /// The bound.
        value: Value,
    },
    /// Set membership (`_in`).
    SetIn {
        /// Field name.
        field: String,
        /// Non-null candidate values.
        values: Vec<Value>,
        /// Whether the list contained a literal null.
        or_null: bool,
    },
    /// Set exclusion (`_not_in`).
    SetNotIn {
        /// Field name.
        field: String,
        /// Non-null excluded values.
        values: Vec<Value>,
        /// Whether the list contained a literal null.
        or_null: bool,
    },
    /// Presence check (`_defined`).
    Defined {
        /// Field name.
        field: String,
        /// `true`: not null; `false`: is null.
        defined: bool,
    },
}

/// Recognized operator suffixes, longest first so `_not_in` wins over `_in`.
const SUFFIXES: &[(&str, Suffix)] = &[
    ("_defined", Suffix::Defined),
    ("_not_in", Suffix::NotIn),
    ("_lte", Suffix::Range(RangeOp::Lte)),
    ("_gte", Suffix::Range(RangeOp::Gte)),
    ("_in", Suffix::In),
    ("_lt", Suffix::Range(RangeOp::Lt)),
    ("_gt", Suffix::Range(RangeOp::Gt)),
];

#[derive(Debug, Clone, Copy)]
enum Suffix {
    Range(RangeOp),
    In,
    NotIn,
    Defined,
}

/// Normalizes a free-text query into lower-cased whitespace tokens.
pub fn tokenize(q: &str) -> Vec<String> {
    q.trim()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn split_list(key: &str, value: &Value) -> CoreResult<(Vec<Value>, bool)> {
    let Value::Array(items) = value else {
        return Err(CoreError::unknown_filter_key(key));
    };
    let mut values = Vec::with_capacity(items.len());
    let mut saw_null = false;
    for item in items {
        if item.is_null() {
            saw_null = true;
        } else {
            values.push(item.clone());
        }
    }
    Ok((values, saw_null))
}

/// Parses a filter object into terms.
///
/// Keys whose trailing segment is not a recognized suffix are plain
/// equality fields; field names may legitimately contain underscores.
pub fn parse(filter: &Filter) -> CoreResult<Vec<FilterTerm>> {
    let mut terms = Vec::new();
    for (key, value) in filter {
        if key == "ids" {
            let Value::Array(items) = value else {
                return Err(CoreError::unknown_filter_key(key));
            };
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                let id = Key::from_value(item)
                    .ok_or_else(|| CoreError::unknown_filter_key(key))?;
                ids.push(id);
            }
            terms.push(FilterTerm::Ids(ids));
            continue;
        }
        if key == "q" {
            let Value::String(text) = value else {
                return Err(CoreError::unknown_filter_key(key));
            };
            let tokens = tokenize(text);
            if !tokens.is_empty() {
                terms.push(FilterTerm::FreeText(tokens));
            }
            continue;
        }

        let suffix = SUFFIXES
            .iter()
            .find_map(|(tail, suffix)| key.strip_suffix(tail).map(|field| (field, *suffix)));
        match suffix {
            Some((field, _)) if field.is_empty() => {
                return Err(CoreError::unknown_filter_key(key));
            }
            Some((field, Suffix::Range(op))) => {
                // A null or absent bound is dropped, not an error.
                if !value.is_null() {
                    terms.push(FilterTerm::Range {
                        field: field.to_string(),
                        op,
                        value: value.clone(),
                    });
                }
            }
            Some((field, Suffix::In)) => {
                let (values, or_null) = split_list(key, value)?;
                // Empty after stripping null: the key imposes no constraint.
                if !values.is_empty() {
                    terms.push(FilterTerm::SetIn {
                        field: field.to_string(),
                        values,
                        or_null,
                    });
                }
            }
            Some((field, Suffix::NotIn)) => {
                let (values, or_null) = split_list(key, value)?;
                if !values.is_empty() {
                    terms.push(FilterTerm::SetNotIn {
                        field: field.to_string(),
                        values,
                        or_null,
                    });
                }
            }
            Some((field, Suffix::Defined)) => {
                let Value::Bool(defined) = value else {
                    return Err(CoreError::unknown_filter_key(key));
                };
                terms.push(FilterTerm::Defined {
                    field: field.to_string(),
                    defined: *defined,
                });
            }
            None => terms.push(FilterTerm::Equals {
                field: key.clone(),
                value: value.clone(),
            }),
        }
    }
    Ok(terms)
}

/// Compiles parsed terms into store predicates, all conjoined.
pub fn compile(terms: Vec<FilterTerm>, id_field: &str, search_field: &str) -> Vec<Predicate> {
    let mut predicates = Vec::new();
    for term in terms {
        match term {
            FilterTerm::Ids(ids) => predicates.push(Predicate::InSet {
                field: id_field.to_string(),
                values: ids.iter().map(Key::to_value).collect(),
                or_null: false,
            }),
            FilterTerm::FreeText(tokens) => {
                for token in tokens {
                    predicates.push(Predicate::Contains {
                        field: search_field.to_string(),
                        token,
                    });
                }
            }
            FilterTerm::Equals { field, value } => {
                predicates.push(Predicate::Equals { field, value });
            }
            FilterTerm::Range { field, op, value } => {
                predicates.push(Predicate::Range { field, op, value });
            }
            FilterTerm::SetIn {
                field,
                values,
                or_null,
            } => predicates.push(Predicate::InSet {
                field,
                values,
                or_null,
            }),
            FilterTerm::SetNotIn {
                field,
                values,
                or_null,
            } => predicates.push(Predicate::NotInSet {
                field,
                values,
                or_null,
            }),
            FilterTerm::Defined { field, defined } => predicates.push(if defined {
                Predicate::NotNull { field }
            } else {
                Predicate::IsNull { field }
            }),
        }
    }
    predicates
}

/// Parses and compiles a filter in one step.
pub fn compile_filter(
    filter: &Filter,
    id_field: &str,
    search_field: &str,
) -> CoreResult<Vec<Predicate>> {
    Ok(compile(parse(filter)?, id_field, search_field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(value: serde_json::Value) -> Filter {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn plain_keys_are_equality() {
        let terms = parse(&filter(json!({"status": "open", "unit_price": 5}))).unwrap();
        assert_eq!(terms.len(), 2);
        assert!(terms.contains(&FilterTerm::Equals {
            field: "unit_price".into(),
            value: json!(5)
        }));
    }

    #[test]
    fn q_tokenizes_conjunctively() {
        let predicates =
            compile_filter(&filter(json!({"q": "  Blue   WIDGET "})), "id", "search").unwrap();
        assert_eq!(
            predicates,
            vec![
                Predicate::Contains {
                    field: "search".into(),
                    token: "blue".into()
                },
                Predicate::Contains {
                    field: "search".into(),
                    token: "widget".into()
                },
            ]
        );
    }

    #[test]
    fn empty_q_imposes_nothing() {
        let terms = parse(&filter(json!({"q": "   "}))).unwrap();
        assert!(terms.is_empty());
    }

    #[test]
    fn range_suffixes() {
        let predicates = compile_filter(
            &filter(json!({"quantity_gte": 10, "quantity_lte": 100})),
            "id",
            "search",
        )
        .unwrap();
        assert_eq!(predicates.len(), 2);
        assert!(predicates.contains(&Predicate::Range {
            field: "quantity".into(),
            op: RangeOp::Gte,
            value: json!(10)
        }));
    }

    #[test]
    fn null_bound_is_dropped() {
        let terms = parse(&filter(json!({"quantity_lte": null}))).unwrap();
        assert!(terms.is_empty());
    }

    #[test]
    fn in_with_null_rewrites_to_or_null() {
        let terms = parse(&filter(json!({"status_in": ["open", null, "held"]}))).unwrap();
        assert_eq!(
            terms,
            vec![FilterTerm::SetIn {
                field: "status".into(),
                values: vec![json!("open"), json!("held")],
                or_null: true
            }]
        );
    }

    #[test]
    fn not_in_with_null_rewrites_to_or_null() {
        let terms = parse(&filter(json!({"status_not_in": ["closed", null]}))).unwrap();
        assert_eq!(
            terms,
            vec![FilterTerm::SetNotIn {
                field: "status".into(),
                values: vec![json!("closed")],
                or_null: true
            }]
        );
    }

    #[test]
    fn empty_list_after_null_strip_is_ignored() {
        assert!(parse(&filter(json!({"status_in": []}))).unwrap().is_empty());
        assert!(parse(&filter(json!({"status_in": [null]}))).unwrap().is_empty());
        assert!(parse(&filter(json!({"status_not_in": [null]}))).unwrap().is_empty());
    }

    #[test]
    fn defined_maps_to_null_checks() {
        let predicates = compile_filter(
            &filter(json!({"approved_defined": true, "voided_defined": false})),
            "id",
            "search",
        )
        .unwrap();
        assert!(predicates.contains(&Predicate::NotNull {
            field: "approved".into()
        }));
        assert!(predicates.contains(&Predicate::IsNull {
            field: "voided".into()
        }));
    }

    #[test]
    fn malformed_suffix_payload_fails_fast() {
        for bad in [
            json!({"status_in": "open"}),
            json!({"status_not_in": 3}),
            json!({"approved_defined": "yes"}),
            json!({"q": 1}),
            json!({"ids": "1"}),
            json!({"_in": [1]}),
        ] {
            let err = parse(&filter(bad)).unwrap_err();
            assert!(matches!(err, CoreError::UnknownFilterKey { .. }));
        }
    }

    #[test]
    fn ids_compile_to_key_membership() {
        let predicates =
            compile_filter(&filter(json!({"ids": [1, "a7"]})), "id", "search").unwrap();
        assert_eq!(
            predicates,
            vec![Predicate::InSet {
                field: "id".into(),
                values: vec![json!(1), json!("a7")],
                or_null: false
            }]
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Tokens come out lower-cased and never contain whitespace.
            #[test]
            fn tokens_are_normalized(q in "[A-Za-z0-9 \t]{0,64}") {
                for token in tokenize(&q) {
                    prop_assert!(!token.is_empty());
                    prop_assert!(!token.chars().any(char::is_whitespace));
                    prop_assert_eq!(token.to_lowercase(), token);
                }
            }
        }
    }
}
