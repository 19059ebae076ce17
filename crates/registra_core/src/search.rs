//! Derived search column maintenance.
//!
//! Entities configured `with_search` carry a denormalized `search` field:
//! the lower-cased, space-joined concatenation of the configured source
//! fields, recomputed on every write. Free-text (`q`) filtering runs
//! against this column.

use crate::config::SearchConfig;
use registra_store::Record;
use serde_json::Value;

/// Name of the derived search field on stored records.
pub const SEARCH_FIELD: &str = "search";

/// Computes the search value for a record under the given configuration.
///
/// Field values are rendered case-insensitively: strings lower-cased,
/// numbers and booleans via their canonical display form, date fields
/// truncated to the calendar date. Null and non-scalar fields contribute
/// nothing. The result is deterministic in the record's current fields.
pub fn derive_search(config: &SearchConfig, record: &Record) -> String {
    let mut parts = Vec::with_capacity(config.fields.len());
    for field in &config.fields {
        let rendered = match record.get(field) {
            Some(Value::String(s)) => {
                if config.date_fields.iter().any(|f| f == field) {
                    date_prefix(s).to_lowercase()
                } else {
                    s.to_lowercase()
                }
            }
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => continue,
        };
        if !rendered.is_empty() {
            parts.push(rendered);
        }
    }
    parts.join(" ")
}

/// Truncates an ISO-8601 timestamp to its `YYYY-MM-DD` prefix.
fn date_prefix(value: &str) -> String {
    value.chars().take(10).collect()
}
