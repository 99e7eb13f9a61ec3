//! `key=value` argument parsing and client-side record filtering.

use std::collections::BTreeMap;

use serde_json::Value;

/// Field name → expected value.
pub type Filters = BTreeMap<String, String>;

/// Parse repeated `key=value` arguments.
///
/// Entries without `=` (or with an empty key) are dropped. Only the first `=`
/// splits, so `FOO=BAR=BAZ` maps `FOO` to `BAR=BAZ`. Later duplicates win.
pub fn build_filters<I, S>(entries: I) -> Filters
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut filters = Filters::new();
    for entry in entries {
        let Some((key, value)) = entry.as_ref().split_once('=') else {
            tracing::debug!(entry = entry.as_ref(), "Dropping argument without '='");
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        filters.insert(key.to_string(), value.to_string());
    }
    filters
}

/// True when every filter matches the corresponding field of `record`.
///
/// Keys may use dots to reach nested objects (`vcs.branch`).
pub fn matches(record: &Value, filters: &Filters) -> bool {
    filters.iter().all(|(key, expected)| {
        lookup(record, key)
            .map(|value| field_text(value) == *expected)
            .unwrap_or(false)
    })
}

/// Keep the records that match every filter.
pub fn apply(records: Vec<Value>, filters: &Filters) -> Vec<Value> {
    if filters.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| matches(record, filters))
        .collect()
}

fn lookup<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(key) {
        return Some(value);
    }
    key.split('.')
        .try_fold(record, |current, segment| current.get(segment))
}

/// String rendering of a JSON field used for equality checks and display.
pub fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
