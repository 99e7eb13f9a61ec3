//! Output formatting for CLI commands.

use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::filters::field_text;

/// An ordered subset of one JSON object's fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Vec<(String, Value)>);

impl Record {
    /// Pick `fields` out of `value`, in the order given. Missing fields are skipped.
    ///
    /// Returns `None` when `value` is not an object.
    pub fn pick(value: &Value, fields: &[&str]) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self(
            fields
                .iter()
                .filter_map(|field| {
                    object
                        .get(*field)
                        .map(|value| (field.to_string(), value.clone()))
                })
                .collect(),
        ))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One line of the status page: `None` is the page-level status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentStatus {
    pub name: Option<String>,
    pub status: String,
}

/// Decoded API response, shaped for the action that requested it.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single object.
    Record(Record),
    /// A listing of objects.
    Records(Vec<Record>),
    /// A listing of names.
    Names(Vec<String>),
    /// Status page lines.
    Components(Vec<ComponentStatus>),
    /// The decoded response, untouched (verbose mode).
    Raw(Value),
}

/// Render a payload as the text printed on stdout.
pub fn render(payload: &Payload) -> String {
    match payload {
        Payload::Raw(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        Payload::Record(record) => record
            .fields()
            .map(|(key, value)| format!("{key}: {}", display_value(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        Payload::Records(records) => render_table(records),
        Payload::Names(names) => {
            if names.is_empty() {
                "No items found.".dimmed().to_string()
            } else {
                names.join("\n")
            }
        }
        Payload::Components(components) => render_components(components),
    }
}

/// Print a payload on stdout.
pub fn print_payload(payload: &Payload) {
    let text = render(payload);
    if !text.is_empty() {
        println!("{}", text);
    }
}

fn render_table(records: &[Record]) -> String {
    if records.is_empty() {
        return "No items found.".dimmed().to_string();
    }

    // Columns are the union of record keys in first-seen order.
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for (key, _) in record.fields() {
            if !columns.contains(&key) {
                columns.push(key);
            }
        }
    }

    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|c| c.to_uppercase()));
    for record in records {
        builder.push_record(
            columns
                .iter()
                .map(|column| record.get(column).map(display_value).unwrap_or_default()),
        );
    }

    let mut table = builder.build();
    table.with(Style::blank());
    table.to_string()
}

fn render_components(components: &[ComponentStatus]) -> String {
    let mut lines = Vec::new();
    let (page, rest): (Vec<_>, Vec<_>) = components.iter().partition(|c| c.name.is_none());

    for status in &page {
        lines.push(status.status.clone());
    }
    if !page.is_empty() && !rest.is_empty() {
        lines.push(String::new());
    }
    for component in rest {
        let name = component.name.as_deref().unwrap_or_default();
        lines.push(format!("{name}: {}", component.status));
    }
    lines.join("\n")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        other => field_text(other),
    }
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}
