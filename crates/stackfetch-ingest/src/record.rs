//! Dataset rows and the field policies applied to them
//!
//! A [`Record`] is an ordered map of column name to [`FieldValue`]. Row
//! sources decode timestamp columns into native date-times; everything else is
//! carried as plain JSON. Before a record is written its well-known timestamp
//! columns are normalized to ISO-8601 strings.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Columns that may hold a native date-time.
pub const TIMESTAMP_FIELDS: [&str; 5] = [
    "visit_date",
    "revision_date",
    "committer_date",
    "gha_event_created_at",
    "gha_created_at",
];

/// Content columns, highest priority first.
pub const CONTENT_KEYS: [&str; 5] = ["content", "text", "code", "source", "document"];

/// Identifier columns, highest priority first.
pub const IDENTIFIER_KEYS: [&str; 5] = ["blob_id", "sha", "hash", "path", "id"];

/// Object column searched with [`CONTENT_KEYS`] when no top-level key matches.
pub const NESTED_CONTENT_KEY: &str = "data";

/// Column declaring the blob's source encoding.
pub const ENCODING_KEY: &str = "src_encoding";

/// Column the resolved payload is attached under.
pub const CONTENT_FIELD: &str = "content";

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    DateTime(DateTime<FixedOffset>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self, FieldValue::DateTime(_))
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Json(Value::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Json(Value::String(value))
    }
}

impl<Tz: chrono::TimeZone> From<DateTime<Tz>> for FieldValue {
    fn from(value: DateTime<Tz>) -> Self {
        FieldValue::DateTime(value.fixed_offset())
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Json(v) => v.serialize(serializer),
            FieldValue::DateTime(dt) => serializer.serialize_str(&iso8601(dt)),
        }
    }
}

/// Extended ISO-8601 rendering: fractional seconds only when present, `Z` for UTC
pub fn iso8601(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Turn an identifier into a file stem that stays inside the output directory
pub fn file_stem(identifier: &str) -> String {
    identifier.replace(['/', ' '], "_")
}

/// One dataset row
///
/// Columns the row source delivered cut short are remembered so their values
/// are never taken as a complete payload. The marker is not serialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, FieldValue>,
    truncated: BTreeSet<String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object, keeping column order
    pub fn from_json_object(object: Map<String, Value>) -> Self {
        Self {
            fields: object
                .into_iter()
                .map(|(k, v)| (k, FieldValue::Json(v)))
                .collect(),
            truncated: BTreeSet::new(),
        }
    }

    /// Parse one JSON-lines entry. Anything but an object is rejected.
    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        let object: Map<String, Value> = serde_json::from_str(line)?;
        Ok(Self::from_json_object(object))
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Flag `column` as cut short by the row source
    pub fn mark_truncated(&mut self, column: impl Into<String>) {
        self.truncated.insert(column.into());
    }

    pub fn is_truncated(&self, column: &str) -> bool {
        self.truncated.contains(column)
    }

    /// Whether a column that could hold content was cut short
    pub fn has_truncated_content(&self) -> bool {
        CONTENT_KEYS
            .iter()
            .chain(std::iter::once(&NESTED_CONTENT_KEY))
            .any(|key| self.is_truncated(key))
    }

    /// Inline content, if the row carries any
    ///
    /// Tries [`CONTENT_KEYS`] in order, then the same keys inside a nested
    /// `data` object. Empty strings, non-string values and truncated columns
    /// never match.
    pub fn content(&self) -> Option<&str> {
        CONTENT_KEYS
            .iter()
            .filter(|key| !self.is_truncated(key))
            .find_map(|key| self.get(key).and_then(FieldValue::as_str).filter(|s| !s.is_empty()))
            .or_else(|| match self.get(NESTED_CONTENT_KEY) {
                Some(FieldValue::Json(Value::Object(nested)))
                    if !self.is_truncated(NESTED_CONTENT_KEY) =>
                {
                    first_string(nested, &CONTENT_KEYS)
                },
                _ => None,
            })
    }

    /// Stable identifier: first non-empty of [`IDENTIFIER_KEYS`]
    pub fn identifier(&self) -> Option<String> {
        IDENTIFIER_KEYS.iter().find_map(|key| match self.get(key)? {
            FieldValue::Json(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            FieldValue::Json(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Declared source encoding of the blob
    pub fn encoding(&self) -> Option<&str> {
        self.get(ENCODING_KEY)
            .and_then(FieldValue::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Attach a complete payload, clearing any truncation on that column
    pub fn set_content(&mut self, content: String) {
        self.truncated.remove(CONTENT_FIELD);
        self.insert(CONTENT_FIELD, content);
    }

    /// Coerce every native date-time in [`TIMESTAMP_FIELDS`] to its ISO string
    ///
    /// Absent and already-string fields are left alone, so the operation is
    /// idempotent. Returns how many fields were rewritten.
    pub fn normalize_timestamps(&mut self) -> usize {
        let mut rewritten = 0;
        for key in TIMESTAMP_FIELDS {
            if let Some(value) = self.fields.get_mut(key) {
                if let FieldValue::DateTime(dt) = value {
                    let rendered = iso8601(dt);
                    *value = FieldValue::Json(Value::String(rendered));
                    rewritten += 1;
                }
            }
        }
        rewritten
    }

    /// Serialize fully in memory as one log line, trailing newline included
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
            truncated: BTreeSet::new(),
        }
    }
}

fn first_string<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        object
            .get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    })
}
