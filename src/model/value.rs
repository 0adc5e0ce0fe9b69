use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The type a caller expects a column to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Status,
    Date,
    Text,
    Email,
    Link,
    Relation,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Status => "status",
            ColumnKind::Date => "date",
            ColumnKind::Text => "text",
            ColumnKind::Email => "email",
            ColumnKind::Link => "link",
            ColumnKind::Relation => "relation",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column value decoded once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Empty,
    Status(String),
    Date(NaiveDate),
    Text(String),
    Email { email: String, text: String },
    Link { url: String, text: String },
    Relation(Vec<u64>),
    /// Present on the wire but unreadable as the expected kind.
    Malformed(String),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Status(s) | FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Email { email, .. } => email.trim().is_empty(),
            FieldValue::Link { url, .. } => url.trim().is_empty(),
            FieldValue::Relation(ids) => ids.is_empty(),
            FieldValue::Date(_) | FieldValue::Malformed(_) => false,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Label, text, address or URL as a plain string; empty for everything else.
    pub fn as_text(&self) -> &str {
        match self {
            FieldValue::Status(s) | FieldValue::Text(s) => s.as_str(),
            FieldValue::Email { email, .. } => email.as_str(),
            FieldValue::Link { url, .. } => url.as_str(),
            _ => "",
        }
    }

    /// First linked item in API order.
    pub fn first_linked(&self) -> Option<u64> {
        match self {
            FieldValue::Relation(ids) => ids.first().copied(),
            _ => None,
        }
    }

    /// Canonical text form, as stored in a marker column.
    pub fn canonical(&self) -> String {
        match self {
            FieldValue::Empty => String::new(),
            FieldValue::Status(s) | FieldValue::Text(s) | FieldValue::Malformed(s) => {
                s.trim().to_string()
            }
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Email { email, .. } => email.trim().to_string(),
            FieldValue::Link { url, .. } => url.trim().to_string(),
            FieldValue::Relation(ids) => ids
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Whether writing `self` over `current` would change anything.
    ///
    /// Status and text compare trimmed, emails by address, relations as sets.
    /// Blank strings are the same as `Empty`. A status label and a text value
    /// with the same content are equal since text columns can hold labels.
    pub fn converges_with(&self, current: &FieldValue) -> bool {
        if self.is_empty() && current.is_empty() {
            return true;
        }
        match (self, current) {
            (FieldValue::Date(a), FieldValue::Date(b)) => a == b,
            (
                FieldValue::Status(a) | FieldValue::Text(a),
                FieldValue::Status(b) | FieldValue::Text(b),
            ) => a.trim() == b.trim(),
            (FieldValue::Email { email: a, .. }, FieldValue::Email { email: b, .. }) => {
                a.trim().eq_ignore_ascii_case(b.trim())
            }
            (
                FieldValue::Link { url: ua, text: ta },
                FieldValue::Link { url: ub, text: tb },
            ) => ua.trim() == ub.trim() && ta.trim() == tb.trim(),
            (FieldValue::Relation(a), FieldValue::Relation(b)) => {
                a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
            }
            _ => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}
