//! Typed reads of raw column records.
//!
//! Every column carries a JSON payload (authoritative) and a rendered text
//! (fallback). Reads never fail: a column that can't be found or read yields
//! `FieldValue::Empty`, or an empty relation for relation columns.

use chrono::NaiveDate;
use serde_json::Value;

use crate::model::event::as_id;
use crate::model::item::RawColumnValue;
use crate::model::value::{ColumnKind, FieldValue};

pub fn extract(columns: &[RawColumnValue], column_id: &str, kind: ColumnKind) -> FieldValue {
    match columns.iter().find(|c| c.id == column_id) {
        Some(column) => extract_column(column, kind),
        None => empty_for(kind),
    }
}

pub fn extract_column(column: &RawColumnValue, kind: ColumnKind) -> FieldValue {
    let payload = column
        .value
        .as_deref()
        .and_then(|v| serde_json::from_str::<Value>(v).ok())
        .filter(|v| !v.is_null());
    let text = column
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if kind == ColumnKind::Relation {
        return FieldValue::Relation(payload.as_ref().map(linked_ids).unwrap_or_default());
    }

    if let Some(value) = payload.as_ref().and_then(|p| from_payload(p, kind)) {
        return value;
    }

    match text {
        Some(text) => from_text(text, kind),
        None => FieldValue::Empty,
    }
}

fn empty_for(kind: ColumnKind) -> FieldValue {
    match kind {
        ColumnKind::Relation => FieldValue::Relation(Vec::new()),
        _ => FieldValue::Empty,
    }
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn from_payload(payload: &Value, kind: ColumnKind) -> Option<FieldValue> {
    match kind {
        ColumnKind::Date => {
            let raw = str_field(payload, "date")?;
            Some(parse_date(raw).map_or_else(|| FieldValue::Malformed(raw.to_string()), FieldValue::Date))
        }
        // Only a string label counts; an `index` alone defers to the text.
        ColumnKind::Status => str_field(payload, "label").map(|l| FieldValue::Status(l.to_string())),
        ColumnKind::Text => payload
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| FieldValue::Text(s.to_string())),
        ColumnKind::Email => {
            let email = str_field(payload, "email")?;
            Some(FieldValue::Email {
                email: email.to_string(),
                text: str_field(payload, "text").unwrap_or(email).to_string(),
            })
        }
        ColumnKind::Link => {
            let url = str_field(payload, "url")?;
            Some(FieldValue::Link {
                url: url.to_string(),
                text: str_field(payload, "text").unwrap_or(url).to_string(),
            })
        }
        ColumnKind::Relation => Some(FieldValue::Relation(linked_ids(payload))),
    }
}

fn from_text(text: &str, kind: ColumnKind) -> FieldValue {
    match kind {
        ColumnKind::Date => {
            parse_date(text).map_or_else(|| FieldValue::Malformed(text.to_string()), FieldValue::Date)
        }
        ColumnKind::Status => FieldValue::Status(text.to_string()),
        ColumnKind::Text => FieldValue::Text(text.to_string()),
        ColumnKind::Email => FieldValue::Email {
            email: text.to_string(),
            text: text.to_string(),
        },
        // Rendered links look like "label - https://..."
        ColumnKind::Link => {
            let url = text.rsplit(" - ").next().unwrap_or(text).trim();
            let label = text
                .rsplit_once(" - ")
                .map_or(url, |(label, _)| label.trim());
            FieldValue::Link {
                url: url.to_string(),
                text: label.to_string(),
            }
        }
        ColumnKind::Relation => FieldValue::Relation(Vec::new()),
    }
}

/// `YYYY-MM-DD`, optionally followed by a time component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn linked_ids(payload: &Value) -> Vec<u64> {
    if let Some(linked) = payload.get("linkedPulseIds").and_then(Value::as_array) {
        return linked
            .iter()
            .filter_map(|e| e.get("linkedPulseId").and_then(as_id))
            .collect();
    }
    payload
        .get("linkedItemIds")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(as_id).collect())
        .unwrap_or_default()
}
