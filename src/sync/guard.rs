//! Decides whether an automation needs to write, and stops self-triggering
//! writes from looping.
//!
//! Every invocation re-derives and re-compares against the item's persisted
//! state. Nothing is remembered between invocations.
//!
//! When a target column is also one of the automation's trigger columns, each
//! write re-delivers the same webhook. Those automations carry a marker column
//! that only they ever write. A write is skipped as `LoopRisk` only when the
//! targets and the marker all already hold the derived values; if either one
//! disagrees (an earlier partial failure, a manual edit) the write goes ahead
//! and the next delivery converges.

use serde::Serialize;
use serde_json::{Map, Value};

use super::extract::extract;
use super::writer::serialize;
use crate::model::item::RawColumnValue;
use crate::model::value::{ColumnKind, FieldValue};

/// One column an automation wants to hold a given value.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub column: String,
    pub kind: ColumnKind,
    pub value: FieldValue,
}

impl Target {
    pub fn new(column: &str, kind: ColumnKind, value: FieldValue) -> Self {
        Self {
            column: column.to_string(),
            kind,
            value,
        }
    }
}

/// Everything the guard needs to decide for one item.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Derived values. Empty means the source couldn't be determined.
    pub targets: Vec<Target>,
    /// Text column written alongside the targets with the derived value's
    /// canonical form.
    pub marker: Option<Target>,
    /// Whether a target column is also one this automation is triggered by.
    pub reentrant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Source value missing; nothing was derived.
    NothingToDo,
    /// Every target already holds its derived value.
    AlreadyConverged,
    /// Source value present but unreadable.
    UnparseableSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NotNeeded(SkipReason),
    /// Only the columns that differ, in target order, marker last.
    NeedsWrite(Vec<Target>),
    LoopRisk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    NotNeeded,
    LoopRisk,
    WritePerformed,
    /// Dry run: a write was needed but not sent.
    WouldWrite,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::NotNeeded => "not_needed",
            Outcome::LoopRisk => "loop_risk",
            Outcome::WritePerformed => "write_performed",
            Outcome::WouldWrite => "would_write",
        }
    }
}

fn differs(target: &Target, current: &[RawColumnValue]) -> bool {
    !target
        .value
        .converges_with(&extract(current, &target.column, target.kind))
}

pub fn evaluate(plan: &Plan, current: &[RawColumnValue]) -> Decision {
    if plan.targets.is_empty() || plan.targets.iter().all(|t| t.value.is_empty()) {
        return Decision::NotNeeded(SkipReason::NothingToDo);
    }

    let mut changes: Vec<Target> = plan
        .targets
        .iter()
        .filter(|t| differs(t, current))
        .cloned()
        .collect();
    let marker_change = plan.marker.as_ref().filter(|m| differs(m, current));

    if changes.is_empty() && marker_change.is_none() {
        return if plan.reentrant && plan.marker.is_some() {
            Decision::LoopRisk
        } else {
            Decision::NotNeeded(SkipReason::AlreadyConverged)
        };
    }

    changes.extend(marker_change.cloned());
    Decision::NeedsWrite(changes)
}

/// The mutation payload for a set of changes.
pub fn to_column_map(changes: &[Target]) -> Map<String, Value> {
    changes
        .iter()
        .map(|t| (t.column.clone(), serialize(&t.value)))
        .collect()
}
