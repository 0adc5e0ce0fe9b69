pub mod contact_name;
pub mod crew_link;
pub mod date_copy;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::activity::{new_event, ActivityLog};
use crate::api::{ApiError, BoardApi};
use crate::config::AppConfig;
use crate::model::event::WebhookEvent;
use crate::model::item::Item;
use crate::sync::guard::{evaluate, to_column_map};
use crate::sync::{writer, Decision, Outcome, Plan, SkipReason, Target};

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("column {column:?} holds an unreadable value {raw:?}")]
    UnparseableSource { column: String, raw: String },
}

/// What caused a run: a webhook, or a backfill visiting the item.
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    pub column_id: Option<String>,
    /// Relation ids delivered inline with the event.
    pub linked_ids: Option<Vec<u64>>,
}

impl Trigger {
    pub fn from_event(event: &WebhookEvent) -> Self {
        Self {
            column_id: event.column_id.clone(),
            linked_ids: event.inline_linked_ids(),
        }
    }

    pub fn backfill() -> Self {
        Self::default()
    }
}

/// One configured handler bound to a board.
#[async_trait]
pub trait Automation: Send + Sync {
    fn name(&self) -> &str;
    fn board_id(&self) -> u64;
    /// Columns whose change should run this automation.
    fn trigger_columns(&self) -> Vec<String>;

    /// Derive target values for an item. An empty plan means nothing to do.
    async fn plan(
        &self,
        item: &Item,
        trigger: &Trigger,
        api: &dyn BoardApi,
    ) -> Result<Plan, AutomationError>;

    /// Events without a column id (item creation) are always processed.
    fn watches(&self, column_id: Option<&str>) -> bool {
        match column_id {
            None => true,
            Some(column) => self.trigger_columns().iter().any(|c| c == column),
        }
    }
}

/// Whether any target is also a trigger, so writing it re-fires the webhook.
pub fn is_reentrant(targets: &[Target], triggers: &[String]) -> bool {
    targets
        .iter()
        .any(|t| triggers.iter().any(|c| *c == t.column))
}

pub fn build_automations(config: &AppConfig) -> Vec<Arc<dyn Automation>> {
    let mut automations: Vec<Arc<dyn Automation>> = Vec::new();
    for cfg in &config.date_copy {
        automations.push(Arc::new(date_copy::DateCopy::new(cfg.clone())));
    }
    for cfg in &config.crew_link {
        automations.push(Arc::new(crew_link::CrewLink::new(cfg.clone())));
    }
    for cfg in &config.contact_name {
        automations.push(Arc::new(contact_name::ContactName::new(cfg.clone())));
    }
    automations
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Execute,
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    /// Columns written (or that would be, on a dry run).
    pub changes: Map<String, Value>,
}

impl RunReport {
    fn skipped(outcome: Outcome, reason: Option<SkipReason>) -> Self {
        Self {
            outcome,
            reason,
            changes: Map::new(),
        }
    }
}

/// Runs automations against an API and records performed writes.
#[derive(Clone)]
pub struct Runner {
    api: Arc<dyn BoardApi>,
    activity: Option<ActivityLog>,
}

impl Runner {
    pub fn new(api: Arc<dyn BoardApi>, activity: Option<ActivityLog>) -> Self {
        Self { api, activity }
    }

    pub fn api(&self) -> &dyn BoardApi {
        self.api.as_ref()
    }

    pub async fn run(
        &self,
        automation: &dyn Automation,
        item: &Item,
        trigger: &Trigger,
        mode: RunMode,
    ) -> Result<RunReport, AutomationError> {
        let plan = automation.plan(item, trigger, self.api()).await?;
        let decision = evaluate(&plan, &item.column_values);

        let changes = match decision {
            Decision::NotNeeded(reason) => {
                return Ok(RunReport::skipped(Outcome::NotNeeded, Some(reason)))
            }
            Decision::LoopRisk => {
                info!(
                    automation = automation.name(),
                    item_id = item.id,
                    "targets and marker already converged, not re-triggering"
                );
                return Ok(RunReport::skipped(Outcome::LoopRisk, None));
            }
            Decision::NeedsWrite(changes) => changes,
        };

        if mode == RunMode::DryRun {
            return Ok(RunReport {
                outcome: Outcome::WouldWrite,
                reason: None,
                changes: to_column_map(&changes),
            });
        }

        let board_id = item.board_id.unwrap_or_else(|| automation.board_id());
        writer::write(self.api(), board_id, item.id, &changes).await?;
        let report = RunReport {
            outcome: Outcome::WritePerformed,
            reason: None,
            changes: to_column_map(&changes),
        };
        self.record(automation, board_id, item.id, &report).await;
        Ok(report)
    }

    async fn record(&self, automation: &dyn Automation, board_id: u64, item_id: u64, report: &RunReport) {
        let Some(log) = self.activity.clone() else {
            return;
        };
        let event = new_event(
            automation.name(),
            board_id,
            item_id,
            report.outcome.as_str(),
            report.changes.clone(),
            None,
        );
        match tokio::task::spawn_blocking(move || log.append(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to append activity event"),
            Err(e) => warn!(error = %e, "activity append task failed"),
        }
    }
}
