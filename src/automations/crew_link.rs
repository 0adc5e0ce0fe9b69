use async_trait::async_trait;
use tracing::{debug, warn};

use super::{is_reentrant, Automation, AutomationError, Trigger};
use crate::api::BoardApi;
use crate::config::CrewLinkConfig;
use crate::model::item::Item;
use crate::model::value::{ColumnKind, FieldValue};
use crate::sync::derive::extract_job_id;
use crate::sync::extract::extract;
use crate::sync::{Plan, Target};

/// Copies the job id of the linked job item onto a crew/transport item.
pub struct CrewLink {
    config: CrewLinkConfig,
}

impl CrewLink {
    pub fn new(config: CrewLinkConfig) -> Self {
        Self { config }
    }

    /// Linked ids from the event when it carries them, else from the item.
    fn linked_ids(&self, item: &Item, trigger: &Trigger) -> Vec<u64> {
        let from_event = trigger.column_id.as_deref() == Some(self.config.relation_column.as_str());
        match (&trigger.linked_ids, from_event) {
            (Some(ids), true) => ids.clone(),
            _ => match extract(&item.column_values, &self.config.relation_column, ColumnKind::Relation) {
                FieldValue::Relation(ids) => ids,
                _ => Vec::new(),
            },
        }
    }
}

#[async_trait]
impl Automation for CrewLink {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn board_id(&self) -> u64 {
        self.config.board_id
    }

    fn trigger_columns(&self) -> Vec<String> {
        vec![self.config.relation_column.clone()]
    }

    async fn plan(
        &self,
        item: &Item,
        trigger: &Trigger,
        api: &dyn BoardApi,
    ) -> Result<Plan, AutomationError> {
        let cfg = &self.config;
        let Some(job_item_id) = self.linked_ids(item, trigger).first().copied() else {
            debug!(item_id = item.id, "no linked job");
            return Ok(Plan::default());
        };

        let Some(job) = api.fetch_item(job_item_id).await? else {
            warn!(item_id = item.id, job_item_id, "linked job item not found");
            return Ok(Plan::default());
        };

        let url = match extract(&job.column_values, &cfg.job_url_column, ColumnKind::Link) {
            FieldValue::Link { url, .. } => url,
            _ => return Ok(Plan::default()),
        };
        let Some(job_id) = extract_job_id(&url) else {
            debug!(item_id = item.id, job_item_id, url = %url, "job URL has no id");
            return Ok(Plan::default());
        };

        let mut targets = vec![Target::new(
            &cfg.target_column,
            ColumnKind::Text,
            FieldValue::Text(job_id.clone()),
        )];
        if let Some(link_column) = &cfg.link_column {
            targets.push(Target::new(
                link_column,
                ColumnKind::Link,
                FieldValue::Link {
                    url,
                    text: job_id.clone(),
                },
            ));
        }
        let marker = cfg
            .marker_column
            .as_deref()
            .map(|m| Target::new(m, ColumnKind::Text, FieldValue::Text(job_id)));

        Ok(Plan {
            reentrant: is_reentrant(&targets, &self.trigger_columns()),
            targets,
            marker,
        })
    }
}
