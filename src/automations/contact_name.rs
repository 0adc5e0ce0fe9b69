use async_trait::async_trait;

use super::{is_reentrant, Automation, AutomationError, Trigger};
use crate::api::BoardApi;
use crate::config::ContactNameConfig;
use crate::model::event::NAME_COLUMN;
use crate::model::item::Item;
use crate::model::value::{ColumnKind, FieldValue};
use crate::sync::derive::first_name;
use crate::sync::extract::extract;
use crate::sync::{Plan, Target};

pub struct ContactName {
    config: ContactNameConfig,
}

impl ContactName {
    pub fn new(config: ContactNameConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Automation for ContactName {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn board_id(&self) -> u64 {
        self.config.board_id
    }

    fn trigger_columns(&self) -> Vec<String> {
        let mut columns = vec![NAME_COLUMN.to_string()];
        columns.extend(self.config.email_source_column.clone());
        columns
    }

    async fn plan(
        &self,
        item: &Item,
        _trigger: &Trigger,
        _api: &dyn BoardApi,
    ) -> Result<Plan, AutomationError> {
        let cfg = &self.config;
        let mut targets = Vec::new();

        let first = first_name(&item.name);
        if !first.is_empty() {
            targets.push(Target::new(
                &cfg.first_name_column,
                ColumnKind::Text,
                FieldValue::Text(first.clone()),
            ));
        }

        if let (Some(source), Some(target)) = (&cfg.email_source_column, &cfg.email_target_column) {
            let email = extract(&item.column_values, source, ColumnKind::Email);
            if !email.is_empty() {
                targets.push(Target::new(target, ColumnKind::Email, email));
            }
        }

        let marker = match (&cfg.marker_column, targets.first()) {
            (Some(column), Some(primary)) => Some(Target::new(
                column,
                ColumnKind::Text,
                FieldValue::Text(primary.value.canonical()),
            )),
            _ => None,
        };

        Ok(Plan {
            reentrant: is_reentrant(&targets, &self.trigger_columns()),
            targets,
            marker,
        })
    }
}
