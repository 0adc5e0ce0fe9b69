use async_trait::async_trait;
use tracing::debug;

use super::{is_reentrant, Automation, AutomationError, Trigger};
use crate::api::BoardApi;
use crate::config::DateCopyConfig;
use crate::model::item::Item;
use crate::model::value::{ColumnKind, FieldValue};
use crate::sync::derive::shift_date;
use crate::sync::extract::extract;
use crate::sync::{Plan, Target};

pub struct DateCopy {
    config: DateCopyConfig,
}

impl DateCopy {
    pub fn new(config: DateCopyConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Automation for DateCopy {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn board_id(&self) -> u64 {
        self.config.board_id
    }

    fn trigger_columns(&self) -> Vec<String> {
        self.config.triggers()
    }

    async fn plan(
        &self,
        item: &Item,
        _trigger: &Trigger,
        _api: &dyn BoardApi,
    ) -> Result<Plan, AutomationError> {
        let cfg = &self.config;
        let source = match extract(&item.column_values, &cfg.source_column, ColumnKind::Date) {
            FieldValue::Date(d) => d,
            FieldValue::Malformed(raw) => {
                return Err(AutomationError::UnparseableSource {
                    column: cfg.source_column.clone(),
                    raw,
                })
            }
            _ => {
                debug!(item_id = item.id, column = %cfg.source_column, "no source date");
                return Ok(Plan::default());
            }
        };
        let status = extract(&item.column_values, &cfg.status_column, ColumnKind::Status);
        let derived = shift_date(source, status.as_text(), &cfg.exempt_label, cfg.direction);

        let value = FieldValue::Date(derived);
        let targets = vec![Target::new(&cfg.target_column, ColumnKind::Date, value.clone())];
        let marker = cfg
            .marker_column
            .as_deref()
            .map(|m| Target::new(m, ColumnKind::Text, FieldValue::Text(value.canonical())));

        Ok(Plan {
            reentrant: is_reentrant(&targets, &self.trigger_columns()),
            targets,
            marker,
        })
    }
}
