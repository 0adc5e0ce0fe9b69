use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::ReportClient;
use crate::config::RuntimePin;
use crate::sync::extract::parse_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Supported,
    ApproachingEol,
    Eol,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeReport {
    pub product: String,
    pub cycle: String,
    pub status: RuntimeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuntimeReport {
    /// `eol` is either a date string or a boolean on endoflife.date.
    pub fn classify(product: &str, cycle: &str, eol: &Value, today: NaiveDate, warn_days: i64) -> Self {
        let mut report = Self {
            product: product.to_string(),
            cycle: cycle.to_string(),
            status: RuntimeStatus::Unknown,
            eol: None,
            days_remaining: None,
            error: None,
        };
        match eol {
            Value::Bool(true) => report.status = RuntimeStatus::Eol,
            Value::Bool(false) => report.status = RuntimeStatus::Supported,
            Value::String(s) => {
                if let Some(date) = parse_date(s) {
                    let days = (date - today).num_days();
                    report.eol = Some(date.format("%Y-%m-%d").to_string());
                    report.days_remaining = Some(days);
                    report.status = if days <= 0 {
                        RuntimeStatus::Eol
                    } else if days <= warn_days {
                        RuntimeStatus::ApproachingEol
                    } else {
                        RuntimeStatus::Supported
                    };
                }
            }
            _ => {}
        }
        report
    }

    fn failed(pin: &RuntimePin, error: String) -> Self {
        Self {
            product: pin.product.clone(),
            cycle: pin.cycle.clone(),
            status: RuntimeStatus::Unknown,
            eol: None,
            days_remaining: None,
            error: Some(error),
        }
    }
}

pub async fn check(client: &ReportClient, pin: &RuntimePin, today: NaiveDate, warn_days: i64) -> RuntimeReport {
    let url = format!(
        "{}/{}/{}.json",
        client.eol_url,
        urlencoding::encode(&pin.product),
        urlencoding::encode(&pin.cycle)
    );
    match client.get_json("eol_cycle", &url).await {
        Ok(body) => RuntimeReport::classify(
            &pin.product,
            &pin.cycle,
            body.get("eol").unwrap_or(&Value::Null),
            today,
            warn_days,
        ),
        Err(e) => {
            warn!(product = %pin.product, cycle = %pin.cycle, error = %e, "end-of-life lookup failed");
            RuntimeReport::failed(pin, e.to_string())
        }
    }
}
