//! HTTP surface.
//!
//! # Endpoints
//!
//! - `POST /webhooks/{automation}` - board webhook deliveries (always 200 unless the
//!   item can't be fetched or written)
//! - `GET /backfill/{automation}?execute=true&cursor=...` - one budgeted backfill pass
//! - `GET /reports/dependencies` - npm and end-of-life report
//! - `GET /activity?limit=N&automation=...` - recent writes
//! - `GET /health` - liveness

pub mod backfill;
pub mod error;
pub mod health;
pub mod reports;
pub mod webhook;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue};
use axum::response::Response;

use crate::activity::ActivityLog;
use crate::api::monday::MondayClient;
use crate::automations::{build_automations, Automation, Runner};
use crate::config::{AppConfig, BackfillConfig, ReportsConfig};
use crate::reports::ReportClient;
pub use error::DispatchError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no API token is configured.
    runner: Option<Runner>,
    automations: Arc<Vec<Arc<dyn Automation>>>,
    backfill: BackfillConfig,
    reports: Arc<ReportsConfig>,
    report_client: Option<Arc<ReportClient>>,
    activity: Option<ActivityLog>,
}

impl AppState {
    pub fn new(runner: Option<Runner>, automations: Vec<Arc<dyn Automation>>) -> Self {
        Self {
            runner,
            automations: Arc::new(automations),
            backfill: BackfillConfig::default(),
            reports: Arc::new(ReportsConfig::default()),
            report_client: None,
            activity: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let retry = config.retry.policy();
        let activity = config
            .activity
            .enabled
            .then(|| ActivityLog::new(config.activity.log_path()));

        let runner = match config.monday.token() {
            Ok(token) => {
                let client = MondayClient::new(
                    token.to_string(),
                    config.monday.api_url.clone(),
                    config.monday.api_version.clone(),
                    config.monday.timeout(),
                    retry,
                )
                .context("Failed to create board API client")?;
                Some(Runner::new(Arc::new(client), activity.clone()))
            }
            Err(e) => {
                tracing::warn!(error = %e, "webhooks will fail until a token is configured");
                None
            }
        };

        let report_client = ReportClient::new(&config.reports, config.monday.timeout(), retry)
            .context("Failed to create report client")?;

        Ok(Self::new(runner, build_automations(config))
            .with_backfill(config.backfill.clone())
            .with_reports(config.reports.clone(), report_client)
            .with_activity(activity))
    }

    pub fn with_backfill(mut self, backfill: BackfillConfig) -> Self {
        self.backfill = backfill;
        self
    }

    pub fn with_reports(mut self, reports: ReportsConfig, client: ReportClient) -> Self {
        self.reports = Arc::new(reports);
        self.report_client = Some(Arc::new(client));
        self
    }

    pub fn with_activity(mut self, activity: Option<ActivityLog>) -> Self {
        self.activity = activity;
        self
    }

    pub fn runner(&self) -> Result<&Runner, DispatchError> {
        self.runner
            .as_ref()
            .ok_or(DispatchError::Config(crate::config::ConfigError::MissingToken))
    }

    pub fn automation(&self, name: &str) -> Result<Arc<dyn Automation>, DispatchError> {
        self.automations
            .iter()
            .find(|a| a.name() == name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownAutomation(name.to_string()))
    }

    pub fn automation_names(&self) -> Vec<&str> {
        self.automations.iter().map(|a| a.name()).collect()
    }

    pub fn backfill_config(&self) -> &BackfillConfig {
        &self.backfill
    }

    pub fn reports_config(&self) -> &ReportsConfig {
        &self.reports
    }

    pub fn report_client(&self) -> Option<&ReportClient> {
        self.report_client.as_deref()
    }

    pub fn activity(&self) -> Option<&ActivityLog> {
        self.activity.as_ref()
    }
}

/// Every response is readable cross-origin.
async fn allow_any_origin(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route(
            "/webhooks/{automation}",
            post(webhook::webhook_handler).options(webhook::preflight_handler),
        )
        .route("/backfill/{automation}", get(backfill::backfill_handler))
        .route("/reports/dependencies", get(reports::dependencies_handler))
        .route("/activity", get(reports::activity_handler))
        .route("/health", get(health::health_handler))
        .layer(axum::middleware::map_response(allow_any_origin))
        .with_state(app_state)
}
