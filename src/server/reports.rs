use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use super::{AppState, DispatchError};
use crate::activity::ActivityEvent;
use crate::reports::{build_report, DependencyReport};

const DEFAULT_ACTIVITY_LIMIT: usize = 50;

pub async fn dependencies_handler(
    State(state): State<AppState>,
) -> Result<Json<DependencyReport>, DispatchError> {
    let client = state
        .report_client()
        .ok_or(DispatchError::Unavailable("dependency report client"))?;
    Ok(Json(build_report(client, state.reports_config()).await))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityParams {
    pub limit: Option<usize>,
    pub automation: Option<String>,
}

/// Most recent entries last. Empty when the log is disabled or missing.
pub async fn activity_handler(
    State(state): State<AppState>,
    Query(params): Query<ActivityParams>,
) -> Json<Vec<ActivityEvent>> {
    let limit = params.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    let Some(log) = state.activity().cloned() else {
        return Json(Vec::new());
    };
    let read = tokio::task::spawn_blocking(move || log.read(params.automation.as_deref(), Some(limit)));
    match read.await {
        Ok(events) => Json(events),
        Err(e) => {
            warn!(error = %e, "activity read task failed");
            Json(Vec::new())
        }
    }
}
