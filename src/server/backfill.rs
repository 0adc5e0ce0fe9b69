use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::{AppState, DispatchError};
use crate::automations::RunMode;
use crate::backfill::{run_backfill, BackfillOptions, BackfillReport};

#[derive(Debug, Default, Deserialize)]
pub struct BackfillParams {
    #[serde(default)]
    pub execute: bool,
    pub cursor: Option<String>,
}

/// One budgeted pass. Dry run unless `execute=true`.
pub async fn backfill_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<BackfillParams>,
) -> Result<Json<BackfillReport>, DispatchError> {
    let automation = state.automation(&name)?;
    let runner = state.runner()?;
    let mode = if params.execute {
        RunMode::Execute
    } else {
        RunMode::DryRun
    };
    let options = BackfillOptions::from_config(state.backfill_config(), mode);
    let report = run_backfill(runner, automation.as_ref(), params.cursor.as_deref(), options).await;
    Ok(Json(report))
}
