//! Webhook dispatcher.
//!
//! Deliveries the service doesn't act on still get a 200: the board treats any
//! other status as a failed delivery and retries it indefinitely. Only a
//! missing token or a failed fetch/write report an error status.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{AppState, DispatchError};
use crate::automations::{AutomationError, RunMode, Trigger};
use crate::model::event::{parse_inbound, InboundPayload};
use crate::sync::{Outcome, SkipReason};

fn ok(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// CORS preflight: empty 200 with permissive headers.
pub async fn preflight_handler() -> Response {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

pub async fn webhook_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response, DispatchError> {
    let event = match parse_inbound(&body) {
        InboundPayload::Challenge(challenge) => {
            info!(automation = %name, "answering webhook challenge");
            return Ok(ok(json!({ "challenge": challenge })));
        }
        InboundPayload::Empty => {
            debug!(automation = %name, "delivery without an event");
            return Ok(ok(json!({ "message": "nothing to process" })));
        }
        InboundPayload::Event(event) => event,
    };

    let Ok(automation) = state.automation(&name) else {
        warn!(automation = %name, "delivery for an unknown automation");
        return Ok(ok(json!({
            "message": "not monitored",
            "reason": "automation",
            "automation": name,
        })));
    };

    if event.board_id != automation.board_id() {
        debug!(automation = %name, board_id = event.board_id, "board not monitored");
        return Ok(ok(json!({
            "message": "not monitored",
            "reason": "board",
            "board_id": event.board_id,
        })));
    }
    if !automation.watches(event.column_id.as_deref()) {
        debug!(automation = %name, column = ?event.column_id, "column not monitored");
        return Ok(ok(json!({
            "message": "not monitored",
            "reason": "column",
            "column_id": event.column_id,
        })));
    }

    let runner = state.runner()?;
    let item = runner
        .api()
        .fetch_item(event.item_id)
        .await
        .map_err(|source| DispatchError::Fetch {
            item_id: event.item_id,
            source,
        })?;
    let Some(item) = item else {
        warn!(automation = %name, item_id = event.item_id, "item not found");
        return Ok(ok(json!({
            "message": "item not found",
            "item_id": event.item_id,
        })));
    };

    let trigger = Trigger::from_event(&event);
    match runner
        .run(automation.as_ref(), &item, &trigger, RunMode::Execute)
        .await
    {
        Ok(report) => {
            info!(
                automation = %name,
                item_id = item.id,
                outcome = report.outcome.as_str(),
                "webhook processed"
            );
            Ok(ok(json!({
                "automation": name,
                "item_id": item.id,
                "outcome": report.outcome,
                "reason": report.reason,
                "changes": report.changes,
            })))
        }
        Err(AutomationError::UnparseableSource { column, raw }) => {
            warn!(automation = %name, item_id = item.id, column = %column, raw = %raw, "unreadable source value");
            Ok(ok(json!({
                "automation": name,
                "item_id": item.id,
                "outcome": Outcome::NotNeeded,
                "reason": SkipReason::UnparseableSource,
                "changes": {},
            })))
        }
        Err(AutomationError::Api(source)) => Err(DispatchError::Write {
            item_id: item.id,
            source,
        }),
    }
}
