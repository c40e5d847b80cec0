//! HTTP handlers.
//!
//! Error bodies use the fixed `{"code", "message"}` shape. Server-side
//! failures are logged with full detail and answered with a generic
//! message.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{debug, error, warn};

use skyscale_engine::Trigger;
use skyscale_state::HistoryOrder;

use crate::ApiState;

/// Error payload returned to HTTP callers.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: &'static str,
}

fn error_response(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (status, Json(ErrorResponse { code, message })).into_response()
}

fn bad_request(message: &'static str) -> Response {
    error_response(StatusCode::BAD_REQUEST, "Bad-Request", message)
}

/// Body of a successful scaling action.
#[derive(Debug, Serialize)]
struct AppEntity {
    instances: u32,
}

// ── Scaling actions ────────────────────────────────────────────

/// POST /v1/scaling_actions
///
/// The body is decoded here rather than through the `Json` extractor so a
/// malformed trigger always yields the fixed 400 payload.
pub async fn handle_scale(State(state): State<ApiState>, body: Bytes) -> Response {
    let trigger: Trigger = match serde_json::from_slice(&body) {
        Ok(trigger) => trigger,
        Err(e) => {
            warn!(error = %e, "failed to decode trigger");
            return bad_request("Incorrect trigger in request body");
        }
    };
    debug!(app_id = %trigger.app_id, adjustment = %trigger.adjustment, "scaling trigger received");

    match state.engine.scale(&trigger.app_id, &trigger).await {
        Ok(decision) => (
            StatusCode::CREATED,
            Json(AppEntity {
                instances: decision.computed_instances,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(app_id = %trigger.app_id, error = %e, "failed to take scaling action");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal-server-error",
                "Error taking scaling action",
            )
        }
    }
}

// ── Scaling history ────────────────────────────────────────────

/// Validated history query parameters.
#[derive(Debug, PartialEq, Eq)]
struct HistoryQuery {
    start: u64,
    end: Option<u64>,
    order: HistoryOrder,
}

/// Each parameter may appear at most once.
fn single<'a>(
    params: &'a [(String, String)],
    name: &str,
    duplicate: &'static str,
) -> Result<Option<&'a str>, &'static str> {
    let mut values = params.iter().filter(|(k, _)| k == name).map(|(_, v)| v.as_str());
    let first = values.next();
    if values.next().is_some() {
        return Err(duplicate);
    }
    Ok(first)
}

fn parse_history_query(params: &[(String, String)]) -> Result<HistoryQuery, &'static str> {
    let start = match single(params, "start", "Incorrect start parameter in query string")? {
        Some(v) => v.parse().map_err(|_| "Error parsing start time")?,
        None => 0,
    };
    let end = match single(params, "end", "Incorrect end parameter in query string")? {
        Some(v) => Some(v.parse().map_err(|_| "Error parsing end time")?),
        None => None,
    };
    let order = match single(params, "order", "Incorrect order parameter in query string")? {
        None => HistoryOrder::Desc,
        Some(v) if v.eq_ignore_ascii_case("desc") => HistoryOrder::Desc,
        Some(v) if v.eq_ignore_ascii_case("asc") => HistoryOrder::Asc,
        Some(_) => {
            return Err(
                "Incorrect order parameter in query string, the value can only be asc or desc",
            );
        }
    };
    Ok(HistoryQuery { start, end, order })
}

/// GET /v1/apps/{app_id}/scaling_histories
pub async fn get_scaling_histories(
    State(state): State<ApiState>,
    Path(app_id): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let query = match parse_history_query(&params) {
        Ok(query) => query,
        Err(message) => {
            warn!(%app_id, ?params, reason = message, "invalid scaling history query");
            return bad_request(message);
        }
    };
    debug!(%app_id, ?query, "get scaling histories");

    match state
        .store
        .list_scaling_histories(&app_id, query.start, query.end, query.order)
    {
        Ok(histories) => Json(histories).into_response(),
        Err(e) => {
            error!(%app_id, error = %e, "failed to retrieve scaling histories");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal-Server-Error",
                "Error getting scaling histories from database",
            )
        }
    }
}

// ── Health ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    lock: &'static str,
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        lock: state.lock.status().as_str(),
    })
}
