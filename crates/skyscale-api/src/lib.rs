//! skyscale-api — HTTP gateway for Skyscale.
//!
//! Accepts scaling triggers from the upstream evaluator, serves recorded
//! scaling history, and reports the replica's lock status.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/v1/scaling_actions` | Apply a trigger, returns `{"instances": n}` |
//! | GET | `/v1/apps/{app_id}/scaling_histories` | History, `?start=&end=&order=asc\|desc` |
//! | GET | `/health` | Liveness plus `held`/`lost` lock status |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use skyscale_engine::ScalingEngine;
use skyscale_lock::LockObserver;
use skyscale_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: ScalingEngine,
    pub store: StateStore,
    pub lock: LockObserver,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let v1 = Router::new()
        .route("/scaling_actions", post(handlers::handle_scale))
        .route(
            "/apps/{app_id}/scaling_histories",
            get(handlers::get_scaling_histories),
        );

    Router::new()
        .nest("/v1", v1)
        .route("/health", get(handlers::health))
        .with_state(state)
}
