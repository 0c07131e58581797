use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use switchdesk_discord::platform::Platform;

#[derive(Clone)]
pub struct HealthState {
    platform: Arc<dyn Platform>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub discord: HealthCheck,
    pub checked_at: String,
}

pub fn router(platform: Arc<dyn Platform>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { platform })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let discord = discord_check(state.platform.as_ref()).await;
    let ready = discord.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "switchdesk-server runtime initialized".to_string(),
        },
        discord,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn discord_check(platform: &dyn Platform) -> HealthCheck {
    match platform.latency().await {
        Ok(latency) => HealthCheck {
            status: "ready",
            detail: format!("discord api reachable in {}ms", latency.as_millis()),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("discord api unreachable: {error}") }
        }
    }
}
