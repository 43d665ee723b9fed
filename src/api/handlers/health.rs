use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub cache: String,
    pub broker: String,
    pub version: String,
}

fn label(up: bool) -> &'static str {
    if up { "connected" } else { "disconnected" }
}

fn cache_label(enabled: bool, up: bool) -> &'static str {
    if enabled { label(up) } else { "disabled" }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Backend connectivity", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let presence = state.pipeline.presence();
    let cache_enabled = presence.enabled();
    let (cache_up, broker_up) = tokio::join!(
        async { !cache_enabled || presence.ping().await },
        state.pipeline.notifier().is_healthy()
    );

    Json(HealthResponse {
        status: if cache_up && broker_up { "ok" } else { "degraded" }.to_string(),
        cache: cache_label(cache_enabled, cache_up).to_string(),
        broker: label(broker_up).to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
