//! HTTP surface: the webhook endpoint and a status page.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::relay::EventRelay;

pub const LISTENING: &str = "Listening to GitLab events!!!";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub server: ServerInfo,
    pub ci_servers: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub version: String,
    pub gitlab_version: String,
    pub current_time: String,
}

pub fn router(relay: Arc<EventRelay>) -> Router {
    Router::new()
        .route("/events", routing::post(post_events).get(listening))
        .route("/status", routing::get(status))
        .with_state(relay)
}

pub async fn serve(relay: Arc<EventRelay>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening for GitLab webhooks on {}", listener.local_addr()?);
    axum::serve(listener, router(relay)).await?;
    Ok(())
}

async fn listening() -> &'static str {
    LISTENING
}

/// Always answers 200 so GitLab never retries a delivery; warnings, if any,
/// are returned as a JSON list.
async fn post_events(State(relay): State<Arc<EventRelay>>, body: Bytes) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Ignoring a webhook delivery that is not JSON: {e}");
            return StatusCode::OK.into_response();
        }
    };

    let warnings = relay.handle(raw).await;
    if warnings.is_empty() {
        StatusCode::OK.into_response()
    } else {
        Json(warnings).into_response()
    }
}

async fn status(State(relay): State<Arc<EventRelay>>) -> Json<Status> {
    let gitlab_version = match relay.gitlab().version().await {
        Ok(version) => version,
        Err(e) => {
            warn!("Failed to read the GitLab version: {e}");
            String::new()
        }
    };

    Json(Status {
        server: ServerInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            gitlab_version,
            current_time: Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        },
        ci_servers: relay.servers().names(),
    })
}
