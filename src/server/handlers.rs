//! HTTP API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::commands::{Invocation, LogResponder, Reply};
use crate::playback::GuildSnapshot;
use crate::protocol::GuildId;
use crate::server::AppState;
use crate::tts::{Voice, VOICES};

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Keep-alive probe
pub async fn health() -> &'static str {
    "Bot is running"
}

/// Run a command invocation and return its reply
pub async fn post_command(
    State(state): State<Arc<AppState>>,
    Json(invocation): Json<Invocation>,
) -> Json<ApiResponse<Reply>> {
    let reply = state.surface.dispatch(invocation, &LogResponder).await;
    Json(ApiResponse::ok(reply))
}

/// Selectable synthesis voices
pub async fn get_voices() -> Json<ApiResponse<Vec<Voice>>> {
    Json(ApiResponse::ok(VOICES.to_vec()))
}

/// Playback state of one guild
pub async fn get_guild(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> (StatusCode, Json<ApiResponse<GuildSnapshot>>) {
    match state.surface.playback().snapshot(GuildId(id)).await {
        Ok(Some(snapshot)) => (StatusCode::OK, Json(ApiResponse::ok(snapshot))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("No state for guild {}", id))),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}
