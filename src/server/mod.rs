//! HTTP surface: keep-alive probe plus a JSON command API
//!
//! `GET /` and `GET /voices` are public. `/commands` and `/guilds/:id` act
//! on behalf of the `user_id` they are given, so they require the API token.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::commands::CommandSurface;

pub use handlers::ApiResponse;

pub struct AppState {
    pub surface: CommandSurface,
    /// Bearer token for the protected routes; `None` refuses them
    pub api_token: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/commands", post(handlers::post_command))
        .route("/guilds/:id", get(handlers::get_guild))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_token,
        ));

    Router::new()
        .route("/", get(handlers::health))
        .route("/voices", get(handlers::get_voices))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct WebServer {
    listener: TcpListener,
}

impl WebServer {
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Serve until `shutdown` resolves
    pub async fn run(
        self,
        state: Arc<AppState>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "HTTP server listening");
        axum::serve(self.listener, router(state))
            .with_graceful_shutdown(shutdown)
            .await
    }
}
