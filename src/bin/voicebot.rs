//! Voicebot Application
//!
//! Runs the playback dispatcher and serves the keep-alive and command API.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voicebot::{
    access::{AccessGate, JsonFileStore},
    audio::{FfmpegSource, Transcoder},
    commands::CommandSurface,
    config::{self, AppConfig, SinkKind},
    playback::{Coordinator, PlaybackConfig, Services},
    protocol::UserId,
    resolver::YtDlpResolver,
    server::{AppState, WebServer},
    tts::{AudioPipeline, GoogleTts},
    voice::{FileSink, FrameSink, LocalTransport, NullSink},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Voicebot");

    let config = AppConfig::load().context("loading configuration")?;
    config::bot_token().context("the bot cannot start without a token")?;

    let admin = match config.bot.admin_id {
        Some(id) => UserId(id),
        None => {
            tracing::warn!("ADMIN_ID not set, admin commands are disabled");
            UserId(0)
        }
    };
    let store = JsonFileStore::new(&config.bot.allow_list_path);
    let gate = AccessGate::new(admin, Box::new(store));

    let sink: Arc<dyn FrameSink> = match config.transport.sink {
        SinkKind::Null => Arc::new(NullSink),
        SinkKind::File => Arc::new(FileSink::new(&config.transport.sink_dir)),
    };
    let engine = Arc::new(GoogleTts::new(config.tts.endpoint.clone(), config.tts.timeout()));
    let transcoder = Arc::new(Transcoder::new(&config.tools.ffmpeg));
    let services = Services {
        resolver: Arc::new(YtDlpResolver::new(&config.tools.yt_dlp)),
        streams: Arc::new(FfmpegSource::new(
            &config.tools.ffmpeg,
            config.tools.reconnect_delay_max_secs,
        )),
        speech: Arc::new(AudioPipeline::new(engine, transcoder)),
        transport: Arc::new(LocalTransport::new(sink, config.transport.realtime)),
    };

    let (playback, dispatcher) = Coordinator::spawn(
        services,
        gate,
        PlaybackConfig {
            workers: config.workers.size,
            default_voice: config.bot.default_voice.clone(),
        },
    )
    .context("starting worker pool")?;

    if config.server.api_token.is_none() {
        tracing::warn!("API_TOKEN not set, the command API will refuse every request");
    }
    let state = Arc::new(AppState {
        surface: CommandSurface::new(playback.clone()),
        api_token: config.server.api_token.clone(),
    });
    let server = WebServer::bind(config.server.addr())
        .await
        .with_context(|| format!("binding {}", config.server.addr()))?;
    tracing::info!("Keep-alive server on port {}", config.server.port);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
    };
    server.run(state, shutdown).await.context("HTTP server")?;

    if let Err(e) = playback.shutdown().await {
        tracing::warn!("Dispatcher already stopped: {}", e);
    }
    dispatcher.await.context("dispatcher task")?;

    tracing::info!("Voicebot stopped");
    Ok(())
}
