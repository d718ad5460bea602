//! Application configuration
//!
//! Read from a TOML file (`VOICEBOT_CONFIG`, else the platform config
//! directory), then overridden from the environment. The bot token is only
//! ever taken from the environment.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{DEFAULT_PORT, DEFAULT_WORKERS};
use crate::error::{Error, Result};
use crate::tts::DEFAULT_VOICE;

pub const CONFIG_ENV: &str = "VOICEBOT_CONFIG";
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";
pub const API_TOKEN_ENV: &str = "API_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub server: ServerConfig,
    pub workers: WorkerConfig,
    pub tools: ToolsConfig,
    pub tts: TtsConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// The one user allowed to manage the allow-list
    pub admin_id: Option<u64>,
    pub allow_list_path: PathBuf,
    pub default_voice: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            admin_id: None,
            allow_list_path: PathBuf::from("allowed_users.json"),
            default_voice: DEFAULT_VOICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Bearer token for `/commands` and `/guilds`; unset refuses them all
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            api_token: None,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_WORKERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
    /// Upper bound of ffmpeg's reconnect backoff
    pub reconnect_delay_max_secs: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
            reconnect_delay_max_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://translate.google.com/translate_tts".to_string(),
            timeout_secs: 15,
        }
    }
}

impl TtsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Null,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub sink: SinkKind,
    pub sink_dir: PathBuf,
    /// Pace playback at 20 ms per frame
    pub realtime: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Null,
            sink_dir: PathBuf::from("voice_out"),
            realtime: true,
        }
    }
}

impl AppConfig {
    /// Load from the first config file found, then apply the process environment
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Override fields from `ADMIN_ID`, `PORT` and `API_TOKEN`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(admin) = var("ADMIN_ID").filter(|v| !v.trim().is_empty()) {
            let id = admin
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("ADMIN_ID is not a user id: {}", admin)))?;
            self.bot.admin_id = Some(id);
        }
        if let Some(port) = var("PORT").filter(|v| !v.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("PORT is not a port number: {}", port)))?;
        }
        if let Some(token) = var(API_TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.api_token = Some(token.trim().to_string());
        }
        Ok(())
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    ProjectDirs::from("", "", "voicebot").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// The bot token from the environment
pub fn bot_token() -> Result<String> {
    std::env::var(TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("{} not found", TOKEN_ENV)))
}
