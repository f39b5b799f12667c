//! Client configuration.
//!
//! Layered as defaults, then an optional TOML file, then `WARROOM__*`
//! environment variables.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{WarroomError, WarroomResult};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_FALLBACK_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const ENV_PREFIX: &str = "WARROOM";

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Room ID (e.g. "crucible-hack-feb21").
    pub room: String,
    /// Display name of the reporting member.
    pub member: String,
    /// War room server URL.
    pub server: String,
    pub realtime: RealtimeConfig,
    pub fallback: FallbackConfig,
    pub queue: QueueConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            room: String::new(),
            member: String::new(),
            server: DEFAULT_SERVER_URL.to_string(),
            realtime: RealtimeConfig::default(),
            fallback: FallbackConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

/// Real-time (WebSocket) channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Whether to open the real-time channel at all.
    pub enabled: bool,
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnect policy for the real-time channel. Disabled by default: the
/// channel is attempted once and stays closed after it fails or drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Give up after this many consecutive failed attempts.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Backoff before reconnect attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let delay = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    pub fn allows(&self, failures: u32) -> bool {
        self.enabled && self.max_attempts.is_none_or(|max| failures < max)
    }
}

/// Request-based fallback channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: DEFAULT_FALLBACK_TIMEOUT_MS,
        }
    }
}

impl FallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Outbound queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum queued events; the oldest is evicted on overflow.
    /// `0` leaves the queue unbounded.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl QueueConfig {
    /// Capacity limit, or `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }
}

impl ClientConfig {
    pub fn new(room: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            member: member.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Load configuration from defaults, an optional TOML file and the
    /// process environment.
    pub fn load(path: Option<&Path>) -> WarroomResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`ClientConfig::load`], reading environment variables from
    /// `env` instead of the process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> WarroomResult<Self> {
        let mut builder = Config::builder()
            .set_default("server", DEFAULT_SERVER_URL)?
            .set_default("realtime.enabled", true)?
            .set_default("fallback.enabled", true)?
            .set_default("fallback.timeout_ms", DEFAULT_FALLBACK_TIMEOUT_MS)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let built = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }

    /// Check required fields and the server URL.
    pub fn validate(&self) -> WarroomResult<()> {
        if self.room.trim().is_empty() {
            return Err(WarroomError::InvalidConfig("room is required".into()));
        }
        if self.member.trim().is_empty() {
            return Err(WarroomError::InvalidConfig("member is required".into()));
        }
        if self.fallback.enabled && self.fallback.timeout_ms == 0 {
            return Err(WarroomError::InvalidConfig(
                "fallback.timeout_ms must be greater than zero".into(),
            ));
        }
        parse_server_url(&self.server)?;
        Ok(())
    }
}

/// Parse a server base URL, accepting only http and https.
pub fn parse_server_url(server: &str) -> WarroomResult<Url> {
    let url = Url::parse(server).map_err(|e| WarroomError::InvalidServerUrl {
        url: server.to_string(),
        message: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(WarroomError::InvalidServerUrl {
            url: server.to_string(),
            message: format!("unsupported scheme '{other}'"),
        }),
    }
}
