//! Configuration loading and management.
//!
//! Loads configuration from `./config.toml` (or `$SMSRELAY_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::scheduler::DEFAULT_INTERVAL_SECS;

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
///
/// Path: `./config.toml` or `$SMSRELAY_CONFIG_PATH`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Message database settings (`[database]`).
    pub database: DatabaseConfig,
    /// Dispatch loop settings (`[scheduler]`).
    pub scheduler: SchedulerConfig,
    /// Delivery provider credentials (`[providers.*]`).
    pub providers: ProvidersConfig,
    /// Log directory for the daemon's rotating file layer.
    pub logs_dir: String,
}

/// Message database settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file path.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "smsrelay.db".to_owned(),
        }
    }
}

/// Dispatch loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between drain passes.
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

/// Delivery provider credentials. Absent sections leave the backend
/// unregistered.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Twilio credentials (`[providers.twilio]`).
    pub twilio: Option<TwilioConfig>,
    /// Plivo credentials (`[providers.plivo]`).
    pub plivo: Option<PlivoConfig>,
}

/// Twilio backend credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
    /// Account SID (also the basic-auth user).
    pub account_sid: String,
    /// Auth token.
    pub auth_token: String,
    /// Optional default sender identity; falls back to the account SID.
    #[serde(default)]
    pub sender_id: Option<String>,
}

/// Plivo backend credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct PlivoConfig {
    /// Auth ID (also the basic-auth user).
    pub auth_id: String,
    /// Auth token.
    pub auth_token: String,
    /// Optional default sender identity; falls back to the auth ID.
    #[serde(default)]
    pub sender_id: Option<String>,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$SMSRELAY_CONFIG_PATH` or `./config.toml`. A missing
    /// file is not an error — defaults apply and env vars can still fill in
    /// credentials.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration using a custom override resolver.
    ///
    /// The daemon composes the process environment with `.env` credentials
    /// here (env wins); tests pass a plain closure.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::load_from_file(&env)?;
        config.apply_overrides(&env);
        // interval(0) would panic in the scheduler.
        if config.scheduler.interval_secs == 0 {
            tracing::warn!(
                default = DEFAULT_INTERVAL_SECS,
                "scheduler.interval_secs must be positive, using default"
            );
            config.scheduler.interval_secs = DEFAULT_INTERVAL_SECS;
        }
        Ok(config)
    }

    fn load_from_file(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = Self::config_path_with(env);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: Config =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(p) = env("SMSRELAY_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("config.toml")
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SMSRELAY_DB_PATH") {
            self.database.path = v;
        }
        if let Some(v) = env("SMSRELAY_INTERVAL_SECS") {
            match v.parse() {
                Ok(n) if n > 0 => self.scheduler.interval_secs = n,
                _ => tracing::warn!(
                    var = "SMSRELAY_INTERVAL_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("SMSRELAY_LOGS_DIR") {
            self.logs_dir = v;
        }

        // Twilio — presence of both credentials creates the section.
        let twilio_sid = env("SMSRELAY_TWILIO_ACCOUNT_SID");
        let twilio_token = env("SMSRELAY_TWILIO_AUTH_TOKEN");
        if let (Some(account_sid), Some(auth_token)) = (twilio_sid, twilio_token) {
            let sender_id = env("SMSRELAY_TWILIO_SENDER_ID")
                .or_else(|| self.providers.twilio.as_ref().and_then(|c| c.sender_id.clone()));
            self.providers.twilio = Some(TwilioConfig {
                account_sid,
                auth_token,
                sender_id,
            });
        } else if let Some(v) = env("SMSRELAY_TWILIO_SENDER_ID") {
            if let Some(ref mut twilio) = self.providers.twilio {
                twilio.sender_id = Some(v);
            }
        }

        // Plivo — same shape.
        let plivo_id = env("SMSRELAY_PLIVO_AUTH_ID");
        let plivo_token = env("SMSRELAY_PLIVO_AUTH_TOKEN");
        if let (Some(auth_id), Some(auth_token)) = (plivo_id, plivo_token) {
            let sender_id = env("SMSRELAY_PLIVO_SENDER_ID")
                .or_else(|| self.providers.plivo.as_ref().and_then(|c| c.sender_id.clone()));
            self.providers.plivo = Some(PlivoConfig {
                auth_id,
                auth_token,
                sender_id,
            });
        } else if let Some(v) = env("SMSRELAY_PLIVO_SENDER_ID") {
            if let Some(ref mut plivo) = self.providers.plivo {
                plivo.sender_id = Some(v);
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            providers: ProvidersConfig::default(),
            logs_dir: "logs".to_owned(),
        }
    }
}
