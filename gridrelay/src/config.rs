//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `GRIDRELAY_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `GRIDRELAY_` override YAML values
//! 3. **MONGODB_URI** - Special case: overrides `store.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `GRIDRELAY_TELEGRAM__CHAT_ID=1231104328` sets the `telegram.chat_id` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Bot credentials are best kept out of the config file
//! GRIDRELAY_TELEGRAM__BOT_TOKEN="123456:ABC..."
//! GRIDRELAY_TELEGRAM__CHAT_ID=1231104328
//!
//! # Store connection
//! MONGODB_URI="mongodb://localhost:27017"
//! GRIDRELAY_STORE__DATABASE=PhoneModels
//!
//! # Keep going past malformed records
//! GRIDRELAY_RELAY__ON_RECORD_ERROR=skip
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "GRIDRELAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without contacting the store.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Document store holding the images
    pub store: StoreConfig,
    /// Bot credentials and destination chat
    pub telegram: TelegramConfig,
    /// Per-record relay behaviour
    pub relay: RelayConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// MongoDB connection and GridFS bucket.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Connection string, e.g. `mongodb://localhost:27017`
    pub url: String,
    pub database: String,
    /// GridFS bucket name; records are listed from `<bucket>.files`
    pub bucket: String,
    /// Deadline for the initial connection handshake
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017".to_string(),
            database: "PhoneModels".to_string(),
            bucket: "fs".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Telegram Bot API settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramConfig {
    pub api_url: Url,
    /// Bot token issued by BotFather (required)
    pub bot_token: Option<String>,
    /// Destination chat for every message (required)
    pub chat_id: i64,
    /// Timeout for each Bot API call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("https://api.telegram.org").expect("static URL is valid"),
            bot_token: None,
            chat_id: 0,
            request_timeout: Duration::from_secs(30),
        }
    }
}

// The token must never reach the logs, including the debug dump of the config
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_url", &self.api_url.as_str())
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("chat_id", &self.chat_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// What to do when a single record cannot be relayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole run at the first error
    #[default]
    Abort,
    /// Log the failed record and continue with the next one
    Skip,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Directory temp files are written to
    pub work_dir: PathBuf,
    /// Extension appended to temp file names
    pub file_extension: String,
    /// Permission bits for newly created temp files
    pub file_mode: u32,
    pub on_record_error: FailurePolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            file_extension: "jpg".to_string(),
            file_mode: 0o644,
            on_record_error: FailurePolicy::Abort,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.telegram.bot_token.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Config {
                message: "telegram.bot_token is not set. Set GRIDRELAY_TELEGRAM__BOT_TOKEN or add it to the config file."
                    .to_string(),
            });
        }

        if self.telegram.chat_id == 0 {
            return Err(Error::Config {
                message: "telegram.chat_id must be a non-zero chat identifier".to_string(),
            });
        }

        if self.store.database.is_empty() {
            return Err(Error::Config {
                message: "store.database cannot be empty".to_string(),
            });
        }

        if self.store.bucket.is_empty() {
            return Err(Error::Config {
                message: "store.bucket cannot be empty".to_string(),
            });
        }

        if self.store.connect_timeout.is_zero() {
            return Err(Error::Config {
                message: "store.connect_timeout must be positive".to_string(),
            });
        }

        let extension = &self.relay.file_extension;
        // The extension ends up in the decoded filename, so it must not add field separators
        if extension.is_empty() || extension.contains(['/', '\\', '_', '?']) {
            return Err(Error::Config {
                message: format!(
                    "relay.file_extension '{extension}' must be non-empty and free of path separators, '_' and '?'"
                ),
            });
        }

        if self.relay.file_mode > 0o777 {
            return Err(Error::Config {
                message: format!("relay.file_mode {:o} is not a permission mode (max 777)", self.relay.file_mode),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables override specific values; GRIDRELAY_CONFIG is the file path
            .merge(Env::prefixed("GRIDRELAY_").ignore(&["CONFIG"]).split("__"))
            // Conventional MongoDB connection variable
            .merge(Env::raw().only(&["MONGODB_URI"]).map(|_| "store.url".into()))
    }
}
