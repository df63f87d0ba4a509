//! Configuration types.
//!
//! Everything is read from environment variables once at startup. A missing
//! credential is a `ConfigError`, which `main` treats as fatal.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default HTTP listen port.
pub const DEFAULT_PORT: u16 = 10000;

/// Default model when `LLM_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default upper bound on a single completion call.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// Default local database file.
pub const DEFAULT_DB_PATH: &str = "./data/chat-relay.db";

/// How inbound messages reach the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Long-poll `getUpdates`.
    Polling,
    /// Telegram pushes updates to our HTTP server.
    Webhook,
    /// stdin/stdout, for local testing.
    Cli,
}

impl std::str::FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polling" | "poll" => Ok(Self::Polling),
            "webhook" | "push" => Ok(Self::Webhook),
            "cli" => Ok(Self::Cli),
            other => Err(ConfigError::InvalidValue {
                key: "RELAY_TRANSPORT".into(),
                message: format!("expected polling, webhook or cli, got '{other}'"),
            }),
        }
    }
}

/// Where conversation records are stored.
#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    /// Local SQLite file (created if missing).
    Local(PathBuf),
    /// Remote libSQL server.
    Remote {
        url: String,
        auth_token: SecretString,
    },
}

impl DatabaseConfig {
    /// Interpret a connection string. `libsql://`, `http://` and `https://`
    /// URLs are remote; anything else is a file path.
    pub fn parse(url: &str, auth_token: Option<String>) -> Result<Self, ConfigError> {
        let is_remote = ["libsql://", "http://", "https://"]
            .iter()
            .any(|scheme| url.starts_with(scheme));

        if !is_remote {
            let path = url.strip_prefix("file:").unwrap_or(url);
            return Ok(Self::Local(PathBuf::from(path)));
        }

        let auth_token = auth_token.ok_or_else(|| ConfigError::MissingRequired {
            key: "DATABASE_AUTH_TOKEN".into(),
            hint: format!("Remote database {url} needs an auth token"),
        })?;

        Ok(Self::Remote {
            url: url.to_string(),
            auth_token: SecretString::from(auth_token),
        })
    }
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Telegram bot token. `None` only in CLI mode.
    pub bot_token: Option<SecretString>,
    /// Completion backend settings.
    pub llm: LlmConfig,
    /// Upper bound on one completion call.
    pub llm_timeout: Duration,
    /// Conversation store location.
    pub database: DatabaseConfig,
    /// Public hostname Telegram can reach (webhook mode).
    pub external_hostname: Option<String>,
    /// HTTP listen port.
    pub port: u16,
    /// Inbound delivery mode.
    pub transport: TransportMode,
    /// Directory for rolling log files, if any.
    pub log_dir: Option<PathBuf>,
}

impl RelayConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|k| get(*k));

        let external_hostname = first(&["EXTERNAL_HOSTNAME", "RENDER_EXTERNAL_HOSTNAME"]);

        let transport = match get("RELAY_TRANSPORT") {
            Some(s) => s.parse()?,
            None if external_hostname.is_some() => TransportMode::Webhook,
            None => TransportMode::Polling,
        };

        let bot_token = first(&["BOT_TOKEN", "TELEGRAM_BOT_TOKEN"]).map(SecretString::from);
        if bot_token.is_none() && transport != TransportMode::Cli {
            return Err(ConfigError::MissingEnvVar("BOT_TOKEN".into()));
        }

        if transport == TransportMode::Webhook && external_hostname.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "EXTERNAL_HOSTNAME".into(),
                hint: "Webhook delivery needs a public hostname for setWebhook".into(),
            });
        }

        let backend = match get("LLM_BACKEND") {
            Some(s) => s.parse()?,
            None => LlmBackend::Gemini,
        };

        let api_key = first(&["LLM_API_KEY", backend.api_key_var()])
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.api_key_var().into()))?;

        let model = get("LLM_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let llm_timeout = Duration::from_secs(parse_or(
            get("LLM_TIMEOUT_SECS"),
            "LLM_TIMEOUT_SECS",
            DEFAULT_LLM_TIMEOUT_SECS,
        )?);

        let port = parse_or(get("PORT"), "PORT", DEFAULT_PORT)?;

        let database = DatabaseConfig::parse(
            &get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            get("DATABASE_AUTH_TOKEN"),
        )?;

        Ok(Self {
            bot_token,
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            llm_timeout,
            database,
            external_hostname,
            port,
            transport,
            log_dir: get("RELAY_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
    }
}
