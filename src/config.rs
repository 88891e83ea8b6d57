use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub retry: RetryConfig,
    pub smtp: SmtpConfig,
    pub twilio: TwilioConfig,
    pub telegram: TelegramConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub url: String,
    pub stream_name: String,
    pub consumer_group: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Cap on retry rounds after the initial attempt. Clamped to 1..=10.
    pub max_attempts: u32,
    /// Base of the exponential backoff (seconds): `base^(attempt - 1)`. Must be >= 1.0.
    pub backoff_base: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub use_tls: bool,
}

impl SmtpConfig {
    /// A notification-carrying mail relay needs all three of host/user/password; anything
    /// short of that and the email provider falls back to mock-success mode.
    pub fn is_configured(&self) -> bool {
        self.host.as_deref().is_some_and(|v| !v.is_empty())
            && self.user.as_deref().is_some_and(|v| !v.is_empty())
            && self.password.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
}

impl TwilioConfig {
    pub fn is_configured(&self) -> bool {
        self.account_sid.as_deref().is_some_and(|v| !v.is_empty())
            && self.auth_token.as_deref().is_some_and(|v| !v.is_empty())
            && self.from_number.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        self.bot_token.as_deref().is_some_and(|v| !v.is_empty())
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let max_attempts: u32 = env::var("MAX_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("MAX_RETRY_ATTEMPTS".to_string()))?;
        let max_attempts = max_attempts.clamp(1, 10);

        let backoff_base: f64 = env::var("RETRY_BACKOFF_BASE")
            .unwrap_or_else(|_| "2.0".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("RETRY_BACKOFF_BASE".to_string()))?;
        if backoff_base < 1.0 {
            return Err(ConfigError::InvalidValue("RETRY_BACKOFF_BASE".to_string()));
        }

        Ok(Config {
            server: ServerConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("API_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("API_PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/cascade-notify.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            queue: QueueConfig {
                url: env::var("QUEUE_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
                stream_name: env::var("QUEUE_STREAM_NAME")
                    .unwrap_or_else(|_| "notification:retry".to_string()),
                consumer_group: env::var("QUEUE_CONSUMER_GROUP")
                    .unwrap_or_else(|_| "notification-workers".to_string()),
            },
            retry: RetryConfig {
                max_attempts,
                backoff_base,
            },
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST").ok(),
                port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .unwrap_or(587),
                user: env::var("SMTP_USER").ok(),
                password: env::var("SMTP_PASSWORD").ok(),
                from: env::var("SMTP_FROM").ok(),
                use_tls: match env::var("SMTP_USE_TLS") {
                    Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
                    Err(_) => true,
                },
            },
            twilio: TwilioConfig {
                account_sid: env::var("TWILIO_ACCOUNT_SID").ok(),
                auth_token: env::var("TWILIO_AUTH_TOKEN").ok(),
                from_number: env::var("TWILIO_FROM_NUMBER").ok(),
            },
            telegram: TelegramConfig {
                bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/cascade-notify.db".to_string(),
                max_connections: 5,
            },
            queue: QueueConfig {
                url: "redis://127.0.0.1:6379".to_string(),
                stream_name: "notification:retry".to_string(),
                consumer_group: "notification-workers".to_string(),
            },
            retry: RetryConfig {
                max_attempts: 3,
                backoff_base: 2.0,
            },
            smtp: SmtpConfig {
                host: None,
                port: 587,
                user: None,
                password: None,
                from: None,
                use_tls: true,
            },
            twilio: TwilioConfig {
                account_sid: None,
                auth_token: None,
                from_number: None,
            },
            telegram: TelegramConfig { bot_token: None },
            log_level: "info".to_string(),
        }
    }
}
