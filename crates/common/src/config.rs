//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Token verification configuration.
    pub auth: AuthConfig,
    /// Outgoing email. Absent means email delivery is disabled.
    #[serde(default)]
    pub email: Option<EmailConfig>,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Instance metadata.
    #[serde(default)]
    pub instance: InstanceConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance, used in email links.
    pub public_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Bearer token verification.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the credential issuer.
    pub jwt_secret: String,
    /// Tokens issued longer ago than this are rejected.
    #[serde(default = "default_token_max_age")]
    pub token_max_age_secs: u64,
}

/// SMTP delivery settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Whether outgoing email is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// SMTP relay host.
    pub smtp_host: String,
    /// SMTP port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username.
    #[serde(default)]
    pub username: Option<String>,
    /// SMTP password.
    #[serde(default)]
    pub password: Option<String>,
    /// Sender address.
    pub from_address: String,
    /// Sender display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Instance metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Name shown in email subjects.
    #[serde(default = "default_instance_name")]
    pub name: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: default_instance_name(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_max_connections() -> u32 {
    50
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_token_max_age() -> u64 {
    60 * 60 * 12
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_true() -> bool {
    true
}

fn default_from_name() -> String {
    "CampusDesk".to_string()
}

fn default_instance_name() -> String {
    "CampusDesk".to_string()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `CAMPUSDESK_ENV`)
    /// 4. Environment variables with `CAMPUSDESK__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("CAMPUSDESK_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("CAMPUSDESK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("CAMPUSDESK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Whether outgoing email is configured and switched on.
    #[must_use]
    pub fn email_enabled(&self) -> bool {
        self.email.as_ref().is_some_and(|e| e.enabled)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [server]
            public_url = "https://desk.example.edu"

            [database]
            url = "postgres://localhost/campusdesk"

            [auth]
            jwt_secret = "secret"
            "#,
        );

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.token_max_age_secs, 43_200);
        assert!(config.email.is_none());
        assert!(!config.email_enabled());
        assert!(!config.logging.json);
        assert_eq!(config.instance.name, "CampusDesk");
    }

    #[test]
    fn test_email_section() {
        let config = parse(
            r#"
            [server]
            public_url = "https://desk.example.edu"

            [database]
            url = "postgres://localhost/campusdesk"

            [auth]
            jwt_secret = "secret"

            [email]
            smtp_host = "smtp.example.edu"
            from_address = "noreply@example.edu"
            "#,
        );

        let email = config.email.as_ref().unwrap();
        assert_eq!(email.smtp_port, 587);
        assert!(config.email_enabled());
    }
}
