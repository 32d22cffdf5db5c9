//! Configuration
//!
//! Read from `config.yml`, then overridden by `NEURON_<SECTION>_<KEY>`
//! environment variables. Every section and key is optional; whatever is
//! missing takes the default below.
//!
//! ```yaml
//! server:
//!   port: 8000
//! database:
//!   driver: sqlite
//!   url: data/neuron.db
//! blog:
//!   posts_per_page: 5
//!   site_url: https://neuron.example.com
//! security:
//!   secret_key: change-me
//! admin:
//!   username: admin
//!   email: admin@example.com
//!   password: change-me-too
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub blog: BlogConfig,
    pub security: SecurityConfig,
    pub smtp: SmtpConfig,
    /// Superuser created when the user table is empty
    pub admin: Option<AdminConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin; sessions travel in cookies so it cannot be `*`
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: DatabaseDriver,
    /// File path or `sqlite:` URL for SQLite, `mysql://` URL for MySQL
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: "data/neuron.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

impl FromStr for DatabaseDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "mysql" => Ok(Self::Mysql),
            other => Err(ConfigError::ValidationError(format!(
                "unknown database driver: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub driver: CacheDriver,
    /// Required by the redis driver
    pub redis_url: Option<String>,
    /// Upper bound on the lifetime of any cached entry
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    #[default]
    Memory,
    Redis,
}

impl FromStr for CacheDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::ValidationError(format!(
                "unknown cache driver: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogConfig {
    /// Page size of every paginated list
    pub posts_per_page: u32,
    pub session_days: i64,
    /// Public base URL, used to build activation links
    pub site_url: String,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            posts_per_page: 5,
            session_days: 7,
            site_url: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HMAC key for activation links. Empty means a random per-process key.
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// When false, mails are written to the log instead of being sent
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    /// Recipient of feedback mails
    pub admin_email: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: "noreply@localhost".to_string(),
            admin_email: "admin@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Parse `path`. A missing or blank file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::FileRead {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: describe_yaml_error(&e),
        })
    }

    /// [`Config::load`], then the process environment, then [`Config::validate`]
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        if config.ensure_secret_key() {
            tracing::warn!(
                "security.secret_key is not set; using a random key, \
                 activation links will stop working after a restart"
            );
        }
        config.validate()?;
        Ok(config)
    }

    /// Fill an unset secret key with 244 random bits. Returns whether it did.
    pub fn ensure_secret_key(&mut self) -> bool {
        if !self.security.secret_key.trim().is_empty() {
            return false;
        }
        self.security.secret_key = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        true
    }

    /// Reject configurations the server cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problem = if self.blog.posts_per_page == 0 {
            "blog.posts_per_page must be greater than zero"
        } else if self.blog.session_days <= 0 {
            "blog.session_days must be greater than zero"
        } else if self.security.secret_key.trim().is_empty() {
            "security.secret_key must not be empty"
        } else {
            return Ok(());
        };
        Err(ConfigError::ValidationError(problem.to_string()))
    }

    /// Override keys from `NEURON_<SECTION>_<KEY>` variables looked up through
    /// `var`. Values that do not parse are ignored.
    ///
    /// The admin account is only taken from the environment when username,
    /// email and password are all set.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let text = |key: &str, target: &mut String| {
            if let Some(value) = var(key) {
                *target = value;
            }
        };
        text("NEURON_SERVER_HOST", &mut self.server.host);
        text("NEURON_SERVER_CORS_ORIGIN", &mut self.server.cors_origin);
        text("NEURON_DATABASE_URL", &mut self.database.url);
        text("NEURON_BLOG_SITE_URL", &mut self.blog.site_url);
        text("NEURON_SECURITY_SECRET_KEY", &mut self.security.secret_key);
        text("NEURON_SMTP_HOST", &mut self.smtp.host);
        text("NEURON_SMTP_USERNAME", &mut self.smtp.username);
        text("NEURON_SMTP_PASSWORD", &mut self.smtp.password);
        text("NEURON_SMTP_FROM", &mut self.smtp.from);
        text("NEURON_SMTP_ADMIN_EMAIL", &mut self.smtp.admin_email);

        parse_into(&var, "NEURON_SERVER_PORT", &mut self.server.port);
        parse_into(&var, "NEURON_DATABASE_DRIVER", &mut self.database.driver);
        parse_into(&var, "NEURON_CACHE_DRIVER", &mut self.cache.driver);
        parse_into(&var, "NEURON_CACHE_TTL_SECONDS", &mut self.cache.ttl_seconds);
        parse_into(&var, "NEURON_BLOG_POSTS_PER_PAGE", &mut self.blog.posts_per_page);
        parse_into(&var, "NEURON_BLOG_SESSION_DAYS", &mut self.blog.session_days);
        parse_into(&var, "NEURON_SMTP_ENABLED", &mut self.smtp.enabled);
        parse_into(&var, "NEURON_SMTP_PORT", &mut self.smtp.port);

        if let Some(url) = var("NEURON_CACHE_REDIS_URL") {
            self.cache.redis_url = Some(url);
        }

        if let (Some(username), Some(email), Some(password)) = (
            var("NEURON_ADMIN_USERNAME"),
            var("NEURON_ADMIN_EMAIL"),
            var("NEURON_ADMIN_PASSWORD"),
        ) {
            self.admin = Some(AdminConfig {
                username,
                email,
                password,
            });
        }
    }
}

fn parse_into<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(value) = var(key).and_then(|v| v.trim().parse().ok()) {
        *target = value;
    }
}

/// serde_yaml message prefixed with the line and column when known
fn describe_yaml_error(e: &serde_yaml::Error) -> String {
    match e.location() {
        Some(at) => format!("at line {}, column {}: {}", at.line(), at.column(), e),
        None => e.to_string(),
    }
}
