// Application configuration
// Loads server, database, token and password settings from environment variables

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while assembling configuration at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allow_origins: Vec<String>,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// PostgreSQL connection and pool settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
    /// Full connection URL; takes precedence over the individual fields when set
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Deadline applied to every store query
    pub query_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Assemble connection options from the configured fields
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url).map_err(|_| ConfigError::Invalid {
                key: "DATABASE_URL",
                value: "<redacted>".to_string(),
            });
        }

        let ssl_mode = PgSslMode::from_str(&self.ssl_mode).map_err(|_| ConfigError::Invalid {
            key: "DB_SSLMODE",
            value: self.ssl_mode.clone(),
        })?;

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(ssl_mode))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Token signing settings
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_hours: i64,
}

/// Password policy and Argon2 work factors
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

/// Access tokens live at most one day
const ACCESS_TTL_MINUTES: RangeInclusive<i64> = 1..=1440;
/// Refresh sessions live at most one year
const REFRESH_TTL_HOURS: RangeInclusive<i64> = 1..=8760;
const TIMEOUT_SECS: RangeInclusive<u64> = 1..=300;
const SWEEP_INTERVAL_SECS: RangeInclusive<u64> = 1..=604_800;

/// Top-level configuration, constructed once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub session_sweep_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let defaults = PasswordConfig::default();

        let server = ServerConfig {
            host: get_or("HOST", "0.0.0.0"),
            port: parse_or(&get, "PORT", 8080)?,
            allow_origins: get_or("ALLOW_ORIGINS", "http://localhost:5173")
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
        };

        let url = get("DATABASE_URL");
        let password = get("DB_PASSWORD").unwrap_or_default();
        if url.is_none() && password.is_empty() {
            return Err(ConfigError::Missing("DB_PASSWORD"));
        }

        let database = DatabaseConfig {
            host: get_or("DB_HOST", "localhost"),
            port: parse_or(&get, "DB_PORT", 5432)?,
            user: get_or("DB_USER", "carepost"),
            password,
            name: get_or("DB_NAME", "carepost"),
            ssl_mode: get_or("DB_SSLMODE", "disable"),
            url,
            max_connections: parse_within(&get, "DB_MAX_CONNECTIONS", 25, 1..=1000)?,
            acquire_timeout_secs: parse_within(&get, "DB_ACQUIRE_TIMEOUT_SECS", 3, TIMEOUT_SECS)?,
            query_timeout_secs: parse_within(&get, "DB_QUERY_TIMEOUT_SECS", 5, TIMEOUT_SECS)?,
        };

        let jwt = JwtConfig {
            secret: get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            access_ttl_minutes: parse_within(&get, "JWT_ACCESS_TTL", 15, ACCESS_TTL_MINUTES)?,
            refresh_ttl_hours: parse_within(&get, "JWT_REFRESH_TTL", 168, REFRESH_TTL_HOURS)?,
        };

        let password = PasswordConfig {
            min_length: parse_or(&get, "PASSWORD_MIN_LENGTH", defaults.min_length)?,
            memory_kib: parse_or(&get, "PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&get, "PASSWORD_HASH_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(&get, "PASSWORD_HASH_PARALLELISM", defaults.parallelism)?,
        };

        Ok(Self {
            server,
            database,
            jwt,
            password,
            session_sweep_interval_secs: parse_within(
                &get,
                "SESSION_SWEEP_INTERVAL_SECS",
                3600,
                SWEEP_INTERVAL_SECS,
            )?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

/// Like `parse_or`, but values outside `range` are rejected
fn parse_within<T, G>(
    get: &G,
    key: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + ToString,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
    }
}
