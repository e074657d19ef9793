use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Minimum length of the HMAC signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Accepted SESSION_TTL_HOURS values (up to 30 days)
const SESSION_TTL_HOURS: RangeInclusive<i64> = 1..=720;

/// Accepted API_KEY_TTL_DAYS values (up to 10 years)
const API_KEY_TTL_DAYS: RangeInclusive<i64> = 1..=3650;

/// Accepted REQUEST_TIMEOUT_SECS values
const REQUEST_TIMEOUT_SECS: RangeInclusive<u64> = 1..=300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("SECRET_KEY must be at least 32 bytes long (got {0})")]
    SecretTooShort(usize),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("DATABASE_URL is required in production")]
    DatabaseRequired,
}

/// Process-wide symmetric signing secret, validated once at startup
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort(secret.len()));
        }
        Ok(Self(secret))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// Never print the secret itself
impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret(<{} bytes>)", self.0.len())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub port: u16,
    /// Upper bound on the persistence work of one request
    pub request_timeout_secs: u64,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// None selects the in-process collaborators
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub secret: SigningSecret,
    pub session_ttl_hours: i64,
    pub api_key_ttl_days: i64,
    pub api_key_default_rate_limit: u32,
    pub cors_permissive: bool,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub default_limit_per_hour: u32,
    pub alert_every: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit_per_hour: 1000,
            alert_every: 100,
            sweep_interval_secs: 300,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// Fails when SECRET_KEY is absent or shorter than [`MIN_SECRET_LEN`]; the
    /// server must not start in that case.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = env::var("SECRET_KEY").map_err(|_| ConfigError::Missing("SECRET_KEY"))?;
        Self::from_lookup(secret, |name| env::var(name).ok())
    }

    /// Build from a secret and a variable lookup (env in production, a map in tests)
    pub fn from_lookup(
        secret: impl Into<Vec<u8>>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let secret = SigningSecret::new(secret)?;

        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        let mut config = Self::preset(environment, secret);
        config.apply_overrides(&lookup)?;

        if config.environment == Environment::Production && config.database.url.is_none() {
            return Err(ConfigError::DatabaseRequired);
        }

        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("W3ST_API_PORT").or_else(|| lookup("PORT")) {
            self.port = parse("PORT", &v)?;
        }

        if let Some(v) = lookup("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_within("REQUEST_TIMEOUT_SECS", &v, REQUEST_TIMEOUT_SECS)?;
        }

        if let Some(v) = lookup("DATABASE_URL") {
            if !v.trim().is_empty() {
                self.database.url = Some(v);
            }
        }
        if let Some(v) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse("DATABASE_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = parse("DATABASE_CONNECTION_TIMEOUT", &v)?;
        }

        if let Some(v) = lookup("SESSION_TTL_HOURS") {
            self.security.session_ttl_hours = parse_within("SESSION_TTL_HOURS", &v, SESSION_TTL_HOURS)?;
        }
        if let Some(v) = lookup("API_KEY_TTL_DAYS") {
            self.security.api_key_ttl_days = parse_within("API_KEY_TTL_DAYS", &v, API_KEY_TTL_DAYS)?;
        }
        if let Some(v) = lookup("API_KEY_DEFAULT_RATE_LIMIT") {
            self.security.api_key_default_rate_limit = parse("API_KEY_DEFAULT_RATE_LIMIT", &v)?;
        }

        if let Some(v) = lookup("RATE_LIMIT_DEFAULT_PER_HOUR") {
            self.rate_limit.default_limit_per_hour = parse("RATE_LIMIT_DEFAULT_PER_HOUR", &v)?;
        }
        if let Some(v) = lookup("RATE_LIMIT_ALERT_EVERY") {
            let every: u64 = parse("RATE_LIMIT_ALERT_EVERY", &v)?;
            if every == 0 {
                return Err(ConfigError::Invalid {
                    name: "RATE_LIMIT_ALERT_EVERY",
                    value: v,
                });
            }
            self.rate_limit.alert_every = every;
        }
        if let Some(v) = lookup("RATE_LIMIT_SWEEP_SECS") {
            self.rate_limit.sweep_interval_secs = parse("RATE_LIMIT_SWEEP_SECS", &v)?;
        }

        Ok(())
    }

    fn preset(environment: Environment, secret: SigningSecret) -> Self {
        let (max_connections, connection_timeout, cors_permissive) = match environment {
            Environment::Development => (10, 30, true),
            Environment::Staging => (20, 10, false),
            Environment::Production => (50, 5, false),
        };

        Self {
            environment,
            port: 3000,
            request_timeout_secs: 30,
            database: DatabaseConfig {
                url: None,
                max_connections,
                connection_timeout,
            },
            security: SecurityConfig {
                secret,
                session_ttl_hours: 24,
                api_key_ttl_days: 365,
                api_key_default_rate_limit: 1000,
                cors_permissive,
            },
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn parse_within<T>(name: &'static str, value: &str, range: RangeInclusive<T>) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd,
{
    let parsed: T = parse(name, value)?;
    if !range.contains(&parsed) {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn rejects_short_secret() {
        let err = AppConfig::from_lookup("too-short", lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::SecretTooShort(9));
    }

    #[test]
    fn development_defaults() {
        let config = AppConfig::from_lookup(SECRET, lookup(&[])).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.security.session_ttl_hours, 24);
        assert_eq!(config.security.api_key_ttl_days, 365);
        assert_eq!(config.rate_limit.default_limit_per_hour, 1000);
        assert_eq!(config.rate_limit.alert_every, 100);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn production_requires_database() {
        let err = AppConfig::from_lookup(SECRET, lookup(&[("APP_ENV", "production")])).unwrap_err();
        assert_eq!(err, ConfigError::DatabaseRequired);

        let config = AppConfig::from_lookup(
            SECRET,
            lookup(&[("APP_ENV", "production"), ("DATABASE_URL", "postgres://localhost/w3st")]),
        )
        .unwrap();
        assert_eq!(config.database.max_connections, 50);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(
            SECRET,
            lookup(&[("PORT", "8081"), ("RATE_LIMIT_DEFAULT_PER_HOUR", "50")]),
        )
        .unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.rate_limit.default_limit_per_hour, 50);

        let err = AppConfig::from_lookup(SECRET, lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }

    #[test]
    fn ttls_must_be_in_range() {
        let cases = [
            ("SESSION_TTL_HOURS", "0"),
            ("SESSION_TTL_HOURS", "-3"),
            ("SESSION_TTL_HOURS", "9223372036854775807"),
            ("API_KEY_TTL_DAYS", "0"),
            ("API_KEY_TTL_DAYS", "-1"),
            ("API_KEY_TTL_DAYS", "100000000000000"),
            ("REQUEST_TIMEOUT_SECS", "0"),
        ];
        for (name, value) in cases {
            let err = AppConfig::from_lookup(SECRET, lookup(&[(name, value)])).unwrap_err();
            assert_eq!(
                err,
                ConfigError::Invalid {
                    name,
                    value: value.to_string()
                }
            );
        }

        let config = AppConfig::from_lookup(
            SECRET,
            lookup(&[
                ("SESSION_TTL_HOURS", "720"),
                ("API_KEY_TTL_DAYS", "1"),
                ("REQUEST_TIMEOUT_SECS", "5"),
            ]),
        )
        .unwrap();
        assert_eq!(config.security.session_ttl_hours, 720);
        assert_eq!(config.security.api_key_ttl_days, 1);
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = SigningSecret::new(SECRET).unwrap();
        assert!(!format!("{:?}", secret).contains("0123"));
    }
}
