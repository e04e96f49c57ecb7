use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// In-memory store when unset
    pub database_url: Option<String>,
    pub bind_address: String,
    pub settlement_interval_secs: u64,
    pub live_broadcast_interval_secs: u64,
    pub session_ttl_hours: i64,
    pub bootstrap_admin_email: Option<String>,
    /// Empty means permissive CORS
    pub cors_allowed_origins: Vec<String>,
    pub auth_rate_limit_per_minute: u32,
    pub db_max_connections: u32,
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &str, default: T) -> Result<T, config::ConfigError> {
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| config::ConfigError::Message(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config = Self {
            database_url: optional("DATABASE_URL"),
            bind_address: optional("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            settlement_interval_secs: parsed("SETTLEMENT_INTERVAL_SECS", 60)?,
            live_broadcast_interval_secs: parsed("LIVE_BROADCAST_INTERVAL_SECS", 30)?,
            session_ttl_hours: parsed("SESSION_TTL_HOURS", 24)?,
            bootstrap_admin_email: optional("BOOTSTRAP_ADMIN_EMAIL").map(|e| e.to_lowercase()),
            cors_allowed_origins: optional("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            auth_rate_limit_per_minute: parsed("AUTH_RATE_LIMIT_PER_MINUTE", 20)?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 20)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let positive = [
            ("SETTLEMENT_INTERVAL_SECS", self.settlement_interval_secs),
            ("LIVE_BROADCAST_INTERVAL_SECS", self.live_broadcast_interval_secs),
            ("AUTH_RATE_LIMIT_PER_MINUTE", self.auth_rate_limit_per_minute as u64),
            ("DB_MAX_CONNECTIONS", self.db_max_connections as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(config::ConfigError::Message(format!("{} must be greater than zero", key)));
            }
        }
        if self.session_ttl_hours <= 0 {
            return Err(config::ConfigError::Message(
                "SESSION_TTL_HOURS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn settlement_interval(&self) -> Duration {
        Duration::from_secs(self.settlement_interval_secs)
    }

    pub fn live_broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.live_broadcast_interval_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_address: "0.0.0.0:8080".to_string(),
            settlement_interval_secs: 60,
            live_broadcast_interval_secs: 30,
            session_ttl_hours: 24,
            bootstrap_admin_email: None,
            cors_allowed_origins: Vec::new(),
            auth_rate_limit_per_minute: 20,
            db_max_connections: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.settlement_interval(), Duration::from_secs(60));
        assert_eq!(config.session_ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = Config {
            settlement_interval_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            session_ttl_hours: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
