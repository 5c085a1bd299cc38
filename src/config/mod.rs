use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment {}", other)),
        }
    }
}

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub server_host: String,
    pub server_port: u16,
    pub redis_url: String,
    pub database_url: Option<String>,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max: u32,
    pub cache_ttl_prices_secs: u64,
    pub cache_ttl_routes_secs: u64,
    pub cache_ttl_user_profile_secs: u64,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("NODE_ENV")
            .or_else(|| lookup("APP_ENV"))
            .map(|v| parse_value::<Environment>("NODE_ENV", v))
            .transpose()?
            .unwrap_or(Environment::Development);

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(ConfigError::Invalid {
                var: "LOG_LEVEL",
                value: log_level,
                reason: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }

        let rate_limit_window_ms = optional(&lookup, "RATE_LIMIT_WINDOW", 60_000u64)?;
        if rate_limit_window_ms == 0 {
            return Err(positive("RATE_LIMIT_WINDOW", rate_limit_window_ms));
        }
        let rate_limit_max = optional(&lookup, "RATE_LIMIT_MAX", 100u32)?;
        if rate_limit_max == 0 {
            return Err(positive("RATE_LIMIT_MAX", rate_limit_max));
        }

        Ok(Config {
            environment,
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: optional(&lookup, "PORT", 3000u16)?,
            redis_url: lookup("REDIS_URL").ok_or(ConfigError::Missing("REDIS_URL"))?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            rate_limit_window_ms,
            rate_limit_max,
            cache_ttl_prices_secs: optional(&lookup, "CACHE_TTL_PRICES", 14_400u64)?,
            cache_ttl_routes_secs: optional(&lookup, "CACHE_TTL_ROUTES", 86_400u64)?,
            cache_ttl_user_profile_secs: optional(&lookup, "CACHE_TTL_USER_PROFILE", 3_600u64)?,
            log_level,
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn parse_value<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value,
    })
}

fn optional<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(value) => parse_value(var, value),
        None => Ok(default),
    }
}

fn positive<T: ToString>(var: &'static str, value: T) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: "must be greater than zero".to_string(),
    }
}
