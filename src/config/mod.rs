use crate::error::RelayError;
use dashmap::DashMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const ENVIRONMENT: &str = "RELAY_ENVIRONMENT";
pub const ACCESS_TOKEN: &str = "RELAY_ACCESS_TOKEN";
pub const CODE_VERSION: &str = "RELAY_CODE_VERSION";
pub const HOST: &str = "RELAY_HOST";
pub const QUEUE_CAPACITY: &str = "RELAY_QUEUE_CAPACITY";
pub const MAX_ATTEMPTS: &str = "RELAY_MAX_ATTEMPTS";
pub const RETRY_DELAY_MS: &str = "RELAY_RETRY_DELAY_MS";

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every environment variable
    pub fn from_env() -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config
            .get(key)
            .map(|v| v.clone())
            .filter(|v| !v.trim().is_empty())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Parse a value, falling back to `default` when the key is unset
    pub fn get_parsed<T>(&self, key: &str, default: T) -> crate::Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| RelayError::config(key, format!("{:?}: {}", raw, e))),
            None => Ok(default),
        }
    }
}

/// Settings for the relay and its delivery worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    pub environment: String,
    pub access_token: Option<String>,
    pub code_version: Option<String>,
    pub host: Option<String>,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            access_token: None,
            code_version: None,
            host: None,
            queue_capacity: 1024,
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> crate::Result<Self> {
        Self::from_config(&ConfigService::from_env())
    }

    pub fn from_config(config: &ConfigService) -> crate::Result<Self> {
        let defaults = Self::default();

        let queue_capacity = config.get_parsed(QUEUE_CAPACITY, defaults.queue_capacity)?;
        if queue_capacity == 0 {
            return Err(RelayError::config(QUEUE_CAPACITY, "must be greater than zero"));
        }

        let max_attempts = config.get_parsed(MAX_ATTEMPTS, defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(RelayError::config(MAX_ATTEMPTS, "must be greater than zero"));
        }

        let retry_delay_ms = config.get_parsed(RETRY_DELAY_MS, 500u64)?;

        Ok(Self {
            environment: config.get(ENVIRONMENT).unwrap_or(defaults.environment),
            access_token: config.get(ACCESS_TOKEN),
            code_version: config.get(CODE_VERSION),
            host: config.get(HOST).or_else(|| config.get("HOSTNAME")),
            queue_capacity,
            max_attempts,
            retry_delay: Duration::from_millis(retry_delay_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(pairs: &[(&str, &str)]) -> ConfigService {
        let service = ConfigService::new();
        for (key, value) in pairs {
            service.set(key, value);
        }
        service
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_config(&ConfigService::new()).unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_reads_values() {
        let config = RelayConfig::from_config(&service(&[
            (ENVIRONMENT, "production"),
            (ACCESS_TOKEN, "secret"),
            (CODE_VERSION, "abc1234"),
            ("HOSTNAME", "web-1"),
            (QUEUE_CAPACITY, " 16 "),
            (MAX_ATTEMPTS, "5"),
            (RETRY_DELAY_MS, "0"),
        ]))
        .unwrap();

        assert_eq!(config.environment, "production");
        assert_eq!(config.access_token.as_deref(), Some("secret"));
        assert_eq!(config.code_version.as_deref(), Some("abc1234"));
        assert_eq!(config.host.as_deref(), Some("web-1"));
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_delay, Duration::ZERO);
    }

    #[test]
    fn test_relay_host_wins_over_hostname() {
        let config =
            RelayConfig::from_config(&service(&[(HOST, "relay-host"), ("HOSTNAME", "web-1")]))
                .unwrap();
        assert_eq!(config.host.as_deref(), Some("relay-host"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = RelayConfig::from_config(&service(&[(ACCESS_TOKEN, "  ")])).unwrap();
        assert_eq!(config.access_token, None);
    }

    #[test]
    fn test_invalid_values() {
        let err = RelayConfig::from_config(&service(&[(QUEUE_CAPACITY, "lots")])).unwrap_err();
        assert!(matches!(err, RelayError::Config { ref key, .. } if key == QUEUE_CAPACITY));

        let err = RelayConfig::from_config(&service(&[(QUEUE_CAPACITY, "0")])).unwrap_err();
        assert!(matches!(err, RelayError::Config { .. }));

        let err = RelayConfig::from_config(&service(&[(MAX_ATTEMPTS, "0")])).unwrap_err();
        assert!(matches!(err, RelayError::Config { ref key, .. } if key == MAX_ATTEMPTS));
    }
}
