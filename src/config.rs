//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Session and onboarding configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on how long `loading` may stay true for one identity.
    pub reconcile_window: Duration,
    /// Timeout applied to the profile-creation call.
    pub submit_timeout: Duration,
    /// Port for the HTTP surface.
    pub http_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconcile_window: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(15),
            http_port: 8080,
        }
    }
}

impl SessionConfig {
    /// Build config from environment variables, falling back to defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let reconcile_window = match lookup("SESSION_RECONCILE_WINDOW_MS") {
            Some(raw) => parse_millis("SESSION_RECONCILE_WINDOW_MS", &raw)?,
            None => defaults.reconcile_window,
        };

        let submit_timeout = match lookup("SESSION_SUBMIT_TIMEOUT_MS") {
            Some(raw) => parse_millis("SESSION_SUBMIT_TIMEOUT_MS", &raw)?,
            None => defaults.submit_timeout,
        };

        let http_port = match lookup("SESSION_HTTP_PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "SESSION_HTTP_PORT".to_string(),
                message: format!("{e}"),
            })?,
            None => defaults.http_port,
        };

        Ok(Self {
            reconcile_window,
            submit_timeout,
            http_port,
        })
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let millis: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{e}"),
    })?;
    if millis == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}
