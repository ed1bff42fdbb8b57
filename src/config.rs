//! Client configuration parsed from environment variables.

use std::time::Duration;

use envelopes::Role;

use crate::backoff::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_MAX_RECONNECT_ATTEMPTS, ReconnectPolicy};

pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:3000";
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("relay address is empty")]
    EmptyUrl,
    #[error("unsupported relay address scheme `{0}` (expected ws, wss, http or https)")]
    UnsupportedScheme(String),
    #[error("invalid RELAY_ROLE: {0}")]
    InvalidRole(#[from] envelopes::CodecError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Normalized `ws://` or `wss://` address of the relay.
    pub url: String,
    pub role: Role,
    /// How long `connect` waits for the relay's `registered` acknowledgement.
    pub registration_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl RelayConfig {
    /// Config for `role` at `url` with default timeout and reconnect policy.
    ///
    /// # Errors
    ///
    /// Returns an error when `url` is empty or uses an unsupported scheme.
    pub fn new(url: &str, role: Role) -> Result<Self, ConfigError> {
        Ok(Self {
            url: normalize_url(url)?,
            role,
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `RELAY_URL`: default `ws://127.0.0.1:3000`; bare `host:port` gets `ws://`
    /// - `RELAY_ROLE`: `web`/`requester` (default) or `app`/`worker`
    /// - `RELAY_REGISTRATION_TIMEOUT_MS`: default 5000
    /// - `RELAY_MAX_RECONNECT_ATTEMPTS`: default 10
    /// - `RELAY_BACKOFF_BASE_MS`: default 1000
    /// - `RELAY_BACKOFF_CAP_MS`: default 30000
    ///
    /// # Errors
    ///
    /// Returns an error for an unusable `RELAY_URL` or unknown `RELAY_ROLE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unusable `RELAY_URL` or unknown `RELAY_ROLE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("RELAY_URL").unwrap_or_else(|| DEFAULT_RELAY_URL.to_owned());
        let role = match lookup("RELAY_ROLE") {
            Some(raw) => raw.parse::<Role>()?,
            None => Role::Requester,
        };
        let registration_timeout = Duration::from_millis(parse_or(
            &lookup,
            "RELAY_REGISTRATION_TIMEOUT_MS",
            millis(DEFAULT_REGISTRATION_TIMEOUT),
        ));
        let reconnect = ReconnectPolicy {
            max_attempts: parse_or(&lookup, "RELAY_MAX_RECONNECT_ATTEMPTS", DEFAULT_MAX_RECONNECT_ATTEMPTS),
            base_delay: Duration::from_millis(parse_or(&lookup, "RELAY_BACKOFF_BASE_MS", millis(DEFAULT_BACKOFF_BASE))),
            max_delay: Duration::from_millis(parse_or(&lookup, "RELAY_BACKOFF_CAP_MS", millis(DEFAULT_BACKOFF_CAP))),
        };

        Ok(Self { url: normalize_url(&url)?, role, registration_timeout, reconnect })
    }
}

/// Normalize a relay address into a websocket URL.
///
/// `ws://` and `wss://` pass through, `http(s)://` maps to `ws(s)://`, and a
/// bare `host:port` is treated as plain `ws://`.
///
/// # Errors
///
/// Returns an error for an empty address or a non-websocket scheme.
pub fn normalize_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyUrl);
    }

    if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        return Ok(trimmed.to_owned());
    }
    if let Some(rest) = trimmed.strip_prefix("http://") {
        return Ok(format!("ws://{rest}"));
    }
    if let Some(rest) = trimmed.strip_prefix("https://") {
        return Ok(format!("wss://{rest}"));
    }
    if let Some((scheme, _)) = trimmed.split_once("://") {
        return Err(ConfigError::UnsupportedScheme(scheme.to_owned()));
    }

    Ok(format!("ws://{trimmed}"))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
