//! Client configuration.
//!
//! Settings are layered in increasing priority: built-in defaults, an
//! optional JSON config file, environment variables, then explicit
//! `with_*` overrides. A config is immutable once built; combining
//! settings always derives a fresh instance.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ParcError, Result};
use crate::protocol::constants::{
    CONNECT_RETRY_INTERVAL, CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_TIMEOUT,
    IDLE_DISCONNECT_TIMEOUT, STABLE_POWER_TIMEOUT,
};
use crate::protocol::model::model_by_name;

/// Environment variable overriding the host specifier.
pub const ENV_HOST: &str = "PARC_HOST";
/// Environment variable overriding the TCP port.
pub const ENV_PORT: &str = "PARC_PORT";
/// Environment variable overriding the password.
pub const ENV_PASSWORD: &str = "PARC_PASSWORD";

/// Resolved connection parameters for a receiver client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host specifier: `tcp://host[:port]`, bare `host[:port]`,
    /// `dp://` (discover any receiver), or `dp://<name>`.
    pub host: Option<String>,
    /// TCP control port used when the host specifier names none.
    pub port: u16,
    /// Handshake password; empty/absent means no password.
    pub password: Option<String>,
    /// Receiver model name, if known ahead of time.
    pub model: Option<String>,
    /// Per-operation timeout on a connected transport, in seconds.
    pub timeout_secs: f64,
    /// Idle time before a reconnecting transport drops its inner
    /// connection, in seconds.
    pub idle_disconnect_secs: f64,
    /// Overall connect deadline, in seconds.
    pub connect_timeout_secs: f64,
    /// Pause between connect retries while refused, in seconds.
    pub connect_retry_interval_secs: f64,
    /// How long to wait for warmup/cooldown to settle, in seconds.
    pub stable_power_timeout_secs: f64,
    /// Wrap connections in the reconnecting transport.
    pub auto_reconnect: bool,
    /// Consult the shared resolve cache for discovery-style hosts.
    pub use_resolve_cache: bool,
    /// Resolve cache entry lifetime in seconds; absent means entries
    /// never expire.
    pub resolve_cache_ttl_secs: Option<f64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            password: None,
            model: None,
            timeout_secs: DEFAULT_TIMEOUT.as_secs_f64(),
            idle_disconnect_secs: IDLE_DISCONNECT_TIMEOUT.as_secs_f64(),
            connect_timeout_secs: CONNECT_TIMEOUT.as_secs_f64(),
            connect_retry_interval_secs: CONNECT_RETRY_INTERVAL.as_secs_f64(),
            stable_power_timeout_secs: STABLE_POWER_TIMEOUT.as_secs_f64(),
            auto_reconnect: true,
            use_resolve_cache: true,
            resolve_cache_ttl_secs: None,
        }
    }
}

impl ClientConfig {
    /// Defaults, then the JSON config file (if given), then the
    /// environment.
    pub fn layered(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file over the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ParcError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ParcError::Config(format!("invalid config {}: {e}", path.display())))?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var(ENV_HOST)
            && !host.is_empty()
        {
            self.host = Some(host);
        }
        if let Ok(port) = std::env::var(ENV_PORT)
            && let Ok(port) = port.parse()
        {
            self.port = port;
        }
        if let Ok(password) = std::env::var(ENV_PASSWORD) {
            self.password = if password.is_empty() {
                None
            } else {
                Some(password)
            };
        }
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if let Some(model) = &self.model {
            model_by_name(model)?;
        }
        if self.timeout_secs <= 0.0 || self.connect_timeout_secs <= 0.0 {
            return Err(ParcError::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    // ── Derivation (explicit overrides, highest priority) ────────

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_idle_disconnect(mut self, idle: Duration) -> Self {
        self.idle_disconnect_secs = idle.as_secs_f64();
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    pub fn with_resolve_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.resolve_cache_ttl_secs = ttl.map(|t| t.as_secs_f64());
        self
    }

    // ── Duration accessors ───────────────────────────────────────

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    pub fn idle_disconnect(&self) -> Duration {
        Duration::from_secs_f64(self.idle_disconnect_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_secs)
    }

    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_secs_f64(self.connect_retry_interval_secs)
    }

    pub fn stable_power_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.stable_power_timeout_secs)
    }

    pub fn resolve_cache_ttl(&self) -> Option<Duration> {
        self.resolve_cache_ttl_secs.map(Duration::from_secs_f64)
    }

    /// The password bytes appended to the handshake request, if any.
    pub fn password_bytes(&self) -> Option<&[u8]> {
        self.password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| p.as_bytes())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_canonical() {
        let config = ClientConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert!(config.auto_reconnect);
        assert!(config.resolve_cache_ttl().is_none());
    }

    #[test]
    fn with_overrides_derive_fresh_instances() {
        let base = ClientConfig::default();
        let derived = base
            .clone()
            .with_host("tcp://10.0.0.5")
            .with_port(4444)
            .with_password(Some("secret".to_string()));
        assert_eq!(base.port, DEFAULT_PORT);
        assert_eq!(derived.port, 4444);
        assert_eq!(derived.host.as_deref(), Some("tcp://10.0.0.5"));
        assert_eq!(derived.password_bytes().unwrap(), b"secret");
    }

    #[test]
    fn empty_password_means_none() {
        let config = ClientConfig::default().with_password(Some(String::new()));
        assert!(config.password_bytes().is_none());
    }

    #[test]
    fn json_roundtrip_with_partial_file() {
        // A partial JSON document only overrides what it names.
        let parsed: ClientConfig =
            serde_json::from_str(r#"{"host": "dp://theater", "timeout_secs": 5.0}"#).unwrap();
        assert_eq!(parsed.host.as_deref(), Some("dp://theater"));
        assert_eq!(parsed.timeout(), Duration::from_secs(5));
        assert_eq!(parsed.port, DEFAULT_PORT);
    }

    #[test]
    fn validate_rejects_unknown_model() {
        let config = ClientConfig::default().with_model("DLA-NOPE");
        assert!(config.validate().is_err());

        let config = ClientConfig::default().with_model("DLA-NZ8");
        assert!(config.validate().is_ok());
    }
}
