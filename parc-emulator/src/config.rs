//! Configuration for the emulator daemon.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use parc_core::discovery::ServerOptions;
use parc_core::emulator::{EmulatorOptions, EMULATOR_WARMUP_TIME};
use parc_core::protocol::constants::DEFAULT_PORT;
use parc_core::protocol::model::DEFAULT_EMULATOR_MODEL;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Receiver settings.
    pub receiver: ReceiverConfig,
    /// Network settings.
    pub network: NetworkConfig,
    /// Discovery settings.
    pub discovery: DiscoveryConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// What kind of receiver to pretend to be.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Emulated model name.
    pub model: String,
    /// Handshake password; empty disables authentication.
    pub password: String,
    /// Power status at startup: "Standby", "On", etc.
    pub initial_power: String,
    /// Warmup time in seconds.
    pub warmup_secs: f64,
    /// Cooldown time in seconds.
    pub cooldown_secs: f64,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to listen on.
    pub bind: IpAddr,
    /// TCP control port.
    pub port: u16,
}

/// Discovery presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Answer searches and advertise on the discovery port.
    pub enabled: bool,
    /// Device name announced in advertisements.
    pub device_name: String,
    /// Serial number announced in advertisements.
    pub serial_number: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            receiver: ReceiverConfig::default(),
            network: NetworkConfig::default(),
            discovery: DiscoveryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMULATOR_MODEL.to_string(),
            password: String::new(),
            initial_power: "Standby".to_string(),
            warmup_secs: EMULATOR_WARMUP_TIME.as_secs_f64(),
            cooldown_secs: EMULATOR_WARMUP_TIME.as_secs_f64(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device_name: "AVMSIM".to_string(),
            serial_number: "1234567890".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl EmulatorConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Translate into the library's emulator options.
    pub fn to_options(&self) -> EmulatorOptions {
        EmulatorOptions {
            model: self.receiver.model.clone(),
            password: Some(self.receiver.password.clone()).filter(|p| !p.is_empty()),
            bind: (self.network.bind, self.network.port).into(),
            initial_power: self.receiver.initial_power.clone(),
            warmup_time: Duration::from_secs_f64(self.receiver.warmup_secs),
            cooldown_time: Duration::from_secs_f64(self.receiver.cooldown_secs),
            discovery: self.discovery.enabled.then(|| ServerOptions {
                device_name: self.discovery.device_name.clone(),
                serial_number: self.discovery.serial_number.clone(),
                ..ServerOptions::default()
            }),
            ..EmulatorOptions::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = EmulatorConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("model"));
        assert!(text.contains("port"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = EmulatorConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: EmulatorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, DEFAULT_PORT);
        assert_eq!(parsed.receiver.model, DEFAULT_EMULATOR_MODEL);
    }

    #[test]
    fn empty_password_disables_auth() {
        let cfg = EmulatorConfig::default();
        assert!(cfg.to_options().password.is_none());

        let mut cfg = EmulatorConfig::default();
        cfg.receiver.password = "secret".to_string();
        assert_eq!(cfg.to_options().password.as_deref(), Some("secret"));
    }

    #[test]
    fn discovery_disabled_by_default() {
        assert!(EmulatorConfig::default().to_options().discovery.is_none());
    }
}
