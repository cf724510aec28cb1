//! Configuration loading for mqtt-gpio-monitor.
//!
//! Configuration is loaded from a TOML file (default: `mqtt-gpio-monitor.toml`).

use gpio_bridge::{ModuleKind, MqttSettings, PinNumbering, QosLevel, Will};
use gpio_core::{OutputPolarity, Pin, ReconnectPolicy};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "mqtt-gpio-monitor.toml";

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Longest accepted poll interval (one day).
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Root configuration for mqtt-gpio-monitor.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend selection and verbosity.
    pub global: GlobalConfig,
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// Monitored pins.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Header GPIO options.
    #[serde(default)]
    pub gpio: GpioConfig,
    /// Broker reconnection.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Global configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// I/O module driving the pins.
    pub module: ModuleKind,
    /// Log at DEBUG instead of INFO.
    #[serde(default)]
    pub debug: bool,
}

/// Broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Broker host (default: localhost).
    #[serde(default = "default_host")]
    pub host: String,
    /// Broker port (default: 1883).
    #[serde(default = "default_port")]
    pub port: u16,
    /// User name; empty means anonymous.
    #[serde(default)]
    pub username: String,
    /// Password, only sent with a user name.
    #[serde(default)]
    pub password: String,
    /// Client id; empty derives one from the process id.
    #[serde(default)]
    pub client_id: String,
    /// Base topic for pin traffic.
    pub topic: String,
    /// QoS for command subscription and pin publishes (0-2).
    #[serde(default)]
    pub qos: u8,
    /// Retain flag for pin publishes.
    #[serde(default)]
    pub retain: bool,
    /// Ask the broker for a clean session.
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// Presence (last will) topic.
    pub lwt: String,
    /// Keep-alive interval in seconds (default: 60).
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

/// Pin monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Comma-separated pin numbers.
    #[serde(default)]
    pub pins: String,
    /// Poll interval in seconds (default: 0.1).
    #[serde(default = "default_poll")]
    pub poll: f64,
    /// Topic that triggers a republish of every pin; empty disables it.
    #[serde(default)]
    pub refresh: String,
}

/// Header GPIO configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GpioConfig {
    /// How pin numbers in `monitor.pins` are interpreted.
    #[serde(default)]
    pub numbering: PinNumbering,
    /// Whether a command `1` drives the line low. Defaults per module.
    pub active_low_outputs: Option<bool>,
}

/// Reconnection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// First retry delay in seconds (default: 1).
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    /// Longest retry delay in seconds (default: 30).
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

// Default value functions
fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_clean_session() -> bool {
    true
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_poll() -> f64 {
    0.1
}

fn default_initial_delay_secs() -> u64 {
    1
}

fn default_max_delay_secs() -> u64 {
    30
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pins: String::new(),
            poll: default_poll(),
            refresh: String::new(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check values the TOML types cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.qos()?;
        self.poll_interval()?;
        if self.mqtt.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.topic must not be empty".into()));
        }
        if self.mqtt.lwt.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.lwt must not be empty".into()));
        }
        self.pins()?;
        Ok(())
    }

    /// Monitored pins, in configured order.
    pub fn pins(&self) -> Result<Vec<Pin>, ConfigError> {
        let pins = Pin::parse_list(&self.monitor.pins)
            .map_err(|e| ConfigError::Invalid(format!("monitor.pins: {e}")))?;

        let mut seen = HashSet::new();
        if let Some(pin) = pins.iter().find(|pin| !seen.insert(**pin)) {
            return Err(ConfigError::Invalid(format!(
                "monitor.pins: pin {pin} is listed more than once"
            )));
        }
        Ok(pins)
    }

    /// QoS for command subscription and pin publishes.
    pub fn qos(&self) -> Result<QosLevel, ConfigError> {
        QosLevel::try_from(self.mqtt.qos)
            .map_err(|qos| ConfigError::Invalid(format!("mqtt.qos must be 0, 1 or 2, got {qos}")))
    }

    /// Time between poll ticks, within [`MIN_POLL_INTERVAL`] and
    /// [`MAX_POLL_INTERVAL`].
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.monitor.poll)
            .ok()
            .filter(|interval| (MIN_POLL_INTERVAL..=MAX_POLL_INTERVAL).contains(interval))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "monitor.poll must be between {} and {} seconds, got {}",
                    MIN_POLL_INTERVAL.as_secs_f64(),
                    MAX_POLL_INTERVAL.as_secs_f64(),
                    self.monitor.poll
                ))
            })
    }

    /// Refresh topic, if one is configured.
    pub fn refresh_topic(&self) -> Option<&str> {
        Some(self.monitor.refresh.trim()).filter(|topic| !topic.is_empty())
    }

    /// Output wiring of the configured module.
    pub fn polarity(&self) -> OutputPolarity {
        let active_low = self
            .gpio
            .active_low_outputs
            .unwrap_or_else(|| self.global.module.default_active_low());
        if active_low {
            OutputPolarity::ActiveLow
        } else {
            OutputPolarity::ActiveHigh
        }
    }

    /// Broker connection settings, with the offline payload as last will.
    ///
    /// An empty client id is replaced by `mqtt-gpio-monitor_<pid>`, which
    /// forces a clean session since the id is not stable across restarts.
    pub fn mqtt_settings(&self, offline_payload: &str) -> MqttSettings {
        let mqtt = &self.mqtt;
        let (client_id, clean_session) = if mqtt.client_id.trim().is_empty() {
            (format!("mqtt-gpio-monitor_{}", std::process::id()), true)
        } else {
            (mqtt.client_id.clone(), mqtt.clean_session)
        };
        let username = Some(mqtt.username.clone()).filter(|name| !name.is_empty());
        let password = username.as_ref().map(|_| mqtt.password.clone());

        MqttSettings {
            host: mqtt.host.clone(),
            port: mqtt.port,
            client_id,
            username,
            password,
            clean_session,
            keep_alive: Duration::from_secs(mqtt.keep_alive_secs),
            will: Will {
                topic: mqtt.lwt.clone(),
                payload: offline_payload.to_string(),
                qos: QosLevel::AtMostOnce,
                retain: true,
            },
            reconnect: ReconnectPolicy::from_secs(
                self.reconnect.initial_delay_secs,
                self.reconnect.max_delay_secs,
            ),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[global]
module = "gpio"

[mqtt]
topic = "home/gpio"
lwt = "clients/gpio"
"#;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn minimal_config_takes_defaults() {
        let config = parse(MINIMAL);

        assert_eq!(config.global.module, ModuleKind::Gpio);
        assert!(!config.global.debug);
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.qos, 0);
        assert!(config.mqtt.clean_session);
        assert_eq!(config.mqtt.keep_alive_secs, 60);
        assert_eq!(config.monitor.poll, 0.1);
        assert_eq!(config.gpio.numbering, PinNumbering::Board);
        assert_eq!(config.reconnect.initial_delay_secs, 1);
        assert_eq!(config.reconnect.max_delay_secs, 30);
        assert!(config.pins().unwrap().is_empty());
        assert!(config.refresh_topic().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn full_config_parses() {
        let config = parse(
            r#"
[global]
module = "pfio"
debug = true

[mqtt]
host = "broker.lan"
port = 8883
username = "bridge"
password = "secret"
client_id = "garage"
topic = "garage/io"
qos = 1
retain = true
clean_session = false
lwt = "clients/garage"

[monitor]
pins = "0, 1,2"
poll = 0.5
refresh = "garage/io/refresh"

[gpio]
numbering = "bcm"
"#,
        );

        config.validate().unwrap();
        assert_eq!(config.global.module, ModuleKind::Pfio);
        assert_eq!(config.qos().unwrap(), QosLevel::AtLeastOnce);
        assert_eq!(config.poll_interval().unwrap(), Duration::from_millis(500));
        assert_eq!(config.refresh_topic(), Some("garage/io/refresh"));
        assert_eq!(config.pins().unwrap(), vec![Pin::new(0), Pin::new(1), Pin::new(2)]);
        assert_eq!(config.polarity(), OutputPolarity::ActiveHigh);

        let settings = config.mqtt_settings("0");
        assert_eq!(settings.client_id, "garage");
        assert!(!settings.clean_session);
        assert_eq!(settings.username.as_deref(), Some("bridge"));
        assert_eq!(settings.password.as_deref(), Some("secret"));
        assert_eq!(settings.port, 8883);
    }

    #[test]
    fn unknown_module_is_rejected() {
        let result: Result<Config, _> = toml::from_str(
            r#"
[global]
module = "arduino"

[mqtt]
topic = "t"
lwt = "l"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_topic_is_rejected() {
        let result: Result<Config, _> = toml::from_str(
            r#"
[global]
module = "gpio"

[mqtt]
lwt = "l"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn polarity_defaults_per_module_and_can_be_overridden() {
        let gpio = parse(MINIMAL);
        assert_eq!(gpio.polarity(), OutputPolarity::ActiveLow);

        let overridden = parse(&format!("{MINIMAL}\n[gpio]\nactive_low_outputs = false\n"));
        assert_eq!(overridden.polarity(), OutputPolarity::ActiveHigh);
    }

    #[test]
    fn empty_client_id_derives_one_and_forces_clean_session() {
        let mut config = parse(MINIMAL);
        config.mqtt.clean_session = false;

        let settings = config.mqtt_settings("0");

        assert_eq!(
            settings.client_id,
            format!("mqtt-gpio-monitor_{}", std::process::id())
        );
        assert!(settings.clean_session);
        assert!(settings.username.is_none());
        assert!(settings.password.is_none());
    }

    #[test]
    fn last_will_is_retained_offline_payload() {
        let settings = parse(MINIMAL).mqtt_settings("0");
        assert_eq!(settings.will.topic, "clients/gpio");
        assert_eq!(settings.will.payload, "0");
        assert!(settings.will.retain);
        assert_eq!(settings.will.qos, QosLevel::AtMostOnce);
    }

    #[test]
    fn invalid_qos_fails_validation() {
        let mut config = parse(MINIMAL);
        config.mqtt.qos = 3;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn out_of_range_poll_fails_validation() {
        for poll in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e-10, 0.0005, 86_401.0, 1e300] {
            let mut config = parse(MINIMAL);
            config.monitor.poll = poll;
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn poll_interval_bounds_are_accepted() {
        let mut config = parse(MINIMAL);
        config.monitor.poll = 0.001;
        config.validate().unwrap();
        assert_eq!(config.poll_interval().unwrap(), MIN_POLL_INTERVAL);

        config.monitor.poll = 86_400.0;
        config.validate().unwrap();
        assert_eq!(config.poll_interval().unwrap(), MAX_POLL_INTERVAL);
    }

    #[test]
    fn bad_pin_lists_fail_validation() {
        for pins in ["17, x", "17, 300", "17, 18, 17"] {
            let mut config = parse(MINIMAL);
            config.monitor.pins = pins.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{pins:?} should be rejected"
            );
        }
    }

    #[test]
    fn blank_topics_fail_validation() {
        let mut config = parse(MINIMAL);
        config.mqtt.lwt = "  ".into();
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.mqtt.topic = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.mqtt.topic, "home/gpio");
    }

    #[test]
    fn from_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[global\nmodule = ").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
