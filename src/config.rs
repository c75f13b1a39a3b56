//! Driver configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/ob1.toml` by default)
//! 2. environment variables prefixed with `OB1_`, nested keys separated by
//!    `__` (e.g. `OB1_PORT__DEVICE=01C8453E`, `OB1_LOG__LEVEL=debug`)
//!
//! # Example
//! ```no_run
//! use elveflow_ob1::config::Ob1Config;
//!
//! let config = Ob1Config::load()?;
//! println!("port {} on device {}", config.port.name, config.port.device);
//! # Ok::<(), elveflow_ob1::Ob1Error>(())
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::channel::MAX_CHANNELS;
use crate::error::{Ob1Error, Result};
use crate::sdk::{FlowCalibration, SensorConfig, SensorResolution, SensorSignal, SensorType};

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/ob1.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ob1Config {
    /// The controller port
    pub port: PortConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// One OB1 controller bound to a host port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// Host port name
    #[serde(default = "default_port_name")]
    pub name: String,
    /// Vendor device identifier (as shown by the vendor tools)
    pub device: String,
    /// Logical channels in use, 1..=4
    #[serde(default = "default_channels")]
    pub channels: usize,
    /// Maximum wait for the device lock; unbounded when absent
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
    /// Sensors attached at startup
    #[serde(default)]
    pub sensors: Vec<SensorAssignment>,
}

/// A flow sensor fitted to a logical channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorAssignment {
    /// Logical channel (0-based)
    pub channel: usize,
    /// Vendor sensor type code
    pub sensor_type: SensorType,
    #[serde(default)]
    pub signal: SensorSignal,
    #[serde(default)]
    pub calibration: FlowCalibration,
    /// Digital resolution in bits, 9..=16
    #[serde(default = "default_resolution")]
    pub resolution: u8,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_port_name() -> String {
    "OB1".to_string()
}

fn default_channels() -> usize {
    MAX_CHANNELS
}

fn default_resolution() -> u8 {
    SensorResolution::BITS_16.bits()
}

fn default_log_level() -> String {
    "info".to_string()
}

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Ob1Config {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment, then validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("OB1_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let level = self.log.level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(Ob1Error::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.log.level,
                VALID_LEVELS.join(", ")
            )));
        }
        self.port.validate()
    }
}

impl PortConfig {
    /// Four-channel port named `OB1` with no sensors.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            name: default_port_name(),
            device: device.into(),
            channels: default_channels(),
            lock_timeout_ms: None,
            sensors: Vec::new(),
        }
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_sensor(mut self, channel: usize, sensor_type: SensorType) -> Self {
        self.sensors.push(SensorAssignment {
            channel,
            sensor_type,
            signal: SensorSignal::default(),
            calibration: FlowCalibration::default(),
            resolution: default_resolution(),
        });
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Device lock timeout, if bounded.
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Reject bad channel counts and sensor assignments.
    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(Ob1Error::Config("device identifier is empty".to_string()));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(Ob1Error::Config(format!(
                "channels must be 1..={}, got {}",
                MAX_CHANNELS, self.channels
            )));
        }
        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if sensor.channel >= self.channels {
                return Err(Ob1Error::Config(format!(
                    "sensor on channel {} but only {} channel(s) configured",
                    sensor.channel, self.channels
                )));
            }
            if !seen.insert(sensor.channel) {
                return Err(Ob1Error::Config(format!(
                    "duplicate sensor on channel {}",
                    sensor.channel
                )));
            }
            sensor.sensor_config()?;
        }
        Ok(())
    }
}

impl SensorAssignment {
    /// Vendor sensor description.
    pub fn sensor_config(&self) -> Result<SensorConfig> {
        let resolution = SensorResolution::from_bits(self.resolution).ok_or_else(|| {
            Ob1Error::Config(format!(
                "sensor resolution must be 9..=16 bits, got {}",
                self.resolution
            ))
        })?;
        Ok(SensorConfig {
            sensor_type: self.sensor_type,
            signal: self.signal,
            calibration: self.calibration,
            resolution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
            [port]
            name = "OB1-A"
            device = "01C8453E"
            channels = 2
            lock_timeout_ms = 500

            [[port.sensors]]
            channel = 1
            sensor_type = 7
            signal = "digital"
            calibration = "ipa"
            resolution = 12

            [log]
            level = "debug"
            format = "json"
            "#,
        );
        let config = Ob1Config::load_from(file.path()).unwrap();
        assert_eq!(config.port.name, "OB1-A");
        assert_eq!(config.port.channels, 2);
        assert_eq!(config.port.lock_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.log.format, LogFormat::Json);

        let sensor = config.port.sensors[0].sensor_config().unwrap();
        assert_eq!(sensor.sensor_type, SensorType::from_code(7).unwrap());
        assert_eq!(sensor.signal, SensorSignal::Digital);
        assert_eq!(sensor.calibration, FlowCalibration::Ipa);
        assert_eq!(sensor.resolution.bits(), 12);
    }

    #[test]
    fn test_defaults() {
        let file = write_config("[port]\ndevice = \"01C8453E\"\n");
        let config = Ob1Config::load_from(file.path()).unwrap();
        assert_eq!(config.port.name, "OB1");
        assert_eq!(config.port.channels, MAX_CHANNELS);
        assert!(config.port.lock_timeout().is_none());
        assert!(config.port.sensors.is_empty());
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Pretty);
    }

    #[test]
    fn test_rejects_bad_channel_counts() {
        for channels in [0, 5] {
            let port = PortConfig::new("dev").with_channels(channels);
            assert!(matches!(port.validate(), Err(Ob1Error::Config(_))));
        }
    }

    #[test]
    fn test_rejects_bad_sensors() {
        let outside = PortConfig::new("dev")
            .with_channels(2)
            .with_sensor(2, SensorType::FLOW_7_UL_MIN);
        assert!(outside.validate().is_err());

        let duplicate = PortConfig::new("dev")
            .with_sensor(0, SensorType::FLOW_7_UL_MIN)
            .with_sensor(0, SensorType::FLOW_80_UL_MIN);
        assert!(duplicate.validate().is_err());

        let mut resolution = PortConfig::new("dev").with_sensor(0, SensorType::FLOW_7_UL_MIN);
        resolution.sensors[0].resolution = 8;
        assert!(resolution.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let file = write_config("[port]\ndevice = \"dev\"\n[log]\nlevel = \"loud\"\n");
        assert!(matches!(
            Ob1Config::load_from(file.path()),
            Err(Ob1Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("ob1.toml", "[port]\ndevice = \"from-file\"\nchannels = 2\n")?;
            jail.set_env("OB1_PORT__DEVICE", "from-env");
            let config = Ob1Config::load_from("ob1.toml").unwrap();
            assert_eq!(config.port.device, "from-env");
            assert_eq!(config.port.channels, 2);
            Ok(())
        });
    }

    #[test]
    fn test_empty_device_is_rejected() {
        assert!(matches!(
            PortConfig::new("  ").validate(),
            Err(Ob1Error::Config(_))
        ));
    }
}
