use antenna_controller::{LinkSettings, PositionReading, SoftLimits};
use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub antenna: AntennaConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntennaConfig {
    /// Serial device of the Carryout.
    pub port: String,
    pub baudrate: u32,
    /// Telemetry reads per move before the move is reported as failed.
    pub retry_attempts: usize,
    pub read_timeout_secs: f64,
    pub soft_limits: SoftLimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftLimitsConfig {
    pub azimuth_min: f64,
    pub azimuth_max: f64,
    pub elevation_min: f64,
    pub elevation_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    /// rotctld port Gpredict connects to.
    pub rotctld_port: u16,
    /// Status API port. The API is disabled when unset.
    pub api_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter, used when `RUST_LOG` is unset.
    pub level: String,
}

/// Values given on the command line. They win over the file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub baudrate: Option<u32>,
    pub listen_ip: Option<String>,
    pub listen_port: Option<u16>,
    pub api_port: Option<u16>,
}

impl Config {
    /// Load configuration from an optional TOML file, `CARRYOUT_*` environment
    /// variables (`CARRYOUT_ANTENNA__PORT=/dev/ttyUSB1`) and command line
    /// overrides, in increasing order of precedence.
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .set_default("antenna.port", "/dev/ttyUSB0")?
            .set_default("antenna.baudrate", 57600_i64)?
            .set_default("antenna.retry_attempts", 3_i64)?
            .set_default("antenna.read_timeout_secs", 1.0)?
            .set_default("antenna.soft_limits.azimuth_min", 0.0)?
            .set_default("antenna.soft_limits.azimuth_max", 360.0)?
            .set_default("antenna.soft_limits.elevation_min", 0.0)?
            .set_default("antenna.soft_limits.elevation_max", 90.0)?
            .set_default("network.host", "127.0.0.1")?
            .set_default("network.rotctld_port", 4533_i64)?
            .set_default("logging.level", "info")?
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("CARRYOUT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("antenna.port", overrides.port.clone())?
            .set_override_option("antenna.baudrate", overrides.baudrate.map(i64::from))?
            .set_override_option("network.host", overrides.listen_ip.clone())?
            .set_override_option("network.rotctld_port", overrides.listen_port.map(i64::from))?
            .set_override_option("network.api_port", overrides.api_port.map(i64::from))?
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.antenna.retry_attempts == 0 {
            return Err(ConfigError::Message(
                "antenna.retry_attempts must be at least 1".to_string(),
            ));
        }

        if !(self.antenna.read_timeout_secs > 0.0 && self.antenna.read_timeout_secs.is_finite()) {
            return Err(ConfigError::Message(
                "antenna.read_timeout_secs must be a positive number".to_string(),
            ));
        }

        self.antenna.soft_limits.to_soft_limits()?;

        Ok(())
    }

    pub fn rotctld_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.rotctld_port)
    }

    pub fn api_address(&self) -> Option<String> {
        self.network
            .api_port
            .map(|port| format!("{}:{}", self.network.host, port))
    }
}

impl AntennaConfig {
    /// Get read timeout as Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.read_timeout_secs)
    }

    pub fn link_settings(&self) -> Result<LinkSettings, ConfigError> {
        Ok(LinkSettings {
            retry_attempts: self.retry_attempts,
            soft_limits: self.soft_limits.to_soft_limits()?,
        })
    }
}

impl SoftLimitsConfig {
    pub fn to_soft_limits(&self) -> Result<SoftLimits, ConfigError> {
        let invalid = |e: antenna_controller::InvalidPosition| {
            ConfigError::Message(format!("antenna.soft_limits: {e}"))
        };

        let min = PositionReading::new(self.azimuth_min, self.elevation_min).map_err(invalid)?;
        let max = PositionReading::new(self.azimuth_max, self.elevation_max).map_err(invalid)?;

        SoftLimits::new(min, max).ok_or_else(|| {
            ConfigError::Message("antenna.soft_limits: minimum is above maximum".to_string())
        })
    }
}
