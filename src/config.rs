//! Layered configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. `config/default.toml` or an explicit path (base configuration)
//! 2. Environment variables prefixed with `FRAME_DAQ_`, using `__` between sections
//!
//! Every section has defaults, so an empty or missing file yields a working setup
//! reading the `ff_ff_masked` frame format.
//!
//! # Example
//! ```no_run
//! use frame_daq::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Reading {} at {} baud", config.serial.port, config.serial.baud_rate);
//! # Ok::<(), frame_daq::error::DaqError>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::acquisition::OverflowPolicy;
use crate::error::{AppResult, DaqError};
use crate::frame::{FrameFormat, FrameFormatConfig};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FRAME_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial link settings
    #[serde(default)]
    pub serial: SerialConfig,
    /// Frame format descriptor
    #[serde(default)]
    pub format: FrameFormatConfig,
    /// Live window sizing
    #[serde(default)]
    pub window: WindowConfig,
    /// Producer/consumer handoff
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Record export
    #[serde(default)]
    pub export: ExportConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
    #[serde(default = "default_port")]
    pub port: String,
    /// Line rate in baud
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout; also bounds how long a stop request can go unnoticed
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Bytes requested per read
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
}

/// Sliding window sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Samples per second per channel
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    /// Seconds of history kept on screen
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,
}

/// How records queue up between producer and consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowMode {
    /// Keep at most `queue_capacity` records, evicting the oldest
    #[default]
    DropOldest,
    /// Never drop; memory grows if the consumer stalls
    Unbounded,
}

/// Acquisition channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Queue bound for `drop_oldest`; 0 means unbounded
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Overflow behaviour
    #[serde(default)]
    pub overflow: OverflowMode,
    /// Consumer tick interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

/// Export configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Write every decoded record to this CSV file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<PathBuf>,
}

// Default value functions
fn default_name() -> String {
    "Frame DAQ".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    3_000_000
}

fn default_read_timeout() -> u64 {
    100
}

fn default_read_chunk() -> usize {
    256
}

fn default_sample_rate() -> f64 {
    25_000.0
}

fn default_window_seconds() -> f64 {
    0.1
}

fn default_queue_capacity() -> usize {
    65_536
}

fn default_tick_ms() -> u64 {
    50
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
            read_chunk: default_read_chunk(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            window_seconds: default_window_seconds(),
        }
    }
}

impl WindowConfig {
    /// Window capacity: `floor(sample_rate * window_seconds)`.
    pub fn window_samples(&self) -> usize {
        let samples = (self.sample_rate * self.window_seconds).floor();
        if samples.is_finite() && samples > 0.0 {
            samples as usize
        } else {
            0
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow: OverflowMode::default(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/default.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `FRAME_DAQ_`.
    /// Example: `FRAME_DAQ_SERIAL__BAUD_RATE=115200`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.serial.baud_rate == 0 {
            return Err(DaqError::Configuration(
                "serial.baud_rate must be greater than 0".to_string(),
            ));
        }
        if self.serial.read_chunk == 0 {
            return Err(DaqError::Configuration(
                "serial.read_chunk must be greater than 0".to_string(),
            ));
        }

        if self.window.window_samples() == 0 {
            return Err(DaqError::Configuration(format!(
                "window of {} s at {} Hz holds no samples",
                self.window.window_seconds, self.window.sample_rate
            )));
        }

        if self.acquisition.tick_ms == 0 {
            return Err(DaqError::Configuration(
                "acquisition.tick_ms must be greater than 0".to_string(),
            ));
        }
        self.format.build()?;
        Ok(())
    }

    /// Build the configured frame format.
    pub fn frame_format(&self) -> AppResult<FrameFormat> {
        self.format.build()
    }

    /// Channel overflow policy. A zero `queue_capacity` leaves the queue unbounded.
    pub fn overflow_policy(&self) -> OverflowPolicy {
        match (self.acquisition.overflow, self.acquisition.queue_capacity) {
            (OverflowMode::DropOldest, 0) | (OverflowMode::Unbounded, _) => {
                OverflowPolicy::Unbounded
            }
            (OverflowMode::DropOldest, capacity) => OverflowPolicy::DropOldest { capacity },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.serial.baud_rate, 3_000_000);
        assert_eq!(config.window.window_samples(), 2500);
        assert_eq!(config.frame_format().unwrap().name(), "ff_ff_masked");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let config = AppConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.serial.port, "/dev/ttyUSB0");
            assert_eq!(config.acquisition.tick_ms, 50);
            Ok(())
        });
    }

    #[test]
    fn file_and_environment_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "daq.toml",
                r#"
                [serial]
                port = "/dev/ttyACM1"

                [format]
                preset = "ae_bc_nibble"
                sync_policy = "strict"

                [acquisition]
                overflow = "unbounded"
                "#,
            )?;
            jail.set_env("FRAME_DAQ_SERIAL__BAUD_RATE", "115200");
            jail.set_env("FRAME_DAQ_APPLICATION__LOG_LEVEL", "debug");

            let config = AppConfig::load_from("daq.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.serial.port, "/dev/ttyACM1");
            assert_eq!(config.serial.baud_rate, 115_200);
            assert_eq!(config.serial.read_timeout_ms, 100);
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.overflow_policy(), OverflowPolicy::Unbounded);

            let format = config.frame_format().map_err(|e| e.to_string())?;
            assert_eq!(format.name(), "ae_bc_nibble");
            assert_eq!(format.policy(), crate::frame::SyncPolicy::Strict);
            Ok(())
        });
    }

    #[test]
    fn custom_format_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [format]
                name = "bench_rig"
                sync_bytes = [170, 85]
                payload_length = 6
                fields = [
                    { kind = "masked", offset = 0 },
                    { kind = "masked", offset = 2, mask_bits = 16 },
                    { kind = "nibble", offset = 4 },
                ]
                "#,
            )?;
            let config = AppConfig::load_from("custom.toml").map_err(|e| e.to_string())?;
            config.validate().map_err(|e| e.to_string())?;
            let format = config.frame_format().map_err(|e| e.to_string())?;
            assert_eq!(format.sync_bytes(), &[0xAA, 0x55]);
            assert_eq!(format.channel_count(), 3);
            Ok(())
        });
    }

    #[test]
    fn invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn empty_window_is_rejected() {
        let mut config = AppConfig::default();
        config.window.window_seconds = 0.00001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn broken_format_is_reported_at_startup() {
        let mut config = AppConfig::default();
        config.format = FrameFormatConfig {
            preset: None,
            sync_bytes: Some(vec![0xFF, 0xFF]),
            payload_length: Some(5),
            ..FrameFormatConfig::preset("ff_ff_masked")
        };
        assert!(matches!(
            config.validate(),
            Err(DaqError::InvalidFormat(_))
        ));
    }

    #[test]
    fn zero_queue_capacity_means_unbounded() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.overflow_policy(),
            OverflowPolicy::DropOldest { capacity: 65_536 }
        );

        config.acquisition.queue_capacity = 0;
        config.validate().unwrap();
        assert_eq!(config.overflow_policy(), OverflowPolicy::Unbounded);

        config.acquisition.overflow = OverflowMode::Unbounded;
        config.validate().unwrap();
        assert_eq!(config.overflow_policy(), OverflowPolicy::Unbounded);
    }

    #[test]
    fn zero_queue_capacity_from_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("FRAME_DAQ_ACQUISITION__QUEUE_CAPACITY", "0");
            let config = AppConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
            config.validate().map_err(|e| e.to_string())?;
            assert_eq!(config.overflow_policy(), OverflowPolicy::Unbounded);
            Ok(())
        });
    }
}
