//! Configuration using Figment
//!
//! Settings are layered, later sources winning:
//! 1. Built-in defaults (the values the rig was commissioned with)
//! 2. A TOML file (`mtf_capture.toml` in the working directory, or `--config`)
//! 3. Environment variables prefixed with `MTF_`, nested with `__`
//!
//! # Environment Variable Overrides
//!
//! ```text
//! MTF_SERIAL__BAUD_RATE=9600
//! MTF_FEED__POLL_INTERVAL_MS=30
//! MTF_LOGGING__LEVEL=debug
//! ```
//!
//! # Example
//!
//! ```toml
//! [serial]
//! baud_rate = 115200
//!
//! [capture]
//! image_dir = "captured_images"
//! lps_options = [23, 26, 29, 32, 40]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, CaptureResult};
use crate::Lps;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "mtf_capture.toml";

/// Target menu offered to the operator.
pub const DEFAULT_LPS_OPTIONS: [Lps; 18] = [
    23, 26, 29, 32, 40, 45, 51, 57, 64, 72, 80, 90, 101, 114, 128, 143, 161, 180,
];

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// LED serial link.
    pub serial: SerialConfig,
    /// Live frame feed.
    pub feed: FeedConfig,
    /// Capture sequence.
    pub capture: CaptureConfig,
    /// Result export.
    pub export: ExportConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// LED serial link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate of the LED driver.
    pub baud_rate: u32,
    /// Write timeout in milliseconds.
    pub write_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            write_timeout_ms: 100,
        }
    }
}

impl SerialConfig {
    /// Write timeout as a `Duration`.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Live frame feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Scheduler tick in milliseconds.
    pub poll_interval_ms: u64,
    /// Directory of frames to replay instead of the synthetic pattern.
    pub frame_dir: Option<PathBuf>,
    /// Synthetic frame size, width x height.
    pub synthetic_size: (u32, u32),
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 15,
            frame_dir: None,
            synthetic_size: (640, 480),
        }
    }
}

impl FeedConfig {
    /// Tick as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Capture sequence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Where accepted frames are written before scoring.
    pub image_dir: PathBuf,
    /// LPS values the operator may pick from.
    pub lps_options: Vec<Lps>,
    /// External scoring program; operator-entered scores when absent.
    pub scorer_command: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("captured_images"),
            lps_options: DEFAULT_LPS_OPTIONS.to_vec(),
            scorer_command: None,
        }
    }
}

/// Result export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// File name suggested when no output path is given.
    pub default_file_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_file_name: "miniscope_results.csv".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset (trace, debug, info, warn, error).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads defaults, then `path` (or [`DEFAULT_CONFIG_FILE`] if present),
    /// then `MTF_` environment variables, and validates the result.
    pub fn load(path: Option<&Path>) -> CaptureResult<Self> {
        let figment = Figment::from(Serialized::defaults(Settings::default()));
        let figment = match path {
            Some(path) if !path.is_file() => {
                return Err(CaptureError::Configuration(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            Some(path) => figment.merge(Toml::file(path)),
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };
        Self::from_figment(figment.merge(Env::prefixed("MTF_").split("__")))
    }

    /// Extracts and validates settings from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> CaptureResult<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values that parse but cannot work.
    pub fn validate(&self) -> CaptureResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(CaptureError::Configuration(
                "serial.baud_rate must be greater than zero".into(),
            ));
        }
        if self.feed.poll_interval_ms == 0 {
            return Err(CaptureError::Configuration(
                "feed.poll_interval_ms must be greater than zero".into(),
            ));
        }
        let (width, height) = self.feed.synthetic_size;
        if width == 0 || height == 0 {
            return Err(CaptureError::Configuration(format!(
                "feed.synthetic_size must be non-zero, got {width}x{height}"
            )));
        }
        if self.capture.lps_options.is_empty() {
            return Err(CaptureError::Configuration(
                "capture.lps_options must list at least one LPS".into(),
            ));
        }
        let mut seen = HashSet::new();
        for &lps in &self.capture.lps_options {
            if lps == 0 || !seen.insert(lps) {
                return Err(CaptureError::Configuration(format!(
                    "capture.lps_options has an invalid or repeated entry: {lps}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.feed.poll_interval(), Duration::from_millis(15));
        assert_eq!(settings.capture.lps_options.len(), 18);
        assert_eq!(settings.export.default_file_name, "miniscope_results.csv");
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(
            Toml::string(
                r#"
                [serial]
                baud_rate = 9600

                [capture]
                lps_options = [23, 40]
                "#,
            ),
        );
        let settings = Settings::from_figment(figment).unwrap();
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.serial.write_timeout_ms, 100);
        assert_eq!(settings.capture.lps_options, vec![23, 40]);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                "[feed]\npoll_interval_ms = 30\n",
            )?;
            jail.set_env("MTF_FEED__POLL_INTERVAL_MS", "45");
            jail.set_env("MTF_LOGGING__LEVEL", "debug");
            let settings = Settings::load(None).map_err(|e| e.to_string())?;
            assert_eq!(settings.feed.poll_interval_ms, 45);
            assert_eq!(settings.logging.level, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_repeated_lps() {
        let mut settings = Settings::default();
        settings.capture.lps_options = vec![23, 23];
        assert!(matches!(
            settings.validate().unwrap_err(),
            CaptureError::Configuration(_)
        ));
    }

    #[test]
    fn test_validation_rejects_empty_synthetic_frame() {
        for size in [(0, 480), (640, 0)] {
            let mut settings = Settings::default();
            settings.feed.synthetic_size = size;
            let err = settings.validate().unwrap_err();
            assert!(err.to_string().contains("feed.synthetic_size"));
        }
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/mtf_capture.toml"))).unwrap_err();
        assert!(matches!(err, CaptureError::Configuration(_)));
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string("[serial]\nbaud_rate = \"fast\"\n"));
        assert!(matches!(
            Settings::from_figment(figment).unwrap_err(),
            CaptureError::Config(_)
        ));
    }
}
