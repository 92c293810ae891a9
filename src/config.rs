use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConfigError, Result};

/// Tool configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub effects: EffectsConfig,
}

/// Encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Video codec handed to ffmpeg.
    pub codec: String,
    /// x264 CRF quality (0 lossless, 51 worst).
    pub quality: u8,
    /// Frames between progress reports.
    pub progress_interval: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            quality: 23,
            progress_interval: 30,
        }
    }
}

/// Global effect toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Gates chroma keying across all layers.
    pub enable_transparency: bool,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            enable_transparency: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|_| ConfigError::ParseFailed {
            path: path.display().to_string(),
        })?;

        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration out as TOML.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string(),
            })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.output.quality > 51 {
            return Err(ConfigError::InvalidValue {
                key: "output.quality".to_string(),
                value: self.output.quality.to_string(),
            }
            .into());
        }
        if self.output.progress_interval == 0 {
            return Err(ConfigError::InvalidValue {
                key: "output.progress_interval".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output.codec, "libx264");
        assert_eq!(config.output.quality, 23);
        assert!(config.effects.enable_transparency);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.output.quality = 18;
        config.effects.enable_transparency = false;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.output.quality, 18);
        assert!(!loaded.effects.enable_transparency);
    }

    #[test]
    fn test_invalid_quality_rejected() {
        let mut config = Config::default();
        config.output.quality = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::from_file("/nonexistent/config.toml").is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[output]\nquality = 30\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.output.quality, 30);
        assert_eq!(config.output.codec, "libx264");
    }
}
