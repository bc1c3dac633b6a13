//! TOML configuration. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! log_level = "info"
//!
//! [monitor]
//! f_min = 200.0
//! f_max = 3000.0
//! window = "hann"
//!
//! [decoder]
//! max_candidates = 140
//! ldpc_algorithm = "min-sum"
//!
//! [encoder]
//! pad_to_slot = true
//! lead_in = 0.5
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::decoder::DecoderConfig;
use crate::error::ConfigError;
use crate::ft8encode::EncoderConfig;
use crate::monitor::MonitorConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// trace, debug, info, warn or error
    pub log_level: Option<String>,
    pub monitor: MonitorConfig,
    pub decoder: DecoderConfig,
    pub encoder: EncoderConfig,
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::ParseError("<string>".into(), e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_log_level(self.log_level.as_deref())
            .and_then(|_| self.monitor.validate())
            .and_then(|_| self.decoder.validate())
            .and_then(|_| self.encoder.validate())
            .map_err(ConfigError::Invalid)
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldpc::LdpcAlgorithm;
    use crate::monitor::WindowKind;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.decoder.max_candidates, 140);
        assert_eq!(config.monitor.sample_rate, 12000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            log_level = "debug"

            [monitor]
            f_max = 2500.0
            window = "blackman"

            [decoder]
            ldpc_algorithm = "min-sum"
            threads = 4

            [encoder]
            pad_to_slot = true
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.monitor.f_max, 2500.0);
        assert_eq!(config.monitor.f_min, 200.0);
        assert_eq!(config.monitor.window, WindowKind::Blackman);
        assert_eq!(config.decoder.ldpc_algorithm, LdpcAlgorithm::MinSum);
        assert_eq!(config.decoder.threads, 4);
        assert!(config.encoder.pad_to_slot);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_toml_str("[decoder]\nmax_candidates = \"many\""),
            Err(ConfigError::ParseError(..))
        ));

        let config = Config::from_toml_str("log_level = \"loud\"").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config::from_toml_str("[encoder]\namplitude = 2.0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file() {
        let err = Config::load_from_file(Path::new("/nonexistent/ft8codec.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(..)));
    }
}
