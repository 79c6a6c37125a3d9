//! File-backed configuration for the kernel and the evaluation loop.
//!
//! Persisted as TOML. Every field has a default, so a partial file (or none)
//! is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::eval::EvaluatorConfig;
use crate::kernel::KernelConfig;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct XiConfig {
    pub kernel: KernelConfig,
    pub evaluator: EvaluatorConfig,
}

impl XiConfig {
    /// Parse from a TOML string. `origin` names the source in errors.
    pub fn from_toml(content: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: format!("cannot serialize config: {e}"),
        })
    }

    /// Reject values the kernel or loop cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("kernel.critique_threshold", self.kernel.critique_threshold),
            ("kernel.link_threshold", self.kernel.link_threshold),
            ("evaluator.min_accept_confidence", self.evaluator.min_accept_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    message: format!("{name} must be within [0, 1], got {value}"),
                });
            }
        }
        if let Some(secs) = self.evaluator.step_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::Invalid {
                    message: format!("evaluator.step_timeout_secs must be positive, got {secs}"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = XiConfig::from_toml("", "inline").unwrap();
        assert_eq!(config, XiConfig::default());
        assert_eq!(config.kernel.critique_threshold, 0.5);
        assert_eq!(config.kernel.link_threshold, 0.6);
        assert_eq!(config.evaluator.default_max_steps, 10);
        assert_eq!(config.evaluator.history_window, 3);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = XiConfig::from_toml(
            "[evaluator]\ndefault_max_steps = 3\nstep_timeout_secs = 2.5\n",
            "inline",
        )
        .unwrap();
        assert_eq!(config.evaluator.default_max_steps, 3);
        assert_eq!(config.evaluator.step_timeout_secs, Some(2.5));
        assert_eq!(config.evaluator.summary_chars, 200);
        assert!(config.kernel.embed_on_prompt);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = XiConfig::from_toml("[kernel]\nbogus = 1\n", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn out_of_range_threshold_is_invalid() {
        let err = XiConfig::from_toml("[kernel]\nlink_threshold = 1.5\n", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn save_then_load_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("xi.toml");
        let mut config = XiConfig::default();
        config.evaluator.default_max_steps = 7;
        config.save(&path).unwrap();
        assert_eq!(XiConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = XiConfig::load(Path::new("/nonexistent/xi.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
