//! Hyperparameter configuration for training runs.
//!
//! # TOML Structure
//!
//! ```toml
//! l2_value = 0.001
//! learning_rate = 0.001
//! dropout_rate = 0.75
//! training_epochs = 55
//! batch_size = 128
//! display_step = 1
//! dump_step = 5
//! log_dir = "./log"
//! seed = 42
//! ```
//!
//! # Design Principles
//!
//! - **NO FALLBACKS**: an unreadable or unparseable file returns an error,
//!   never silently defaults.
//! - **FAIL FAST**: `validate()` rejects out-of-range values before any
//!   tensor is allocated.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DeepFlError, DeepFlResult};

/// Training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// L2 regularization strength applied to every branch weight.
    #[serde(default = "default_l2_value")]
    pub l2_value: f64,

    /// AdamW learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Dropout *keep* probability during training (TF naming kept from the
    /// original harness). 1.0 disables dropout entirely.
    #[serde(default = "default_dropout_rate")]
    pub dropout_rate: f32,

    /// Number of epochs; the loop runs unconditionally for this count.
    #[serde(default = "default_training_epochs")]
    pub training_epochs: usize,

    /// Fixed batch size; trailing remainder instances are dropped each epoch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Log average cost every `display_step` epochs.
    #[serde(default = "default_display_step")]
    pub display_step: usize,

    /// Dump test-set suspiciousness scores every `dump_step` epochs.
    #[serde(default = "default_dump_step")]
    pub dump_step: usize,

    /// Directory receiving the monitoring summary stream.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Seed for the epoch shuffle of the training cursor.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_l2_value() -> f64 {
    1e-3
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_dropout_rate() -> f32 {
    0.75
}

fn default_training_epochs() -> usize {
    55
}

fn default_batch_size() -> usize {
    128
}

fn default_display_step() -> usize {
    1
}

fn default_dump_step() -> usize {
    5
}

fn default_log_dir() -> String {
    "./log".to_string()
}

fn default_seed() -> u64 {
    42
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            l2_value: default_l2_value(),
            learning_rate: default_learning_rate(),
            dropout_rate: default_dropout_rate(),
            training_epochs: default_training_epochs(),
            batch_size: default_batch_size(),
            display_step: default_display_step(),
            dump_step: default_dump_step(),
            log_dir: default_log_dir(),
            seed: default_seed(),
        }
    }
}

impl TrainingConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> DeepFlResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeepFlError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            DeepFlError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all fields. Returns the first violation found.
    pub fn validate(&self) -> DeepFlResult<()> {
        if self.l2_value < 0.0 {
            return Err(DeepFlError::InvalidConfig(format!(
                "l2_value must be >= 0, got {}",
                self.l2_value
            )));
        }
        if self.learning_rate <= 0.0 {
            return Err(DeepFlError::InvalidConfig(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if !(self.dropout_rate > 0.0 && self.dropout_rate <= 1.0) {
            return Err(DeepFlError::InvalidConfig(format!(
                "dropout_rate (keep probability) must be in (0, 1], got {}",
                self.dropout_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(DeepFlError::InvalidConfig(
                "batch_size must be > 0".to_string(),
            ));
        }
        if self.display_step == 0 {
            return Err(DeepFlError::InvalidConfig(
                "display_step must be > 0".to_string(),
            ));
        }
        if self.dump_step == 0 {
            return Err(DeepFlError::InvalidConfig(
                "dump_step must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.display_step, 1);
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let config = TrainingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_keep_probability() {
        let config = TrainingConfig {
            dropout_rate: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrainingConfig {
            dropout_rate: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.toml");
        std::fs::write(&path, "training_epochs = 3\nbatch_size = 16\n").unwrap();

        let config = TrainingConfig::from_file(&path).unwrap();
        assert_eq!(config.training_epochs, 3);
        assert_eq!(config.batch_size, 16);
        // Unspecified fields fall back to serde defaults.
        assert_eq!(config.dump_step, 5);
    }

    #[test]
    fn test_from_file_missing_is_error() {
        let err = TrainingConfig::from_file("/nonexistent/train.toml").unwrap_err();
        assert!(matches!(err, DeepFlError::InvalidConfig(_)));
    }
}
