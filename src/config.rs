//! Model and training configuration.
//!
//! Both halves derive serde so a run can be described by one JSON file:
//!
//! ```json
//! {
//!   "model": { "alpha": 0.01, "batch_size": 256, "node_size": [500, 500, 500],
//!              "num_classes": 2, "num_features": 10 },
//!   "train": { "num_epochs": 10, "log_path": "./logs/", "result_path": "./results" }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How often (in steps) the loops log progress and write summaries.
pub const DEFAULT_LOG_EVERY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpConfig {
    /// Learning rate.
    pub alpha: f32,
    pub batch_size: usize,
    /// Width of each hidden layer.
    pub node_size: Vec<usize>,
    pub num_classes: usize,
    pub num_features: usize,
    /// Seed for weight initialization.
    pub seed: u64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            alpha: 1e-2,
            batch_size: 256,
            node_size: vec![500, 500, 500],
            num_classes: 2,
            num_features: 10,
            seed: 0,
        }
    }
}

impl MlpConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "alpha must be finite and > 0, got {}",
                self.alpha
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if self.node_size.is_empty() {
            return Err(Error::InvalidConfig(
                "node_size must name at least one hidden layer".to_owned(),
            ));
        }
        if self.node_size.contains(&0) {
            return Err(Error::InvalidConfig(
                "every hidden layer width must be > 0".to_owned(),
            ));
        }
        if !(1..=256).contains(&self.num_classes) {
            return Err(Error::InvalidConfig(format!(
                "num_classes must be in 1..=256, got {}",
                self.num_classes
            )));
        }
        if self.num_features == 0 {
            return Err(Error::InvalidConfig("num_features must be > 0".to_owned()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Passes over the training data; also scales the evaluation step count.
    pub num_epochs: usize,
    /// Prefix of the summary run directories.
    pub log_path: PathBuf,
    /// Directory receiving the `.npy` label dumps.
    pub result_path: PathBuf,
    pub log_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            num_epochs: 1,
            log_path: PathBuf::from("./logs/"),
            result_path: PathBuf::from("./results"),
            log_every: DEFAULT_LOG_EVERY,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_every == 0 {
            return Err(Error::InvalidConfig("log_every must be > 0".to_owned()));
        }
        if self.result_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "result_path must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: MlpConfig,
    pub train: TrainConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.train.validate()
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Config = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a JSON config file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
        Self::from_json_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg = Config::from_json_str(
            r#"{"model": {"alpha": 0.5, "node_size": [4, 4]}, "train": {"num_epochs": 3}}"#,
        )
        .unwrap();
        assert_eq!(cfg.model.alpha, 0.5);
        assert_eq!(cfg.model.node_size, vec![4, 4]);
        assert_eq!(cfg.model.batch_size, 256);
        assert_eq!(cfg.train.num_epochs, 3);
        assert_eq!(cfg.train.log_every, DEFAULT_LOG_EVERY);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad = [
            MlpConfig {
                alpha: 0.0,
                ..MlpConfig::default()
            },
            MlpConfig {
                batch_size: 0,
                ..MlpConfig::default()
            },
            MlpConfig {
                node_size: vec![],
                ..MlpConfig::default()
            },
            MlpConfig {
                num_classes: 257,
                ..MlpConfig::default()
            },
        ];
        for cfg in &bad {
            assert!(cfg.validate().is_err(), "{cfg:?} should be rejected");
        }

        let train = TrainConfig {
            log_every: 0,
            ..TrainConfig::default()
        };
        assert!(train.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_serde_error() {
        let err = Config::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, Error::Serde(_)));
    }
}
