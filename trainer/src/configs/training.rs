use std::{
    env, fs,
    path::{Path, PathBuf},
};

use artifact::{FeatureContract, FeatureSpec};
use machine_learning::training::FitOptions;
use serde::{Deserialize, Serialize};

use super::{TARGET_COLUMN, imdb_features};
use crate::error::{Result, TrainerErr};

const DEFAULT_ARTIFACT_DIR: &str = "artifacts";

/// Where the training rows come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DatasetConfig {
    /// A file with one json object per line.
    Local { path: PathBuf },
    /// Generated demo rows.
    Synthetic { rows: usize, seed: u64 },
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self::Synthetic {
            rows: 5000,
            seed: 42,
        }
    }
}

/// A whole training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub artifact_dir: PathBuf,
    pub dataset: DatasetConfig,
    /// The model's features in column order. Numeric features without a default get the
    /// training median of their column.
    pub features: Vec<FeatureSpec>,
    pub target: String,
    pub fit: FitOptions,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            dataset: DatasetConfig::default(),
            features: imdb_features(),
            target: TARGET_COLUMN.to_string(),
            fit: FitOptions::default(),
        }
    }
}

impl TrainingConfig {
    /// Reads a json configuration file, missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&raw).map_err(|e| {
            TrainerErr::InvalidConfig(format!("{}: {e}", path.as_ref().display()))
        })
    }

    /// Reads the file named by `TRAINER_CONFIG` if set, or the defaults, and then applies the
    /// `ARTIFACT_DIR` override.
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var("TRAINER_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(dir) = env::var("ARTIFACT_DIR") {
            config.artifact_dir = dir.into();
        }

        Ok(config)
    }

    /// Checks everything that can be checked before loading any data.
    pub fn validate(&self) -> Result<()> {
        FeatureContract::define(self.features.clone())?;

        if self.target.is_empty() {
            return Err(TrainerErr::InvalidConfig("the target column can't be empty".into()));
        }

        if self.features.iter().any(|f| f.name == self.target) {
            return Err(TrainerErr::InvalidConfig(format!(
                "the target {} can't also be a feature",
                self.target
            )));
        }

        if !(self.fit.test_ratio > 0.0 && self.fit.test_ratio < 1.0) {
            return Err(TrainerErr::InvalidConfig(format!(
                "test_ratio must be in (0, 1), got {}",
                self.fit.test_ratio
            )));
        }

        if let DatasetConfig::Synthetic { rows, .. } = self.dataset
            && rows < 2
        {
            return Err(TrainerErr::InvalidConfig(
                "a synthetic dataset needs at least 2 rows".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::training::AlgorithmParams;

    use super::*;

    #[test]
    fn test_defaults_follow_the_rating_model() {
        let config = TrainingConfig::default();

        assert_eq!(config.target, "averageRating");
        assert_eq!(config.fit.test_ratio, 0.2);
        assert_eq!(config.fit.split_seed, 42);
        assert!(matches!(
            config.fit.params,
            AlgorithmParams::RandomForest(p) if p.n_estimators == 100
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: TrainingConfig = serde_json::from_str(
            r#"{
                "dataset": {"source": "local", "path": "rows.jsonl"},
                "fit": {"params": {"algorithm": "linear_regression"}}
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.dataset,
            DatasetConfig::Local {
                path: "rows.jsonl".into()
            }
        );
        assert_eq!(config.fit.params, AlgorithmParams::LinearRegression);
        assert_eq!(config.features, imdb_features());
    }

    #[test]
    fn test_target_cant_be_a_feature() {
        let config = TrainingConfig {
            target: "numVotes".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TrainerErr::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_features_are_rejected() {
        let mut config = TrainingConfig::default();
        config.features.push(FeatureSpec::continuous("startYear"));
        assert!(matches!(config.validate(), Err(TrainerErr::Contract(_))));
    }
}
