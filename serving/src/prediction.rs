use artifact::{ModelArtifact, VersionId};
use machine_learning::{estimators::Estimator, scaling::Scaler};
use serde::Serialize;
use serde_json::Value;

use crate::{
    config::RatingRange,
    error::{Result, ServingErr},
};

const HIGH_SPREAD: f32 = 0.5;
const MEDIUM_SPREAD: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

/// How much a prediction can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Confidence {
    pub band: ConfidenceBand,
    /// In `(0, 1]`.
    pub score: f32,
}

impl Confidence {
    /// Assesses a prediction.
    ///
    /// Ensembles are judged by how much their members disagree (`spread`, in rating points).
    /// Models without a spread fall back to a fixed heuristic over the rating itself.
    pub fn assess(rating: f32, spread: Option<f32>) -> Self {
        match spread {
            Some(spread) => {
                let band = if spread < HIGH_SPREAD {
                    ConfidenceBand::High
                } else if spread < MEDIUM_SPREAD {
                    ConfidenceBand::Medium
                } else {
                    ConfidenceBand::Low
                };

                Self {
                    band,
                    score: 1.0 / (1.0 + spread.max(0.0)),
                }
            }
            None => Self {
                band: ConfidenceBand::Medium,
                score: (rating / 10.0).clamp(0.55, 0.95),
            },
        }
    }
}

/// The outcome of a single prediction, always traceable to the artifact that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Clamped into the configured rating range.
    pub predicted_rating: f32,
    /// What the estimator returned before clamping.
    pub raw_prediction: f32,
    pub confidence: Confidence,
    pub model_version: VersionId,
    pub out_of_range: Vec<String>,
    pub filled: Vec<String>,
    pub ignored: Vec<String>,
}

/// Runs a request through an artifact: validation, scaling, estimation and clamping.
pub(crate) fn infer(
    artifact: &ModelArtifact,
    request: &Value,
    range: RatingRange,
) -> Result<PredictionResult> {
    let input = artifact.contract().validate_value(request)?;
    let scaled = artifact.scaler().transform(&input.values)?;

    let (raw, spread) = artifact.regressor().predict_with_spread(&scaled)?;
    if !raw.is_finite() {
        return Err(ServingErr::ModelUnavailable(format!(
            "artifact {} produced a non-finite prediction",
            artifact.version()
        )));
    }

    let predicted_rating = range.clamp(raw);
    let confidence = Confidence::assess(predicted_rating, spread);

    Ok(PredictionResult {
        predicted_rating,
        raw_prediction: raw,
        confidence,
        model_version: artifact.version().clone(),
        out_of_range: input.out_of_range,
        filled: input.filled,
        ignored: input.ignored,
    })
}
