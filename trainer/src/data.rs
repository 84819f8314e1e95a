use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use artifact::{FeatureContract, FeatureKind, FeatureSpec, PredictionRequest};
use log::{debug, info, warn};
use machine_learning::dataset::Dataset;
use ndarray::{Array1, Array2};
use serde_json::Value;

use crate::error::{Result, TrainerErr};

/// A raw training row: column name to raw value.
pub type Row = PredictionRequest;

/// Training rows turned into a dataset plus the contract they conform to.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub dataset: Dataset,
    /// The features with the fill defaults learned from the rows.
    pub contract: FeatureContract,
    /// How many feature values were missing and imputed.
    pub imputed: usize,
    /// How many present feature values fell outside their declared range.
    pub out_of_range: usize,
}

/// Reads a file holding one json object per line, blank lines are skipped.
pub fn load_json_lines(path: impl AsRef<Path>) -> Result<Vec<Row>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let invalid = |reason: String| TrainerErr::InvalidRow { row: i + 1, reason };
        match serde_json::from_str(&line).map_err(|e| invalid(e.to_string()))? {
            Value::Object(row) => rows.push(row),
            other => return Err(invalid(format!("expected a json object, got {other}"))),
        }
    }

    info!("loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Turns raw rows into a dataset over `features`, in their order.
///
/// Missing (or `null`) numeric values are imputed with the median of their column and missing
/// categories go to the unknown bucket. Numeric features declared without a default get their
/// column median as default, so serving fills missing values the same way training did.
///
/// # Arguments
/// * `rows` - The raw rows.
/// * `features` - The model's features.
/// * `target` - The column holding the rating.
///
/// # Returns
/// The prepared data, or an error naming the first row without a numeric target or with a value
/// that can't be coerced.
pub fn prepare(rows: &[Row], features: &[FeatureSpec], target: &str) -> Result<PreparedData> {
    FeatureContract::define(features.to_vec())?;

    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(rows.len()); features.len()];
    let mut y = Vec::with_capacity(rows.len());
    let mut out_of_range = 0;

    for (i, row) in rows.iter().enumerate() {
        let invalid = |reason: String| TrainerErr::InvalidRow { row: i + 1, reason };

        let rating = row
            .get(target)
            .and_then(as_number)
            .ok_or_else(|| invalid(format!("missing or non-numeric target {target}")))?;
        y.push(rating as f32);

        for (feature, column) in features.iter().zip(&mut columns) {
            let value = match row.get(&feature.name).filter(|v| !v.is_null()) {
                Some(raw) => {
                    let coerced = feature.coerce(raw).map_err(|e| invalid(e.to_string()))?;
                    if !coerced.in_range {
                        out_of_range += 1;
                    }
                    Some(coerced.value)
                }
                None => None,
            };
            column.push(value);
        }
    }

    let mut imputed = 0;
    let mut specs = Vec::with_capacity(features.len());
    let mut x = Array2::zeros((rows.len(), features.len()));

    for (j, (feature, column)) in features.iter().zip(&columns).enumerate() {
        let fill = match feature.kind {
            FeatureKind::Categorical => feature.fill()?,
            kind => {
                let mut present: Vec<_> = column.iter().flatten().copied().collect();
                let median = median(&mut present, kind == FeatureKind::Discrete);
                match (feature.default, median) {
                    (Some(default), _) => default,
                    (None, Some(median)) => median,
                    (None, None) => {
                        return Err(TrainerErr::InvalidConfig(format!(
                            "feature {} has no values and no default",
                            feature.name
                        )));
                    }
                }
            }
        };

        for (i, value) in column.iter().enumerate() {
            x[[i, j]] = value.unwrap_or_else(|| {
                imputed += 1;
                fill
            }) as f32;
        }

        let mut spec = feature.clone();
        if spec.kind.is_numeric() && spec.default.is_none() {
            debug!("feature {} defaults to its median {fill}", spec.name);
            spec.default = Some(fill);
        }
        specs.push(spec);
    }

    if imputed > 0 {
        warn!("imputed {imputed} missing feature values");
    }
    if out_of_range > 0 {
        warn!("{out_of_range} training values fall outside their declared range");
    }

    Ok(PreparedData {
        dataset: Dataset::new(x, Array1::from(y))?,
        contract: FeatureContract::define(specs)?,
        imputed,
        out_of_range,
    })
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

/// The median of `values`, rounded to an integer for discrete columns.
fn median(values: &mut [f64], integral: bool) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    };

    Some(if integral { median.round() } else { median })
}
