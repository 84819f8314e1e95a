use serde::Serialize;
use serde_json::{Map, Value};

use super::{FeatureContract, FeatureKind, FeatureSpec};
use crate::error::ContractErr;

/// A raw prediction request: feature name to raw value, possibly partial.
pub type PredictionRequest = Map<String, Value>;

/// A request normalized to its contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedInput {
    /// One value per contract feature, in contract order.
    pub values: Vec<f32>,
    /// Features whose value fell outside their declared range or category list.
    pub out_of_range: Vec<String>,
    /// Features that were missing and got filled by the fill policy.
    pub filled: Vec<String>,
    /// Request keys the contract doesn't know about.
    pub ignored: Vec<String>,
}

/// A single raw value coerced into its feature's encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoercedValue {
    pub value: f64,
    /// False if the value is outside the declared range, or an unseen category.
    pub in_range: bool,
}

impl FeatureContract {
    /// Validates a request and normalizes it to contract order.
    ///
    /// Missing (or `null`) numeric features take their declared default, missing categorical
    /// features go to the unknown bucket. Out of range values are accepted but flagged, unknown
    /// keys are ignored but recorded.
    ///
    /// # Arguments
    /// * `request` - The raw request.
    ///
    /// # Returns
    /// The normalized input, or a schema error if a required feature without a default is
    /// missing, or a coercion error naming the first field whose value can't be coerced.
    pub fn validate(&self, request: &PredictionRequest) -> Result<ValidatedInput, ContractErr> {
        let mut input = ValidatedInput {
            values: Vec::with_capacity(self.len()),
            out_of_range: Vec::new(),
            filled: Vec::new(),
            ignored: Vec::new(),
        };

        for feature in self.features() {
            let raw = request.get(&feature.name).filter(|v| !v.is_null());

            let value = match raw {
                Some(raw) => {
                    let CoercedValue { value, in_range } = feature.coerce(raw)?;
                    if !in_range {
                        input.out_of_range.push(feature.name.clone());
                    }
                    value
                }
                None => {
                    input.filled.push(feature.name.clone());
                    feature.fill()?
                }
            };

            let narrowed = value as f32;
            if !narrowed.is_finite() {
                return Err(coercion(feature, "a number within f32 range", raw));
            }
            input.values.push(narrowed);
        }

        input.ignored = request
            .keys()
            .filter(|k| self.feature(k).is_none())
            .cloned()
            .collect();

        Ok(input)
    }

    /// Same as `validate` but for any json value, only objects are valid requests.
    pub fn validate_value(&self, request: &Value) -> Result<ValidatedInput, ContractErr> {
        match request {
            Value::Object(map) => self.validate(map),
            other => Err(ContractErr::Schema {
                field: None,
                reason: format!("a request must be a json object, got {}", describe(other)),
            }),
        }
    }
}

impl FeatureSpec {
    /// Coerces a present, non-null raw value into this feature's encoding.
    ///
    /// Numbers and numeric strings coerce to numeric features, discrete ones must be integral.
    /// Categories are matched by their string (numbers by their textual form), unseen ones map
    /// to the unknown bucket and are flagged out of range.
    ///
    /// # Returns
    /// The encoded value or a coercion error naming this feature.
    pub fn coerce(&self, raw: &Value) -> Result<CoercedValue, ContractErr> {
        match self.kind {
            FeatureKind::Categorical => {
                let category = match raw {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return Err(coercion(self, "a category string", Some(raw))),
                };

                Ok(match self.categories.iter().position(|c| *c == category) {
                    Some(i) => CoercedValue {
                        value: i as f64,
                        in_range: true,
                    },
                    None => CoercedValue {
                        value: self.unknown_bucket() as f64,
                        in_range: false,
                    },
                })
            }
            kind => {
                let expected = if kind == FeatureKind::Discrete {
                    "an integer"
                } else {
                    "a number"
                };

                let value = match raw {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                }
                .filter(|v| v.is_finite())
                .ok_or_else(|| coercion(self, expected, Some(raw)))?;

                if kind == FeatureKind::Discrete && value.fract() != 0.0 {
                    return Err(coercion(self, expected, Some(raw)));
                }

                let in_range = self.range.is_none_or(|r| r.contains(value));
                Ok(CoercedValue { value, in_range })
            }
        }
    }

    /// The value of this feature when it's missing: its default if numeric, the unknown bucket
    /// if categorical.
    ///
    /// # Returns
    /// The value or a schema error if it's a numeric feature without a default.
    pub fn fill(&self) -> Result<f64, ContractErr> {
        match self.kind {
            FeatureKind::Categorical => Ok(self.unknown_bucket() as f64),
            _ => self.default.ok_or_else(|| {
                ContractErr::schema(&self.name, "missing required feature without a default")
            }),
        }
    }
}

fn coercion(feature: &FeatureSpec, expected: &'static str, raw: Option<&Value>) -> ContractErr {
    ContractErr::TypeCoercion {
        field: feature.name.clone(),
        expected,
        got: raw.map_or_else(|| "nothing".to_string(), describe),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "an array".into(),
        Value::Object(_) => "an object".into(),
    }
}
