use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ContractErr;

/// The semantic type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Continuous,
    /// A numeric feature that only takes integral values.
    Discrete,
    /// One of a fixed list of categories, encoded as the category's index.
    Categorical,
}

impl FeatureKind {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Categorical)
    }
}

/// An inclusive range of valid values, either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ValueRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// A single named feature of a `FeatureContract`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// The value used when a request doesn't carry this (numeric) feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
}

impl FeatureSpec {
    fn numeric(name: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            kind,
            range: None,
            categories: Vec::new(),
            default: None,
        }
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Self::numeric(name, FeatureKind::Continuous)
    }

    pub fn discrete(name: impl Into<String>) -> Self {
        Self::numeric(name, FeatureKind::Discrete)
    }

    pub fn categorical<I, C>(name: impl Into<String>, categories: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Self {
            name: name.into(),
            kind: FeatureKind::Categorical,
            range: None,
            categories: categories.into_iter().map(Into::into).collect(),
            default: None,
        }
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.range = Some(ValueRange::new(min, max));
        self
    }

    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }

    /// The encoded value of categories this feature has never seen.
    pub fn unknown_bucket(&self) -> usize {
        self.categories.len()
    }

    fn check(&self) -> Result<(), ContractErr> {
        let name = &self.name;
        if name.is_empty() {
            return Err(ContractErr::Schema {
                field: None,
                reason: "feature names can't be empty".into(),
            });
        }

        if let Some(ValueRange { min, max }) = self.range {
            if min.is_some_and(f64::is_nan) || max.is_some_and(f64::is_nan) {
                return Err(ContractErr::schema(name, "range bounds can't be NaN"));
            }

            if let (Some(min), Some(max)) = (min, max)
                && min > max
            {
                return Err(ContractErr::schema(
                    name,
                    format!("invalid range, min {min} is greater than max {max}"),
                ));
            }
        }

        match self.kind {
            FeatureKind::Categorical => {
                if self.range.is_some() || self.default.is_some() {
                    return Err(ContractErr::schema(
                        name,
                        "categorical features take neither a range nor a default",
                    ));
                }

                let mut seen = HashSet::new();
                if let Some(dup) = self.categories.iter().find(|c| !seen.insert(c.as_str())) {
                    return Err(ContractErr::schema(name, format!("duplicate category `{dup}`")));
                }
            }
            kind => {
                if !self.categories.is_empty() {
                    return Err(ContractErr::schema(
                        name,
                        "numeric features can't declare categories",
                    ));
                }

                if let Some(default) = self.default {
                    if !default.is_finite() {
                        return Err(ContractErr::schema(name, "the default must be finite"));
                    }

                    if kind == FeatureKind::Discrete && default.fract() != 0.0 {
                        return Err(ContractErr::schema(
                            name,
                            format!("the default {default} of a discrete feature must be integral"),
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

/// The ordered, typed schema a model expects as input.
///
/// The order of the features is part of the contract's identity: it is the column order the
/// scaler and estimator were fitted with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FeatureSpec>", into = "Vec<FeatureSpec>")]
pub struct FeatureContract {
    features: Vec<FeatureSpec>,
}

impl FeatureContract {
    /// Creates a new contract.
    ///
    /// # Arguments
    /// * `features` - The features, in the order the model consumes them.
    ///
    /// # Returns
    /// The contract or a schema error if there are no features, the names aren't unique or a
    /// feature is ill-defined (e.g. its range's min is greater than its max).
    pub fn define(features: Vec<FeatureSpec>) -> Result<Self, ContractErr> {
        if features.is_empty() {
            return Err(ContractErr::Schema {
                field: None,
                reason: "a contract needs at least one feature".into(),
            });
        }

        let mut names = HashSet::with_capacity(features.len());
        for feature in &features {
            feature.check()?;

            if !names.insert(feature.name.as_str()) {
                return Err(ContractErr::schema(&feature.name, "duplicate feature name"));
            }
        }

        Ok(Self { features })
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    /// The feature names in contract order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl TryFrom<Vec<FeatureSpec>> for FeatureContract {
    type Error = ContractErr;

    fn try_from(value: Vec<FeatureSpec>) -> Result<Self, Self::Error> {
        Self::define(value)
    }
}

impl From<FeatureContract> for Vec<FeatureSpec> {
    fn from(value: FeatureContract) -> Self {
        value.features
    }
}
