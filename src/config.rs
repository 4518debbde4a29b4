use crate::error::Error;
use crate::error::Result;
use crate::Discount;
use crate::Value;
use serde::Deserialize;
use std::collections::BTreeMap;

/// startup configuration shared by both model flavors, shaped after the JSON
/// file the ingesting collaborator hands over. fields that only one flavor
/// requires are optional here and checked by that flavor's constructor.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// modeled parameters, keyed by name
    pub parameters: BTreeMap<String, ParameterSpec>,
    /// executable actions: kind to magnitudes, or no magnitude at all
    pub actions: BTreeMap<String, Option<Vec<f64>>>,
    /// reward discount, must lie strictly inside (0, 1)
    pub discount: Discount,
    /// Q-value every fresh record starts from
    pub initial_q_values: Value,
    #[serde(default)]
    pub update_algorithm: Option<UpdateAlgorithm>,
    /// parameters to pre-split the decision tree on, with their thresholds
    #[serde(default)]
    pub initial_parameters: Option<BTreeMap<String, ParameterSpec>>,
    #[serde(default)]
    pub split_error: Option<f64>,
    #[serde(default)]
    pub min_measurements: Option<usize>,
}

impl Config {
    /// parse the collaborator's JSON configuration file contents.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// construction-time checks shared by both flavors.
    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.discount > 0.0 && self.discount < 1.0) {
            return Err(Error::Configuration(format!(
                "discount must lie strictly between 0 and 1, got {}",
                self.discount
            )));
        }
        if self.parameters.is_empty() {
            return Err(Error::Configuration(
                "at least one parameter must be provided".to_string(),
            ));
        }
        if self.actions.is_empty() {
            return Err(Error::Configuration(
                "at least one action must be provided".to_string(),
            ));
        }
        Ok(())
    }
}

/// a modeled parameter is declared either by its distinct values or by the
/// limits of its continuous range. both reduce to a sorted list of internal
/// thresholds that carve the axis into buckets.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSpec {
    Values(Vec<f64>),
    Limits(Vec<f64>),
}

impl ParameterSpec {
    /// internal routing thresholds: midpoints between consecutive discrete
    /// values, or the continuous limits with the outer edges discarded.
    pub fn thresholds(&self, name: &str) -> Result<Vec<f64>> {
        match self {
            Self::Values(values) => {
                if values.len() < 2 {
                    return Err(Error::Configuration(format!(
                        "at least two values must be provided for {}",
                        name
                    )));
                }
                if !ascending(values) {
                    return Err(Error::Configuration(format!(
                        "values for {} must be distinct and ascending",
                        name
                    )));
                }
                Ok(values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect())
            }
            Self::Limits(limits) => {
                if limits.len() < 3 {
                    return Err(Error::Configuration(format!(
                        "at least three limits must be provided for {}",
                        name
                    )));
                }
                if !ascending(limits) {
                    return Err(Error::Configuration(format!(
                        "limits for {} must be distinct and ascending",
                        name
                    )));
                }
                Ok(limits[1..limits.len() - 1].to_vec())
            }
        }
    }
}

fn ascending(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

/// how fresh evidence is propagated through the Q-table on every update.
/// no_update is a documented no-op: statistics accumulate, values stand still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAlgorithm {
    NoUpdate,
    SingleUpdate,
    ValueIteration,
    PrioritizedSweeping,
}

impl std::str::FromStr for UpdateAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no_update" => Ok(Self::NoUpdate),
            "single_update" => Ok(Self::SingleUpdate),
            "value_iteration" => Ok(Self::ValueIteration),
            "prioritized_sweeping" => Ok(Self::PrioritizedSweeping),
            _ => Err(Error::Parameter(format!("unknown update algorithm: {}", s))),
        }
    }
}

impl std::fmt::Display for UpdateAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoUpdate => write!(f, "no_update"),
            Self::SingleUpdate => write!(f, "single_update"),
            Self::ValueIteration => write!(f, "value_iteration"),
            Self::PrioritizedSweeping => write!(f, "prioritized_sweeping"),
        }
    }
}
