//! Construction options of the reactor model.

use std::path::PathBuf;

use dyb_io::Format;
use serde::Deserialize;

/// Default seed of the synthetic observed dataset.
pub const DEFAULT_SEED: u64 = 20_120_308;

/// Options of [`crate::build_model`].
///
/// In YAML:
///
/// ```yaml
/// path_data: data
/// source_type: tsv
/// seed: 42
/// parameter_values:
///   - [SinSq2Theta13, 0.09]
///   - [detector.eff.AD11, "1.001"]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Directory with the input data; synthetic inputs when absent
    pub path_data: Option<PathBuf>,
    pub source_type: Format,
    /// `--par NAME VALUE` overrides, applied in order after construction
    pub parameter_values: Vec<ParameterOverride>,
    /// Seed of the Poisson-sampled observed dataset (synthetic inputs only)
    pub seed: u64,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            path_data: None,
            source_type: Format::Json,
            parameter_values: Vec::new(),
            seed: DEFAULT_SEED,
        }
    }
}

impl ModelOptions {
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameter_values.push(ParameterOverride { name: name.into(), value: value.into() });
        self
    }
}

/// One `NAME VALUE` override; `value` is a float or a comma-separated list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "(String, OverrideValue)")]
pub struct ParameterOverride {
    pub name: String,
    pub value: String,
}

/// Value of a configured override as written in YAML: a number, a list of numbers
/// or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OverrideValue {
    Number(f64),
    List(Vec<f64>),
    Text(String),
}

impl From<(String, OverrideValue)> for ParameterOverride {
    fn from((name, raw): (String, OverrideValue)) -> Self {
        let value = match raw {
            OverrideValue::Number(v) => v.to_string(),
            OverrideValue::List(v) => v.iter().map(f64::to_string).collect::<Vec<_>>().join(","),
            OverrideValue::Text(s) => s,
        };
        Self { name, value }
    }
}
