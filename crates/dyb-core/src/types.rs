//! Common data types for dyb

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, PathKey, Result};

/// Dense row-major `f64` array with an explicit shape.
///
/// Shape `[]` is a scalar (one element), `[n]` a vector, `[r, c]` a matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawArray")]
pub struct Array {
    shape: Vec<usize>,
    data: Vec<f64>,
}

#[derive(Deserialize)]
struct RawArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl TryFrom<RawArray> for Array {
    type Error = Error;

    fn try_from(raw: RawArray) -> Result<Self> {
        Array::new(raw.shape, raw.data)
    }
}

impl Array {
    /// Create an array, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let Some(expected) = shape.iter().try_fold(1usize, |n, &d| n.checked_mul(d)) else {
            return Err(Error::Validation(format!("array shape {shape:?} overflows")));
        };
        if expected != data.len() {
            return Err(Error::Validation(format!(
                "array shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn scalar(value: f64) -> Self {
        Self { shape: Vec::new(), data: vec![value] }
    }

    pub fn vector(data: Vec<f64>) -> Self {
        Self { shape: vec![data.len()], data }
    }

    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        Self::new(vec![rows, cols], data)
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let n = shape.iter().product();
        Self { shape, data: vec![0.0; n] }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// The single element of a one-element array.
    pub fn as_scalar(&self) -> Option<f64> {
        match self.data.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }

    /// `(rows, cols)` for two-dimensional arrays.
    pub fn rows_cols(&self) -> Option<(usize, usize)> {
        match self.shape.as_slice() {
            [r, c] => Some((*r, *c)),
            _ => None,
        }
    }

    /// Elementwise map keeping the shape.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self { shape: self.shape.clone(), data: self.data.iter().map(|&v| f(v)).collect() }
    }
}

impl From<f64> for Array {
    fn from(value: f64) -> Self {
        Self::scalar(value)
    }
}

impl From<Vec<f64>> for Array {
    fn from(data: Vec<f64>) -> Self {
        Self::vector(data)
    }
}

/// How a parameter participates in a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// Unconstrained, subject to fitting
    Free,
    /// Nuisance parameter with a Gaussian constraint (`central ± sigma`)
    Constrained,
    /// Fixed input
    Constant,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Free => "free",
            ParameterKind::Constrained => "constrained",
            ParameterKind::Constant => "constant",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one parameter, used by tables and parameter reports.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterRecord {
    /// Canonical storage path
    pub path: PathKey,
    pub kind: ParameterKind,
    pub value: Array,
    pub central: Array,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigma: Option<Array>,
    /// Human readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}
