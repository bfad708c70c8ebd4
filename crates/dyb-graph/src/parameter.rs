//! Model parameters with a LIFO staging stack.

use dyb_core::{Array, Error, ParameterKind, ParameterRecord, PathKey, Result};

use crate::node::NodeId;

/// Named scalar or vector input of the graph.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub(crate) path: PathKey,
    pub(crate) kind: ParameterKind,
    pub(crate) current: Array,
    pub(crate) central: Array,
    pub(crate) sigma: Option<Array>,
    pub(crate) stack: Vec<Array>,
    pub(crate) label: Option<String>,
    pub(crate) dependents: Vec<NodeId>,
}

impl Parameter {
    pub(crate) fn from_spec(path: PathKey, spec: ParameterSpec) -> Result<Self> {
        if let Some(sigma) = &spec.sigma
            && sigma.shape() != spec.central.shape()
        {
            return Err(Error::Validation(format!(
                "parameter '{path}': sigma shape {:?} differs from central shape {:?}",
                sigma.shape(),
                spec.central.shape()
            )));
        }
        if spec.kind == ParameterKind::Constrained && spec.sigma.is_none() {
            return Err(Error::Validation(format!(
                "constrained parameter '{path}' has no sigma"
            )));
        }
        Ok(Self {
            path,
            kind: spec.kind,
            current: spec.central.clone(),
            central: spec.central,
            sigma: spec.sigma,
            stack: Vec::new(),
            label: spec.label,
            dependents: Vec::new(),
        })
    }

    /// Canonical path (`parameters.all.<name>`).
    pub fn path(&self) -> &PathKey {
        &self.path
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn is_free(&self) -> bool {
        self.kind == ParameterKind::Free
    }

    pub fn value(&self) -> &Array {
        &self.current
    }

    pub fn central(&self) -> &Array {
        &self.central
    }

    pub fn sigma(&self) -> Option<&Array> {
        self.sigma.as_ref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Number of staged values.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    pub fn record(&self) -> ParameterRecord {
        ParameterRecord {
            path: self.path.clone(),
            kind: self.kind,
            value: self.current.clone(),
            central: self.central.clone(),
            sigma: self.sigma.clone(),
            label: self.label.clone(),
        }
    }

    fn check_shape(&self, value: &Array) -> Result<()> {
        if value.shape() != self.central.shape() {
            return Err(Error::Validation(format!(
                "parameter '{}': value shape {:?} does not match {:?}",
                self.path,
                value.shape(),
                self.central.shape()
            )));
        }
        Ok(())
    }

    pub(crate) fn set(&mut self, value: Array) -> Result<()> {
        self.check_shape(&value)?;
        self.current = value;
        Ok(())
    }

    pub(crate) fn push(&mut self, value: Array) -> Result<()> {
        self.check_shape(&value)?;
        let previous = std::mem::replace(&mut self.current, value);
        self.stack.push(previous);
        Ok(())
    }

    pub(crate) fn push_current(&mut self) {
        self.stack.push(self.current.clone());
    }

    pub(crate) fn pop(&mut self) -> Result<()> {
        let top = self
            .stack
            .pop()
            .ok_or_else(|| Error::EmptyStagingStack(self.path.to_dotted()))?;
        self.current = top;
        Ok(())
    }
}

/// Declaration of a parameter for [`crate::ModelBuilder::parameter`].
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub(crate) kind: ParameterKind,
    pub(crate) central: Array,
    pub(crate) sigma: Option<Array>,
    pub(crate) label: Option<String>,
}

impl ParameterSpec {
    pub fn free(value: impl Into<Array>) -> Self {
        Self { kind: ParameterKind::Free, central: value.into(), sigma: None, label: None }
    }

    /// Gaussian-constrained parameter `central ± sigma`.
    pub fn constrained(central: impl Into<Array>, sigma: impl Into<Array>) -> Self {
        Self {
            kind: ParameterKind::Constrained,
            central: central.into(),
            sigma: Some(sigma.into()),
            label: None,
        }
    }

    pub fn constant(value: impl Into<Array>) -> Self {
        Self { kind: ParameterKind::Constant, central: value.into(), sigma: None, label: None }
    }

    /// Optional uncertainty for free parameters (used by reports only).
    pub fn with_sigma(mut self, sigma: impl Into<Array>) -> Self {
        self.sigma = Some(sigma.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Parse a `--par` value: a float, or a comma-separated list for vector parameters.
pub(crate) fn parse_value(path: &PathKey, text: &str, like: &Array) -> Result<Array> {
    let values = text
        .split(',')
        .map(|s| {
            let s = s.trim();
            s.parse::<f64>().map_err(|_| {
                Error::Validation(format!("parameter '{path}': cannot parse '{s}' as a number"))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    if values.len() != like.len() {
        return Err(Error::Validation(format!(
            "parameter '{path}' expects {} value(s), got {}",
            like.len(),
            values.len()
        )));
    }
    Array::new(like.shape().to_vec(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn theta() -> Parameter {
        let path = PathKey::parse("parameters.all.SinSq2Theta13").unwrap();
        Parameter::from_spec(path, ParameterSpec::free(0.0853)).unwrap()
    }

    #[test]
    fn push_pop_restores() {
        let mut p = theta();
        p.push(Array::scalar(0.1)).unwrap();
        assert_eq!(p.value().as_scalar(), Some(0.1));
        assert_eq!(p.depth(), 1);
        p.pop().unwrap();
        assert_eq!(p.value().as_scalar(), Some(0.0853));
        assert!(matches!(p.pop(), Err(Error::EmptyStagingStack(_))));
    }

    #[test]
    fn push_current_keeps_value() {
        let mut p = theta();
        p.push_current();
        p.set(Array::scalar(0.2)).unwrap();
        p.pop().unwrap();
        assert_eq!(p.value().as_scalar(), Some(0.0853));
    }

    #[test]
    fn shape_is_enforced() {
        let mut p = theta();
        assert!(p.set(Array::vector(vec![1.0, 2.0])).is_err());
        assert!(p.push(Array::vector(vec![1.0])).is_err());
        assert_eq!(p.depth(), 0);
    }

    #[test]
    fn constrained_requires_sigma() {
        let path = PathKey::parse("parameters.all.eff").unwrap();
        let spec = ParameterSpec { sigma: None, ..ParameterSpec::constrained(1.0, 0.01) };
        assert!(Parameter::from_spec(path.clone(), spec).is_err());
        let bad = ParameterSpec::constrained(Array::vector(vec![1.0, 1.0]), 0.01);
        assert!(Parameter::from_spec(path, bad).is_err());
    }

    #[test]
    fn parse_values() {
        let path = PathKey::parse("p").unwrap();
        assert_eq!(parse_value(&path, " 0.5 ", &Array::scalar(0.0)).unwrap(), Array::scalar(0.5));
        let v = parse_value(&path, "1,2,3", &Array::vector(vec![0.0; 3])).unwrap();
        assert_eq!(v.data(), &[1.0, 2.0, 3.0]);
        assert!(parse_value(&path, "1,2", &Array::scalar(0.0)).is_err());
        assert!(parse_value(&path, "abc", &Array::scalar(0.0)).is_err());
    }

    proptest! {
        #[test]
        fn nested_push_pop_is_lifo(values in proptest::collection::vec(-1e3f64..1e3, 1..16)) {
            let mut p = theta();
            let mut seen = vec![p.value().clone()];
            for v in &values {
                p.push(Array::scalar(*v)).unwrap();
                seen.push(p.value().clone());
            }
            for expected in seen.iter().rev().skip(1) {
                p.pop().unwrap();
                prop_assert_eq!(p.value(), expected);
            }
            prop_assert_eq!(p.depth(), 0);
        }
    }
}
