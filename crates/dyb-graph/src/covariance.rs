//! Systematic covariance matrices from parameter variations.
//!
//! For a target node `f` and constrained parameters `θ_k ± σ_k`,
//! `V = Σ_k D_k D_kᵀ` with `D_k = (f(θ_k + σ_k) − f(θ_k − σ_k)) / 2`.
//! Variations are applied with push/pop, so parameter values are left untouched.
//! Vector parameters contribute one term per element.

use dyb_core::{Array, Error, Result};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::model::{Model, invalidate_dependents};
use crate::node::{NodeId, NodeStatus, ParameterId};

#[derive(Debug, Clone)]
pub(crate) struct CovarianceBlock {
    pub(crate) output: NodeId,
    pub(crate) target: NodeId,
    pub(crate) parameters: Vec<ParameterId>,
}

impl Model {
    /// Recompute every declared covariance matrix and invalidate its dependents.
    pub fn update_covariance_matrix(&mut self) -> Result<()> {
        for i in 0..self.covariances.len() {
            let block = self.covariances[i].clone();
            let matrix = self.covariance_of(&block)?;
            let n = matrix.nrows();
            let data: Vec<f64> =
                (0..n).flat_map(|r| (0..n).map(move |c| (r, c))).map(|rc| matrix[rc]).collect();

            let slot = &mut self.nodes[block.output.0];
            slot.value = Some(Array::matrix(n, n, data)?);
            slot.status = NodeStatus::Fresh;
            slot.evaluations += 1;
            invalidate_dependents(&mut self.nodes, block.output);
            info!(
                output = %self.nodes[block.output.0].path,
                size = n,
                terms = block.parameters.len(),
                "covariance updated"
            );
        }
        Ok(())
    }

    fn covariance_of(&mut self, block: &CovarianceBlock) -> Result<DMatrix<f64>> {
        let n = self.value_of(block.target)?.len();
        let mut v = DMatrix::<f64>::zeros(n, n);

        for &pid in &block.parameters {
            let parameter = &self.parameters[pid.0];
            let current = parameter.value().clone();
            let sigma = parameter.sigma().cloned().ok_or_else(|| {
                Error::Validation(format!("parameter '{}' has no sigma", parameter.path()))
            })?;

            for j in 0..current.len() {
                let shifted = |delta: f64| {
                    let mut data = current.data().to_vec();
                    data[j] += delta;
                    Array::new(current.shape().to_vec(), data)
                };
                let up = self.variation(block.target, pid, shifted(sigma.data()[j])?)?;
                let down = self.variation(block.target, pid, shifted(-sigma.data()[j])?)?;
                if up.len() != n || down.len() != n {
                    return Err(Error::Computation(format!(
                        "'{}' changed size under a parameter variation",
                        self.nodes[block.target.0].path
                    )));
                }
                let d = DVector::from_iterator(
                    n,
                    up.data().iter().zip(down.data()).map(|(u, d)| 0.5 * (u - d)),
                );
                v += &d * d.transpose();
            }
            debug!(parameter = %self.parameters[pid.0].path(), "covariance term");
        }
        Ok(v)
    }

    fn variation(&mut self, target: NodeId, parameter: ParameterId, value: Array) -> Result<Array> {
        self.push_parameter(parameter, value)?;
        let result = self.value_of(target).cloned();
        self.pop_parameter(parameter)?;
        result
    }
}
