//! Test statistics of observed versus expected event counts.

use dyb_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

fn check_lengths(data: &[f64], expected: &[f64]) -> Result<()> {
    if data.len() != expected.len() {
        return Err(Error::Computation(format!(
            "data has {} bins, expectation has {}",
            data.len(),
            expected.len()
        )));
    }
    Ok(())
}

fn check_expected(m: f64, i: usize) -> Result<()> {
    if m.is_nan() || m <= 0.0 {
        return Err(Error::Computation(format!("expectation in bin {i} is not positive: {m}")));
    }
    Ok(())
}

/// Pearson's χ²: `Σ (d − m)² / m`.
pub fn chi2_pearson(data: &[f64], expected: &[f64]) -> Result<f64> {
    check_lengths(data, expected)?;
    let mut chi2 = 0.0;
    for (i, (&d, &m)) in data.iter().zip(expected).enumerate() {
        check_expected(m, i)?;
        chi2 += (d - m).powi(2) / m;
    }
    Ok(chi2)
}

/// Combined Neyman–Pearson variance `3 / (1/d + 2/m)`; `m / 2` for empty bins.
pub fn cnp_variance(d: f64, m: f64) -> f64 {
    if d > 0.0 { 3.0 / (1.0 / d + 2.0 / m) } else { 0.5 * m }
}

/// Combined Neyman–Pearson χ²: `Σ (d − m)² / σ²_CNP`.
pub fn chi2_cnp(data: &[f64], expected: &[f64]) -> Result<f64> {
    check_lengths(data, expected)?;
    let mut chi2 = 0.0;
    for (i, (&d, &m)) in data.iter().zip(expected).enumerate() {
        check_expected(m, i)?;
        chi2 += (d - m).powi(2) / cnp_variance(d, m);
    }
    Ok(chi2)
}

/// Pull term `Σ ((θ − θ₀) / σ)²` over every element of the given parameters.
pub fn pull(values: &[&[f64]], centrals: &[Vec<f64>], sigmas: &[Vec<f64>]) -> f64 {
    values
        .iter()
        .zip(centrals.iter().zip(sigmas))
        .flat_map(|(v, (c, s))| v.iter().zip(c.iter().zip(s)))
        .map(|(v, (c, s))| ((v - c) / s).powi(2))
        .sum()
}

/// `rᵀ (V_CNP + V_syst)⁻¹ r` with `r = d − m` and the diagonal CNP statistical
/// variance, solved through a Cholesky factorization.
pub fn chi2_covariance(data: &[f64], expected: &[f64], syst: &[f64]) -> Result<f64> {
    check_lengths(data, expected)?;
    let n = data.len();
    if syst.len() != n * n {
        return Err(Error::Computation(format!(
            "covariance has {} elements, expected {n}×{n}",
            syst.len()
        )));
    }
    let mut v = DMatrix::from_row_slice(n, n, syst);
    for (i, (&d, &m)) in data.iter().zip(expected).enumerate() {
        check_expected(m, i)?;
        v[(i, i)] += cnp_variance(d, m);
    }
    let residual = DVector::from_iterator(n, data.iter().zip(expected).map(|(d, m)| d - m));
    let cholesky = v.cholesky().ok_or_else(|| {
        Error::Computation("covariance matrix is not positive definite".to_string())
    })?;
    let solved = cholesky.solve(&residual);
    Ok(residual.dot(&solved))
}
