//! Drift estimation and smoothing of single traces.
//!
//! Both estimators map a trace to a sequence of the same length. Baseline
//! removal subtracts the [`AsymmetricLeastSquares`] estimate from the trace,
//! while [`SavitzkyGolay`] replaces the trace by its smoothed form.
mod als;
mod savitzky_golay;

pub use als::{AsymmetricLeastSquares, baseline_als};
pub use savitzky_golay::{SavitzkyGolay, savitzky_golay};

use crate::error::AnalysisError;
use quantal_common::Real;

pub trait Smoother {
    fn apply(&self, values: &[Real]) -> Result<Vec<Real>, AnalysisError>;
}

/// `values` with the estimated baseline removed.
pub fn subtract_baseline<S: Smoother>(
    estimator: &S,
    values: &[Real],
) -> Result<Vec<Real>, AnalysisError> {
    let baseline = estimator.apply(values)?;
    Ok(values.iter().zip(baseline).map(|(v, b)| v - b).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn subtracting_removes_offset() {
        let values = vec![5.0; 10];
        let estimator = AsymmetricLeastSquares::new(1e4, 0.1, 5).unwrap();
        for v in subtract_baseline(&estimator, &values).unwrap() {
            assert_approx_eq!(v, 0.0, 1e-6);
        }
    }
}
