use super::Smoother;
use crate::error::{AnalysisError, ConfigError};
use nalgebra::DMatrix;
use nalgebra_sparse::{CscMatrix, coo::CooMatrix, factorization::CscCholesky};
use quantal_common::Real;

const SECOND_DIFFERENCE: [Real; 3] = [1.0, -2.0, 1.0];

/// Asymmetric least squares baseline.
///
/// Each iteration solves `(W + λ DᵀD) z = W y`, where `D` is the second
/// difference operator, then reweights every sample with `p` when it lies
/// above the current baseline and `1 - p` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct AsymmetricLeastSquares {
    lambda: Real,
    p: Real,
    iterations: usize,
}

impl AsymmetricLeastSquares {
    pub fn new(lambda: Real, p: Real, iterations: usize) -> Result<Self, ConfigError> {
        if !(lambda.is_finite() && lambda > 0.0) {
            return Err(ConfigError::Smoothness(lambda));
        }
        if !(p > 0.0 && p < 1.0) {
            return Err(ConfigError::Asymmetry(p));
        }
        if iterations == 0 {
            return Err(ConfigError::Iterations);
        }
        Ok(Self {
            lambda,
            p,
            iterations,
        })
    }

    /// `λ DᵀD` in triplet form. Entries at repeated positions sum on conversion.
    fn penalty(&self, n: usize) -> CooMatrix<Real> {
        let mut coo = CooMatrix::new(n, n);
        for k in 0..n.saturating_sub(2) {
            for (a, ca) in SECOND_DIFFERENCE.iter().enumerate() {
                for (b, cb) in SECOND_DIFFERENCE.iter().enumerate() {
                    coo.push(k + a, k + b, self.lambda * ca * cb);
                }
            }
        }
        coo
    }
}

impl Smoother for AsymmetricLeastSquares {
    fn apply(&self, y: &[Real]) -> Result<Vec<Real>, AnalysisError> {
        let n = y.len();
        if n < 3 {
            return Ok(y.to_vec());
        }
        let penalty = self.penalty(n);
        let mut weights = vec![1.0; n];
        let mut z = y.to_vec();

        for _ in 0..self.iterations {
            let mut system = penalty.clone();
            for (i, w) in weights.iter().enumerate() {
                system.push(i, i, *w);
            }
            let cholesky = CscCholesky::factor(&CscMatrix::from(&system))
                .map_err(|_| AnalysisError::Numerical("baseline system is not positive definite"))?;

            let rhs: Vec<Real> = weights.iter().zip(y).map(|(w, v)| w * v).collect();
            let solution = cholesky.solve(&DMatrix::from_column_slice(n, 1, &rhs));
            z = solution.column(0).iter().copied().collect();

            for ((w, yi), zi) in weights.iter_mut().zip(y).zip(&z) {
                *w = if yi > zi { self.p } else { 1.0 - self.p };
            }
        }
        Ok(z)
    }
}

/// Baseline of `y` by asymmetric least squares with the given smoothness,
/// asymmetry and iteration count.
pub fn baseline_als(
    y: &[Real],
    lambda: Real,
    p: Real,
    iterations: usize,
) -> Result<Vec<Real>, AnalysisError> {
    AsymmetricLeastSquares::new(lambda, p, iterations)?.apply(y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn peak_on_floor() -> Vec<Real> {
        (0..100)
            .map(|i| 1.0 + 10.0 * (-((i as Real - 50.0) / 5.0).powi(2)).exp())
            .collect()
    }

    fn floor_distance(baseline: &[Real]) -> Real {
        baseline.iter().map(|z| (z - 1.0).abs()).sum::<Real>() / baseline.len() as Real
    }

    #[test]
    fn output_length_matches_input() {
        let y = peak_on_floor();
        assert_eq!(baseline_als(&y, 1e3, 0.1, 10).unwrap().len(), y.len());
        assert_eq!(baseline_als(&[], 1e3, 0.1, 10).unwrap().len(), 0);
        assert_eq!(baseline_als(&[2.0, 3.0], 1e3, 0.1, 10).unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn constant_signal_is_its_own_baseline() {
        let y = vec![4.0; 20];
        let z = baseline_als(&y, 1e6, 0.25, 10).unwrap();
        for v in z {
            assert_approx_eq!(v, 4.0, 1e-6);
        }
    }

    #[test]
    fn smaller_asymmetry_follows_lower_envelope() {
        let y = peak_on_floor();
        let tight = baseline_als(&y, 1e3, 0.01, 10).unwrap();
        let loose = baseline_als(&y, 1e3, 0.4, 10).unwrap();
        assert!(floor_distance(&tight) < floor_distance(&loose));
        assert!(tight[50] < y[50]);
    }

    #[test]
    fn invalid_parameters() {
        assert_eq!(
            AsymmetricLeastSquares::new(0.0, 0.1, 10),
            Err(ConfigError::Smoothness(0.0))
        );
        assert_eq!(
            AsymmetricLeastSquares::new(1.0, 1.0, 10),
            Err(ConfigError::Asymmetry(1.0))
        );
        assert_eq!(
            AsymmetricLeastSquares::new(1.0, 0.5, 0),
            Err(ConfigError::Iterations)
        );
        assert!(baseline_als(&[1.0; 5], Real::NAN, 0.5, 1).is_err());
    }
}
