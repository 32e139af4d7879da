//! Estimation of the quantal size from a peak amplitude histogram by fitting
//! a sum of Gaussians centred on multiples of a common unit.
mod levenberg_marquardt;
mod model;

pub use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, Minimisation, Termination};
pub use model::{QuantalModel, WidthModel};

use crate::error::ConfigError;
use metrics::counter;
use nalgebra::{DMatrix, DVector};
use quantal_common::{
    Real,
    metrics::{
        failures::{self, FailureKind},
        names::{FAILURES, FITS_ATTEMPTED},
    },
};
use tracing::{info, warn};

/// Histogram residuals `model(x) − y` for a [`QuantalModel`].
struct HistogramProblem<'a> {
    model: &'a QuantalModel,
    centres: &'a [Real],
    counts: &'a [Real],
}

impl LeastSquaresProblem for HistogramProblem<'_> {
    fn residuals(&self, params: &DVector<Real>) -> DVector<Real> {
        let p = params.as_slice();
        DVector::from_iterator(
            self.centres.len(),
            self.centres
                .iter()
                .zip(self.counts)
                .map(|(&x, &y)| self.model.evaluate(p, x) - y),
        )
    }

    fn jacobian(&self, params: &DVector<Real>) -> DMatrix<Real> {
        let p = params.as_slice();
        let mut jacobian = DMatrix::zeros(self.centres.len(), params.len());
        let mut row = vec![0.0; params.len()];
        for (i, &x) in self.centres.iter().enumerate() {
            self.model.gradient(p, x, &mut row);
            for (j, &g) in row.iter().enumerate() {
                jacobian[(i, j)] = g;
            }
        }
        jacobian
    }
}

/// Outcome of a quantal fit. Unsuccessful fits keep their last parameters but
/// produce no display curve.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantalFit {
    pub q: Real,
    /// Width of each component.
    pub widths: Vec<Real>,
    pub amplitudes: Vec<Real>,
    pub success: bool,
    pub termination: Termination,
    pub iterations: usize,
    pub residual_sum_of_squares: Real,
    pub r_squared: Real,
    model: QuantalModel,
    params: Vec<Real>,
}

impl QuantalFit {
    pub fn evaluate(&self, x: Real) -> Real {
        self.model.evaluate(&self.params, x)
    }

    /// `points` evenly spaced samples of the fitted curve over `[x_min, x_max]`.
    pub fn curve(&self, x_min: Real, x_max: Real, points: usize) -> Option<(Vec<Real>, Vec<Real>)> {
        if !self.success {
            return None;
        }
        let step = if points > 1 {
            (x_max - x_min) / (points - 1) as Real
        } else {
            0.0
        };
        let xs: Vec<Real> = (0..points).map(|i| x_min + step * i as Real).collect();
        let ys = xs.iter().map(|&x| self.evaluate(x)).collect();
        Some((xs, ys))
    }
}

/// Fits a [`QuantalModel`] to histogram counts with Levenberg-Marquardt.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantalFitter {
    pub model: QuantalModel,
    pub solver: LevenbergMarquardt,
}

impl QuantalFitter {
    pub fn new(model: QuantalModel) -> Self {
        Self {
            model,
            solver: LevenbergMarquardt::default(),
        }
    }

    /// Fits counts `counts` at bin centres `centres`, starting from quantal size
    /// `q0` and width `w0`.
    pub fn fit(
        &self,
        centres: &[Real],
        counts: &[Real],
        q0: Real,
        w0: Real,
    ) -> Result<QuantalFit, ConfigError> {
        if centres.len() != counts.len() {
            return Err(ConfigError::FitShape {
                centres: centres.len(),
                counts: counts.len(),
            });
        }
        if !(q0.is_finite() && q0 > 0.0) {
            return Err(ConfigError::QuantalGuess(q0));
        }
        if !(w0.is_finite() && w0 > 0.0) {
            return Err(ConfigError::WidthGuess(w0));
        }
        counter!(FITS_ATTEMPTED).increment(1);

        let initial = self.model.initial_guess(centres, counts, q0, w0);
        let minimisation = if counts.iter().all(|&c| c == 0.0) {
            Minimisation {
                params: DVector::from_vec(initial),
                cost: 0.0,
                iterations: 0,
                termination: Termination::NoData,
            }
        } else {
            let problem = HistogramProblem {
                model: &self.model,
                centres,
                counts,
            };
            self.solver.minimise(&problem, DVector::from_vec(initial))
        };

        let params: Vec<Real> = minimisation.params.iter().copied().collect();
        let success = minimisation.termination.is_converged();
        let fit = QuantalFit {
            q: params.first().copied().unwrap_or(Real::NAN),
            widths: self.model.sigmas(&params),
            amplitudes: self.model.amplitudes(&params),
            success,
            termination: minimisation.termination,
            iterations: minimisation.iterations,
            residual_sum_of_squares: minimisation.cost,
            r_squared: r_squared(counts, minimisation.cost),
            model: self.model.clone(),
            params,
        };

        if success {
            info!(
                "Fit of {} Gaussians: q = {}, r² = {} after {} iterations",
                self.model.n_components(),
                fit.q,
                fit.r_squared,
                fit.iterations
            );
        } else {
            warn!("Quantal fit failed: {:?}", fit.termination);
            counter!(
                FAILURES,
                &[failures::get_label(FailureKind::FitDidNotConverge)]
            )
            .increment(1);
        }
        Ok(fit)
    }
}

/// Coefficient of determination for a fit with residual sum of squares `ssr`.
fn r_squared(counts: &[Real], ssr: Real) -> Real {
    if counts.is_empty() {
        return Real::NAN;
    }
    let mean = counts.iter().sum::<Real>() / counts.len() as Real;
    let sst: Real = counts.iter().map(|c| (c - mean).powi(2)).sum();
    if sst > 0.0 {
        1.0 - ssr / sst
    } else if ssr == 0.0 {
        1.0
    } else {
        0.0
    }
}
