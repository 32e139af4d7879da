use super::Smoother;
use crate::error::{AnalysisError, ConfigError};
use nalgebra::DMatrix;
use quantal_common::Real;

/// Local polynomial smoother over an odd window.
#[derive(Debug, Clone, PartialEq)]
pub struct SavitzkyGolay {
    window: usize,
    order: usize,
}

impl SavitzkyGolay {
    pub fn new(window: usize, order: usize) -> Result<Self, ConfigError> {
        if window % 2 == 0 {
            return Err(ConfigError::EvenWindow(window));
        }
        if window < order + 1 {
            return Err(ConfigError::WindowTooSmall { window, order });
        }
        Ok(Self { window, order })
    }

    /// Smoothing weights for the centre of the window: the first row of the
    /// pseudo-inverse of the window's Vandermonde matrix.
    fn coefficients(&self) -> Result<Vec<Real>, AnalysisError> {
        let half = (self.window / 2) as Real;
        let design = DMatrix::from_fn(self.window, self.order + 1, |i, j| {
            (i as Real - half).powi(j as i32)
        });
        let inverse = design
            .pseudo_inverse(1e-12)
            .map_err(|_| AnalysisError::Numerical("Savitzky-Golay design matrix"))?;
        Ok(inverse.row(0).iter().copied().collect())
    }

    /// Extends `y` by `half` samples at each end, reflected about the end values.
    fn pad(y: &[Real], half: usize) -> Vec<Real> {
        let last = y.len() - 1;
        let first_value = y[0];
        let last_value = y[last];
        let mut padded = Vec::with_capacity(y.len() + 2 * half);
        padded.extend(
            (1..=half)
                .rev()
                .map(|k| first_value - (y[k.min(last)] - first_value).abs()),
        );
        padded.extend_from_slice(y);
        padded.extend(
            (1..=half).map(|k| last_value + (y[last.saturating_sub(k)] - last_value).abs()),
        );
        padded
    }
}

impl Smoother for SavitzkyGolay {
    fn apply(&self, y: &[Real]) -> Result<Vec<Real>, AnalysisError> {
        if y.is_empty() {
            return Ok(Vec::new());
        }
        let coefficients = self.coefficients()?;
        let padded = Self::pad(y, self.window / 2);
        Ok(padded
            .windows(self.window)
            .map(|w| w.iter().zip(&coefficients).map(|(v, c)| v * c).sum())
            .collect())
    }
}

/// Savitzky-Golay smoothing of `y` with an odd `window` and polynomial `order`.
pub fn savitzky_golay(y: &[Real], window: usize, order: usize) -> Result<Vec<Real>, AnalysisError> {
    SavitzkyGolay::new(window, order)?.apply(y)
}
