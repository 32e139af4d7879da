use crate::error::ConfigError;
use quantal_common::Real;
use serde::{Deserialize, Serialize};

/// How the component widths relate to each other.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidthModel {
    /// One width shared by every component.
    Shared,
    /// One free width `w`, with component `m` of width `w·√max(m, 1)`.
    #[default]
    Scaled,
    /// One free width per component.
    Independent,
}

/// Sum of evenly spaced Gaussians centred at `m·q` for consecutive multiples `m`.
///
/// Parameters are packed as `[q, widths.., amplitudes..]`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantalModel {
    n_components: usize,
    first_multiple: usize,
    width_model: WidthModel,
}

impl QuantalModel {
    pub fn new(
        n_components: usize,
        first_multiple: usize,
        width_model: WidthModel,
    ) -> Result<Self, ConfigError> {
        if n_components == 0 {
            return Err(ConfigError::Components);
        }
        if first_multiple > 1 {
            return Err(ConfigError::FirstMultiple(first_multiple));
        }
        Ok(Self {
            n_components,
            first_multiple,
            width_model,
        })
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn multiples(&self) -> std::ops::Range<usize> {
        self.first_multiple..self.first_multiple + self.n_components
    }

    fn n_widths(&self) -> usize {
        match self.width_model {
            WidthModel::Shared | WidthModel::Scaled => 1,
            WidthModel::Independent => self.n_components,
        }
    }

    pub fn n_parameters(&self) -> usize {
        1 + self.n_widths() + self.n_components
    }

    fn width_index(&self, k: usize) -> usize {
        match self.width_model {
            WidthModel::Shared | WidthModel::Scaled => 1,
            WidthModel::Independent => 1 + k,
        }
    }

    fn amplitude_index(&self, k: usize) -> usize {
        1 + self.n_widths() + k
    }

    /// Factor relating the free width parameter to the width of component `k`.
    fn width_scale(&self, k: usize) -> Real {
        match self.width_model {
            WidthModel::Scaled => ((self.first_multiple + k).max(1) as Real).sqrt(),
            WidthModel::Shared | WidthModel::Independent => 1.0,
        }
    }

    /// Width of every component.
    pub fn sigmas(&self, params: &[Real]) -> Vec<Real> {
        (0..self.n_components)
            .map(|k| (params[self.width_index(k)] * self.width_scale(k)).abs())
            .collect()
    }

    pub fn amplitudes(&self, params: &[Real]) -> Vec<Real> {
        (0..self.n_components)
            .map(|k| params[self.amplitude_index(k)])
            .collect()
    }

    pub fn evaluate(&self, params: &[Real], x: Real) -> Real {
        let q = params[0];
        self.multiples()
            .enumerate()
            .map(|(k, m)| {
                let sigma = params[self.width_index(k)] * self.width_scale(k);
                let d = x - m as Real * q;
                params[self.amplitude_index(k)] * (-d * d / (2.0 * sigma * sigma)).exp()
            })
            .sum()
    }

    /// Partial derivatives of the model at `x` with respect to each parameter.
    pub fn gradient(&self, params: &[Real], x: Real, out: &mut [Real]) {
        out.iter_mut().for_each(|g| *g = 0.0);
        let q = params[0];
        for (k, m) in self.multiples().enumerate() {
            let scale = self.width_scale(k);
            let sigma = params[self.width_index(k)] * scale;
            let amplitude = params[self.amplitude_index(k)];
            let m = m as Real;
            let d = x - m * q;
            let g = (-d * d / (2.0 * sigma * sigma)).exp();
            out[0] += amplitude * g * d * m / (sigma * sigma);
            out[self.width_index(k)] += amplitude * g * d * d / sigma.powi(3) * scale;
            out[self.amplitude_index(k)] = g;
        }
    }

    /// Starting parameters: the guessed quantal size and width, with each
    /// amplitude taken from the count in the bin nearest its centre. Components
    /// centred outside the histogram start at zero.
    pub fn initial_guess(&self, centres: &[Real], counts: &[Real], q0: Real, w0: Real) -> Vec<Real> {
        let mut params = vec![0.0; self.n_parameters()];
        params[0] = q0;
        for k in 0..self.n_widths() {
            params[1 + k] = w0;
        }
        let half_bin = match centres {
            [a, b, ..] => (b - a).abs() / 2.0,
            _ => 0.0,
        };
        let (low, high) = match (centres.first(), centres.last()) {
            (Some(first), Some(last)) => (first - half_bin, last + half_bin),
            _ => (0.0, 0.0),
        };
        for (k, m) in self.multiples().enumerate() {
            let centre = m as Real * q0;
            if centre < low || centre > high {
                continue;
            }
            let nearest = centres
                .iter()
                .enumerate()
                .min_by(|a, b| (a.1 - centre).abs().total_cmp(&(b.1 - centre).abs()))
                .map(|(i, _)| i);
            if let Some(i) = nearest {
                params[self.amplitude_index(k)] = counts.get(i).copied().unwrap_or_default();
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn parameter_layout() {
        let scaled = QuantalModel::new(3, 1, WidthModel::Scaled).unwrap();
        assert_eq!(scaled.n_parameters(), 5);
        let independent = QuantalModel::new(3, 1, WidthModel::Independent).unwrap();
        assert_eq!(independent.n_parameters(), 7);
        assert_eq!(scaled.multiples().collect::<Vec<_>>(), vec![1, 2, 3]);
        let from_zero = QuantalModel::new(2, 0, WidthModel::Shared).unwrap();
        assert_eq!(from_zero.multiples().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn scaled_widths_grow_with_root_multiple() {
        let model = QuantalModel::new(3, 0, WidthModel::Scaled).unwrap();
        let sigmas = model.sigmas(&[0.1, 0.02, 1.0, 1.0, 1.0]);
        assert_approx_eq!(sigmas[0], 0.02, 1e-12);
        assert_approx_eq!(sigmas[1], 0.02, 1e-12);
        assert_approx_eq!(sigmas[2], 0.02 * 2.0_f64.sqrt(), 1e-12);
    }

    #[test]
    fn evaluates_at_component_centres() {
        let model = QuantalModel::new(2, 1, WidthModel::Shared).unwrap();
        let params = [0.1, 0.001, 5.0, 3.0];
        assert_approx_eq!(model.evaluate(&params, 0.1), 5.0, 1e-9);
        assert_approx_eq!(model.evaluate(&params, 0.2), 3.0, 1e-9);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let model = QuantalModel::new(3, 1, WidthModel::Scaled).unwrap();
        let params = vec![0.1, 0.02, 50.0, 30.0, 10.0];
        let x = 0.17;
        let mut analytic = vec![0.0; params.len()];
        model.gradient(&params, x, &mut analytic);
        for i in 0..params.len() {
            let h = 1e-7 * params[i].abs().max(1e-3);
            let mut up = params.clone();
            up[i] += h;
            let mut down = params.clone();
            down[i] -= h;
            let numeric = (model.evaluate(&up, x) - model.evaluate(&down, x)) / (2.0 * h);
            assert_approx_eq!(analytic[i], numeric, 1e-4 * numeric.abs().max(1.0));
        }
    }

    #[test]
    fn initial_amplitudes_from_nearest_bins() {
        let model = QuantalModel::new(3, 1, WidthModel::Scaled).unwrap();
        let centres = [0.05, 0.15, 0.25];
        let counts = [1.0, 2.0, 3.0];
        let params = model.initial_guess(&centres, &counts, 0.14, 0.01);
        // the third component at 0.42 lies beyond the last bin
        assert_eq!(params, vec![0.14, 0.01, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn rejects_bad_layouts() {
        assert_eq!(
            QuantalModel::new(0, 1, WidthModel::Scaled),
            Err(ConfigError::Components)
        );
        assert_eq!(
            QuantalModel::new(3, 2, WidthModel::Scaled),
            Err(ConfigError::FirstMultiple(2))
        );
    }
}
