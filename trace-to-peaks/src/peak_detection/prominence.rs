use super::PeakDetector;
use crate::{
    data::{Peaks, Trace},
    error::ConfigError,
};
use quantal_common::Real;
use tracing::debug;

/// Keeps local maxima whose topographic prominence reaches a fixed threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ProminenceDetector {
    threshold: Real,
}

impl ProminenceDetector {
    pub fn new(threshold: Real) -> Result<Self, ConfigError> {
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(ConfigError::Threshold(threshold));
        }
        Ok(Self { threshold })
    }
}

impl PeakDetector for ProminenceDetector {
    fn detect(&self, trace: &Trace) -> Peaks {
        let values = &trace.values;
        let indices = local_maxima(values)
            .into_iter()
            .filter(|&peak| prominence(values, peak) >= self.threshold);
        let peaks = Peaks::from_indices(trace, indices);
        debug!(
            "Prominence detection (threshold {}) found {} peaks",
            self.threshold,
            peaks.len()
        );
        peaks
    }
}

/// Samples higher than their neighbours. A flat top counts once, at its middle
/// sample (rounded down). The end samples are never maxima.
pub(crate) fn local_maxima(x: &[Real]) -> Vec<usize> {
    let mut maxima = Vec::new();
    let last = x.len().saturating_sub(1);
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

/// Height of `peak` above the higher of the lowest points reached on either
/// side before the signal rises above the peak.
pub(crate) fn prominence(x: &[Real], peak: usize) -> Real {
    let height = x[peak];
    let left_min = x[..=peak]
        .iter()
        .rev()
        .take_while(|&&v| v <= height)
        .copied()
        .fold(height, Real::min);
    let right_min = x[peak..]
        .iter()
        .take_while(|&&v| v <= height)
        .copied()
        .fold(height, Real::min);
    height - left_min.max(right_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_trace() -> Trace {
        let values: Vec<Real> = vec![0.0, 1.0, 0.0, 5.0, 0.0, 1.0, 0.0, 6.0, 0.0];
        Trace::new((0..values.len()).map(|i| i as Real).collect(), values)
    }

    #[test]
    fn plateau_resolves_to_middle() {
        assert_eq!(local_maxima(&[0.0, 2.0, 2.0, 2.0, 0.0]), vec![2]);
        assert_eq!(local_maxima(&[0.0, 2.0, 2.0, 0.0]), vec![1]);
        // a plateau running into the end is not a maximum
        assert_eq!(local_maxima(&[0.0, 2.0, 2.0]), Vec::<usize>::new());
        assert_eq!(local_maxima(&[3.0, 1.0, 2.0]), Vec::<usize>::new());
    }

    #[test]
    fn prominence_against_higher_neighbour() {
        let x = [0.0, 4.0, 2.0, 3.0, 1.0, 5.0, 0.0];
        assert_eq!(prominence(&x, 3), 1.0);
        assert_eq!(prominence(&x, 1), 3.0);
        assert_eq!(prominence(&x, 5), 5.0);
    }

    #[test]
    fn threshold_selects_peaks() {
        let trace = scenario_trace();
        let all = ProminenceDetector::new(1.0).unwrap().detect(&trace);
        assert_eq!(all.times, vec![1.0, 3.0, 5.0, 7.0]);
        let tall = ProminenceDetector::new(2.0).unwrap().detect(&trace);
        assert_eq!(tall.times, vec![3.0, 7.0]);
        assert_eq!(tall.amplitudes, vec![5.0, 6.0]);
    }

    #[test]
    fn short_traces_have_no_peaks() {
        let detector = ProminenceDetector::new(0.0).unwrap();
        assert!(detector.detect(&Trace::default()).is_empty());
        assert!(detector.detect(&Trace::new(vec![0.0], vec![1.0])).is_empty());
    }

    #[test]
    fn rejects_negative_threshold() {
        assert_eq!(
            ProminenceDetector::new(-1.0),
            Err(ConfigError::Threshold(-1.0))
        );
    }
}
