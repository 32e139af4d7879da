//! Trace tables, peak results and the datasets and store that own them.
mod dataset;
mod results;
mod store;
mod table;

pub use dataset::{AUTO_PEAKS_DIRECTIVE, DataRanges, Dataset, DatasetId};
pub use results::{PeakTable, Results};
pub use store::{Store, StoreError};
pub use table::ConditionTable;

#[cfg(test)]
pub(crate) use dataset::tests::two_condition_dataset;

use crate::error::ConfigError;
use quantal_common::{Real, Time};

/// A single 1-D signal for one (ROI, condition) pair.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Trace {
    pub times: Vec<Time>,
    pub values: Vec<Real>,
}

impl Trace {
    pub fn new(times: Vec<Time>, values: Vec<Real>) -> Self {
        Self { times, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Time, Real)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    pub fn max_value(&self) -> Option<Real> {
        self.values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(Real::max)
    }
}

/// Peak events as parallel sequences of times and amplitudes.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Peaks {
    pub times: Vec<Time>,
    pub amplitudes: Vec<Real>,
}

impl Peaks {
    pub fn new(times: Vec<Time>, amplitudes: Vec<Real>) -> Result<Self, ConfigError> {
        if times.len() != amplitudes.len() {
            return Err(ConfigError::PeakShape {
                times: times.len(),
                amplitudes: amplitudes.len(),
            });
        }
        Ok(Self { times, amplitudes })
    }

    /// Peaks at the given sample indices of `trace`. Out of range indices are skipped.
    pub fn from_indices(trace: &Trace, indices: impl IntoIterator<Item = usize>) -> Self {
        let (times, amplitudes) = indices
            .into_iter()
            .filter_map(|i| Some((*trace.times.get(i)?, *trace.values.get(i)?)))
            .unzip();
        Self { times, amplitudes }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Time, Real)> + '_ {
        self.times.iter().copied().zip(self.amplitudes.iter().copied())
    }

    /// Drops NaN times and collapses repeated times, keeping the first occurrence.
    pub(crate) fn dedup_keep_first(self) -> Self {
        let mut seen: Vec<Time> = Vec::with_capacity(self.times.len());
        let (times, amplitudes) = self
            .iter()
            .filter(|(t, _)| {
                if t.is_nan() || seen.contains(t) {
                    false
                } else {
                    seen.push(*t);
                    true
                }
            })
            .unzip();
        Self { times, amplitudes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_and_drops_nan() {
        let peaks = Peaks::new(vec![1.0, Real::NAN, 1.0, 2.0], vec![10.0, 11.0, 12.0, 13.0])
            .unwrap()
            .dedup_keep_first();
        assert_eq!(peaks.times, vec![1.0, 2.0]);
        assert_eq!(peaks.amplitudes, vec![10.0, 13.0]);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        assert_eq!(
            Peaks::new(vec![1.0], vec![]),
            Err(ConfigError::PeakShape {
                times: 1,
                amplitudes: 0
            })
        );
    }

    #[test]
    fn from_indices_skips_out_of_range() {
        let trace = Trace::new(vec![0.0, 0.5, 1.0], vec![3.0, 4.0, 5.0]);
        let peaks = Peaks::from_indices(&trace, [2, 7, 0]);
        assert_eq!(peaks.times, vec![1.0, 0.0]);
        assert_eq!(peaks.amplitudes, vec![5.0, 3.0]);
    }
}
