use crate::{data::Results, error::ConfigError};
use ndarray::array;
use ndarray_stats::histogram::{self, Bins, Edges, Grid};
use noisy_float::types::N64;
use quantal_common::{Real, SUM_LABEL, is_synthetic_roi};
use tracing::{debug, info};

/// `nbins + 1` evenly spaced edges from `low` to exactly `high`.
pub(crate) fn make_bin_edges(nbins: usize, low: Real, high: Real) -> Vec<Real> {
    let width = (high - low) / nbins as Real;
    (0..nbins)
        .map(|i| low + width * i as Real)
        .chain(std::iter::once(high))
        .collect()
}

fn validate(nbins: usize, low: Real, high: Real) -> Result<(), ConfigError> {
    if nbins == 0 {
        return Err(ConfigError::BinCount);
    }
    if !(low.is_finite() && high.is_finite() && high > low) {
        return Err(ConfigError::HistogramRange { low, high });
    }
    Ok(())
}

/// Counts per bin over `[low, high)` with a shared grid.
#[derive(Clone)]
struct Binner {
    grid: Grid<N64>,
}

impl Binner {
    fn new(edges: &[Real]) -> Self {
        let edges: Vec<N64> = edges.iter().filter_map(|&e| N64::try_new(e)).collect();
        Self {
            grid: Grid::from(vec![Bins::new(Edges::from(edges))]),
        }
    }

    fn count(&self, values: &[Real]) -> Vec<usize> {
        let mut hist = histogram::Histogram::new(self.grid.clone());
        for value in values.iter().filter_map(|&v| N64::try_new(v)) {
            if hist.add_observation(&array![value]).is_err() {
                debug!("Value {value} is outside the histogram range");
            }
        }
        hist.counts().iter().copied().collect()
    }
}

/// Histogram of `values` over `nbins` equal bins covering `[low, high)`.
/// Values outside the range and non-finite values are not counted.
pub fn histogram(values: &[Real], nbins: usize, low: Real, high: Real) -> Result<Vec<usize>, ConfigError> {
    validate(nbins, low, high)?;
    Ok(Binner::new(&make_bin_edges(nbins, low, high)).count(values))
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSeries {
    pub roi: String,
    pub condition: String,
    pub counts: Vec<usize>,
}

impl HistogramSeries {
    pub fn label(&self) -> String {
        format!("{} {}", self.roi, self.condition)
    }
}

fn sum_counts<'a>(nbins: usize, series: impl Iterator<Item = &'a [usize]>) -> Vec<usize> {
    series.fold(vec![0; nbins], |mut acc, counts| {
        acc.iter_mut().zip(counts).for_each(|(a, c)| *a += c);
        acc
    })
}

/// Peak amplitude histograms for every (ROI, condition) pair on shared edges,
/// with `Sum` series across conditions for each ROI and across the real ROIs
/// for each condition.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSet {
    edges: Vec<Real>,
    series: Vec<HistogramSeries>,
}

impl HistogramSet {
    pub fn build(
        results: &Results,
        rois: &[String],
        conditions: &[String],
        nbins: usize,
        low: Real,
        high: Real,
    ) -> Result<Self, ConfigError> {
        validate(nbins, low, high)?;
        if conditions.is_empty() {
            return Err(ConfigError::NoConditions);
        }
        let edges = make_bin_edges(nbins, low, high);
        let binner = Binner::new(&edges);

        let mut series = Vec::with_capacity((rois.len() + 1) * (conditions.len() + 1));
        for roi in rois {
            let per_condition: Vec<HistogramSeries> = conditions
                .iter()
                .map(|condition| HistogramSeries {
                    roi: roi.clone(),
                    condition: condition.clone(),
                    counts: binner.count(results.get_peaks(roi, condition).1),
                })
                .collect();
            let total = sum_counts(nbins, per_condition.iter().map(|s| s.counts.as_slice()));
            series.extend(per_condition);
            series.push(HistogramSeries {
                roi: roi.clone(),
                condition: SUM_LABEL.to_owned(),
                counts: total,
            });
        }

        for condition in conditions.iter().map(String::as_str).chain([SUM_LABEL]) {
            let counts = sum_counts(
                nbins,
                series
                    .iter()
                    .filter(|s| s.condition == condition && !is_synthetic_roi(&s.roi))
                    .map(|s| s.counts.as_slice()),
            );
            series.push(HistogramSeries {
                roi: SUM_LABEL.to_owned(),
                condition: condition.to_owned(),
                counts,
            });
        }

        info!(
            "Built {} histograms with {nbins} bins over [{low}, {high})",
            series.len()
        );
        Ok(Self { edges, series })
    }

    pub fn edges(&self) -> &[Real] {
        &self.edges
    }

    pub fn nbins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    /// Midpoints of every bin.
    pub fn centres(&self) -> Vec<Real> {
        self.edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    }

    pub fn series(&self) -> &[HistogramSeries] {
        &self.series
    }

    pub fn get(&self, roi: &str, condition: &str) -> Option<&[usize]> {
        self.series
            .iter()
            .find(|s| s.roi == roi && s.condition == condition)
            .map(|s| s.counts.as_slice())
    }

    /// Histogram summed over the real ROIs of `condition`.
    pub fn roi_sum(&self, condition: &str) -> Option<&[usize]> {
        self.get(SUM_LABEL, condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> Results {
        let mut results = Results::default();
        results
            .add_peaks("X", "A", vec![0.0, 1.0, 2.0, 3.0], vec![0.05, 0.15, 0.15, 1.0])
            .unwrap();
        results
            .add_peaks("Y", "A", vec![0.0, 1.0], vec![0.35, -0.1])
            .unwrap();
        results
            .add_peaks("X", "B", vec![0.0, 1.0], vec![0.95, Real::NAN])
            .unwrap();
        results
            .add_peaks("Mean", "A", vec![0.0], vec![0.15])
            .unwrap();
        results
    }

    fn rois() -> Vec<String> {
        ["Mean", "X", "Y"].map(str::to_owned).to_vec()
    }

    fn conditions() -> Vec<String> {
        ["A", "B"].map(str::to_owned).to_vec()
    }

    #[test]
    fn edges_end_exactly_at_high() {
        let edges = make_bin_edges(3, 0.0, 0.3);
        assert_eq!(edges.len(), 4);
        assert_eq!(edges[3], 0.3);
    }

    #[test]
    fn out_of_range_values_are_dropped() {
        let counts = histogram(&[0.0, 0.5, 0.99, 1.0, -0.1, Real::NAN], 4, 0.0, 1.0).unwrap();
        assert_eq!(counts, vec![1, 0, 1, 1]);
        assert_eq!(counts.iter().sum::<usize>(), 3);
    }

    #[test]
    fn series_and_sums() {
        let set = HistogramSet::build(&results(), &rois(), &conditions(), 10, 0.0, 1.0).unwrap();
        assert_eq!(set.nbins(), 10);
        assert_eq!(set.get("X", "A").unwrap()[1], 2);
        assert_eq!(set.get("X", "A").unwrap().iter().sum::<usize>(), 3);
        assert_eq!(set.get("X", "B").unwrap()[9], 1);
        assert_eq!(set.get("X", "Sum").unwrap().iter().sum::<usize>(), 4);

        let a_sum = set.roi_sum("A").unwrap();
        assert_eq!(a_sum.iter().sum::<usize>(), 4);
        assert_eq!(a_sum[1], 2);
        assert_eq!(set.get("Sum", "Sum").unwrap().iter().sum::<usize>(), 5);
        assert_eq!(set.series().len(), 3 * 3 + 3);
        assert_eq!(set.series()[0].label(), "Mean A");
    }

    #[test]
    fn centres_are_midpoints() {
        let set = HistogramSet::build(&results(), &rois(), &conditions(), 4, 0.0, 1.0).unwrap();
        assert_eq!(set.centres(), vec![0.125, 0.375, 0.625, 0.875]);
    }

    #[test]
    fn invalid_parameters() {
        assert_eq!(
            HistogramSet::build(&results(), &rois(), &conditions(), 0, 0.0, 1.0),
            Err(ConfigError::BinCount)
        );
        assert_eq!(
            HistogramSet::build(&results(), &rois(), &conditions(), 5, 1.0, 1.0),
            Err(ConfigError::HistogramRange {
                low: 1.0,
                high: 1.0
            })
        );
        assert_eq!(
            HistogramSet::build(&results(), &rois(), &[], 5, 0.0, 1.0),
            Err(ConfigError::NoConditions)
        );
    }
}
