//! Continuous wavelet transform peak detection.
//!
//! The trace is convolved with Ricker wavelets of widths `1..width`. Local
//! maxima of each row are chained across scales into ridge lines, starting at
//! the widest scale. Ridges that are long enough and stand out against the
//! noise of the narrowest scale mark a peak near the column where the ridge
//! reaches that scale. Even length kernels centre their rows half a sample
//! late, so each ridge column is snapped to the largest trace sample beside it
//! and ridges that land on the same or adjacent samples are merged. Ridges
//! that snap onto the flank of a pulse rather than a local maximum are dropped.
use super::PeakDetector;
use crate::{
    data::{Peaks, Trace},
    error::ConfigError,
};
use ndarray::{Array2, ArrayView1, Axis};
use quantal_common::Real;
use std::f64::consts::PI;
use tracing::debug;

const NOISE_PERCENTILE: Real = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct WaveletDetector {
    width: usize,
    min_snr: Real,
    cutoff_percent: Real,
    index_offset: isize,
}

impl WaveletDetector {
    pub fn new(width: usize, min_snr: Real, cutoff_percent: Real) -> Result<Self, ConfigError> {
        if width < 2 {
            return Err(ConfigError::WaveletWidth(width));
        }
        if !(min_snr.is_finite() && min_snr >= 0.0) {
            return Err(ConfigError::Threshold(min_snr));
        }
        if !(0.0..=100.0).contains(&cutoff_percent) {
            return Err(ConfigError::Cutoff(cutoff_percent));
        }
        Ok(Self {
            width,
            min_snr,
            cutoff_percent,
            index_offset: 0,
        })
    }

    /// Shifts every ridge column by `offset` samples before it is snapped to the trace.
    pub fn with_index_offset(self, index_offset: isize) -> Self {
        Self {
            index_offset,
            ..self
        }
    }

    fn widths(&self) -> Vec<Real> {
        (1..self.width).map(|w| w as Real).collect()
    }

    /// Ridge columns, sorted, before the amplitude cutoff.
    fn ridge_columns(&self, values: &[Real]) -> Vec<usize> {
        let widths = self.widths();
        let transform = cwt(values, &widths);
        let max_distances: Vec<Real> = widths.iter().map(|w| w / 4.0).collect();
        let gap_threshold = widths.first().map_or(1, |w| w.ceil() as usize);
        let lines = identify_ridge_lines(&transform, &max_distances, gap_threshold);
        let mut columns: Vec<usize> = filter_ridge_lines(&transform, lines, self.min_snr)
            .into_iter()
            .filter_map(|line| line.cols.first().copied())
            .collect();
        columns.sort_unstable();
        columns
    }
}

/// The sample with the largest finite value within one sample of `col`, ties
/// keeping the earliest. `None` unless that sample is a local maximum of the
/// trace, which drops ridges sitting on the flank of a pulse.
fn snap_to_maximum(values: &[Real], col: usize) -> Option<usize> {
    let start = col.saturating_sub(1);
    let end = (col + 2).min(values.len());
    let best = (start..end)
        .filter(|&i| values[i].is_finite())
        .reduce(|best, i| if values[i] > values[best] { i } else { best })?;
    let left = best.checked_sub(1).and_then(|i| values.get(i));
    let right = values.get(best + 1);
    [left, right]
        .into_iter()
        .flatten()
        .all(|&v| !(v > values[best]))
        .then_some(best)
}

/// Collapses sorted sample indices that are equal or adjacent into the one
/// with the largest value.
fn merge_adjacent(values: &[Real], sorted: impl IntoIterator<Item = usize>) -> Vec<usize> {
    let mut merged: Vec<usize> = Vec::new();
    for i in sorted {
        match merged.last_mut() {
            Some(last) if i - *last <= 1 => {
                if values[i] > values[*last] {
                    *last = i;
                }
            }
            _ => merged.push(i),
        }
    }
    merged
}

impl PeakDetector for WaveletDetector {
    fn detect(&self, trace: &Trace) -> Peaks {
        let Some(max) = trace.max_value() else {
            return Peaks::default();
        };
        let threshold = self.cutoff_percent / 100.0 * max;
        let mut snapped: Vec<usize> = self
            .ridge_columns(&trace.values)
            .into_iter()
            .filter_map(|col| col.checked_add_signed(self.index_offset))
            .filter_map(|col| snap_to_maximum(&trace.values, col))
            .collect();
        snapped.sort_unstable();
        let indices = merge_adjacent(&trace.values, snapped)
            .into_iter()
            .filter(|&i| trace.values[i] > threshold);
        let peaks = Peaks::from_indices(trace, indices);
        debug!(
            "Wavelet detection (width {}, snr {}, cutoff {}%) found {} peaks",
            self.width,
            self.min_snr,
            self.cutoff_percent,
            peaks.len()
        );
        peaks
    }
}

/// Ricker ("Mexican hat") wavelet sampled at `points` positions centred on the middle.
pub(crate) fn ricker(points: usize, a: Real) -> Vec<Real> {
    let amplitude = 2.0 / ((3.0 * a).sqrt() * PI.powf(0.25));
    let wsq = a * a;
    let centre = (points as Real - 1.0) / 2.0;
    (0..points)
        .map(|i| {
            let xsq = (i as Real - centre).powi(2);
            amplitude * (1.0 - xsq / wsq) * (-xsq / (2.0 * wsq)).exp()
        })
        .collect()
}

/// Convolution of `data` with `kernel`, cropped to the length of `data` and
/// centred on the full convolution.
fn convolve_same(data: &[Real], kernel: &[Real]) -> Vec<Real> {
    let offset = (kernel.len().saturating_sub(1)) / 2;
    (0..data.len())
        .map(|i| {
            let k = i + offset;
            data.iter()
                .enumerate()
                .filter_map(|(j, d)| Some(d * kernel.get(k.checked_sub(j)?)?))
                .sum()
        })
        .collect()
}

/// One row per width. Each wavelet spans ten widths, or the whole trace when shorter.
pub(crate) fn cwt(data: &[Real], widths: &[Real]) -> Array2<Real> {
    let mut out = Array2::zeros((widths.len(), data.len()));
    for (mut row, &width) in out.axis_iter_mut(Axis(0)).zip(widths) {
        let points = ((10.0 * width) as usize).min(data.len());
        let mut kernel = ricker(points, width);
        kernel.reverse();
        row.iter_mut()
            .zip(convolve_same(data, &kernel))
            .for_each(|(cell, v)| *cell = v);
    }
    out
}

/// Indices strictly greater than both neighbours. The first and last samples
/// are compared with themselves and so are never maxima.
fn relative_maxima(row: ArrayView1<'_, Real>) -> Vec<usize> {
    let n = row.len();
    (0..n)
        .filter(|&i| {
            let v = row[i];
            v > row[i.saturating_sub(1)] && v > row[(i + 1).min(n - 1)]
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RidgeLine {
    pub(crate) rows: Vec<usize>,
    pub(crate) cols: Vec<usize>,
    gap: usize,
}

impl RidgeLine {
    fn new(row: usize, col: usize) -> Self {
        Self {
            rows: vec![row],
            cols: vec![col],
            gap: 0,
        }
    }

    fn extend(&mut self, row: usize, col: usize) {
        self.rows.push(row);
        self.cols.push(col);
        self.gap = 0;
    }

    /// Rows ascending, so the first entry is the narrowest scale.
    fn into_ascending(mut self) -> Self {
        self.rows.reverse();
        self.cols.reverse();
        self
    }
}

/// Chains relative maxima from the widest scale with any maxima downwards.
/// A maximum joins the ridge whose latest column is closest, if within
/// `max_distances[row]`; otherwise it starts a new ridge. Ridges not extended
/// for more than `gap_threshold` rows are closed.
pub(crate) fn identify_ridge_lines(
    transform: &Array2<Real>,
    max_distances: &[Real],
    gap_threshold: usize,
) -> Vec<RidgeLine> {
    let maxima: Vec<Vec<usize>> = transform
        .axis_iter(Axis(0))
        .map(relative_maxima)
        .collect();
    let Some(start_row) = maxima.iter().rposition(|m| !m.is_empty()) else {
        return Vec::new();
    };

    let mut open: Vec<RidgeLine> = maxima[start_row]
        .iter()
        .map(|&col| RidgeLine::new(start_row, col))
        .collect();
    let mut closed = Vec::new();

    for row in (0..start_row).rev() {
        open.iter_mut().for_each(|line| line.gap += 1);
        let previous: Vec<usize> = open.iter().filter_map(|l| l.cols.last().copied()).collect();
        let max_distance = max_distances.get(row).copied().unwrap_or_default();

        for &col in &maxima[row] {
            let closest = previous
                .iter()
                .enumerate()
                .map(|(i, &p)| (i, col.abs_diff(p)))
                .min_by_key(|&(i, d)| (d, i))
                .filter(|&(_, d)| d as Real <= max_distance);
            match closest.and_then(|(i, _)| open.get_mut(i)) {
                Some(line) => line.extend(row, col),
                None => open.push(RidgeLine::new(row, col)),
            }
        }

        for i in (0..open.len()).rev() {
            if open[i].gap > gap_threshold {
                closed.push(open.remove(i));
            }
        }
    }

    closed
        .into_iter()
        .chain(open)
        .map(RidgeLine::into_ascending)
        .collect()
}

/// Percentile of `values` with linear interpolation between order statistics.
fn percentile(values: &[Real], percent: Real) -> Real {
    let mut sorted = values.to_vec();
    sorted.sort_by(Real::total_cmp);
    if sorted.is_empty() {
        return Real::NAN;
    }
    let index = percent / 100.0 * (sorted.len() - 1) as Real;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (index - lower as Real)
}

/// Keeps ridges spanning at least a quarter of the scales whose signal to noise
/// ratio is not below `min_snr`. Noise is the 10th percentile of the narrowest
/// scale in a window of a twentieth of the trace around the ridge.
pub(crate) fn filter_ridge_lines(
    transform: &Array2<Real>,
    lines: Vec<RidgeLine>,
    min_snr: Real,
) -> Vec<RidgeLine> {
    let (rows, num_points) = transform.dim();
    if rows == 0 || num_points == 0 {
        return Vec::new();
    }
    let min_length = rows.div_ceil(4);
    let window = num_points.div_ceil(20);
    let (half_window, odd) = (window / 2, window % 2);

    let row_one = transform.row(0).to_vec();
    let noises: Vec<Real> = (0..num_points)
        .map(|i| {
            let start = i.saturating_sub(half_window);
            let end = (i + half_window + odd).min(num_points);
            percentile(&row_one[start..end], NOISE_PERCENTILE)
        })
        .collect();

    lines
        .into_iter()
        .filter(|line| {
            if line.rows.len() < min_length {
                return false;
            }
            let (Some(&row), Some(&col)) = (line.rows.first(), line.cols.first()) else {
                return false;
            };
            let snr = (transform[[row, col]] / noises[col]).abs();
            // a NaN ratio (zero noise over zero signal) is not rejected
            !(snr < min_snr)
        })
        .collect()
}
