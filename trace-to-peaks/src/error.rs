use crate::{data::StoreError, export::ExportError, loader::LoadError};
use quantal_common::Real;
use thiserror::Error;

/// Invalid parameters supplied by the caller. These are always detected
/// before any Dataset state is touched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Smoothing window must be odd, got {0}")]
    EvenWindow(usize),
    #[error("Smoothing window {window} is too small for polynomial order {order}")]
    WindowTooSmall { window: usize, order: usize },
    #[error("Baseline smoothness must be positive and finite, got {0}")]
    Smoothness(Real),
    #[error("Baseline asymmetry must lie strictly between 0 and 1, got {0}")]
    Asymmetry(Real),
    #[error("Baseline iteration count must be non-zero")]
    Iterations,
    #[error("Wavelet width must be at least 2, got {0}")]
    WaveletWidth(usize),
    #[error("Detection threshold must be non-negative and finite, got {0}")]
    Threshold(Real),
    #[error("Cutoff percentage must lie in [0, 100], got {0}")]
    Cutoff(Real),
    #[error("Histogram bin count must be positive")]
    BinCount,
    #[error("Histogram range [{low}, {high}) is empty")]
    HistogramRange { low: Real, high: Real },
    #[error("Condition list is empty")]
    NoConditions,
    #[error("Condition {0} is not present")]
    UnknownCondition(String),
    #[error("Number of quantal components must be positive")]
    Components,
    #[error("First quantal multiple must be 0 or 1, got {0}")]
    FirstMultiple(usize),
    #[error("Quantal size guess must be positive and finite, got {0}")]
    QuantalGuess(Real),
    #[error("Component width guess must be positive and finite, got {0}")]
    WidthGuess(Real),
    #[error("Bin centres and counts differ in length ({centres} vs {counts})")]
    FitShape { centres: usize, counts: usize },
    #[error("Peak times and amplitudes differ in length ({times} vs {amplitudes})")]
    PeakShape { times: usize, amplitudes: usize },
    #[error("Group size must be positive")]
    GroupSize,
    #[error("Automatic detection is locked off for this dataset")]
    ModeLocked,
}

/// Missing or unusable data for one unit of work. Batch operations log these
/// and treat the unit as empty rather than aborting.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("No data: condition {0} is not present")]
    MissingCondition(String),
    #[error("No data: ROI {roi} is missing from condition {condition}")]
    MissingRoi { roi: String, condition: String },
    #[error("No data: trace for ROI {roi} in condition {condition} is empty")]
    EmptyTrace { roi: String, condition: String },
    #[error("No data: reference peak times are empty or NaN")]
    NoReferencePeaks,
    #[error("Table has {times} time points but {rows} rows of values")]
    TableShape { times: usize, rows: usize },
    #[error("Table has {rois} ROI names but {columns} columns of values")]
    RoiShape { rois: usize, columns: usize },
    #[error("ROI {0} appears more than once")]
    DuplicateRoi(String),
    #[error("ROI name {0} is reserved for a derived trace")]
    ReservedRoi(String),
    #[error("Condition {0} appears more than once")]
    DuplicateCondition(String),
    #[error("Time index of condition {0} is not non-decreasing")]
    TimeOrder(String),
    #[error("Condition {condition} lacks ROI columns {missing:?}")]
    InconsistentRois {
        condition: String,
        missing: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Numerical failure: {0}")]
    Numerical(&'static str),
}
