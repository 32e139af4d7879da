pub mod metrics;
pub mod progress;
pub mod tracer;

pub type Real = f64;
pub type Time = f64;

/// Name of the synthetic ROI holding the mean over every real ROI.
pub const MEAN_ROI: &str = "Mean";
/// Name of the synthetic ROI holding the sample variance over every real ROI.
pub const VARIANCE_ROI: &str = "Variance";
/// Label used for summed histogram series, both as a ROI and as a pseudo-condition.
pub const SUM_LABEL: &str = "Sum";

pub fn is_synthetic_roi(roi: &str) -> bool {
    roi == MEAN_ROI || roi == VARIANCE_ROI
}
