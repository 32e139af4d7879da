//! Automatic peak detectors and manual peak editing.
//!
//! Detectors are pure: they map a trace to the times and amplitudes of its
//! peaks and never touch a dataset. An empty result is a valid outcome.
mod manual;
mod prominence;
mod wavelet;

pub use manual::{AutoPeaks, Crosshair, DetectionMode, DetectionSession, ManualEditor};
pub use prominence::ProminenceDetector;
pub use wavelet::WaveletDetector;

use crate::data::{Peaks, Trace};
use quantal_common::metrics::detectors::DetectorKind;

pub trait PeakDetector {
    fn detect(&self, trace: &Trace) -> Peaks;
}

/// The configured automatic detector.
#[derive(Debug, Clone, PartialEq)]
pub enum Detector {
    Wavelet(WaveletDetector),
    Simple(ProminenceDetector),
}

impl Detector {
    pub fn kind(&self) -> DetectorKind {
        match self {
            Detector::Wavelet(_) => DetectorKind::Wavelet,
            Detector::Simple(_) => DetectorKind::Simple,
        }
    }
}

impl PeakDetector for Detector {
    fn detect(&self, trace: &Trace) -> Peaks {
        match self {
            Detector::Wavelet(detector) => detector.detect(trace),
            Detector::Simple(detector) => detector.detect(trace),
        }
    }
}
