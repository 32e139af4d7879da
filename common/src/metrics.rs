use metrics::{describe_counter, describe_gauge, gauge};

pub fn component_info_metric(name: &'static str) {
    static NAME: &str = "quantal_analysis_component_info";

    describe_gauge!(NAME, "Basic information about the component");

    let git_rev = option_env!("GIT_VERSION").unwrap_or("unknown");
    gauge!(NAME, "component" => name, "git_version" => git_rev).set(1.0);
}

/// Registers descriptions for every counter emitted by the analysis stages.
pub fn describe_metrics() {
    describe_counter!(
        names::UNITS_PROCESSED,
        metrics::Unit::Count,
        "Number of (ROI, condition) units processed"
    );
    describe_counter!(
        names::PEAKS_DETECTED,
        metrics::Unit::Count,
        "Number of peaks found by automatic detection"
    );
    describe_counter!(
        names::FITS_ATTEMPTED,
        metrics::Unit::Count,
        "Number of quantal fits attempted"
    );
    describe_counter!(
        names::FAILURES,
        metrics::Unit::Count,
        "Number of failures encountered"
    );
}

pub mod names {
    use const_format::concatcp;

    pub const METRIC_NAME_PREFIX: &str = "quantal_analysis_";

    pub const FAILURES: &str = concatcp!(METRIC_NAME_PREFIX, "failures");
    pub const FITS_ATTEMPTED: &str = concatcp!(METRIC_NAME_PREFIX, "fits_attempted");
    pub const PEAKS_DETECTED: &str = concatcp!(METRIC_NAME_PREFIX, "peaks_detected");
    pub const UNITS_PROCESSED: &str = concatcp!(METRIC_NAME_PREFIX, "units_processed");
}

pub mod detectors {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
    pub enum DetectorKind {
        Wavelet,
        Simple,
    }

    // Label building function
    pub fn get_label(detector_kind: DetectorKind) -> (&'static str, &'static str) {
        (
            "detector_kind",
            match detector_kind {
                DetectorKind::Wavelet => "wavelet",
                DetectorKind::Simple => "simple",
            },
        )
    }
}

pub mod failures {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
    pub enum FailureKind {
        NoData,
        BaselineFailed,
        FitDidNotConverge,
        ExportFailed,
    }

    // Label building function
    pub fn get_label(failure_kind: FailureKind) -> (&'static str, &'static str) {
        (
            "failure_kind",
            match failure_kind {
                FailureKind::NoData => "no_data",
                FailureKind::BaselineFailed => "baseline_failed",
                FailureKind::FitDidNotConverge => "fit_did_not_converge",
                FailureKind::ExportFailed => "export_failed",
            },
        )
    }
}
