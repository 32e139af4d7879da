//! Batch stages that run the estimators and detectors over a dataset and
//! write their outcome into its results.
use crate::{
    baseline::{AsymmetricLeastSquares, SavitzkyGolay, Smoother, subtract_baseline},
    data::{AUTO_PEAKS_DIRECTIVE, ConditionTable, Dataset, Peaks, Results, Trace},
    error::{AnalysisError, ConfigError, DataError},
    histogram::HistogramSet,
    parameters::{AnalysisConfig, BaselineParameters},
    peak_detection::{AutoPeaks, DetectionMode, DetectionSession, Detector, PeakDetector},
    quantal::QuantalFit,
    utils::{finite_mean, masked_std, nearest_sample},
};
use metrics::counter;
use quantal_common::{
    MEAN_ROI, Real, SUM_LABEL, Time, VARIANCE_ROI,
    metrics::{
        detectors,
        failures::{self, FailureKind},
        names::{FAILURES, PEAKS_DETECTED, UNITS_PROCESSED},
    },
    progress::{ProgressCounter, ProgressObserver},
};
use tracing::{debug, info, instrument, warn};

/// The per-trace stages of an update pass, validated up front.
#[derive(Debug, Clone)]
pub struct Stages {
    baseline: Option<AsymmetricLeastSquares>,
    smoother: Option<SavitzkyGolay>,
    detector: Detector,
}

impl Stages {
    /// Builds every stage from `config`. Baseline removal is skipped when the
    /// session forbids it.
    pub fn new(config: &AnalysisConfig, session: &DetectionSession) -> Result<Self, ConfigError> {
        let baseline = if config.baseline.enabled && session.baseline_allowed() {
            Some(config.baseline.estimator()?)
        } else {
            None
        };
        Ok(Self {
            baseline,
            smoother: config.smoothing.smoother()?,
            detector: config.detection.detector()?,
        })
    }
}

/// The trace of `roi` in `condition` as displayed and searched for peaks:
/// baseline subtracted unless it is the variance trace, then smoothed.
pub fn prepare_trace(
    stages: &Stages,
    dataset: &Dataset,
    roi: &str,
    condition: &str,
) -> Result<Trace, AnalysisError> {
    let mut trace = dataset.trace(roi, condition)?;
    if let Some(estimator) = stages.baseline.as_ref().filter(|_| roi != VARIANCE_ROI) {
        trace.values = subtract_baseline(estimator, &trace.values)?;
    }
    if let Some(smoother) = &stages.smoother {
        trace.values = smoother.apply(&trace.values)?;
    }
    Ok(trace)
}

/// Outcome of an update pass for one condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionUpdate {
    pub condition: String,
    /// `None` when the unit had no usable data.
    pub trace: Option<Trace>,
    pub peaks: Peaks,
}

/// Rebuilds the traces of `roi` in every condition. In auto mode the detector
/// runs and replaces each results cell; in manual mode the stored cells are
/// read back unchanged.
#[instrument(skip_all, fields(roi = roi))]
pub fn update_roi(
    dataset: &mut Dataset,
    roi: &str,
    session: &DetectionSession,
    config: &AnalysisConfig,
    observer: &mut dyn ProgressObserver,
) -> Result<Vec<ConditionUpdate>, ConfigError> {
    let stages = Stages::new(config, session)?;
    let conditions = dataset.conditions().to_vec();
    let mut progress = ProgressCounter::new(conditions.len(), observer);
    let mut updates = Vec::with_capacity(conditions.len());

    for condition in conditions {
        let trace = match prepare_trace(&stages, dataset, roi, &condition) {
            Ok(trace) => Some(trace),
            Err(e) => {
                warn!("{e}");
                let kind = match e {
                    AnalysisError::Numerical(_) => FailureKind::BaselineFailed,
                    _ => FailureKind::NoData,
                };
                counter!(FAILURES, &[failures::get_label(kind)]).increment(1);
                None
            }
        };

        let peaks = match session.mode() {
            DetectionMode::Auto => {
                let peaks = trace
                    .as_ref()
                    .map(|trace| stages.detector.detect(trace))
                    .unwrap_or_default();
                counter!(
                    PEAKS_DETECTED,
                    &[detectors::get_label(stages.detector.kind())]
                )
                .increment(peaks.len() as u64);
                if peaks.is_empty() {
                    info!("No peaks found in {roi} {condition}");
                } else {
                    debug!("{} peaks in {roi} {condition}", peaks.len());
                }
                dataset.results.set_peaks(roi, &condition, peaks.clone());
                peaks
            }
            DetectionMode::Manual => {
                let peaks = dataset
                    .results
                    .peaks(roi, &condition)
                    .cloned()
                    .unwrap_or_default();
                if peaks.is_empty() {
                    debug!("Peak results for {roi} {condition} are empty");
                }
                peaks
            }
        };

        counter!(UNITS_PROCESSED).increment(1);
        progress.advance(roi, &condition);
        updates.push(ConditionUpdate {
            condition,
            trace,
            peaks,
        });
    }
    Ok(updates)
}

/// Runs [`update_roi`] for every ROI, synthetic ones included, and returns the
/// number of peaks held in the results afterwards.
#[instrument(skip_all)]
pub fn detect_all(
    dataset: &mut Dataset,
    session: &DetectionSession,
    config: &AnalysisConfig,
    observer: &mut dyn ProgressObserver,
) -> Result<usize, ConfigError> {
    Stages::new(config, session)?;
    for roi in dataset.roi_list().to_vec() {
        update_roi(dataset, &roi, session, config, observer)?;
    }
    let total = dataset.results.peak_count();
    info!(
        "Detected {total} peaks over {} ROIs and {} conditions",
        dataset.roi_list().len(),
        dataset.conditions().len()
    );
    Ok(total)
}

/// Baseline-subtracted copies of every condition table, in condition order.
/// The source dataset is left untouched.
#[instrument(skip_all)]
pub fn baseline_all(
    dataset: &Dataset,
    params: &BaselineParameters,
    observer: &mut dyn ProgressObserver,
) -> Result<Vec<(String, ConditionTable)>, AnalysisError> {
    let estimator = params.estimator()?;
    let total = dataset.real_rois().len() * dataset.conditions().len();
    let mut progress = ProgressCounter::new(total, observer);

    let mut tables = Vec::with_capacity(dataset.conditions().len());
    for (condition, table) in dataset.tables() {
        let baselined = table.map_columns(|roi, values| {
            let corrected = subtract_baseline(&estimator, values).inspect_err(|e| {
                warn!("Baseline of {roi} {condition} failed: {e}");
                counter!(
                    FAILURES,
                    &[failures::get_label(FailureKind::BaselineFailed)]
                )
                .increment(1);
            });
            progress.advance(roi, condition);
            corrected
        })?;
        tables.push((condition.to_owned(), baselined));
    }
    info!(
        "Baseline removed from {} traces (lambda {}, p {})",
        progress.done(),
        params.lambda,
        params.p
    );
    Ok(tables)
}

/// Largest finite value within `radius` samples of the sample nearest `time`.
fn response_at(times: &[Time], values: &[Real], time: Time, radius: usize) -> Real {
    let Some(index) = nearest_sample(times, time) else {
        return Real::NAN;
    };
    let start = index.saturating_sub(radius);
    let end = (index + radius + 1).min(values.len());
    values
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .reduce(Real::max)
        .unwrap_or(Real::NAN)
}

/// Measures the response of every real ROI at the reference peak times.
///
/// Reference times are the `Mean` peaks of the reference condition. When
/// baseline removal is enabled the traces are baseline subtracted first. Each
/// (ROI, condition) whose mean response over its masked noise falls below
/// `min_snr` is moved to the excluded results. The outcome is a new dataset
/// named `<source>_peaks` holding the traces that were measured, with
/// automatic detection disabled.
#[instrument(skip_all, fields(source = source.name()))]
pub fn extract_all_peaks(
    source: &Dataset,
    config: &AnalysisConfig,
    observer: &mut dyn ProgressObserver,
) -> Result<Dataset, AnalysisError> {
    let params = &config.extraction;
    params.validate()?;
    let reference_condition = match &params.reference_condition {
        Some(condition) if source.conditions().contains(condition) => condition.clone(),
        Some(condition) => return Err(ConfigError::UnknownCondition(condition.clone()).into()),
        None => source
            .conditions()
            .last()
            .cloned()
            .ok_or(ConfigError::NoConditions)?,
    };

    let mut reference: Vec<Time> = source
        .results
        .get_peaks(MEAN_ROI, &reference_condition)
        .0
        .iter()
        .copied()
        .filter(|t| !t.is_nan())
        .collect();
    reference.sort_by(Time::total_cmp);
    if reference.is_empty() {
        return Err(DataError::NoReferencePeaks.into());
    }

    let tables = if config.baseline.enabled {
        baseline_all(source, &config.baseline, &mut quantal_common::progress::Silent)?
    } else {
        source
            .tables()
            .map(|(condition, table)| (condition.to_owned(), table.clone()))
            .collect()
    };

    let mut extracted = Dataset::from_traces(&format!("{}_peaks", source.name()), tables)?;
    extracted.set_peak_times(&reference);
    let mut allowed = Results::with_layout(
        extracted.roi_list().to_vec(),
        extracted.conditions().to_vec(),
    );
    let mut excluded = allowed.clone();

    let total = extracted.real_rois().len() * extracted.conditions().len();
    let mut progress = ProgressCounter::new(total, observer);
    let mut excluded_count = 0;
    for (condition, table) in extracted.tables() {
        for roi in table.rois() {
            let Some(column) = table.column(roi) else {
                continue;
            };
            let values = column.to_vec();
            let amplitudes: Vec<Real> = reference
                .iter()
                .map(|&t| response_at(table.times(), &values, t, params.search_radius))
                .collect();

            let noise = masked_std(table.times(), &values, &reference, params.mask_width);
            let signal = finite_mean(amplitudes.iter().copied());
            let keep = match (signal, noise) {
                (Some(signal), Some(noise)) => {
                    let snr = signal / noise;
                    debug!("{roi} {condition}: SNR {snr}");
                    snr >= params.min_snr
                }
                (None, _) => false,
                (Some(_), None) => {
                    debug!("{roi} {condition}: too few samples for a noise estimate");
                    true
                }
            };

            let target = if keep {
                &mut allowed
            } else {
                excluded_count += 1;
                &mut excluded
            };
            target.set_peaks(
                roi,
                condition,
                Peaks {
                    times: reference.clone(),
                    amplitudes,
                },
            );
            progress.advance(roi, condition);
        }
    }

    info!(
        "Extracted {} peaks per trace from {} traces, {excluded_count} excluded for low SNR",
        reference.len(),
        progress.done()
    );
    extracted.results = allowed;
    extracted.excluded = (excluded_count > 0).then_some(excluded);
    extracted.gui_controls.insert(
        AUTO_PEAKS_DIRECTIVE.to_owned(),
        AutoPeaks::Disable.as_str().to_owned(),
    );
    Ok(extracted)
}

/// Toggles a peak at `target` on the displayed trace of (`roi`, `condition`)
/// and writes the edited cell back. Returns `None` outside manual mode.
pub fn apply_manual_edit(
    dataset: &mut Dataset,
    session: &DetectionSession,
    config: &AnalysisConfig,
    roi: &str,
    condition: &str,
    target: (Time, Real),
) -> Result<Option<Peaks>, AnalysisError> {
    let stages = Stages::new(config, session)?;
    let trace = prepare_trace(&stages, dataset, roi, condition)?;
    let current = dataset
        .results
        .peaks(roi, condition)
        .cloned()
        .unwrap_or_default();
    let Some(edited) = session.click(&current, &trace, target) else {
        return Ok(None);
    };
    dataset.results.set_peaks(roi, condition, edited.clone());
    Ok(Some(edited))
}

/// Peak amplitude histograms of every ROI and condition in `dataset`.
pub fn build_histograms(
    dataset: &Dataset,
    config: &AnalysisConfig,
) -> Result<HistogramSet, ConfigError> {
    let (low, high) = config.histogram.range();
    HistogramSet::build(
        &dataset.results,
        dataset.roi_list(),
        dataset.conditions(),
        config.histogram.nbins,
        low,
        high,
    )
}

/// Fits the quantal model to the histogram of `roi` summed over conditions.
pub fn fit_roi_histogram(
    histograms: &HistogramSet,
    roi: &str,
    config: &AnalysisConfig,
) -> Result<QuantalFit, AnalysisError> {
    let fitter = config.quantal.fitter()?;
    let counts: Vec<Real> = histograms
        .get(roi, SUM_LABEL)
        .ok_or_else(|| DataError::MissingRoi {
            roi: roi.to_owned(),
            condition: SUM_LABEL.to_owned(),
        })?
        .iter()
        .map(|&c| c as Real)
        .collect();
    Ok(fitter.fit(
        &histograms.centres(),
        &counts,
        config.quantal.q_guess,
        config.quantal.width_guess_for(&config.histogram),
    )?)
}
