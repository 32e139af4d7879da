use crate::{
    baseline::{AsymmetricLeastSquares, SavitzkyGolay},
    error::ConfigError,
    peak_detection::{Detector, ProminenceDetector, WaveletDetector},
    quantal::{QuantalFitter, QuantalModel, WidthModel},
};
use clap::{Parser, Subcommand};
use quantal_common::Real;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BaselineParameters {
    pub enabled: bool,
    pub lambda: Real,
    pub p: Real,
    pub iterations: usize,
}

impl Default for BaselineParameters {
    fn default() -> Self {
        Self {
            enabled: true,
            lambda: 1e6,
            p: 10.0_f64.powf(-3.0 / 5.0),
            iterations: 10,
        }
    }
}

impl BaselineParameters {
    pub fn estimator(&self) -> Result<AsymmetricLeastSquares, ConfigError> {
        AsymmetricLeastSquares::new(self.lambda, self.p, self.iterations)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SmoothingParameters {
    pub enabled: bool,
    pub window: usize,
    pub order: usize,
}

impl Default for SmoothingParameters {
    fn default() -> Self {
        Self {
            enabled: false,
            window: 15,
            order: 4,
        }
    }
}

impl SmoothingParameters {
    /// The configured smoother, or `None` when smoothing is switched off.
    pub fn smoother(&self) -> Result<Option<SavitzkyGolay>, ConfigError> {
        self.enabled
            .then(|| SavitzkyGolay::new(self.window, self.order))
            .transpose()
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionAlgorithm {
    #[default]
    Wavelet,
    Simple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DetectionParameters {
    pub algorithm: DetectionAlgorithm,
    pub width: usize,
    /// Minimum ridge SNR for the wavelet detector, minimum prominence for the simple one.
    pub snr: Real,
    pub cutoff_percent: Real,
    pub index_offset: isize,
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            algorithm: DetectionAlgorithm::Wavelet,
            width: 6,
            snr: 1.3,
            cutoff_percent: 30.0,
            index_offset: 0,
        }
    }
}

impl DetectionParameters {
    pub fn detector(&self) -> Result<Detector, ConfigError> {
        Ok(match self.algorithm {
            DetectionAlgorithm::Wavelet => Detector::Wavelet(
                WaveletDetector::new(self.width, self.snr, self.cutoff_percent)?
                    .with_index_offset(self.index_offset),
            ),
            DetectionAlgorithm::Simple => Detector::Simple(ProminenceDetector::new(self.snr)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HistogramParameters {
    pub nbins: usize,
    pub max_amplitude: Real,
}

impl Default for HistogramParameters {
    fn default() -> Self {
        Self {
            nbins: 100,
            max_amplitude: 1.0,
        }
    }
}

impl HistogramParameters {
    /// Histograms always start at zero.
    pub fn range(&self) -> (Real, Real) {
        (0.0, self.max_amplitude)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nbins == 0 {
            return Err(ConfigError::BinCount);
        }
        let (low, high) = self.range();
        if !(high.is_finite() && high > low) {
            return Err(ConfigError::HistogramRange { low, high });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct QuantalParameters {
    pub n_components: usize,
    pub q_guess: Real,
    /// Starting component width; a twentieth of the histogram range when unset.
    pub width_guess: Option<Real>,
    pub first_multiple: usize,
    pub width_model: WidthModel,
}

impl Default for QuantalParameters {
    fn default() -> Self {
        Self {
            n_components: 5,
            q_guess: 0.05,
            width_guess: None,
            first_multiple: 1,
            width_model: WidthModel::default(),
        }
    }
}

impl QuantalParameters {
    pub fn fitter(&self) -> Result<QuantalFitter, ConfigError> {
        if !(self.q_guess.is_finite() && self.q_guess > 0.0) {
            return Err(ConfigError::QuantalGuess(self.q_guess));
        }
        if let Some(w) = self.width_guess.filter(|w| !(w.is_finite() && *w > 0.0)) {
            return Err(ConfigError::WidthGuess(w));
        }
        Ok(QuantalFitter::new(QuantalModel::new(
            self.n_components,
            self.first_multiple,
            self.width_model,
        )?))
    }

    pub fn width_guess_for(&self, histogram: &HistogramParameters) -> Real {
        self.width_guess
            .unwrap_or(histogram.max_amplitude / 20.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExtractionParameters {
    /// Samples searched either side of each reference time for the response maximum.
    pub search_radius: usize,
    /// ROIs whose mean response over masked noise falls below this are excluded.
    pub min_snr: Real,
    /// Samples removed either side of each reference time for the noise estimate.
    pub mask_width: usize,
    /// Condition whose `Mean` peaks define the reference times; the last one when unset.
    pub reference_condition: Option<String>,
    pub group_size: usize,
}

impl Default for ExtractionParameters {
    fn default() -> Self {
        Self {
            search_radius: 2,
            min_snr: 2.0,
            mask_width: 10,
            reference_condition: None,
            group_size: 5,
        }
    }
}

impl ExtractionParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_snr.is_finite() && self.min_snr >= 0.0) {
            return Err(ConfigError::Threshold(self.min_snr));
        }
        if self.group_size == 0 {
            return Err(ConfigError::GroupSize);
        }
        Ok(())
    }
}

/// Every tunable of an analysis run. Missing fields take their defaults.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AnalysisConfig {
    pub baseline: BaselineParameters,
    pub smoothing: SmoothingParameters,
    pub detection: DetectionParameters,
    pub histogram: HistogramParameters,
    pub quantal: QuantalParameters,
    pub extraction: ExtractionParameters,
}

impl AnalysisConfig {
    /// Checks every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.baseline.estimator()?;
        self.smoothing.smoother()?;
        self.detection.detector()?;
        self.histogram.validate()?;
        self.quantal.fitter()?;
        self.extraction.validate()
    }

    /// Overrides the detection section with values given on the command line.
    pub fn apply_mode(&mut self, mode: &Mode) {
        let detection = &mut self.detection;
        match mode {
            Mode::Wavelet(params) => {
                detection.algorithm = DetectionAlgorithm::Wavelet;
                if let Some(width) = params.width {
                    detection.width = width;
                }
                if let Some(snr) = params.snr {
                    detection.snr = snr;
                }
                if let Some(cutoff) = params.cutoff_percent {
                    detection.cutoff_percent = cutoff;
                }
                if let Some(offset) = params.index_offset {
                    detection.index_offset = offset;
                }
            }
            Mode::Simple(params) => {
                detection.algorithm = DetectionAlgorithm::Simple;
                if let Some(prominence) = params.prominence {
                    detection.snr = prominence;
                }
            }
        }
    }
}

#[derive(Default, Debug, Clone, Parser)]
pub struct WaveletParameters {
    /// Exclusive upper wavelet width.
    #[clap(long)]
    pub width: Option<usize>,

    /// Minimum ridge signal to noise ratio.
    #[clap(long)]
    pub snr: Option<Real>,

    /// Peaks not above this percentage of the trace maximum are dropped.
    #[clap(long)]
    pub cutoff_percent: Option<Real>,

    #[clap(long, allow_hyphen_values = true)]
    pub index_offset: Option<isize>,
}

#[derive(Default, Debug, Clone, Parser)]
pub struct SimpleParameters {
    /// Minimum topographic prominence.
    #[clap(long)]
    pub prominence: Option<Real>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    #[clap(about = "Detects peaks as ridges of a continuous wavelet transform.")]
    Wavelet(WaveletParameters),
    #[clap(about = "Detects local maxima of sufficient prominence.")]
    Simple(SimpleParameters),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn defaults_follow_the_control_panel() {
        let config = AnalysisConfig::default();
        assert_eq!(config.baseline.lambda, 1e6);
        assert_approx_eq!(config.baseline.p, 0.251188643, 1e-8);
        assert_eq!(config.smoothing.window, 15);
        assert!(!config.smoothing.enabled);
        assert_eq!(config.detection.width, 6);
        assert_eq!(config.histogram.nbins, 100);
        assert_eq!(config.quantal.n_components, 5);
        assert_approx_eq!(config.quantal.width_guess_for(&config.histogram), 0.05, 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "detection": { "algorithm": "simple", "snr": 2.5 },
            "quantal": { "width-model": "independent", "q-guess": 0.1 }
        }"#;
        let config: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.detection.algorithm, DetectionAlgorithm::Simple);
        assert_eq!(config.detection.snr, 2.5);
        assert_eq!(config.detection.width, 6);
        assert_eq!(config.quantal.width_model, WidthModel::Independent);
        assert_eq!(config.histogram, HistogramParameters::default());
        assert!(matches!(config.detection.detector(), Ok(Detector::Simple(_))));
    }

    #[test]
    fn invalid_sections_are_reported() {
        let mut config = AnalysisConfig::default();
        config.smoothing.enabled = true;
        config.smoothing.window = 14;
        assert_eq!(config.validate(), Err(ConfigError::EvenWindow(14)));

        let mut config = AnalysisConfig::default();
        config.histogram.max_amplitude = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::HistogramRange {
                low: 0.0,
                high: 0.0
            })
        );

        let mut config = AnalysisConfig::default();
        config.quantal.width_guess = Some(-0.1);
        assert_eq!(config.validate(), Err(ConfigError::WidthGuess(-0.1)));
    }

    #[test]
    fn disabled_smoothing_skips_window_checks() {
        let smoothing = SmoothingParameters {
            enabled: false,
            window: 2,
            order: 4,
        };
        assert_eq!(smoothing.smoother(), Ok(None));
    }

    #[test]
    fn command_line_overrides_detection() {
        let mut config = AnalysisConfig::default();
        config.apply_mode(&Mode::Wavelet(WaveletParameters {
            width: Some(2),
            snr: Some(1.0),
            index_offset: Some(-1),
            ..Default::default()
        }));
        assert_eq!(config.detection.width, 2);
        assert_eq!(config.detection.index_offset, -1);
        assert_eq!(config.detection.cutoff_percent, 30.0);

        config.apply_mode(&Mode::Simple(SimpleParameters {
            prominence: Some(3.0),
        }));
        assert_eq!(config.detection.algorithm, DetectionAlgorithm::Simple);
        assert_eq!(config.detection.snr, 3.0);
    }
}
