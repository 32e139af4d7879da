use anyhow::{Context, Error, Result, anyhow};
use clap::Parser;
use metrics::counter;
use quantal_common::{
    init_tracer,
    metrics::{
        component_info_metric, describe_metrics,
        failures::{self, FailureKind},
        names::FAILURES,
    },
    progress::LogProgress,
    tracer::{TracerEngine, TracerOptions},
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use trace_to_peaks::{
    data::{Dataset, Store},
    export::{Sheet, Workbook, grouped_workbook, peak_workbook, trace_workbook},
    grouping::group_peaks,
    loader::load_dataset,
    parameters::{AnalysisConfig, Mode},
    peak_detection::DetectionSession,
    processing::{build_histograms, detect_all, extract_all_peaks, fit_roi_histogram},
};
use tracing::{info, level_filters::LevelFilter, warn};

// cargo run --bin trace-to-peaks -- --condition control=control.csv --condition drug=drug.csv --extract --fit Sum wavelet --width 6

/// A condition name and the CSV file holding its traces.
#[derive(Debug, Clone)]
struct ConditionFile {
    condition: String,
    path: PathBuf,
}

impl FromStr for ConditionFile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((condition, path)) = s.split_once('=') {
            return Ok(ConditionFile {
                condition: condition.to_owned(),
                path: PathBuf::from(path),
            });
        }
        let path = PathBuf::from(s);
        let condition = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| anyhow!("Cannot name a condition after '{s}', expected 'name=path'"))?
            .to_owned();
        Ok(ConditionFile { condition, path })
    }
}

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Traces of one condition, as `name=path` or a path whose stem names the condition.
    #[clap(long = "condition", required = true)]
    conditions: Vec<ConditionFile>,

    #[clap(long, default_value = "dataset")]
    name: String,

    /// JSON analysis configuration. Missing fields take their defaults.
    #[clap(long, env = "TRACE_TO_PEAKS_CONFIG")]
    config: Option<PathBuf>,

    #[clap(long, default_value = "output")]
    output_dir: PathBuf,

    /// Measure every ROI at the peaks of the Mean trace and continue with the extracted dataset.
    #[clap(long)]
    extract: bool,

    /// Fit the quantal model to the histogram of this ROI summed over conditions.
    #[clap(long)]
    fit: Option<String>,

    /// Export mean and SD of every group of this many consecutive peaks.
    #[clap(long)]
    group: Option<usize>,

    /// Add the amplitude histograms to the peak export.
    #[clap(long)]
    histograms: bool,

    /// Export the traces the final dataset holds.
    #[clap(long)]
    save_traces: bool,

    #[command(subcommand)]
    mode: Option<Mode>,
}

fn load_config(args: &Cli) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Cannot read configuration {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid configuration {}", path.display()))?
        }
        None => AnalysisConfig::default(),
    };
    if let Some(mode) = &args.mode {
        config.apply_mode(mode);
    }
    if let Some(group) = args.group {
        config.extraction.group_size = group;
    }
    config.validate().context("Invalid analysis parameters")?;
    Ok(config)
}

fn save(workbook: &Workbook, dir: &Path) -> Result<()> {
    if workbook.is_empty() {
        return Ok(());
    }
    workbook
        .save(dir)
        .inspect_err(|_| {
            counter!(FAILURES, &[failures::get_label(FailureKind::ExportFailed)]).increment(1)
        })
        .with_context(|| format!("Cannot export to {}", dir.display()))?;
    Ok(())
}

fn export(dataset: &Dataset, config: &AnalysisConfig, args: &Cli) -> Result<()> {
    let dir = args.output_dir.join(dataset.name());
    let mut peaks = peak_workbook(dataset);
    let histograms = build_histograms(dataset, config)?;
    if args.histograms {
        peaks.add_sheet(Sheet::from_histograms(&histograms));
    }

    if let Some(roi) = &args.fit {
        let fit = fit_roi_histogram(&histograms, roi, config)?;
        let (low, high) = config.histogram.range();
        match fit.curve(low, high, 10 * config.histogram.nbins) {
            Some((x, y)) => {
                info!(
                    "Fit of {} Gaussians to {roi}: q = {:.4}, r² = {:.3}",
                    fit.amplitudes.len(),
                    fit.q,
                    fit.r_squared
                );
                peaks.add_sheet(Sheet {
                    name: format!("Fit {roi}"),
                    header: vec!["Amplitude".to_owned(), "Fit".to_owned()],
                    columns: vec![x, y],
                });
            }
            None => warn!("Fit to {roi} failed: {:?}", fit.termination),
        }
    }
    save(&peaks, &dir.join("peaks"))?;

    if args.save_traces {
        save(&trace_workbook(dataset), &dir.join("traces"))?;
    }
    if args.group.is_some() {
        let grouped = group_peaks(&dataset.decompose(), config.extraction.group_size)?;
        save(&grouped_workbook(&grouped), &dir.join("groups"))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let _tracer = init_tracer!(TracerOptions {
        default_level: LevelFilter::INFO,
        ..Default::default()
    });

    describe_metrics();
    component_info_metric("trace-to-peaks");

    let config = load_config(&args)?;
    let files: Vec<(String, PathBuf)> = args
        .conditions
        .iter()
        .map(|c| (c.condition.clone(), c.path.clone()))
        .collect();
    let mut dataset = load_dataset(&args.name, &files)?;

    let mut session = DetectionSession::default();
    session.apply_controls(&dataset.gui_controls);
    detect_all(&mut dataset, &session, &config, &mut LogProgress)?;

    let working = if args.extract {
        let extracted = extract_all_peaks(&dataset, &config, &mut LogProgress)?;
        let mut store = Store::default();
        let extracted_name = store.store_set(extracted);
        let working = store.switch_to(dataset, &extracted_name)?;
        info!("Working on {}", working.name());
        working
    } else {
        dataset
    };

    export(&working, &config, &args)?;
    Ok(())
}
