//! Tabular export of peaks, histograms and traces.
//!
//! A [`Workbook`] is an ordered set of named [`Sheet`]s. Sheet names are unique
//! within a workbook; a clashing name receives a random suffix. Workbooks are
//! written as one CSV file per sheet.
use crate::{
    data::{ConditionTable, Dataset, PeakTable},
    histogram::HistogramSet,
    utils::unique_name,
};
use quantal_common::Real;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

pub const TIME_HEADER: &str = "Time";
pub const BIN_EDGES_HEADER: &str = "BinEdges";
pub const HISTOGRAM_SHEET: &str = "Histograms";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A named table of columns. Columns may differ in length; missing and NaN
/// cells are written empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub columns: Vec<Vec<Real>>,
}

impl Sheet {
    pub fn rows(&self) -> usize {
        self.columns.iter().map(Vec::len).max().unwrap_or_default()
    }

    /// Index column `index_label`, then `<ROI> <condition>` per ROI.
    fn labelled(
        name: &str,
        index_label: &str,
        index: &[Real],
        condition: &str,
        columns: impl Iterator<Item = (String, Vec<Real>)>,
    ) -> Self {
        let mut header = vec![index_label.to_owned()];
        let mut values = vec![index.to_vec()];
        for (roi, column) in columns {
            header.push(format!("{roi} {condition}"));
            values.push(column);
        }
        Self {
            name: name.to_owned(),
            header,
            columns: values,
        }
    }

    pub fn from_peak_table(table: &PeakTable, index_label: &str) -> Self {
        Self::labelled(
            &table.condition,
            index_label,
            &table.times,
            &table.condition,
            table
                .rois
                .iter()
                .cloned()
                .zip(table.values.columns().into_iter().map(|c| c.to_vec())),
        )
    }

    pub fn from_traces(condition: &str, table: &ConditionTable) -> Self {
        Self::labelled(
            condition,
            TIME_HEADER,
            table.times(),
            condition,
            table
                .rois()
                .iter()
                .cloned()
                .zip(table.values().columns().into_iter().map(|c| c.to_vec())),
        )
    }

    /// Bin edges, then one column of counts per series.
    pub fn from_histograms(histograms: &HistogramSet) -> Self {
        let mut header = vec![BIN_EDGES_HEADER.to_owned()];
        let mut columns = vec![histograms.edges().to_vec()];
        for series in histograms.series() {
            header.push(series.label());
            columns.push(series.counts.iter().map(|&c| c as Real).collect());
        }
        Self {
            name: HISTOGRAM_SHEET.to_owned(),
            header,
            columns,
        }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.header)?;
        for row in 0..self.rows() {
            writer.write_record(self.columns.iter().map(|column| {
                column
                    .get(row)
                    .filter(|v| !v.is_nan())
                    .map(Real::to_string)
                    .unwrap_or_default()
            }))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// Appends `sheet`, renaming it if its name is taken. Returns the name used.
    pub fn add_sheet(&mut self, mut sheet: Sheet) -> String {
        if self.sheet(&sheet.name).is_some() {
            sheet.name = unique_name(&sheet.name, |name| self.sheet(name).is_some());
        }
        let name = sheet.name.clone();
        self.sheets.push(sheet);
        name
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Writes `<dir>/<sheet>.csv` for every sheet, creating `dir` if needed.
    pub fn save(&self, dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
        fs::create_dir_all(dir)?;
        let mut paths = Vec::with_capacity(self.sheets.len());
        for sheet in &self.sheets {
            let path = dir.join(format!("{}.csv", sheet.name));
            sheet.write_csv(BufWriter::new(File::create(&path)?))?;
            paths.push(path);
        }
        info!("Saved {} sheets to {}", paths.len(), dir.display());
        Ok(paths)
    }
}

/// One sheet per condition of the allowed peaks, followed by the excluded ones.
/// Rows are the reference peak times when the dataset has them.
pub fn peak_workbook(dataset: &Dataset) -> Workbook {
    let mut workbook = Workbook::default();
    for table in dataset.decompose() {
        workbook.add_sheet(Sheet::from_peak_table(&table, TIME_HEADER));
    }
    if let Some(excluded) = &dataset.excluded {
        let tables = if dataset.peak_times().is_empty() {
            excluded.decompose()
        } else {
            excluded.decompose_on(dataset.peak_times())
        };
        for table in tables {
            workbook.add_sheet(Sheet::from_peak_table(&table, TIME_HEADER));
        }
    }
    workbook
}

/// One sheet per condition holding the traces as stored.
pub fn trace_workbook(dataset: &Dataset) -> Workbook {
    let mut workbook = Workbook::default();
    for (condition, table) in dataset.tables() {
        workbook.add_sheet(Sheet::from_traces(condition, table));
    }
    workbook
}

/// One sheet per grouped summary table, indexed by phase.
pub fn grouped_workbook(tables: &[PeakTable]) -> Workbook {
    let mut workbook = Workbook::default();
    for table in tables {
        workbook.add_sheet(Sheet::from_peak_table(table, "Group"));
    }
    workbook
}
