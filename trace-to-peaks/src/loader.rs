use crate::{
    data::{ConditionTable, Dataset},
    error::{AnalysisError, DataError},
};
use quantal_common::{Real, Time};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Condition {condition} has no ROI columns")]
    NoColumns { condition: String },
    #[error("Condition {condition}, line {line}: cannot parse {value:?} as a number")]
    Parse {
        condition: String,
        line: usize,
        value: String,
    },
    #[error(transparent)]
    Data(#[from] DataError),
}

fn parse_cell(condition: &str, line: usize, value: &str) -> Result<Real, LoadError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Real::NAN);
    }
    value.parse().map_err(|_| LoadError::Parse {
        condition: condition.to_owned(),
        line,
        value: value.to_owned(),
    })
}

/// Reads one condition table: a header row naming the time column and then
/// each ROI, followed by one row per sample. Empty cells are NaN.
pub fn read_condition<R: Read>(reader: R, condition: &str) -> Result<ConditionTable, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let rois: Vec<String> = csv_reader.headers()?.iter().skip(1).map(str::to_owned).collect();
    if rois.is_empty() {
        return Err(LoadError::NoColumns {
            condition: condition.to_owned(),
        });
    }

    let mut times: Vec<Time> = Vec::new();
    let mut columns: Vec<Vec<Real>> = vec![Vec::new(); rois.len()];
    for (row, record) in csv_reader.records().enumerate() {
        let record = record?;
        let line = row + 2;
        let mut cells = record.iter();
        times.push(parse_cell(condition, line, cells.next().unwrap_or_default())?);
        for column in columns.iter_mut() {
            column.push(parse_cell(condition, line, cells.next().unwrap_or_default())?);
        }
    }
    debug!("Read {} samples of {} ROIs for {condition}", times.len(), rois.len());
    Ok(ConditionTable::from_columns(
        condition,
        times,
        rois.into_iter().zip(columns).collect(),
    )?)
}

/// Loads a dataset from one CSV file per condition, in the given order.
pub fn load_dataset<P: AsRef<Path>>(
    name: &str,
    files: &[(String, P)],
) -> Result<Dataset, AnalysisError> {
    let mut tables = Vec::with_capacity(files.len());
    for (condition, path) in files {
        let file = File::open(path.as_ref()).map_err(LoadError::from)?;
        tables.push((condition.clone(), read_condition(BufReader::new(file), condition)?));
    }
    let dataset = Dataset::from_traces(name, tables)?;
    info!(
        "Loaded dataset {name} with {} conditions and {} ROIs",
        dataset.conditions().len(),
        dataset.real_rois().len()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_time_and_roi_columns() {
        let csv = "t, X, Y\n0, 1.5, 2\n1, , 3\n2, 4, 5\n";
        let table = read_condition(csv.as_bytes(), "A").unwrap();
        assert_eq!(table.rois(), &["X", "Y"]);
        assert_eq!(table.times(), &[0.0, 1.0, 2.0]);
        let x = table.column("X").unwrap();
        assert_eq!(x[0], 1.5);
        assert!(x[1].is_nan());
        assert_eq!(table.column("Y").unwrap().to_vec(), vec![2.0, 3.0, 5.0]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let csv = "t,X,Y\n0,1\n";
        let result = read_condition(csv.as_bytes(), "A");
        assert!(matches!(result, Err(LoadError::Csv(_))));
    }

    #[test]
    fn bad_cells_are_reported_with_their_line() {
        let csv = "t,X\n0,1\n1,abc\n";
        match read_condition(csv.as_bytes(), "A") {
            Err(LoadError::Parse { line, value, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn time_column_alone_is_rejected() {
        assert!(matches!(
            read_condition("t\n0\n".as_bytes(), "A"),
            Err(LoadError::NoColumns { .. })
        ));
    }

    #[test]
    fn decreasing_time_is_rejected() {
        assert!(matches!(
            read_condition("t,X\n1,0\n0,0\n".as_bytes(), "A"),
            Err(LoadError::Data(DataError::TimeOrder(_)))
        ));
    }
}
