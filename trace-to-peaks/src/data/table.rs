use super::Trace;
use crate::{
    error::DataError,
    utils::{finite_mean, sample_variance},
};
use ndarray::{Array2, ArrayView1, ArrayView2};
use quantal_common::{MEAN_ROI, Real, Time, VARIANCE_ROI, is_synthetic_roi};

/// The traces of one condition: a shared time index and one column per real ROI.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionTable {
    times: Vec<Time>,
    rois: Vec<String>,
    values: Array2<Real>,
}

impl ConditionTable {
    /// Validates the shape, ROI names and time ordering of a table.
    /// `label` names the table in errors.
    pub fn new(
        label: &str,
        times: Vec<Time>,
        rois: Vec<String>,
        values: Array2<Real>,
    ) -> Result<Self, DataError> {
        if values.nrows() != times.len() {
            return Err(DataError::TableShape {
                times: times.len(),
                rows: values.nrows(),
            });
        }
        if values.ncols() != rois.len() {
            return Err(DataError::RoiShape {
                rois: rois.len(),
                columns: values.ncols(),
            });
        }
        for (i, roi) in rois.iter().enumerate() {
            if is_synthetic_roi(roi) {
                return Err(DataError::ReservedRoi(roi.clone()));
            }
            if rois[..i].contains(roi) {
                return Err(DataError::DuplicateRoi(roi.clone()));
            }
        }
        if times.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err(DataError::TimeOrder(label.to_owned()));
        }
        Ok(Self {
            times,
            rois,
            values,
        })
    }

    /// Builds a table from named columns of equal length.
    pub fn from_columns(
        label: &str,
        times: Vec<Time>,
        columns: Vec<(String, Vec<Real>)>,
    ) -> Result<Self, DataError> {
        let rows = times.len();
        let mut values = Array2::zeros((rows, columns.len()));
        let mut rois = Vec::with_capacity(columns.len());
        for (j, (roi, column)) in columns.into_iter().enumerate() {
            if column.len() != rows {
                return Err(DataError::TableShape {
                    times: rows,
                    rows: column.len(),
                });
            }
            values
                .column_mut(j)
                .iter_mut()
                .zip(column)
                .for_each(|(cell, v)| *cell = v);
            rois.push(roi);
        }
        Self::new(label, times, rois, values)
    }

    pub fn times(&self) -> &[Time] {
        &self.times
    }

    pub fn rois(&self) -> &[String] {
        &self.rois
    }

    pub fn values(&self) -> ArrayView2<'_, Real> {
        self.values.view()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, roi: &str) -> Option<ArrayView1<'_, Real>> {
        let j = self.rois.iter().position(|r| r == roi)?;
        Some(self.values.column(j))
    }

    /// The trace for a real or synthetic ROI.
    pub fn trace(&self, roi: &str) -> Option<Trace> {
        match roi {
            MEAN_ROI => Some(self.mean_trace()),
            VARIANCE_ROI => Some(self.variance_trace()),
            _ => self
                .column(roi)
                .map(|c| Trace::new(self.times.clone(), c.to_vec())),
        }
    }

    /// Row mean over the finite values of the real ROIs; NaN where a row has none.
    pub fn mean_trace(&self) -> Trace {
        let values = self
            .values
            .rows()
            .into_iter()
            .map(|row| finite_mean(row.iter().copied()).unwrap_or(Real::NAN))
            .collect();
        Trace::new(self.times.clone(), values)
    }

    /// Row sample variance (one degree of freedom) over the finite values of the
    /// real ROIs. Zero when the table has fewer than two ROIs, NaN where a row
    /// has fewer than two finite values.
    pub fn variance_trace(&self) -> Trace {
        let values = if self.rois.len() < 2 {
            vec![0.0; self.times.len()]
        } else {
            self.values
                .rows()
                .into_iter()
                .map(|row| sample_variance(row.iter().copied()).unwrap_or(Real::NAN))
                .collect()
        };
        Trace::new(self.times.clone(), values)
    }

    /// A copy with every ROI column replaced by `f(roi, column)`.
    pub fn map_columns<F, E>(&self, mut f: F) -> Result<Self, E>
    where
        F: FnMut(&str, &[Real]) -> Result<Vec<Real>, E>,
    {
        let mut values = self.values.clone();
        for (j, roi) in self.rois.iter().enumerate() {
            let column = self.values.column(j).to_vec();
            let mapped = f(roi, &column)?;
            values
                .column_mut(j)
                .iter_mut()
                .zip(mapped)
                .for_each(|(cell, v)| *cell = v);
        }
        Ok(Self {
            times: self.times.clone(),
            rois: self.rois.clone(),
            values,
        })
    }

    /// Minimum and maximum finite amplitudes.
    pub(crate) fn value_range(&self) -> Option<(Real, Real)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::array;

    fn table() -> ConditionTable {
        ConditionTable::from_columns(
            "A",
            vec![0.0, 1.0, 2.0],
            vec![
                ("X".to_owned(), vec![1.0, 2.0, 3.0]),
                ("Y".to_owned(), vec![3.0, 2.0, 5.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn synthetic_traces() {
        let table = table();
        assert_eq!(table.trace(MEAN_ROI).unwrap().values, vec![2.0, 2.0, 4.0]);
        let variance = table.trace(VARIANCE_ROI).unwrap().values;
        assert_approx_eq!(variance[0], 2.0, 1e-12);
        assert_approx_eq!(variance[1], 0.0, 1e-12);
        assert_approx_eq!(variance[2], 2.0, 1e-12);
        assert_eq!(table.trace("Y").unwrap().values, vec![3.0, 2.0, 5.0]);
        assert!(table.trace("Z").is_none());
    }

    #[test]
    fn synthetic_traces_skip_missing_cells() {
        let table = ConditionTable::from_columns(
            "A",
            vec![0.0, 1.0, 2.0],
            vec![
                ("X".to_owned(), vec![1.0, Real::NAN, 3.0]),
                ("Y".to_owned(), vec![3.0, 4.0, 5.0]),
                ("Z".to_owned(), vec![2.0, 6.0, 1.0]),
            ],
        )
        .unwrap();
        let mean = table.mean_trace().values;
        assert_approx_eq!(mean[0], 2.0, 1e-12);
        assert_approx_eq!(mean[1], 5.0, 1e-12);
        assert_approx_eq!(mean[2], 3.0, 1e-12);
        let variance = table.variance_trace().values;
        assert_approx_eq!(variance[0], 1.0, 1e-12);
        assert_approx_eq!(variance[1], 2.0, 1e-12);
        assert_approx_eq!(variance[2], 4.0, 1e-12);
    }

    #[test]
    fn rows_without_enough_values_are_nan() {
        let table = ConditionTable::from_columns(
            "A",
            vec![0.0, 1.0],
            vec![
                ("X".to_owned(), vec![Real::NAN, Real::NAN]),
                ("Y".to_owned(), vec![Real::NAN, 2.0]),
            ],
        )
        .unwrap();
        assert!(table.mean_trace().values[0].is_nan());
        assert_eq!(table.mean_trace().values[1], 2.0);
        assert!(table.variance_trace().values[1].is_nan());
    }

    #[test]
    fn single_roi_has_zero_variance() {
        let table = ConditionTable::new("A", vec![0.0, 1.0], vec!["X".to_owned()], array![[1.0], [4.0]])
            .unwrap();
        assert_eq!(table.variance_trace().values, vec![0.0, 0.0]);
    }

    #[test]
    fn rejects_malformed_tables() {
        assert_eq!(
            ConditionTable::new("A", vec![1.0, 0.0], vec!["X".to_owned()], array![[1.0], [2.0]]),
            Err(DataError::TimeOrder("A".to_owned()))
        );
        assert_eq!(
            ConditionTable::new(
                "A",
                vec![0.0],
                vec!["X".to_owned(), "X".to_owned()],
                array![[1.0, 2.0]]
            ),
            Err(DataError::DuplicateRoi("X".to_owned()))
        );
        assert_eq!(
            ConditionTable::new("A", vec![0.0], vec![MEAN_ROI.to_owned()], array![[1.0]]),
            Err(DataError::ReservedRoi(MEAN_ROI.to_owned()))
        );
        assert_eq!(
            ConditionTable::new("A", vec![0.0, 1.0], vec!["X".to_owned()], array![[1.0]]),
            Err(DataError::TableShape { times: 2, rows: 1 })
        );
    }

    #[test]
    fn map_columns_keeps_index() {
        let table = table();
        let shifted = table
            .map_columns::<_, DataError>(|_, c| Ok(c.iter().map(|v| v - 1.0).collect()))
            .unwrap();
        assert_eq!(shifted.times(), table.times());
        assert_eq!(shifted.column("X").unwrap().to_vec(), vec![0.0, 1.0, 2.0]);
        assert_eq!(table.value_range(), Some((1.0, 5.0)));
    }
}
