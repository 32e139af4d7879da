use super::Peaks;
use crate::error::ConfigError;
use ndarray::Array2;
use quantal_common::{Real, Time};
use std::collections::BTreeMap;

/// Peak amplitudes of one condition tabulated against a shared time index.
/// Cells with no peak at a row's time are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakTable {
    pub condition: String,
    pub times: Vec<Time>,
    pub rois: Vec<String>,
    pub values: Array2<Real>,
}

impl PeakTable {
    pub fn column(&self, roi: &str) -> Option<Vec<Real>> {
        let j = self.rois.iter().position(|r| r == roi)?;
        Some(self.values.column(j).to_vec())
    }
}

/// Per (ROI, condition) peak series. Every stage that writes a cell replaces it
/// wholesale.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Results {
    rois: Vec<String>,
    conditions: Vec<String>,
    cells: BTreeMap<(String, String), Peaks>,
}

impl Results {
    /// An empty table that will decompose into the given ROI and condition order.
    pub fn with_layout(rois: Vec<String>, conditions: Vec<String>) -> Self {
        Self {
            rois,
            conditions,
            cells: Default::default(),
        }
    }

    /// Replaces the cell for (`roi`, `condition`). NaN times are dropped and
    /// repeated times keep their first amplitude.
    pub fn add_peaks(
        &mut self,
        roi: &str,
        condition: &str,
        times: Vec<Time>,
        amplitudes: Vec<Real>,
    ) -> Result<(), ConfigError> {
        let peaks = Peaks::new(times, amplitudes)?;
        self.set_peaks(roi, condition, peaks);
        Ok(())
    }

    pub fn set_peaks(&mut self, roi: &str, condition: &str, peaks: Peaks) {
        if !self.rois.iter().any(|r| r == roi) {
            self.rois.push(roi.to_owned());
        }
        if !self.conditions.iter().any(|c| c == condition) {
            self.conditions.push(condition.to_owned());
        }
        self.cells.insert(
            (roi.to_owned(), condition.to_owned()),
            peaks.dedup_keep_first(),
        );
    }

    /// The stored (times, amplitudes), or two empty slices for a never written cell.
    pub fn get_peaks(&self, roi: &str, condition: &str) -> (&[Time], &[Real]) {
        self.cells
            .get(&(roi.to_owned(), condition.to_owned()))
            .map(|p| (p.times.as_slice(), p.amplitudes.as_slice()))
            .unwrap_or((&[], &[]))
    }

    pub fn peaks(&self, roi: &str, condition: &str) -> Option<&Peaks> {
        self.cells.get(&(roi.to_owned(), condition.to_owned()))
    }

    pub fn rois(&self) -> &[String] {
        &self.rois
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Total number of stored peaks across all cells.
    pub fn peak_count(&self) -> usize {
        self.cells.values().map(Peaks::len).sum()
    }

    /// One table per condition. Rows are the first-seen union of the cell
    /// times of that condition; columns are the ROIs with a written cell.
    pub fn decompose(&self) -> Vec<PeakTable> {
        self.conditions
            .iter()
            .map(|condition| {
                let mut times: Vec<Time> = Vec::new();
                for roi in &self.rois {
                    for &t in self.get_peaks(roi, condition).0 {
                        if !times.contains(&t) {
                            times.push(t);
                        }
                    }
                }
                self.tabulate(condition, times)
            })
            .collect()
    }

    /// One table per condition with rows at the reference times.
    /// NaN reference times are dropped and repeats keep the first row.
    pub fn decompose_on(&self, reference: &[Time]) -> Vec<PeakTable> {
        let mut times: Vec<Time> = Vec::with_capacity(reference.len());
        for &t in reference {
            if !t.is_nan() && !times.contains(&t) {
                times.push(t);
            }
        }
        self.conditions
            .iter()
            .map(|condition| self.tabulate(condition, times.clone()))
            .collect()
    }

    fn tabulate(&self, condition: &str, times: Vec<Time>) -> PeakTable {
        let rois: Vec<String> = self
            .rois
            .iter()
            .filter(|roi| self.peaks(roi, condition).is_some())
            .cloned()
            .collect();
        let mut values = Array2::from_elem((times.len(), rois.len()), Real::NAN);
        for (j, roi) in rois.iter().enumerate() {
            let (cell_times, amplitudes) = self.get_peaks(roi, condition);
            for (i, t) in times.iter().enumerate() {
                if let Some(k) = cell_times.iter().position(|ct| ct == t) {
                    values[[i, j]] = amplitudes[k];
                }
            }
        }
        PeakTable {
            condition: condition.to_owned(),
            times,
            rois,
            values,
        }
    }

    /// Rebuilds results from decomposed tables. NaN cells are skipped.
    pub fn from_tables(tables: &[PeakTable]) -> Self {
        let mut results = Self::default();
        for table in tables {
            for (j, roi) in table.rois.iter().enumerate() {
                let (times, amplitudes) = table
                    .times
                    .iter()
                    .zip(table.values.column(j))
                    .filter(|(_, v)| !v.is_nan())
                    .map(|(t, v)| (*t, *v))
                    .unzip();
                results.set_peaks(roi, &table.condition, Peaks { times, amplitudes });
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_written_cell_is_empty() {
        let results = Results::default();
        let (times, amplitudes) = results.get_peaks("X", "A");
        assert!(times.is_empty());
        assert!(amplitudes.is_empty());
    }

    #[test]
    fn add_peaks_overwrites() {
        let mut results = Results::default();
        results
            .add_peaks("X", "A", vec![1.0, 2.0], vec![5.0, 6.0])
            .unwrap();
        results.add_peaks("X", "A", vec![3.0], vec![7.0]).unwrap();
        assert_eq!(results.get_peaks("X", "A"), (&[3.0][..], &[7.0][..]));
        assert_eq!(results.peak_count(), 1);
    }

    #[test]
    fn add_peaks_rejects_mismatch_without_mutation() {
        let mut results = Results::default();
        results.add_peaks("X", "A", vec![1.0], vec![5.0]).unwrap();
        assert!(results.add_peaks("X", "A", vec![1.0, 2.0], vec![5.0]).is_err());
        assert_eq!(results.get_peaks("X", "A"), (&[1.0][..], &[5.0][..]));
    }

    #[test]
    fn decompose_has_unique_rows() {
        let mut results = Results::default();
        results
            .add_peaks("X", "A", vec![1.0, 2.0, 1.0], vec![10.0, 20.0, 30.0])
            .unwrap();
        results
            .add_peaks("Y", "A", vec![2.0, 3.0], vec![21.0, 31.0])
            .unwrap();
        results.add_peaks("X", "B", vec![5.0], vec![50.0]).unwrap();

        let tables = results.decompose();
        assert_eq!(tables.len(), 2);
        let a = &tables[0];
        assert_eq!(a.condition, "A");
        assert_eq!(a.times, vec![1.0, 2.0, 3.0]);
        assert_eq!(a.rois, vec!["X".to_owned(), "Y".to_owned()]);
        assert_eq!(a.values[[0, 0]], 10.0);
        assert_eq!(a.values[[1, 1]], 21.0);
        assert!(a.values[[0, 1]].is_nan());
        assert!(a.values[[2, 0]].is_nan());

        let b = &tables[1];
        assert_eq!(b.rois, vec!["X".to_owned()]);
        assert_eq!(b.times, vec![5.0]);
    }

    #[test]
    fn decompose_on_reference_times() {
        let mut results = Results::default();
        results
            .add_peaks("X", "A", vec![1.0, 2.0], vec![10.0, 20.0])
            .unwrap();
        let tables = results.decompose_on(&[2.0, Real::NAN, 4.0, 2.0]);
        assert_eq!(tables[0].times, vec![2.0, 4.0]);
        assert_eq!(tables[0].column("X").unwrap()[0], 20.0);
        assert!(tables[0].column("X").unwrap()[1].is_nan());

        let rebuilt = Results::from_tables(&tables);
        assert_eq!(rebuilt.get_peaks("X", "A"), (&[2.0][..], &[20.0][..]));
    }
}
