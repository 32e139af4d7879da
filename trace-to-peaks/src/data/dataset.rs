use super::{ConditionTable, PeakTable, Results, Trace};
use crate::{
    error::{AnalysisError, ConfigError, DataError},
    utils::masked_std,
};
use quantal_common::{MEAN_ROI, Real, Time, VARIANCE_ROI};
use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicU64, Ordering},
};

/// Presentation directive controlling whether automatic peak detection is available.
pub const AUTO_PEAKS_DIRECTIVE: &str = "autoPeaks";

static NEXT_DATASET_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a dataset. Clones share the identity of their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(u64);

impl DatasetId {
    fn next() -> Self {
        Self(NEXT_DATASET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Time and amplitude extent of every trace in a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataRanges {
    pub time: (Time, Time),
    pub amplitude: (Real, Real),
}

/// All traces and derived results of one experiment.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: DatasetId,
    name: String,
    conditions: Vec<String>,
    traces: HashMap<String, ConditionTable>,
    roi_list: Vec<String>,
    pub results: Results,
    pub excluded: Option<Results>,
    peak_times: Vec<Time>,
    pub gui_controls: BTreeMap<String, String>,
}

impl Dataset {
    /// Creates a dataset from condition tables, in the given condition order.
    /// Every table must carry the same set of ROI columns.
    pub fn from_traces(
        name: &str,
        tables: Vec<(String, ConditionTable)>,
    ) -> Result<Self, AnalysisError> {
        let first_rois = tables
            .first()
            .map(|(_, t)| t.rois().to_vec())
            .ok_or(ConfigError::NoConditions)?;

        let mut conditions = Vec::with_capacity(tables.len());
        let mut traces = HashMap::with_capacity(tables.len());
        for (condition, table) in tables {
            let mut missing: Vec<String> = first_rois
                .iter()
                .filter(|r| !table.rois().contains(r))
                .cloned()
                .collect();
            missing.extend(
                table
                    .rois()
                    .iter()
                    .filter(|r| !first_rois.contains(r))
                    .cloned(),
            );
            if !missing.is_empty() {
                return Err(DataError::InconsistentRois { condition, missing }.into());
            }
            if traces.contains_key(&condition) {
                return Err(DataError::DuplicateCondition(condition).into());
            }
            conditions.push(condition.clone());
            traces.insert(condition, table);
        }

        let mut roi_list = vec![MEAN_ROI.to_owned(), VARIANCE_ROI.to_owned()];
        roi_list.extend(first_rois);

        Ok(Self {
            id: DatasetId::next(),
            name: name.to_owned(),
            results: Results::with_layout(roi_list.clone(), conditions.clone()),
            conditions,
            traces,
            roi_list,
            excluded: None,
            peak_times: Vec::new(),
            gui_controls: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    /// `Mean`, `Variance`, then the real ROIs in column order.
    pub fn roi_list(&self) -> &[String] {
        &self.roi_list
    }

    pub fn real_rois(&self) -> &[String] {
        self.roi_list.get(2..).unwrap_or_default()
    }

    pub fn table(&self, condition: &str) -> Result<&ConditionTable, DataError> {
        self.traces
            .get(condition)
            .ok_or_else(|| DataError::MissingCondition(condition.to_owned()))
    }

    /// Condition tables in condition order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &ConditionTable)> {
        self.conditions
            .iter()
            .filter_map(|c| Some((c.as_str(), self.traces.get(c)?)))
    }

    /// The trace of a real or synthetic ROI in one condition.
    pub fn trace(&self, roi: &str, condition: &str) -> Result<Trace, DataError> {
        let trace = self
            .table(condition)?
            .trace(roi)
            .ok_or_else(|| DataError::MissingRoi {
                roi: roi.to_owned(),
                condition: condition.to_owned(),
            })?;
        if trace.is_empty() {
            return Err(DataError::EmptyTrace {
                roi: roi.to_owned(),
                condition: condition.to_owned(),
            });
        }
        Ok(trace)
    }

    pub fn peak_times(&self) -> &[Time] {
        &self.peak_times
    }

    /// Stores the reference peak times sorted with NaN removed.
    pub fn set_peak_times(&mut self, times: &[Time]) {
        let mut times: Vec<Time> = times.iter().copied().filter(|t| !t.is_nan()).collect();
        times.sort_by(Time::total_cmp);
        self.peak_times = times;
    }

    pub fn gui_control(&self, key: &str) -> Option<&str> {
        self.gui_controls.get(key).map(String::as_str)
    }

    /// Extent of the time axis and of the amplitudes across all conditions.
    /// `None` when every table is empty.
    pub fn ranges(&self) -> Option<DataRanges> {
        self.tables()
            .filter_map(|(_, table)| {
                let time = (*table.times().first()?, *table.times().last()?);
                let amplitude = table.value_range()?;
                Some(DataRanges { time, amplitude })
            })
            .reduce(|a, b| DataRanges {
                time: (a.time.0.min(b.time.0), a.time.1.max(b.time.1)),
                amplitude: (
                    a.amplitude.0.min(b.amplitude.0),
                    a.amplitude.1.max(b.amplitude.1),
                ),
            })
    }

    /// Peak tables per condition, with rows at the reference peak times when
    /// they are set and at the union of detected times otherwise.
    pub fn decompose(&self) -> Vec<PeakTable> {
        if self.peak_times.is_empty() {
            self.results.decompose()
        } else {
            self.results.decompose_on(&self.peak_times)
        }
    }

    /// Noise estimate per (ROI, condition): the sample standard deviation of each
    /// real ROI trace with the samples within `mask_width` of any reference
    /// peak removed. Cells with fewer than two remaining samples are omitted.
    pub fn masked_sd(&self, mask_width: usize) -> BTreeMap<(String, String), Real> {
        let mut out = BTreeMap::new();
        for (condition, table) in self.tables() {
            for roi in table.rois() {
                let Some(column) = table.column(roi) else {
                    continue;
                };
                let values = column.to_vec();
                if let Some(sd) = masked_std(table.times(), &values, &self.peak_times, mask_width)
                {
                    out.insert((roi.clone(), condition.to_owned()), sd);
                }
            }
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    pub(crate) fn two_condition_dataset(name: &str) -> Dataset {
        let times: Vec<Time> = (0..9).map(|i| i as Time).collect();
        let a = ConditionTable::from_columns(
            "A",
            times.clone(),
            vec![
                ("X".to_owned(), vec![0., 1., 0., 5., 0., 1., 0., 6., 0.]),
                ("Y".to_owned(), vec![0., 0., 0., 4., 0., 0., 0., 2., 0.]),
            ],
        )
        .unwrap();
        let b = ConditionTable::from_columns(
            "B",
            times,
            vec![
                ("X".to_owned(), vec![1., 1., 1., 3., 1., 1., 1., 1., 1.]),
                ("Y".to_owned(), vec![0., 0., 0., 0., 0., 0., 0., 9., 0.]),
            ],
        )
        .unwrap();
        Dataset::from_traces(name, vec![("A".to_owned(), a), ("B".to_owned(), b)]).unwrap()
    }

    #[test]
    fn roi_list_starts_with_synthetic() {
        let dataset = two_condition_dataset("d");
        assert_eq!(dataset.roi_list(), &["Mean", "Variance", "X", "Y"]);
        assert_eq!(dataset.real_rois(), &["X", "Y"]);
        assert_eq!(dataset.conditions(), &["A", "B"]);
    }

    #[test]
    fn trace_lookup_reports_no_data() {
        let dataset = two_condition_dataset("d");
        assert_eq!(
            dataset.trace("X", "C"),
            Err(DataError::MissingCondition("C".to_owned()))
        );
        assert_eq!(
            dataset.trace("Z", "A"),
            Err(DataError::MissingRoi {
                roi: "Z".to_owned(),
                condition: "A".to_owned()
            })
        );
        assert_eq!(dataset.trace("Mean", "A").unwrap().values[3], 4.5);
    }

    #[test]
    fn inconsistent_rois_rejected() {
        let a = ConditionTable::from_columns("A", vec![0.0], vec![("X".to_owned(), vec![1.0])])
            .unwrap();
        let b = ConditionTable::from_columns("B", vec![0.0], vec![("Y".to_owned(), vec![1.0])])
            .unwrap();
        let result = Dataset::from_traces("d", vec![("A".to_owned(), a), ("B".to_owned(), b)]);
        assert!(matches!(
            result,
            Err(AnalysisError::Data(DataError::InconsistentRois { .. }))
        ));
        assert!(matches!(
            Dataset::from_traces("d", vec![]),
            Err(AnalysisError::Config(ConfigError::NoConditions))
        ));
    }

    #[test]
    fn peak_times_sorted_without_nan() {
        let mut dataset = two_condition_dataset("d");
        dataset.set_peak_times(&[7.0, Real::NAN, 3.0]);
        assert_eq!(dataset.peak_times(), &[3.0, 7.0]);
    }

    #[test]
    fn ranges_cover_all_conditions() {
        let dataset = two_condition_dataset("d");
        let ranges = dataset.ranges().unwrap();
        assert_eq!(ranges.time, (0.0, 8.0));
        assert_eq!(ranges.amplitude, (0.0, 9.0));
    }

    #[test]
    fn masked_sd_excludes_peak_samples() {
        let mut dataset = two_condition_dataset("d");
        dataset.set_peak_times(&[3.0, 7.0]);
        let sd = dataset.masked_sd(0);
        // B/X is constant once t = 3 is removed
        assert_approx_eq!(sd[&("X".to_owned(), "B".to_owned())], 0.0, 1e-12);
        assert_approx_eq!(sd[&("Y".to_owned(), "A".to_owned())], 0.0, 1e-12);
    }

    #[test]
    fn clones_share_identity() {
        let a = two_condition_dataset("d");
        let b = two_condition_dataset("d");
        assert_eq!(a.clone().id(), a.id());
        assert_ne!(a.id(), b.id());
    }
}
