use crate::{
    data::PeakTable,
    error::ConfigError,
    utils::{finite_mean, sample_std},
};
use ndarray::Array2;
use quantal_common::{Real, Time};
use tracing::info;

/// Summarises repeated stimulus patterns. For every condition, row `p` of the
/// output holds the mean (in `<condition>_m`) and standard deviation (in
/// `<condition>_sd`) of rows `p, p + group, p + 2·group, …` of the input,
/// per ROI. NaN cells are skipped.
pub fn group_peaks(tables: &[PeakTable], group: usize) -> Result<Vec<PeakTable>, ConfigError> {
    if group == 0 {
        return Err(ConfigError::GroupSize);
    }
    let mut grouped = Vec::with_capacity(2 * tables.len());
    for table in tables {
        let shape = (group, table.rois.len());
        let mut means = Array2::from_elem(shape, Real::NAN);
        let mut sds = Array2::from_elem(shape, Real::NAN);
        for (j, column) in table.values.columns().into_iter().enumerate() {
            for p in 0..group {
                let phase = || column.iter().copied().skip(p).step_by(group);
                means[[p, j]] = finite_mean(phase()).unwrap_or(Real::NAN);
                sds[[p, j]] = sample_std(phase()).unwrap_or(Real::NAN);
            }
        }
        let phases: Vec<Time> = (0..group).map(|p| p as Time).collect();
        grouped.push(PeakTable {
            condition: format!("{}_m", table.condition),
            times: phases.clone(),
            rois: table.rois.clone(),
            values: means,
        });
        grouped.push(PeakTable {
            condition: format!("{}_sd", table.condition),
            times: phases,
            rois: table.rois.clone(),
            values: sds,
        });
    }
    info!("Grouped {} peak tables into {group} phases", tables.len());
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::array;

    fn table() -> PeakTable {
        PeakTable {
            condition: "A".to_owned(),
            times: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            rois: vec!["X".to_owned(), "Y".to_owned()],
            values: array![
                [1.0, 10.0],
                [2.0, 20.0],
                [3.0, Real::NAN],
                [4.0, 40.0],
                [5.0, 50.0],
                [6.0, 60.0]
            ],
        }
    }

    #[test]
    fn phases_are_summarised() {
        let grouped = group_peaks(&[table()], 2).unwrap();
        assert_eq!(grouped.len(), 2);
        let (m, sd) = (&grouped[0], &grouped[1]);
        assert_eq!(m.condition, "A_m");
        assert_eq!(sd.condition, "A_sd");
        assert_eq!(m.times, vec![0.0, 1.0]);
        // phase 0 of X: rows 0, 2, 4
        assert_approx_eq!(m.values[[0, 0]], 3.0, 1e-12);
        assert_approx_eq!(sd.values[[0, 0]], 2.0, 1e-12);
        assert_approx_eq!(m.values[[1, 0]], 4.0, 1e-12);
        // the NaN in Y is skipped
        assert_approx_eq!(m.values[[0, 1]], 30.0, 1e-12);
    }

    #[test]
    fn single_member_phases_have_no_spread() {
        let grouped = group_peaks(&[table()], 4).unwrap();
        assert!(grouped[1].values[[3, 0]].is_nan());
        assert_approx_eq!(grouped[0].values[[3, 0]], 4.0, 1e-12);
    }

    #[test]
    fn zero_group_is_rejected() {
        assert_eq!(group_peaks(&[table()], 0), Err(ConfigError::GroupSize));
    }
}
