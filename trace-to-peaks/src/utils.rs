use quantal_common::{Real, Time};
use rand::{Rng, distr::Alphanumeric};

/// Index of the sample whose time is closest to `target`.
/// Ties resolve to the earliest sample. Returns `None` for an empty axis or a NaN target.
pub fn nearest_sample(times: &[Time], target: Time) -> Option<usize> {
    if target.is_nan() {
        return None;
    }
    times
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_nan())
        .fold(None, |best: Option<(usize, Real)>, (i, t)| {
            let distance = (t - target).abs();
            match best {
                Some((_, d)) if d <= distance => best,
                _ => Some((i, distance)),
            }
        })
        .map(|(i, _)| i)
}

/// Generates `len` random alphanumeric characters.
pub fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Appends a random three character suffix to `base` until `is_taken` rejects it.
pub fn unique_name<F>(base: &str, is_taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    loop {
        let candidate = format!("{base}{}", random_suffix(3));
        if !is_taken(&candidate) {
            return candidate;
        }
    }
}

/// Marks every sample within `width` samples of a sample nearest to one of `peak_times`.
pub fn peak_mask(times: &[Time], peak_times: &[Time], width: usize) -> Vec<bool> {
    let mut mask = vec![false; times.len()];
    for index in peak_times
        .iter()
        .filter_map(|&t| nearest_sample(times, t))
    {
        let start = index.saturating_sub(width);
        let end = (index + width + 1).min(times.len());
        mask[start..end].iter_mut().for_each(|m| *m = true);
    }
    mask
}

/// Sample variance (one degree of freedom removed) of the finite values.
pub fn sample_variance<I>(values: I) -> Option<Real>
where
    I: IntoIterator<Item = Real>,
{
    let values: Vec<Real> = values.into_iter().filter(|v| v.is_finite()).collect();
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as Real;
    let mean = values.iter().sum::<Real>() / n;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<Real>();
    Some(ss / (n - 1.0))
}

/// Sample standard deviation of the finite values.
pub fn sample_std<I>(values: I) -> Option<Real>
where
    I: IntoIterator<Item = Real>,
{
    sample_variance(values).map(Real::sqrt)
}

/// Mean of the finite values.
pub fn finite_mean<I>(values: I) -> Option<Real>
where
    I: IntoIterator<Item = Real>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as Real)
}

/// Standard deviation of `values` once the samples around `peak_times` are masked out.
pub fn masked_std(times: &[Time], values: &[Real], peak_times: &[Time], width: usize) -> Option<Real> {
    let mask = peak_mask(times, peak_times, width);
    sample_std(
        values
            .iter()
            .zip(mask)
            .filter_map(|(&v, masked)| (!masked).then_some(v)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn nearest_sample_prefers_earliest_on_tie() {
        let times = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(nearest_sample(&times, 1.5), Some(1));
        assert_eq!(nearest_sample(&times, 2.6), Some(3));
        assert_eq!(nearest_sample(&times, -4.0), Some(0));
        assert_eq!(nearest_sample(&[], 1.0), None);
        assert_eq!(nearest_sample(&times, Real::NAN), None);
    }

    #[test]
    fn unique_name_adds_three_characters() {
        let name = unique_name("foo", |n| n == "foo");
        assert_eq!(name.len(), 6);
        assert!(name.starts_with("foo"));
        assert!(name.chars().skip(3).all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn peak_mask_clamps_at_edges() {
        let times: Vec<Time> = (0..8).map(|i| i as Time).collect();
        let mask = peak_mask(&times, &[0.0, 6.2], 1);
        assert_eq!(
            mask,
            vec![true, true, false, false, false, true, true, true]
        );
    }

    #[test]
    fn masked_std_ignores_peaks() {
        let times: Vec<Time> = (0..7).map(|i| i as Time).collect();
        let values = [1.0, -1.0, 1.0, 50.0, 1.0, -1.0, 1.0];
        let sd = masked_std(&times, &values, &[3.0], 0).unwrap();
        assert_approx_eq!(sd, (6.0_f64 / 5.0 * (1.0 - 1.0 / 9.0)).sqrt(), 1e-12);
        assert_eq!(sample_std([1.0]), None);
    }
}
