//! Shared robust statistics primitives used by the rejection policies and
//! the per-spectrum noise and scale estimators.

/// Compute the median of `values`. Returns 0.0 for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Compute the median of the non-zero entries of `values`. Returns 0.0 if
/// every entry is zero.
pub fn nonzero_median(values: &[f64]) -> f64 {
    let nonzero: Vec<f64> = values.iter().copied().filter(|v| *v != 0.0).collect();
    median(&nonzero)
}

/// Compute the sample standard deviation of `values` about their mean.
/// Returns 0.0 when fewer than two values are given.
pub fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    stdev_about(values, mean)
}

/// Compute the sample standard deviation of `values` about a fixed `center`
/// rather than the mean.
pub fn stdev_about(values: &[f64], center: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum: f64 = values.iter().map(|v| (v - center).powi(2)).sum();
    (sum / (values.len() - 1) as f64).sqrt()
}

/// [`stdev`] restricted to the non-zero entries of `values`.
pub fn nonzero_stdev(values: &[f64]) -> f64 {
    let nonzero: Vec<f64> = values.iter().copied().filter(|v| *v != 0.0).collect();
    stdev(&nonzero)
}

/// [`stdev_about`] restricted to the non-zero entries of `values`.
pub fn nonzero_stdev_about(values: &[f64], center: f64) -> f64 {
    let nonzero: Vec<f64> = values.iter().copied().filter(|v| *v != 0.0).collect();
    stdev_about(&nonzero, center)
}

/// The median of the absolute deviations from the median, a robust spread
/// estimate.
pub fn median_absolute_deviation(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// The biweight midvariance of `values`, a robust (outlier-resistant)
/// estimator of statistical spread.
///
/// Samples more than nine MAD units from the median carry zero weight.
/// Returns 0.0 when the MAD itself is zero (a constant signal has no
/// measurable spread).
pub fn biweight_midvariance(values: &[f64]) -> f64 {
    let mad = median_absolute_deviation(values);
    if mad == 0.0 {
        return 0.0;
    }
    let center = median(values);

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for v in values.iter().copied() {
        let u = (v - center) / (9.0 * mad);
        if u.abs() >= 1.0 {
            continue;
        }
        let u2 = u * u;
        numerator += (v - center).powi(2) * (1.0 - u2).powi(4);
        denominator += (1.0 - 5.0 * u2) * (1.0 - u2);
    }
    values.len() as f64 * numerator / denominator.abs().powi(2)
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[1.0, 3.0, 2.0], 2.0)]
    #[case(&[4.0, 1.0, 3.0, 2.0], 2.5)]
    #[case(&[5.0], 5.0)]
    #[case(&[], 0.0)]
    fn test_median(#[case] values: &[f64], #[case] expected: f64) {
        assert_eq!(median(values), expected);
    }

    #[test]
    fn test_nonzero_median() {
        assert_eq!(nonzero_median(&[0.0, 0.0, 1.0, 3.0, 0.0, 2.0]), 2.0);
        assert_eq!(nonzero_median(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_stdev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // sample stdev with the n - 1 denominator
        assert!((stdev(&values) - 2.1380899352993947).abs() < 1e-10);
        assert_eq!(stdev(&[3.0]), 0.0);
        assert_eq!(stdev(&[]), 0.0);
    }

    #[test]
    fn test_stdev_about() {
        let values = [1.0, 2.0, 3.0];
        assert_eq!(stdev_about(&values, 2.0), 1.0);
        // deviations about a shifted center grow
        assert!(stdev_about(&values, 0.0) > stdev(&values));
    }

    #[test]
    fn test_nonzero_stdev() {
        let with_zeros = [0.0, 1.0, 2.0, 3.0, 0.0];
        assert_eq!(nonzero_stdev(&with_zeros), stdev(&[1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_median_absolute_deviation() {
        let values = [1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0];
        assert_eq!(median_absolute_deviation(&values), 1.0);
    }

    #[test]
    fn test_biweight_midvariance() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mv = biweight_midvariance(&values);
        assert!(mv > 0.0);
        assert!(mv.is_finite());

        // scaling the data by c scales the midvariance by c^2
        let scaled: Vec<f64> = values.iter().map(|v| v * 2.0).collect();
        let mv_scaled = biweight_midvariance(&scaled);
        assert!((mv_scaled / mv - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_biweight_midvariance_constant() {
        assert_eq!(biweight_midvariance(&[5.0, 5.0, 5.0, 5.0]), 0.0);
    }
}
