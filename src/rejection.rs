//! Per-bin statistical outlier rejection.
//!
//! Each policy is a pure transform over one [`PixelStack`]'s intensity
//! slots: surviving samples stay, outliers become [`REJECTED`](crate::pixel::REJECTED).
//! Policies only ever shrink the surviving set, so every iterative policy
//! reaches a fixed point; a hard pass cap backs that up on adversarial
//! input such as a constant-valued bin.
use crate::options::ConfigurationError;
use crate::pixel::{is_present, PixelStack, REJECTED};
use crate::stats::{median, nonzero_median, nonzero_stdev, nonzero_stdev_about, stdev};

/// Empirical correction applied to the standard deviation of a winsorized
/// sample to undo the variance shrinkage caused by clamping.
pub const WINSORIZATION_CORRECTION: f64 = 1.134;

/// Relative-change tolerance at which the winsorizing (Huber) loop is
/// considered converged.
pub const HUBER_CONVERGENCE_LIMIT: f64 = 5e-5;

/// Hard cap on the winsorizing loop, independent of the tolerance.
const HUBER_MAX_ITERATIONS: usize = 50;

/// Default fraction of non-zero samples below which
/// [`RejectionPolicy::BelowThresholdRejection`] discards the whole bin.
pub const DEFAULT_BELOW_THRESHOLD_CUTOFF: f64 = 0.2;

/// An outlier rejection strategy applied independently to each bin.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RejectionPolicy {
    /// Leave every sample in place.
    #[default]
    NoRejection,
    /// Reject exactly one maximum and one minimum sample.
    MinMaxClipping,
    /// Reject samples outside a percentile-derived band around the median.
    PercentileClipping { percentile: f64 },
    /// Iteratively reject samples too many standard deviations from the
    /// median until a pass rejects nothing.
    SigmaClipping { min_sigma: f64, max_sigma: f64 },
    /// Sigma clipping against winsorized statistics: the inner Huber loop
    /// clamps samples to `median ± 1.5·stdev` and re-estimates the spread
    /// with the [`WINSORIZATION_CORRECTION`] until it stabilizes.
    WinsorizedSigmaClipping { min_sigma: f64, max_sigma: f64 },
    /// Sigma clipping against a spread derived once from the non-zero
    /// samples and rescaled by the square root of the surviving median.
    AveragedSigmaClipping { min_sigma: f64, max_sigma: f64 },
    /// Discard the entire bin when the fraction of non-zero samples is at
    /// or below `cutoff`.
    BelowThresholdRejection { cutoff: f64 },
}

impl RejectionPolicy {
    /// Resolve a policy by name, in the same spirit as parsing a
    /// configuration file. Unrecognized names are a
    /// [`ConfigurationError`], never a silent no-op.
    pub fn from_name(
        name: &str,
        percentile: f64,
        min_sigma: f64,
        max_sigma: f64,
    ) -> Result<Self, ConfigurationError> {
        match name {
            "NoRejection" => Ok(Self::NoRejection),
            "MinMaxClipping" => Ok(Self::MinMaxClipping),
            "PercentileClipping" => Ok(Self::PercentileClipping { percentile }),
            "SigmaClipping" => Ok(Self::SigmaClipping {
                min_sigma,
                max_sigma,
            }),
            "WinsorizedSigmaClipping" => Ok(Self::WinsorizedSigmaClipping {
                min_sigma,
                max_sigma,
            }),
            "AveragedSigmaClipping" => Ok(Self::AveragedSigmaClipping {
                min_sigma,
                max_sigma,
            }),
            "BelowThresholdRejection" => Ok(Self::BelowThresholdRejection {
                cutoff: DEFAULT_BELOW_THRESHOLD_CUTOFF,
            }),
            _ => Err(ConfigurationError::UnknownRejectionPolicy(
                name.to_string(),
            )),
        }
    }

    /// Apply this policy to one bin's intensity slots.
    pub fn apply(&self, stack: &mut PixelStack) {
        self.apply_to_slots(stack.intensities_mut())
    }

    /// Apply this policy to a raw sentinel-encoded slot vector.
    pub fn apply_to_slots(&self, values: &mut [f64]) {
        match *self {
            Self::NoRejection => {}
            Self::MinMaxClipping => min_max_clipping(values),
            Self::PercentileClipping { percentile } => percentile_clipping(values, percentile),
            Self::SigmaClipping {
                min_sigma,
                max_sigma,
            } => sigma_clipping(values, min_sigma, max_sigma),
            Self::WinsorizedSigmaClipping {
                min_sigma,
                max_sigma,
            } => winsorized_sigma_clipping(values, min_sigma, max_sigma),
            Self::AveragedSigmaClipping {
                min_sigma,
                max_sigma,
            } => averaged_sigma_clipping(values, min_sigma, max_sigma),
            Self::BelowThresholdRejection { cutoff } => below_threshold_rejection(values, cutoff),
        }
    }
}

fn surviving(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| is_present(*v)).collect()
}

/// The shared rejection test: a sample too far below or above the center,
/// in spread units, is discarded. With a zero spread the ratios are NaN and
/// nothing is rejected, which is what guarantees termination on a
/// constant-valued bin.
#[inline]
fn sigma_test(value: f64, center: f64, spread: f64, min_sigma: f64, max_sigma: f64) -> bool {
    (center - value) / spread > min_sigma || (value - center) / spread > max_sigma
}

fn min_max_clipping(values: &mut [f64]) {
    let mut max_index = None;
    for (i, v) in values.iter().enumerate() {
        if !is_present(*v) {
            continue;
        }
        match max_index {
            Some(j) => {
                if *v > values[j] {
                    max_index = Some(i)
                }
            }
            None => max_index = Some(i),
        }
    }
    let Some(max_index) = max_index else { return };

    let mut min_index = None;
    for (i, v) in values.iter().enumerate() {
        if i == max_index || !is_present(*v) {
            continue;
        }
        match min_index {
            Some(j) => {
                if *v < values[j] {
                    min_index = Some(i)
                }
            }
            None => min_index = Some(i),
        }
    }
    let Some(min_index) = min_index else { return };

    values[max_index] = REJECTED;
    values[min_index] = REJECTED;
}

fn percentile_clipping(values: &mut [f64], percentile: f64) {
    let survivors = surviving(values);
    if survivors.is_empty() {
        return;
    }
    let trim = (1.0 - percentile) / 2.0;
    let band = 1.0 - trim;
    let center = median(&survivors);
    let low_cutoff = center * (1.0 - band);
    let high_cutoff = center * (1.0 + band);
    for v in values.iter_mut() {
        if is_present(*v) && !(low_cutoff < *v && *v < high_cutoff) {
            *v = REJECTED;
        }
    }
}

fn sigma_clipping(values: &mut [f64], min_sigma: f64, max_sigma: f64) {
    let max_passes = values.len().max(1);
    for _ in 0..max_passes {
        let survivors = surviving(values);
        if survivors.len() <= 1 {
            break;
        }
        let center = median(&survivors);
        let spread = stdev(&survivors);
        if !reject_pass(values, center, spread, min_sigma, max_sigma) {
            break;
        }
    }
}

fn winsorized_sigma_clipping(values: &mut [f64], min_sigma: f64, max_sigma: f64) {
    let max_passes = values.len().max(1);
    for _ in 0..max_passes {
        let survivors = surviving(values);
        if survivors.len() <= 1 {
            break;
        }
        let mut center = nonzero_median(&survivors);
        let mut spread = nonzero_stdev(&survivors);

        // Huber loop: winsorize, re-estimate, repeat until the corrected
        // spread stops moving.
        let mut winsorized = survivors.clone();
        for _ in 0..HUBER_MAX_ITERATIONS {
            let low = center - 1.5 * spread;
            let high = center + 1.5 * spread;
            for w in winsorized.iter_mut() {
                *w = w.clamp(low, high);
            }
            center = median(&winsorized);
            let previous = spread;
            spread = stdev(&winsorized) * WINSORIZATION_CORRECTION;
            if previous <= 0.0 || (spread - previous).abs() / previous <= HUBER_CONVERGENCE_LIMIT {
                break;
            }
        }

        if !reject_pass(values, center, spread, min_sigma, max_sigma) {
            break;
        }
        if surviving(values).len() <= 1 {
            break;
        }
    }
}

fn averaged_sigma_clipping(values: &mut [f64], min_sigma: f64, max_sigma: f64) {
    let max_passes = values.len().max(1);
    for _ in 0..max_passes {
        let survivors = surviving(values);
        if survivors.len() <= 1 {
            break;
        }
        let center = nonzero_median(&survivors);
        // The deviation comes from the surviving non-zero samples about
        // their median; deriving it from the current survivors (rather than
        // the original input) is what keeps the fixed point stable under
        // re-application.
        let deviation = nonzero_stdev_about(&survivors, center);
        let spread = deviation * center.sqrt() / 10.0;
        if !reject_pass(values, center, spread, min_sigma, max_sigma) {
            break;
        }
    }
}

fn below_threshold_rejection(values: &mut [f64], cutoff: f64) {
    let num_slots = values.len();
    let nonzero = values
        .iter()
        .filter(|v| is_present(**v) && **v != 0.0)
        .count();
    if nonzero as f64 <= cutoff * num_slots as f64 {
        for v in values.iter_mut() {
            if is_present(*v) {
                *v = REJECTED;
            }
        }
    }
}

/// Run one rejection pass, returning whether anything was rejected.
fn reject_pass(
    values: &mut [f64],
    center: f64,
    spread: f64,
    min_sigma: f64,
    max_sigma: f64,
) -> bool {
    let mut rejected_any = false;
    for v in values.iter_mut() {
        if is_present(*v) && sigma_test(*v, center, spread, min_sigma, max_sigma) {
            *v = REJECTED;
            rejected_any = true;
        }
    }
    rejected_any
}
