//! Align multiple spectra onto a shared m/z bin axis and combine them into
//! one composite spectrum with per-bin outlier rejection and per-spectrum
//! inverse-variance weighting.
#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::arrayops::ArrayPair;
use crate::noise::mrs_noise_estimate;
use crate::options::{AveragingOptions, ConfigurationError, WeightingPolicy};
use crate::pixel::{is_present, PixelStack};
use crate::rejection::RejectionPolicy;
use crate::stats::biweight_midvariance;
use crate::wavelet::{WaveletFilter, WaveletType};

/// A per-spectrum result map: a pre-sized value array indexed by spectrum
/// id plus an explicit populated mask. Reading an unpopulated slot yields
/// NaN, so a phase run out of order degrades to NaN results downstream
/// instead of panicking.
#[derive(Debug, Clone, Default)]
pub struct SpectrumMap {
    values: Vec<f64>,
    populated: Vec<bool>,
}

impl SpectrumMap {
    fn new(num_spectra: usize) -> Self {
        Self {
            values: vec![f64::NAN; num_spectra],
            populated: vec![false; num_spectra],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn set(&mut self, spectrum_id: usize, value: f64) {
        self.values[spectrum_id] = value;
        self.populated[spectrum_id] = true;
    }

    pub fn is_populated(&self, spectrum_id: usize) -> bool {
        self.populated.get(spectrum_id).copied().unwrap_or(false)
    }

    pub fn get(&self, spectrum_id: usize) -> Option<f64> {
        if self.is_populated(spectrum_id) {
            Some(self.values[spectrum_id])
        } else {
            None
        }
    }

    /// The stored value, or NaN when the slot has not been populated.
    pub fn value_or_nan(&self, spectrum_id: usize) -> f64 {
        self.get(spectrum_id).unwrap_or(f64::NAN)
    }

    /// Iterate over the populated `(spectrum_id, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| self.populated[*i])
    }
}

// The rejection/merge phases own each stack exclusively for their duration
// and the per-spectrum phases write disjoint index-addressed slots, so both
// parallelize without locks.
cfg_if::cfg_if! {
    if #[cfg(feature = "parallelism")] {
        fn each_stack_mut<F: Fn(&mut PixelStack) + Sync + Send>(stacks: &mut [PixelStack], f: F) {
            stacks.par_iter_mut().for_each(|stack| f(stack));
        }

        fn map_spectra<T: Send, F: Fn(usize) -> T + Sync + Send>(num_spectra: usize, f: F) -> Vec<T> {
            (0..num_spectra).into_par_iter().map(f).collect()
        }
    } else {
        fn each_stack_mut<F: Fn(&mut PixelStack)>(stacks: &mut [PixelStack], f: F) {
            stacks.iter_mut().for_each(|stack| f(stack));
        }

        fn map_spectra<T, F: Fn(usize) -> T>(num_spectra: usize, f: F) -> Vec<T> {
            (0..num_spectra).map(f).collect()
        }
    }
}

/// The aligned bin representation of one averaging run, and the driver for
/// its phases.
///
/// Phases depend on each other in this order:
///
/// ```text
/// consume_spectra -> [normalize] -> estimate_noise -> estimate_scales
///     -> calculate_weights -> [reject_outliers] -> merge
/// ```
///
/// Every phase is safe to re-invoke. Running `merge` without
/// `calculate_weights` is not a fatal error: the unpopulated weight slots
/// read as NaN and the merged values come out NaN.
#[derive(Debug, Clone, Default)]
pub struct BinnedSpectra {
    pixel_stacks: Vec<PixelStack>,
    num_spectra: usize,
    tics: Vec<f64>,
    noise_estimates: SpectrumMap,
    noise_converged: Vec<bool>,
    scale_estimates: SpectrumMap,
    weights: SpectrumMap,
    normalized: bool,
}

impl BinnedSpectra {
    /// Align `spectra` onto a shared axis of `bin_size`-wide half-open m/z
    /// bins.
    ///
    /// When two samples from the same spectrum land in the same bin the
    /// later one overwrites the earlier; no interpolation is performed.
    /// Bins no spectrum contributed to are dropped, and the surviving
    /// stacks are sorted by their representative m/z.
    pub fn consume_spectra(spectra: &[ArrayPair<'_>], bin_size: f64) -> Self {
        let num_spectra = spectra.len();
        let tics: Vec<f64> = spectra.iter().map(|pair| pair.tic).collect();

        let (mut global_min, mut global_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for pair in spectra.iter().filter(|p| !p.is_empty()) {
            global_min = global_min.min(pair.min_mz);
            global_max = global_max.max(pair.max_mz);
        }
        if !global_min.is_finite() {
            return Self {
                num_spectra,
                tics,
                noise_estimates: SpectrumMap::new(num_spectra),
                noise_converged: vec![false; num_spectra],
                scale_estimates: SpectrumMap::new(num_spectra),
                weights: SpectrumMap::new(num_spectra),
                ..Default::default()
            };
        }

        // the extra bin owns the globalMax boundary, so a sample exactly at
        // the maximum never collides with the previous bin's sample
        let num_bins = ((global_max - global_min) / bin_size).floor() as usize + 1;
        let mut stacks: Vec<PixelStack> =
            (0..num_bins).map(|_| PixelStack::new(num_spectra)).collect();
        for (spectrum_id, pair) in spectra.iter().enumerate() {
            for (mz, intensity) in pair.iter() {
                // min() guards against float rounding at the upper edge
                let index = (((mz - global_min) / bin_size).floor() as usize).min(num_bins - 1);
                stacks[index].set(spectrum_id, mz, intensity);
            }
        }

        let mut keyed: Vec<(f64, PixelStack)> = stacks
            .into_iter()
            .filter(|stack| stack.num_survivors() > 0)
            .map(|stack| (stack.mz(), stack))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        let pixel_stacks: Vec<PixelStack> = keyed.into_iter().map(|(_, stack)| stack).collect();

        log::debug!(
            "Binned {} spectra into {} non-empty bins over [{global_min}, {global_max}]",
            num_spectra,
            pixel_stacks.len()
        );

        Self {
            pixel_stacks,
            num_spectra,
            tics,
            noise_estimates: SpectrumMap::new(num_spectra),
            noise_converged: vec![false; num_spectra],
            scale_estimates: SpectrumMap::new(num_spectra),
            weights: SpectrumMap::new(num_spectra),
            normalized: false,
        }
    }

    pub fn num_spectra(&self) -> usize {
        self.num_spectra
    }

    pub fn pixel_stacks(&self) -> &[PixelStack] {
        &self.pixel_stacks
    }

    pub fn tics(&self) -> &[f64] {
        &self.tics
    }

    /// Per-spectrum noise sigma from the MRS estimator.
    pub fn noise_estimates(&self) -> &SpectrumMap {
        &self.noise_estimates
    }

    /// Whether the MRS estimator converged for each spectrum. A `false`
    /// entry means the plain sample standard deviation was used instead.
    pub fn noise_converged(&self) -> &[bool] {
        &self.noise_converged
    }

    /// Per-spectrum relative scale from the biweight midvariance.
    pub fn scale_estimates(&self) -> &SpectrumMap {
        &self.scale_estimates
    }

    /// Per-spectrum merge weights.
    pub fn weights(&self) -> &SpectrumMap {
        &self.weights
    }

    /// The spectrum's surviving binned samples, in bin order.
    fn intensity_column(&self, spectrum_id: usize) -> Vec<f64> {
        self.pixel_stacks
            .iter()
            .map(|stack| stack.intensity_at(spectrum_id))
            .filter(|v| is_present(*v))
            .collect()
    }

    /// Divide every present sample by its source spectrum's total ion
    /// current, so each spectrum's surviving intensities sum to 1. Guarded
    /// so that re-invocation does not divide twice.
    pub fn normalize(&mut self) {
        if self.normalized {
            return;
        }
        let tics = self.tics.clone();
        each_stack_mut(&mut self.pixel_stacks, move |stack| {
            for (spectrum_id, value) in stack.intensities_mut().iter_mut().enumerate() {
                if is_present(*value) {
                    *value /= tics[spectrum_id];
                }
            }
        });
        self.normalized = true;
    }

    /// Estimate each spectrum's noise floor with the MRS procedure, in
    /// parallel across spectrum ids. Non-convergent estimates fall back to
    /// the sample standard deviation (see [`mrs_noise_estimate`]).
    pub fn estimate_noise(&mut self, wavelet: WaveletType, epsilon: f64, max_iterations: usize) {
        let filter = WaveletFilter::new(wavelet);
        let columns: Vec<Vec<f64>> = (0..self.num_spectra)
            .map(|i| self.intensity_column(i))
            .collect();
        let estimates = map_spectra(self.num_spectra, |i| {
            mrs_noise_estimate(&columns[i], epsilon, max_iterations, &filter)
        });
        for (i, estimate) in estimates.into_iter().enumerate() {
            self.noise_estimates.set(i, estimate.sigma);
            self.noise_converged[i] = estimate.converged;
            log::debug!(
                "Spectrum {i}: noise sigma {:.6e} (converged: {})",
                estimate.sigma,
                estimate.converged
            );
        }
    }

    /// Estimate each spectrum's relative scale as the ratio of the
    /// reference biweight midvariance (spectrum 0) to its own.
    pub fn estimate_scales(&mut self) {
        if self.num_spectra == 0 {
            return;
        }
        let columns: Vec<Vec<f64>> = (0..self.num_spectra)
            .map(|i| self.intensity_column(i))
            .collect();
        let midvariances = map_spectra(self.num_spectra, |i| biweight_midvariance(&columns[i]));
        let reference = midvariances[0];
        for (i, midvariance) in midvariances.into_iter().enumerate() {
            let scale = if i == 0 { 1.0 } else { reference / midvariance };
            self.scale_estimates.set(i, scale);
            log::debug!("Spectrum {i}: scale estimate {scale:.6e}");
        }
    }

    /// Assign each spectrum's merge weight according to `policy`.
    pub fn calculate_weights(&mut self, policy: WeightingPolicy) {
        for i in 0..self.num_spectra {
            let weight = match policy {
                WeightingPolicy::WeightEvenly => 1.0,
                WeightingPolicy::TicValue => self.tics[i],
                WeightingPolicy::MrsNoiseEstimation => {
                    let noise = self.noise_estimates.value_or_nan(i);
                    let scale = self.scale_estimates.value_or_nan(i);
                    (scale * noise).powi(-2)
                }
            };
            self.weights.set(i, weight);
        }
    }

    /// Apply `policy` to every bin independently, in parallel across
    /// disjoint stacks.
    pub fn reject_outliers(&mut self, policy: &RejectionPolicy) {
        let policy = *policy;
        each_stack_mut(&mut self.pixel_stacks, move |stack| policy.apply(stack));
    }

    /// Merge every bin's surviving samples into one weighted value.
    pub fn merge(&mut self) {
        let weights: Vec<f64> = (0..self.num_spectra)
            .map(|i| self.weights.value_or_nan(i))
            .collect();
        each_stack_mut(&mut self.pixel_stacks, move |stack| {
            stack.merge(&weights);
        });
    }

    /// Read out the composite spectrum, ascending by bin m/z.
    pub fn merged_spectrum(&self) -> ArrayPair<'static> {
        let mut mz_array = Vec::with_capacity(self.pixel_stacks.len());
        let mut intensity_array = Vec::with_capacity(self.pixel_stacks.len());
        for stack in self.pixel_stacks.iter() {
            mz_array.push(stack.mz());
            intensity_array.push(stack.merged());
        }
        ArrayPair::from((mz_array, intensity_array))
    }
}

/// Average `spectra` into one composite spectrum according to `options`,
/// driving every phase of [`BinnedSpectra`] in dependency order.
pub fn average_spectra(
    spectra: &[ArrayPair<'_>],
    options: &AveragingOptions,
) -> Result<ArrayPair<'static>, ConfigurationError> {
    options.validate()?;
    let mut binned = BinnedSpectra::consume_spectra(spectra, options.bin_size);
    if options.normalize {
        binned.normalize();
    }
    binned.estimate_noise(
        options.wavelet,
        options.noise_epsilon,
        options.noise_max_iterations,
    );
    binned.estimate_scales();
    binned.calculate_weights(options.weighting);
    binned.reject_outliers(&options.rejection);
    binned.merge();
    Ok(binned.merged_spectrum())
}

#[cfg(test)]
mod test {
    use super::*;

    fn pseudo_noise(n: usize, amplitude: f64, seed: u64) -> Vec<f64> {
        let mut state: u64 = seed;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
                (unit * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    fn noisy_peak_spectrum(n: usize, seed: u64) -> ArrayPair<'static> {
        let mz: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let intensity: Vec<f64> = pseudo_noise(n, 2.0, seed)
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                let x = i as f64;
                let center = n as f64 / 2.0;
                1000.0 * (-(x - center).powi(2) / 50.0).exp() + 50.0 + e
            })
            .collect();
        ArrayPair::from((mz, intensity))
    }

    #[test]
    fn test_binning_example() {
        let a = ArrayPair::from((vec![0.0, 1.0, 2.0, 3.0, 4.0], vec![1.0; 5]));
        let b = ArrayPair::from((vec![0.0, 1.0, 2.0, 3.0, 4.0], vec![2.0; 5]));
        let c = ArrayPair::from((vec![0.1, 1.1, 2.1, 3.1, 4.1], vec![3.0; 5]));
        let binned = BinnedSpectra::consume_spectra(&[a, b, c], 1.0);
        assert_eq!(binned.pixel_stacks().len(), 5);
        let first = &binned.pixel_stacks()[0];
        assert!((first.mz() - (0.0 + 0.0 + 0.1) / 3.0).abs() < 1e-9);
        assert_eq!(first.num_survivors(), 3);
    }

    #[test]
    fn test_binning_same_spectrum_overwrites() {
        // 0.5 and 1.2 land in the same bin; the later sample wins
        let a = ArrayPair::from((vec![0.5, 1.2, 1.8], vec![10.0, 20.0, 30.0]));
        let binned = BinnedSpectra::consume_spectra(&[a], 1.0);
        assert_eq!(binned.pixel_stacks().len(), 2);
        let second = &binned.pixel_stacks()[1];
        assert_eq!(second.intensity_at(0), 30.0);
        assert!((second.mz() - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_binning_boundary_sample_keeps_own_bin() {
        // the span is an exact multiple of the bin width; the samples at
        // the global maximum must not fold into the previous bin
        let a = ArrayPair::from((vec![0.0, 1.0], vec![3.0, 1.0]));
        let b = ArrayPair::from((vec![0.0, 1.0], vec![1.0, 1.0]));
        let binned = BinnedSpectra::consume_spectra(&[a, b], 1.0);
        assert_eq!(binned.pixel_stacks().len(), 2);
        assert_eq!(binned.pixel_stacks()[0].intensity_at(0), 3.0);
        assert_eq!(binned.pixel_stacks()[0].intensity_at(1), 1.0);
        assert_eq!(binned.pixel_stacks()[1].intensity_at(0), 1.0);
    }

    #[test]
    fn test_empty_input() {
        let binned = BinnedSpectra::consume_spectra(&[], 1.0);
        assert_eq!(binned.pixel_stacks().len(), 0);
        assert!(binned.merged_spectrum().is_empty());
    }

    #[test]
    fn test_tic_normalization() {
        let mz = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.2];
        let intensity = vec![100.0, 80.0, 70.0, 60.0, 50.0, 40.0];
        let pair = ArrayPair::from((mz, intensity));
        assert_eq!(pair.tic, 400.0);

        let mut binned = BinnedSpectra::consume_spectra(&[pair], 1.0);
        binned.normalize();
        let column = binned.intensity_column(0);
        let expected = [0.25, 0.2, 0.175, 0.15, 0.125, 0.1];
        assert_eq!(column.len(), expected.len());
        for (got, want) in column.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-12);
        }
        assert!((column.iter().sum::<f64>() - 1.0).abs() < 1e-12);

        // re-invocation must not divide twice
        binned.normalize();
        assert!((binned.intensity_column(0).iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_even_weights_reduce_to_arithmetic_mean() {
        let a = ArrayPair::from((vec![0.0, 1.0, 2.0], vec![10.0, 20.0, 30.0]));
        let b = ArrayPair::from((vec![0.0, 1.0, 2.0], vec![30.0, 40.0, 50.0]));
        let options = AveragingOptions {
            normalize: false,
            ..Default::default()
        };
        let composite = average_spectra(&[a, b], &options).unwrap();
        let expected = [20.0, 30.0, 40.0];
        assert_eq!(composite.len(), 3);
        for (got, want) in composite.intensity_array.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_merge_before_weights_degrades_to_nan() {
        let a = ArrayPair::from((vec![0.0, 1.0], vec![5.0, 6.0]));
        let b = ArrayPair::from((vec![0.0, 1.0], vec![7.0, 8.0]));
        let mut binned = BinnedSpectra::consume_spectra(&[a, b], 1.0);
        binned.merge();
        for stack in binned.pixel_stacks() {
            assert!(stack.merged().is_nan());
        }
    }

    #[test]
    fn test_diagnostic_maps_populated() {
        let spectra = [
            noisy_peak_spectrum(256, 1),
            noisy_peak_spectrum(256, 2),
            noisy_peak_spectrum(256, 3),
        ];
        let mut binned = BinnedSpectra::consume_spectra(&spectra, 1.0);
        binned.estimate_noise(WaveletType::Haar, 0.01, 25);
        binned.estimate_scales();
        binned.calculate_weights(WeightingPolicy::MrsNoiseEstimation);

        assert_eq!(binned.noise_estimates().len(), 3);
        for i in 0..3 {
            assert!(binned.noise_estimates().is_populated(i));
            assert!(binned.noise_estimates().value_or_nan(i).is_finite());
            assert!(binned.scale_estimates().is_populated(i));
            assert!(binned.weights().is_populated(i));
        }
        assert_eq!(binned.scale_estimates().value_or_nan(0), 1.0);
        // weight = 1 / (scale * noise)^2
        let noise = binned.noise_estimates().value_or_nan(1);
        let scale = binned.scale_estimates().value_or_nan(1);
        let weight = binned.weights().value_or_nan(1);
        assert!((weight - 1.0 / (scale * noise).powi(2)).abs() < weight.abs() * 1e-9);
    }

    #[test]
    fn test_full_pipeline_smoke() {
        let spectra = [
            noisy_peak_spectrum(256, 11),
            noisy_peak_spectrum(256, 12),
            noisy_peak_spectrum(256, 13),
            noisy_peak_spectrum(256, 14),
        ];
        let options = AveragingOptions {
            rejection: RejectionPolicy::WinsorizedSigmaClipping {
                min_sigma: 1.5,
                max_sigma: 1.5,
            },
            weighting: WeightingPolicy::MrsNoiseEstimation,
            bin_size: 1.0,
            normalize: true,
            ..Default::default()
        };
        let composite = average_spectra(&spectra, &options).unwrap();
        assert!(!composite.is_empty());
        let mut previous = f64::NEG_INFINITY;
        for (mz, intensity) in composite.iter() {
            assert!(mz > previous, "m/z axis must ascend");
            previous = mz;
            assert!(intensity.is_finite());
        }
    }

    #[test]
    fn test_invalid_options_surface() {
        let a = ArrayPair::from((vec![0.0, 1.0], vec![1.0, 1.0]));
        let options = AveragingOptions {
            bin_size: -0.5,
            ..Default::default()
        };
        assert!(average_spectra(&[a], &options).is_err());
    }

    #[test]
    fn test_tic_value_weighting() {
        let a = ArrayPair::from((vec![0.0, 1.0], vec![3.0, 1.0]));
        let b = ArrayPair::from((vec![0.0, 1.0], vec![1.0, 1.0]));
        let mut binned = BinnedSpectra::consume_spectra(&[a, b], 1.0);
        binned.calculate_weights(WeightingPolicy::TicValue);
        assert_eq!(binned.weights().value_or_nan(0), 4.0);
        assert_eq!(binned.weights().value_or_nan(1), 2.0);
        binned.merge();
        // (4 * 3 + 2 * 1) / 6
        assert!((binned.pixel_stacks()[0].merged() - 14.0 / 6.0).abs() < 1e-12);
    }
}
