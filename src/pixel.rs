//! The per-bin aggregate of aligned samples across spectra.
//!
//! A [`PixelStack`] stores one intensity slot and one m/z slot per input
//! spectrum in flat vectors indexed by spectrum id. State is encoded in the
//! intensity slot itself using two distinguished NaN payloads:
//!
//! - [`MISSING`] marks a spectrum that contributed no sample to this bin;
//! - [`REJECTED`] marks a sample discarded by an outlier-rejection policy;
//! - any other value, including `0.0` and the default quiet NaN that
//!   degenerate arithmetic produces, is a real reading.
//!
//! Both sentinels are excluded from every per-bin statistic and from the
//! weighted merge. A true zero-intensity reading is a real value and stays
//! in.

/// Sentinel for "this spectrum has no sample in this bin".
pub const MISSING: f64 = f64::from_bits(0x7ff8_0000_0000_0001);

/// Sentinel for "this sample was discarded by outlier rejection".
pub const REJECTED: f64 = f64::from_bits(0x7ff8_0000_0000_0002);

#[inline]
pub fn is_missing(value: f64) -> bool {
    value.to_bits() == MISSING.to_bits()
}

#[inline]
pub fn is_rejected(value: f64) -> bool {
    value.to_bits() == REJECTED.to_bits()
}

/// Whether `value` is a real reading rather than a sentinel.
#[inline]
pub fn is_present(value: f64) -> bool {
    !is_missing(value) && !is_rejected(value)
}

/// One m/z bin's aligned samples across all input spectra, its rejection
/// state, and its merged result.
#[derive(Debug, Clone)]
pub struct PixelStack {
    mz_slots: Vec<f64>,
    intensity_slots: Vec<f64>,
    merged: f64,
}

impl PixelStack {
    /// Create an empty stack with one slot per input spectrum.
    pub fn new(num_spectra: usize) -> Self {
        Self {
            mz_slots: vec![MISSING; num_spectra],
            intensity_slots: vec![MISSING; num_spectra],
            merged: f64::NAN,
        }
    }

    /// The number of slots, equal to the number of input spectra.
    pub fn len(&self) -> usize {
        self.intensity_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity_slots.is_empty()
    }

    /// Store the sample from spectrum `spectrum_id`, replacing whatever was
    /// there before.
    pub fn set(&mut self, spectrum_id: usize, mz: f64, intensity: f64) {
        self.mz_slots[spectrum_id] = mz;
        self.intensity_slots[spectrum_id] = intensity;
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensity_slots
    }

    pub fn intensities_mut(&mut self) -> &mut [f64] {
        &mut self.intensity_slots
    }

    pub fn intensity_at(&self, spectrum_id: usize) -> f64 {
        self.intensity_slots[spectrum_id]
    }

    /// Mark the sample from `spectrum_id` as rejected. Missing slots stay
    /// missing.
    pub fn reject(&mut self, spectrum_id: usize) {
        if !is_missing(self.intensity_slots[spectrum_id]) {
            self.intensity_slots[spectrum_id] = REJECTED;
        }
    }

    /// Iterate over the surviving (present) samples as `(spectrum_id,
    /// intensity)` pairs.
    pub fn survivors(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.intensity_slots
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| is_present(*v))
    }

    /// The number of surviving samples.
    pub fn num_survivors(&self) -> usize {
        self.survivors().count()
    }

    /// The representative m/z: the mean over the m/z slots whose intensity
    /// slot is still present. A stack whose every sample was rejected falls
    /// back to the mean over all contributing samples so the bin keeps a
    /// coordinate on the output axis.
    pub fn mz(&self) -> f64 {
        let mut total = 0.0;
        let mut count = 0usize;
        for (i, v) in self.intensity_slots.iter().enumerate() {
            if is_present(*v) {
                total += self.mz_slots[i];
                count += 1;
            }
        }
        if count == 0 {
            for (i, v) in self.intensity_slots.iter().enumerate() {
                if !is_missing(*v) {
                    total += self.mz_slots[i];
                    count += 1;
                }
            }
        }
        if count == 0 {
            f64::NAN
        } else {
            total / count as f64
        }
    }

    /// The merged intensity computed by the last call to [`PixelStack::merge`],
    /// NaN before any merge.
    pub fn merged(&self) -> f64 {
        self.merged
    }

    /// Combine the surviving samples into one value by weighted mean, where
    /// `weights` is indexed by spectrum id.
    ///
    /// A stack with no survivors merges to 0.0 and a single survivor merges
    /// to its own value. Survivors whose weights sum to zero (or carry NaN
    /// weights) produce a non-finite merged value, which is propagated to
    /// the output rather than treated as an error.
    pub fn merge(&mut self, weights: &[f64]) -> f64 {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut survivors = 0usize;
        for (i, v) in self.survivors() {
            numerator += weights[i] * v;
            denominator += weights[i];
            survivors += 1;
        }
        self.merged = if survivors == 0 {
            0.0
        } else {
            numerator / denominator
        };
        self.merged
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sentinels_are_distinct() {
        assert!(MISSING.is_nan());
        assert!(REJECTED.is_nan());
        assert_ne!(MISSING.to_bits(), REJECTED.to_bits());
        assert!(is_missing(MISSING));
        assert!(!is_missing(REJECTED));
        assert!(is_rejected(REJECTED));
        // a plain arithmetic NaN is a (degenerate) value, not a sentinel
        assert!(is_present(f64::NAN));
        assert!(is_present(0.0));
    }

    #[test]
    fn test_set_and_reject() {
        let mut stack = PixelStack::new(3);
        assert_eq!(stack.num_survivors(), 0);
        stack.set(0, 100.0, 50.0);
        stack.set(2, 100.1, 0.0);
        assert_eq!(stack.num_survivors(), 2);

        stack.reject(0);
        assert!(is_rejected(stack.intensity_at(0)));
        assert_eq!(stack.num_survivors(), 1);

        // rejecting a missing slot leaves it missing
        stack.reject(1);
        assert!(is_missing(stack.intensity_at(1)));
    }

    #[test]
    fn test_representative_mz_tracks_rejection() {
        let mut stack = PixelStack::new(3);
        stack.set(0, 100.0, 10.0);
        stack.set(1, 100.2, 20.0);
        stack.set(2, 100.4, 30.0);
        assert!((stack.mz() - 100.2).abs() < 1e-9);
        stack.reject(2);
        assert!((stack.mz() - 100.1).abs() < 1e-9);
    }

    #[test]
    fn test_merge_weighted() {
        let mut stack = PixelStack::new(2);
        stack.set(0, 1.0, 10.0);
        stack.set(1, 1.0, 0.0);
        assert_eq!(stack.merge(&[8.0, 2.0]), 8.0);

        let mut stack = PixelStack::new(3);
        stack.set(0, 1.0, 10.0);
        stack.set(1, 1.0, 2.0);
        stack.set(2, 1.0, 0.0);
        let merged = stack.merge(&[9.0, 1.0, 0.0]);
        assert!((merged - 9.2).abs() < 1e-4);
    }

    #[test]
    fn test_merge_degenerate_bins() {
        // no survivors merges to zero
        let mut stack = PixelStack::new(2);
        stack.set(0, 1.0, 5.0);
        stack.set(1, 1.0, 7.0);
        stack.reject(0);
        stack.reject(1);
        assert_eq!(stack.merge(&[1.0, 1.0]), 0.0);

        // survivors with all-zero weights merge to a non-finite value
        let mut stack = PixelStack::new(2);
        stack.set(0, 1.0, 5.0);
        stack.set(1, 1.0, 7.0);
        assert!(!stack.merge(&[0.0, 0.0]).is_finite());
    }

    #[test]
    fn test_merge_skips_missing() {
        let mut stack = PixelStack::new(3);
        stack.set(0, 1.0, 6.0);
        stack.set(2, 1.0, 12.0);
        assert_eq!(stack.merge(&[1.0, 1.0, 1.0]), 9.0);
    }
}
