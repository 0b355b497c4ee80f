//! Borrowed-or-owned (m/z, intensity) array pairs, the input and output
//! representation for spectrum averaging.
use std::borrow::Cow;

/// A pair of m/z and intensity arrays of equal length, with the m/z array
/// sorted in ascending order, plus the summary values derived from them.
#[derive(Debug, Default, Clone)]
pub struct ArrayPair<'lifespan> {
    pub mz_array: Cow<'lifespan, [f64]>,
    pub intensity_array: Cow<'lifespan, [f64]>,
    /// The smallest m/z in `mz_array`
    pub min_mz: f64,
    /// The largest m/z in `mz_array`
    pub max_mz: f64,
    /// The total ion current, the sum over `intensity_array`
    pub tic: f64,
}

impl<'lifespan> ArrayPair<'lifespan> {
    pub fn new(
        mz_array: Cow<'lifespan, [f64]>,
        intensity_array: Cow<'lifespan, [f64]>,
    ) -> ArrayPair<'lifespan> {
        assert_eq!(
            mz_array.len(),
            intensity_array.len(),
            "m/z and intensity arrays must be the same length"
        );
        let min_mz = mz_array.first().copied().unwrap_or_default();
        let max_mz = mz_array.last().copied().unwrap_or_default();
        let tic = intensity_array.iter().sum();
        ArrayPair {
            mz_array,
            intensity_array,
            min_mz,
            max_mz,
            tic,
        }
    }

    /// Wrap borrowed slices without copying them.
    pub fn wrap(
        mz_array: &'lifespan [f64],
        intensity_array: &'lifespan [f64],
    ) -> ArrayPair<'lifespan> {
        Self::new(Cow::Borrowed(mz_array), Cow::Borrowed(intensity_array))
    }

    pub fn len(&self) -> usize {
        self.mz_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz_array.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<(f64, f64)> {
        if i < self.len() {
            Some((self.mz_array[i], self.intensity_array[i]))
        } else {
            None
        }
    }

    /// Create a new [`ArrayPair`] borrowing from this one.
    pub fn borrow(&'lifespan self) -> ArrayPair<'lifespan> {
        ArrayPair {
            mz_array: Cow::Borrowed(&self.mz_array),
            intensity_array: Cow::Borrowed(&self.intensity_array),
            min_mz: self.min_mz,
            max_mz: self.max_mz,
            tic: self.tic,
        }
    }

    /// Copy both arrays, producing a version of this [`ArrayPair`] which owns
    /// its storage.
    pub fn to_owned(&self) -> ArrayPair<'static> {
        ArrayPair {
            mz_array: Cow::Owned(self.mz_array.to_vec()),
            intensity_array: Cow::Owned(self.intensity_array.to_vec()),
            min_mz: self.min_mz,
            max_mz: self.max_mz,
            tic: self.tic,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.mz_array
            .iter()
            .copied()
            .zip(self.intensity_array.iter().copied())
    }
}

impl<'lifespan> From<(&'lifespan [f64], &'lifespan [f64])> for ArrayPair<'lifespan> {
    fn from(pair: (&'lifespan [f64], &'lifespan [f64])) -> Self {
        Self::wrap(pair.0, pair.1)
    }
}

impl From<(Vec<f64>, Vec<f64>)> for ArrayPair<'static> {
    fn from(pair: (Vec<f64>, Vec<f64>)) -> Self {
        Self::new(Cow::Owned(pair.0), Cow::Owned(pair.1))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_construction() {
        let mz = [1.0, 2.0, 3.0, 4.0];
        let inten = [10.0, 20.0, 30.0, 40.0];
        let pair = ArrayPair::wrap(&mz, &inten);
        assert_eq!(pair.len(), 4);
        assert_eq!(pair.min_mz, 1.0);
        assert_eq!(pair.max_mz, 4.0);
        assert_eq!(pair.tic, 100.0);
        assert_eq!(pair.get(1), Some((2.0, 20.0)));
        assert_eq!(pair.get(4), None);
    }

    #[test]
    fn test_empty() {
        let pair = ArrayPair::default();
        assert!(pair.is_empty());
        assert_eq!(pair.tic, 0.0);
    }

    #[test]
    fn test_owned() {
        let pair = ArrayPair::from((vec![1.0, 2.0], vec![5.0, 5.0]));
        let copied = pair.to_owned();
        assert_eq!(copied.tic, 10.0);
        assert_eq!(copied.iter().count(), 2);
    }
}
