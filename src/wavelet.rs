//! Wavelet filter construction and the maximal overlap discrete wavelet
//! transform (MODWT), the shift-invariant multiresolution decomposition
//! underlying the noise estimator.
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::options::ConfigurationError;

/// The wavelet family used to build the filter pair.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WaveletType {
    /// The Haar wavelet, base taps `[1/√2, 1/√2]`
    #[default]
    Haar,
    /// The 8-tap Daubechies-4 wavelet
    Db4,
}

impl Display for WaveletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveletType::Haar => write!(f, "Haar"),
            WaveletType::Db4 => write!(f, "Db4"),
        }
    }
}

impl FromStr for WaveletType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Haar" | "haar" => Ok(WaveletType::Haar),
            "Db4" | "db4" => Ok(WaveletType::Db4),
            _ => Err(ConfigurationError::UnknownWaveletType(s.to_string())),
        }
    }
}

const HAAR_COEFFICIENTS: [f64; 2] = [std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2];

const DB4_COEFFICIENTS: [f64; 8] = [
    0.23037781330885523,
    0.7148465705525415,
    0.6308807679295904,
    -0.02798376941698385,
    -0.18703481171888114,
    0.030841381835986965,
    0.032883011666982945,
    -0.010597401784997278,
];

/// Compute the quadrature mirror filter of the low-pass scaling filter `x`:
/// the coefficients reversed, with the sign alternation counted from the
/// back, producing the paired high-pass analysis filter.
pub fn qmf(x: &[f64]) -> Vec<f64> {
    let mut y: Vec<f64> = x.iter().rev().copied().collect();
    for (k, value) in y.iter_mut().rev().enumerate() {
        *value *= (-1.0f64).powi(k as i32 + 1);
    }
    y
}

/// A scaling/wavelet analysis filter pair for one wavelet family, normalized
/// for the MODWT (base coefficients divided by √2).
#[derive(Debug, Clone)]
pub struct WaveletFilter {
    scaling: Vec<f64>,
    wavelet: Vec<f64>,
    kind: WaveletType,
}

impl WaveletFilter {
    pub fn new(kind: WaveletType) -> Self {
        let base: &[f64] = match kind {
            WaveletType::Haar => &HAAR_COEFFICIENTS,
            WaveletType::Db4 => &DB4_COEFFICIENTS,
        };
        let scaling: Vec<f64> = base.iter().map(|c| c / 2.0f64.sqrt()).collect();
        let wavelet = qmf(&scaling);
        Self {
            scaling,
            wavelet,
            kind,
        }
    }

    /// The low-pass scaling filter coefficients
    pub fn scaling_coefficients(&self) -> &[f64] {
        &self.scaling
    }

    /// The high-pass wavelet filter coefficients
    pub fn wavelet_coefficients(&self) -> &[f64] {
        &self.wavelet
    }

    pub fn kind(&self) -> WaveletType {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.scaling.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scaling.is_empty()
    }
}

impl From<WaveletType> for WaveletFilter {
    fn from(kind: WaveletType) -> Self {
        Self::new(kind)
    }
}

/// The wavelet and scaling coefficients for one scale of the decomposition.
#[derive(Debug, Clone)]
pub struct ModWtLevel {
    scale: usize,
    wavelet_coefficients: Vec<f64>,
    scaling_coefficients: Vec<f64>,
}

impl ModWtLevel {
    pub fn scale(&self) -> usize {
        self.scale
    }

    pub fn wavelet_coefficients(&self) -> &[f64] {
        &self.wavelet_coefficients
    }

    pub fn scaling_coefficients(&self) -> &[f64] {
        &self.scaling_coefficients
    }
}

/// The per-scale output of [`modwt`], trimmed back to the original signal's
/// support.
#[derive(Debug, Clone, Default)]
pub struct ModWtOutput {
    levels: Vec<ModWtLevel>,
}

impl ModWtOutput {
    pub fn levels(&self) -> &[ModWtLevel] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Sum the wavelet coefficients across all scales at each sample
    /// position. Subtracting this from the original signal leaves the
    /// coarsest smooth approximation.
    pub fn sum_wavelet_coefficients(&self) -> Vec<f64> {
        let n = self
            .levels
            .first()
            .map(|level| level.wavelet_coefficients.len())
            .unwrap_or_default();
        let mut summed = vec![0.0; n];
        for level in self.levels.iter() {
            for (acc, w) in summed.iter_mut().zip(level.wavelet_coefficients.iter()) {
                *acc += w;
            }
        }
        summed
    }
}

/// Extend `signal` by its own mirror image, doubling its length. The
/// circular convolution in [`modwt`] then sees a reflected boundary instead
/// of an artificial discontinuity.
pub(crate) fn reflect_signal(signal: &[f64]) -> Vec<f64> {
    let mut reflected = Vec::with_capacity(signal.len() * 2);
    reflected.extend_from_slice(signal);
    reflected.extend(signal.iter().rev());
    reflected
}

/// One scale of the MODWT: circular convolution of `signal` with the filter
/// pair, dilated by `2^(scale - 1)`.
fn modwt_forward(
    signal: &[f64],
    scale: usize,
    filter: &WaveletFilter,
    wavelet_out: &mut [f64],
    scaling_out: &mut [f64],
) {
    let n = signal.len() as isize;
    let dilation = 1isize << (scale - 1);
    let h = filter.wavelet_coefficients();
    let g = filter.scaling_coefficients();

    for t in 0..signal.len() {
        let mut k = t as isize;
        let mut w = h[0] * signal[t];
        let mut v = g[0] * signal[t];
        for tap in 1..filter.len() {
            k -= dilation;
            let idx = k.rem_euclid(n) as usize;
            w += h[tap] * signal[idx];
            v += g[tap] * signal[idx];
        }
        wavelet_out[t] = w;
        scaling_out[t] = v;
    }
}

/// Decompose `signal` into `floor(log2(n))` scales of shift-invariant
/// wavelet and scaling coefficients.
///
/// The transform runs over the reflection-extended signal and each scale is
/// trimmed back to the original support `[0, n)`: the backward-looking
/// circular filter wraps onto the mirrored copy, so the leading coefficients
/// are already boundary-corrected and carry no additional shift.
pub fn modwt(signal: &[f64], filter: &WaveletFilter) -> ModWtOutput {
    let n = signal.len();
    if n < 2 {
        return ModWtOutput::default();
    }
    let num_scales = (n as f64).log2().floor() as usize;
    let reflected = reflect_signal(signal);

    let mut levels = Vec::with_capacity(num_scales);
    let mut wavelet_coefficients = vec![0.0; reflected.len()];
    let mut scaling_coefficients = vec![0.0; reflected.len()];
    for scale in 1..=num_scales {
        modwt_forward(
            &reflected,
            scale,
            filter,
            &mut wavelet_coefficients,
            &mut scaling_coefficients,
        );
        levels.push(ModWtLevel {
            scale,
            wavelet_coefficients: wavelet_coefficients[..n].to_vec(),
            scaling_coefficients: scaling_coefficients[..n].to_vec(),
        });
    }
    log::trace!(
        "modwt produced {} scales over {} samples with the {} filter",
        num_scales,
        n,
        filter.kind()
    );
    ModWtOutput { levels }
}
