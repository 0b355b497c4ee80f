//! The configuration record for one averaging run, and the errors produced
//! when a configuration cannot be interpreted.
use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

use crate::noise::DEFAULT_MAX_ITERATIONS;
use crate::rejection::RejectionPolicy;
use crate::wavelet::WaveletType;

/// A configuration that cannot be interpreted. Unlike the algorithmic
/// fallbacks elsewhere in the crate, these are surfaced as hard errors,
/// never silently treated as a no-op.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Unrecognized rejection policy {0:?}")]
    UnknownRejectionPolicy(String),
    #[error("Unrecognized weighting policy {0:?}")]
    UnknownWeightingPolicy(String),
    #[error("Unrecognized wavelet type {0:?}")]
    UnknownWaveletType(String),
    #[error("The bin size must be positive, received {0}")]
    InvalidBinSize(f64),
    #[error("The noise estimator epsilon must be positive, received {0}")]
    InvalidNoiseEpsilon(f64),
    #[error("The noise estimator iteration cap must be non-zero")]
    InvalidNoiseIterationCap,
}

/// How per-spectrum weights are assigned before the merge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WeightingPolicy {
    /// Every spectrum weighs 1.0; the merge reduces to the arithmetic mean.
    #[default]
    WeightEvenly,
    /// Each spectrum weighs its total ion current.
    TicValue,
    /// Inverse-variance weighting, `1 / (scale * noise)^2`, from the MRS
    /// noise estimate and the biweight-midvariance scale estimate.
    MrsNoiseEstimation,
}

impl Display for WeightingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightingPolicy::WeightEvenly => write!(f, "WeightEvenly"),
            WeightingPolicy::TicValue => write!(f, "TicValue"),
            WeightingPolicy::MrsNoiseEstimation => write!(f, "MrsNoiseEstimation"),
        }
    }
}

impl FromStr for WeightingPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WeightEvenly" | "NoWeight" => Ok(Self::WeightEvenly),
            "TicValue" => Ok(Self::TicValue),
            "MrsNoiseEstimation" => Ok(Self::MrsNoiseEstimation),
            _ => Err(ConfigurationError::UnknownWeightingPolicy(s.to_string())),
        }
    }
}

/// The configuration record for one averaging run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AveragingOptions {
    /// The outlier rejection policy applied to every bin.
    pub rejection: RejectionPolicy,
    /// How per-spectrum weights are assigned.
    pub weighting: WeightingPolicy,
    /// The width of each m/z bin.
    pub bin_size: f64,
    /// Whether to normalize each spectrum to its total ion current before
    /// estimating noise and merging.
    pub normalize: bool,
    /// The wavelet family used by the noise estimator.
    pub wavelet: WaveletType,
    /// The relative-change tolerance at which the noise estimator stops.
    pub noise_epsilon: f64,
    /// The iteration cap for the noise estimator.
    pub noise_max_iterations: usize,
}

impl Default for AveragingOptions {
    fn default() -> Self {
        Self {
            rejection: RejectionPolicy::NoRejection,
            weighting: WeightingPolicy::WeightEvenly,
            bin_size: 0.01,
            normalize: true,
            wavelet: WaveletType::Haar,
            noise_epsilon: 0.01,
            noise_max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl AveragingOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.bin_size > 0.0) {
            return Err(ConfigurationError::InvalidBinSize(self.bin_size));
        }
        if !(self.noise_epsilon > 0.0) {
            return Err(ConfigurationError::InvalidNoiseEpsilon(self.noise_epsilon));
        }
        if self.noise_max_iterations == 0 {
            return Err(ConfigurationError::InvalidNoiseIterationCap);
        }
        Ok(())
    }
}
