//! `mzaverage` is a library for averaging multiple profile-mode mass spectra
//! into a single composite spectrum with a higher signal-to-noise ratio.
//!
//! Spectra are aligned onto a shared m/z bin axis, optionally normalized by
//! total ion current, weighted per spectrum by a noise model, filtered per
//! bin by an outlier rejection policy, and merged by weighted mean. The
//! one-call entry point is [`average_spectra`]; the phase-by-phase driver
//! is [`BinnedSpectra`] for callers that want the intermediate products,
//! like per-spectrum noise estimates.
//!
//! # Usage
//! ```
//! use mzaverage::{average_spectra, ArrayPair, AveragingOptions, RejectionPolicy};
//!
//! let scan1 = ArrayPair::from((vec![100.0, 101.0, 102.0], vec![10.0, 50.0, 10.0]));
//! let scan2 = ArrayPair::from((vec![100.0, 101.0, 102.0], vec![12.0, 48.0, 14.0]));
//! let scan3 = ArrayPair::from((vec![100.0, 101.0, 102.0], vec![11.0, 52.0, 9.0]));
//!
//! let options = AveragingOptions {
//!     rejection: RejectionPolicy::SigmaClipping { min_sigma: 1.5, max_sigma: 1.5 },
//!     normalize: false,
//!     ..Default::default()
//! };
//! let composite = average_spectra(&[scan1, scan2, scan3], &options).unwrap();
//! assert_eq!(composite.len(), 3);
//! assert!(composite.intensity_array.iter().all(|i| i.is_finite()));
//! ```
pub mod arrayops;
pub mod average;
pub mod noise;
pub mod options;
pub mod pixel;
pub mod rejection;
pub mod stats;
pub mod wavelet;

pub use crate::arrayops::ArrayPair;
pub use crate::average::{average_spectra, BinnedSpectra, SpectrumMap};
pub use crate::noise::{mrs_noise_estimate, NoiseEstimate};
pub use crate::options::{AveragingOptions, ConfigurationError, WeightingPolicy};
pub use crate::pixel::PixelStack;
pub use crate::rejection::RejectionPolicy;
pub use crate::wavelet::{modwt, WaveletFilter, WaveletType};
