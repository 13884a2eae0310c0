//! Signal processing building blocks for HRTF dataset construction.
//!
//! Nothing in here knows about datasets, grids, or files.  Everything operates on plain slices of `f64` or
//! [Complex64](num::complex::Complex64).
#[cfg(test)]
mod close_floats;
pub mod db;
pub mod fft;
pub mod minimum_phase;
pub mod one_pole;
pub mod resampling;

pub use db::DbExt;
pub use fft::FftPair;
pub use minimum_phase::{magnitude_response, minimum_phase};
pub use one_pole::OnePoleCascade;
pub use resampling::{resample_block, ResamplingError};
