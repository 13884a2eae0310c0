//! Fixed-size complex FFTs.
//!
//! Rustfft's planner is expensive compared to running a single transform, so a [FftPair] plans both directions once
//! and is then cloned per thread.  Clones share the plans and get their own scratch space.
use std::sync::Arc;

use num::complex::Complex64;
use num::Zero;
use rustfft::{Fft, FftPlanner};

/// A forward and inverse transform of one fixed size.
#[derive(Clone)]
pub struct FftPair {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl std::fmt::Debug for FftPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftPair").field("size", &self.size).finish()
    }
}

impl FftPair {
    pub fn new(size: usize) -> FftPair {
        assert!(size > 0, "FFT size must be non-zero");

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        FftPair {
            size,
            forward,
            inverse,
            scratch: vec![Complex64::zero(); scratch_len],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of unique bins of a real signal's spectrum: `size / 2 + 1`.
    pub fn bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// In-place forward transform, unscaled.
    pub fn forward(&mut self, buffer: &mut [Complex64]) {
        assert_eq!(buffer.len(), self.size);
        self.forward.process_with_scratch(buffer, &mut self.scratch);
    }

    /// In-place inverse transform, scaled by `1/N` so that `inverse(forward(x)) == x`.
    pub fn inverse(&mut self, buffer: &mut [Complex64]) {
        self.inverse_unscaled(buffer);
        let scale = 1.0 / self.size as f64;
        for c in buffer.iter_mut() {
            *c *= scale;
        }
    }

    fn inverse_unscaled(&mut self, buffer: &mut [Complex64]) {
        assert_eq!(buffer.len(), self.size);
        self.inverse.process_with_scratch(buffer, &mut self.scratch);
    }

    /// Discrete Hilbert transform of the real part of `buffer`.
    ///
    /// On return the real part is the original signal and the imaginary part is its Hilbert transform (the analytic
    /// signal).  Treats the input as a spectrum: goes to the "time" domain, keeps the causal half with doubled
    /// weight, and comes back.
    pub fn hilbert(&mut self, buffer: &mut [Complex64]) {
        let n = self.size;
        self.inverse_unscaled(buffer);

        let inverse_size = 1.0 / n as f64;
        let half = n / 2;
        buffer[0] *= inverse_size;
        for c in buffer[1..half].iter_mut() {
            *c *= 2.0 * inverse_size;
        }
        if half > 0 {
            buffer[half] *= inverse_size;
        }
        for c in buffer[half + 1..].iter_mut() {
            *c = Complex64::zero();
        }

        self.forward(buffer);
    }
}
