//! Cascaded first-order low-pass sections.
//!
//! Each section computes `y[n] = x[n] + b * (y[n - 1] - x[n])`, so `b = 0` passes everything through and `b` near 1
//! cuts nearly everything.
use num::complex::Complex64;
use num::Zero;

use crate::fft::FftPair;
use crate::minimum_phase::magnitude_response;

#[derive(Debug, Clone)]
pub struct OnePoleCascade<const N: usize> {
    b: f64,
    history: [f64; N],
}

impl<const N: usize> OnePoleCascade<N> {
    pub fn new(b: f64) -> Self {
        OnePoleCascade {
            b,
            history: [0.0; N],
        }
    }

    /// Tick this filter by 1 sample.
    pub fn tick(&mut self, input_sample: f64) -> f64 {
        let mut x = input_sample;
        for h in self.history.iter_mut() {
            *h = x + self.b * (*h - x);
            x = *h;
        }
        x
    }

    /// Magnitude response of this filter over the first `out.len()` bins of `fft`'s size.
    ///
    /// The filter's history is consumed by running an impulse through it.
    pub fn magnitude_into(&mut self, fft: &mut FftPair, out: &mut [f64]) {
        let mut response = vec![Complex64::zero(); fft.size()];
        let mut input = 1.0;
        for r in response.iter_mut() {
            *r = Complex64::new(self.tick(input), 0.0);
            input = 0.0;
        }
        fft.forward(&mut response);
        magnitude_response(&response, out);
    }
}
