//! Magnitude responses and minimum-phase reconstruction.
use num::complex::Complex64;

use crate::fft::FftPair;

/// Floor applied to magnitudes so that logs stay finite.
pub const EPSILON: f64 = 1e-9;

/// Write the magnitude of each bin of `spectrum` into `out`, never going below [EPSILON].
///
/// Only `out.len()` bins are read.
pub fn magnitude_response(spectrum: &[Complex64], out: &mut [f64]) {
    assert!(spectrum.len() >= out.len());
    for (o, c) in out.iter_mut().zip(spectrum.iter()) {
        *o = c.norm().max(EPSILON);
    }
}

/// Reconstruct the minimum-phase spectrum for a magnitude response.
///
/// `mags` must be the size of the transform.  On entry only the first `size / 2 + 1` bins are read; the rest are
/// overwritten with the mirror of the lower half.  The DC bin is replaced with [EPSILON] to remove any DC offset.
/// `out` receives the complex spectrum, ready for an inverse transform.
pub fn minimum_phase(fft: &mut FftPair, mags: &mut [f64], out: &mut [Complex64]) {
    let n = fft.size();
    assert_eq!(mags.len(), n);
    assert_eq!(out.len(), n);
    let m = fft.bins();

    for i in 0..m {
        out[i] = Complex64::new(mags[i].ln(), 0.0);
    }
    for i in m..n {
        mags[i] = mags[n - i];
        out[i] = out[n - i];
    }

    fft.hilbert(out);

    mags[0] = EPSILON;
    for (o, mag) in out.iter_mut().zip(mags.iter()) {
        *o = Complex64::from_polar(*mag, o.im);
    }
}
