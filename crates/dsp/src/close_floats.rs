//! Simple threshold-based floating point asserts.
//!
//! We generally want thresholds bigger than epsilon, and this is both small and simple.

#[track_caller]
pub(crate) fn close_floats64(a: f64, b: f64, threshold: f64) {
    let diff = (a - b).abs();
    assert!(
        diff < threshold,
        "{} vs {}, difference {} is greater than threshold {}",
        a,
        b,
        diff,
        threshold
    );
}
