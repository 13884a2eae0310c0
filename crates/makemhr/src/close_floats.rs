//! Threshold float asserts for tests.
//!
//! Pipeline stages round-trip through FFTs and resamplers, so exact comparisons are rarely meaningful.

#[track_caller]
pub(crate) fn close_floats64(a: f64, b: f64, threshold: f64) {
    let diff = (a - b).abs();
    assert!(
        diff < threshold,
        "{a} vs {b}: difference {diff} exceeds {threshold}"
    );
}
