/// An extension trait for floating point types to convert to and from dB.
///
/// ```
/// use makemhr_dsp::DbExt;
/// assert!((0.5f64.gain_to_db() + 6.02).abs() < 0.01);
/// ```
pub trait DbExt {
    fn db_to_gain(self) -> Self;
    fn gain_to_db(self) -> Self;
}

impl DbExt for f64 {
    fn db_to_gain(self) -> Self {
        10.0f64.powf(self / 20.0)
    }

    fn gain_to_db(self) -> Self {
        20.0 * self.log10()
    }
}
