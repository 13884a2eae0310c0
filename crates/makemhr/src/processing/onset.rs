//! Empirical onset detection on 10x upsampled responses.
use makemhr_dsp::{resample_block, ResamplingError};

use crate::config::ONSET_RATE_MULTIPLE;

pub struct OnsetDetector {
    rate: u32,
    upsampled: Vec<f64>,
}

impl OnsetDetector {
    /// A detector for responses of up to `points` samples at `rate`.
    pub fn new(rate: u32, points: usize) -> Self {
        OnsetDetector {
            rate,
            upsampled: vec![0.0; points * ONSET_RATE_MULTIPLE as usize],
        }
    }

    fn upsample(&mut self, hrir: &[f64]) -> Result<&[f64], ResamplingError> {
        let len = hrir.len() * ONSET_RATE_MULTIPLE as usize;
        if self.upsampled.len() < len {
            self.upsampled.resize(len, 0.0);
        }
        let out = &mut self.upsampled[..len];
        resample_block(self.rate, self.rate * ONSET_RATE_MULTIPLE, hrir, out)?;
        Ok(out)
    }

    fn to_seconds(&self, index: usize) -> f64 {
        index as f64 / (ONSET_RATE_MULTIPLE * self.rate) as f64
    }

    /// Seconds until the largest absolute value.
    pub fn peak_onset(&mut self, hrir: &[f64]) -> Result<f64, ResamplingError> {
        let up = self.upsample(hrir)?;
        let index = up
            .iter()
            .enumerate()
            .fold((0, 0.0f64), |best, (i, x)| {
                if x.abs() > best.1 {
                    (i, x.abs())
                } else {
                    best
                }
            })
            .0;
        Ok(self.to_seconds(index))
    }

    /// Seconds until the first absolute value above `fraction` of the peak.
    pub fn threshold_onset(&mut self, hrir: &[f64], fraction: f64) -> Result<f64, ResamplingError> {
        let up = self.upsample(hrir)?;
        let peak = up.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        let threshold = peak * fraction;
        let index = up.iter().position(|x| x.abs() > threshold).unwrap_or(0);
        Ok(self.to_seconds(index))
    }
}
