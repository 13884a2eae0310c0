//! Folding decoded responses into grid slots.
//!
//! Each slot holds a running blend of the onsets and magnitude responses of every source assigned to it.  The
//! weight of the n-th source for an ear is `1/n`.
use makemhr_dsp::{magnitude_response, resample_block, FftPair};
use num::complex::Complex64;
use num::Zero;

use crate::error::Result;
use crate::hrir_data::HrirData;
use crate::processing::onset::OnsetDetector;

/// How an onset is located in a response.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum OnsetMode {
    /// The largest absolute sample.
    Peak,
    /// The first sample above this fraction of the peak.
    Threshold(f64),
}

/// Samples kept from a response of `points` samples at `rate` once it is resampled to `output_rate`.
pub fn resampled_points(points: usize, rate: u32, output_rate: u32) -> usize {
    ((points as f64 * output_rate as f64 / rate as f64).ceil() as usize).min(points)
}

pub struct SourceAccumulator {
    rate: u32,
    output_rate: Option<u32>,
    points: usize,
    /// Points kept for the magnitude response after resampling.
    ir_points: usize,
    onsets: OnsetDetector,
    fft: FftPair,
    resampled: Vec<f64>,
    spectrum: Vec<Complex64>,
    magnitudes: Vec<f64>,
}

impl SourceAccumulator {
    /// Responses of `points` samples at `rate`, optionally resampled to `output_rate` before their spectra are taken.
    pub fn new(rate: u32, output_rate: Option<u32>, points: usize, fft_size: usize) -> Self {
        let output_rate = output_rate.filter(|r| *r != rate);
        let ir_points = match output_rate {
            Some(out) => resampled_points(points, rate, out),
            None => points,
        };
        let fft = FftPair::new(fft_size);
        SourceAccumulator {
            rate,
            output_rate,
            points,
            ir_points,
            onsets: OnsetDetector::new(rate, points),
            resampled: vec![0.0; points],
            spectrum: vec![Complex64::zero(); fft_size],
            magnitudes: vec![0.0; fft.bins()],
            fft,
        }
    }

    /// Sample count of the stored responses once loading is finished.
    pub fn ir_points(&self) -> usize {
        self.ir_points
    }

    /// The dataset rate once loading is finished.
    pub fn final_rate(&self) -> u32 {
        self.output_rate.unwrap_or(self.rate)
    }

    /// Blend `hrir` into the slot at azimuth position `pos`, ear `ear`, with weight `weight`.
    pub fn accumulate(
        &mut self,
        data: &mut HrirData,
        pos: usize,
        ear: usize,
        hrir: &[f64],
        weight: f64,
        onset_mode: OnsetMode,
    ) -> Result<()> {
        let hrir = &hrir[..self.points];
        let onset = match onset_mode {
            OnsetMode::Peak => self.onsets.peak_onset(hrir)?,
            OnsetMode::Threshold(fraction) => self.onsets.threshold_onset(hrir, fraction)?,
        };
        let delay = &mut data.azimuths[pos].delays[ear];
        *delay += (onset - *delay) * weight;

        let source = match self.output_rate {
            Some(out) => {
                resample_block(self.rate, out, hrir, &mut self.resampled)?;
                &self.resampled[..self.ir_points]
            }
            None => hrir,
        };
        self.spectrum.fill(Complex64::zero());
        for (s, x) in self.spectrum.iter_mut().zip(source.iter()) {
            *s = Complex64::new(*x, 0.0);
        }
        self.fft.forward(&mut self.spectrum);
        let bins = self.magnitudes.len();
        magnitude_response(&self.spectrum[..bins], &mut self.magnitudes);

        let index = data.azimuths[pos].index;
        let slot = data.hrir_mut(index, ear);
        for (m, r) in slot.iter_mut().zip(self.magnitudes.iter()) {
            *m += (r - *m) * weight;
        }
        data.azimuths[pos].loaded[ear] = true;
        Ok(())
    }
}
