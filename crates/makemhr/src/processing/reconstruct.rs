//! Minimum-phase reconstruction of every slot, from magnitude response to impulse response.
use makemhr_dsp::{minimum_phase, FftPair};
use num::complex::Complex64;
use num::Zero;

use crate::config::EPSILON;
use crate::hrir_data::HrirData;
use crate::worker_pool::run_pool;

/// Per-worker scratch space.
struct Reconstructor {
    fft: FftPair,
    mags: Vec<f64>,
    spectrum: Vec<Complex64>,
}

impl Reconstructor {
    fn new(fft: FftPair) -> Self {
        let n = fft.size();
        Reconstructor {
            fft,
            mags: vec![0.0; n],
            spectrum: vec![Complex64::zero(); n],
        }
    }

    /// Replace the magnitude response at the start of `slot` with the first `ir_points` samples of its minimum-phase
    /// impulse response.
    fn reconstruct(&mut self, slot: &mut [f64], ir_points: usize) {
        let bins = self.fft.bins();
        for (m, s) in self.mags[..bins].iter_mut().zip(slot.iter()) {
            *m = s.max(EPSILON);
        }
        minimum_phase(&mut self.fft, &mut self.mags, &mut self.spectrum);
        self.fft.inverse(&mut self.spectrum);
        for (s, c) in slot[..ir_points].iter_mut().zip(self.spectrum.iter()) {
            *s = c.re;
        }
    }
}

/// Reconstruct every slot of the current fields on `threads` workers.
pub fn reconstruct_hrirs(data: &mut HrirData, threads: usize) {
    let ir_points = data.ir_points;
    let fft = FftPair::new(data.fft_size);
    let order = data.slot_order();
    let slots = data.slots_mut(&order);

    let mut reported = None;
    run_pool(
        slots,
        threads,
        || Reconstructor::new(fft.clone()),
        |r, slot| r.reconstruct(slot, ir_points),
        |done, total| {
            let percent = done * 100 / total;
            if reported != Some(percent) {
                log::info!("{percent:3}% done ({done} of {total})");
                reported = Some(percent);
            }
        },
    );
}
