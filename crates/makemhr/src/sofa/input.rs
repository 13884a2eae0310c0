//! Building a whole dataset from one SOFA file, with no definition.
//!
//! The grid comes from [detect_layout].  Impulses are decoded serially (each is resampled if asked, its onset is
//! measured at the final rate, and it is parked in its slot) and the magnitude responses are taken on the worker pool
//! afterwards.
use std::path::Path;

use makemhr_dsp::{magnitude_response, resample_block, FftPair};
use num::complex::Complex64;
use num::Zero;

use crate::config::{ChannelMode, ProcessingOptions, DEFAULT_SOFA_RADIUS, MAX_RATE, MIN_RATE};
use crate::error::{ConsistencyError, Result, SofaError};
use crate::hrir_data::{ChannelType, HrirData};
use crate::processing::accumulate::resampled_points;
use crate::processing::onset::OnsetDetector;
use crate::sofa::{detect_layout, grid_slot, SofaMeasurements, SofaReader};
use crate::worker_pool::run_pool;

/// Fraction of the peak an impulse must cross for its onset.
const ONSET_THRESHOLD: f64 = 0.15;

fn check_dimensions(set: &SofaMeasurements, options: &ProcessingOptions) -> Result<(), SofaError> {
    if set.emitters != 1 {
        return Err(SofaError::Emitters(set.emitters));
    }
    if !(1..=2).contains(&set.receivers) {
        return Err(SofaError::Receivers(set.receivers));
    }
    if set.samples > options.fft_size {
        return Err(SofaError::TooManyPoints {
            points: set.samples,
            fft_size: options.fft_size,
        });
    }
    if set.samples < options.trunc_size {
        return Err(SofaError::TooFewPoints {
            points: set.samples,
            trunc_size: options.trunc_size,
        });
    }
    if set.sample_rate < MIN_RATE as f64 || set.sample_rate > MAX_RATE as f64 {
        return Err(SofaError::RateOutOfRange(set.sample_rate));
    }
    Ok(())
}

/// Every `(azimuth position, ear)` holding measured data, in the same order as [HrirData::slot_order].
fn measured_slots(data: &HrirData) -> Vec<(usize, usize)> {
    let mut out = vec![];
    for (fi, field) in data.fields.iter().enumerate() {
        for ei in field.ev_start..data.elevation_count(fi) {
            for ai in 0..data.azimuth_count(fi, ei) {
                for ear in 0..data.channels() {
                    out.push((data.azimuth_position(fi, ei, ai), ear));
                }
            }
        }
    }
    out
}

/// Per-worker scratch for turning parked impulses into magnitude responses.
struct MagnitudeWorker {
    fft: FftPair,
    spectrum: Vec<Complex64>,
    magnitudes: Vec<f64>,
}

impl MagnitudeWorker {
    fn new(fft: FftPair) -> Self {
        MagnitudeWorker {
            spectrum: vec![Complex64::zero(); fft.size()],
            magnitudes: vec![0.0; fft.bins()],
            fft,
        }
    }

    fn run(&mut self, slot: &mut [f64], ir_points: usize) {
        self.spectrum.fill(Complex64::zero());
        for (s, x) in self.spectrum.iter_mut().zip(slot[..ir_points].iter()) {
            *s = Complex64::new(*x, 0.0);
        }
        self.fft.forward(&mut self.spectrum);
        let bins = self.magnitudes.len();
        magnitude_response(&self.spectrum[..bins], &mut self.magnitudes);
        slot[..bins].copy_from_slice(&self.magnitudes);
    }
}

/// Load every usable measurement of the SOFA file at `path` into a new dataset.
pub fn load_sofa_input(reader: &dyn SofaReader, path: &Path, options: &ProcessingOptions) -> Result<HrirData> {
    log::info!("Reading SOFA file {}", path.display());
    let set = reader.read(path)?;
    set.validate()?;
    check_dimensions(&set, options)?;

    let channel_type = if set.receivers == 2 && options.channel_mode == ChannelMode::AllowStereo {
        ChannelType::Stereo
    } else {
        ChannelType::Mono
    };
    let rate = set.sample_rate.round() as u32;
    let points = set.samples;

    let detected = detect_layout(&set.positions)?;
    let layouts = detected.iter().map(|f| f.layout()).collect::<Vec<_>>();
    let mut data = HrirData::new(
        rate,
        channel_type,
        points,
        options.fft_size,
        DEFAULT_SOFA_RADIUS,
        &layouts,
    );
    for (field, found) in data.fields.iter_mut().zip(detected.iter()) {
        field.ev_start = found.ev_start;
    }

    let output_rate = options.output_rate.filter(|r| *r != rate);
    let ir_points = match output_rate {
        Some(out) => resampled_points(points, rate, out),
        None => points,
    };
    let mut onsets = OnsetDetector::new(output_rate.unwrap_or(rate), ir_points);
    let mut resampled = vec![0.0; points];

    let total = set.measurements();
    for (m, position) in set.positions.iter().enumerate() {
        log::debug!("Loading IRs... {} of {}", m + 1, total);
        let Some((fi, ei, ai)) = grid_slot(&data, *position) else {
            continue;
        };
        if ei < data.fields[fi].ev_start {
            continue;
        }
        let pos = data.azimuth_position(fi, ei, ai);
        if data.azimuths[pos].loaded[0] {
            return Err(ConsistencyError::Redefinition {
                field: fi,
                elevation: ei,
                azimuth: ai,
            }
            .into());
        }

        for ear in 0..data.channels() {
            let impulse = set.impulse(m, ear, 0);
            let source = match output_rate {
                Some(out) => {
                    resample_block(rate, out, impulse, &mut resampled)?;
                    &resampled[..ir_points]
                }
                None => impulse,
            };
            let onset = onsets.threshold_onset(source, ONSET_THRESHOLD)?;
            data.azimuths[pos].delays[ear] = onset + set.delay(m, ear) / rate as f64;

            let index = data.azimuths[pos].index;
            data.hrir_mut(index, ear)[..ir_points].copy_from_slice(source);
            data.azimuths[pos].loaded[ear] = true;
        }
    }

    data.ir_rate = output_rate.unwrap_or(rate);
    data.ir_points = ir_points;
    data.resolve_ev_starts()?;

    let fft = FftPair::new(options.fft_size);
    let order = measured_slots(&data);
    let slots = data.slots_mut(&order);
    run_pool(
        slots,
        options.threads,
        || MagnitudeWorker::new(fft.clone()),
        |w, slot| w.run(slot, ir_points),
        |done, total| log::debug!("Calculating magnitudes... {done} of {total}"),
    );
    Ok(data)
}
