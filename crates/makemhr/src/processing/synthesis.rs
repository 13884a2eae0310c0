//! Filling in the elevations below each field's first measurement.
//!
//! Neither model here is accurate.  Onsets mirror the top of the sphere onto the bottom, then blend toward the
//! first measured elevation.  Responses blend the lowest measured ring toward a synthesized pole and are low-passed
//! more the further down they sit, standing in for occlusion by the body.
use std::f64::consts::PI;

use makemhr_dsp::{FftPair, OnePoleCascade};

use crate::hrir_data::{az_indices, ChannelType, HrirData};

/// Scaled by the sample rate, the low-pass coefficient applied at the bottom pole.
const OCCLUSION_COEFFICIENT: f64 = 3.5e-6;

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

struct FieldView<'a> {
    data: &'a HrirData,
    fi: usize,
}

impl FieldView<'_> {
    fn position(&self, ei: usize, ai: usize) -> usize {
        self.data.azimuth_position(self.fi, ei, ai)
    }

    fn delays(&self, ei: usize, ai: usize) -> [f64; 2] {
        self.data.azimuths[self.position(ei, ai)].delays
    }

    fn azimuth(&self, ei: usize, ai: usize) -> f64 {
        self.data.azimuths[self.position(ei, ai)].azimuth
    }

    fn elevation(&self, ei: usize) -> f64 {
        self.data.elevations[self.data.elevation_position(self.fi, ei)].elevation
    }

    fn indices(&self, ei: usize, az: f64) -> (usize, usize, f64) {
        az_indices(self.data, self.fi, ei, az)
    }

    fn hrir(&self, ei: usize, ai: usize, ear: usize) -> &[f64] {
        self.data
            .hrir(self.data.azimuths[self.position(ei, ai)].index, ear)
    }
}

/// Synthesize the onsets of every elevation below each field's `ev_start`.
pub fn synthesize_onsets(data: &mut HrirData) {
    for fi in 0..data.fields.len() {
        let upper = data.fields[fi].ev_start;
        if upper == 0 {
            continue;
        }
        let ev_count = data.elevation_count(fi);
        let stereo = data.channel_type == ChannelType::Stereo;
        let mut updates: Vec<(usize, [f64; 2])> = vec![];

        // Mirror the top half of the missing elevations from the top of the sphere.  For stereo, the polar opposite
        // position is heard by the other ear.  For mono, the front and back are swapped instead.
        let view = FieldView { data: &*data, fi };
        let top = view.delays(ev_count - 1, 0);
        let bottom = if stereo { [top[1], top[0]] } else { [top[0], 0.0] };
        updates.push((view.position(0, 0), bottom));

        let mut ei = 1;
        while ei < (upper + 1) / 2 {
            let top_elev = ev_count - ei - 1;
            for ai in 0..data.azimuth_count(fi, ei) {
                let az = view.azimuth(ei, ai);
                let delays = if stereo {
                    let (a0, a1, af) = view.indices(top_elev, az + PI);
                    let (d0, d1) = (view.delays(top_elev, a0), view.delays(top_elev, a1));
                    [lerp(d0[1], d1[1], af), lerp(d0[0], d1[0], af)]
                } else {
                    let az = if az <= PI { PI - az } else { 3.0 * PI - az };
                    let (a0, a1, af) = view.indices(top_elev, az);
                    let (d0, d1) = (view.delays(top_elev, a0), view.delays(top_elev, a1));
                    [lerp(d0[0], d1[0], af), 0.0]
                };
                updates.push((view.position(ei, ai), delays));
            }
            ei += 1;
        }
        for (pos, delays) in updates.drain(..) {
            data.azimuths[pos].delays = delays;
        }

        // Blend between the last mirrored elevation and the first measured one.
        let lower = ei - 1;
        let view = FieldView { data: &*data, fi };
        for ei in ei..upper {
            let ef = (view.elevation(upper) - view.elevation(ei)) / (view.elevation(upper) - view.elevation(lower));
            for ai in 0..data.azimuth_count(fi, ei) {
                let az = view.azimuth(ei, ai);
                let (a0, a1, af0) = view.indices(upper, az);
                let (a2, a3, af1) = view.indices(lower, az);
                let blend = [
                    (1.0 - ef) * (1.0 - af0),
                    (1.0 - ef) * af0,
                    ef * (1.0 - af1),
                    ef * af1,
                ];
                let corners = [
                    view.delays(upper, a0),
                    view.delays(upper, a1),
                    view.delays(lower, a2),
                    view.delays(lower, a3),
                ];
                let mut delays = [0.0; 2];
                for (ear, d) in delays.iter_mut().enumerate().take(data.channels()) {
                    *d = corners.iter().zip(blend.iter()).map(|(c, b)| c[ear] * b).sum();
                }
                updates.push((view.position(ei, ai), delays));
            }
        }
        for (pos, delays) in updates {
            data.azimuths[pos].delays = delays;
        }
    }
}

/// Synthesize the magnitude responses of every elevation below each field's `ev_start`.
pub fn synthesize_hrirs(data: &mut HrirData) {
    let bins = data.bins();
    let beta = OCCLUSION_COEFFICIENT * data.ir_rate as f64;
    let mut fft = FftPair::new(data.fft_size);
    let mut filter = vec![0.0; bins];
    let mut row = vec![0.0; bins];

    for fi in 0..data.fields.len() {
        let oi = data.fields[fi].ev_start;
        if oi == 0 {
            continue;
        }
        let pole = data.azimuths[data.azimuth_position(fi, 0, 0)].index;

        // Under the head, each ear hears the lowest ring from its own side.
        for ear in 0..data.channels() {
            let view = FieldView { data: &*data, fi };
            let side = if ear == 0 { -PI / 2.0 } else { PI / 2.0 };
            let (a0, a1, af) = view.indices(oi, side);
            let (h0, h1) = (view.hrir(oi, a0, ear), view.hrir(oi, a1, ear));
            for (i, r) in row.iter_mut().enumerate() {
                *r = lerp(h0[i], h1[i], af);
            }
            data.hrir_mut(pole, ear)[..bins].copy_from_slice(&row);
        }

        for ei in 1..oi {
            let of = ei as f64 / oi as f64;
            OnePoleCascade::<4>::new((1.0 - of) * beta).magnitude_into(&mut fft, &mut filter);

            for ai in 0..data.azimuth_count(fi, ei) {
                for ear in 0..data.channels() {
                    let view = FieldView { data: &*data, fi };
                    let (a0, a1, af) = view.indices(oi, view.azimuth(ei, ai));
                    let (h0, h1) = (view.hrir(oi, a0, ear), view.hrir(oi, a1, ear));
                    let bottom = view.hrir(0, 0, ear);
                    for (i, r) in row.iter_mut().enumerate() {
                        let ring = lerp(h0[i], h1[i], af);
                        *r = lerp(bottom[i], ring, of) * filter[i];
                    }
                    let index = data.azimuths[view.position(ei, ai)].index;
                    data.hrir_mut(index, ear)[..bins].copy_from_slice(&row);
                }
            }
        }

        OnePoleCascade::<4>::new(beta).magnitude_into(&mut fft, &mut filter);
        for ear in 0..data.channels() {
            for (m, f) in data.hrir_mut(pole, ear)[..bins].iter_mut().zip(filter.iter()) {
                *m *= f;
            }
        }
    }
}
