//! Diffuse-field equalization.
//!
//! The diffuse-field average is the (optionally coverage-weighted) RMS of every measured magnitude response, per
//! ear.  Dividing each response by it removes whatever the measurement setup contributed equally to all directions.
use std::f64::consts::PI;

use makemhr_dsp::DbExt;

use crate::config::EPSILON;
use crate::hrir_data::HrirData;
use crate::processing::measured_indices;

/// Outer radius of the last field's coverage shell, in meters.
const FAR_SHELL_RADIUS: f64 = 10.0;

/// Per field, per elevation: the share of the diffuse field held by each measured response at that elevation.
///
/// Each response covers an extruded patch of the sphere between the previous field's shell and the midpoint to the
/// next field.  The innermost shell starts at the head radius.  Unmeasured elevations get a weight of 0.
pub fn diffuse_field_weights(data: &HrirData, weighted: bool) -> Vec<Vec<f64>> {
    let mut weights = data
        .fields
        .iter()
        .map(|f| vec![0.0; f.elevations.len()])
        .collect::<Vec<_>>();

    if !weighted {
        let unmeasured = (0..data.fields.len())
            .map(|fi| {
                data.field_elevations(fi)[..data.fields[fi].ev_start]
                    .iter()
                    .map(|e| e.azimuths.len())
                    .sum::<usize>()
            })
            .sum::<usize>();
        let weight = 1.0 / (data.ir_count() - unmeasured) as f64;
        for (fi, w) in weights.iter_mut().enumerate() {
            w[data.fields[fi].ev_start..].fill(weight);
        }
        return weights;
    }

    let mut sum = 0.0;
    let mut inner = data.radius;
    for (fi, field) in data.fields.iter().enumerate() {
        let outer = match data.fields.get(fi + 1) {
            Some(next) => 0.5 * (field.distance + next.distance),
            None => FAR_SHELL_RADIUS,
        };
        let shell = outer.powi(3) - inner.powi(3);
        let half_step = PI / 2.0 / (field.elevations.len() - 1) as f64;

        for (ei, elevation) in data.field_elevations(fi).iter().enumerate().skip(field.ev_start) {
            let lower = (elevation.elevation - half_step).max(-PI / 2.0);
            let upper = (elevation.elevation + half_step).min(PI / 2.0);
            let solid_angle = 2.0 * PI * (upper.sin() - lower.sin());
            let volume = solid_angle * shell / 3.0;
            weights[fi][ei] = volume / elevation.azimuths.len() as f64;
            sum += solid_angle;
        }
        inner = outer;
    }

    for w in weights.iter_mut().flatten() {
        *w /= sum;
    }
    weights
}

/// Clamp a magnitude response to within `limit / 2` dB of its average over the six octaves below a quarter of the
/// sample rate.
fn limit_magnitude_response(fft_size: usize, limit: f64, response: &mut [f64]) {
    let half = limit / 2.0;
    for m in response.iter_mut() {
        *m = m.gain_to_db();
    }
    let lower = (fft_size as f64 / 256.0).ceil() as usize - 1;
    let upper = fft_size / 4 - 1;
    let average = response[lower..=upper].iter().sum::<f64>() / (upper - lower + 1) as f64;
    for m in response.iter_mut() {
        *m = m.clamp(average - half, average + half).db_to_gain();
    }
}

/// Per ear, `bins` values: the diffuse-field average, limited to `limit` dB of range when `limit > 0`.
pub fn diffuse_field_average(data: &HrirData, weighted: bool, limit: f64) -> Vec<f64> {
    let bins = data.bins();
    let weights = diffuse_field_weights(data, weighted);
    let mut dfa = vec![0.0; data.channels() * bins];

    for (ear, average) in dfa.chunks_mut(bins).enumerate() {
        for (fi, field) in data.fields.iter().enumerate() {
            for (ei, elevation) in data.field_elevations(fi).iter().enumerate().skip(field.ev_start) {
                let weight = weights[fi][ei];
                for azimuth in data.elevation_azimuths(elevation) {
                    let hrir = data.hrir(azimuth.index, ear);
                    for (a, m) in average.iter_mut().zip(hrir.iter()) {
                        *a += weight * m * m;
                    }
                }
            }
        }
        for a in average.iter_mut() {
            *a = a.sqrt().max(EPSILON);
        }
        if limit > 0.0 {
            limit_magnitude_response(data.fft_size, limit, average);
        }
    }
    dfa
}

/// Divide every measured response by the average for its ear.
pub fn diffuse_field_equalize(data: &mut HrirData, dfa: &[f64]) {
    let bins = data.bins();
    for fi in 0..data.fields.len() {
        for index in measured_indices(data, fi) {
            for ear in 0..data.channels() {
                let average = &dfa[ear * bins..(ear + 1) * bins];
                for (m, a) in data.hrir_mut(index, ear).iter_mut().zip(average.iter()) {
                    *m /= a;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::close_floats::close_floats64;
    use crate::hrir_data::ChannelType;
    use crate::processing::test_util::*;

    #[test]
    fn test_weights_sum_to_one() {
        let data = filled(
            ChannelType::Mono,
            64,
            &[layout(0.5, &[1, 4, 8, 4, 1]), layout(1.0, &[1, 6, 12, 12, 6, 1])],
            |_, _, _, _| 1.0,
        );
        for weighted in [false, true] {
            let weights = diffuse_field_weights(&data, weighted);
            let total = (0..data.fields.len())
                .flat_map(|fi| {
                    let w = &weights[fi];
                    data.field_elevations(fi)
                        .iter()
                        .enumerate()
                        .map(move |(ei, e)| w[ei] * e.azimuths.len() as f64)
                })
                .sum::<f64>();
            if weighted {
                // Solid angles normalize to 1 per field, so the total is the sum of shell volumes.
                let shells = (0.75f64.powi(3) - 0.09f64.powi(3)) / 3.0 + (1000.0 - 0.75f64.powi(3)) / 3.0;
                close_floats64(total, shells / 2.0, 1e-9);
            } else {
                close_floats64(total, 1.0, 1e-12);
            }
        }
    }

    #[test]
    fn test_unweighted_skips_unmeasured() {
        let mut data = filled(ChannelType::Mono, 64, &[layout(1.0, &[1, 4, 4, 4, 1])], |_, _, _, _| 1.0);
        data.fields[0].ev_start = 2;
        let weights = diffuse_field_weights(&data, false);
        assert_eq!(weights[0], vec![0.0, 0.0, 1.0 / 9.0, 1.0 / 9.0, 1.0 / 9.0]);
    }

    #[test]
    fn test_equalized_set_has_flat_average() {
        let mut data = filled(
            ChannelType::Stereo,
            256,
            &[layout(0.5, &[1, 3, 5, 3, 1]), layout(1.0, &[1, 4, 4, 4, 1])],
            |fi, index, ear, bin| 0.2 + ((fi + index * 7 + ear * 3 + bin) % 11) as f64 * 0.1,
        );
        for weighted in [false, true] {
            let dfa = diffuse_field_average(&data, weighted, 0.0);
            diffuse_field_equalize(&mut data, &dfa);
            // Each bin's weighted power is now the power of the average divided by itself.
            for a in diffuse_field_average(&data, weighted, 0.0) {
                close_floats64(a, 1.0, 1e-9);
            }
        }
    }

    #[test]
    fn test_limit_clamps_range() {
        let data = filled(ChannelType::Mono, 1024, &[layout(1.0, &[1, 2, 2, 2, 1])], |_, _, _, bin| {
            if bin == 300 {
                1000.0
            } else {
                1.0
            }
        });
        let dfa = diffuse_field_average(&data, false, 24.0);
        // Bin 300 is above the averaged octaves, which sit at 0 dB, so it is held to +12 dB.
        close_floats64(dfa[300], 12.0f64.db_to_gain(), 1e-9);
        close_floats64(dfa[0], 1.0, 1e-9);
        close_floats64(dfa[512], 1.0, 1e-9);
    }
}
