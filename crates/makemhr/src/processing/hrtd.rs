//! Head-related time delays.
//!
//! Delays are carried in seconds until this stage, which turns them into samples relative to the earliest arrival in
//! each field.  Distance delay is therefore dropped.
use std::f64::consts::PI;

use crate::config::{HeadModel, MAX_HRTD, SPEED_OF_SOUND};
use crate::hrir_data::HrirData;

/// Seconds for sound from a source at `distance` to reach the left ear of a spherical head of `radius`, for a source
/// at elevation `ev` and azimuth `az` (radians).
///
/// Past the tangent point the path wraps around the sphere.
pub fn spherical_head_delay(ev: f64, az: f64, radius: f64, distance: f64) -> f64 {
    let azp = (ev.cos() * az.sin()).asin();
    let direct = (distance * distance + radius * radius + 2.0 * distance * radius * azp.sin()).sqrt();
    let tangent = (distance * distance - radius * radius).sqrt();
    let path = if direct > tangent {
        let arc = PI / 2.0 + azp;
        tangent + radius * (arc - (radius / distance).acos())
    } else {
        direct
    };
    path / SPEED_OF_SOUND
}

/// Turn every slot's delays into samples, per field and ear relative to the smallest, no larger than [MAX_HRTD].
///
/// With [HeadModel::Sphere] the delays are replaced by [spherical_head_delay] for a head of `radius` first.  With
/// [HeadModel::Dataset] they are measured delays, scaled by `radius` over the dataset's radius.
pub fn calculate_hrtds(data: &mut HrirData, model: HeadModel, radius: f64) {
    let channels = data.channels();
    let ratio = radius / data.radius;

    match model {
        HeadModel::Sphere => {
            for fi in 0..data.fields.len() {
                let distance = data.fields[fi].distance;
                for e in data.fields[fi].elevations.clone() {
                    let ev = data.elevations[e].elevation;
                    for pos in data.elevations[e].azimuths.clone() {
                        let az = &mut data.azimuths[pos];
                        let delay = spherical_head_delay(ev, az.azimuth, radius, distance);
                        az.delays[..channels].fill(delay);
                    }
                }
            }
        }
        HeadModel::Dataset if ratio != 1.0 => {
            for az in data.azimuths.iter_mut() {
                for d in az.delays[..channels].iter_mut() {
                    *d *= ratio;
                }
            }
        }
        HeadModel::Dataset => {}
    }

    let rate = data.ir_rate as f64;
    let mut max_hrtd = 0.0f64;
    for fi in 0..data.fields.len() {
        let positions = data.fields[fi]
            .elevations
            .clone()
            .flat_map(|e| data.elevations[e].azimuths.clone())
            .collect::<Vec<_>>();
        for ear in 0..channels {
            let min = positions
                .iter()
                .map(|&p| data.azimuths[p].delays[ear])
                .fold(f64::INFINITY, f64::min);
            for &p in positions.iter() {
                let d = &mut data.azimuths[p].delays[ear];
                *d = (*d - min) * rate;
                max_hrtd = max_hrtd.max(*d);
            }
        }
    }

    if max_hrtd > MAX_HRTD {
        log::warn!("Scaling for max delay of {max_hrtd} samples to {MAX_HRTD}");
        let scale = MAX_HRTD / max_hrtd;
        for az in data.azimuths.iter_mut() {
            for d in az.delays[..channels].iter_mut() {
                *d *= scale;
            }
        }
    }
}
