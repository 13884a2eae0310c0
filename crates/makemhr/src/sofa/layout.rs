//! Finding a grid that fits a SOFA file's measurement positions.
//!
//! Most measurement sets are uniform and share the major axis of the output format.  Detection drops outlying
//! elevations and builds the densest grid the remaining positions support.  Sets of scattered positions, or sets
//! measured around another axis, are rejected.
use crate::config::{MAX_FD_COUNT, MIN_EV_COUNT};
use crate::error::SofaError;
use crate::hrir_data::FieldLayout;
use crate::sofa::cartesian_to_spherical;

/// Degrees within which two angles are the same.
const ANGLE_TOLERANCE: f64 = 0.1;
/// Meters within which two radii are the same.
const RADIUS_TOLERANCE: f64 = 0.001;

/// A detected field: the grid plus the lowest elevation that has measurements.
#[derive(Clone, Debug, PartialEq)]
pub struct SofaField {
    pub distance: f64,
    pub ev_start: usize,
    /// Azimuth counts from the bottom pole up.  Counts below `ev_start` mirror their opposite elevation.
    pub az_counts: Vec<usize>,
}

impl SofaField {
    pub fn layout(&self) -> FieldLayout {
        FieldLayout {
            distance: self.distance,
            az_counts: self.az_counts.clone(),
        }
    }

    pub fn measured(&self) -> usize {
        self.az_counts[self.ev_start..].iter().sum()
    }
}

/// Values of `axis` (0 azimuth, 1 elevation, 2 radius) over the positions matching `filter`, deduplicated within
/// tolerance and sorted ascending.
fn unique_sorted(aers: &[[f64; 3]], axis: usize, filter: [Option<f64>; 3]) -> Vec<f64> {
    const TOLERANCES: [f64; 3] = [ANGLE_TOLERANCE, ANGLE_TOLERANCE, RADIUS_TOLERANCE];

    let mut out: Vec<f64> = vec![];
    for aer in aers {
        let matches = filter
            .iter()
            .zip(aer.iter())
            .zip(TOLERANCES.iter())
            .all(|((f, v), tol)| f.map_or(true, |f| (v - f).abs() < *tol));
        if !matches {
            continue;
        }
        let value = aer[axis];
        if !out.iter().any(|o| (o - value).abs() < TOLERANCES[axis]) {
            out.push(value);
        }
    }
    out.sort_by(f64::total_cmp);
    out
}

/// The step between consecutive `values`, if they are all the same within tolerance.
fn uniform_step(values: &[f64]) -> Option<f64> {
    let mut diffs = values.windows(2).map(|w| w[1] - w[0]);
    let first = diffs.next()?;
    if first < ANGLE_TOLERANCE {
        return None;
    }
    let mut sum = first;
    let mut count = 1;
    for d in diffs {
        if (d - first).abs() >= ANGLE_TOLERANCE {
            return None;
        }
        sum += d;
        count += 1;
    }
    Some(sum / count as f64)
}

/// Spherical `[azimuth°, elevation°, radius]` with azimuth in `[0, 360)`, snapping values just short of a full turn
/// to 0.
fn to_aer(xyz: [f64; 3]) -> [f64; 3] {
    let [az, el, r] = cartesian_to_spherical(xyz);
    let mut az = az.rem_euclid(360.0);
    if 360.0 - az < ANGLE_TOLERANCE {
        az = 0.0;
    }
    [az, el, r]
}

/// Whether the azimuths at an elevation form a usable ring: a lone pole measurement, or a uniform ring from 0°.
fn usable_elevation(aers: &[[f64; 3]], distance: f64, elevation: f64) -> bool {
    let azimuths = unique_sorted(aers, 0, [None, Some(elevation), Some(distance)]);
    if (90.0 - elevation.abs()).abs() < ANGLE_TOLERANCE {
        return azimuths.len() == 1;
    }
    match azimuths.first() {
        Some(first) if first.abs() < ANGLE_TOLERANCE => uniform_step(&azimuths).is_some(),
        _ => false,
    }
}

fn detect_field(aers: &[[f64; 3]], distance: f64) -> Result<Option<SofaField>, SofaError> {
    let mut elevations = unique_sorted(aers, 1, [None, None, Some(distance)]);
    elevations.retain(|ev| usable_elevation(aers, distance, *ev));

    let Some(step) = uniform_step(&elevations) else {
        log::warn!(
            "Skipping field at {distance:.3} m: no uniform elevations among {:?}",
            elevations
        );
        return Ok(None);
    };
    let ev_count = (180.0 / step).round() as usize + 1;
    if ev_count < MIN_EV_COUNT {
        log::warn!("Skipping field at {distance:.3} m: too few uniform elevations");
        return Ok(None);
    }

    let lowest = elevations[0];
    if lowest >= 0.0 {
        return Err(SofaError::IncompatibleLayout("too many missing elevations"));
    }
    let position = (90.0 + lowest) / step;
    let ev_start = position.round();
    if (position - ev_start).abs() >= ANGLE_TOLERANCE / step {
        return Err(SofaError::IncompatibleLayout("elevations are off the grid"));
    }
    let ev_start = ev_start as usize;

    let mut az_counts = vec![0; ev_count];
    for ei in ev_start..ev_count {
        let ev = -90.0 + ei as f64 * 180.0 / (ev_count - 1) as f64;
        let azimuths = unique_sorted(aers, 0, [None, Some(ev), Some(distance)]);
        az_counts[ei] = if ei == 0 || ei == ev_count - 1 {
            if azimuths.len() != 1 {
                return Err(SofaError::IncompatibleLayout("non-singular poles"));
            }
            1
        } else {
            let step = uniform_step(&azimuths)
                .ok_or(SofaError::IncompatibleLayout("non-uniform azimuths"))?;
            (360.0 / step).round() as usize
        };
    }
    for ei in 0..ev_start {
        az_counts[ei] = az_counts[ev_count - ei - 1];
    }

    Ok(Some(SofaField {
        distance,
        ev_start,
        az_counts,
    }))
}

/// Detect the fields, nearest first, that the Cartesian `positions` fit on.
pub fn detect_layout(positions: &[[f64; 3]]) -> Result<Vec<SofaField>, SofaError> {
    let aers = positions.iter().map(|p| to_aer(*p)).collect::<Vec<_>>();
    let radii = unique_sorted(&aers, 2, [None; 3]);

    let mut fields = vec![];
    for distance in radii {
        if let Some(field) = detect_field(&aers, distance)? {
            fields.push(field);
        }
    }

    if fields.is_empty() {
        return Err(SofaError::IncompatibleLayout("no usable fields"));
    }
    if fields.len() > MAX_FD_COUNT {
        return Err(SofaError::IncompatibleLayout("too many radii"));
    }
    let used = fields.iter().map(SofaField::measured).sum::<usize>();
    log::info!("Using {} of {} IRs", used, positions.len());
    Ok(fields)
}
