//! SOFA measurement sets.
//!
//! Decoding the HDF5 container itself is behind [SofaReader]; everything here works on the already-decoded
//! [SofaMeasurements].  Loaded sets are kept in a [SofaCache] owned by one pipeline run.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::SofaError;
use crate::hrir_data::HrirData;

mod input;
mod layout;
#[cfg(feature = "libmysofa")]
mod libmysofa;

pub use input::*;
pub use layout::*;
#[cfg(feature = "libmysofa")]
pub use libmysofa::*;

/// Per-measurement delays stored alongside the impulses, in samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SofaDelays {
    #[default]
    None,
    /// One delay per receiver, shared by every measurement (`I,R`).
    PerReceiver(Vec<f64>),
    /// One delay per receiver per measurement (`M,R`), measurement-major.
    PerMeasurement(Vec<f64>),
}

#[derive(Clone, Debug)]
pub struct SofaMeasurements {
    pub sample_rate: f64,
    pub emitters: usize,
    pub receivers: usize,
    /// Samples per impulse response (`N`).
    pub samples: usize,
    /// Source positions, Cartesian meters.
    pub positions: Vec<[f64; 3]>,
    /// `M * R * N` samples, measurement-major then receiver.
    pub impulses: Vec<f64>,
    pub delays: SofaDelays,
}

impl SofaMeasurements {
    pub fn measurements(&self) -> usize {
        self.positions.len()
    }

    /// `samples` values of measurement `m`, receiver `r`, starting at `offset`.
    pub fn impulse(&self, m: usize, r: usize, offset: usize) -> &[f64] {
        let start = (m * self.receivers + r) * self.samples + offset;
        &self.impulses[start..(m * self.receivers + r + 1) * self.samples]
    }

    /// Delay for measurement `m`, receiver `r`, in samples.
    pub fn delay(&self, m: usize, r: usize) -> f64 {
        match &self.delays {
            SofaDelays::None => 0.0,
            SofaDelays::PerReceiver(d) => d[r],
            SofaDelays::PerMeasurement(d) => d[m * self.receivers + r],
        }
    }

    /// Check that the arrays agree with the declared dimensions.
    pub fn validate(&self) -> Result<(), SofaError> {
        if self.receivers == 0 || self.samples == 0 {
            return Err(SofaError::Malformed("empty dimensions"));
        }
        if self.impulses.len() != self.measurements() * self.receivers * self.samples {
            return Err(SofaError::Malformed("impulse data does not match M*R*N"));
        }
        match &self.delays {
            SofaDelays::None => {}
            SofaDelays::PerReceiver(d) if d.len() == self.receivers => {}
            SofaDelays::PerMeasurement(d) if d.len() == self.measurements() * self.receivers => {}
            _ => return Err(SofaError::Malformed("delay data does not match I,R or M,R")),
        }
        Ok(())
    }

    /// Index of the position closest to `target` (Cartesian), if there are any.
    pub fn nearest(&self, target: [f64; 3]) -> Option<usize> {
        self.positions
            .iter()
            .map(|p| {
                let d = [p[0] - target[0], p[1] - target[1], p[2] - target[2]];
                d[0] * d[0] + d[1] * d[1] + d[2] * d[2]
            })
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }
}

/// Decodes a SOFA container.
pub trait SofaReader {
    fn read(&self, path: &Path) -> Result<SofaMeasurements, SofaError>;
}

/// The reader used when no SOFA backend is available: every read fails.
#[derive(Copy, Clone, Debug, Default)]
pub struct UnsupportedSofaReader;

impl SofaReader for UnsupportedSofaReader {
    fn read(&self, path: &Path) -> Result<SofaMeasurements, SofaError> {
        Err(SofaError::Unsupported(path.to_path_buf()))
    }
}

/// Measurement sets already loaded during this run, keyed by path and target rate.
pub struct SofaCache<'a> {
    reader: &'a dyn SofaReader,
    entries: Vec<(PathBuf, u32, Arc<SofaMeasurements>)>,
}

impl<'a> SofaCache<'a> {
    pub fn new(reader: &'a dyn SofaReader) -> Self {
        SofaCache {
            reader,
            entries: vec![],
        }
    }

    pub fn load(&mut self, path: &Path, rate: u32) -> Result<Arc<SofaMeasurements>, SofaError> {
        if let Some((_, _, m)) = self.entries.iter().find(|(p, r, _)| p == path && *r == rate) {
            return Ok(m.clone());
        }

        log::debug!("Loading SOFA file {}", path.display());
        let measurements = self.reader.read(path)?;
        measurements.validate()?;
        if measurements.sample_rate.round() != rate as f64 {
            log::warn!(
                "{} is sampled at {} Hz, not {} Hz; using its impulses unchanged",
                path.display(),
                measurements.sample_rate,
                rate
            );
        }
        let measurements = Arc::new(measurements);
        self.entries
            .push((path.to_path_buf(), rate, measurements.clone()));
        Ok(measurements)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Meters within which a measurement belongs to a field.
const FIELD_TOLERANCE: f64 = 0.001;

/// Degrees a measurement may sit off the grid and still be assigned to it.
const GRID_TOLERANCE: f64 = 0.1;

/// The `(field, elevation, azimuth)` slot a measurement at Cartesian `xyz` lands on, if it lands on one.
///
/// SOFA azimuths run counterclockwise and the grid's run clockwise.  Measurements at the poles all land on azimuth
/// 0.
pub fn grid_slot(data: &HrirData, xyz: [f64; 3]) -> Option<(usize, usize, usize)> {
    let [az, el, r] = cartesian_to_spherical(xyz);
    let az = if el.abs() >= 89.999 {
        0.0
    } else {
        (360.0 - az) % 360.0
    };

    let fi = data
        .fields
        .iter()
        .position(|f| (r - f.distance).abs() < FIELD_TOLERANCE)?;

    let ev_scale = 180.0 / (data.elevation_count(fi) - 1) as f64;
    let ef = (90.0 + el) / ev_scale;
    let ei = ef.round();
    if ((ef - ei) * ev_scale).abs() >= GRID_TOLERANCE {
        return None;
    }
    let ei = ei as usize;

    let az_count = data.azimuth_count(fi, ei);
    let az_scale = 360.0 / az_count as f64;
    let af = az / az_scale;
    let ai = af.round();
    if ((af - ai) * az_scale).abs() >= GRID_TOLERANCE {
        return None;
    }
    Some((fi, ei, ai as usize % az_count))
}

/// `[azimuth°, elevation°, radius]` to Cartesian `[x, y, z]`.
pub fn spherical_to_cartesian(aer: [f64; 3]) -> [f64; 3] {
    let [az, el, r] = aer;
    let (az, el) = (az.to_radians(), el.to_radians());
    [
        r * el.cos() * az.cos(),
        r * el.cos() * az.sin(),
        r * el.sin(),
    ]
}

/// Cartesian `[x, y, z]` to `[azimuth°, elevation°, radius]`, azimuth in `(-180, 180]`.
pub fn cartesian_to_spherical(xyz: [f64; 3]) -> [f64; 3] {
    let [x, y, z] = xyz;
    let r = (x * x + y * y + z * z).sqrt();
    let az = y.atan2(x).to_degrees();
    let el = z.atan2((x * x + y * y).sqrt()).to_degrees();
    [az, el, r]
}
