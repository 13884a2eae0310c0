//! The field → elevation → azimuth grid and the flat sample arena behind it.
//!
//! The grid is allocated once and never resized.  Fields hold index ranges into `elevations`, elevations hold index
//! ranges into `azimuths`, and each azimuth owns a stable `index` that addresses its sample slots in the arena: slot
//! `(ear * ir_count + index) * ir_size`.  Until minimum-phase reconstruction a slot holds a magnitude response of
//! `fft_size / 2 + 1` bins; afterwards it holds an impulse response of `ir_points` samples.
use std::f64::consts::PI;
use std::ops::Range;

use crate::error::ConsistencyError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelType {
    Mono,
    Stereo,
}

impl ChannelType {
    pub fn count(self) -> usize {
        match self {
            ChannelType::Mono => 1,
            ChannelType::Stereo => 2,
        }
    }

    /// The value written to the output header.
    pub fn code(self) -> u8 {
        match self {
            ChannelType::Mono => 0,
            ChannelType::Stereo => 1,
        }
    }
}

pub const EAR_NAMES: [&str; 2] = ["left", "right"];

#[derive(Clone, Debug)]
pub struct Azimuth {
    /// Radians in `[0, 2π)`.
    pub azimuth: f64,
    /// Stable storage index into the arena, unique across the dataset.
    pub index: usize,
    /// Per ear: seconds until the HRTD scaler turns them into samples.
    pub delays: [f64; 2],
    /// Per ear: whether a source has been decoded into this slot.
    pub loaded: [bool; 2],
}

#[derive(Clone, Debug)]
pub struct Elevation {
    /// Radians in `[-π/2, π/2]`.
    pub elevation: f64,
    pub azimuths: Range<usize>,
}

#[derive(Clone, Debug)]
pub struct Field {
    /// Meters.
    pub distance: f64,
    /// Lowest elevation with measured (not synthesized) data.
    pub ev_start: usize,
    pub elevations: Range<usize>,
}

/// Azimuth counts per elevation for one field, bottom pole first.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldLayout {
    pub distance: f64,
    pub az_counts: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct HrirData {
    pub ir_rate: u32,
    pub channel_type: ChannelType,
    pub ir_points: usize,
    pub fft_size: usize,
    pub ir_size: usize,
    pub radius: f64,
    pub fields: Vec<Field>,
    pub elevations: Vec<Elevation>,
    pub azimuths: Vec<Azimuth>,
    hrirs: Vec<f64>,
}

impl HrirData {
    /// Build the grid for `layouts`, with zeroed sample slots.
    ///
    /// Elevation `ei` of a field with `n` elevations sits at `-π/2 + π·ei/(n-1)`; azimuth `ai` of `m` at `2π·ai/m`.
    pub fn new(
        ir_rate: u32,
        channel_type: ChannelType,
        ir_points: usize,
        fft_size: usize,
        radius: f64,
        layouts: &[FieldLayout],
    ) -> HrirData {
        let ir_size = ir_points.max(fft_size / 2 + 1);
        let mut fields = Vec::with_capacity(layouts.len());
        let mut elevations = vec![];
        let mut azimuths = vec![];

        for layout in layouts {
            let ev_count = layout.az_counts.len();
            let ev_begin = elevations.len();
            for (ei, &az_count) in layout.az_counts.iter().enumerate() {
                let az_begin = azimuths.len();
                for ai in 0..az_count {
                    azimuths.push(Azimuth {
                        azimuth: 2.0 * PI * ai as f64 / az_count as f64,
                        index: az_begin + ai,
                        delays: [0.0; 2],
                        loaded: [false; 2],
                    });
                }
                elevations.push(Elevation {
                    elevation: -PI / 2.0 + PI * ei as f64 / (ev_count - 1) as f64,
                    azimuths: az_begin..azimuths.len(),
                });
            }
            fields.push(Field {
                distance: layout.distance,
                ev_start: 0,
                elevations: ev_begin..elevations.len(),
            });
        }

        let hrirs = vec![0.0; channel_type.count() * azimuths.len() * ir_size];
        HrirData {
            ir_rate,
            channel_type,
            ir_points,
            fft_size,
            ir_size,
            radius,
            fields,
            elevations,
            azimuths,
            hrirs,
        }
    }

    pub fn channels(&self) -> usize {
        self.channel_type.count()
    }

    /// Number of azimuth slots across every field ever allocated.
    pub fn ir_count(&self) -> usize {
        self.azimuths.len()
    }

    /// Number of magnitude bins held per slot before reconstruction.
    pub fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    pub fn field_elevations(&self, fi: usize) -> &[Elevation] {
        &self.elevations[self.fields[fi].elevations.clone()]
    }

    pub fn elevation_azimuths(&self, elevation: &Elevation) -> &[Azimuth] {
        &self.azimuths[elevation.azimuths.clone()]
    }

    /// Index into `elevations` for field `fi`, elevation `ei`.
    pub fn elevation_position(&self, fi: usize, ei: usize) -> usize {
        self.fields[fi].elevations.start + ei
    }

    /// Index into `azimuths` for the triplet.
    pub fn azimuth_position(&self, fi: usize, ei: usize, ai: usize) -> usize {
        self.elevations[self.elevation_position(fi, ei)].azimuths.start + ai
    }

    pub fn azimuth_count(&self, fi: usize, ei: usize) -> usize {
        self.elevations[self.elevation_position(fi, ei)].azimuths.len()
    }

    pub fn elevation_count(&self, fi: usize) -> usize {
        self.fields[fi].elevations.len()
    }

    fn slot_range(&self, index: usize, ear: usize) -> Range<usize> {
        let start = (ear * self.ir_count() + index) * self.ir_size;
        start..start + self.ir_size
    }

    /// The full slot (`ir_size` values) for storage index `index`.
    pub fn hrir(&self, index: usize, ear: usize) -> &[f64] {
        &self.hrirs[self.slot_range(index, ear)]
    }

    pub fn hrir_mut(&mut self, index: usize, ear: usize) -> &mut [f64] {
        let range = self.slot_range(index, ear);
        &mut self.hrirs[range]
    }

    /// Every `(azimuth position, ear)` pair of the current fields, in output order within each field (fields in
    /// their current order, elevations bottom to top, azimuths ascending, left ear before right).
    pub fn slot_order(&self) -> Vec<(usize, usize)> {
        let channels = self.channels();
        let mut out = vec![];
        for field in self.fields.iter() {
            for elevation in &self.elevations[field.elevations.clone()] {
                for pos in elevation.azimuths.clone() {
                    for ear in 0..channels {
                        out.push((pos, ear));
                    }
                }
            }
        }
        out
    }

    /// Mutable views of the given slots, which must be distinct.
    pub fn slots_mut(&mut self, slots: &[(usize, usize)]) -> Vec<&mut [f64]> {
        let ir_count = self.ir_count();
        let wanted = slots
            .iter()
            .map(|&(pos, ear)| ear * ir_count + self.azimuths[pos].index)
            .collect::<Vec<_>>();

        let mut chunks = self
            .hrirs
            .chunks_mut(self.ir_size)
            .map(Some)
            .collect::<Vec<_>>();
        wanted
            .into_iter()
            .map(|chunk| {
                chunks[chunk]
                    .take()
                    .unwrap_or_else(|| panic!("Slot {} requested twice", chunk))
            })
            .collect()
    }

    /// Locate the first elevation with data in each field, then require every slot from there up to be filled.
    pub fn resolve_ev_starts(&mut self) -> Result<(), ConsistencyError> {
        for fi in 0..self.fields.len() {
            let ev_count = self.elevation_count(fi);
            let ev_start = (0..ev_count)
                .find(|&ei| {
                    let pos = self.elevation_position(fi, ei);
                    self.elevation_azimuths(&self.elevations[pos])
                        .iter()
                        .any(|az| az.loaded[0])
                })
                .ok_or(ConsistencyError::MissingField { field: fi })?;

            for ei in ev_start..ev_count {
                for ai in 0..self.azimuth_count(fi, ei) {
                    if !self.azimuths[self.azimuth_position(fi, ei, ai)].loaded[0] {
                        return Err(ConsistencyError::MissingSource {
                            field: fi,
                            elevation: ei,
                            azimuth: ai,
                        });
                    }
                }
            }
            self.fields[fi].ev_start = ev_start;
        }
        Ok(())
    }
}

/// Find the two azimuths of elevation `ei` in `field` bounding azimuth `az` (radians, any winding), along with the
/// interpolation factor between them.
pub fn az_indices(data: &HrirData, fi: usize, ei: usize, az: f64) -> (usize, usize, f64) {
    let count = data.azimuth_count(fi, ei);
    let mut f = (2.0 * PI + az) * count as f64 / (2.0 * PI);
    let i = (f as usize) % count;
    f -= f.floor();
    (i, (i + 1) % count, f)
}
