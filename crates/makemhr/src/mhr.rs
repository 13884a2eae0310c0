//! The `MinPHR03` output format.
//!
//! All integers are little-endian.  The header is followed by the field layouts, then every impulse response as
//! dithered 24-bit samples interleaved by ear, then the delays.  Fields are written farthest first.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use rand::prelude::*;
use rand_xoshiro::Xoroshiro128PlusPlus;

use crate::config::DITHER_SEED;
use crate::error::OutputError;
use crate::hrir_data::HrirData;

pub const MAGIC: &[u8; 8] = b"MinPHR03";

const SAMPLE_MAX: i32 = (1 << 23) - 1;
const SAMPLE_MIN: i32 = -(1 << 23);

/// Triangular-PDF dither from two uniform draws per sample.
struct Ditherer {
    rng: Xoroshiro128PlusPlus,
}

impl Ditherer {
    fn new() -> Self {
        Ditherer {
            rng: Xoroshiro128PlusPlus::seed_from_u64(DITHER_SEED),
        }
    }

    fn uniform(&mut self) -> f64 {
        self.rng.next_u32() as f64 / u32::MAX as f64
    }

    /// `x` in `[-1, 1]` as a dithered 24-bit integer.
    fn quantize(&mut self, x: f64) -> i32 {
        let r0 = self.uniform();
        let r1 = self.uniform();
        let v = (x * SAMPLE_MAX as f64 + r0 - r1).round();
        v.clamp(SAMPLE_MIN as f64, SAMPLE_MAX as f64) as i32
    }
}

/// Azimuth positions of the whole grid in output order: fields farthest first, then elevations bottom up.
fn output_positions(data: &HrirData) -> impl Iterator<Item = usize> + '_ {
    data.fields.iter().rev().flat_map(move |field| {
        data.elevations[field.elevations.clone()]
            .iter()
            .flat_map(|e| e.azimuths.clone())
    })
}

/// Serialize `data`, whose slots hold final impulse responses and whose delays are in samples.
pub fn write_mhr<W: Write>(data: &HrirData, mut w: W) -> std::io::Result<()> {
    w.write_all(MAGIC)?;
    w.write_u32::<LittleEndian>(data.ir_rate)?;
    w.write_u8(data.channel_type.code())?;
    w.write_u32::<LittleEndian>(data.ir_points as u32)?;
    w.write_u32::<LittleEndian>(data.fields.len() as u32)?;

    for field in data.fields.iter().rev() {
        w.write_u16::<LittleEndian>((field.distance * 1000.0).round() as u16)?;
        w.write_u8(field.elevations.len() as u8)?;
        for e in &data.elevations[field.elevations.clone()] {
            w.write_u8(e.azimuths.len() as u8)?;
        }
    }

    let channels = data.channels();
    let mut dither = Ditherer::new();
    for pos in output_positions(data) {
        let index = data.azimuths[pos].index;
        for i in 0..data.ir_points {
            for ear in 0..channels {
                let v = dither.quantize(data.hrir(index, ear)[i]);
                w.write_i24::<LittleEndian>(v)?;
            }
        }
    }

    for pos in output_positions(data) {
        for ear in 0..channels {
            let delay = (data.azimuths[pos].delays[ear] * 4.0).round();
            w.write_u8(delay as u8)?;
        }
    }
    w.flush()
}

/// Write `data` to a new file at `path`.  A partially written file is left behind on failure.
pub fn store_mhr(data: &HrirData, path: &Path) -> Result<(), OutputError> {
    let wrap = |source: std::io::Error| OutputError {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(wrap)?;
    write_mhr(data, BufWriter::new(file)).map_err(wrap)
}

#[cfg(test)]
mod tests {
    use super::*;

    use byteorder::ReadBytesExt;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use crate::hrir_data::{ChannelType, FieldLayout};

    fn dataset(channel_type: ChannelType) -> HrirData {
        let layouts = [
            FieldLayout {
                distance: 0.5,
                az_counts: vec![1, 2, 4, 2, 1],
            },
            FieldLayout {
                distance: 1.25,
                az_counts: vec![1, 3, 3, 3, 3, 3, 1],
            },
        ];
        let mut data = HrirData::new(44100, channel_type, 8, 16, 0.09, &layouts);
        for a in data.azimuths.iter_mut() {
            a.delays = [a.index as f64 * 0.25, 1.0];
        }
        data
    }

    #[test]
    fn test_layout() {
        let data = dataset(ChannelType::Stereo);
        let mut out = vec![];
        write_mhr(&data, &mut out).unwrap();

        let mut r = &out[..];
        let mut magic = [0u8; 8];
        std::io::Read::read_exact(&mut r, &mut magic).unwrap();
        assert_eq!(&magic, MAGIC);
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 44100);
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 8);
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 2);

        // Farthest field first.
        assert_eq!(r.read_u16::<LittleEndian>().unwrap(), 1250);
        assert_eq!(r.read_u8().unwrap(), 7);
        let counts = (0..7).map(|_| r.read_u8().unwrap()).collect::<Vec<_>>();
        assert_eq!(counts, vec![1, 3, 3, 3, 3, 3, 1]);
        assert_eq!(r.read_u16::<LittleEndian>().unwrap(), 500);
        assert_eq!(r.read_u8().unwrap(), 5);
        let counts = (0..5).map(|_| r.read_u8().unwrap()).collect::<Vec<_>>();
        assert_eq!(counts, vec![1, 2, 4, 2, 1]);

        let slots = 17 + 10;
        assert_eq!(r.len(), slots * 8 * 2 * 3 + slots * 2);

        // Silence dithers to within a step of zero.
        let samples = &r[..slots * 8 * 2 * 3];
        for chunk in samples.chunks(3) {
            let v = (&chunk[..]).read_i24::<LittleEndian>().unwrap();
            assert!(v.abs() <= 1, "{v}");
        }

        // The far field's first azimuth is the first one written.
        let delays = &r[slots * 8 * 2 * 3..];
        let first = data.fields[1].elevations.start;
        let first = data.elevations[first].azimuths.start;
        let expected = (data.azimuths[first].index as f64 * 0.25 * 4.0).round() as u8;
        assert_eq!(&delays[..2], &[expected, 4]);
    }

    #[test]
    fn test_mono_and_deterministic() {
        let mut data = dataset(ChannelType::Mono);
        let order = data.slot_order();
        for (i, slot) in data.slots_mut(&order).into_iter().enumerate() {
            for (j, s) in slot[..8].iter_mut().enumerate() {
                *s = ((i * 8 + j) as f64 * 0.37).sin() * 0.9;
            }
        }
        let mut a = vec![];
        let mut b = vec![];
        write_mhr(&data, &mut a).unwrap();
        write_mhr(&data, &mut b).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[12], 0);
        assert_eq!(a.len(), 8 + 4 + 1 + 4 + 4 + (3 + 7) + (3 + 5) + 27 * 8 * 3 + 27);
    }

    #[test]
    fn test_store_reports_path() {
        let data = dataset(ChannelType::Mono);
        let path = Path::new("/nonexistent-directory/out.mhr");
        let err = store_mhr(&data, path).unwrap_err();
        assert_eq!(err.path, path);
    }

    proptest! {
        #[test]
        fn test_dither_in_range(x in -1.5f64..1.5) {
            let mut d = Ditherer::new();
            for _ in 0..8 {
                let v = d.quantize(x);
                prop_assert!((SAMPLE_MIN..=SAMPLE_MAX).contains(&v));
                let ideal = (x.clamp(-1.0, 1.0) * SAMPLE_MAX as f64).round() as i32;
                prop_assert!((v - ideal).abs() <= 2);
            }
        }
    }
}
