use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::SourceError;
use crate::sources::{ElementType, Endian};

/// Everything needed to decode one fixed-width element.
#[derive(Copy, Clone, Debug)]
pub struct ElementLayout {
    pub order: Endian,
    pub element: ElementType,
    /// Bytes per element.
    pub size: u32,
    /// Significant bits for integers: positive when MSB-aligned, negative when LSB-aligned.
    pub bits: i32,
}

fn read_uint<R: Read>(reader: &mut R, order: Endian, bytes: usize) -> std::io::Result<u64> {
    match order {
        Endian::Little => reader.read_uint::<LittleEndian>(bytes),
        Endian::Big => reader.read_uint::<BigEndian>(bytes),
    }
}

/// Read one element, normalizing integers to `[-1, 1)` by their significant bits.  Floats are returned as stored.
pub fn read_sample<R: Read>(reader: &mut R, layout: ElementLayout) -> std::io::Result<f64> {
    let ElementLayout {
        order,
        element,
        size,
        bits,
    } = layout;

    if size > 4 {
        let raw = read_uint(reader, order, 8)?;
        return Ok(match element {
            ElementType::Fp => f64::from_bits(raw),
            ElementType::Int => 0.0,
        });
    }

    let raw = read_uint(reader, order, size as usize)? as u32;
    Ok(match element {
        ElementType::Fp => f32::from_bits(raw) as f64,
        ElementType::Int => {
            let width = bits.unsigned_abs();
            let value = if bits > 0 {
                raw >> (8 * size - width)
            } else {
                raw & (u32::MAX >> (32 - width))
            };
            // Sign-extend from `width` bits.
            let shift = 64 - width;
            let signed = ((value as i64) << shift) >> shift;
            signed as f64 / (1u64 << (width - 1)) as f64
        }
    })
}

/// Decode `out.len()` elements, starting `offset` bytes into the file and skipping `skip` bytes after each.
pub fn load_binary<R: Read + Seek>(
    reader: &mut R,
    path: &Path,
    layout: ElementLayout,
    offset: u32,
    skip: u32,
    out: &mut [f64],
) -> Result<(), SourceError> {
    let read_err = |source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    };

    reader
        .seek(SeekFrom::Start(offset as u64))
        .map_err(read_err)?;
    for o in out.iter_mut() {
        *o = read_sample(reader, layout).map_err(read_err)?;
        if skip > 0 {
            reader
                .seek(SeekFrom::Current(skip as i64))
                .map_err(read_err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    use crate::close_floats::close_floats64;

    fn int(order: Endian, size: u32, bits: i32) -> ElementLayout {
        ElementLayout {
            order,
            element: ElementType::Int,
            size,
            bits,
        }
    }

    #[test]
    fn test_full_width_ints() {
        let bytes = [0x00u8, 0x40, 0x00, 0xc0, 0xff, 0x7f];
        let mut r = Cursor::new(&bytes[..]);
        let layout = int(Endian::Little, 2, 16);
        close_floats64(read_sample(&mut r, layout).unwrap(), 0.5, 1e-12);
        close_floats64(read_sample(&mut r, layout).unwrap(), -0.5, 1e-12);
        close_floats64(read_sample(&mut r, layout).unwrap(), 32767.0 / 32768.0, 1e-12);

        let mut r = Cursor::new(&[0x80u8, 0x00, 0x00, 0x00][..]);
        close_floats64(
            read_sample(&mut r, int(Endian::Big, 4, 32)).unwrap(),
            -1.0,
            1e-12,
        );
    }

    #[test]
    fn test_partial_bits() {
        // 24-bit big endian container: 0x400000 >> 4 = 0x040000, 20 bits signed = 2^18 / 2^19.
        let mut r = Cursor::new(&[0x40u8, 0x00, 0x00][..]);
        close_floats64(
            read_sample(&mut r, int(Endian::Big, 3, 20)).unwrap(),
            0.5,
            1e-12,
        );

        // LSB-aligned: garbage in the high bits is masked off.
        let mut r = Cursor::new(&[0x00u8, 0x00, 0x80, 0xff][..]);
        close_floats64(
            read_sample(&mut r, int(Endian::Little, 4, -24)).unwrap(),
            -1.0,
            1e-12,
        );
    }

    #[test]
    fn test_floats() {
        let mut bytes = vec![];
        bytes.extend_from_slice(&0.25f32.to_le_bytes());
        bytes.extend_from_slice(&(-0.75f64).to_be_bytes());
        let mut r = Cursor::new(bytes);
        let f32_layout = ElementLayout {
            order: Endian::Little,
            element: ElementType::Fp,
            size: 4,
            bits: 0,
        };
        let f64_layout = ElementLayout {
            order: Endian::Big,
            size: 8,
            ..f32_layout
        };
        assert_eq!(read_sample(&mut r, f32_layout).unwrap(), 0.25);
        assert_eq!(read_sample(&mut r, f64_layout).unwrap(), -0.75);
    }

    #[test]
    fn test_offset_and_skip() {
        // Two interleaved 16-bit channels after a 2 byte header; read the second.
        let mut bytes = vec![0xaau8, 0xaa];
        for i in 0..4i16 {
            bytes.extend_from_slice(&(i * 1000).to_le_bytes());
            bytes.extend_from_slice(&(-i * 1000).to_le_bytes());
        }
        let mut out = [0.0; 4];
        load_binary(
            &mut Cursor::new(bytes),
            Path::new("x.bin"),
            int(Endian::Little, 2, 16),
            4,
            2,
            &mut out,
        )
        .unwrap();
        for (i, o) in out.iter().enumerate() {
            close_floats64(*o, -(i as f64) * 1000.0 / 32768.0, 1e-12);
        }
    }

    #[test]
    fn test_short_file_is_an_error() {
        let mut out = [0.0; 4];
        let err = load_binary(
            &mut Cursor::new(vec![0u8; 5]),
            Path::new("x.bin"),
            int(Endian::Little, 2, 16),
            0,
            0,
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::Read { .. }));
    }
}
