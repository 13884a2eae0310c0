//! RIFF (little endian) and RIFX (big endian) WAVE files, including `wavl` lists with `slnt` silence runs.
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::SourceError;
use crate::sources::binary::{read_sample, ElementLayout};
use crate::sources::{ElementType, Endian};

const FOURCC_RIFF: [u8; 4] = *b"RIFF";
const FOURCC_RIFX: [u8; 4] = *b"RIFX";
const FOURCC_WAVE: [u8; 4] = *b"WAVE";
const FOURCC_FMT: [u8; 4] = *b"fmt ";
const FOURCC_DATA: [u8; 4] = *b"data";
const FOURCC_LIST: [u8; 4] = *b"LIST";
const FOURCC_WAVL: [u8; 4] = *b"wavl";
const FOURCC_SLNT: [u8; 4] = *b"slnt";

const WAVE_FORMAT_PCM: u32 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u32 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u32 = 0xFFFE;

/// Decoded `fmt ` chunk plus the reference's channel.
#[derive(Copy, Clone, Debug)]
struct WaveLayout {
    element: ElementLayout,
    channel: u32,
    channels: u32,
}

impl WaveLayout {
    /// Bytes per frame.
    fn block(&self) -> u32 {
        self.element.size * self.channels
    }
}

struct WaveReader<'a, R> {
    reader: &'a mut R,
    path: &'a Path,
    order: Endian,
}

impl<'a, R: Read + Seek> WaveReader<'a, R> {
    fn io(&self, source: std::io::Error) -> SourceError {
        SourceError::Read {
            path: self.path.to_path_buf(),
            source,
        }
    }

    fn truncated(&self) -> SourceError {
        SourceError::Truncated {
            path: self.path.to_path_buf(),
        }
    }

    fn fourcc(&mut self) -> Result<[u8; 4], SourceError> {
        let mut ret = [0u8; 4];
        self.reader.read_exact(&mut ret).map_err(|e| self.io(e))?;
        Ok(ret)
    }

    fn uint(&mut self, bytes: usize) -> Result<u32, SourceError> {
        let v = match self.order {
            Endian::Little => self.reader.read_uint::<LittleEndian>(bytes),
            Endian::Big => self.reader.read_uint::<BigEndian>(bytes),
        };
        v.map(|x| x as u32).map_err(|e| self.io(e))
    }

    fn skip(&mut self, bytes: i64) -> Result<(), SourceError> {
        if bytes != 0 {
            self.reader
                .seek(SeekFrom::Current(bytes))
                .map_err(|e| self.io(e))?;
        }
        Ok(())
    }

    /// Find and validate the format chunk.
    fn read_format(&mut self, channel: u32, rate: u32) -> Result<WaveLayout, SourceError> {
        let mut chunk_size = 0u32;
        loop {
            self.skip(chunk_size as i64)?;
            let fourcc = self.fourcc()?;
            chunk_size = self.uint(4)?;
            if fourcc == FOURCC_FMT {
                break;
            }
        }
        let chunk_size = chunk_size as i64;

        let mut format = self.uint(2)?;
        let channels = self.uint(2)?;
        let file_rate = self.uint(4)?;
        let _byte_rate = self.uint(4)?;
        let mut block = self.uint(2)?;
        if channels == 0 {
            return Err(SourceError::MissingChannel {
                path: self.path.to_path_buf(),
                channel,
                channels,
            });
        }
        block /= channels;

        let size = if chunk_size > 14 {
            (self.uint(2)? / 8).max(block)
        } else {
            block
        };

        let bits = if format == WAVE_FORMAT_EXTENSIBLE {
            self.skip(2)?;
            let mut bits = self.uint(2)?;
            if bits == 0 {
                bits = 8 * size;
            }
            self.skip(4)?;
            format = self.uint(2)?;
            self.skip(chunk_size - 26)?;
            bits
        } else {
            self.skip(if chunk_size > 14 {
                chunk_size - 16
            } else {
                chunk_size - 14
            })?;
            8 * size
        };

        let path = self.path.to_path_buf();
        if format != WAVE_FORMAT_PCM && format != WAVE_FORMAT_IEEE_FLOAT {
            return Err(SourceError::UnsupportedWaveFormat { path, format });
        }
        if channel >= channels {
            return Err(SourceError::MissingChannel {
                path,
                channel,
                channels,
            });
        }
        if file_rate != rate {
            return Err(SourceError::RateMismatch {
                path,
                found: file_rate,
                expected: rate,
            });
        }

        let element = if format == WAVE_FORMAT_PCM {
            if !(2..=4).contains(&size) {
                return Err(SourceError::UnsupportedSampleSize { path, size });
            }
            if bits < 16 || bits > 8 * size {
                return Err(SourceError::BadSignificantBits { path, bits });
            }
            ElementType::Int
        } else {
            if size != 4 && size != 8 {
                return Err(SourceError::UnsupportedSampleSize { path, size });
            }
            ElementType::Fp
        };

        Ok(WaveLayout {
            element: ElementLayout {
                order: self.order,
                element,
                size,
                bits: bits as i32,
            },
            channel,
            channels,
        })
    }

    /// De-interleave `out.len()` frames starting at the current position.
    fn read_frames(&mut self, layout: &WaveLayout, out: &mut [f64]) -> Result<(), SourceError> {
        let size = layout.element.size as i64;
        let pre = size * layout.channel as i64;
        let post = size * (layout.channels - layout.channel - 1) as i64;

        let mut skip = 0;
        for o in out.iter_mut() {
            self.skip(skip + pre)?;
            *o = read_sample(&mut *self.reader, layout.element).map_err(|e| self.io(e))?;
            skip = post;
        }
        self.skip(skip)
    }

    /// Walk the chunk list to the samples, which are either one `data` chunk or a `wavl` list.
    fn read_samples(&mut self, layout: &WaveLayout, offset: u32, out: &mut [f64]) -> Result<(), SourceError> {
        let block = layout.block();
        let mut chunk_size;
        loop {
            let mut fourcc = self.fourcc()?;
            chunk_size = self.uint(4)?;

            if fourcc == FOURCC_DATA {
                if ((chunk_size / block) as usize) < offset as usize + out.len() {
                    return Err(self.truncated());
                }
                self.skip(offset as i64 * block as i64)?;
                return self.read_frames(layout, out);
            }
            if fourcc == FOURCC_LIST {
                fourcc = self.fourcc()?;
                chunk_size = chunk_size.saturating_sub(4);
                if fourcc == FOURCC_WAVL {
                    break;
                }
            }
            self.skip(chunk_size as i64)?;
        }

        let mut list_size = chunk_size;
        let mut skip = offset;
        let mut filled = 0usize;
        let mut last_sample = 0.0;
        while filled < out.len() && list_size > 8 {
            let fourcc = self.fourcc()?;
            chunk_size = self.uint(4)?;
            list_size = list_size.saturating_sub(8 + chunk_size);

            if fourcc == FOURCC_DATA {
                let mut count = chunk_size / block;
                if count > skip {
                    self.skip(skip as i64 * block as i64)?;
                    chunk_size -= skip * block;
                    count -= skip;
                    skip = 0;
                    let count = (count as usize).min(out.len() - filled);
                    self.read_frames(layout, &mut out[filled..filled + count])?;
                    chunk_size -= count as u32 * block;
                    filled += count;
                    last_sample = out[filled - 1];
                } else {
                    skip -= count;
                }
            } else if fourcc == FOURCC_SLNT {
                let mut count = self.uint(4)?;
                chunk_size = chunk_size.saturating_sub(4);
                if count > skip {
                    count -= skip;
                    skip = 0;
                    let count = (count as usize).min(out.len() - filled);
                    out[filled..filled + count].fill(last_sample);
                    filled += count;
                } else {
                    skip -= count;
                }
            }
            self.skip(chunk_size as i64)?;
        }

        if filled < out.len() {
            return Err(self.truncated());
        }
        Ok(())
    }
}

/// Decode `out.len()` samples of `channel`, starting `offset` frames in.  The file's rate must be `rate`.
pub fn load_wave<R: Read + Seek>(
    reader: &mut R,
    path: &Path,
    channel: u32,
    offset: u32,
    rate: u32,
    out: &mut [f64],
) -> Result<(), SourceError> {
    let mut wave = WaveReader {
        reader,
        path,
        order: Endian::Little,
    };

    let riff = wave.fourcc()?;
    wave.order = match riff {
        FOURCC_RIFF => Endian::Little,
        FOURCC_RIFX => Endian::Big,
        _ => {
            return Err(SourceError::NotRiff {
                path: path.to_path_buf(),
            })
        }
    };
    let _riff_size = wave.uint(4)?;
    if wave.fourcc()? != FOURCC_WAVE {
        return Err(SourceError::NotWave {
            path: path.to_path_buf(),
        });
    }

    let layout = wave.read_format(channel, rate)?;
    wave.read_samples(&layout, offset, out)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    use crate::close_floats::close_floats64;

    /// Little endian 16-bit PCM with the given chunks after `fmt `.
    fn riff(channels: u16, rate: u32, chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut body = b"WAVE".to_vec();
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&rate.to_le_bytes());
        body.extend_from_slice(&(rate * 2 * channels as u32).to_le_bytes());
        body.extend_from_slice(&(2 * channels).to_le_bytes());
        body.extend_from_slice(&16u16.to_le_bytes());
        for (id, data) in chunks {
            body.extend_from_slice(*id);
            body.extend_from_slice(&(data.len() as u32).to_le_bytes());
            body.extend_from_slice(data);
        }
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend(body);
        out
    }

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn load(bytes: Vec<u8>, channel: u32, offset: u32, out: &mut [f64]) -> Result<(), SourceError> {
        load_wave(&mut Cursor::new(bytes), Path::new("t.wav"), channel, offset, 44100, out)
    }

    #[test]
    fn test_stereo_deinterleave() {
        let bytes = riff(
            2,
            44100,
            &[
                (b"junk", vec![0; 6]),
                (b"data", pcm16(&[100, -100, 200, -200, 300, -300, 400, -400])),
            ],
        );
        let mut out = [0.0; 3];
        load(bytes.clone(), 1, 1, &mut out).unwrap();
        for (o, e) in out.iter().zip([-200.0, -300.0, -400.0]) {
            close_floats64(*o, e / 32768.0, 1e-12);
        }

        let mut out = [0.0; 4];
        load(bytes, 0, 0, &mut out).unwrap();
        close_floats64(out[3], 400.0 / 32768.0, 1e-12);
    }

    #[test]
    fn test_rifx() {
        let mut body = b"WAVE".to_vec();
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&44100u32.to_be_bytes());
        body.extend_from_slice(&88200u32.to_be_bytes());
        body.extend_from_slice(&2u16.to_be_bytes());
        body.extend_from_slice(&16u16.to_be_bytes());
        body.extend_from_slice(b"data");
        body.extend_from_slice(&4u32.to_be_bytes());
        body.extend_from_slice(&16384i16.to_be_bytes());
        body.extend_from_slice(&(-16384i16).to_be_bytes());
        let mut bytes = b"RIFX".to_vec();
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend(body);

        let mut out = [0.0; 2];
        load(bytes, 0, 0, &mut out).unwrap();
        assert_eq!(out, [0.5, -0.5]);
    }

    #[test]
    fn test_wavl_with_silence() {
        let mut list = b"wavl".to_vec();
        let mut push = |id: &[u8; 4], data: Vec<u8>| {
            list.extend_from_slice(id);
            list.extend_from_slice(&(data.len() as u32).to_le_bytes());
            list.extend(data);
        };
        push(b"data", pcm16(&[1000, 2000]));
        push(b"slnt", 3u32.to_le_bytes().to_vec());
        push(b"data", pcm16(&[3000]));

        let bytes = riff(1, 44100, &[(b"LIST", list)]);
        let mut out = [0.0; 5];
        load(bytes.clone(), 0, 1, &mut out).unwrap();
        let expected = [2000.0, 2000.0, 2000.0, 2000.0, 3000.0];
        for (o, e) in out.iter().zip(expected) {
            close_floats64(*o, e / 32768.0, 1e-12);
        }

        let mut out = [0.0; 6];
        load(bytes.clone(), 0, 0, &mut out).unwrap();
        close_floats64(out[0], 1000.0 / 32768.0, 1e-12);

        let mut out = [0.0; 6];
        assert!(matches!(
            load(bytes, 0, 1, &mut out),
            Err(SourceError::Truncated { .. })
        ));
    }

    #[test]
    fn test_validation() {
        let data = (b"data", pcm16(&[0; 8]));
        let mut out = [0.0; 2];

        assert!(matches!(
            load(riff(1, 48000, &[data.clone()]), 0, 0, &mut out),
            Err(SourceError::RateMismatch {
                found: 48000,
                expected: 44100,
                ..
            })
        ));
        assert!(matches!(
            load(riff(1, 44100, &[data.clone()]), 1, 0, &mut out),
            Err(SourceError::MissingChannel { .. })
        ));
        assert!(matches!(
            load(riff(1, 44100, &[data.clone()]), 0, 7, &mut out),
            Err(SourceError::Truncated { .. })
        ));

        let mut bytes = riff(1, 44100, &[data]);
        bytes[0..4].copy_from_slice(b"OggS");
        assert!(matches!(
            load(bytes, 0, 0, &mut out),
            Err(SourceError::NotRiff { .. })
        ));
    }
}
