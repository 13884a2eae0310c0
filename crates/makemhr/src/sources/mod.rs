//! Source references and the decoders behind them.
//!
//! A reference names one HRIR inside some file.  Each format carries its own decode parameters; decoding always
//! produces exactly as many samples as asked for, or fails.
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::config::{MAX_DISTANCE, MIN_DISTANCE};
use crate::error::SourceError;
use crate::sofa::SofaCache;
use crate::token_reader::{ParseResult, TokenReader};

mod ascii;
mod binary;
mod sofa;
mod wave;

pub(crate) use self::sofa::load_set;

/// Largest channel index a reference may name.
pub const MAX_WAVE_CHANNELS: i64 = 65535;

const MIN_BIN_SIZE: i64 = 2;
const MAX_BIN_SIZE: i64 = 4;
const MIN_ASCII_BITS: i64 = 16;
const MAX_ASCII_BITS: i64 = 32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElementType {
    Int,
    Fp,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Endian {
    Little,
    Big,
}

/// How to find and decode the samples.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceFormat {
    /// Whitespace or `,;:|` separated numbers.  Integers are normalized by `bits`.
    Ascii { element: ElementType, bits: u32 },
    /// Fixed-width elements.  `bits` is signed: positive means the significant bits sit at the MSB end, negative at
    /// the LSB end.  Zero for floats.
    Binary {
        order: Endian,
        element: ElementType,
        size: u32,
        bits: i32,
    },
    Wave { channel: u32 },
    /// Degrees and meters; looked up by nearest position.
    Sofa {
        radius: f64,
        elevation: f64,
        azimuth: f64,
        channel: u32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SourceRef {
    pub format: SourceFormat,
    /// Elements (ASCII) or bytes (binary) to skip after each sample.
    pub skip: u32,
    /// Elements (ASCII, WAVE, SOFA) or bytes (binary) to skip before the first sample.
    pub offset: u32,
    pub path: PathBuf,
}

fn match_format(ident: &str) -> Option<&'static str> {
    ["ascii", "bin_le", "bin_be", "wave", "sofa"]
        .into_iter()
        .find(|f| f.eq_ignore_ascii_case(ident))
}

fn match_element(ident: &str) -> Option<ElementType> {
    if ident.eq_ignore_ascii_case("int") {
        Some(ElementType::Int)
    } else if ident.eq_ignore_ascii_case("fp") {
        Some(ElementType::Fp)
    } else {
        None
    }
}

fn read_offset<R: std::io::Read>(tr: &mut TokenReader<R>) -> ParseResult<u32> {
    if tr.eat_operator("@")? {
        Ok(tr.read_int(0, i32::MAX as i64)? as u32)
    } else {
        Ok(0)
    }
}

impl SourceRef {
    /// Parse `format(params)[@offset]: "path"`.
    pub fn parse<R: std::io::Read>(tr: &mut TokenReader<R>) -> ParseResult<SourceRef> {
        let (line, column) = tr.position()?;
        let ident = tr.read_ident()?;
        let format =
            match_format(&ident).ok_or_else(|| tr.error_at(line, column, "Expected a source format."))?;
        tr.read_operator("(")?;

        let mut skip = 0;
        let format = match format {
            "sofa" => {
                let radius = tr.read_float(MIN_DISTANCE, MAX_DISTANCE)?;
                tr.read_operator(",")?;
                let elevation = tr.read_float(-90.0, 90.0)?;
                tr.read_operator(",")?;
                let azimuth = tr.read_float(-360.0, 360.0)?;
                let channel = if tr.eat_operator(":")? {
                    tr.read_int(0, MAX_WAVE_CHANNELS)? as u32
                } else {
                    0
                };
                SourceFormat::Sofa {
                    radius,
                    elevation,
                    azimuth,
                    channel,
                }
            }
            "wave" => SourceFormat::Wave {
                channel: tr.read_int(0, MAX_WAVE_CHANNELS)? as u32,
            },
            other => {
                let (line, column) = tr.position()?;
                let ident = tr.read_ident()?;
                let element = match_element(&ident)
                    .ok_or_else(|| tr.error_at(line, column, "Expected a source element type."))?;

                let format = if other == "ascii" {
                    let bits = match element {
                        ElementType::Int => {
                            tr.read_operator(",")?;
                            tr.read_int(MIN_ASCII_BITS, MAX_ASCII_BITS)? as u32
                        }
                        ElementType::Fp => 0,
                    };
                    SourceFormat::Ascii { element, bits }
                } else {
                    let order = if other == "bin_le" {
                        Endian::Little
                    } else {
                        Endian::Big
                    };
                    tr.read_operator(",")?;
                    let (size, bits) = match element {
                        ElementType::Int => {
                            let size = tr.read_int(MIN_BIN_SIZE, MAX_BIN_SIZE)?;
                            let bits = if tr.eat_operator(",")? {
                                let (line, column) = tr.position()?;
                                let bits = tr.read_int(i32::MIN as i64, i32::MAX as i64)?;
                                if bits.abs() < MIN_BIN_SIZE * 8 || bits.abs() > 8 * size {
                                    return Err(tr.error_at(
                                        line,
                                        column,
                                        format!(
                                            "Expected a value of (+/-) {} to {}.",
                                            MIN_BIN_SIZE * 8,
                                            8 * size
                                        ),
                                    ));
                                }
                                bits
                            } else {
                                8 * size
                            };
                            (size as u32, bits as i32)
                        }
                        ElementType::Fp => {
                            let (line, column) = tr.position()?;
                            let size = tr.read_int(i32::MIN as i64, i32::MAX as i64)?;
                            if size != 4 && size != 8 {
                                return Err(tr.error_at(line, column, "Expected a value of 4 or 8."));
                            }
                            (size as u32, 0)
                        }
                    };
                    SourceFormat::Binary {
                        order,
                        element,
                        size,
                        bits,
                    }
                };

                if tr.eat_operator(";")? {
                    skip = tr.read_int(0, i32::MAX as i64)? as u32;
                }
                format
            }
        };
        tr.read_operator(")")?;
        let offset = read_offset(tr)?;
        tr.read_operator(":")?;
        let path = PathBuf::from(tr.read_string()?);

        Ok(SourceRef {
            format,
            skip,
            offset,
            path,
        })
    }

    /// Parse the bulk form `sofa[@offset]: "path"`.  The channel is decided by the caller.
    pub fn parse_bulk_sofa<R: std::io::Read>(tr: &mut TokenReader<R>) -> ParseResult<SourceRef> {
        let (line, column) = tr.position()?;
        let ident = tr.read_ident()?;
        if !ident.eq_ignore_ascii_case("sofa") {
            return Err(tr.error_at(line, column, "Expected the SOFA source format."));
        }
        let offset = read_offset(tr)?;
        tr.read_operator(":")?;
        let path = PathBuf::from(tr.read_string()?);

        Ok(SourceRef {
            format: SourceFormat::Sofa {
                radius: 0.0,
                elevation: 0.0,
                azimuth: 0.0,
                channel: 0,
            },
            skip: 0,
            offset,
            path,
        })
    }

    /// Decode `out.len()` samples.  `rate` is the dataset's rate, which WAVE sources must match.
    pub fn load(&self, rate: u32, cache: &mut SofaCache, out: &mut [f64]) -> Result<(), SourceError> {
        match &self.format {
            SourceFormat::Ascii { element, bits } => {
                ascii::load_ascii(open(&self.path)?, self, *element, *bits, out)
            }
            SourceFormat::Binary {
                order,
                element,
                size,
                bits,
            } => binary::load_binary(
                &mut open(&self.path)?,
                &self.path,
                binary::ElementLayout {
                    order: *order,
                    element: *element,
                    size: *size,
                    bits: *bits,
                },
                self.offset,
                self.skip,
                out,
            ),
            SourceFormat::Wave { channel } => {
                wave::load_wave(&mut open(&self.path)?, &self.path, *channel, self.offset, rate, out)
            }
            SourceFormat::Sofa {
                radius,
                elevation,
                azimuth,
                channel,
            } => sofa::load_sofa(
                cache,
                &self.path,
                rate,
                [*azimuth, *elevation, *radius],
                *channel,
                self.offset,
                out,
            ),
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>, SourceError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> ParseResult<SourceRef> {
        let mut tr = TokenReader::new(text.as_bytes(), "test.def");
        SourceRef::parse(&mut tr)
    }

    #[test]
    fn test_parse_ascii() {
        assert_eq!(
            parse(r#"ascii(int, 24; 1)@3: "a.txt""#).unwrap(),
            SourceRef {
                format: SourceFormat::Ascii {
                    element: ElementType::Int,
                    bits: 24
                },
                skip: 1,
                offset: 3,
                path: PathBuf::from("a.txt"),
            }
        );
        assert_eq!(
            parse(r#"ASCII(fp) : "b.txt""#).unwrap().format,
            SourceFormat::Ascii {
                element: ElementType::Fp,
                bits: 0
            }
        );
    }

    #[test]
    fn test_parse_binary() {
        assert_eq!(
            parse(r#"bin_be(int, 3, -20; 2): "x.bin""#).unwrap(),
            SourceRef {
                format: SourceFormat::Binary {
                    order: Endian::Big,
                    element: ElementType::Int,
                    size: 3,
                    bits: -20
                },
                skip: 2,
                offset: 0,
                path: PathBuf::from("x.bin"),
            }
        );
        assert_eq!(
            parse(r#"bin_le(int, 2): "x.bin""#).unwrap().format,
            SourceFormat::Binary {
                order: Endian::Little,
                element: ElementType::Int,
                size: 2,
                bits: 16
            }
        );
        assert_eq!(
            parse(r#"bin_le(fp, 8): "x.bin""#).unwrap().format,
            SourceFormat::Binary {
                order: Endian::Little,
                element: ElementType::Fp,
                size: 8,
                bits: 0
            }
        );
    }

    #[test]
    fn test_parse_wave_and_sofa() {
        assert_eq!(
            parse(r#"wave(1)@10: "w.wav""#).unwrap(),
            SourceRef {
                format: SourceFormat::Wave { channel: 1 },
                skip: 0,
                offset: 10,
                path: PathBuf::from("w.wav"),
            }
        );
        assert_eq!(
            parse(r#"sofa(1.0, -45, 270 : 1): "s.sofa""#).unwrap().format,
            SourceFormat::Sofa {
                radius: 1.0,
                elevation: -45.0,
                azimuth: 270.0,
                channel: 1
            }
        );
        assert_eq!(
            parse(r#"sofa(1.0, 0, 0): "s.sofa""#).unwrap().format,
            SourceFormat::Sofa {
                radius: 1.0,
                elevation: 0.0,
                azimuth: 0.0,
                channel: 0
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        let err = parse(r#"flac(1): "x""#).unwrap_err();
        assert_eq!(err.message, "Expected a source format.");
        assert_eq!((err.line, err.column), (1, 1));

        let err = parse(r#"bin_le(int, 2, 20): "x""#).unwrap_err();
        assert_eq!(err.message, "Expected a value of (+/-) 16 to 16.");
        assert_eq!(err.column, 16);

        let err = parse(r#"bin_le(fp, 2): "x""#).unwrap_err();
        assert_eq!(err.message, "Expected a value of 4 or 8.");

        let err = parse(r#"ascii(char): "x""#).unwrap_err();
        assert_eq!(err.message, "Expected a source element type.");

        assert!(parse(r#"ascii(int, 8): "x""#).is_err());
        assert!(parse(r#"wave(0) "x""#).is_err());
    }

    #[test]
    fn test_parse_bulk_sofa() {
        let mut tr = TokenReader::new(r#"sofa@4: "all.sofa""#.as_bytes(), "test.def");
        let src = SourceRef::parse_bulk_sofa(&mut tr).unwrap();
        assert_eq!(src.offset, 4);
        assert_eq!(src.path, PathBuf::from("all.sofa"));

        let mut tr = TokenReader::new(r#"wave: "all.sofa""#.as_bytes(), "test.def");
        assert_eq!(
            SourceRef::parse_bulk_sofa(&mut tr).unwrap_err().message,
            "Expected the SOFA source format."
        );
    }
}
