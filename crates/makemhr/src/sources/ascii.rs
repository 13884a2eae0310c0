use std::io::Read;

use crate::error::SourceError;
use crate::sources::{ElementType, SourceRef};
use crate::token_reader::{ParseResult, TokenReader};

const SEPARATORS: [&str; 4] = [",", ":", ";", "|"];

/// Read one element, skipping at most one separator in front of it.
fn read_element<R: Read>(tr: &mut TokenReader<R>, element: ElementType, bits: u32) -> ParseResult<f64> {
    for sep in SEPARATORS {
        if tr.eat_operator(sep)? {
            break;
        }
    }

    match element {
        ElementType::Fp => tr.read_float(f64::NEG_INFINITY, f64::INFINITY),
        ElementType::Int => {
            let half = 1i64 << (bits - 1);
            let v = tr.read_int(-half, half - 1)?;
            Ok(v as f64 / (half - 1) as f64)
        }
    }
}

pub fn load_ascii<R: Read>(
    reader: R,
    src: &SourceRef,
    element: ElementType,
    bits: u32,
    out: &mut [f64],
) -> Result<(), SourceError> {
    let mut tr = TokenReader::new(reader, &src.path.to_string_lossy());
    decode(&mut tr, src, element, bits, out).map_err(|source| SourceError::Ascii {
        path: src.path.clone(),
        source,
    })
}

fn decode<R: Read>(
    tr: &mut TokenReader<R>,
    src: &SourceRef,
    element: ElementType,
    bits: u32,
    out: &mut [f64],
) -> ParseResult<()> {
    for _ in 0..src.offset {
        read_element(tr, element, bits)?;
    }
    for o in out.iter_mut() {
        *o = read_element(tr, element, bits)?;
        for _ in 0..src.skip {
            read_element(tr, element, bits)?;
        }
    }
    Ok(())
}
