//! A [SofaReader] backed by libmysofa.
use std::ffi::{c_int, CStr, CString};
use std::path::Path;

use libmysofa_sys as ffi;

use crate::error::SofaError;
use crate::sofa::{SofaDelays, SofaMeasurements, SofaReader};

/// Owns a loaded, non-null `MYSOFA_HRTF`.
struct Hrtf(*mut ffi::MYSOFA_HRTF);

impl Drop for Hrtf {
    fn drop(&mut self) {
        unsafe { ffi::mysofa_free(self.0) }
    }
}

fn error_name(code: c_int) -> &'static str {
    match code {
        ffi::MYSOFA_OK => "No error",
        ffi::MYSOFA_INTERNAL_ERROR => "Internal error",
        ffi::MYSOFA_INVALID_FORMAT => "Invalid format",
        ffi::MYSOFA_UNSUPPORTED_FORMAT => "Unsupported format",
        ffi::MYSOFA_NO_MEMORY => "Out of memory",
        ffi::MYSOFA_READ_ERROR => "Read error",
        ffi::MYSOFA_INVALID_ATTRIBUTES => "Invalid attributes",
        ffi::MYSOFA_INVALID_DIMENSIONS => "Invalid dimensions",
        ffi::MYSOFA_INVALID_DIMENSION_LIST => "Invalid dimension list",
        ffi::MYSOFA_INVALID_COORDINATE_TYPE => "Invalid coordinate type",
        ffi::MYSOFA_ONLY_EMITTER_WITH_ECI_SUPPORTED => "Only emitter with ECI supported",
        ffi::MYSOFA_ONLY_DELAYS_WITH_IR_OR_MR_SUPPORTED => "Only delays with IR or MR supported",
        ffi::MYSOFA_ONLY_THE_SAME_SAMPLING_RATE_SUPPORTED => "Only the same sampling rate supported",
        ffi::MYSOFA_RECEIVERS_WITH_RCI_SUPPORTED => "Receivers with RCI supported",
        ffi::MYSOFA_RECEIVERS_WITH_CARTESIAN_SUPPORTED => "Receivers with cartesian supported",
        ffi::MYSOFA_INVALID_RECEIVER_POSITIONS => "Invalid receiver positions",
        ffi::MYSOFA_ONLY_SOURCES_WITH_MC_SUPPORTED => "Only sources with MC supported",
        _ => "Unknown error",
    }
}

/// The `DIMENSION_LIST` attribute of `array`.
///
/// # Safety
///
/// `array` must come from a live `MYSOFA_HRTF`.
unsafe fn dimensions(array: &ffi::MYSOFA_ARRAY) -> Option<String> {
    let mut attr = array.attributes;
    while !attr.is_null() {
        let a = &*attr;
        if !a.name.is_null() && CStr::from_ptr(a.name).to_bytes() == b"DIMENSION_LIST" {
            if a.value.is_null() {
                return None;
            }
            return Some(CStr::from_ptr(a.value).to_string_lossy().into_owned());
        }
        attr = a.next;
    }
    None
}

/// # Safety
///
/// `array` must come from a live `MYSOFA_HRTF`.
unsafe fn values(array: &ffi::MYSOFA_ARRAY) -> &[f32] {
    if array.values.is_null() {
        return &[];
    }
    std::slice::from_raw_parts(array.values, array.elements as usize)
}

fn widen(values: &[f32]) -> Vec<f64> {
    values.iter().map(|v| *v as f64).collect()
}

/// Reads SOFA files with libmysofa, converting source positions to Cartesian coordinates.
#[derive(Copy, Clone, Debug, Default)]
pub struct LibMySofaReader;

impl SofaReader for LibMySofaReader {
    fn read(&self, path: &Path) -> Result<SofaMeasurements, SofaError> {
        let c_path = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|_| SofaError::Malformed("path contains a NUL byte"))?;

        let mut code: c_int = ffi::MYSOFA_OK;
        let raw = unsafe { ffi::mysofa_load(c_path.as_ptr(), &mut code) };
        if raw.is_null() {
            return Err(SofaError::Load {
                path: path.to_path_buf(),
                code,
                reason: error_name(code),
            });
        }
        let hrtf = Hrtf(raw);

        // Some valid files fail the check.
        let check = unsafe { ffi::mysofa_check(hrtf.0) };
        if check != ffi::MYSOFA_OK {
            log::warn!(
                "Supposedly malformed source file '{}': {} ({})",
                path.display(),
                error_name(check),
                check
            );
        }
        unsafe { ffi::mysofa_tocartesian(hrtf.0) };

        let h = unsafe { &*hrtf.0 };
        let measurements = h.M as usize;
        let receivers = h.R as usize;

        if unsafe { dimensions(&h.DataSamplingRate) }.as_deref() != Some("I") {
            return Err(SofaError::Malformed("sample rate dimensions must be I"));
        }
        let sample_rate = unsafe { values(&h.DataSamplingRate) }
            .first()
            .copied()
            .ok_or(SofaError::Malformed("missing sample rate"))? as f64;

        if unsafe { dimensions(&h.DataIR) }.as_deref() != Some("M,R,N") {
            return Err(SofaError::Malformed("impulse response dimensions must be M,R,N"));
        }

        let delay_values = unsafe { values(&h.DataDelay) };
        let delays = match unsafe { dimensions(&h.DataDelay) }.as_deref() {
            None => SofaDelays::None,
            Some("I,R") => SofaDelays::PerReceiver(widen(delay_values)),
            Some("M,R") => SofaDelays::PerMeasurement(widen(delay_values)),
            Some(_) => return Err(SofaError::Malformed("delay dimensions must be I,R or M,R")),
        };

        let positions = unsafe { values(&h.SourcePosition) }
            .chunks_exact(3)
            .take(measurements)
            .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
            .collect::<Vec<_>>();
        if positions.len() != measurements {
            return Err(SofaError::Malformed("source positions do not match M"));
        }

        Ok(SofaMeasurements {
            sample_rate,
            emitters: h.E as usize,
            receivers,
            samples: h.N as usize,
            positions,
            impulses: widen(unsafe { values(&h.DataIR) }),
            delays,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let path = Path::new("/nonexistent-directory/measured.sofa");
        let err = LibMySofaReader.read(path).unwrap_err();
        let SofaError::Load { path: reported, .. } = err else {
            panic!("{err:?}");
        };
        assert_eq!(reported, path);
    }

    #[test]
    fn test_error_names() {
        assert_eq!(error_name(ffi::MYSOFA_OK), "No error");
        assert_eq!(error_name(ffi::MYSOFA_READ_ERROR), "Read error");
        assert_eq!(error_name(-1234), "Unknown error");
    }
}
