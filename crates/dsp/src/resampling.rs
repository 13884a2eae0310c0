//! One-shot band-limited resampling of short responses.
//!
//! HRIRs are a few hundred samples long and each one is resampled on its own, so rather than streaming through
//! Rubato chunk by chunk we pad the whole response, run it through once, and compensate for the filter delay so that
//! sample 0 of the output lines up with sample 0 of the input.
use rubato::{Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters};

/// Length of the windowed sinc, in input samples.
const SINC_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ResamplingError {
    #[error("Failed to create Rubato resampler: {0}")]
    RubatoError(#[from] rubato::ResamplerConstructionError),
    #[error("Failed to process samples: {0}")]
    ProcessError(#[from] rubato::ResampleError),
    #[error("Invalid sample rate: {0}")]
    InvalidRate(u32),
}

fn interpolation_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: rubato::SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: rubato::WindowFunction::Blackman,
    }
}

/// Where the first call to a fresh Rubato resampler puts the input.
///
/// Output frame `n` of the first chunk is taken at input time `(n + 1) / ratio - 1`.  Returns `(lead, skip)`: how
/// many zeros to put in front of the input and how many output frames to drop so that output frame `i` lands as
/// close as possible to input time `i / ratio`.
fn alignment(ratio: f64) -> (usize, usize) {
    if ratio >= 1.0 {
        (0, (ratio.round() as usize).saturating_sub(1))
    } else {
        (((1.0 / ratio) - 1.0).round() as usize, 0)
    }
}

/// Resample `input` from `source_rate` to `target_rate`, filling all of `output`.
///
/// Output past the end of the resampled signal is zero.  Equal rates copy.
pub fn resample_block(
    source_rate: u32,
    target_rate: u32,
    input: &[f64],
    output: &mut [f64],
) -> Result<(), ResamplingError> {
    if source_rate == 0 {
        return Err(ResamplingError::InvalidRate(source_rate));
    }
    if target_rate == 0 {
        return Err(ResamplingError::InvalidRate(target_rate));
    }

    if source_rate == target_rate {
        let len = input.len().min(output.len());
        output[..len].copy_from_slice(&input[..len]);
        output[len..].fill(0.0);
        return Ok(());
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let (lead, skip) = alignment(ratio);
    let needed_input = ((output.len() + skip) as f64 / ratio).ceil() as usize;
    // Trailing silence flushes the filter so the tail of the response makes it out.
    let frames = lead + input.len().max(needed_input) + 2 * SINC_LEN;

    let mut resampler = SincFixedIn::<f64>::new(ratio, 1.0, interpolation_parameters(), frames, 1)?;

    let mut padded = vec![0.0; frames];
    padded[lead..lead + input.len()].copy_from_slice(input);
    let resampled = resampler.process(&[padded], None)?;

    let channel = &resampled[0];
    for (i, o) in output.iter_mut().enumerate() {
        *o = channel.get(i + skip).copied().unwrap_or(0.0);
    }

    Ok(())
}
