//! Definition of the Clap command line.
//!
//! Every bound is enforced while parsing, so [CliArgs::to_options] can't fail.
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use makemhr::config::*;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DelayModel {
    /// Delays measured from the dataset.
    Dataset,
    /// Delays of an ideal spherical head.
    Sphere,
}

fn parse_fft_size(s: &str) -> Result<usize, String> {
    let size = s.parse::<usize>().map_err(|e| e.to_string())?;
    if !size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&size) {
        return Err(format!(
            "expected a power of two from {MIN_FFT_SIZE} to {MAX_FFT_SIZE}"
        ));
    }
    Ok(size)
}

/// `none` disables limiting.
fn parse_limit(s: &str) -> Result<f64, String> {
    if s.eq_ignore_ascii_case("none") {
        return Ok(0.0);
    }
    let limit = s.parse::<f64>().map_err(|e| e.to_string())?;
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(format!("expected 'none' or a value from {MIN_LIMIT} to {MAX_LIMIT}"));
    }
    Ok(limit)
}

fn parse_radius(s: &str) -> Result<f64, String> {
    let radius = s.parse::<f64>().map_err(|e| e.to_string())?;
    if !(MIN_RADIUS..=MAX_RADIUS).contains(&radius) {
        return Err(format!("expected a value from {MIN_RADIUS} to {MAX_RADIUS}"));
    }
    Ok(radius)
}

/// Build a minimum-phase HRTF data set from a definition or SOFA file.
#[derive(Debug, Parser)]
#[command(name = "makemhr", version)]
pub struct CliArgs {
    /// Change the data set sample rate.
    #[arg(short = 'r', value_parser = clap::value_parser!(u32).range(MIN_RATE as i64..=MAX_RATE as i64))]
    pub rate: Option<u32>,

    /// Change the data set to mono, mirroring the left ear for the right ear.
    #[arg(short = 'm')]
    pub mono: bool,

    /// Change the data set to single field, using the farthest field.
    #[arg(short = 'a')]
    pub farfield: bool,

    /// Number of threads used to process HRIRs (0 to auto-detect).
    #[arg(short = 'j', default_value_t = DEFAULT_THREADS as u32, value_parser = clap::value_parser!(u32).range(0..=MAX_THREADS as i64))]
    pub threads: u32,

    /// FFT size used for processing HRIRs.
    #[arg(short = 'f', default_value_t = DEFAULT_FFT_SIZE, value_parser = parse_fft_size)]
    pub fft_size: usize,

    /// Diffuse-field equalization.
    #[arg(short = 'e', value_enum, default_value_t = Toggle::On)]
    pub equalize: Toggle,

    /// Surface-weighted diffuse-field average.
    #[arg(short = 's', value_enum, default_value_t = Toggle::On)]
    pub surface: Toggle,

    /// Limit the diffuse-field average's dynamic range, in dB, or 'none'.
    #[arg(short = 'l', default_value_t = DEFAULT_LIMIT, value_parser = parse_limit)]
    pub limit: f64,

    /// Number of minimum-phase points kept per HRIR.
    #[arg(short = 'w', default_value_t = DEFAULT_TRUNC_SIZE as u32, value_parser = clap::value_parser!(u32).range(MIN_TRUNC_SIZE as i64..=MAX_TRUNC_SIZE as i64))]
    pub trunc_size: u32,

    /// Model used for the interaural delays.
    #[arg(short = 'd', value_enum, default_value_t = DelayModel::Dataset)]
    pub delay_model: DelayModel,

    /// Use a custom head radius, in meters.
    #[arg(short = 'c', value_parser = parse_radius)]
    pub radius: Option<f64>,

    /// Input definition or SOFA file.  Standard input when omitted.
    #[arg(short = 'i')]
    pub input: Option<PathBuf>,

    /// Output file; '%r' is replaced with the sample rate.
    #[arg(short = 'o', default_value = DEFAULT_OUTPUT)]
    pub output: String,
}

impl CliArgs {
    pub fn to_options(&self) -> ProcessingOptions {
        let threads = match self.threads {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(DEFAULT_THREADS)
                .min(MAX_THREADS),
            n => n as usize,
        };
        ProcessingOptions {
            output_rate: self.rate,
            channel_mode: if self.mono {
                ChannelMode::ForceMono
            } else {
                ChannelMode::AllowStereo
            },
            farfield: self.farfield,
            threads,
            fft_size: self.fft_size,
            equalize: self.equalize == Toggle::On,
            surface: self.surface == Toggle::On,
            limit: self.limit,
            trunc_size: self.trunc_size as usize,
            head_model: match self.delay_model {
                DelayModel::Dataset => HeadModel::Dataset,
                DelayModel::Sphere => HeadModel::Sphere,
            },
            custom_radius: self.radius.unwrap_or(0.0),
            output: self.output.clone(),
        }
    }
}
