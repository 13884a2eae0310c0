//! Limits and defaults.

/// Sample rates accepted for datasets and for `-r`.
pub const MIN_RATE: u32 = 32000;
pub const MAX_RATE: u32 = 96000;

/// HRIR lengths accepted by the `points` metric.
pub const MIN_POINTS: u32 = 16;
pub const MAX_POINTS: u32 = 8192;

pub const MIN_FD_COUNT: usize = 1;
pub const MAX_FD_COUNT: usize = 16;

/// Field distances, in meters.
pub const MIN_DISTANCE: f64 = 0.05;
pub const MAX_DISTANCE: f64 = 2.5;

pub const MIN_EV_COUNT: usize = 5;
pub const MAX_EV_COUNT: usize = 181;

pub const MIN_AZ_COUNT: u32 = 1;
pub const MAX_AZ_COUNT: u32 = 255;

/// Head radius, in meters, both for the `radius` metric and `-c`.
pub const MIN_RADIUS: f64 = 0.05;
pub const MAX_RADIUS: f64 = 0.15;

/// Head radius assumed for SOFA inputs, which don't carry one.
pub const DEFAULT_SOFA_RADIUS: f64 = 0.09;

pub const MIN_FFT_SIZE: usize = 65536;
pub const MAX_FFT_SIZE: usize = 131072;
pub const DEFAULT_FFT_SIZE: usize = 65536;

/// Diffuse-field range limit, in dB.
pub const MIN_LIMIT: f64 = 2.0;
pub const MAX_LIMIT: f64 = 120.0;
pub const DEFAULT_LIMIT: f64 = 24.0;

pub const MIN_TRUNC_SIZE: usize = 16;
pub const MAX_TRUNC_SIZE: usize = 128;
pub const DEFAULT_TRUNC_SIZE: usize = 64;

/// Largest delay, in samples, the output format can carry.
pub const MAX_HRTD: f64 = 63.0;

pub const EPSILON: f64 = makemhr_dsp::minimum_phase::EPSILON;

/// Meters per second.
pub const SPEED_OF_SOUND: f64 = 343.3;

/// Onsets are searched for in responses upsampled by this much.
pub const ONSET_RATE_MULTIPLE: u32 = 10;

pub const DITHER_SEED: u64 = 22222;

pub const DEFAULT_THREADS: usize = 2;
pub const MAX_THREADS: usize = 64;

pub const DEFAULT_OUTPUT: &str = "./oalsoft_hrtf_%r.mhr";

/// Whether a stereo definition may stay stereo.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelMode {
    AllowStereo,
    ForceMono,
}

/// How propagation delays are obtained.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HeadModel {
    /// Measure onsets from the responses themselves.
    Dataset,
    /// Compute delays around a rigid sphere.
    Sphere,
}

/// Everything the pipeline needs besides the input itself.
#[derive(Clone, Debug)]
pub struct ProcessingOptions {
    /// Resample to this rate while loading.  `None` keeps the dataset's rate.
    pub output_rate: Option<u32>,
    pub channel_mode: ChannelMode,
    /// Keep only the farthest field.
    pub farfield: bool,
    pub threads: usize,
    pub fft_size: usize,
    pub equalize: bool,
    /// Weight the diffuse-field average by each measurement's coverage.
    pub surface: bool,
    /// dB range limit for the diffuse-field average; 0 disables it.
    pub limit: f64,
    pub trunc_size: usize,
    pub head_model: HeadModel,
    /// Head radius used for delays; 0 means the dataset's radius.
    pub custom_radius: f64,
    /// Output path; `%r` is replaced with the final sample rate.
    pub output: String,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        ProcessingOptions {
            output_rate: None,
            channel_mode: ChannelMode::AllowStereo,
            farfield: false,
            threads: DEFAULT_THREADS,
            fft_size: DEFAULT_FFT_SIZE,
            equalize: true,
            surface: true,
            limit: DEFAULT_LIMIT,
            trunc_size: DEFAULT_TRUNC_SIZE,
            head_model: HeadModel::Dataset,
            custom_radius: 0.0,
            output: DEFAULT_OUTPUT.to_string(),
        }
    }
}
