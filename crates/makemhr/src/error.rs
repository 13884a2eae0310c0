use std::path::PathBuf;

use makemhr_dsp::ResamplingError;

/// A malformed or out-of-range token in a definition (or ASCII source) file.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct ParseError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// Failure to decode one source reference.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Could not open source file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bad read from file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bad read from file '{path}': {source}")]
    Ascii {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("Not enough sample data in file '{path}'")]
    Truncated { path: PathBuf },

    #[error("No RIFF/RIFX chunk in file '{path}'")]
    NotRiff { path: PathBuf },

    #[error("Not a RIFF/RIFX WAVE file '{path}'")]
    NotWave { path: PathBuf },

    #[error("Unsupported WAVE format {format:#06x} in file '{path}'")]
    UnsupportedWaveFormat { path: PathBuf, format: u32 },

    #[error("Missing source channel {channel} in WAVE file '{path}' ({channels} channels)")]
    MissingChannel {
        path: PathBuf,
        channel: u32,
        channels: u32,
    },

    #[error("Mismatched source sample rate in '{path}': {found}, expected {expected}")]
    RateMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("Unsupported sample size {size} in WAVE file '{path}'")]
    UnsupportedSampleSize { path: PathBuf, size: u32 },

    #[error("Bad significant bits {bits} in WAVE file '{path}'")]
    BadSignificantBits { path: PathBuf, bits: u32 },

    #[error("Not enough samples in SOFA file '{path}'")]
    NotEnoughSofaSamples { path: PathBuf },

    #[error("Missing source receiver {receiver} in SOFA file '{path}'")]
    MissingReceiver { path: PathBuf, receiver: u32 },

    #[error(
        "No impulse response at coordinates ({radius:.3}r, {elevation:.1}ev, {azimuth:.1}az) in file '{path}'; nearest candidate at ({nearest_radius:.3}r, {nearest_elevation:.1}ev, {nearest_azimuth:.1}az)"
    )]
    NoSofaMeasurement {
        path: PathBuf,
        radius: f64,
        elevation: f64,
        azimuth: f64,
        nearest_radius: f64,
        nearest_elevation: f64,
        nearest_azimuth: f64,
    },

    #[error("Could not load SOFA file '{path}': {source}")]
    Sofa {
        path: PathBuf,
        #[source]
        source: SofaError,
    },

    #[error("Could not resample '{path}': {source}")]
    Resampling {
        path: PathBuf,
        #[source]
        source: ResamplingError,
    },
}

/// The grid was not filled in exactly once.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("Redefinition of source [ {field}, {elevation}, {azimuth} ]")]
    Redefinition {
        field: usize,
        elevation: usize,
        azimuth: usize,
    },

    #[error("Missing source references [ {field}, *, * ]")]
    MissingField { field: usize },

    #[error("Missing source reference [ {field}, {elevation}, {azimuth} ]")]
    MissingSource {
        field: usize,
        elevation: usize,
        azimuth: usize,
    },

    #[error("Missing {ear} ear source reference(s) for [ {field}, {elevation}, {azimuth} ]")]
    MissingEar {
        ear: &'static str,
        field: usize,
        elevation: usize,
        azimuth: usize,
    },
}

/// Problems with a SOFA measurement set as a whole.
#[derive(Debug, thiserror::Error)]
pub enum SofaError {
    #[error("SOFA containers are not supported by this reader ('{0}')")]
    Unsupported(PathBuf),

    #[error("Could not load '{path}': {reason} ({code})")]
    Load {
        path: PathBuf,
        code: i32,
        reason: &'static str,
    },

    #[error("Could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} emitters not supported")]
    Emitters(usize),

    #[error("{0} receivers not supported")]
    Receivers(usize),

    #[error("Sample points exceeds the FFT size ({points} > {fft_size})")]
    TooManyPoints { points: usize, fft_size: usize },

    #[error("Sample points is below the truncation size ({points} < {trunc_size})")]
    TooFewPoints { points: usize, trunc_size: usize },

    #[error("Sample rate out of range: {0} (expected 32000 to 96000)")]
    RateOutOfRange(f64),

    #[error("Malformed measurement set: {0}")]
    Malformed(&'static str),

    #[error("Incompatible layout: {0}")]
    IncompatibleLayout(&'static str),
}

/// Invalid processing options.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("FFT size {0} is not a power of two")]
    FftSizeNotPowerOfTwo(usize),

    #[error("Truncation size {trunc_size} is larger than the FFT size {fft_size}")]
    TruncationTooLarge { trunc_size: usize, fft_size: usize },

    #[error("At least one worker thread is required")]
    NoThreads,
}

/// Writing the output dataset failed.
#[derive(Debug, thiserror::Error)]
#[error("Could not write MHR file '{path}': {source}")]
pub struct OutputError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, derive_more::Display, derive_more::IsVariant)]
enum ErrorPayload {
    #[display(fmt = "Parse error: {}", _0)]
    Parse(ParseError),

    #[display(fmt = "Source error: {}", _0)]
    Source(SourceError),

    #[display(fmt = "Consistency error: {}", _0)]
    Consistency(ConsistencyError),

    #[display(fmt = "SOFA error: {}", _0)]
    Sofa(SofaError),

    #[display(fmt = "Output error: {}", _0)]
    Output(OutputError),

    #[display(fmt = "Resampling error: {}", _0)]
    Resampling(ResamplingError),

    #[display(fmt = "Configuration error: {}", _0)]
    Config(ConfigError),
}

#[derive(Debug, thiserror::Error)]
#[error("{payload}")]
pub struct Error {
    payload: ErrorPayload,
}

macro_rules! conv {
    ($variant: ident, $from_err: path) => {
        impl From<$from_err> for Error {
            fn from(value: $from_err) -> Error {
                Error {
                    payload: ErrorPayload::$variant(value),
                }
            }
        }
    };
}

conv!(Parse, ParseError);
conv!(Source, SourceError);
conv!(Consistency, ConsistencyError);
conv!(Sofa, SofaError);
conv!(Output, OutputError);
conv!(Resampling, ResamplingError);
conv!(Config, ConfigError);

impl Error {
    pub fn is_parse(&self) -> bool {
        self.payload.is_parse()
    }

    pub fn is_source(&self) -> bool {
        self.payload.is_source()
    }

    pub fn is_consistency(&self) -> bool {
        self.payload.is_consistency()
    }

    pub fn is_sofa(&self) -> bool {
        self.payload.is_sofa()
    }

    pub fn is_output(&self) -> bool {
        self.payload.is_output()
    }

    pub fn is_config(&self) -> bool {
        self.payload.is_config()
    }

    /// The parse error, if this is one.  Useful to get at the position.
    pub fn as_parse(&self) -> Option<&ParseError> {
        match &self.payload {
            ErrorPayload::Parse(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_consistency(&self) -> Option<&ConsistencyError> {
        match &self.payload {
            ErrorPayload::Consistency(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
