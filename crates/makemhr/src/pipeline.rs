//! One run of the tool: load, process, store.
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::{HeadModel, ProcessingOptions};
use crate::definition::load_definition;
use crate::error::{ConfigError, Result, SourceError};
use crate::hrir_data::HrirData;
use crate::mhr::store_mhr;
use crate::processing::*;
use crate::sofa::{load_sofa_input, SofaCache, SofaReader};

/// The first bytes of an HDF5 container, and so of every SOFA file.
const HDF5_MAGIC: &[u8; 4] = b"\x89HDF";

/// Check the options the CLI can't rule out by itself.
pub fn validate_options(options: &ProcessingOptions) -> Result<(), ConfigError> {
    if !options.fft_size.is_power_of_two() {
        return Err(ConfigError::FftSizeNotPowerOfTwo(options.fft_size));
    }
    if options.trunc_size > options.fft_size {
        return Err(ConfigError::TruncationTooLarge {
            trunc_size: options.trunc_size,
            fft_size: options.fft_size,
        });
    }
    if options.threads == 0 {
        return Err(ConfigError::NoThreads);
    }
    Ok(())
}

/// Replace every `%r` (either case) in `template` with `rate`.
pub fn output_path(template: &str, rate: u32) -> PathBuf {
    let rate = rate.to_string();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' && matches!(chars.peek(), Some('r' | 'R')) {
            chars.next();
            out.push_str(&rate);
        } else {
            out.push(c);
        }
    }
    PathBuf::from(out)
}

/// Read up to four bytes, stopping early only at the end of the input.
fn read_prefix<R: Read>(input: &mut R) -> std::io::Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(HDF5_MAGIC.len());
    input.take(HDF5_MAGIC.len() as u64).read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// Load a dataset from `path`, which is either a definition file or a SOFA file.
fn load_file(path: &Path, options: &ProcessingOptions, reader: &dyn SofaReader) -> Result<HrirData> {
    let mut file = File::open(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let prefix = read_prefix(&mut file).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if prefix == HDF5_MAGIC {
        return load_sofa_input(reader, path, options);
    }

    log::info!("Reading HRIR definition from {}...", path.display());
    let mut cache = SofaCache::new(reader);
    load_definition(file, &path.to_string_lossy(), &prefix, options, &mut cache)
}

/// Run every processing stage over a freshly loaded dataset, leaving final impulse responses and delays in samples.
pub fn process_hrirs(data: &mut HrirData, options: &ProcessingOptions) {
    if options.equalize {
        if data.fields.len() > 1 {
            log::info!("Normalizing field magnitudes...");
            balance_field_magnitudes(data);
        }
        log::info!("Calculating diffuse-field average...");
        let dfa = diffuse_field_average(data, options.surface, options.limit);
        log::info!("Performing diffuse-field equalization...");
        diffuse_field_equalize(data, &dfa);
    }

    if data.fields.len() > 1 {
        log::info!("Sorting {} fields...", data.fields.len());
        data.fields.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        if options.farfield {
            log::info!("Clearing near fields...");
            let last = data.fields.len() - 1;
            data.fields.drain(..last);
        }
    }

    if options.head_model == HeadModel::Dataset {
        log::info!("Synthesizing missing elevations...");
        synthesize_onsets(data);
    }
    log::info!("Synthesizing missing HRIRs...");
    synthesize_hrirs(data);

    log::info!(
        "Performing minimum phase reconstruction and truncating to {} points...",
        options.trunc_size
    );
    data.ir_points = options.trunc_size;
    reconstruct_hrirs(data, options.threads);

    log::info!("Normalizing final HRIRs...");
    let factor = normalize_hrirs(data);
    log::debug!("Normalization factor {factor}");

    let radius = if options.custom_radius > 0.0 {
        options.custom_radius
    } else {
        data.radius
    };
    log::info!("Calculating impulse delays...");
    calculate_hrtds(data, options.head_model, radius);
}

/// Run the whole pipeline on `input` (standard input when `None`) and return the path written.
///
/// An input starting with the HDF5 signature is read as a SOFA measurement set through `reader`; anything else is
/// a definition file, whose SOFA source references also go through `reader`.
pub fn process_definition(
    input: Option<&Path>,
    options: &ProcessingOptions,
    reader: &dyn SofaReader,
) -> Result<PathBuf> {
    validate_options(options)?;

    let mut data = match input {
        Some(path) => load_file(path, options, reader)?,
        None => {
            log::info!("Reading HRIR definition from stdin...");
            let mut cache = SofaCache::new(reader);
            load_definition(std::io::stdin().lock(), "stdin", &[], options, &mut cache)?
        }
    };

    process_hrirs(&mut data, options);

    let path = output_path(&options.output, data.ir_rate);
    log::info!("Creating MHR data set {}...", path.display());
    store_mhr(&data, &path)?;
    Ok(path)
}
