//! The HRIR definition format.
//!
//! A definition is a block of metrics followed by a list of source assignments:
//!
//! ```text
//! rate = 44100
//! type = stereo
//! points = 256
//! radius = 0.09
//! distance = 1.0
//! azimuths = 1, 8, 8, 8, 1
//!
//! [ 1, 0 ] = wave(0): "az0.wav" left + wave(1): "az0.wav" right
//! [ * ] = sofa: "measured.sofa" stereo
//! ```
//!
//! Metric keys and identifiers are case-insensitive.  The field index of a triplet is only given when there is more
//! than one field.
use std::io::Read;

use crate::config::*;
use crate::error::{ConsistencyError, Result};
use crate::hrir_data::{ChannelType, FieldLayout, HrirData, EAR_NAMES};
use crate::processing::accumulate::{OnsetMode, SourceAccumulator};
use crate::sofa::{grid_slot, SofaCache};
use crate::sources::{load_set, SourceFormat, SourceRef};
use crate::token_reader::{ParseResult, TokenReader};

/// Everything in the metrics block.
#[derive(Clone, Debug, PartialEq)]
pub struct Metrics {
    pub rate: u32,
    pub channel_type: ChannelType,
    pub points: usize,
    pub radius: f64,
    pub fields: Vec<FieldLayout>,
}

fn match_channel_type(ident: &str) -> Option<ChannelType> {
    if ident.eq_ignore_ascii_case("mono") {
        Some(ChannelType::Mono)
    } else if ident.eq_ignore_ascii_case("stereo") {
        Some(ChannelType::Stereo)
    } else {
        None
    }
}

fn match_ear(ident: &str) -> Option<usize> {
    EAR_NAMES.iter().position(|e| e.eq_ignore_ascii_case(ident))
}

const METRIC_NAMES: [&str; 6] = ["rate", "type", "points", "radius", "distance", "azimuths"];

/// Parse the metrics block.
pub fn read_metrics<R: Read>(tr: &mut TokenReader<R>, options: &ProcessingOptions) -> ParseResult<Metrics> {
    let mut seen = [false; METRIC_NAMES.len()];
    let mut rate = 0;
    let mut channel_type = None;
    let mut points = 0;
    let mut radius = 0.0;
    let mut distances: Vec<f64> = vec![];
    let mut az_counts: Vec<Vec<usize>> = vec![];

    while tr.is_ident()? {
        let (line, column) = tr.position()?;
        let ident = tr.read_ident()?;
        let key = METRIC_NAMES
            .iter()
            .position(|m| m.eq_ignore_ascii_case(&ident))
            .ok_or_else(|| tr.error_at(line, column, "Expected a metric name."))?;
        if seen[key] {
            return Err(tr.error_at(
                line,
                column,
                format!("Redefinition of '{}'.", METRIC_NAMES[key]),
            ));
        }
        seen[key] = true;
        tr.read_operator("=")?;

        match METRIC_NAMES[key] {
            "rate" => rate = tr.read_int(MIN_RATE as i64, MAX_RATE as i64)? as u32,
            "type" => {
                let ident = tr.read_ident()?;
                let t = match_channel_type(&ident)
                    .ok_or_else(|| tr.error_at(line, column, "Expected a channel type."))?;
                channel_type = Some(match (t, options.channel_mode) {
                    (ChannelType::Stereo, ChannelMode::ForceMono) => ChannelType::Mono,
                    (t, _) => t,
                });
            }
            "points" => {
                let (line, column) = tr.position()?;
                let value = tr.read_int(MIN_POINTS as i64, MAX_POINTS as i64)? as usize;
                if value > options.fft_size {
                    return Err(tr.error_at(line, column, "Value exceeds the overridden FFT size."));
                }
                if value < options.trunc_size {
                    return Err(tr.error_at(line, column, "Value is below the truncation size."));
                }
                points = value;
            }
            "radius" => radius = tr.read_float(MIN_RADIUS, MAX_RADIUS)?,
            "distance" => {
                loop {
                    let d = tr.read_float(MIN_DISTANCE, MAX_DISTANCE)?;
                    if distances.last().is_some_and(|last| d <= *last) {
                        return Err(tr.error("Distances are not ascending."));
                    }
                    distances.push(d);
                    if !tr.is_operator(",")? {
                        break;
                    }
                    if distances.len() >= MAX_FD_COUNT {
                        return Err(tr.error(format!(
                            "Exceeded the maximum of {MAX_FD_COUNT} fields."
                        )));
                    }
                    tr.read_operator(",")?;
                }
                if !az_counts.is_empty() && az_counts.len() != distances.len() {
                    return Err(tr.error(format!(
                        "Did not match the specified number of {} fields.",
                        az_counts.len()
                    )));
                }
            }
            "azimuths" => {
                let mut field = vec![];
                loop {
                    field.push(tr.read_int(MIN_AZ_COUNT as i64, MAX_AZ_COUNT as i64)? as usize);
                    if tr.is_operator(",")? {
                        if field.len() >= MAX_EV_COUNT {
                            return Err(tr.error(format!(
                                "Exceeded the maximum of {MAX_EV_COUNT} elevations."
                            )));
                        }
                        tr.read_operator(",")?;
                        continue;
                    }

                    if field.len() < MIN_EV_COUNT {
                        return Err(tr.error_at(
                            line,
                            column,
                            format!("Did not reach the minimum of {MIN_EV_COUNT} azimuth counts."),
                        ));
                    }
                    if field.first() != Some(&1) || field.last() != Some(&1) {
                        return Err(tr.error(format!(
                            "Poles are not singular for field {}.",
                            az_counts.len()
                        )));
                    }
                    az_counts.push(std::mem::take(&mut field));
                    if !tr.is_operator(";")? {
                        break;
                    }
                    if az_counts.len() >= MAX_FD_COUNT {
                        return Err(tr.error(format!(
                            "Exceeded the maximum of {MAX_FD_COUNT} fields."
                        )));
                    }
                    tr.read_operator(";")?;
                }
                if !distances.is_empty() && az_counts.len() != distances.len() {
                    return Err(tr.error(format!(
                        "Did not match the specified number of {} fields.",
                        distances.len()
                    )));
                }
            }
            _ => unreachable!(),
        }
    }

    // `type` is optional.
    let required = [0, 2, 3, 4, 5];
    if required.iter().any(|k| !seen[*k]) {
        return Err(tr.error("Expected a metric name."));
    }
    if distances[0] < radius {
        return Err(tr.error("Distance cannot start below head radius."));
    }

    Ok(Metrics {
        rate,
        channel_type: channel_type.unwrap_or(ChannelType::Mono),
        points,
        radius,
        fields: distances
            .into_iter()
            .zip(az_counts)
            .map(|(distance, az_counts)| FieldLayout {
                distance,
                az_counts,
            })
            .collect(),
    })
}

/// Parse `[fi, ei, ai]`'s contents, where `fi` only appears for multi-field datasets.
fn read_index_triplet<R: Read>(
    tr: &mut TokenReader<R>,
    data: &HrirData,
) -> ParseResult<(usize, usize, usize)> {
    let fi = if data.fields.len() > 1 {
        let fi = tr.read_int(0, data.fields.len() as i64 - 1)? as usize;
        tr.read_operator(",")?;
        fi
    } else {
        0
    };
    let ei = tr.read_int(0, data.elevation_count(fi) as i64 - 1)? as usize;
    tr.read_operator(",")?;
    let ai = tr.read_int(0, data.azimuth_count(fi, ei) as i64 - 1)? as usize;
    Ok((fi, ei, ai))
}

struct SourceLoader<'c, 's> {
    cache: &'c mut SofaCache<'s>,
    accumulator: SourceAccumulator,
    hrir: Vec<f64>,
    files: usize,
}

impl<'c, 's> SourceLoader<'c, 's> {
    /// Assign every measurement of a SOFA file that lands on the grid.
    fn load_bulk_sofa(&mut self, data: &mut HrirData, src: &SourceRef, stereo: bool) -> Result<()> {
        let points = data.ir_points;
        let receivers = if stereo { 2 } else { 1 };
        let set = load_set(
            self.cache,
            &src.path,
            data.ir_rate,
            receivers,
            src.offset as usize,
            points,
        )?;

        let total = set.measurements();
        for (m, position) in set.positions.iter().enumerate() {
            log::debug!("Loading sources... {} of {}", m + 1, total);
            let Some((fi, ei, ai)) = grid_slot(data, *position) else {
                continue;
            };
            let pos = data.azimuth_position(fi, ei, ai);
            if data.azimuths[pos].loaded[0] {
                return Err(ConsistencyError::Redefinition {
                    field: fi,
                    elevation: ei,
                    azimuth: ai,
                }
                .into());
            }

            for ear in 0..receivers {
                let impulse = set.impulse(m, ear, src.offset as usize);
                self.accumulator
                    .accumulate(data, pos, ear, &impulse[..points], 1.0, OnsetMode::Peak)?;
            }
        }
        Ok(())
    }

    /// One `[fi, ei, ai] = src [ear] + src [ear] ...` block, after the opening bracket.
    fn load_slot<R: Read>(&mut self, tr: &mut TokenReader<R>, data: &mut HrirData) -> Result<()> {
        let (fi, ei, ai) = read_index_triplet(tr, data)?;
        tr.read_operator("]")?;
        let pos = data.azimuth_position(fi, ei, ai);
        if data.azimuths[pos].loaded[0] {
            return Err(ConsistencyError::Redefinition {
                field: fi,
                elevation: ei,
                azimuth: ai,
            }
            .into());
        }
        tr.read_operator("=")?;

        let stereo = data.channel_type == ChannelType::Stereo;
        let mut factor = [1.0f64; 2];
        loop {
            let src = SourceRef::parse(tr)?;
            self.files += 1;
            log::debug!("Loading sources... {} file(s)", self.files);

            let points = data.ir_points;
            src.load(data.ir_rate, self.cache, &mut self.hrir[..points])?;

            let ear = if stereo {
                let (line, column) = tr.position()?;
                let ident = tr.read_ident()?;
                match_ear(&ident).ok_or_else(|| tr.error_at(line, column, "Expected a target ear."))?
            } else {
                0
            };

            self.accumulator.accumulate(
                data,
                pos,
                ear,
                &self.hrir[..points],
                1.0 / factor[ear],
                OnsetMode::Peak,
            )?;
            factor[ear] += 1.0;

            if !tr.eat_operator("+")? {
                break;
            }
        }

        if stereo {
            for (ear, name) in EAR_NAMES.iter().enumerate() {
                if !data.azimuths[pos].loaded[ear] {
                    return Err(ConsistencyError::MissingEar {
                        ear: *name,
                        field: fi,
                        elevation: ei,
                        azimuth: ai,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

/// Parse the source list and decode every source into `data`.
pub fn read_sources<R: Read>(
    tr: &mut TokenReader<R>,
    data: &mut HrirData,
    options: &ProcessingOptions,
    cache: &mut SofaCache,
) -> Result<()> {
    let accumulator = SourceAccumulator::new(data.ir_rate, options.output_rate, data.ir_points, data.fft_size);
    let mut loader = SourceLoader {
        cache,
        accumulator,
        hrir: vec![0.0; data.ir_size],
        files: 0,
    };

    log::info!("Loading sources...");
    while tr.is_operator("[")? {
        tr.read_operator("[")?;

        if tr.eat_operator("*")? {
            tr.read_operator("]")?;
            tr.read_operator("=")?;
            let (line, column) = tr.position()?;
            let mut src = SourceRef::parse_bulk_sofa(tr)?;

            let ident = tr.read_ident()?;
            let stereo = match (data.channel_type, match_channel_type(&ident)) {
                (ChannelType::Stereo, Some(t)) => t == ChannelType::Stereo,
                (ChannelType::Stereo, None) => {
                    return Err(tr.error_at(line, column, "Expected a channel type.").into())
                }
                (ChannelType::Mono, Some(ChannelType::Mono)) => false,
                (ChannelType::Mono, _) => {
                    return Err(tr.error_at(line, column, "Expected a mono channel type.").into())
                }
            };
            if let SourceFormat::Sofa { channel, .. } = &mut src.format {
                *channel = stereo as u32;
            }
            loader.load_bulk_sofa(data, &src, stereo)?;
            continue;
        }

        loader.load_slot(tr, data)?;
    }
    log::info!("Loaded {} source file(s)", loader.files);

    data.ir_rate = loader.accumulator.final_rate();
    data.ir_points = loader.accumulator.ir_points();
    data.resolve_ev_starts()?;

    if !tr.at_end()? {
        return Err(tr.error("Errant data at end of source list.").into());
    }
    Ok(())
}

/// Read a whole definition.  `prefix` holds bytes already consumed from `input` while sniffing its type.
pub fn load_definition<R: Read>(
    input: R,
    name: &str,
    prefix: &[u8],
    options: &ProcessingOptions,
    cache: &mut SofaCache,
) -> Result<HrirData> {
    let mut tr = TokenReader::with_prefix(input, name, prefix);
    let metrics = read_metrics(&mut tr, options)?;
    log::debug!("Metrics: {:?}", metrics);

    let mut data = HrirData::new(
        metrics.rate,
        metrics.channel_type,
        metrics.points,
        options.fft_size,
        metrics.radius,
        &metrics.fields,
    );
    read_sources(&mut tr, &mut data, options, cache)?;
    Ok(data)
}
