//! Building minimum-phase HRTF data sets (`.mhr`) from measured head-related impulse responses.
//!
//! A run reads a definition file (or a whole SOFA measurement set), decodes every referenced response into the
//! magnitude slots of an [hrir_data::HrirData] grid, equalizes, fills in the unmeasured lower elevations, rebuilds
//! minimum-phase impulse responses, and serializes the result.  [pipeline::process_definition] does all of it.
#[cfg(test)]
mod close_floats;
pub mod config;
pub mod definition;
pub mod error;
pub mod hrir_data;
pub mod mhr;
pub mod pipeline;
pub mod processing;
pub mod sofa;
pub mod sources;
pub mod token_reader;
mod worker_pool;

pub use error::{Error, Result};
