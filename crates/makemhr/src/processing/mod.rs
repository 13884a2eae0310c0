//! The stages run over a loaded dataset, in pipeline order: balancing, diffuse-field equalization, synthesis of
//! the missing lower elevations, minimum-phase reconstruction, normalization, and delay scaling.
pub mod accumulate;
pub mod balance;
pub mod diffuse_field;
pub mod hrtd;
pub mod normalize;
pub mod onset;
pub mod reconstruct;
pub mod synthesis;

pub use balance::balance_field_magnitudes;
pub use diffuse_field::{diffuse_field_average, diffuse_field_equalize, diffuse_field_weights};
pub use hrtd::{calculate_hrtds, spherical_head_delay};
pub use normalize::normalize_hrirs;
pub use reconstruct::reconstruct_hrirs;
pub use synthesis::{synthesize_hrirs, synthesize_onsets};

use crate::hrir_data::HrirData;

/// Storage indices of every measured (not synthesized) slot of field `fi`.
pub(crate) fn measured_indices(data: &HrirData, fi: usize) -> Vec<usize> {
    let field = &data.fields[fi];
    data.field_elevations(fi)[field.ev_start..]
        .iter()
        .flat_map(|e| data.elevation_azimuths(e).iter().map(|a| a.index))
        .collect()
}
