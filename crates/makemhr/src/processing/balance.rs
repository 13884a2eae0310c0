//! Bringing every field up to the loudest field's peak magnitude.
use crate::hrir_data::HrirData;
use crate::processing::measured_indices;

/// Scale each field's measured magnitude responses so that every field shares the dataset-wide peak.
pub fn balance_field_magnitudes(data: &mut HrirData) {
    let bins = data.bins();
    let channels = data.channels();
    let indices = (0..data.fields.len())
        .map(|fi| measured_indices(data, fi))
        .collect::<Vec<_>>();

    let field_max = indices
        .iter()
        .map(|field| {
            field
                .iter()
                .flat_map(|&index| (0..channels).map(move |ear| (index, ear)))
                .flat_map(|(index, ear)| data.hrir(index, ear)[..bins].iter().copied())
                .fold(0.0f64, f64::max)
        })
        .collect::<Vec<_>>();
    let overall = field_max.iter().copied().fold(0.0f64, f64::max);

    for (field, max) in indices.iter().zip(field_max) {
        let factor = overall / max;
        log::debug!("Balancing field by {factor}");
        for &index in field {
            for ear in 0..channels {
                for m in data.hrir_mut(index, ear)[..bins].iter_mut() {
                    *m *= factor;
                }
            }
        }
    }
}
