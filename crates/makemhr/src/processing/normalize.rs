//! Level normalization of the reconstructed impulse responses.
use crate::hrir_data::HrirData;

/// Headroom left below full scale for the loudest sample.
const MAX_PEAK: f64 = 0.99;

/// Scale every response so that the loudest RMS matches that of a unit impulse of the same length, unless that would
/// push a sample past [MAX_PEAK].  Returns the factor applied, which is 1 for an all-silent dataset.
pub fn normalize_hrirs(data: &mut HrirData) -> f64 {
    let points = data.ir_points;
    let order = data.slot_order();

    let (max_amp, max_rms) = order.iter().fold((0.0f64, 0.0f64), |(amp, rms), &(pos, ear)| {
        let ir = &data.hrir(data.azimuths[pos].index, ear)[..points];
        let peak = ir.iter().fold(0.0f64, |m, s| m.max(s.abs()));
        let power = ir.iter().map(|s| s * s).sum::<f64>() / points as f64;
        (amp.max(peak), rms.max(power.sqrt()))
    });

    if max_amp == 0.0 {
        log::warn!("Every HRIR is silent; skipping normalization");
        return 1.0;
    }

    let factor = ((1.0 / points as f64).sqrt() / max_rms).min(MAX_PEAK / max_amp);
    log::debug!("Normalizing by {factor} (peak {max_amp}, RMS {max_rms})");

    for slot in data.slots_mut(&order) {
        for s in slot[..points].iter_mut() {
            *s *= factor;
        }
    }
    factor
}
