use std::path::Path;
use std::sync::Arc;

use crate::error::SourceError;
use crate::sofa::{cartesian_to_spherical, spherical_to_cartesian, SofaCache, SofaMeasurements};

/// Maximum per-axis distance, in meters, between the requested position and the measurement used.
const POSITION_TOLERANCE: f64 = 0.001;

/// Fetch a measurement set for a dataset at `rate`, requiring `receivers` receivers with `offset + points` samples.
pub fn load_set(
    cache: &mut SofaCache,
    path: &Path,
    rate: u32,
    receivers: usize,
    offset: usize,
    points: usize,
) -> Result<Arc<SofaMeasurements>, SourceError> {
    let set = cache.load(path, rate).map_err(|source| SourceError::Sofa {
        path: path.to_path_buf(),
        source,
    })?;

    if offset + points > set.samples {
        return Err(SourceError::NotEnoughSofaSamples {
            path: path.to_path_buf(),
        });
    }
    if receivers > set.receivers {
        return Err(SourceError::MissingReceiver {
            path: path.to_path_buf(),
            receiver: receivers as u32 - 1,
        });
    }
    Ok(set)
}

/// Copy the measurement at `aer` (azimuth°, elevation°, radius) for `channel`, starting `offset` samples in.
pub fn load_sofa(
    cache: &mut SofaCache,
    path: &Path,
    rate: u32,
    aer: [f64; 3],
    channel: u32,
    offset: u32,
    out: &mut [f64],
) -> Result<(), SourceError> {
    let set = load_set(
        cache,
        path,
        rate,
        channel as usize + 1,
        offset as usize,
        out.len(),
    )?;

    let target = spherical_to_cartesian(aer);
    let not_found = |nearest: [f64; 3]| SourceError::NoSofaMeasurement {
        path: path.to_path_buf(),
        radius: aer[2],
        elevation: aer[1],
        azimuth: aer[0],
        nearest_radius: nearest[2],
        nearest_elevation: nearest[1],
        nearest_azimuth: nearest[0],
    };
    let nearest = set.nearest(target).ok_or_else(|| not_found([0.0; 3]))?;
    let found = set.positions[nearest];
    if (0..3).any(|i| (found[i] - target[i]).abs() > POSITION_TOLERANCE) {
        return Err(not_found(cartesian_to_spherical(found)));
    }

    let impulse = set.impulse(nearest, channel as usize, offset as usize);
    out.copy_from_slice(&impulse[..out.len()]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    use crate::sofa::test_util::*;

    fn reader() -> MemorySofaReader {
        let mut reader = MemorySofaReader::default();
        reader.sets.insert(
            PathBuf::from("set.sofa"),
            measurement_set(
                44100.0,
                2,
                16,
                &[[0.0, 0.0, 1.0], [90.0, 0.0, 1.0], [270.0, 30.0, 1.0]],
                |m, r| m * 2 + r,
            ),
        );
        reader
    }

    #[test]
    fn test_lookup() {
        let reader = reader();
        let mut cache = SofaCache::new(&reader);
        let mut out = [0.0; 8];

        load_sofa(&mut cache, Path::new("set.sofa"), 44100, [-90.0, 30.0, 1.0], 1, 0, &mut out).unwrap();
        assert_eq!(out[5], 1.0);
        assert_eq!(out.iter().sum::<f64>(), 1.0);

        load_sofa(&mut cache, Path::new("set.sofa"), 44100, [90.0, 0.0, 1.0], 0, 1, &mut out).unwrap();
        assert_eq!(out[1], 1.0);
    }

    #[test]
    fn test_other_rates_are_used_as_is() {
        let reader = reader();
        let mut cache = SofaCache::new(&reader);
        let mut out = [0.0; 8];
        load_sofa(&mut cache, Path::new("set.sofa"), 48000, [90.0, 0.0, 1.0], 1, 0, &mut out).unwrap();
        assert_eq!(out[3], 1.0);
        assert_eq!(out.iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn test_errors() {
        let reader = reader();
        let mut cache = SofaCache::new(&reader);
        let path = Path::new("set.sofa");
        let mut out = [0.0; 8];

        let err = load_sofa(&mut cache, path, 44100, [45.0, 0.0, 1.0], 0, 0, &mut out).unwrap_err();
        let SourceError::NoSofaMeasurement {
            nearest_azimuth,
            nearest_radius,
            ..
        } = err
        else {
            panic!("{err:?}");
        };
        assert!((nearest_radius - 1.0).abs() < 1e-9);
        assert!(nearest_azimuth.abs() < 1e-6 || (nearest_azimuth - 90.0).abs() < 1e-6);

        assert!(matches!(
            load_sofa(&mut cache, path, 44100, [0.0, 0.0, 1.0], 2, 0, &mut out),
            Err(SourceError::MissingReceiver { receiver: 2, .. })
        ));
        assert!(matches!(
            load_sofa(&mut cache, path, 44100, [0.0, 0.0, 1.0], 0, 9, &mut out),
            Err(SourceError::NotEnoughSofaSamples { .. })
        ));
        assert!(matches!(
            load_sofa(&mut cache, Path::new("other.sofa"), 44100, [0.0, 0.0, 1.0], 0, 0, &mut out),
            Err(SourceError::Sofa { .. })
        ));
    }
}
