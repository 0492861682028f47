use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Aperture stops the simulated sensors can report.
pub const APERTURES: [f64; 5] = [2.8, 5.0, 5.6, 8.0, 11.0];

/// ISO values the simulated sensors can report.
pub const ISOS: [u32; 6] = [50, 100, 200, 400, 800, 1600];

pub const EXPOSURE_TIME_MIN_S: f64 = 0.00125;
pub const EXPOSURE_TIME_MAX_S: f64 = 2.0;

/// Exposure telemetry attached to one picture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PictureMetadata {
    pub exposure_time_s: f64,
    pub aperture: f64,
    pub iso: u32,
}

/// Strategy producing per-picture metadata.
///
/// The values are illustrative telemetry and are not derived from pixels,
/// so tests can substitute `FixedMetadata`.
pub trait MetadataSource: Send + Sync {
    fn next_metadata(&self) -> PictureMetadata;
}

/// Independent random draws from the sensor's discrete ISO/aperture sets and
/// a continuous exposure range (rounded to 2 decimals).
pub struct RandomMetadata {
    rng: Mutex<StdRng>,
}

impl RandomMetadata {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataSource for RandomMetadata {
    fn next_metadata(&self) -> PictureMetadata {
        // A poisoned rng is still a valid rng.
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let iso = *ISOS.choose(&mut *rng).unwrap_or(&ISOS[0]);
        let aperture = *APERTURES.choose(&mut *rng).unwrap_or(&APERTURES[0]);
        let exposure = rng.gen_range(EXPOSURE_TIME_MIN_S..=EXPOSURE_TIME_MAX_S);
        PictureMetadata {
            exposure_time_s: round_to_hundredths(exposure),
            aperture,
            iso,
        }
    }
}

/// Always returns the same metadata.
#[derive(Clone, Copy, Debug)]
pub struct FixedMetadata(pub PictureMetadata);

impl MetadataSource for FixedMetadata {
    fn next_metadata(&self) -> PictureMetadata {
        self.0
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_metadata_draws_from_sensor_sets() {
        let source = RandomMetadata::with_seed(42);
        for _ in 0..200 {
            let meta = source.next_metadata();
            assert!(ISOS.contains(&meta.iso));
            assert!(APERTURES.contains(&meta.aperture));
            assert!((0.0..=EXPOSURE_TIME_MAX_S).contains(&meta.exposure_time_s));
            let hundredths = meta.exposure_time_s * 100.0;
            assert!((hundredths - hundredths.round()).abs() < 1e-6);
        }
    }

    #[test]
    fn fixed_metadata_is_constant() {
        let meta = PictureMetadata {
            exposure_time_s: 0.5,
            aperture: 8.0,
            iso: 400,
        };
        let source = FixedMetadata(meta);
        assert_eq!(source.next_metadata(), meta);
        assert_eq!(source.next_metadata(), meta);
    }
}
