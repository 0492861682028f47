use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::VelocitySource;

/// Shape of the synthetic velocity signal.
#[derive(Clone, Debug)]
pub struct SyntheticVelocityConfig {
    /// Nominal fabric speed in cm/min.
    pub base_cm_per_min: f64,
    /// Uniform jitter applied around the base (± this value).
    pub jitter_cm_per_min: f64,
    /// Probability that a sample is a spike (3x-5x base), in `[0, 1]`.
    pub spike_probability: f64,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl SyntheticVelocityConfig {
    /// Rejects shapes the sampler cannot draw from.
    pub fn validate(&self) -> Result<()> {
        if !self.base_cm_per_min.is_finite() {
            return Err(anyhow!("base velocity must be a finite number"));
        }
        if !(self.jitter_cm_per_min.is_finite() && self.jitter_cm_per_min >= 0.0) {
            return Err(anyhow!("velocity jitter must be finite and not negative"));
        }
        if !(0.0..=1.0).contains(&self.spike_probability) {
            return Err(anyhow!("spike probability must be within [0, 1]"));
        }
        Ok(())
    }
}

impl Default for SyntheticVelocityConfig {
    fn default() -> Self {
        Self {
            base_cm_per_min: 30.0,
            jitter_cm_per_min: 2.0,
            spike_probability: 0.02,
            seed: None,
        }
    }
}

/// Simulated surface velocity sensor.
///
/// Mostly returns `base ± jitter`; with `spike_probability` it returns a
/// reading several times the base, which is what the IQR filter downstream
/// is there to reject.
pub struct SyntheticVelocitySensor {
    config: SyntheticVelocityConfig,
    rng: StdRng,
    active: bool,
    samples_taken: u64,
}

impl SyntheticVelocitySensor {
    pub fn new(config: SyntheticVelocityConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            active: false,
            samples_taken: 0,
        }
    }

    pub fn samples_taken(&self) -> u64 {
        self.samples_taken
    }
}

impl VelocitySource for SyntheticVelocitySensor {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn start_acquisition(&mut self) -> Result<()> {
        if self.active {
            return Err(anyhow!(
                "velocity sensor already acquiring; call stop_acquisition() first"
            ));
        }
        self.config.validate()?;
        self.active = true;
        Ok(())
    }

    fn get_sample(&mut self) -> Result<f64> {
        if !self.active {
            return Err(anyhow!(
                "velocity sensor not acquiring; call start_acquisition() first"
            ));
        }
        self.samples_taken += 1;

        let base = self.config.base_cm_per_min;
        if self.config.spike_probability > 0.0 && self.rng.gen_bool(self.config.spike_probability)
        {
            return Ok(base * self.rng.gen_range(3.0..=5.0));
        }
        let jitter = self.config.jitter_cm_per_min;
        if jitter <= 0.0 {
            return Ok(base);
        }
        Ok(base + self.rng.gen_range(-jitter..=jitter))
    }

    fn stop_acquisition(&mut self) -> Result<()> {
        if !self.active {
            return Err(anyhow!("velocity sensor is not acquiring"));
        }
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(spike_probability: f64) -> SyntheticVelocitySensor {
        SyntheticVelocitySensor::new(SyntheticVelocityConfig {
            base_cm_per_min: 30.0,
            jitter_cm_per_min: 2.0,
            spike_probability,
            seed: Some(7),
        })
    }

    #[test]
    fn sample_requires_active_acquisition() {
        let mut sensor = seeded(0.0);
        assert!(sensor.get_sample().is_err());
        sensor.start_acquisition().unwrap();
        assert!(sensor.get_sample().is_ok());
        sensor.stop_acquisition().unwrap();
        assert!(sensor.get_sample().is_err());
    }

    #[test]
    fn out_of_order_lifecycle_is_rejected() {
        let mut sensor = seeded(0.0);
        assert!(sensor.stop_acquisition().is_err());
        sensor.start_acquisition().unwrap();
        assert!(sensor.start_acquisition().is_err());
        assert!(sensor.is_active());
    }

    #[test]
    fn samples_stay_within_jitter_without_spikes() {
        let mut sensor = seeded(0.0);
        sensor.start_acquisition().unwrap();
        for _ in 0..500 {
            let v = sensor.get_sample().unwrap();
            assert!((28.0..=32.0).contains(&v), "sample {} out of range", v);
        }
        assert_eq!(sensor.samples_taken(), 500);
    }

    #[test]
    fn spikes_are_well_above_base() {
        let mut sensor = seeded(1.0);
        sensor.start_acquisition().unwrap();
        for _ in 0..50 {
            let v = sensor.get_sample().unwrap();
            assert!((90.0..=150.0).contains(&v), "spike {} out of range", v);
        }
    }

    #[test]
    fn invalid_shape_refuses_to_start() {
        for config in [
            SyntheticVelocityConfig {
                spike_probability: 1.5,
                ..SyntheticVelocityConfig::default()
            },
            SyntheticVelocityConfig {
                jitter_cm_per_min: f64::NAN,
                ..SyntheticVelocityConfig::default()
            },
            SyntheticVelocityConfig {
                jitter_cm_per_min: -1.0,
                ..SyntheticVelocityConfig::default()
            },
            SyntheticVelocityConfig {
                base_cm_per_min: f64::INFINITY,
                ..SyntheticVelocityConfig::default()
            },
        ] {
            let mut sensor = SyntheticVelocitySensor::new(config);
            assert!(sensor.start_acquisition().is_err());
            assert!(!sensor.is_active());
            assert!(sensor.get_sample().is_err());
        }
    }

    #[test]
    fn same_seed_reproduces_sequence() {
        let mut a = seeded(0.1);
        let mut b = seeded(0.1);
        a.start_acquisition().unwrap();
        b.start_acquisition().unwrap();
        for _ in 0..100 {
            assert_eq!(a.get_sample().unwrap(), b.get_sample().unwrap());
        }
    }
}
