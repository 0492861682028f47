use anyhow::{anyhow, Result};
use std::sync::mpsc::Sender;
use std::time::Duration;

use super::VelocitySource;
use crate::pipeline::Shutdown;

/// Polls a `VelocitySource` at a fixed rate and forwards samples downstream.
///
/// Each tick runs a full start → get → stop acquisition, so the source is
/// never left acquiring between ticks.
pub struct VelocitySampler {
    source: Box<dyn VelocitySource>,
    interval: Duration,
}

impl VelocitySampler {
    pub fn new(source: Box<dyn VelocitySource>, rate_hz: f64) -> Result<Self> {
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            return Err(anyhow!("sample rate must be > 0 Hz (got {})", rate_hz));
        }
        Ok(Self {
            source,
            interval: Duration::from_secs_f64(1.0 / rate_hz),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One bracketed acquisition.
    pub fn sample_once(&mut self) -> Result<f64> {
        self.source.start_acquisition()?;
        let sample = self.source.get_sample();
        self.source.stop_acquisition()?;
        sample
    }

    /// Sample until stop is requested or the receiver hangs up.
    ///
    /// Returns the number of samples delivered.
    pub fn run(mut self, tx: Sender<f64>, shutdown: Shutdown) -> Result<u64> {
        log::debug!("velocity sampler starting ({})", self.source.name());
        let mut delivered = 0u64;
        while !shutdown.is_requested() {
            let velocity = self.sample_once()?;
            log::trace!("velocity: {:.3}", velocity);
            if tx.send(velocity).is_err() {
                log::debug!("velocity receiver dropped, sampler exiting");
                break;
            }
            delivered += 1;
            if !shutdown.sleep(self.interval) {
                break;
            }
        }
        log::debug!("velocity sampler stopped after {} samples", delivered);
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::velocity::{SyntheticVelocityConfig, SyntheticVelocitySensor};
    use std::sync::mpsc;

    struct StrictSource {
        active: bool,
    }

    impl VelocitySource for StrictSource {
        fn name(&self) -> &'static str {
            "strict"
        }

        fn start_acquisition(&mut self) -> Result<()> {
            if self.active {
                return Err(anyhow!("already active"));
            }
            self.active = true;
            Ok(())
        }

        fn get_sample(&mut self) -> Result<f64> {
            if !self.active {
                return Err(anyhow!("not active"));
            }
            Ok(5.0)
        }

        fn stop_acquisition(&mut self) -> Result<()> {
            if !self.active {
                return Err(anyhow!("not active"));
            }
            self.active = false;
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    #[test]
    fn rejects_non_positive_rate() {
        let source = Box::new(SyntheticVelocitySensor::new(
            SyntheticVelocityConfig::default(),
        ));
        assert!(VelocitySampler::new(source, 0.0).is_err());
    }

    #[test]
    fn interval_follows_rate() {
        let source = Box::new(SyntheticVelocitySensor::new(
            SyntheticVelocityConfig::default(),
        ));
        let sampler = VelocitySampler::new(source, 50.0).unwrap();
        assert_eq!(sampler.interval(), Duration::from_millis(20));
    }

    #[test]
    fn sample_once_brackets_acquisition() {
        let source = Box::new(StrictSource { active: false });
        let mut sampler = VelocitySampler::new(source, 50.0).unwrap();
        assert_eq!(sampler.sample_once().unwrap(), 5.0);
        assert_eq!(sampler.sample_once().unwrap(), 5.0);
        assert!(!sampler.source.is_active());
    }

    #[test]
    fn run_stops_when_receiver_hangs_up() {
        let source = Box::new(SyntheticVelocitySensor::new(SyntheticVelocityConfig {
            seed: Some(1),
            ..SyntheticVelocityConfig::default()
        }));
        let sampler = VelocitySampler::new(source, 1000.0).unwrap();
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let delivered = sampler.run(tx, Shutdown::new()).unwrap();
        assert_eq!(delivered, 0);
    }

    #[test]
    fn run_exits_on_shutdown() {
        let source = Box::new(SyntheticVelocitySensor::new(SyntheticVelocityConfig {
            seed: Some(2),
            ..SyntheticVelocityConfig::default()
        }));
        let sampler = VelocitySampler::new(source, 1000.0).unwrap();
        let (tx, rx) = mpsc::channel();
        let shutdown = Shutdown::new();
        let stopper = shutdown.clone();
        let worker = std::thread::spawn(move || sampler.run(tx, shutdown));
        std::thread::sleep(Duration::from_millis(30));
        stopper.request();
        let delivered = worker.join().unwrap().unwrap();
        assert!(delivered > 0);
        assert_eq!(rx.try_iter().count() as u64, delivered);
    }

    #[test]
    fn run_reports_unusable_source_as_error() {
        let source = Box::new(SyntheticVelocitySensor::new(SyntheticVelocityConfig {
            jitter_cm_per_min: f64::NAN,
            seed: Some(3),
            ..SyntheticVelocityConfig::default()
        }));
        let sampler = VelocitySampler::new(source, 1000.0).unwrap();
        let (tx, rx) = mpsc::channel();
        assert!(sampler.run(tx, Shutdown::new()).is_err());
        assert_eq!(rx.try_iter().count(), 0);
    }
}
