use rand::Rng;
use std::time::Duration;

/// Bounded random delay standing in for hardware latency.
///
/// Each wait lasts `base ± uniform(jitter)`, never less than zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimulatedLatency {
    pub base: Duration,
    pub jitter: Duration,
}

impl SimulatedLatency {
    pub const fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.base;
        }
        let offset = rand::thread_rng().gen_range(-1.0f64..=1.0) * self.jitter.as_secs_f64();
        Duration::from_secs_f64((self.base.as_secs_f64() + offset).max(0.0))
    }

    /// Blocks for one sampled delay. Not cancellable.
    pub fn wait(&self) -> Duration {
        let delay = self.sample();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        delay
    }
}

/// Delays of the simulated camera rig.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CameraTiming {
    /// Firmware boot during `open_cameras()`.
    pub open: SimulatedLatency,
    /// Bus transfer, once per `collect()` call.
    pub collect: SimulatedLatency,
}

impl CameraTiming {
    pub const fn none() -> Self {
        Self {
            open: SimulatedLatency::none(),
            collect: SimulatedLatency::none(),
        }
    }
}

impl Default for CameraTiming {
    fn default() -> Self {
        Self {
            open: SimulatedLatency::new(Duration::from_millis(1000), Duration::from_millis(500)),
            collect: SimulatedLatency::new(Duration::from_millis(4000), Duration::from_millis(1000)),
        }
    }
}
