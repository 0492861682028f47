//! Surface velocity sources.
//!
//! A source yields one velocity sample (cm/min) per call to `get_sample()`,
//! bracketed by `start_acquisition()` / `stop_acquisition()`. Sources are not
//! internally synchronized; one thread owns each instance.
//!
//! - `SyntheticVelocitySensor`: jittered fabric speed with occasional spikes
//! - `VelocitySampler`: worker that polls a source at a fixed rate and feeds
//!   the samples into a channel

mod sampler;
mod synthetic;

pub use sampler::VelocitySampler;
pub use synthetic::{SyntheticVelocityConfig, SyntheticVelocitySensor};

use anyhow::Result;

/// Velocity source lifecycle.
///
/// Calls must alternate `start_acquisition` → `get_sample`... → `stop_acquisition`.
/// Out-of-order calls are programming errors and are reported as `Err`.
pub trait VelocitySource: Send {
    /// Source identifier (for logs).
    fn name(&self) -> &'static str;

    fn start_acquisition(&mut self) -> Result<()>;

    /// One sample in cm/min. Only valid while acquisition is active.
    fn get_sample(&mut self) -> Result<f64>;

    fn stop_acquisition(&mut self) -> Result<()>;

    fn is_active(&self) -> bool;
}
