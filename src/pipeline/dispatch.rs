use anyhow::{anyhow, Result};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use super::Shutdown;
use crate::capture::{take_exposures, CaptureSynchronizer};
use crate::conditioning::{ConditionedVelocity, SignalConditioner};
use crate::delivery::{DeliveryHandle, PicturesBatch, SurfaceMovement};
use crate::displacement::{DisplacementAccumulator, DisplacementReading};
use crate::{CaptureError, LightCondition};

/// What one dispatch cycle observed and queued.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub velocity: ConditionedVelocity,
    pub reading: DisplacementReading,
    /// Conditions captured this cycle, empty when no capture was due or it failed.
    pub captured: Vec<LightCondition>,
    pub capture_error: Option<CaptureError>,
}

impl CycleReport {
    pub fn surface(&self) -> SurfaceMovement {
        SurfaceMovement {
            velocity: self.reading.velocity,
            displacement: self.reading.displacement_cm,
        }
    }
}

/// Single-writer owner of the displacement remainder.
///
/// Each cycle conditions the drained samples, accumulates displacement,
/// reports surface movement and, once the threshold is crossed, drives one
/// capture batch across every light condition.
pub struct DispatchLoop {
    conditioner: SignalConditioner,
    accumulator: DisplacementAccumulator,
    sample_rate_hz: f64,
    synchronizer: Arc<CaptureSynchronizer>,
    delivery: DeliveryHandle,
}

impl DispatchLoop {
    /// `sample_rate_hz` converts sample counts into elapsed time and must be
    /// a positive finite rate.
    pub fn new(
        conditioner: SignalConditioner,
        accumulator: DisplacementAccumulator,
        sample_rate_hz: f64,
        synchronizer: Arc<CaptureSynchronizer>,
        delivery: DeliveryHandle,
    ) -> Result<Self> {
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(anyhow!(
                "sample rate must be > 0 Hz (got {})",
                sample_rate_hz
            ));
        }
        Ok(Self {
            conditioner,
            accumulator,
            sample_rate_hz,
            synchronizer,
            delivery,
        })
    }

    pub fn accumulator(&self) -> &DisplacementAccumulator {
        &self.accumulator
    }

    /// Runs one cycle over the samples drained since the previous one.
    ///
    /// Capture failures are logged and reported in the `CycleReport`; only a
    /// precondition failure (cameras never opened) is returned as an error.
    pub fn run_cycle(&mut self, samples: &[f64]) -> Result<CycleReport> {
        let velocity = self.conditioner.condition(samples);
        let reading =
            self.accumulator
                .accumulate(velocity.value, velocity.sample_count, self.sample_rate_hz);
        let surface = SurfaceMovement {
            velocity: reading.velocity,
            displacement: reading.displacement_cm,
        };
        log::info!(
            "velocity: {:.3} cm/min, displacement: {:.3} cm ({} samples)",
            surface.velocity,
            surface.displacement,
            velocity.sample_count
        );

        self.delivery.surface_movement(surface);

        let mut report = CycleReport {
            velocity,
            reading,
            captured: Vec::new(),
            capture_error: None,
        };

        if reading.capture_due {
            log::info!("threshold displacement reached");
            match take_exposures(&self.synchronizer, &LightCondition::ALL) {
                Ok(pairs) => {
                    for (condition, pair) in &pairs {
                        log::debug!(
                            "{} exposures: left {}x{} iso {}, right {}x{} iso {}",
                            condition,
                            pair.left.width(),
                            pair.left.height(),
                            pair.left.iso,
                            pair.right.width(),
                            pair.right.height(),
                            pair.right.iso
                        );
                    }
                    report.captured = pairs.iter().map(|(condition, _)| *condition).collect();
                    self.delivery
                        .pictures_batch(PicturesBatch::new(report.captured.clone(), surface));
                }
                Err(err) if err.is_precondition() => {
                    return Err(anyhow!(err).context("capture precondition violated"));
                }
                Err(err) => {
                    log::error!("capture cycle aborted: {}", err);
                    report.capture_error = Some(err);
                }
            }
        }
        Ok(report)
    }

    /// Paces cycles every `period` until stop is requested.
    ///
    /// Returns the number of completed cycles. Ends early when the sample
    /// producer has gone away and nothing is left to drain.
    pub fn run(mut self, samples: Receiver<f64>, shutdown: Shutdown, period: Duration) -> Result<u64> {
        log::debug!("dispatch loop starting");
        let mut cycles = 0u64;
        while shutdown.sleep(period) {
            let (drained, disconnected) = drain(&samples);
            if disconnected && drained.is_empty() {
                log::warn!("velocity producer stopped, dispatch loop exiting");
                break;
            }
            self.run_cycle(&drained)?;
            cycles += 1;
        }
        log::debug!("dispatch loop stopped after {} cycles", cycles);
        Ok(cycles)
    }
}

fn drain(samples: &Receiver<f64>) -> (Vec<f64>, bool) {
    let mut drained = Vec::new();
    loop {
        match samples.try_recv() {
            Ok(sample) => drained.push(sample),
            Err(TryRecvError::Empty) => return (drained, false),
            Err(TryRecvError::Disconnected) => return (drained, true),
        }
    }
}
