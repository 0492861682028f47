//! Fabric displacement accounting.
//!
//! The accumulator owns the distance still to travel before the next capture.
//! It is single-writer: the dispatch loop is the only caller.

/// Fraction of the camera's vertical field of view that triggers a capture.
pub const DISPLACEMENT_THRESHOLD_RATIO: f64 = 0.9;

pub fn threshold_from_fov(camera_vertical_fov_cm: f64) -> f64 {
    camera_vertical_fov_cm * DISPLACEMENT_THRESHOLD_RATIO
}

/// Distance in cm covered at `velocity` cm/min during `samples` ticks at `rate_hz`.
pub fn measure_displacement(velocity: f64, samples: usize, rate_hz: f64) -> f64 {
    if rate_hz <= 0.0 {
        return 0.0;
    }
    let elapsed_minutes = samples as f64 / rate_hz / 60.0;
    velocity * elapsed_minutes
}

/// Outcome of one accumulation step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplacementReading {
    /// cm/min
    pub velocity: f64,
    /// cm
    pub displacement_cm: f64,
    /// Threshold crossed during this step.
    pub capture_due: bool,
}

#[derive(Clone, Debug)]
pub struct DisplacementAccumulator {
    threshold: f64,
    remaining: f64,
}

impl DisplacementAccumulator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            remaining: threshold,
        }
    }

    pub fn from_fov(camera_vertical_fov_cm: f64) -> Self {
        Self::new(threshold_from_fov(camera_vertical_fov_cm))
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Distance left before the next capture is due.
    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Subtracts the displacement of this cycle from the remainder.
    ///
    /// On crossing, the full threshold is added back so the overshoot shortens
    /// the next interval. Negative displacement grows the remainder.
    pub fn accumulate(
        &mut self,
        velocity: f64,
        samples: usize,
        rate_hz: f64,
    ) -> DisplacementReading {
        let displacement_cm = measure_displacement(velocity, samples, rate_hz);
        self.remaining -= displacement_cm;
        let capture_due = self.remaining <= 0.0;
        if capture_due {
            self.remaining += self.threshold;
        }
        DisplacementReading {
            velocity,
            displacement_cm,
            capture_due,
        }
    }
}
