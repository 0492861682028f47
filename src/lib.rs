//! Weaving inspection core.
//!
//! This crate coordinates a surface-velocity sensor with a dual-light camera
//! rig so that fabric is photographed only after enough of it has advanced
//! under the cameras.
//!
//! # Architecture
//!
//! Data flows one way:
//!
//! 1. `velocity`: a source produces one velocity sample (cm/min) per tick.
//! 2. `conditioning`: samples are drained per cycle, IQR-filtered and smoothed.
//! 3. `displacement`: the conditioned velocity becomes a distance, accumulated
//!    against a field-of-view threshold.
//! 4. `capture`: on threshold, both light conditions are triggered back to back
//!    and then collected (the trigger/collect handshake).
//! 5. `delivery`: surface and picture batches go to the external collector.
//!
//! # Module Structure
//!
//! - `capture`: `CaptureSynchronizer`, `ExposureRetriever`, metadata strategies
//! - `pipeline`: worker supervision (`Pipeline`, `DispatchLoop`, `Shutdown`)
//! - `collector`: loopback stand-in for the delivery collaborator
//! - Core types: `LightCondition`, `CameraPosition`, `CaptureError`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub mod capture;
pub mod collector;
pub mod conditioning;
pub mod config;
pub mod delivery;
pub mod displacement;
pub mod logging;
pub mod pipeline;
pub mod velocity;

pub use capture::{
    take_exposures, CameraTiming, CaptureSynchronizer, ExposurePair, ExposureRetriever,
    ExposureState, FixedMetadata, ImageWithMetadata, MetadataSource, PictureMetadata,
    RandomMetadata, SimulatedLatency,
};
pub use collector::{CollectorHandle, CollectorServer, ReceivedRequest};
pub use conditioning::{measure_velocity, ConditionedVelocity, SignalConditioner};
pub use config::WeavingConfig;
pub use delivery::{
    DeliveryClient, DeliveryHandle, DeliveryStats, DeliveryTransport, HttpTransport, LightReport,
    PicturesBatch, SurfaceMovement,
};
pub use displacement::{
    measure_displacement, threshold_from_fov, DisplacementAccumulator, DisplacementReading,
};
pub use pipeline::{
    CycleReport, DispatchLoop, Pipeline, PipelineHandle, PipelineSummary, Shutdown,
};
pub use velocity::{
    SyntheticVelocityConfig, SyntheticVelocitySensor, VelocitySampler, VelocitySource,
};

// -------------------- Light Conditions --------------------

/// One of the two illumination settings a fabric region is photographed under.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LightCondition {
    Blue,
    Green,
}

impl LightCondition {
    /// Capture order used by the dispatch loop.
    pub const ALL: [LightCondition; 2] = [LightCondition::Blue, LightCondition::Green];

    /// Wire and filename identifier.
    pub fn id(self) -> &'static str {
        match self {
            LightCondition::Blue => "blue",
            LightCondition::Green => "green",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LightCondition::Blue => "BLUE",
            LightCondition::Green => "GREEN",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            LightCondition::Blue => 0,
            LightCondition::Green => 1,
        }
    }
}

impl fmt::Display for LightCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// -------------------- Camera Positions --------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    Left,
    Right,
}

impl CameraPosition {
    pub const ALL: [CameraPosition; 2] = [CameraPosition::Left, CameraPosition::Right];

    pub fn id(self) -> &'static str {
        match self {
            CameraPosition::Left => "left",
            CameraPosition::Right => "right",
        }
    }
}

impl fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// -------------------- Capture Errors --------------------

/// Failures of the trigger/collect handshake and of exposure retrieval.
///
/// Precondition violations (`NotReady`, `LightConditionUnset`) are caller
/// misuse. The remaining variants describe contention, missing data or a
/// broken deployment and abort only the capture cycle in progress.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureError {
    /// `open_cameras()` has not completed.
    NotReady,
    /// `trigger()` was called before any light condition was selected.
    LightConditionUnset,
    /// The previous exposure for this condition was not collected yet.
    TriggerFailed(LightCondition),
    /// `collect()` without a matching successful `trigger()`.
    PicturesNotAvailable(LightCondition),
    /// No backing picture exists for the condition/position key.
    PictureNotFound(PathBuf),
    PictureDecode { path: PathBuf, message: String },
    LockPoisoned(&'static str),
}

impl CaptureError {
    /// Stable code for logs and assertions.
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::NotReady => "CAMERAS_NOT_READY",
            CaptureError::LightConditionUnset => "LIGHT_CONDITION_UNSET",
            CaptureError::TriggerFailed(_) => "TRIGGER_FAILED",
            CaptureError::PicturesNotAvailable(_) => "PICTURES_NOT_AVAILABLE",
            CaptureError::PictureNotFound(_) => "PICTURE_NOT_FOUND",
            CaptureError::PictureDecode { .. } => "PICTURE_DECODE_FAILED",
            CaptureError::LockPoisoned(_) => "LOCK_POISONED",
        }
    }

    /// True for errors caused by calling the synchronizer out of order.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            CaptureError::NotReady | CaptureError::LightConditionUnset
        )
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        match self {
            CaptureError::NotReady => {
                write!(f, "{}: cameras are not ready to be used", code)
            }
            CaptureError::LightConditionUnset => {
                write!(f, "{}: no light condition selected", code)
            }
            CaptureError::TriggerFailed(light) => write!(
                f,
                "{}: trigger failed, previous {} pictures were not collected yet",
                code, light
            ),
            CaptureError::PicturesNotAvailable(light) => write!(
                f,
                "{}: shutter was not triggered for {}, pictures are not available",
                code, light
            ),
            CaptureError::PictureNotFound(path) => {
                write!(f, "{}: no picture at {}", code, path.display())
            }
            CaptureError::PictureDecode { path, message } => {
                write!(f, "{}: {}: {}", code, path.display(), message)
            }
            CaptureError::LockPoisoned(which) => write!(f, "{}: {} lock poisoned", code, which),
        }
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_condition_ids_match_picture_naming() {
        assert_eq!(LightCondition::Blue.id(), "blue");
        assert_eq!(LightCondition::Green.id(), "green");
        assert_eq!(LightCondition::ALL[0], LightCondition::Blue);
        assert_eq!(
            serde_json::to_string(&LightCondition::Green).unwrap(),
            "\"green\""
        );
    }

    #[test]
    fn precondition_errors_are_distinguished() {
        assert!(CaptureError::NotReady.is_precondition());
        assert!(CaptureError::LightConditionUnset.is_precondition());
        assert!(!CaptureError::TriggerFailed(LightCondition::Blue).is_precondition());
        assert!(!CaptureError::PicturesNotAvailable(LightCondition::Green).is_precondition());
        assert!(!CaptureError::PictureNotFound(PathBuf::from("x.jpg")).is_precondition());
    }

    #[test]
    fn capture_error_survives_anyhow_round_trip() {
        let err: anyhow::Error = CaptureError::TriggerFailed(LightCondition::Blue).into();
        let typed = err.downcast_ref::<CaptureError>().expect("typed error");
        assert_eq!(typed.code(), "TRIGGER_FAILED");
        assert!(err.to_string().contains("BLUE"));
    }
}
