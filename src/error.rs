// src/error.rs
//! Crate-wide error type.
//!
//! One `thiserror` enum covers both the init-time failures returned from
//! the public API and the per-camera recoverable reasons folded into a
//! camera's diagnostics. See `DESIGN.md` for the propagation policy:
//! init errors fail the call, per-camera errors are recovered by the
//! orchestrator and never reach the caller as an `Err`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DartVisionError {
    /// Any operation attempted before `init` has succeeded.
    #[error("engine not initialized")]
    NotInitialized,

    /// `init` was called with an empty calibration document.
    #[error("calibration document is empty")]
    EmptyCalibration,

    /// A camera's calibration is missing ellipses required to score rings.
    #[error("camera {camera_id}: missing required ellipse(s): {detail}")]
    MissingEllipses { camera_id: String, detail: String },

    /// `segment_boundary_angles` is not strictly increasing modulo 2pi,
    /// or has the wrong length.
    #[error("camera {camera_id}: invalid segment boundary angles: {detail}")]
    BadAngles { camera_id: String, detail: String },

    /// A camera's image bytes failed to decode as JPEG or PNG.
    #[error("camera {camera_id}: image decode failed: {detail}")]
    DecodeFailed { camera_id: String, detail: String },

    /// The motion gate rejected a camera: `new_dart_pixel_ratio` too low.
    #[error("camera {camera_id}: no dart motion detected (ratio {ratio:.4})")]
    NoDartMotion { camera_id: String, ratio: f64 },

    /// No shaft line could be fit for this camera.
    #[error("camera {camera_id}: no shaft line could be fit")]
    NoLine { camera_id: String },

    /// No tip could be localized for this camera.
    #[error("camera {camera_id}: no tip could be localized")]
    NoTip { camera_id: String },

    /// Fewer than two cameras produced a usable tip.
    #[error("insufficient cameras: {usable} of {total} produced a usable tip")]
    InsufficientCameras { usable: usize, total: usize },

    /// A candidate camera pair was rejected by the triangulator.
    /// Internal only: never returned from a public entry point.
    #[error("camera pair ({a}, {b}) rejected: {reason}")]
    PairRejected { a: String, b: String, reason: String },

    /// Catch-all for unexpected arithmetic failure (singular matrix, NaN, etc).
    #[error("internal error: {0}")]
    Internal(String),
}

impl DartVisionError {
    #[inline]
    pub fn is_init_error(&self) -> bool {
        matches!(
            self,
            DartVisionError::EmptyCalibration
                | DartVisionError::MissingEllipses { .. }
                | DartVisionError::BadAngles { .. }
        )
    }

    #[inline]
    pub fn is_per_camera_recoverable(&self) -> bool {
        matches!(
            self,
            DartVisionError::DecodeFailed { .. }
                | DartVisionError::NoDartMotion { .. }
                | DartVisionError::NoLine { .. }
                | DartVisionError::NoTip { .. }
        )
    }

    #[inline]
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        DartVisionError::Internal(msg.into())
    }
}

/// Convenient `Result` alias — use `crate::error::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, DartVisionError>;
