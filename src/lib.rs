//! Multi-camera dart-tip detection engine (spec.md §1).
//!
//! Given three near-simultaneous camera images of a dartboard and three
//! "baseline" images taken an instant earlier, the engine produces a
//! scored dart location: a segment, a multiplier, a confidence, and
//! per-camera diagnostics. It is a pure function of its inputs plus a
//! small amount of cached per-board state — no camera I/O, no game-rules
//! logic, no persistence. Those live in collaborating services upstream
//! of this crate (spec.md §1's Non-goals).
//!
//! [`DartVisionEngine`] is the crate's one entry point, exposing the
//! three operation groups spec.md §6 names: initialization, detection,
//! and board lifecycle.
//!
//! ```no_run
//! use dart_vision::{CameraFrame, DartVisionEngine};
//!
//! let engine = DartVisionEngine::new();
//! engine.init(r#"{"cam0": {"center": [960.0, 540.0],
//!     "segment_boundary_angles": [9,27,45,63,81,99,117,135,153,171,
//!         189,207,225,243,261,279,297,315,333,351],
//!     "segment_20_index": 0, "image_height": 1080,
//!     "ellipses": {"outer_double": {"cx": 960.0, "cy": 540.0,
//!         "width": 680.0, "height": 680.0, "rotation_deg": 0.0}}}}"#)
//!     .expect("valid calibration");
//!
//! let frames = vec![CameraFrame {
//!     camera_id: "cam0".to_string(),
//!     current_bytes: vec![],
//!     before_bytes: vec![],
//! }];
//! let record = engine.detect(1, "board-1", &frames).expect("engine is initialized");
//! assert!(record.is_miss()); // empty byte buffers decode-fail this camera
//! ```

mod board_cache;
mod calibration;
mod config;
mod error;
mod geometry;
mod image_io;
mod line_fit;
mod motion;
mod orchestrator;
mod scorer;
mod shape;
mod tip;
mod tps;
mod triangulate;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

pub use crate::calibration::{CalibrationDocument, CameraCalibrationRaw, EllipseDataRaw, EllipseSetRaw};
pub use crate::config::{
    DetectionConfig, LineFitConfig, MotionConfig, ScoringConfig, ShapeConfig, TipConfig, TriangulationConfig,
};
pub use crate::error::DartVisionError;
pub use crate::orchestrator::CameraFrame;
pub use crate::types::{
    BoardId, CameraDiagnostics, CameraId, CameraOutcome, DetectionMethod, DetectionRecord, EllipseData,
    FitMethod, Roi, ScoreResult, ShaftLine, TipEstimate, Zone,
};

use crate::board_cache::BoardCacheRegistry;
use crate::calibration::{build_calibrations, CameraCalibration};
use crate::error::Result;

/// Engine-wide state (spec.md §9): a read-only calibration map, swapped
/// in whole on [`init`](Self::init), plus the board-cache registry — the
/// only mutable long-lived state the engine carries. Calibrations are
/// freely shared (`Arc`); each board's cache serializes its own readers
/// and writers independently (spec.md §5), so distinct boards never
/// contend with one another.
pub struct DartVisionEngine {
    config: DetectionConfig,
    calibrations: RwLock<Option<Arc<HashMap<CameraId, CameraCalibration>>>>,
    boards: BoardCacheRegistry,
}

impl Default for DartVisionEngine {
    fn default() -> Self {
        DartVisionEngine::new()
    }
}

impl DartVisionEngine {
    /// Builds an uninitialized engine with default thresholds. Every
    /// operation but [`init`](Self::init) returns
    /// [`DartVisionError::NotInitialized`] until `init` succeeds.
    pub fn new() -> Self {
        DartVisionEngine::with_config(DetectionConfig::default())
    }

    /// As [`new`](Self::new), with caller-supplied thresholds (SPEC_FULL.md
    /// §C) instead of `DetectionConfig::default()`.
    pub fn with_config(config: DetectionConfig) -> Self {
        DartVisionEngine {
            config,
            calibrations: RwLock::new(None),
            boards: BoardCacheRegistry::new(),
        }
    }

    /// Parses and validates a calibration document (spec.md §6): a JSON
    /// object mapping camera id to that camera's calibration record.
    /// Replaces any previously initialized state. Fails with
    /// [`DartVisionError::EmptyCalibration`], `MissingEllipses`, or
    /// `BadAngles` exactly as spec.md §6 describes; malformed JSON is
    /// reported as [`DartVisionError::Internal`].
    pub fn init(&self, calibration_json: &str) -> Result<()> {
        let cameras: HashMap<CameraId, crate::calibration::CameraCalibrationRaw> =
            serde_json::from_str(calibration_json)
                .map_err(|e| DartVisionError::internal(format!("malformed calibration document: {e}")))?;
        self.init_from_document(CalibrationDocument { cameras })
    }

    /// As [`init`](Self::init), for callers that already hold a parsed
    /// [`CalibrationDocument`] (e.g. built programmatically) rather than
    /// raw JSON text.
    pub fn init_from_document(&self, doc: CalibrationDocument) -> Result<()> {
        let calibrations = build_calibrations(doc, &self.config.scoring)?;
        *self.calibrations.write() = Some(Arc::new(calibrations));
        Ok(())
    }

    /// Runs one detection (spec.md §4.1, §6): decodes and scores each
    /// camera's branch in parallel, triangulates the result, and — on a
    /// successful detection — stores that camera's motion mask in the
    /// board cache so the next dart in the same turn can subtract it.
    ///
    /// Thread-safe: calls for distinct `board_id`s run independently;
    /// calls for the same board serialize on that board's cache lock
    /// (spec.md §5). Never fails for a well-formed call once the engine
    /// is initialized — a call that cannot produce a score still returns
    /// `Ok` with `DetectionRecord::is_miss() == true` and a `method` of
    /// `NoDetection` naming the reason (spec.md §7).
    pub fn detect(&self, dart_number: u8, board_id: &str, frames: &[CameraFrame]) -> Result<DetectionRecord> {
        let calibrations = self
            .calibrations
            .read()
            .clone()
            .ok_or(DartVisionError::NotInitialized)?;
        Ok(orchestrator::detect(
            dart_number,
            board_id,
            frames,
            &calibrations,
            &self.boards,
            &self.config,
        ))
    }

    /// Resets `board_id`'s cache, creating the entry if absent. Idempotent
    /// (spec.md §8): a second call on an already-reset board is a no-op.
    pub fn init_board(&self, board_id: &str) {
        self.boards.init_board(board_id);
    }

    /// Removes `board_id`'s cache entirely. Idempotent (spec.md §8).
    pub fn clear_board(&self, board_id: &str) {
        self.boards.clear_board(board_id);
    }

    /// Number of previously-scored darts cached for `(board_id,
    /// camera_id)` this turn, for a host that wants to sanity-check turn
    /// state without reaching into engine internals (SPEC_FULL.md §E).
    pub fn dart_count(&self, board_id: &str, camera_id: &str) -> usize {
        self.boards.dart_count(board_id, camera_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn one_camera_doc() -> CalibrationDocument {
        let mut angles = Vec::with_capacity(20);
        for i in 0..20 {
            angles.push((i as f64 + 1.0) * (2.0 * std::f64::consts::PI / 20.0));
        }
        let value = json!({
            "cam0": {
                "center": [500.0, 500.0],
                "segment_boundary_angles": angles,
                "segment_20_index": 0,
                "image_height": 1000,
                "ellipses": {
                    "outer_double": { "cx": 500.0, "cy": 500.0, "width": 340.0, "height": 340.0, "rotation_deg": 0.0 }
                }
            }
        });
        let cameras = serde_json::from_value(value).unwrap();
        CalibrationDocument { cameras }
    }

    #[test]
    fn detect_before_init_is_not_initialized() {
        let engine = DartVisionEngine::new();
        let frames = vec![CameraFrame {
            camera_id: "cam0".to_string(),
            current_bytes: vec![],
            before_bytes: vec![],
        }];
        let err = engine.detect(1, "board_a", &frames).unwrap_err();
        assert_eq!(err, DartVisionError::NotInitialized);
    }

    #[test]
    fn init_then_detect_with_undecodable_frames_is_ok_not_err() {
        let engine = DartVisionEngine::new();
        engine.init_from_document(one_camera_doc()).unwrap();
        let frames = vec![CameraFrame {
            camera_id: "cam0".to_string(),
            current_bytes: vec![],
            before_bytes: vec![],
        }];
        // A single camera can never satisfy the >=2-camera gate; the call
        // still returns `Ok`, never `Err`, for a well-formed, initialized
        // engine (spec.md §7).
        let record = engine.detect(1, "board_a", &frames).unwrap();
        assert!(record.is_miss());
        assert!(matches!(record.method, DetectionMethod::NoDetection(_)));
    }

    #[test]
    fn init_rejects_empty_document() {
        let engine = DartVisionEngine::new();
        let err = engine.init("{}").unwrap_err();
        assert_eq!(err, DartVisionError::EmptyCalibration);
    }

    #[test]
    fn init_rejects_malformed_json() {
        let engine = DartVisionEngine::new();
        let err = engine.init("not json").unwrap_err();
        assert!(matches!(err, DartVisionError::Internal(_)));
    }

    #[test]
    fn board_lifecycle_is_idempotent_and_isolated() {
        let engine = DartVisionEngine::new();
        engine.init_from_document(one_camera_doc()).unwrap();
        engine.init_board("board_a");
        engine.init_board("board_a");
        assert_eq!(engine.dart_count("board_a", "cam0"), 0);
        engine.clear_board("board_a");
        engine.clear_board("board_a");
        assert_eq!(engine.dart_count("board_a", "cam0"), 0);
        assert_eq!(engine.dart_count("board_b", "cam0"), 0);
    }

    #[test]
    fn init_via_json_parses_a_single_camera_document() {
        let engine = DartVisionEngine::new();
        // segment_boundary_angles are radians, strictly increasing, spanning (0, 2*pi].
        let json_text = r#"{
            "cam0": {
                "center": [500.0, 500.0],
                "segment_boundary_angles": [
                    0.3141592653589793, 0.6283185307179586, 0.9424777960769379, 1.2566370614359172,
                    1.5707963267948966, 1.8849555921538759, 2.199114857512855, 2.5132741228718345,
                    2.827433388230814, 3.141592653589793, 3.4557519189487724, 3.7699111843077517,
                    4.084070449666731, 4.39822971502571, 4.71238898038469, 5.026548245743669,
                    5.340707511102648, 5.654866776461628, 5.969026041820607, 6.283185307179586
                ],
                "segment_20_index": 0,
                "image_height": 1000,
                "ellipses": {
                    "outer_double": { "cx": 500.0, "cy": 500.0, "width": 340.0, "height": 340.0, "rotation_deg": 0.0 }
                }
            }
        }"#;
        engine.init(json_text).unwrap();
    }
}
