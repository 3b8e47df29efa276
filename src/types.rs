//! Shared data model (spec §3).
//!
//! Kept in one module, the way the teacher keeps small plain-data types
//! (`CollisionEvent`, `CullResult`) next to the system that owns them
//! rather than scattering `struct` defs across call sites — here every
//! pipeline stage (C1-C10) reads and writes into this shared vocabulary,
//! so it gets its own module instead of living inside one stage.

use std::collections::BTreeMap;
use std::fmt;

pub type CameraId = String;
pub type BoardId = String;

/// One concentric ring as it appears in a camera image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipseData {
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
    /// Rotation in degrees.
    pub rotation_deg: f64,
}

impl EllipseData {
    #[inline]
    pub fn semi_axes(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }
}

/// Axis-aligned region of interest in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Which estimator produced a [`ShaftLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitMethod {
    Ridge,
    Pca,
    Ransac,
}

impl fmt::Display for FitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FitMethod::Ridge => "ridge",
            FitMethod::Pca => "pca",
            FitMethod::Ransac => "ransac",
        };
        f.write_str(s)
    }
}

/// Oriented 2D line fit through the dart shaft. `vy >= 0` by convention
/// (spec §3, §8): direction points toward the tip in image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaftLine {
    pub vx: f64,
    pub vy: f64,
    pub x0: f64,
    pub y0: f64,
    pub elongation: f64,
    pub method: FitMethod,
    pub inlier_ratio: f64,
}

impl ShaftLine {
    /// Builds a shaft line, normalizing the direction and flipping it so
    /// that `vy >= 0` always holds regardless of the caller's sign.
    pub fn new(
        vx: f64,
        vy: f64,
        x0: f64,
        y0: f64,
        elongation: f64,
        method: FitMethod,
        inlier_ratio: f64,
    ) -> Self {
        let norm = (vx * vx + vy * vy).sqrt();
        let (mut nvx, mut nvy) = if norm > 1e-12 {
            (vx / norm, vy / norm)
        } else {
            (0.0, 1.0)
        };
        if nvy < 0.0 {
            nvx = -nvx;
            nvy = -nvy;
        }
        ShaftLine {
            vx: nvx,
            vy: nvy,
            x0,
            y0,
            elongation,
            method,
            inlier_ratio,
        }
    }

    #[inline]
    pub fn direction(&self) -> (f64, f64) {
        (self.vx, self.vy)
    }

    #[inline]
    pub fn point_at(&self, t: f64) -> (f64, f64) {
        (self.x0 + self.vx * t, self.y0 + self.vy * t)
    }

    #[inline]
    pub fn is_unit(&self, tol: f64) -> bool {
        ((self.vx * self.vx + self.vy * self.vy) - 1.0).abs() <= tol
    }
}

/// Dartboard zone a tip landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Single,
    Double,
    Triple,
    OuterBull,
    InnerBull,
    Miss,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Zone::Single => "single",
            Zone::Double => "double",
            Zone::Triple => "triple",
            Zone::OuterBull => "outer_bull",
            Zone::InnerBull => "inner_bull",
            Zone::Miss => "miss",
        };
        f.write_str(s)
    }
}

/// A single scorer's read of one tip: segment/multiplier/zone/confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreResult {
    pub segment: u8,
    pub multiplier: u8,
    pub zone: Zone,
    pub boundary_distance_deg: f64,
    pub confidence: f64,
}

impl ScoreResult {
    pub const MISS: ScoreResult = ScoreResult {
        segment: 0,
        multiplier: 0,
        zone: Zone::Miss,
        boundary_distance_deg: 0.0,
        confidence: 0.0,
    };

    #[inline]
    pub fn score(&self) -> u32 {
        self.segment as u32 * self.multiplier as u32
    }

    #[inline]
    pub fn is_miss(&self) -> bool {
        self.segment == 0 && self.multiplier == 0
    }
}

/// Final detection method, a tagged variant per spec §9 (not a class
/// hierarchy): `NoDetection` carries the reason inline.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionMethod {
    Unanimous,
    Majority,
    Weighted,
    Intersection,
    NoDetection(String),
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::Unanimous => f.write_str("unanimous"),
            DetectionMethod::Majority => f.write_str("majority"),
            DetectionMethod::Weighted => f.write_str("weighted"),
            DetectionMethod::Intersection => f.write_str("intersection"),
            DetectionMethod::NoDetection(reason) => write!(f, "no_detection({reason})"),
        }
    }
}

/// Numeric quality metrics gathered while processing one camera's branch
/// (spec §3 `CameraResult`, supplemented per SPEC_FULL.md §E).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraDiagnostics {
    pub barrel_pixel_count: u64,
    pub barrel_aspect_ratio: f64,
    pub ridge_residual: f64,
    pub mean_thickness: f64,
    pub shaft_length: f64,
    pub pca_ridge_angle_delta_deg: f64,
    pub roi_fallback: bool,
    pub dropped: bool,
    pub radial_clamp_applied: bool,
    pub segment_label_corrected: bool,
}

/// Sub-pixel and integer tip localization for one camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TipEstimate {
    pub ix: i64,
    pub iy: i64,
    pub sub_x: f64,
    pub sub_y: f64,
}

impl TipEstimate {
    #[inline]
    pub fn sub_pixel(&self) -> (f64, f64) {
        (self.sub_x, self.sub_y)
    }
}

/// Everything produced for one camera during C1-C6, whether or not the
/// camera ultimately contributed to triangulation.
#[derive(Debug, Clone)]
pub struct CameraOutcome {
    pub camera_id: CameraId,
    pub tip: Option<TipEstimate>,
    pub mask_quality: f64,
    pub shaft_line: Option<ShaftLine>,
    pub provisional_score: Option<ScoreResult>,
    pub diagnostics: CameraDiagnostics,
    /// Non-empty iff this camera contributed nothing usable; carries the
    /// per-camera error kind as a short reason string for replay/debugging.
    pub skip_reason: Option<String>,
}

impl CameraOutcome {
    pub fn skipped(camera_id: CameraId, reason: impl Into<String>) -> Self {
        CameraOutcome {
            camera_id,
            tip: None,
            mask_quality: 0.0,
            shaft_line: None,
            provisional_score: None,
            diagnostics: CameraDiagnostics::default(),
            skip_reason: Some(reason.into()),
        }
    }

    #[inline]
    pub fn is_usable(&self) -> bool {
        self.tip.is_some() && self.skip_reason.is_none()
    }
}

/// The final result of one `detect` call (spec §3 `IntersectionResult`,
/// §6 detection record).
#[derive(Debug, Clone)]
pub struct DetectionRecord {
    pub segment: u8,
    pub multiplier: u8,
    pub method: DetectionMethod,
    pub confidence: f64,
    /// Triangulated point in the normalized board frame, when one exists.
    pub board_point: Option<(f64, f64)>,
    pub total_residual: f64,
    pub camera_dropped: Option<CameraId>,
    pub wire_ambiguous: bool,
    pub winner_pct: Option<f64>,
    /// Always populated to whatever degree each camera's branch reached.
    pub per_camera: BTreeMap<CameraId, CameraOutcome>,
    /// Non-empty only when `method` is `NoDetection`.
    pub reason: String,
}

impl DetectionRecord {
    #[inline]
    pub fn score(&self) -> u32 {
        self.segment as u32 * self.multiplier as u32
    }

    #[inline]
    pub fn is_miss(&self) -> bool {
        self.segment == 0 && self.multiplier == 0
    }

    pub fn no_detection(reason: impl Into<String>, per_camera: BTreeMap<CameraId, CameraOutcome>) -> Self {
        let reason = reason.into();
        DetectionRecord {
            segment: 0,
            multiplier: 0,
            method: DetectionMethod::NoDetection(reason.clone()),
            confidence: 0.0,
            board_point: None,
            total_residual: 0.0,
            camera_dropped: None,
            wire_ambiguous: false,
            winner_pct: None,
            per_camera,
            reason,
        }
    }
}
