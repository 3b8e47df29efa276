//! Camera calibration document (spec §3, §6).
//!
//! Parsed once at `init`, validated, and turned into the derived,
//! read-only state every later stage borrows: `board_roi`,
//! `resolution_scale`, and the per-camera [`ThinPlateSpline`] built from
//! the calibration's ellipse fits. Nothing here is mutated after
//! construction — the same "solve once at init, read forever" shape as
//! the teacher's `ResourceManager`/`MaterialSystem` caches, minus the
//! mutability those need for hot-reload.

use std::collections::HashMap;
use std::f64::consts::PI;

use serde::Deserialize;

use crate::config::ScoringConfig;
use crate::error::{DartVisionError, Result};
use crate::tps::ThinPlateSpline;
use crate::types::{CameraId, EllipseData, Roi};

const SEGMENT_COUNT: usize = 20;
/// TPS regularization used for every camera's warp; a small positive
/// value trades exact interpolation at control points for resistance to
/// ellipse-fit noise (spec §4.8 "numerical stability").
const TPS_REGULARIZATION: f64 = 1e-3;
/// Cardinal sample angles (degrees, image convention: top = 0, clockwise)
/// used to turn each calibrated ellipse into TPS control points.
const SAMPLE_ANGLES_DEG: [f64; 8] = [0.0, 45.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0];

/// Raw, on-the-wire shape of one camera's ellipses. Any subset may be
/// absent; `outer_double` is the only one required by [`init`](crate::DartVisionEngine::init).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EllipseSetRaw {
    pub outer_double: Option<EllipseDataRaw>,
    pub inner_double: Option<EllipseDataRaw>,
    pub outer_triple: Option<EllipseDataRaw>,
    pub inner_triple: Option<EllipseDataRaw>,
    pub outer_bull: Option<EllipseDataRaw>,
    pub inner_bull: Option<EllipseDataRaw>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EllipseDataRaw {
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
    pub rotation_deg: f64,
}

impl From<EllipseDataRaw> for EllipseData {
    fn from(r: EllipseDataRaw) -> Self {
        EllipseData {
            cx: r.cx,
            cy: r.cy,
            width: r.width,
            height: r.height,
            rotation_deg: r.rotation_deg,
        }
    }
}

/// One camera's calibration as received over the wire, before derived
/// state (ROI, resolution scale, TPS cache) is computed.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraCalibrationRaw {
    pub center: (f64, f64),
    pub segment_boundary_angles: Vec<f64>,
    pub segment_20_index: usize,
    pub image_height: u32,
    #[serde(default)]
    pub ellipses: EllipseSetRaw,
}

/// The full init-time payload: a map from camera id to that camera's
/// raw calibration (spec §6 "a map from camera id to that camera's
/// calibration record").
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct CalibrationDocument {
    pub cameras: HashMap<CameraId, CameraCalibrationRaw>,
}

/// One camera's fully-derived, immutable calibration.
#[derive(Debug, Clone)]
pub struct CameraCalibration {
    pub center: (f64, f64),
    pub segment_boundary_angles: [f64; SEGMENT_COUNT],
    pub segment_20_index: usize,
    pub ellipses: EllipseSet,
    pub image_height: u32,
    pub board_roi: Roi,
    pub resolution_scale: f64,
    pub tps: ThinPlateSpline,
}

#[derive(Debug, Clone, Default)]
pub struct EllipseSet {
    pub outer_double: Option<EllipseData>,
    pub inner_double: Option<EllipseData>,
    pub outer_triple: Option<EllipseData>,
    pub inner_triple: Option<EllipseData>,
    pub outer_bull: Option<EllipseData>,
    pub inner_bull: Option<EllipseData>,
}

impl EllipseSet {
    fn from_raw(raw: EllipseSetRaw) -> Self {
        EllipseSet {
            outer_double: raw.outer_double.map(Into::into),
            inner_double: raw.inner_double.map(Into::into),
            outer_triple: raw.outer_triple.map(Into::into),
            inner_triple: raw.inner_triple.map(Into::into),
            outer_bull: raw.outer_bull.map(Into::into),
            inner_bull: raw.inner_bull.map(Into::into),
        }
    }

    fn present_rings(&self, scoring: &ScoringConfig) -> Vec<(EllipseData, f64)> {
        let mut out = Vec::with_capacity(6);
        if let Some(e) = self.outer_double {
            out.push((e, scoring.double_outer_norm));
        }
        if let Some(e) = self.inner_double {
            out.push((e, scoring.double_inner_norm));
        }
        if let Some(e) = self.outer_triple {
            out.push((e, scoring.triple_outer_norm));
        }
        if let Some(e) = self.inner_triple {
            out.push((e, scoring.triple_inner_norm));
        }
        if let Some(e) = self.outer_bull {
            out.push((e, scoring.outer_bull_norm));
        }
        if let Some(e) = self.inner_bull {
            out.push((e, scoring.inner_bull_norm));
        }
        out
    }
}

/// Point on an ellipse's boundary along the ray from its center at
/// image-angle `theta_deg` (0 = top, clockwise positive), per spec §4.7's
/// angle convention. Used both to build TPS control points here and
/// (inverted) to solve normalized radius in `scorer.rs`.
pub(crate) fn ellipse_point_at_image_angle(e: &EllipseData, theta_deg: f64) -> (f64, f64) {
    let theta = theta_deg.to_radians();
    // Direction from center in image pixel space (y grows downward);
    // "top" (theta = 0) is (0, -1), clockwise positive.
    let dir = (theta.sin(), -theta.cos());

    let phi = e.rotation_deg.to_radians();
    let (cphi, sphi) = (phi.cos(), phi.sin());
    // Un-rotate the direction into the ellipse's own (a, b) axes: R(-phi) * dir.
    let dx = cphi * dir.0 + sphi * dir.1;
    let dy = -sphi * dir.0 + cphi * dir.1;

    let (a, b) = e.semi_axes();
    let t = (dy / b.max(1e-9)).atan2(dx / a.max(1e-9));
    let (lx, ly) = (a * t.cos(), b * t.sin());

    // Rotate back by phi and translate to image space.
    let px = cphi * lx - sphi * ly + e.cx;
    let py = sphi * lx + cphi * ly + e.cy;
    (px, py)
}

/// `(sin(theta), cos(theta))` board-frame point at normalized radius
/// `rho` and image-angle-convention `theta_deg`, so that theta = 0 (the
/// "20" direction) lands on the positive y-axis, per the C7 contract.
fn board_point_at(rho: f64, theta_deg: f64) -> (f64, f64) {
    let theta = theta_deg.to_radians();
    (rho * theta.sin(), rho * theta.cos())
}

impl CameraCalibration {
    fn build(raw: CameraCalibrationRaw, camera_id: &str, scoring: &ScoringConfig) -> Result<Self> {
        if raw.segment_boundary_angles.len() != SEGMENT_COUNT {
            return Err(DartVisionError::BadAngles {
                camera_id: camera_id.to_string(),
                detail: format!(
                    "expected {SEGMENT_COUNT} boundary angles, got {}",
                    raw.segment_boundary_angles.len()
                ),
            });
        }
        let mut angles = [0.0; SEGMENT_COUNT];
        angles.copy_from_slice(&raw.segment_boundary_angles);
        validate_monotonic_angles(&angles, camera_id)?;

        if raw.segment_20_index >= SEGMENT_COUNT {
            return Err(DartVisionError::BadAngles {
                camera_id: camera_id.to_string(),
                detail: format!(
                    "segment_20_index {} out of range 0..{SEGMENT_COUNT}",
                    raw.segment_20_index
                ),
            });
        }

        let ellipses = EllipseSet::from_raw(raw.ellipses);
        let outer_double = ellipses.outer_double.ok_or_else(|| DartVisionError::MissingEllipses {
            camera_id: camera_id.to_string(),
            detail: "outer_double ellipse is required".to_string(),
        })?;

        let resolution_scale = raw.image_height as f64 / 1080.0;
        let board_roi = compute_board_roi(&outer_double, resolution_scale);

        let rings = ellipses.present_rings(scoring);
        let mut src = Vec::with_capacity(rings.len() * SAMPLE_ANGLES_DEG.len() + 1);
        let mut dst = Vec::with_capacity(src.capacity());
        src.push(raw.center);
        dst.push((0.0, 0.0));
        for (ellipse, rho) in &rings {
            for theta_deg in SAMPLE_ANGLES_DEG {
                src.push(ellipse_point_at_image_angle(ellipse, theta_deg));
                dst.push(board_point_at(*rho, theta_deg));
            }
        }

        let tps = ThinPlateSpline::fit(&src, &dst, TPS_REGULARIZATION)?;

        Ok(CameraCalibration {
            center: raw.center,
            segment_boundary_angles: angles,
            segment_20_index: raw.segment_20_index,
            ellipses,
            image_height: raw.image_height,
            board_roi,
            resolution_scale,
            tps,
        })
    }
}

fn validate_monotonic_angles(angles: &[f64; SEGMENT_COUNT], camera_id: &str) -> Result<()> {
    for w in angles.windows(2) {
        if w[1] <= w[0] {
            return Err(DartVisionError::BadAngles {
                camera_id: camera_id.to_string(),
                detail: format!("angles not strictly increasing at {} -> {}", w[0], w[1]),
            });
        }
    }
    // The last boundary closing the ring at exactly 2*pi is the wrap point
    // (equivalent to 0) rather than an out-of-range angle — every boundary
    // array the crate's own calibration format produces ends there.
    if angles[0] < 0.0 || angles[SEGMENT_COUNT - 1] > 2.0 * PI {
        return Err(DartVisionError::BadAngles {
            camera_id: camera_id.to_string(),
            detail: "angles must lie within [0, 2*pi]".to_string(),
        });
    }
    Ok(())
}

fn compute_board_roi(outer_double: &EllipseData, resolution_scale: f64) -> Roi {
    let (a, b) = outer_double.semi_axes();
    let phi = outer_double.rotation_deg.to_radians();
    let (cphi, sphi) = (phi.cos(), phi.sin());
    let half_w = ((a * cphi).powi(2) + (b * sphi).powi(2)).sqrt();
    let half_h = ((a * sphi).powi(2) + (b * cphi).powi(2)).sqrt();
    let margin = 40.0 * resolution_scale;

    let x = (outer_double.cx - half_w - margin).floor() as i64;
    let y = (outer_double.cy - half_h - margin).floor() as i64;
    let width = ((half_w + margin) * 2.0).ceil().max(1.0) as u32;
    let height = ((half_h + margin) * 2.0).ceil().max(1.0) as u32;
    Roi { x, y, width, height }
}

/// Parses and validates an init-time calibration document, per spec §6.
pub fn build_calibrations(
    doc: CalibrationDocument,
    scoring: &ScoringConfig,
) -> Result<HashMap<CameraId, CameraCalibration>> {
    if doc.cameras.is_empty() {
        return Err(DartVisionError::EmptyCalibration);
    }
    let mut out = HashMap::with_capacity(doc.cameras.len());
    for (camera_id, raw) in doc.cameras {
        let calib = CameraCalibration::build(raw, &camera_id, scoring)?;
        out.insert(camera_id, calib);
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A minimal, valid single-camera calibration used across the
    /// pipeline's unit tests: a circular board (no perspective skew)
    /// centered at (500, 500) in a 1000x1000 image.
    pub fn simple_calibration() -> CameraCalibration {
        let mut angles = [0.0; SEGMENT_COUNT];
        for (i, a) in angles.iter_mut().enumerate() {
            *a = (i as f64 + 1.0) * (2.0 * PI / SEGMENT_COUNT as f64);
        }
        let scoring = ScoringConfig::default();
        let outer_double = EllipseData {
            cx: 500.0,
            cy: 500.0,
            width: 340.0,
            height: 340.0,
            rotation_deg: 0.0,
        };
        let ellipses = EllipseSet {
            outer_double: Some(outer_double),
            inner_double: Some(EllipseData {
                width: 324.0,
                height: 324.0,
                ..outer_double
            }),
            outer_triple: Some(EllipseData {
                width: 214.0,
                height: 214.0,
                ..outer_double
            }),
            inner_triple: Some(EllipseData {
                width: 198.0,
                height: 198.0,
                ..outer_double
            }),
            outer_bull: Some(EllipseData {
                width: 31.8,
                height: 31.8,
                ..outer_double
            }),
            inner_bull: Some(EllipseData {
                width: 12.7,
                height: 12.7,
                ..outer_double
            }),
        };
        let resolution_scale = 1.0;
        let board_roi = compute_board_roi(&outer_double, resolution_scale);
        let rings = ellipses.present_rings(&scoring);
        let mut src = vec![(500.0, 500.0)];
        let mut dst = vec![(0.0, 0.0)];
        for (ellipse, rho) in &rings {
            for theta_deg in SAMPLE_ANGLES_DEG {
                src.push(ellipse_point_at_image_angle(ellipse, theta_deg));
                dst.push(board_point_at(*rho, theta_deg));
            }
        }
        let tps = ThinPlateSpline::fit(&src, &dst, TPS_REGULARIZATION).unwrap();
        CameraCalibration {
            center: (500.0, 500.0),
            segment_boundary_angles: angles,
            segment_20_index: 0,
            ellipses,
            image_height: 1080,
            board_roi,
            resolution_scale,
            tps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_doc_one_camera() -> CalibrationDocument {
        let mut angles = Vec::with_capacity(SEGMENT_COUNT);
        for i in 0..SEGMENT_COUNT {
            angles.push((i as f64 + 1.0) * (2.0 * PI / SEGMENT_COUNT as f64));
        }
        let mut cameras = HashMap::new();
        cameras.insert(
            "cam0".to_string(),
            CameraCalibrationRaw {
                center: (500.0, 500.0),
                segment_boundary_angles: angles,
                segment_20_index: 0,
                image_height: 1080,
                ellipses: EllipseSetRaw {
                    outer_double: Some(EllipseDataRaw {
                        cx: 500.0,
                        cy: 500.0,
                        width: 340.0,
                        height: 340.0,
                        rotation_deg: 0.0,
                    }),
                    ..Default::default()
                },
            },
        );
        CalibrationDocument { cameras }
    }

    #[test]
    fn empty_calibration_rejected() {
        let doc = CalibrationDocument { cameras: HashMap::new() };
        let err = build_calibrations(doc, &ScoringConfig::default()).unwrap_err();
        assert_eq!(err, DartVisionError::EmptyCalibration);
    }

    #[test]
    fn missing_outer_double_rejected() {
        let mut doc = raw_doc_one_camera();
        doc.cameras.get_mut("cam0").unwrap().ellipses.outer_double = None;
        let err = build_calibrations(doc, &ScoringConfig::default()).unwrap_err();
        assert!(matches!(err, DartVisionError::MissingEllipses { .. }));
    }

    #[test]
    fn non_monotonic_angles_rejected() {
        let mut doc = raw_doc_one_camera();
        let cam = doc.cameras.get_mut("cam0").unwrap();
        cam.segment_boundary_angles[5] = cam.segment_boundary_angles[4];
        let err = build_calibrations(doc, &ScoringConfig::default()).unwrap_err();
        assert!(matches!(err, DartVisionError::BadAngles { .. }));
    }

    #[test]
    fn valid_calibration_builds_roi_and_tps() {
        let doc = raw_doc_one_camera();
        let calibs = build_calibrations(doc, &ScoringConfig::default()).unwrap();
        let cam = calibs.get("cam0").unwrap();
        assert!(cam.board_roi.width > 340);
        assert_eq!(cam.resolution_scale, 1.0);
        assert!(cam.tps.control_point_count() >= 8);
    }

    #[test]
    fn ellipse_cardinal_points_match_axis_aligned_circle() {
        let e = EllipseData {
            cx: 0.0,
            cy: 0.0,
            width: 200.0,
            height: 200.0,
            rotation_deg: 0.0,
        };
        let top = ellipse_point_at_image_angle(&e, 0.0);
        assert!((top.0).abs() < 1e-6);
        assert!((top.1 - (-100.0)).abs() < 1e-6);
        let right = ellipse_point_at_image_angle(&e, 90.0);
        assert!((right.0 - 100.0).abs() < 1e-6);
        assert!((right.1).abs() < 1e-6);
    }
}
