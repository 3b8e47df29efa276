//! Orchestrator (C10, spec §4.1): runs C1-C6 per camera in parallel on
//! rayon's global pool, then warps (C7) and triangulates (C8) the
//! results into one [`DetectionRecord`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info_span, warn};

use crate::calibration::CameraCalibration;
use crate::config::DetectionConfig;
use crate::board_cache::BoardCacheRegistry;
use crate::error::DartVisionError;
use crate::geometry::covariance_eigen;
use crate::image_io::decode_and_crop;
use crate::line_fit::fit_shaft_line;
use crate::motion::{compute_motion, Mask};
use crate::scorer::score_point;
use crate::shape::find_dart_region;
use crate::tip::locate_tip;
use crate::triangulate::{triangulate, TriangulationInput};
use crate::types::{CameraDiagnostics, CameraId, CameraOutcome, DetectionMethod, DetectionRecord};

/// One camera's raw input to a `detect` call: current and baseline image
/// bytes, aligned by `camera_id` (spec §4.1, §6).
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub camera_id: CameraId,
    pub current_bytes: Vec<u8>,
    pub before_bytes: Vec<u8>,
}

/// Signed axial coordinate of every dart-region pixel projected onto
/// `line`'s direction, anchored at `line`'s own origin. Returns the
/// minimum and maximum (spec §4.6 "project all dart-region pixels").
fn axial_extent(region: &Mask, line: &crate::types::ShaftLine) -> (f64, f64) {
    let mut min_t = f64::MAX;
    let mut max_t = f64::MIN;
    for (x, y) in region.iter_set_pixels() {
        let dx = x as f64 - line.x0;
        let dy = y as f64 - line.y0;
        let t = dx * line.vx + dy * line.vy;
        min_t = min_t.min(t);
        max_t = max_t.max(t);
    }
    if min_t > max_t {
        (0.0, 0.0)
    } else {
        (min_t, max_t)
    }
}

/// Angle, in degrees, between the chosen shaft line and the plain PCA
/// direction of the same barrel pixels (spec §3 `CameraResult`'s
/// "angle between the shaft line and the PCA line").
fn pca_ridge_angle_delta_deg(barrel: &Mask, line: &crate::types::ShaftLine) -> f64 {
    let pts: Vec<(f64, f64)> = barrel.iter_set_pixels().map(|(x, y)| (x as f64, y as f64)).collect();
    if pts.len() < 2 {
        return 0.0;
    }
    let (_centroid, _eig, (px, py)) = covariance_eigen(&pts);
    let dot = (px * line.vx + py * line.vy).clamp(-1.0, 1.0);
    let angle = dot.abs().acos().to_degrees();
    90.0 - (90.0 - angle).abs()
}

/// Everything one camera's branch produced: its outcome record, the new
/// motion mask to promote into the board cache on success, and (if a
/// tip was found) its contribution to triangulation.
struct CameraBranch {
    outcome: CameraOutcome,
    mask: Option<Arc<Mask>>,
    triangulation_input: Option<TriangulationInput>,
}

fn skipped_branch(camera_id: CameraId, err: &DartVisionError) -> CameraBranch {
    CameraBranch {
        outcome: CameraOutcome::skipped(camera_id, err.to_string()),
        mask: None,
        triangulation_input: None,
    }
}

/// Runs C1-C6 for one camera.
fn process_camera(frame: &CameraFrame, calib: &CameraCalibration, cache: &BoardCacheRegistry, board_id: &str, cfg: &DetectionConfig) -> CameraBranch {
    let span = info_span!("camera", camera_id = %frame.camera_id);
    let _enter = span.enter();

    let current = match decode_and_crop(&frame.current_bytes, calib.board_roi, &frame.camera_id) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "current frame decode failed");
            return skipped_branch(frame.camera_id.clone(), &e);
        }
    };
    let before = match decode_and_crop(&frame.before_bytes, calib.board_roi, &frame.camera_id) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "baseline frame decode failed");
            return skipped_branch(frame.camera_id.clone(), &e);
        }
    };

    let prev_masks = cache.masks_for(board_id, &frame.camera_id);
    let (motion_result, segmentation) = match compute_motion(
        &current.image,
        &before.image,
        &prev_masks,
        calib.resolution_scale,
        &cfg.motion,
        &frame.camera_id,
    ) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "no dart motion");
            return skipped_branch(frame.camera_id.clone(), &e);
        }
    };

    let mut diagnostics = CameraDiagnostics {
        roi_fallback: current.roi_fallback || before.roi_fallback,
        ..CameraDiagnostics::default()
    };

    let shape = match find_dart_region(&motion_result.final_mask, &cfg.shape, calib.resolution_scale) {
        Some(s) => s,
        None => {
            let err = DartVisionError::NoLine {
                camera_id: frame.camera_id.clone(),
            };
            warn!("no elongated dart-shaped component survived the shape filter");
            return CameraBranch {
                outcome: CameraOutcome {
                    camera_id: frame.camera_id.clone(),
                    tip: None,
                    mask_quality: segmentation.new_dart_pixel_ratio,
                    shaft_line: None,
                    provisional_score: None,
                    diagnostics,
                    skip_reason: Some(err.to_string()),
                },
                mask: None,
                triangulation_input: None,
            };
        }
    };

    diagnostics.barrel_pixel_count = shape.area;
    diagnostics.barrel_aspect_ratio = shape.aspect_ratio;

    let (line, ridge_residual) = fit_shaft_line(&shape.dart_region, &shape.barrel_candidate, &cfg.line_fit, calib.resolution_scale);
    diagnostics.ridge_residual = ridge_residual;

    let line = match line {
        Some(l) => l,
        None => {
            let err = DartVisionError::NoLine {
                camera_id: frame.camera_id.clone(),
            };
            warn!("shaft line elongation below threshold for every estimator");
            return CameraBranch {
                outcome: CameraOutcome {
                    camera_id: frame.camera_id.clone(),
                    tip: None,
                    mask_quality: segmentation.new_dart_pixel_ratio,
                    shaft_line: None,
                    provisional_score: None,
                    diagnostics,
                    skip_reason: Some(err.to_string()),
                },
                mask: None,
                triangulation_input: None,
            };
        }
    };

    diagnostics.pca_ridge_angle_delta_deg = pca_ridge_angle_delta_deg(&shape.barrel_candidate, &line);

    let (min_t, max_t) = axial_extent(&shape.dart_region, &line);
    diagnostics.shaft_length = (max_t - min_t).max(0.0);
    diagnostics.mean_thickness = shape.area as f64 / diagnostics.shaft_length.max(1.0);

    let tip = match locate_tip(&shape.dart_region, &line, max_t, &cfg.tip) {
        Some(t) => t,
        None => {
            let err = DartVisionError::NoTip {
                camera_id: frame.camera_id.clone(),
            };
            warn!("no tip found walking outward from the barrel");
            return CameraBranch {
                outcome: CameraOutcome {
                    camera_id: frame.camera_id.clone(),
                    tip: None,
                    mask_quality: segmentation.new_dart_pixel_ratio,
                    shaft_line: Some(line),
                    provisional_score: None,
                    diagnostics,
                    skip_reason: Some(err.to_string()),
                },
                mask: None,
                triangulation_input: None,
            };
        }
    };

    // Lift ROI-cropped coordinates back into full-image space before
    // scoring or warping (calibration is expressed in full-image pixels).
    let (ox, oy) = (current.roi_offset.0 as f64, current.roi_offset.1 as f64);
    let full_tip = (tip.sub_x + ox, tip.sub_y + oy);
    let full_origin = (line.x0 + ox, line.y0 + oy);

    let provisional = score_point(
        full_tip,
        calib,
        &cfg.scoring,
        segmentation.new_dart_pixel_ratio,
        line.inlier_ratio,
    );

    let warped_tip = calib.tps.warp_point(full_tip);
    let warped_direction = {
        let step = 4.0 * calib.resolution_scale.max(0.1);
        let d = calib.tps.warp_direction(full_origin, line.direction(), step);
        if d == (0.0, 0.0) { None } else { Some(d) }
    };

    let mask = Arc::new(motion_result.final_mask);

    CameraBranch {
        outcome: CameraOutcome {
            camera_id: frame.camera_id.clone(),
            tip: Some(tip),
            mask_quality: segmentation.new_dart_pixel_ratio,
            shaft_line: Some(line),
            provisional_score: Some(provisional),
            diagnostics,
            skip_reason: None,
        },
        mask: Some(mask),
        triangulation_input: Some(TriangulationInput {
            camera_id: frame.camera_id.clone(),
            warped_tip,
            warped_direction,
            provisional,
        }),
    }
}

/// Runs one full detection for `dart_number` on `board_id`, fanning the
/// per-camera branch (C1-C6) out across rayon's pool before warping
/// (C7) and triangulating (C8) (spec §4.1, §5).
pub fn detect(
    dart_number: u8,
    board_id: &str,
    frames: &[CameraFrame],
    calibrations: &HashMap<CameraId, CameraCalibration>,
    cache: &BoardCacheRegistry,
    cfg: &DetectionConfig,
) -> DetectionRecord {
    let span = info_span!("detect", board_id, dart_number);
    let _enter = span.enter();

    let branches: Vec<CameraBranch> = frames
        .par_iter()
        .map(|frame| match calibrations.get(&frame.camera_id) {
            Some(calib) => process_camera(frame, calib, cache, board_id, cfg),
            None => skipped_branch(
                frame.camera_id.clone(),
                &DartVisionError::internal(format!("camera {} has no calibration", frame.camera_id)),
            ),
        })
        .collect();

    let mut per_camera: BTreeMap<CameraId, CameraOutcome> = BTreeMap::new();
    let mut triangulation_inputs = Vec::new();
    let mut masks_to_store: Vec<(CameraId, Arc<Mask>)> = Vec::new();

    for branch in branches {
        if let Some(mask) = branch.mask {
            masks_to_store.push((branch.outcome.camera_id.clone(), mask));
        }
        if let Some(input) = branch.triangulation_input {
            triangulation_inputs.push(input);
        }
        per_camera.insert(branch.outcome.camera_id.clone(), branch.outcome);
    }

    if triangulation_inputs.len() < 2 {
        let reason = format!(
            "insufficient_cameras: only {} of {} produced a usable tip",
            triangulation_inputs.len(),
            frames.len()
        );
        warn!(usable = triangulation_inputs.len(), total = frames.len(), "insufficient cameras");
        return DetectionRecord::no_detection(reason, per_camera);
    }

    let outcome = triangulate(&triangulation_inputs, &cfg.triangulation, &cfg.scoring);

    if let Some(dropped_id) = &outcome.camera_dropped {
        if let Some(o) = per_camera.get_mut(dropped_id) {
            o.diagnostics.dropped = true;
        }
    }
    if outcome.wire_ambiguous {
        for o in per_camera.values_mut() {
            if let Some(p) = &o.provisional_score {
                if p.segment != outcome.score.segment {
                    o.diagnostics.segment_label_corrected = true;
                }
            }
        }
    }
    if outcome.radial_clamp_applied {
        for o in per_camera.values_mut() {
            o.diagnostics.radial_clamp_applied = true;
        }
    }

    let reason = match &outcome.method {
        DetectionMethod::NoDetection(r) => r.clone(),
        _ => String::new(),
    };

    if !matches!(outcome.method, DetectionMethod::NoDetection(_)) {
        for (camera_id, mask) in masks_to_store {
            cache.add_mask(board_id, &camera_id, mask);
        }
    }

    DetectionRecord {
        segment: outcome.score.segment,
        multiplier: outcome.score.multiplier,
        method: outcome.method,
        confidence: outcome.confidence,
        board_point: outcome.board_point,
        total_residual: outcome.total_residual,
        camera_dropped: outcome.camera_dropped,
        wire_ambiguous: outcome.wire_ambiguous,
        winner_pct: outcome.winner_pct,
        per_camera,
        reason,
    }
}
