//! Per-camera scorer (C6, spec §4.7): converts one camera's sub-pixel tip
//! into a provisional segment/multiplier/zone read, using that camera's
//! own `segment_boundary_angles` and ellipse-derived radial scale. This
//! is a provisional read only — the triangulator (C8) re-scores the
//! warped board-frame point for the final [`DetectionRecord`].

use crate::calibration::CameraCalibration;
use crate::config::ScoringConfig;
use crate::geometry::nearest_ring_boundary_distance;
use crate::types::{ScoreResult, Zone};

/// Clockwise dartboard segment order starting from "20", matching the
/// WDF standard layout and the image-angle convention (theta = 0 at
/// `segment_20_index`'s boundary).
const SEGMENT_LABELS: [u8; 20] = [
    20, 1, 18, 4, 13, 6, 10, 15, 2, 17, 3, 19, 7, 16, 8, 11, 14, 9, 12, 5,
];

/// Normalized-radius margin used to damp confidence near a ring
/// boundary, independent of the triangulator's own clamp band (that one
/// operates in the warped board frame; this one in raw per-camera
/// radius, which can disagree slightly before warping).
const RING_MARGIN_NORM: f64 = 0.015;

/// Angle (image convention: top = 0, clockwise positive) and normalized
/// radius of `point` relative to `calib`'s center and outer-double
/// ellipse, approximating the board-frame radius before the TPS warp is
/// available.
fn angle_and_radius(point: (f64, f64), calib: &CameraCalibration) -> (f64, f64) {
    let dx = point.0 - calib.center.0;
    let dy = point.1 - calib.center.1;
    let theta = dx.atan2(-dy).rem_euclid(2.0 * std::f64::consts::PI);

    let r_pixel = (dx * dx + dy * dy).sqrt();
    let theta_deg = theta.to_degrees();
    let outer = calib
        .ellipses
        .outer_double
        .expect("calibration always carries outer_double, enforced at build time");
    let boundary = crate::calibration::ellipse_point_at_image_angle(&outer, theta_deg);
    let bdx = boundary.0 - calib.center.0;
    let bdy = boundary.1 - calib.center.1;
    let r_boundary = (bdx * bdx + bdy * bdy).sqrt().max(1e-6);

    (theta, r_pixel / r_boundary)
}

/// Index into `segment_boundary_angles` (and, via `segment_20_index`,
/// into [`SEGMENT_LABELS`]) of the segment containing `theta`. Segment
/// `i` spans `(angles[(i + 19) % 20], angles[i]]` with wraparound at
/// `2*pi`.
fn segment_index_for_angle(angles: &[f64; 20], theta: f64) -> usize {
    for (i, &upper) in angles.iter().enumerate() {
        let lower = angles[(i + 19) % 20];
        let wraps = lower > upper;
        let in_range = if wraps {
            theta > lower || theta <= upper
        } else {
            theta > lower && theta <= upper
        };
        if in_range {
            return i;
        }
    }
    0
}

/// Minimum angular distance, in degrees, from `theta` to either edge of
/// the segment it falls in.
fn boundary_distance_deg(angles: &[f64; 20], theta: f64, idx: usize) -> f64 {
    let upper = angles[idx];
    let lower = angles[(idx + 19) % 20];
    let two_pi = 2.0 * std::f64::consts::PI;
    let dist_to = |edge: f64| -> f64 {
        let d = (theta - edge).abs();
        d.min(two_pi - d)
    };
    dist_to(upper).min(dist_to(lower)).to_degrees()
}

fn zone_and_multiplier(rho: f64, cfg: &ScoringConfig) -> (Zone, u8) {
    if rho <= cfg.inner_bull_norm {
        (Zone::InnerBull, 2)
    } else if rho <= cfg.outer_bull_norm {
        (Zone::OuterBull, 1)
    } else if rho <= cfg.triple_inner_norm {
        (Zone::Single, 1)
    } else if rho <= cfg.triple_outer_norm {
        (Zone::Triple, 3)
    } else if rho <= cfg.double_inner_norm {
        (Zone::Single, 1)
    } else if rho <= cfg.double_outer_norm {
        (Zone::Double, 2)
    } else {
        (Zone::Miss, 0)
    }
}

fn ring_edges(cfg: &ScoringConfig) -> [f64; 6] {
    [
        cfg.inner_bull_norm,
        cfg.outer_bull_norm,
        cfg.triple_inner_norm,
        cfg.triple_outer_norm,
        cfg.double_inner_norm,
        cfg.double_outer_norm,
    ]
}

/// The WDF segment label for a board-frame segment index (`0` is
/// segment "20", per the C7 contract putting it on the positive y-axis;
/// no per-camera `segment_20_index` offset applies in the board frame).
pub(crate) fn segment_label_for_index(idx: usize) -> u8 {
    SEGMENT_LABELS[idx % 20]
}

/// Re-scores a point already expressed in the normalized board frame
/// (outer-double = unit circle, segment 20 centered on the positive
/// y-axis), per spec §4.9's "re-apply the per-camera scorer to the
/// warped point". Used only by the triangulator for the final score.
pub fn score_board_point(point: (f64, f64), cfg: &ScoringConfig) -> ScoreResult {
    let rho = (point.0 * point.0 + point.1 * point.1).sqrt();
    let (zone, multiplier) = zone_and_multiplier(rho, cfg);

    let theta_deg = point.0.atan2(point.1).to_degrees().rem_euclid(360.0);
    let idx = ((theta_deg + 9.0) / 18.0).floor() as i64;
    let idx = idx.rem_euclid(20) as usize;
    let d = (theta_deg - 9.0).rem_euclid(18.0);
    let wire_dist_deg = d.min(18.0 - d);

    let segment = match zone {
        Zone::InnerBull | Zone::OuterBull => 25,
        Zone::Miss => 0,
        _ => segment_label_for_index(idx),
    };

    let wire_conf = (wire_dist_deg / (wire_dist_deg + cfg.wire_ambiguous_threshold_deg)).clamp(0.0, 1.0);
    let ring_dist = nearest_ring_boundary_distance(rho, &ring_edges(cfg));
    let ring_conf = (ring_dist / (ring_dist + RING_MARGIN_NORM)).clamp(0.0, 1.0);
    let confidence = if zone == Zone::Miss { ring_conf } else { wire_conf * ring_conf };

    ScoreResult {
        segment,
        multiplier,
        zone,
        boundary_distance_deg: wire_dist_deg,
        confidence,
    }
}

/// Scores one camera's tip point (full image pixel coordinates, i.e.
/// already lifted out of the ROI crop by `roi_offset`). `mask_quality`
/// (the camera's `new_dart_pixel_ratio`) and `inlier_ratio` (the fitted
/// shaft line's) are the remaining two factors spec §4.7 requires
/// `confidence` to be monotone increasing in, alongside the two angular
/// distances already computed here.
pub fn score_point(
    point: (f64, f64),
    calib: &CameraCalibration,
    cfg: &ScoringConfig,
    mask_quality: f64,
    inlier_ratio: f64,
) -> ScoreResult {
    let (theta, rho) = angle_and_radius(point, calib);
    let (zone, multiplier) = zone_and_multiplier(rho, cfg);

    let idx = segment_index_for_angle(&calib.segment_boundary_angles, theta);
    let wire_dist_deg = boundary_distance_deg(&calib.segment_boundary_angles, theta, idx);

    let segment = match zone {
        Zone::InnerBull | Zone::OuterBull => 25,
        Zone::Miss => 0,
        _ => {
            let label_idx = (idx + 20 - calib.segment_20_index) % 20;
            SEGMENT_LABELS[label_idx]
        }
    };

    let wire_conf = (wire_dist_deg / (wire_dist_deg + cfg.wire_ambiguous_threshold_deg)).clamp(0.0, 1.0);
    let ring_dist = nearest_ring_boundary_distance(rho, &ring_edges(cfg));
    let ring_conf = (ring_dist / (ring_dist + RING_MARGIN_NORM)).clamp(0.0, 1.0);
    let mask_conf = mask_quality.clamp(0.0, 1.0);
    let inlier_conf = inlier_ratio.clamp(0.0, 1.0);
    let confidence = if zone == Zone::Miss {
        ring_conf * mask_conf * inlier_conf
    } else {
        wire_conf * ring_conf * mask_conf * inlier_conf
    };

    ScoreResult {
        segment,
        multiplier,
        zone,
        boundary_distance_deg: wire_dist_deg,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::test_support::simple_calibration;

    #[test]
    fn bullseye_scores_inner_bull() {
        let calib = simple_calibration();
        let cfg = ScoringConfig::default();
        let result = score_point(calib.center, &calib, &cfg, 1.0, 1.0);
        assert_eq!(result.zone, Zone::InnerBull);
        assert_eq!(result.segment, 25);
        assert_eq!(result.multiplier, 2);
    }

    #[test]
    fn far_outside_board_is_a_miss() {
        let calib = simple_calibration();
        let cfg = ScoringConfig::default();
        let point = (calib.center.0 + 10_000.0, calib.center.1);
        let result = score_point(point, &calib, &cfg, 1.0, 1.0);
        assert_eq!(result.zone, Zone::Miss);
        assert_eq!(result.segment, 0);
        assert_eq!(result.multiplier, 0);
    }

    #[test]
    fn segment_20_lands_above_center() {
        let calib = simple_calibration();
        let cfg = ScoringConfig::default();
        // Just inside the double ring, straight up from center: image-angle 0.
        let point = (calib.center.0, calib.center.1 - 160.0);
        let result = score_point(point, &calib, &cfg, 1.0, 1.0);
        assert_eq!(result.segment, 20);
    }

    #[test]
    fn confidence_drops_near_wire() {
        let calib = simple_calibration();
        let cfg = ScoringConfig::default();
        let on_wire_theta_deg = 360.0 / 20.0; // first boundary angle
        let theta = on_wire_theta_deg.to_radians();
        let r = 160.0;
        let point = (
            calib.center.0 + r * theta.sin(),
            calib.center.1 - r * theta.cos(),
        );
        let mid_theta = theta - (9.0_f64).to_radians();
        let mid_point = (
            calib.center.0 + r * mid_theta.sin(),
            calib.center.1 - r * mid_theta.cos(),
        );
        let near_wire = score_point(point, &calib, &cfg, 1.0, 1.0);
        let mid_segment = score_point(mid_point, &calib, &cfg, 1.0, 1.0);
        assert!(near_wire.confidence < mid_segment.confidence);
    }

    #[test]
    fn confidence_is_monotone_in_mask_quality_and_inlier_ratio() {
        let calib = simple_calibration();
        let cfg = ScoringConfig::default();
        let point = (calib.center.0, calib.center.1 - 160.0);
        let high = score_point(point, &calib, &cfg, 0.9, 0.9);
        let low_mask = score_point(point, &calib, &cfg, 0.3, 0.9);
        let low_inlier = score_point(point, &calib, &cfg, 0.9, 0.3);
        assert!(low_mask.confidence < high.confidence);
        assert!(low_inlier.confidence < high.confidence);
    }

    #[test]
    fn board_point_origin_is_inner_bull() {
        let cfg = ScoringConfig::default();
        let result = score_board_point((0.0, 0.0), &cfg);
        assert_eq!(result.zone, Zone::InnerBull);
        assert_eq!(result.segment, 25);
    }

    #[test]
    fn board_point_on_positive_y_axis_is_segment_20() {
        let cfg = ScoringConfig::default();
        let result = score_board_point((0.0, 0.5), &cfg);
        assert_eq!(result.segment, 20);
    }

    #[test]
    fn board_point_beyond_unit_circle_is_a_miss() {
        let cfg = ScoringConfig::default();
        let result = score_board_point((0.0, 1.2), &cfg);
        assert!(result.is_miss());
    }
}
