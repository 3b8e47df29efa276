//! Triangulator (C8, spec §4.9): reconciles N cameras' warped tips and
//! shaft directions into one board-frame detection.

use crate::config::{ScoringConfig, TriangulationConfig};
use crate::geometry::{angular_spread_deg, intersect_lines, nearest_ring_boundary_distance, point_line_distance};
use crate::scorer::{score_board_point, segment_label_for_index};
use crate::types::{CameraId, DetectionMethod, ScoreResult};

/// One camera's contribution to triangulation: its tip and shaft
/// direction already warped into the board frame, plus its own
/// image-space provisional score (used for the unanimous check and the
/// wire-boundary vote).
#[derive(Debug, Clone)]
pub struct TriangulationInput {
    pub camera_id: CameraId,
    pub warped_tip: (f64, f64),
    pub warped_direction: Option<(f64, f64)>,
    pub provisional: ScoreResult,
}

/// Everything the orchestrator needs to assemble the final
/// [`DetectionRecord`](crate::types::DetectionRecord).
#[derive(Debug, Clone)]
pub struct TriangulationOutcome {
    pub score: ScoreResult,
    pub method: DetectionMethod,
    pub confidence: f64,
    pub board_point: Option<(f64, f64)>,
    pub total_residual: f64,
    pub camera_dropped: Option<CameraId>,
    pub wire_ambiguous: bool,
    pub winner_pct: Option<f64>,
    /// Whether the radial stability clamp (spec §4.9) swapped the best
    /// pair's point for the runner-up. Informational only.
    pub radial_clamp_applied: bool,
}

impl TriangulationOutcome {
    fn no_detection(reason: impl Into<String>) -> Self {
        TriangulationOutcome {
            score: ScoreResult::MISS,
            method: DetectionMethod::NoDetection(reason.into()),
            confidence: 0.0,
            board_point: None,
            total_residual: 0.0,
            camera_dropped: None,
            wire_ambiguous: false,
            winner_pct: None,
            radial_clamp_applied: false,
        }
    }
}

struct Pair<'a> {
    a: &'a TriangulationInput,
    b: &'a TriangulationInput,
    point: (f64, f64),
    residual: f64,
    angular_spread: f64,
}

fn centroid(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len().max(1) as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    (sx / n, sy / n)
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Board-frame angle (degrees, top = 0, clockwise) of a board point, and
/// its segment index `0..20` (index 0 is segment "20", per the C7
/// contract putting it on the positive y-axis).
fn board_angle_and_index(point: (f64, f64)) -> (f64, usize) {
    let theta_deg = point.0.atan2(point.1).to_degrees().rem_euclid(360.0);
    let idx = ((theta_deg + 9.0) / 18.0).floor() as i64;
    (theta_deg, idx.rem_euclid(20) as usize)
}

/// Reconciles every camera's warped tip/direction/provisional score into
/// one [`TriangulationOutcome`]. `inputs` must already be filtered to
/// cameras that produced a usable tip (the orchestrator emits
/// `insufficient_cameras` itself when fewer than two remain).
pub fn triangulate(
    inputs: &[TriangulationInput],
    cfg: &TriangulationConfig,
    scoring: &ScoringConfig,
) -> TriangulationOutcome {
    if inputs.len() < 2 {
        return TriangulationOutcome::no_detection(format!(
            "insufficient_cameras: only {} of {} produced a usable tip",
            inputs.len(),
            inputs.len()
        ));
    }

    if let Some(outcome) = try_unanimous(inputs, scoring) {
        return outcome;
    }

    let mut pairs = Vec::new();
    for i in 0..inputs.len() {
        for j in (i + 1)..inputs.len() {
            let (a, b) = (&inputs[i], &inputs[j]);
            let (Some(da), Some(db)) = (a.warped_direction, b.warped_direction) else {
                continue;
            };
            let spread = angular_spread_deg(da, db);
            if spread < cfg.min_angular_spread_deg {
                continue;
            }
            let Some(point) = intersect_lines(a.warped_tip, da, b.warped_tip, db) else {
                continue;
            };
            let radius = (point.0 * point.0 + point.1 * point.1).sqrt();
            if radius > scoring.double_outer_norm * cfg.board_radius_factor {
                continue;
            }
            let residual = point_line_distance(point, a.warped_tip, da)
                .max(point_line_distance(point, b.warped_tip, db));
            pairs.push(Pair {
                a,
                b,
                point,
                residual,
                angular_spread: spread,
            });
        }
    }

    if pairs.is_empty() {
        return TriangulationOutcome::no_detection(
            "no camera pair survived triangulation (all parallel or off-board)",
        );
    }

    pairs.sort_by(|p, q| {
        p.residual
            .partial_cmp(&q.residual)
            .unwrap()
            .then(q.angular_spread.partial_cmp(&p.angular_spread).unwrap())
    });

    let mut camera_dropped: Option<CameraId> = None;
    if inputs.len() == 3 {
        let residuals: Vec<f64> = pairs.iter().map(|p| p.residual).collect();
        let med = median(residuals);
        let best = &pairs[0];
        if med > 1e-9 && best.residual >= cfg.drop_residual_ratio * med {
            let in_pair = [&best.a.camera_id, &best.b.camera_id];
            if let Some(dropped) = inputs
                .iter()
                .map(|i| &i.camera_id)
                .find(|id| !in_pair.contains(id))
            {
                camera_dropped = Some(dropped.clone());
            }
        }
    }

    let mut best_point = pairs[0].point;
    let mut best_residual = pairs[0].residual;
    let mut radial_clamp_applied = false;

    if pairs.len() > 1 {
        let best_rho = (best_point.0 * best_point.0 + best_point.1 * best_point.1).sqrt();
        let edges = ring_edges(scoring);
        let best_ring_dist = nearest_ring_boundary_distance(best_rho, &edges);
        if best_ring_dist <= cfg.ring_boundary_clamp_band {
            let alt = &pairs[1];
            let alt_rho = (alt.point.0 * alt.point.0 + alt.point.1 * alt.point.1).sqrt();
            let alt_ring_dist = nearest_ring_boundary_distance(alt_rho, &edges);
            let crosses_boundary = (best_rho - scoring.double_outer_norm).signum()
                != (alt_rho - scoring.double_outer_norm).signum()
                || (best_rho - scoring.triple_outer_norm).signum()
                    != (alt_rho - scoring.triple_outer_norm).signum()
                || (best_rho - scoring.triple_inner_norm).signum()
                    != (alt_rho - scoring.triple_inner_norm).signum()
                || (best_rho - scoring.double_inner_norm).signum()
                    != (alt_rho - scoring.double_inner_norm).signum();
            if crosses_boundary && alt_ring_dist > best_ring_dist {
                best_point = alt.point;
                best_residual = alt.residual;
                radial_clamp_applied = true;
            }
        }
    }

    let mut final_score = score_board_point(best_point, scoring);
    let (_theta_deg, base_idx) = board_angle_and_index(best_point);
    let mut wire_ambiguous = false;
    let mut winner_pct = None;

    if final_score.boundary_distance_deg < scoring.wire_ambiguous_threshold_deg {
        wire_ambiguous = true;
        let theta = board_angle_and_index(best_point).0;
        let base_center = base_idx as f64 * 18.0;
        let neighbor_idx = if (theta - base_center + 540.0).rem_euclid(360.0) - 180.0 >= 0.0 {
            (base_idx + 1) % 20
        } else {
            (base_idx + 19) % 20
        };
        let base_label = final_score.segment;
        let neighbor_label = segment_label_for_index(neighbor_idx);

        let base_votes = inputs
            .iter()
            .filter(|i| i.provisional.segment == base_label)
            .count();
        let neighbor_votes = inputs
            .iter()
            .filter(|i| i.provisional.segment == neighbor_label)
            .count();
        let total = inputs.len();

        if neighbor_votes > base_votes {
            final_score.segment = neighbor_label;
            winner_pct = Some(neighbor_votes as f64 / total as f64);
        } else {
            winner_pct = Some(base_votes as f64 / total as f64);
        }
    }

    let method = if wire_ambiguous {
        DetectionMethod::Majority
    } else if camera_dropped.is_some() {
        DetectionMethod::Weighted
    } else {
        DetectionMethod::Intersection
    };

    let median_camera_conf = median(inputs.iter().map(|i| i.provisional.confidence).collect());
    let residual_conf = (1.0 / (1.0 + best_residual)).clamp(0.0, 1.0);
    let wire_conf = winner_pct.unwrap_or(1.0);
    let confidence = ((residual_conf + median_camera_conf + wire_conf) / 3.0).clamp(0.0, 1.0);

    TriangulationOutcome {
        score: final_score,
        method,
        confidence,
        board_point: Some(best_point),
        total_residual: best_residual,
        camera_dropped,
        wire_ambiguous,
        winner_pct,
        radial_clamp_applied,
    }
}

fn try_unanimous(inputs: &[TriangulationInput], scoring: &ScoringConfig) -> Option<TriangulationOutcome> {
    let first = &inputs[0].provisional;
    let all_agree = inputs
        .iter()
        .all(|i| i.provisional.segment == first.segment && i.provisional.multiplier == first.multiplier);
    let all_confident = inputs
        .iter()
        .all(|i| i.provisional.confidence > scoring.unanimity_confidence_threshold);
    if !all_agree || !all_confident {
        return None;
    }
    let confidence = inputs
        .iter()
        .map(|i| i.provisional.confidence)
        .fold(f64::MAX, f64::min);
    let board_point = Some(centroid(&inputs.iter().map(|i| i.warped_tip).collect::<Vec<_>>()));
    Some(TriangulationOutcome {
        score: *first,
        method: DetectionMethod::Unanimous,
        confidence,
        board_point,
        total_residual: 0.0,
        camera_dropped: None,
        wire_ambiguous: false,
        winner_pct: None,
        radial_clamp_applied: false,
    })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Zone;

    fn input(camera_id: &str, tip: (f64, f64), dir: (f64, f64), score: ScoreResult) -> TriangulationInput {
        TriangulationInput {
            camera_id: camera_id.to_string(),
            warped_tip: tip,
            warped_direction: Some(dir),
            provisional: score,
        }
    }

    fn triple_20() -> ScoreResult {
        ScoreResult {
            segment: 20,
            multiplier: 3,
            zone: Zone::Triple,
            boundary_distance_deg: 5.0,
            confidence: 0.92,
        }
    }

    #[test]
    fn unanimous_short_circuit() {
        let inputs = vec![
            input("cam0", (0.0, 1.03), (1.0, 0.0), triple_20()),
            input("cam1", (0.01, 1.03), (0.9, 0.1), triple_20()),
            input("cam2", (-0.01, 1.03), (0.8, -0.1), triple_20()),
        ];
        let cfg = TriangulationConfig::default();
        let scoring = ScoringConfig::default();
        let outcome = triangulate(&inputs, &cfg, &scoring);
        assert_eq!(outcome.method, DetectionMethod::Unanimous);
        assert_eq!(outcome.score.segment, 20);
        assert_eq!(outcome.score.multiplier, 3);
        assert!(outcome.confidence >= 0.9);
    }

    #[test]
    fn bullseye_from_two_cameras() {
        // Confidence kept below the unanimity threshold so this exercises
        // the pairwise-intersection path rather than the short-circuit.
        let low_conf = ScoreResult {
            segment: 25,
            multiplier: 2,
            zone: Zone::InnerBull,
            boundary_distance_deg: 9.0,
            confidence: 0.7,
        };
        let inputs = vec![
            input("cam0", (-0.02, 0.0), (1.0, 0.05), low_conf),
            input("cam1", (0.02, 0.0), (-1.0, 0.05), low_conf),
        ];
        let cfg = TriangulationConfig::default();
        let scoring = ScoringConfig::default();
        let outcome = triangulate(&inputs, &cfg, &scoring);
        assert_eq!(outcome.score.zone, Zone::InnerBull);
        assert_eq!(outcome.score.segment, 25);
        assert_eq!(outcome.score.multiplier, 2);
    }

    #[test]
    fn miss_when_far_off_board() {
        let miss = ScoreResult::MISS;
        let inputs = vec![
            input("cam0", (0.0, 3.0), (1.0, 0.0), miss),
            input("cam1", (0.02, 3.0), (-1.0, 0.02), miss),
        ];
        let cfg = TriangulationConfig::default();
        let scoring = ScoringConfig::default();
        let outcome = triangulate(&inputs, &cfg, &scoring);
        assert!(outcome.score.is_miss());
    }

    #[test]
    fn insufficient_cameras_reported() {
        let inputs = vec![input("cam0", (0.0, 0.0), (1.0, 0.0), ScoreResult::MISS)];
        let cfg = TriangulationConfig::default();
        let scoring = ScoringConfig::default();
        let outcome = triangulate(&inputs, &cfg, &scoring);
        assert!(matches!(outcome.method, DetectionMethod::NoDetection(_)));
    }

    #[test]
    fn parallel_lines_are_rejected_as_a_pair() {
        let a = ScoreResult {
            segment: 1,
            multiplier: 1,
            zone: Zone::Single,
            boundary_distance_deg: 5.0,
            confidence: 0.6,
        };
        let inputs = vec![
            input("cam0", (0.0, 0.5), (1.0, 0.0), a),
            input("cam1", (0.0, 0.6), (1.0, 0.0), a),
        ];
        let cfg = TriangulationConfig::default();
        let scoring = ScoringConfig::default();
        let outcome = triangulate(&inputs, &cfg, &scoring);
        assert!(matches!(outcome.method, DetectionMethod::NoDetection(_)));
    }
}
