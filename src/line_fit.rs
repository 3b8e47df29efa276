//! Shaft line fit (C4, spec §4.5): ridge / PCA / RANSAC estimators of
//! the dart shaft axis, with tie-breaking between them.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::LineFitConfig;
use crate::geometry::{covariance_eigen, elongation_from_eigenvalues, point_line_distance};
use crate::motion::Mask;
use crate::types::{FitMethod, ShaftLine};

/// RANSAC uses a fixed seed so that `detect` stays deterministic for
/// identical inputs (spec §8) without needing true entropy — there is
/// no adversary here, only a search over candidate inlier sets.
const RANSAC_SEED: u64 = 0xD47_7105;

fn pixels_of(mask: &Mask) -> Vec<(f64, f64)> {
    mask.iter_set_pixels().map(|(x, y)| (x as f64, y as f64)).collect()
}

fn inlier_ratio(points: &[(f64, f64)], origin: (f64, f64), dir: (f64, f64), max_dist: f64) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let inliers = points
        .iter()
        .filter(|&&p| point_line_distance(p, origin, dir) <= max_dist)
        .count();
    inliers as f64 / points.len() as f64
}

struct Candidate {
    line: ShaftLine,
    elongation: f64,
}

fn pca_candidate(points: &[(f64, f64)], max_dist: f64) -> Option<Candidate> {
    if points.len() < 2 {
        return None;
    }
    let (centroid, (l1, l2), dir) = covariance_eigen(points);
    let elongation = elongation_from_eigenvalues(l1, l2);
    let ratio = inlier_ratio(points, centroid, dir, max_dist);
    Some(Candidate {
        line: ShaftLine::new(dir.0, dir.1, centroid.0, centroid.1, elongation, FitMethod::Pca, ratio),
        elongation,
    })
}

/// Centerline ridge fit: bins the barrel's pixels along a coarse PCA
/// axis, regresses each bin's perpendicular-centroid offset against its
/// axial position, and folds that offset back into a refined direction.
/// `ridge_residual_out`, if given, receives the mean absolute residual
/// of the regression (a diagnostics field, not part of tie-breaking).
fn ridge_candidate(
    points: &[(f64, f64)],
    max_dist: f64,
    ridge_residual_out: &mut f64,
) -> Option<Candidate> {
    if points.len() < 4 {
        return None;
    }
    let (centroid, (l1, l2), coarse_dir) = covariance_eigen(points);
    let (ax, ay) = coarse_dir;
    let (nx, ny) = (-ay, ax);

    let mut bins: HashMap<i64, (f64, f64)> = HashMap::new(); // bin -> (sum_d, count)
    for &(x, y) in points {
        let dx = x - centroid.0;
        let dy = y - centroid.1;
        let t = dx * ax + dy * ay;
        let d = dx * nx + dy * ny;
        let bin = t.round() as i64;
        let e = bins.entry(bin).or_insert((0.0, 0.0));
        e.0 += d;
        e.1 += 1.0;
    }
    let mut samples: Vec<(f64, f64)> = bins
        .into_iter()
        .map(|(t, (sum_d, count))| (t as f64, sum_d / count))
        .collect();
    samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    if samples.len() < 2 {
        return None;
    }

    // Ordinary least squares of d = slope * t + intercept in the
    // (t, d) axis-aligned coordinate frame.
    let n = samples.len() as f64;
    let mean_t: f64 = samples.iter().map(|s| s.0).sum::<f64>() / n;
    let mean_d: f64 = samples.iter().map(|s| s.1).sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for &(t, d) in &samples {
        num += (t - mean_t) * (d - mean_d);
        den += (t - mean_t) * (t - mean_t);
    }
    let slope = if den.abs() > 1e-9 { num / den } else { 0.0 };
    let intercept = mean_d - slope * mean_t;

    *ridge_residual_out = samples
        .iter()
        .map(|&(t, d)| (d - (slope * t + intercept)).abs())
        .sum::<f64>()
        / n;

    // Refined direction: rotate the coarse axis by the small-angle slope
    // of the fitted centerline, then renormalize.
    let refined_dx = ax + nx * slope;
    let refined_dy = ay + ny * slope;
    let norm = (refined_dx * refined_dx + refined_dy * refined_dy).sqrt();
    let (rdx, rdy) = if norm > 1e-12 {
        (refined_dx / norm, refined_dy / norm)
    } else {
        (ax, ay)
    };

    // Origin: centroid shifted along the normal by the mean fitted offset.
    let origin_x = centroid.0 + nx * intercept;
    let origin_y = centroid.1 + ny * intercept;

    let ratio = inlier_ratio(points, (origin_x, origin_y), (rdx, rdy), max_dist);
    let elongation = elongation_from_eigenvalues(l1, l2);
    Some(Candidate {
        line: ShaftLine::new(rdx, rdy, origin_x, origin_y, elongation, FitMethod::Ridge, ratio),
        elongation,
    })
}

fn ransac_candidate(points: &[(f64, f64)], cfg: &LineFitConfig, max_dist: f64) -> Option<Candidate> {
    if points.len() < 2 {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
    let mut best: Option<(usize, (f64, f64), (f64, f64))> = None;

    for _ in 0..cfg.ransac_iterations {
        let i = rng.gen_range(0..points.len());
        let mut j = rng.gen_range(0..points.len());
        if j == i {
            j = (j + 1) % points.len();
        }
        let (p1, p2) = (points[i], points[j]);
        let dx = p2.0 - p1.0;
        let dy = p2.1 - p1.1;
        let norm = (dx * dx + dy * dy).sqrt();
        if norm < 1e-6 {
            continue;
        }
        let dir = (dx / norm, dy / norm);
        let inliers = points
            .iter()
            .filter(|&&p| point_line_distance(p, p1, dir) <= cfg.ransac_inlier_distance_px)
            .count();
        if best.as_ref().map(|(c, ..)| inliers > *c).unwrap_or(true) {
            best = Some((inliers, p1, dir));
        }
    }

    let (count, origin, dir) = best?;
    let inlier_points: Vec<(f64, f64)> = points
        .iter()
        .copied()
        .filter(|&p| point_line_distance(p, origin, dir) <= cfg.ransac_inlier_distance_px)
        .collect();
    let (centroid, (l1, l2), refined_dir) = covariance_eigen(&inlier_points);
    let elongation = elongation_from_eigenvalues(l1, l2);
    let ratio = count as f64 / points.len() as f64;
    Some(Candidate {
        line: ShaftLine::new(
            refined_dir.0,
            refined_dir.1,
            centroid.0,
            centroid.1,
            elongation,
            FitMethod::Ransac,
            ratio,
        ),
        elongation,
    })
}

/// Fits a shaft line for one camera, per spec §4.5's tie-breaking rule:
/// ridge if its inlier ratio clears the acceptance threshold, else PCA
/// if elongated enough, else RANSAC. Returns `None` (no line) when every
/// method's elongation is below `min_elongation`.
pub fn fit_shaft_line(
    dart_region: &Mask,
    barrel_candidate: &Mask,
    cfg: &LineFitConfig,
    resolution_scale: f64,
) -> (Option<ShaftLine>, f64) {
    let max_dist = cfg.inlier_distance_scale * resolution_scale.max(0.1);
    let barrel_points = pixels_of(barrel_candidate);
    let region_points = pixels_of(dart_region);

    let mut ridge_residual = 0.0;
    let ridge = ridge_candidate(&barrel_points, max_dist, &mut ridge_residual);
    let pca = pca_candidate(&barrel_points, max_dist);
    let ransac = ransac_candidate(&region_points, cfg, max_dist);

    if let Some(r) = &ridge {
        if r.line.inlier_ratio >= cfg.ridge_inlier_accept && r.elongation >= cfg.min_elongation {
            return (Some(r.line), ridge_residual);
        }
    }
    if let Some(p) = &pca {
        if p.elongation >= cfg.min_elongation {
            return (Some(p.line), ridge_residual);
        }
    }
    if let Some(r) = &ransac {
        if r.elongation >= cfg.min_elongation {
            return (Some(r.line), ridge_residual);
        }
    }
    (None, ridge_residual)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_line_mask(w: u32, h: u32, x: u32, y0: u32, len: u32) -> Mask {
        let mut m = Mask::empty(w, h);
        for i in 0..len {
            m.set(x, (y0 + i).min(h - 1), true);
        }
        m
    }

    #[test]
    fn fits_line_through_vertical_barrel() {
        let region = vertical_line_mask(30, 60, 15, 5, 40);
        let cfg = LineFitConfig::default();
        let (line, _) = fit_shaft_line(&region, &region, &cfg, 1.0);
        let line = line.expect("expected a shaft line");
        assert!(line.vy >= 0.0);
        assert!(line.vy.abs() > line.vx.abs());
        assert!(line.is_unit(1e-6));
    }

    #[test]
    fn rejects_blob_below_min_elongation() {
        let mut m = Mask::empty(20, 20);
        for y in 8..12 {
            for x in 8..12 {
                m.set(x, y, true);
            }
        }
        let cfg = LineFitConfig::default();
        let (line, _) = fit_shaft_line(&m, &m, &cfg, 1.0);
        assert!(line.is_none());
    }

    #[test]
    fn vy_is_nonnegative_and_unit_length() {
        let region = vertical_line_mask(30, 60, 15, 5, 40);
        let cfg = LineFitConfig::default();
        let (line, _) = fit_shaft_line(&region, &region, &cfg, 1.0);
        let line = line.unwrap();
        assert!(line.vy >= 0.0);
        assert!(((line.vx * line.vx + line.vy * line.vy) - 1.0).abs() < 1e-9);
    }
}
