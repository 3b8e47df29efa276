//! Tip localization (C5, spec §4.6): walk outward along the shaft axis
//! from the barrel toward the point, then refine to sub-pixel precision.

use crate::config::TipConfig;
use crate::motion::Mask;
use crate::types::{ShaftLine, TipEstimate};

/// Integer pixel of the last confirmed on-dart step during the walk.
struct WalkStep {
    x: i64,
    y: i64,
}

/// Walks from the barrel's far end along `line.direction()` one pixel at
/// a time. A step counts as "on the dart" when a mask pixel lies within
/// `cfg.pca_perp_tolerance` of the line at that step; missing steps
/// accumulate a gap counter that resets to 0 on a hit. The walk stops
/// when the gap exceeds `cfg.pca_gap_tolerance`, `cfg.pca_max_walk`
/// steps are exhausted, or the walk leaves the mask's bounds, and
/// returns the last on-dart step.
fn walk_to_tip(mask: &Mask, line: &ShaftLine, start_t: f64, cfg: &TipConfig) -> Option<WalkStep> {
    let (w, h) = (mask.width() as f64, mask.height() as f64);
    let mut gap = 0u32;
    let mut last_hit: Option<WalkStep> = None;

    for step in 0..cfg.pca_max_walk {
        let t = start_t + step as f64;
        let (x, y) = line.point_at(t);
        if x < -1.0 || y < -1.0 || x > w || y > h {
            break;
        }

        let on_dart = mask_hit_near(mask, x, y, cfg.pca_perp_tolerance);
        if on_dart {
            gap = 0;
            last_hit = Some(WalkStep {
                x: x.round() as i64,
                y: y.round() as i64,
            });
        } else {
            gap += 1;
            if gap > cfg.pca_gap_tolerance {
                break;
            }
        }
    }

    last_hit
}

/// True if any mask pixel within `tol` (Chebyshev radius, rounded up)
/// of `(x, y)` is set.
fn mask_hit_near(mask: &Mask, x: f64, y: f64, tol: f64) -> bool {
    let r = tol.ceil().max(0.0) as i64;
    let (cx, cy) = (x.round() as i64, y.round() as i64);
    for dy in -r..=r {
        for dx in -r..=r {
            let (nx, ny) = (cx + dx, cy + dy);
            if nx < 0 || ny < 0 {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            if nx < mask.width() && ny < mask.height() && mask.get(nx, ny) {
                return true;
            }
        }
    }
    false
}

/// Sub-pixel refinement: fits a parabola through the mask's local
/// "on-dart" run length sampled at `x-1, x, x+1` along the walk
/// direction and returns the vertex offset, clamped to `[-0.5, 0.5]`.
fn subpixel_refine(mask: &Mask, line: &ShaftLine, base_t: f64) -> f64 {
    let sample = |t: f64| -> f64 {
        let (x, y) = line.point_at(t);
        if mask_hit_near(mask, x, y, 1.0) {
            1.0
        } else {
            0.0
        }
    };
    let (y0, y1, y2) = (sample(base_t - 1.0), sample(base_t), sample(base_t + 1.0));
    let denom = y0 - 2.0 * y1 + y2;
    if denom.abs() < 1e-9 {
        return 0.0;
    }
    (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5)
}

/// Locates the dart tip for one camera by walking from the barrel
/// centroid out along the shaft direction through `dart_region`.
/// `barrel_centroid_t` is the axial position (in the line's own
/// parametrization) of the barrel's far end, i.e. where the walk starts.
pub fn locate_tip(
    dart_region: &Mask,
    line: &ShaftLine,
    barrel_far_t: f64,
    cfg: &TipConfig,
) -> Option<TipEstimate> {
    let step = walk_to_tip(dart_region, line, barrel_far_t, cfg)?;

    // Recover the walked step's axial parameter by projecting the hit
    // pixel back onto the line (robust to rounding during the walk).
    let dx = step.x as f64 - line.x0;
    let dy = step.y as f64 - line.y0;
    let t_hit = dx * line.vx + dy * line.vy;

    let offset = subpixel_refine(dart_region, line, t_hit);
    let (sub_x, sub_y) = line.point_at(t_hit + offset);

    Some(TipEstimate {
        ix: step.x,
        iy: step.y,
        sub_x,
        sub_y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FitMethod;

    fn vertical_shaft_mask(w: u32, h: u32, x: u32, y0: u32, len: u32) -> Mask {
        let mut m = Mask::empty(w, h);
        for i in 0..len {
            m.set(x, y0 + i, true);
        }
        m
    }

    #[test]
    fn walks_to_far_end_of_shaft() {
        let mask = vertical_shaft_mask(20, 60, 10, 5, 40); // rows 5..45
        let line = ShaftLine::new(0.0, 1.0, 10.0, 5.0, 5.0, FitMethod::Pca, 1.0);
        let cfg = TipConfig::default();
        let tip = locate_tip(&mask, &line, 0.0, &cfg).expect("expected a tip");
        assert!(tip.iy >= 40 && tip.iy <= 46);
        assert_eq!(tip.ix, 10);
    }

    #[test]
    fn stops_at_gap_tolerance() {
        let mut m = Mask::empty(20, 60);
        for y in 5..20 {
            m.set(10, y, true);
        }
        // gap of 10 rows, beyond default tolerance of 3
        for y in 30..35 {
            m.set(10, y, true);
        }
        let line = ShaftLine::new(0.0, 1.0, 10.0, 5.0, 5.0, FitMethod::Pca, 1.0);
        let cfg = TipConfig::default();
        let tip = locate_tip(&m, &line, 0.0, &cfg).expect("expected a tip before the gap");
        assert!(tip.iy < 25);
    }

    #[test]
    fn returns_none_on_empty_mask() {
        let m = Mask::empty(20, 20);
        let line = ShaftLine::new(0.0, 1.0, 10.0, 5.0, 5.0, FitMethod::Pca, 1.0);
        let cfg = TipConfig::default();
        assert!(locate_tip(&m, &line, 0.0, &cfg).is_none());
    }
}
