//! Thin-plate-spline warp (C7).
//!
//! Maps image-pixel points into the common normalized board frame where
//! the outer-double ring is the unit circle and the center of segment 20
//! sits on the board's reference axis (spec §4.8). Built once per camera
//! at init from calibration-derived control point pairs; read-only and
//! allocation-free on every subsequent `warp_point`/`warp_direction` call,
//! matching the teacher's "solve once, evaluate many" numeric style in
//! `mesh_optimizer.rs`'s quadric solves.

use nalgebra::{DMatrix, DVector};

use crate::error::{DartVisionError, Result};

/// U(r) = r^2 * ln(r) kernel, the standard TPS radial basis function.
#[inline]
fn tps_kernel(r2: f64) -> f64 {
    if r2 <= 1e-18 {
        0.0
    } else {
        0.5 * r2 * r2.ln()
    }
}

/// A solved 2D-to-2D thin plate spline: `N` control points, a weight
/// vector per target axis, and a 3-term affine part `a0 + a1*x + a2*y`.
#[derive(Debug, Clone)]
pub struct ThinPlateSpline {
    control_points: Vec<(f64, f64)>,
    wx: Vec<f64>,
    wy: Vec<f64>,
    ax: [f64; 3],
    ay: [f64; 3],
    regularization: f64,
}

impl ThinPlateSpline {
    /// Solves the TPS system mapping `src[i] -> dst[i]`. `regularization`
    /// (>= 0) relaxes exact interpolation at the control points in
    /// exchange for a smoother warp; `0.0` is exact interpolation.
    pub fn fit(src: &[(f64, f64)], dst: &[(f64, f64)], regularization: f64) -> Result<Self> {
        let n = src.len();
        if n < 3 {
            return Err(DartVisionError::internal(format!(
                "TPS fit needs >= 3 control points, got {n}"
            )));
        }
        if dst.len() != n {
            return Err(DartVisionError::internal(
                "TPS fit: src/dst control point count mismatch",
            ));
        }

        let dim = n + 3;
        let mut l = DMatrix::<f64>::zeros(dim, dim);

        for i in 0..n {
            for j in 0..n {
                let (xi, yi) = src[i];
                let (xj, yj) = src[j];
                let r2 = (xi - xj).powi(2) + (yi - yj).powi(2);
                let mut k = tps_kernel(r2);
                if i == j {
                    k += regularization;
                }
                l[(i, j)] = k;
            }
            let (xi, yi) = src[i];
            l[(i, n)] = 1.0;
            l[(i, n + 1)] = xi;
            l[(i, n + 2)] = yi;
            l[(n, i)] = 1.0;
            l[(n + 1, i)] = xi;
            l[(n + 2, i)] = yi;
        }

        let lu = l.lu();

        let mut vx = DVector::<f64>::zeros(dim);
        let mut vy = DVector::<f64>::zeros(dim);
        for i in 0..n {
            vx[i] = dst[i].0;
            vy[i] = dst[i].1;
        }

        let sol_x = lu
            .solve(&vx)
            .ok_or_else(|| DartVisionError::internal("TPS linear system is singular (x)"))?;
        let sol_y = lu
            .solve(&vy)
            .ok_or_else(|| DartVisionError::internal("TPS linear system is singular (y)"))?;

        let wx = sol_x.rows(0, n).iter().copied().collect();
        let wy = sol_y.rows(0, n).iter().copied().collect();
        let ax = [sol_x[n], sol_x[n + 1], sol_x[n + 2]];
        let ay = [sol_y[n], sol_y[n + 1], sol_y[n + 2]];

        Ok(ThinPlateSpline {
            control_points: src.to_vec(),
            wx,
            wy,
            ax,
            ay,
            regularization,
        })
    }

    /// Warps one image-pixel point into the board frame.
    pub fn warp_point(&self, p: (f64, f64)) -> (f64, f64) {
        let (px, py) = p;
        let mut sx = self.ax[0] + self.ax[1] * px + self.ax[2] * py;
        let mut sy = self.ay[0] + self.ay[1] * px + self.ay[2] * py;
        for (i, &(cx, cy)) in self.control_points.iter().enumerate() {
            let r2 = (px - cx).powi(2) + (py - cy).powi(2);
            let k = tps_kernel(r2);
            sx += self.wx[i] * k;
            sy += self.wy[i] * k;
        }
        (sx, sy)
    }

    /// Warps a unit direction anchored at image point `p` by evaluating
    /// the warp at two nearby points and differencing (spec §4.8), then
    /// renormalizing. `step` is the finite-difference step in image px.
    pub fn warp_direction(&self, p: (f64, f64), dir: (f64, f64), step: f64) -> (f64, f64) {
        let (px, py) = p;
        let (dx, dy) = dir;
        let norm = (dx * dx + dy * dy).sqrt();
        if norm < 1e-12 {
            return (0.0, 0.0);
        }
        let (ux, uy) = (dx / norm, dy / norm);
        let a = self.warp_point((px, py));
        let b = self.warp_point((px + ux * step, py + uy * step));
        let (wdx, wdy) = (b.0 - a.0, b.1 - a.1);
        let wnorm = (wdx * wdx + wdy * wdy).sqrt();
        if wnorm < 1e-12 {
            (0.0, 0.0)
        } else {
            (wdx / wnorm, wdy / wnorm)
        }
    }

    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    pub fn control_point_count(&self) -> usize {
        self.control_points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Round trip: an exact-interpolation TPS must reproduce each
    /// control point's target within a tolerance proportional to the
    /// regularization term (spec §8 "TPS round-trip").
    #[test]
    fn round_trips_control_points_when_exact() {
        let src = vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.5, 0.5)];
        let dst = vec![(0.0, 0.0), (2.0, 0.0), (0.0, 2.0), (2.0, 2.0), (1.0, 1.0)];
        let tps = ThinPlateSpline::fit(&src, &dst, 0.0).unwrap();
        for (s, d) in src.iter().zip(dst.iter()) {
            let w = tps.warp_point(*s);
            assert_relative_eq!(w.0, d.0, epsilon = 1e-6);
            assert_relative_eq!(w.1, d.1, epsilon = 1e-6);
        }
    }

    #[test]
    fn affine_only_when_dst_is_linear_transform_of_src() {
        // A pure scale+translate target should warp an off-control point
        // consistently with the same linear map (no warping bulge).
        let src = vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)];
        let dst: Vec<(f64, f64)> = src.iter().map(|&(x, y)| (2.0 * x, 2.0 * y)).collect();
        let tps = ThinPlateSpline::fit(&src, &dst, 0.0).unwrap();
        let w = tps.warp_point((5.0, 5.0));
        assert_relative_eq!(w.0, 10.0, epsilon = 1e-6);
        assert_relative_eq!(w.1, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn direction_warp_is_unit_length() {
        let src = vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0), (5.0, 5.0)];
        let dst = vec![(0.0, 0.0), (10.0, 1.0), (1.0, 10.0), (11.0, 11.0), (5.2, 5.1)];
        let tps = ThinPlateSpline::fit(&src, &dst, 0.01).unwrap();
        let d = tps.warp_direction((5.0, 5.0), (0.0, 1.0), 0.01);
        let norm = (d.0 * d.0 + d.1 * d.1).sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn rejects_too_few_control_points() {
        let src = vec![(0.0, 0.0), (1.0, 0.0)];
        let dst = vec![(0.0, 0.0), (1.0, 0.0)];
        assert!(ThinPlateSpline::fit(&src, &dst, 0.0).is_err());
    }
}
