//! Small shared 2D numeric helpers used by the shape filter (C3), the
//! line fit (C4) and the triangulator (C8): closed-form 2x2 covariance
//! eigendecomposition and line/line intersection. Kept tiny and
//! allocation-free, the way the teacher keeps `Handle`/`BBox`-style
//! value types next to the systems that use them rather than behind a
//! generic math crate wrapper.

/// Centroid, eigenvalues (`lambda1 >= lambda2 >= 0`) and the dominant
/// eigenvector (unit length) of a pixel set's covariance matrix.
pub(crate) fn covariance_eigen(points: &[(f64, f64)]) -> ((f64, f64), (f64, f64), (f64, f64)) {
    let n = (points.len() as f64).max(1.0);
    let (mut sx, mut sy) = (0.0, 0.0);
    for &(x, y) in points {
        sx += x;
        sy += y;
    }
    let (cx, cy) = (sx / n, sy / n);

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        let dx = x - cx;
        let dy = y - cy;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    sxx /= n;
    syy /= n;
    sxy /= n;

    let trace = sxx + syy;
    let det = sxx * syy - sxy * sxy;
    let disc = ((trace * trace) / 4.0 - det).max(0.0).sqrt();
    let lambda1 = trace / 2.0 + disc;
    let lambda2 = (trace / 2.0 - disc).max(0.0);

    let (mut vx, mut vy) = if sxy.abs() > 1e-12 {
        (lambda1 - syy, sxy)
    } else if sxx >= syy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };
    let norm = (vx * vx + vy * vy).sqrt();
    if norm > 1e-12 {
        vx /= norm;
        vy /= norm;
    } else {
        vx = 1.0;
        vy = 0.0;
    }
    ((cx, cy), (lambda1, lambda2), (vx, vy))
}

/// Ratio of principal to secondary singular value of the scatter matrix
/// (spec §4.5's definition of elongation).
#[inline]
pub(crate) fn elongation_from_eigenvalues(lambda1: f64, lambda2: f64) -> f64 {
    (lambda1 / lambda2.max(1e-9)).sqrt()
}

/// Intersection of two 2D lines given as (origin, direction). Returns
/// `None` when the directions are (numerically) parallel.
pub(crate) fn intersect_lines(
    o1: (f64, f64),
    d1: (f64, f64),
    o2: (f64, f64),
    d2: (f64, f64),
) -> Option<(f64, f64)> {
    let denom = d1.0 * d2.1 - d1.1 * d2.0;
    if denom.abs() < 1e-12 {
        return None;
    }
    let dx = o2.0 - o1.0;
    let dy = o2.1 - o1.1;
    let t = (dx * d2.1 - dy * d2.0) / denom;
    Some((o1.0 + d1.0 * t, o1.1 + d1.1 * t))
}

/// Perpendicular distance from `p` to the line through `origin` with
/// unit direction `dir`.
#[inline]
pub(crate) fn point_line_distance(p: (f64, f64), origin: (f64, f64), dir: (f64, f64)) -> f64 {
    let dx = p.0 - origin.0;
    let dy = p.1 - origin.1;
    (dx * (-dir.1) + dy * dir.0).abs()
}

/// Distance from `rho` to the nearest of a fixed set of ring-boundary
/// radii, shared by the per-camera scorer and the triangulator's radial
/// stability clamp.
pub(crate) fn nearest_ring_boundary_distance(rho: f64, edges: &[f64]) -> f64 {
    edges.iter().map(|e| (rho - e).abs()).fold(f64::MAX, f64::min)
}

/// Unsigned angle in degrees between two unit directions, in `[0, 90]`
/// (line directions have no inherent sign, so angle and its complement
/// to 180 are equivalent).
pub(crate) fn angular_spread_deg(d1: (f64, f64), d2: (f64, f64)) -> f64 {
    let dot = (d1.0 * d2.0 + d1.1 * d2.1).clamp(-1.0, 1.0);
    let angle = dot.abs().acos().to_degrees();
    90.0 - (90.0 - angle).abs()
}
