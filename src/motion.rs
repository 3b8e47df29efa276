//! Motion mask (C2): a clean hysteresis mask of pixels that appeared
//! between `before` and `current`, minus pixels already accounted for by
//! earlier darts this turn (spec §4.3).

use std::collections::VecDeque;

use image::GrayImage;

use crate::config::MotionConfig;
use crate::error::{DartVisionError, Result};

/// A dense binary mask, same shape as the ROI-cropped image it was
/// computed from. Kept as a flat `Vec<bool>` rather than a packed
/// bitset: the teacher's numeric code (`culling.rs`, `mesh_optimizer.rs`)
/// favors clarity over bit-packing wherever the mask count stays in the
/// hundreds-of-thousands-of-pixels range, not the billions.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn empty(width: u32, height: u32) -> Self {
        Mask {
            width,
            height,
            bits: vec![false; (width as usize) * (height as usize)],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            false
        } else {
            self.bits[self.idx(x, y)]
        }
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, v: bool) {
        let i = self.idx(x, y);
        self.bits[i] = v;
    }

    pub fn count_ones(&self) -> u64 {
        self.bits.iter().filter(|&&b| b).count() as u64
    }

    pub fn union(&self, other: &Mask) -> Mask {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        let bits = self
            .bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| *a || *b)
            .collect();
        Mask {
            width: self.width,
            height: self.height,
            bits,
        }
    }

    /// `self AND NOT other`.
    pub fn subtract(&self, other: &Mask) -> Mask {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        let bits = self
            .bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| *a && !*b)
            .collect();
        Mask {
            width: self.width,
            height: self.height,
            bits,
        }
    }

    /// Square-kernel dilation by `radius` pixels.
    pub fn dilate(&self, radius: u32) -> Mask {
        if radius == 0 {
            return self.clone();
        }
        let r = radius as i64;
        let mut out = Mask::empty(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                if !self.get(x, y) {
                    continue;
                }
                let (xi, yi) = (x as i64, y as i64);
                for dy in -r..=r {
                    let ny = yi + dy;
                    if ny < 0 || ny >= self.height as i64 {
                        continue;
                    }
                    for dx in -r..=r {
                        let nx = xi + dx;
                        if nx < 0 || nx >= self.width as i64 {
                            continue;
                        }
                        out.set(nx as u32, ny as u32, true);
                    }
                }
            }
        }
        out
    }

    /// Morphological close: dilate then erode by the same radius,
    /// bridging small within-dart gaps without growing the silhouette.
    pub fn close(&self, radius: u32) -> Mask {
        if radius == 0 {
            return self.clone();
        }
        self.dilate(radius).erode(radius)
    }

    fn erode(&self, radius: u32) -> Mask {
        let r = radius as i64;
        let mut out = Mask::empty(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let (xi, yi) = (x as i64, y as i64);
                let mut all_set = true;
                'outer: for dy in -r..=r {
                    let ny = yi + dy;
                    for dx in -r..=r {
                        let nx = xi + dx;
                        let set = nx >= 0
                            && ny >= 0
                            && nx < self.width as i64
                            && ny < self.height as i64
                            && self.get(nx as u32, ny as u32);
                        if !set {
                            all_set = false;
                            break 'outer;
                        }
                    }
                }
                out.set(x, y, all_set);
            }
        }
        out
    }

    pub fn iter_set_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.height)
            .flat_map(move |y| (0..self.width).map(move |x| (x, y)))
            .filter(move |&(x, y)| self.get(x, y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelClass {
    New,
    Old,
    Moved,
    Stationary,
}

fn classify(diff: f64, cfg: &MotionConfig) -> PixelClass {
    let a = diff.abs();
    if a < cfg.low_threshold {
        PixelClass::Stationary
    } else if diff <= -cfg.high_threshold {
        PixelClass::New
    } else if diff >= cfg.high_threshold {
        PixelClass::Old
    } else {
        PixelClass::Moved
    }
}

/// Final hysteresis mask plus the intermediate masks spec §3 names.
#[derive(Debug, Clone)]
pub struct MotionMaskResult {
    /// Hysteresis-expanded "new" mask, before subtracting earlier darts.
    pub final_mask: Mask,
    pub high_mask: Mask,
    /// Pixels that appeared (as opposed to disappeared), spec §3.
    pub positive_mask: Mask,
}

/// Derived masks and pixel counts (spec §3 `PixelSegmentation`).
#[derive(Debug, Clone)]
pub struct PixelSegmentation {
    pub new: Mask,
    pub old: Mask,
    pub moved: Mask,
    pub stationary: Mask,
    pub new_count: u64,
    pub old_count: u64,
    pub moved_count: u64,
    pub stationary_count: u64,
    pub new_dart_pixel_ratio: f64,
}

/// 1D Gaussian kernel truncated at `+-3*sigma`.
fn gaussian_kernel_1d(sigma: f64) -> Vec<f64> {
    let sigma = sigma.max(0.35);
    let radius = (3.0 * sigma).ceil().max(1.0) as i64;
    let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
    let two_sigma2 = 2.0 * sigma * sigma;
    let mut sum = 0.0;
    for i in -radius..=radius {
        let v = (-(i as f64 * i as f64) / two_sigma2).exp();
        kernel.push(v);
        sum += v;
    }
    for v in kernel.iter_mut() {
        *v /= sum;
    }
    kernel
}

fn blur_horizontal(img: &[f64], width: u32, height: u32, kernel: &[f64]) -> Vec<f64> {
    let radius = (kernel.len() / 2) as i64;
    let mut out = vec![0.0; img.len()];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let sx = (x + k as i64 - radius).clamp(0, width as i64 - 1);
                acc += w * img[(y * width as i64 + sx) as usize];
            }
            out[(y * width as i64 + x) as usize] = acc;
        }
    }
    out
}

fn blur_vertical(img: &[f64], width: u32, height: u32, kernel: &[f64]) -> Vec<f64> {
    let radius = (kernel.len() / 2) as i64;
    let mut out = vec![0.0; img.len()];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let sy = (y + k as i64 - radius).clamp(0, height as i64 - 1);
                acc += w * img[(sy * width as i64 + x) as usize];
            }
            out[(y * width as i64 + x) as usize] = acc;
        }
    }
    out
}

/// Separable Gaussian blur over a grayscale image, returning `f64`
/// intensities (kept unrounded so the signed difference downstream
/// doesn't re-quantize twice).
fn gaussian_blur(img: &GrayImage, sigma: f64) -> Vec<f64> {
    let (w, h) = img.dimensions();
    let raw: Vec<f64> = img.pixels().map(|p| p.0[0] as f64).collect();
    let kernel = gaussian_kernel_1d(sigma);
    let h_blurred = blur_horizontal(&raw, w, h, &kernel);
    blur_vertical(&h_blurred, w, h, &kernel)
}

/// Computes the motion mask and pixel segmentation for one camera's ROI,
/// then gates on `new_dart_pixel_ratio` per spec §4.3.
pub fn compute_motion(
    current: &GrayImage,
    before: &GrayImage,
    prev_dart_masks: &[std::sync::Arc<Mask>],
    resolution_scale: f64,
    cfg: &MotionConfig,
    camera_id: &str,
) -> Result<(MotionMaskResult, PixelSegmentation)> {
    let (w, h) = current.dimensions();
    if before.dimensions() != (w, h) {
        return Err(DartVisionError::internal(
            "current/before ROI dimensions must match",
        ));
    }

    let sigma = cfg.blur_sigma_base * resolution_scale.max(0.1);
    let cur_blur = gaussian_blur(current, sigma);
    let before_blur = gaussian_blur(before, sigma);

    let mut new_mask = Mask::empty(w, h);
    let mut old_mask = Mask::empty(w, h);
    let mut moved_mask = Mask::empty(w, h);
    let mut stationary_mask = Mask::empty(w, h);
    let mut high_mask = Mask::empty(w, h);
    let mut low_eligible = Mask::empty(w, h);

    for y in 0..h {
        for x in 0..w {
            let i = (y as usize) * (w as usize) + x as usize;
            let diff = cur_blur[i] - before_blur[i];
            match classify(diff, cfg) {
                PixelClass::New => {
                    new_mask.set(x, y, true);
                    high_mask.set(x, y, true);
                    low_eligible.set(x, y, true);
                }
                PixelClass::Old => old_mask.set(x, y, true),
                PixelClass::Moved => {
                    moved_mask.set(x, y, true);
                    low_eligible.set(x, y, true);
                }
                PixelClass::Stationary => stationary_mask.set(x, y, true),
            }
        }
    }

    let hysteresis = hysteresis_expand(&high_mask, &low_eligible);
    let close_radius = (cfg.close_kernel_base as f64 * resolution_scale.max(0.1)).round() as u32;
    let final_mask = hysteresis.close(close_radius);

    let new_count = new_mask.count_ones();
    let old_count = old_mask.count_ones();
    let moved_count = moved_mask.count_ones();
    let stationary_count = stationary_mask.count_ones();
    let new_dart_pixel_ratio =
        new_count as f64 / (new_count as f64 + old_count as f64 + moved_count as f64 + 1e-9);

    if new_dart_pixel_ratio < cfg.min_new_dart_pixel_ratio {
        return Err(DartVisionError::NoDartMotion {
            camera_id: camera_id.to_string(),
            ratio: new_dart_pixel_ratio,
        });
    }

    let margin = (cfg.prev_mask_dilation_px as f64 * resolution_scale.max(0.1)).round() as u32;
    let mut isolated = final_mask.clone();
    for prev in prev_dart_masks {
        let dilated = prev.dilate(margin);
        isolated = isolated.subtract(&dilated);
    }

    let result = MotionMaskResult {
        final_mask: isolated,
        high_mask,
        positive_mask: new_mask.clone(),
    };
    let segmentation = PixelSegmentation {
        new: new_mask,
        old: old_mask,
        moved: moved_mask,
        stationary: stationary_mask,
        new_count,
        old_count,
        moved_count,
        stationary_count,
        new_dart_pixel_ratio,
    };
    Ok((result, segmentation))
}

/// Classic hysteresis edge-linking: BFS from every `seed` pixel through
/// 4-connected neighbors that are `eligible`, collecting everything
/// reached. Pixels in `eligible` unreachable from any seed are dropped.
fn hysteresis_expand(seeds: &Mask, eligible: &Mask) -> Mask {
    let (w, h) = (seeds.width(), seeds.height());
    let mut out = Mask::empty(w, h);
    let mut visited = vec![false; (w as usize) * (h as usize)];
    let mut queue = VecDeque::new();

    for y in 0..h {
        for x in 0..w {
            if seeds.get(x, y) {
                let idx = (y as usize) * (w as usize) + x as usize;
                if !visited[idx] {
                    visited[idx] = true;
                    out.set(x, y, true);
                    queue.push_back((x, y));
                }
            }
        }
    }

    while let Some((x, y)) = queue.pop_front() {
        let neighbors = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];
        for (nx, ny) in neighbors {
            if nx >= w || ny >= h {
                continue;
            }
            let idx = (ny as usize) * (w as usize) + nx as usize;
            if visited[idx] || !eligible.get(nx, ny) {
                continue;
            }
            visited[idx] = true;
            out.set(nx, ny, true);
            queue.push_back((nx, ny));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn uniform(w: u32, h: u32, v: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([v]))
    }

    fn with_dark_square(w: u32, h: u32, base: u8, dart: u8, rect: (u32, u32, u32, u32)) -> GrayImage {
        let mut img = uniform(w, h, base);
        let (x0, y0, rw, rh) = rect;
        for y in y0..(y0 + rh).min(h) {
            for x in x0..(x0 + rw).min(w) {
                img.put_pixel(x, y, Luma([dart]));
            }
        }
        img
    }

    #[test]
    fn mask_is_subset_of_new_or_moved() {
        let before = uniform(40, 40, 200);
        let current = with_dark_square(40, 40, 200, 30, (10, 10, 20, 4));
        let cfg = MotionConfig::default();
        let (result, seg) = compute_motion(&current, &before, &[], 1.0, &cfg, "cam0").unwrap();
        for (x, y) in result.final_mask.iter_set_pixels() {
            assert!(seg.new.get(x, y) || seg.moved.get(x, y));
        }
    }

    #[test]
    fn low_motion_triggers_no_dart_motion_gate() {
        let before = uniform(40, 40, 200);
        let current = uniform(40, 40, 201);
        let cfg = MotionConfig::default();
        let err = compute_motion(&current, &before, &[], 1.0, &cfg, "cam0").unwrap_err();
        assert!(matches!(err, DartVisionError::NoDartMotion { .. }));
    }

    #[test]
    fn prev_dart_masks_are_subtracted() {
        let before = uniform(40, 40, 200);
        let current = with_dark_square(40, 40, 200, 30, (10, 10, 20, 4));
        let cfg = MotionConfig::default();
        let (baseline_result, _) = compute_motion(&current, &before, &[], 1.0, &cfg, "cam0").unwrap();
        assert!(baseline_result.final_mask.count_ones() > 0);

        let prev = std::sync::Arc::new(baseline_result.final_mask.clone());
        let (subtracted_result, _) =
            compute_motion(&current, &before, &[prev], 1.0, &cfg, "cam0").unwrap();
        assert!(subtracted_result.final_mask.count_ones() < baseline_result.final_mask.count_ones());
    }

    #[test]
    fn ratio_is_monotonic_in_new_count() {
        let low_cfg = MotionConfig {
            min_new_dart_pixel_ratio: 0.0,
            ..MotionConfig::default()
        };
        let before = uniform(40, 40, 200);
        let small = with_dark_square(40, 40, 200, 30, (10, 10, 4, 4));
        let big = with_dark_square(40, 40, 200, 30, (10, 10, 20, 10));
        let (_, seg_small) = compute_motion(&small, &before, &[], 1.0, &low_cfg, "cam0").unwrap();
        let (_, seg_big) = compute_motion(&big, &before, &[], 1.0, &low_cfg, "cam0").unwrap();
        assert!(seg_big.new_dart_pixel_ratio >= seg_small.new_dart_pixel_ratio);
    }
}
