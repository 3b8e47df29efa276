//! Tunable thresholds for every pipeline stage (SPEC_FULL.md §C).
//!
//! Mirrors the teacher's `*Config` + `Default` pattern (`TextureConfig`,
//! `ResourceConfig`): one flat struct per subsystem, constructed once and
//! threaded through read-only from then on.

/// Thresholds for the motion mask stage (C2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionConfig {
    /// Gaussian blur sigma at `resolution_scale == 1.0`; scaled linearly.
    pub blur_sigma_base: f64,
    pub high_threshold: f64,
    pub low_threshold: f64,
    /// Morphological close kernel radius in px at `resolution_scale == 1.0`.
    pub close_kernel_base: u32,
    /// Minimum `new_dart_pixel_ratio` to continue processing a camera.
    pub min_new_dart_pixel_ratio: f64,
    /// Dilation margin (px) applied to previous-dart masks before subtraction.
    pub prev_mask_dilation_px: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            blur_sigma_base: 1.5,
            high_threshold: 40.0,
            low_threshold: 12.0,
            close_kernel_base: 3,
            min_new_dart_pixel_ratio: 0.02,
            prev_mask_dilation_px: 2,
        }
    }
}

/// Thresholds for the shape filter stage (C3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeConfig {
    pub min_aspect: f64,
    pub min_area_fraction: f64,
    /// Barrel width cap in px at `resolution_scale == 1.0`.
    pub barrel_width_cap_base: f64,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        ShapeConfig {
            min_aspect: 2.0,
            min_area_fraction: 0.0005,
            barrel_width_cap_base: 10.0,
        }
    }
}

/// Thresholds for shaft line fitting (C4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFitConfig {
    pub min_elongation: f64,
    pub ridge_inlier_accept: f64,
    pub ransac_iterations: u32,
    pub ransac_inlier_distance_px: f64,
    /// Perpendicular distance (scaled by resolution) used for inlier ratio.
    pub inlier_distance_scale: f64,
}

impl Default for LineFitConfig {
    fn default() -> Self {
        LineFitConfig {
            min_elongation: 2.0,
            ridge_inlier_accept: 0.75,
            ransac_iterations: 200,
            ransac_inlier_distance_px: 2.0,
            inlier_distance_scale: 1.5,
        }
    }
}

/// Thresholds for tip localization (C5). Names kept matching spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TipConfig {
    pub pca_gap_tolerance: u32,
    pub pca_perp_tolerance: f64,
    pub pca_max_walk: u32,
}

impl Default for TipConfig {
    fn default() -> Self {
        TipConfig {
            pca_gap_tolerance: 3,
            pca_perp_tolerance: 2.5,
            pca_max_walk: 400,
        }
    }
}

/// Ring radii and zone thresholds for the per-camera scorer (C6).
///
/// Normalized radii are derived from a camera's ellipse fits at
/// calibration time (see `calibration.rs::CameraCalibration::norm_radii`);
/// this struct carries the WDF reference geometry used when a camera's
/// calibration omits a ring (e.g. no inner-triple ellipse supplied).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// WDF outer-double radius in mm; fixes the 170 vs 171.4 mm ambiguity
    /// noted in spec §9 — wire-width expansion belongs to calibration.
    pub outer_double_radius_mm: f64,
    /// Normalized ring radii (board frame, outer-double = 1.0), derived
    /// from WDF reference measurements in mm: inner bull 6.35, outer
    /// bull 15.9, triple inner 99, triple outer 107, double inner 162,
    /// double outer 170 (`outer_double_radius_mm`).
    pub inner_bull_norm: f64,
    pub outer_bull_norm: f64,
    pub triple_inner_norm: f64,
    pub triple_outer_norm: f64,
    pub double_inner_norm: f64,
    pub double_outer_norm: f64,
    pub unanimity_confidence_threshold: f64,
    pub wire_ambiguous_threshold_deg: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let outer_double_radius_mm = 170.0;
        ScoringConfig {
            outer_double_radius_mm,
            inner_bull_norm: 6.35 / outer_double_radius_mm,
            outer_bull_norm: 15.9 / outer_double_radius_mm,
            triple_inner_norm: 99.0 / outer_double_radius_mm,
            triple_outer_norm: 107.0 / outer_double_radius_mm,
            double_inner_norm: 162.0 / outer_double_radius_mm,
            double_outer_norm: 1.0,
            unanimity_confidence_threshold: 0.8,
            wire_ambiguous_threshold_deg: 1.0,
        }
    }
}

/// Gates for the triangulator (C8).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangulationConfig {
    /// Minimum angular spread (degrees) between two warped shaft
    /// directions for the pair to be considered non-parallel.
    pub min_angular_spread_deg: f64,
    /// `|point| > board_radius * factor` is off-board.
    pub board_radius_factor: f64,
    /// A pair is dropped as an outlier camera when its residual is at
    /// least this multiple of the median residual (3-camera case only).
    pub drop_residual_ratio: f64,
    /// Distance to a ring boundary (normalized radius units) below which
    /// the radial stability clamp considers two candidates.
    pub ring_boundary_clamp_band: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        TriangulationConfig {
            min_angular_spread_deg: 5.0,
            board_radius_factor: 1.1,
            drop_residual_ratio: 2.0,
            ring_boundary_clamp_band: 0.01,
        }
    }
}

/// Every tunable in one place, constructed once per engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionConfig {
    pub motion: MotionConfig,
    pub shape: ShapeConfig,
    pub line_fit: LineFitConfig,
    pub tip: TipConfig,
    pub scoring: ScoringConfig,
    pub triangulation: TriangulationConfig,
}
