//! Crop solving: turning a destination's target constraints into a
//! [`Frame`].
//!
//! All functions here are pure geometry — no pixels are touched. The solver
//! resolves the target aspect ratio, picks the crop rectangle that keeps as
//! much of the source as the crop policy allows, places it with the anchor,
//! and resolves the output dimensions.

use crate::frame::Frame;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CropError {
    #[error("no target geometry is resolvable: target box and crop aspect are all unset")]
    NoTarget,

    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    #[error(
        "crop box {x},{y} {width}x{height} lies outside the {source_width}x{source_height} source"
    )]
    OutOfBounds {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        source_width: u32,
        source_height: u32,
    },
}

/// Whether the final crop must match the target aspect exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropMode {
    /// Exact target aspect is enforced; waste tolerance is ignored.
    #[default]
    Closed,
    /// The crop may keep more of the source, deviating from the target
    /// aspect within the allowed waste fraction.
    Open,
}

/// An explicit crop rectangle in source coordinates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CropBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Fully-resolved target constraints for one render, produced from a
/// [`Destination`](crate::destination::Destination) with hard defaults
/// already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub longest_edge: Option<f64>,
    /// Fixed crop aspect ratio (width / height).
    pub aspect: Option<f64>,
    /// Verbatim crop rectangle; bypasses the solver's optimization.
    pub crop_box: Option<CropBox>,
    /// Fraction of kept-but-off-aspect source area an open crop may carry.
    pub max_waste: Option<f64>,
    pub mode: CropMode,
    /// Placement of the crop within the source, as fractions of the slack
    /// on each axis. (0.5, 0.5) centers.
    pub anchor: (f64, f64),
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            longest_edge: None,
            aspect: None,
            crop_box: None,
            max_waste: None,
            mode: CropMode::Closed,
            anchor: (0.5, 0.5),
        }
    }
}

/// Computes the crop rectangle and output scale for a source/target pair.
///
/// ```
/// use gravure::crop::{CropSolver, TargetSpec};
///
/// // 1000x500 source, square target: a centered 500x500 crop.
/// let spec = TargetSpec { aspect: Some(1.0), ..TargetSpec::default() };
/// let frame = CropSolver::solve(1000, 500, &spec).unwrap();
/// assert_eq!((frame.crop_x(), frame.crop_y()), (250.0, 0.0));
/// assert_eq!((frame.crop_w(), frame.crop_h()), (500.0, 500.0));
/// ```
pub struct CropSolver;

impl CropSolver {
    pub fn solve(
        source_width: u32,
        source_height: u32,
        target: &TargetSpec,
    ) -> Result<Frame, CropError> {
        if source_width == 0 || source_height == 0 {
            return Err(CropError::Degenerate(format!(
                "source is {source_width}x{source_height}"
            )));
        }
        let sw = source_width as f64;
        let sh = source_height as f64;

        let (crop_x, crop_y, crop_w, crop_h) = match &target.crop_box {
            Some(b) => {
                if b.width <= 0.0 || b.height <= 0.0 {
                    return Err(CropError::Degenerate(format!(
                        "fixed crop box is {}x{}",
                        b.width, b.height
                    )));
                }
                if b.x < 0.0 || b.y < 0.0 || b.x + b.width > sw || b.y + b.height > sh {
                    return Err(CropError::OutOfBounds {
                        x: b.x,
                        y: b.y,
                        width: b.width,
                        height: b.height,
                        source_width,
                        source_height,
                    });
                }
                (b.x, b.y, b.width, b.height)
            }
            None => {
                let aspect = resolve_aspect(target, sw, sh)?;

                // Largest in-bounds rectangle at the target aspect.
                let (max_w, max_h) = if sw / sh > aspect {
                    (sh * aspect, sh)
                } else {
                    (sw, sw / aspect)
                };

                // Open crops may keep more of the source, up to the allowed
                // waste fraction. Closed crops always take the exact-aspect
                // maximum.
                let (crop_w, crop_h) = match (target.mode, target.max_waste) {
                    (CropMode::Open, Some(waste)) if waste > 0.0 => {
                        widen_for_waste(sw, sh, max_w, max_h, waste.min(1.0))
                    }
                    _ => (max_w, max_h),
                };

                let (ax, ay) = target.anchor;
                let crop_x = ax.clamp(0.0, 1.0) * (sw - crop_w);
                let crop_y = ay.clamp(0.0, 1.0) * (sh - crop_h);
                (crop_x, crop_y, crop_w, crop_h)
            }
        };

        let (out_w, out_h) = resolve_output(target, crop_w, crop_h)?;
        Ok(Frame::new(crop_x, crop_y, crop_w, crop_h, out_w, out_h))
    }
}

/// Target aspect precedence: explicit aspect, then explicit width+height,
/// then any single target edge falling back to the source aspect.
fn resolve_aspect(target: &TargetSpec, sw: f64, sh: f64) -> Result<f64, CropError> {
    if let Some(aspect) = target.aspect {
        if aspect <= 0.0 {
            return Err(CropError::Degenerate(format!("crop aspect {aspect}")));
        }
        return Ok(aspect);
    }
    match (target.width, target.height) {
        (Some(w), Some(h)) => {
            if w <= 0.0 || h <= 0.0 {
                return Err(CropError::Degenerate(format!("target box {w}x{h}")));
            }
            Ok(w / h)
        }
        _ if target.width.is_some()
            || target.height.is_some()
            || target.longest_edge.is_some() =>
        {
            Ok(sw / sh)
        }
        _ => Err(CropError::NoTarget),
    }
}

/// Grow the exact-aspect maximal crop toward the full frame until the
/// carried waste reaches the allowed fraction.
///
/// The largest target-aspect rectangle inside any crop in this band is the
/// maximal crop itself (the constraining axis never grows), so the waste a
/// crop carries is `1 − max_area / crop_area`. Crop area is monotonic along
/// the band; bisect for the crop whose waste hits the bound.
fn widen_for_waste(sw: f64, sh: f64, max_w: f64, max_h: f64, max_waste: f64) -> (f64, f64) {
    let max_area = max_w * max_h;
    let full_waste = 1.0 - max_area / (sw * sh);
    if full_waste <= max_waste {
        return (sw, sh);
    }

    let dims = |t: f64| (max_w + (sw - max_w) * t, max_h + (sh - max_h) * t);
    let waste = |t: f64| {
        let (w, h) = dims(t);
        1.0 - max_area / (w * h)
    };

    let (mut lo, mut hi) = (0.0f64, 1.0f64);
    for _ in 0..64 {
        let mid = 0.5 * (lo + hi);
        if waste(mid) > max_waste {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    dims(lo)
}

/// Output dimensions: both given → verbatim; one given → the other derived
/// from the crop aspect; neither → longest-edge scaling, or the crop's own
/// dimensions (no resampling).
fn resolve_output(target: &TargetSpec, crop_w: f64, crop_h: f64) -> Result<(u32, u32), CropError> {
    let crop_aspect = crop_w / crop_h;
    let (w, h) = match (target.width, target.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w / crop_aspect),
        (None, Some(h)) => (h * crop_aspect, h),
        (None, None) => match target.longest_edge {
            Some(edge) => {
                if crop_aspect >= 1.0 {
                    (edge, edge / crop_aspect)
                } else {
                    (edge * crop_aspect, edge)
                }
            }
            None => (crop_w, crop_h),
        },
    };

    let out_w = w.round() as i64;
    let out_h = h.round() as i64;
    if out_w < 1 || out_h < 1 || out_w > u32::MAX as i64 || out_h > u32::MAX as i64 {
        return Err(CropError::Degenerate(format!("output dimensions {w}x{h}")));
    }
    Ok((out_w as u32, out_h as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aspect_of(frame: &Frame) -> f64 {
        frame.crop_w() / frame.crop_h()
    }

    #[test]
    fn closed_crop_matches_aspect_exactly() {
        let spec = TargetSpec { aspect: Some(1.0), ..TargetSpec::default() };
        let frame = CropSolver::solve(1000, 500, &spec).unwrap();
        assert!((aspect_of(&frame) - 1.0).abs() < 1e-6);
        assert_eq!(frame.crop_x(), 250.0);
        assert_eq!(frame.crop_y(), 0.0);
        assert_eq!(frame.crop_w(), 500.0);
        assert_eq!(frame.crop_h(), 500.0);
    }

    #[test]
    fn matching_aspect_gives_full_frame() {
        let spec = TargetSpec { aspect: Some(2.0), ..TargetSpec::default() };
        let frame = CropSolver::solve(1000, 500, &spec).unwrap();
        assert_eq!((frame.crop_x(), frame.crop_y()), (0.0, 0.0));
        assert_eq!((frame.crop_w(), frame.crop_h()), (1000.0, 500.0));
    }

    #[test]
    fn empty_target_is_no_target() {
        let err = CropSolver::solve(1000, 500, &TargetSpec::default()).unwrap_err();
        assert_eq!(err, CropError::NoTarget);
    }

    #[test]
    fn width_and_height_fix_aspect_and_output() {
        let spec =
            TargetSpec { width: Some(300.0), height: Some(300.0), ..TargetSpec::default() };
        let frame = CropSolver::solve(1000, 500, &spec).unwrap();
        assert_eq!((frame.width(), frame.height()), (300, 300));
        assert!((aspect_of(&frame) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn single_width_keeps_source_aspect() {
        let spec = TargetSpec { width: Some(500.0), ..TargetSpec::default() };
        let frame = CropSolver::solve(1000, 500, &spec).unwrap();
        assert_eq!((frame.width(), frame.height()), (500, 250));
        assert_eq!((frame.crop_w(), frame.crop_h()), (1000.0, 500.0));
    }

    #[test]
    fn longest_edge_scales_landscape_and_portrait() {
        let spec = TargetSpec { longest_edge: Some(400.0), ..TargetSpec::default() };
        let frame = CropSolver::solve(1000, 500, &spec).unwrap();
        assert_eq!((frame.width(), frame.height()), (400, 200));

        let frame = CropSolver::solve(500, 1000, &spec).unwrap();
        assert_eq!((frame.width(), frame.height()), (200, 400));
    }

    #[test]
    fn upsampling_is_allowed() {
        let spec =
            TargetSpec { width: Some(2000.0), height: Some(1000.0), ..TargetSpec::default() };
        let frame = CropSolver::solve(100, 50, &spec).unwrap();
        assert_eq!((frame.width(), frame.height()), (2000, 1000));
        assert!(frame.scale_x() > 1.0);
    }

    #[test]
    fn anchor_moves_the_crop() {
        let spec =
            TargetSpec { aspect: Some(1.0), anchor: (0.0, 0.5), ..TargetSpec::default() };
        let frame = CropSolver::solve(1000, 500, &spec).unwrap();
        assert_eq!(frame.crop_x(), 0.0);

        let spec = TargetSpec { aspect: Some(1.0), anchor: (1.0, 0.5), ..TargetSpec::default() };
        let frame = CropSolver::solve(1000, 500, &spec).unwrap();
        assert_eq!(frame.crop_x(), 500.0);
    }

    #[test]
    fn open_crop_keeps_more_within_waste_budget() {
        let closed = TargetSpec { aspect: Some(1.0), ..TargetSpec::default() };
        let open = TargetSpec {
            aspect: Some(1.0),
            mode: CropMode::Open,
            max_waste: Some(0.2),
            ..TargetSpec::default()
        };
        let closed_frame = CropSolver::solve(1000, 500, &closed).unwrap();
        let open_frame = CropSolver::solve(1000, 500, &open).unwrap();

        let closed_area = closed_frame.crop_w() * closed_frame.crop_h();
        let open_area = open_frame.crop_w() * open_frame.crop_h();
        assert!(open_area > closed_area);

        // Waste carried by the open crop sits at the budget.
        let waste = 1.0 - closed_area / open_area;
        assert!((waste - 0.2).abs() < 1e-6, "waste {waste}");
        // Aspect drifted toward the source but stayed in bounds.
        assert!(open_frame.crop_h() <= 500.0 && open_frame.crop_w() <= 1000.0);
    }

    #[test]
    fn open_crop_with_generous_budget_is_full_frame() {
        let spec = TargetSpec {
            aspect: Some(1.0),
            mode: CropMode::Open,
            max_waste: Some(0.9),
            ..TargetSpec::default()
        };
        let frame = CropSolver::solve(1000, 500, &spec).unwrap();
        assert_eq!((frame.crop_w(), frame.crop_h()), (1000.0, 500.0));
    }

    #[test]
    fn closed_mode_ignores_waste_budget() {
        let spec = TargetSpec {
            aspect: Some(1.0),
            mode: CropMode::Closed,
            max_waste: Some(0.5),
            ..TargetSpec::default()
        };
        let frame = CropSolver::solve(1000, 500, &spec).unwrap();
        assert_eq!((frame.crop_w(), frame.crop_h()), (500.0, 500.0));
    }

    #[test]
    fn fixed_crop_box_is_used_verbatim() {
        let spec = TargetSpec {
            crop_box: Some(CropBox { x: 10.0, y: 20.0, width: 100.0, height: 50.0 }),
            ..TargetSpec::default()
        };
        let frame = CropSolver::solve(1000, 500, &spec).unwrap();
        assert_eq!((frame.crop_x(), frame.crop_y()), (10.0, 20.0));
        assert_eq!((frame.width(), frame.height()), (100, 50));
    }

    #[test]
    fn fixed_crop_box_outside_source_fails() {
        let spec = TargetSpec {
            crop_box: Some(CropBox { x: 950.0, y: 0.0, width: 100.0, height: 50.0 }),
            ..TargetSpec::default()
        };
        let err = CropSolver::solve(1000, 500, &spec).unwrap_err();
        assert!(matches!(err, CropError::OutOfBounds { .. }));
    }

    #[test]
    fn degenerate_output_is_rejected() {
        let spec = TargetSpec { width: Some(0.2), ..TargetSpec::default() };
        let err = CropSolver::solve(1000, 500, &spec).unwrap_err();
        assert!(matches!(err, CropError::Degenerate(_)));
    }
}
