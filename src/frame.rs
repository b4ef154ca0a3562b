//! Resolved geometry for one (source image, destination) pair.

/// Crop rectangle in source coordinates plus the output dimensions it maps
/// to. Produced by the [`CropSolver`](crate::crop::CropSolver), consumed by
/// the [resampler](crate::resample).
///
/// The crop rectangle is fractional: a crop does not have to fall on source
/// pixel boundaries, the resampling kernels sample wherever it lands.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    crop_x: f64,
    crop_y: f64,
    crop_w: f64,
    crop_h: f64,
    width: u32,
    height: u32,
}

impl Frame {
    /// Invariants (crop inside source bounds, positive output) are enforced
    /// by the crop solver before construction.
    pub(crate) fn new(
        crop_x: f64,
        crop_y: f64,
        crop_w: f64,
        crop_h: f64,
        width: u32,
        height: u32,
    ) -> Self {
        debug_assert!(crop_w > 0.0 && crop_h > 0.0);
        debug_assert!(width > 0 && height > 0);
        Self { crop_x, crop_y, crop_w, crop_h, width, height }
    }

    pub fn crop_x(&self) -> f64 {
        self.crop_x
    }

    pub fn crop_y(&self) -> f64 {
        self.crop_y
    }

    pub fn crop_w(&self) -> f64 {
        self.crop_w
    }

    pub fn crop_h(&self) -> f64 {
        self.crop_h
    }

    /// Output width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Horizontal scale factor: output samples per cropped source sample.
    pub fn scale_x(&self) -> f64 {
        self.width as f64 / self.crop_w
    }

    /// Vertical scale factor.
    pub fn scale_y(&self) -> f64 {
        self.height as f64 / self.crop_h
    }

    /// True when the frame is a pixel-aligned 1:1 window onto the source,
    /// so the resampler can copy rows instead of convolving.
    pub fn is_aligned_copy(&self) -> bool {
        self.crop_x.fract() == 0.0
            && self.crop_y.fract() == 0.0
            && self.crop_w == self.width as f64
            && self.crop_h == self.height as f64
    }
}
