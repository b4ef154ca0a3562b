//! Unsharp-mask sharpening with a small fixed-support Gaussian.
//!
//! `out = src + amount × (src − blur(src))`, with corrections below the
//! threshold suppressed so flat areas and sensor noise are not amplified.
//! Unlike the resampling kernels the Gaussian is not required to keep a
//! unit sum after truncation at image borders; the blur renormalizes the
//! visible taps instead.

use crate::image::{Image, SampleDepth};
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SharpenError {
    #[error("sharpen requires the f32 working depth, got {0:?}")]
    NotWorkingDepth(SampleDepth),
}

/// Resolved sharpen parameters for one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedSharpen {
    /// Kernel radius in pixels; footprint is `(2r+1)²`.
    pub radius: u32,
    pub sigma: f64,
    pub amount: f64,
    /// Minimum |src − blur| for a correction to apply.
    pub threshold: f64,
}

/// Precomputed Gaussian blur table plus unsharp parameters.
pub struct GaussianSharpen {
    radius: i64,
    /// `(2r+1)²` normalized Gaussian weights, row-major.
    weights: Vec<f32>,
    amount: f32,
    threshold: f32,
}

impl GaussianSharpen {
    pub fn new(params: &ResolvedSharpen) -> Self {
        let radius = params.radius.max(1) as i64;
        let side = (2 * radius + 1) as usize;
        let sigma = if params.sigma > 0.0 { params.sigma } else { radius as f64 / 2.0 };
        let denom = -2.0 * sigma * sigma;

        let mut weights = vec![0.0f32; side * side];
        let mut total = 0.0f64;
        for ky in -radius..=radius {
            for kx in -radius..=radius {
                let w = ((ky * ky + kx * kx) as f64 / denom).exp();
                weights[((ky + radius) * (2 * radius + 1) + kx + radius) as usize] = w as f32;
                total += w;
            }
        }
        for w in &mut weights {
            *w /= total as f32;
        }

        Self {
            radius,
            weights,
            amount: params.amount as f32,
            threshold: params.threshold as f32,
        }
    }

    /// Apply the unsharp mask. Amount 0 is the identity on any input.
    pub fn apply(&self, source: &Image) -> Result<Image, SharpenError> {
        if source.format().depth != SampleDepth::F32 {
            return Err(SharpenError::NotWorkingDepth(source.format().depth));
        }
        if self.amount == 0.0 {
            return Ok(source.clone());
        }

        let width = source.width() as i64;
        let height = source.height() as i64;
        let channels = source.format().channels as usize;
        debug!(width, height, amount = self.amount, "sharpening");

        let side = (2 * self.radius + 1) as usize;
        let mut out = source.clone();
        let stride = width as usize * channels;

        out.as_f32_mut()
            .expect("depth checked above")
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, out_row)| {
                let y = y as i64;
                let ky_lo = (-self.radius).max(-y);
                let ky_hi = self.radius.min(height - 1 - y);
                let mut blur = vec![0.0f32; channels];

                for x in 0..width {
                    let kx_lo = (-self.radius).max(-x);
                    let kx_hi = self.radius.min(width - 1 - x);

                    blur.fill(0.0);
                    let mut total = 0.0f32;
                    for ky in ky_lo..=ky_hi {
                        let src_row = source.row_f32((y + ky) as u32);
                        let wrow = &self.weights
                            [((ky + self.radius) as usize * side)..][..side];
                        for kx in kx_lo..=kx_hi {
                            let w = wrow[(kx + self.radius) as usize];
                            total += w;
                            let p = ((x + kx) as usize) * channels;
                            for c in 0..channels {
                                blur[c] += src_row[p + c] * w;
                            }
                        }
                    }
                    // Border footprints are truncated; renormalize what
                    // remains.
                    if total > 0.0 {
                        for b in blur.iter_mut() {
                            *b /= total;
                        }
                    }

                    let src_px = &source.row_f32(y as u32)[x as usize * channels..][..channels];
                    let out_px = &mut out_row[x as usize * channels..][..channels];
                    for c in 0..channels {
                        let diff = src_px[c] - blur[c];
                        if diff.abs() > self.threshold {
                            out_px[c] = (src_px[c] + self.amount * diff).clamp(0.0, 1.0);
                        }
                    }
                }
            });

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{PixelFormat, Samples};

    fn step_image() -> Image {
        // Vertical step edge in a 9x9 gray image.
        let data: Vec<f32> = (0..81).map(|i| if i % 9 < 4 { 0.2 } else { 0.8 }).collect();
        Image::from_samples(9, 9, PixelFormat::gray(SampleDepth::F32), Samples::F32(data))
            .unwrap()
    }

    fn params(amount: f64, threshold: f64) -> ResolvedSharpen {
        ResolvedSharpen { radius: 2, sigma: 1.0, amount, threshold }
    }

    #[test]
    fn amount_zero_is_identity() {
        let src = step_image();
        let out = GaussianSharpen::new(&params(0.0, 0.0)).apply(&src).unwrap();
        assert_eq!(out.as_f32().unwrap(), src.as_f32().unwrap());
    }

    #[test]
    fn edge_contrast_increases() {
        let src = step_image();
        let out = GaussianSharpen::new(&params(1.0, 0.0)).apply(&src).unwrap();
        // Sample either side of the step on the middle row.
        let row = 4usize * 9;
        let s = src.as_f32().unwrap();
        let o = out.as_f32().unwrap();
        assert!(o[row + 3] <= s[row + 3]);
        assert!(o[row + 4] >= s[row + 4]);
        assert!(o[row + 4] - o[row + 3] > s[row + 4] - s[row + 3]);
    }

    #[test]
    fn flat_regions_are_untouched() {
        let data = vec![0.5f32; 49];
        let src = Image::from_samples(
            7,
            7,
            PixelFormat::gray(SampleDepth::F32),
            Samples::F32(data),
        )
        .unwrap();
        let out = GaussianSharpen::new(&params(2.0, 0.0)).apply(&src).unwrap();
        for &v in out.as_f32().unwrap() {
            assert!((v - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn threshold_suppresses_small_corrections() {
        let src = step_image();
        // Threshold above the step magnitude: nothing may change.
        let out = GaussianSharpen::new(&params(1.0, 0.9)).apply(&src).unwrap();
        assert_eq!(out.as_f32().unwrap(), src.as_f32().unwrap());
    }

    #[test]
    fn wide_channel_layouts_are_supported() {
        // Layouts beyond RGBA, e.g. multi-band scans.
        let data = vec![0.5f32; 5 * 5 * 9];
        let src = Image::from_samples(
            5,
            5,
            PixelFormat::new(9, SampleDepth::F32, false),
            Samples::F32(data),
        )
        .unwrap();
        let out = GaussianSharpen::new(&params(1.0, 0.0)).apply(&src).unwrap();
        for &v in out.as_f32().unwrap() {
            assert!((v - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn output_stays_in_range() {
        let src = step_image();
        let out = GaussianSharpen::new(&params(10.0, 0.0)).apply(&src).unwrap();
        for &v in out.as_f32().unwrap() {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
