//! Crop + resize of a working image through precomputed kernel tables.
//!
//! Two separable passes: the horizontal pass produces an intermediate
//! buffer of `output_width × source_height`, the vertical pass consumes it
//! (or the transposed order, whichever is cheaper). The intermediate is
//! render-local and never shared. Identical inputs produce identical output
//! bytes.

pub mod kernels;

use crate::frame::Frame;
use crate::image::{Image, ImageError, SampleDepth, Samples};
use kernels::{make_kernel, Kernel1Dvar, Kernel2Dvar, KernelFamily};
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("resampler requires the f32 working depth, got {0:?}")]
    NotWorkingDepth(SampleDepth),

    /// Intermediate or output allocation refused; a resource error, never
    /// silently downgraded to a smaller output.
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Resolved resize parameters for one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedResize {
    pub family: KernelFamily,
    pub support: f64,
}

impl Default for ResolvedResize {
    fn default() -> Self {
        Self { family: KernelFamily::Lanczos, support: kernels::Lanczos::DEFAULT_RADIUS }
    }
}

pub struct Resampler;

impl Resampler {
    /// Produce a `frame.width() × frame.height()` image from `source`,
    /// cropping and resampling in one convolution per axis.
    pub fn resample(
        source: &Image,
        frame: &Frame,
        resize: &ResolvedResize,
    ) -> Result<Image, ResampleError> {
        if source.format().depth != SampleDepth::F32 {
            return Err(ResampleError::NotWorkingDepth(source.format().depth));
        }

        if frame.is_aligned_copy() {
            debug!(
                width = frame.width(),
                height = frame.height(),
                "frame is an aligned 1:1 window, copying rows"
            );
            return Ok(copy_window(source, frame)?);
        }

        let kernel = make_kernel(resize.family, resize.support);
        let tables = Kernel2Dvar::build(&kernel, frame, source.width(), source.height());
        debug!(
            from_w = source.width(),
            from_h = source.height(),
            to_w = frame.width(),
            to_h = frame.height(),
            support = resize.support,
            "resampling"
        );

        // Run the cheaper axis first: compare the intermediate sizes the
        // two orders would produce.
        let h_first_cost = frame.width() as u64 * source.height() as u64;
        let v_first_cost = source.width() as u64 * frame.height() as u64;
        let out = if h_first_cost < v_first_cost {
            let mid = convolve_h(source, &tables.horizontal)?;
            convolve_v(&mid, &tables.vertical)?
        } else {
            let mid = convolve_v(source, &tables.vertical)?;
            convolve_h(&mid, &tables.horizontal)?
        };

        let mut out = out;
        out.adopt_metadata(source);
        Ok(out)
    }
}

/// Pixel-aligned 1:1 crop: plain row copies, no convolution.
fn copy_window(source: &Image, frame: &Frame) -> Result<Image, ImageError> {
    let channels = source.format().channels as usize;
    let x0 = frame.crop_x() as usize * channels;
    let y0 = frame.crop_y() as u32;
    let out_w = frame.width();
    let out_h = frame.height();

    let mut data = Vec::with_capacity(out_w as usize * out_h as usize * channels);
    for y in 0..out_h {
        let row = source.row_f32(y0 + y);
        data.extend_from_slice(&row[x0..x0 + out_w as usize * channels]);
    }

    let mut out = Image::from_samples(out_w, out_h, source.format(), Samples::F32(data))?;
    out.adopt_metadata(source);
    Ok(out)
}

/// Convolve horizontally: each output row depends on one source row.
fn convolve_h(source: &Image, table: &Kernel1Dvar) -> Result<Image, ResampleError> {
    let channels = source.format().channels as usize;
    let out_w = table.out_len();
    let height = source.height();
    let mut out = Image::new(out_w as u32, height, source.format())?;

    let stride = out_w * channels;
    out.as_f32_mut()
        .expect("freshly allocated f32 image")
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, out_row)| {
            let src_row = source.row_f32(y as u32);
            for (nx, row) in table.rows().iter().enumerate() {
                let acc = &mut out_row[nx * channels..(nx + 1) * channels];
                acc.fill(0.0);
                for (k, &w) in row.weights.iter().enumerate() {
                    let src = &src_row[(row.start + k) * channels..];
                    for c in 0..channels {
                        acc[c] += src[c] * w;
                    }
                }
                for v in acc.iter_mut() {
                    *v = v.clamp(0.0, 1.0);
                }
            }
        });

    Ok(out)
}

/// Convolve vertically: each output row is a weighted sum of source rows.
fn convolve_v(source: &Image, table: &Kernel1Dvar) -> Result<Image, ResampleError> {
    let channels = source.format().channels as usize;
    let width = source.width();
    let out_h = table.out_len();
    let mut out = Image::new(width, out_h as u32, source.format())?;

    let stride = width as usize * channels;
    out.as_f32_mut()
        .expect("freshly allocated f32 image")
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(ny, out_row)| {
            let row = table.row(ny);
            for (k, &w) in row.weights.iter().enumerate() {
                let src_row = source.row_f32((row.start + k) as u32);
                for (o, &s) in out_row.iter_mut().zip(src_row) {
                    *o += s * w;
                }
            }
            for v in out_row.iter_mut() {
                *v = v.clamp(0.0, 1.0);
            }
        });

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::{CropSolver, TargetSpec};
    use crate::image::PixelFormat;

    fn gradient_image(width: u32, height: u32) -> Image {
        let data: Vec<f32> = (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| {
                    (x as f32 / (width - 1).max(1) as f32
                        + y as f32 / (height - 1).max(1) as f32)
                        / 2.0
                })
            })
            .collect();
        Image::from_samples(width, height, PixelFormat::gray(SampleDepth::F32), Samples::F32(data))
            .unwrap()
    }

    fn solve(width: u32, height: u32, spec: &TargetSpec) -> Frame {
        CropSolver::solve(width, height, spec).unwrap()
    }

    #[test]
    fn output_has_frame_dimensions() {
        let src = gradient_image(64, 48);
        let spec =
            TargetSpec { width: Some(32.0), height: Some(16.0), ..TargetSpec::default() };
        let frame = solve(64, 48, &spec);
        let out = Resampler::resample(&src, &frame, &ResolvedResize::default()).unwrap();
        assert_eq!((out.width(), out.height()), (32, 16));
        assert_eq!(out.format().channels, 1);
    }

    #[test]
    fn resampling_is_deterministic() {
        let src = gradient_image(64, 64);
        let spec = TargetSpec { width: Some(41.0), ..TargetSpec::default() };
        let frame = solve(64, 64, &spec);
        let a = Resampler::resample(&src, &frame, &ResolvedResize::default()).unwrap();
        let b = Resampler::resample(&src, &frame, &ResolvedResize::default()).unwrap();
        assert_eq!(a.as_f32().unwrap(), b.as_f32().unwrap());
    }

    #[test]
    fn flat_image_stays_flat() {
        // Unit-sum kernels keep a constant image constant, edges included.
        let data = vec![0.25f32; 40 * 30];
        let src = Image::from_samples(
            40,
            30,
            PixelFormat::gray(SampleDepth::F32),
            Samples::F32(data),
        )
        .unwrap();
        let spec = TargetSpec { width: Some(23.0), height: Some(19.0), ..TargetSpec::default() };
        let frame = solve(40, 30, &spec);
        let out = Resampler::resample(&src, &frame, &ResolvedResize::default()).unwrap();
        for &v in out.as_f32().unwrap() {
            assert!((v - 0.25).abs() < 1e-4, "sample {v}");
        }
    }

    #[test]
    fn up_then_down_round_trip_is_close() {
        let src = gradient_image(32, 32);

        let up_spec =
            TargetSpec { width: Some(64.0), height: Some(64.0), ..TargetSpec::default() };
        let up = Resampler::resample(&src, &solve(32, 32, &up_spec), &ResolvedResize::default())
            .unwrap();

        let down_spec =
            TargetSpec { width: Some(32.0), height: Some(32.0), ..TargetSpec::default() };
        let down = Resampler::resample(&up, &solve(64, 64, &down_spec), &ResolvedResize::default())
            .unwrap();

        let orig = src.as_f32().unwrap();
        let round = down.as_f32().unwrap();
        let mae: f32 = orig
            .iter()
            .zip(round)
            .map(|(a, b)| (a - b).abs())
            .sum::<f32>()
            / orig.len() as f32;
        assert!(mae < 0.02, "mean absolute error {mae}");
    }

    #[test]
    fn aligned_window_is_an_exact_copy() {
        let src = gradient_image(16, 16);
        let spec = TargetSpec {
            crop_box: Some(crate::crop::CropBox { x: 4.0, y: 2.0, width: 8.0, height: 8.0 }),
            ..TargetSpec::default()
        };
        let frame = solve(16, 16, &spec);
        assert!(frame.is_aligned_copy());
        let out = Resampler::resample(&src, &frame, &ResolvedResize::default()).unwrap();
        assert_eq!(out.row_f32(0), &src.row_f32(2)[4..12]);
    }

    #[test]
    fn non_f32_source_is_rejected() {
        let src = Image::new(8, 8, PixelFormat::gray(SampleDepth::U8)).unwrap();
        let spec = TargetSpec { width: Some(4.0), ..TargetSpec::default() };
        let frame = solve(8, 8, &spec);
        let err = Resampler::resample(&src, &frame, &ResolvedResize::default()).unwrap_err();
        assert!(matches!(err, ResampleError::NotWorkingDepth(SampleDepth::U8)));
    }
}
