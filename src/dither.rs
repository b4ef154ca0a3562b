//! Error-diffusion quantization for bit-depth reduction and palette
//! mapping.
//!
//! Samples are processed in raster order with the Floyd–Steinberg kernel
//! (7/16 right, 3/16 below-left, 5/16 below, 1/16 below-right), scan
//! direction alternating per row (serpentine) with the horizontal offsets
//! mirrored on reverse rows. Order-dependent and exactly reproducible:
//! the loop is sequential and identical inputs with the same scan policy
//! produce identical bytes.

use crate::image::{Image, ImageError, PixelFormat, SampleDepth, Samples};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DitherError {
    #[error("palette is empty")]
    EmptyPalette,

    #[error("palette has {0} entries; the index output stores at most 256")]
    PaletteTooLarge(usize),

    #[error(transparent)]
    Image(#[from] ImageError),
}

/// What the ditherer quantizes to.
#[derive(Debug, Clone, Copy)]
pub enum DitherTarget<'a> {
    /// Reduce to the given storage depth, each channel independently.
    Depth(SampleDepth),
    /// Map to a fixed indexed palette of at most 256 entries; nearest-entry
    /// selection and the residual are joint across the three color
    /// channels. Output samples are palette indices.
    Palette(&'a [[u8; 3]]),
}

/// Floyd–Steinberg diffusion taps: (dx, dy, numerator / 16).
const FS_KERNEL: [(i64, i64, f32); 4] =
    [(1, 0, 7.0), (-1, 1, 3.0), (0, 1, 5.0), (1, 1, 1.0)];

pub struct Ditherer {
    serpentine: bool,
}

impl Default for Ditherer {
    fn default() -> Self {
        Self { serpentine: true }
    }
}

impl Ditherer {
    pub fn new(serpentine: bool) -> Self {
        Self { serpentine }
    }

    pub fn dither(&self, source: &Image, target: DitherTarget<'_>) -> Result<Image, DitherError> {
        match target {
            DitherTarget::Depth(depth) => self.dither_depth(source, depth),
            DitherTarget::Palette(palette) => self.dither_palette(source, palette),
        }
    }

    fn dither_depth(&self, source: &Image, depth: SampleDepth) -> Result<Image, DitherError> {
        // No depth reduction: the identity.
        if source.format().depth == depth {
            return Ok(source.clone());
        }
        if depth == SampleDepth::F32 {
            return Ok(source.to_f32());
        }

        let levels = match depth {
            SampleDepth::U8 => 255.0f32,
            SampleDepth::U16 => 65535.0f32,
            SampleDepth::F32 => unreachable!(),
        };
        debug!(
            from = ?source.format().depth,
            to = ?depth,
            serpentine = self.serpentine,
            "dithering depth reduction"
        );

        let work = source.to_f32();
        let width = work.width() as usize;
        let height = work.height() as usize;
        let channels = work.format().channels as usize;
        let stride = width * channels;

        let mut out_u8 = Vec::new();
        let mut out_u16 = Vec::new();
        match depth {
            SampleDepth::U8 => out_u8 = vec![0u8; stride * height],
            SampleDepth::U16 => out_u16 = vec![0u16; stride * height],
            SampleDepth::F32 => unreachable!(),
        }

        let mut curr = vec![0.0f32; stride];
        let mut next = vec![0.0f32; stride];

        for y in 0..height {
            next.fill(0.0);
            let reverse = self.serpentine && y % 2 == 1;
            let src_row = work.row_f32(y as u32);

            let xs: Box<dyn Iterator<Item = usize>> = if reverse {
                Box::new((0..width).rev())
            } else {
                Box::new(0..width)
            };

            for x in xs {
                for c in 0..channels {
                    let idx = x * channels + c;
                    let value = (src_row[idx] + curr[idx]).clamp(0.0, 1.0);
                    let quantized = (value * levels).round();
                    let err = value - quantized / levels;

                    match depth {
                        SampleDepth::U8 => out_u8[y * stride + idx] = quantized as u8,
                        SampleDepth::U16 => out_u16[y * stride + idx] = quantized as u16,
                        SampleDepth::F32 => unreachable!(),
                    }

                    diffuse(&mut curr, &mut next, x, c, channels, width, reverse, err);
                }
            }
            std::mem::swap(&mut curr, &mut next);
        }

        let samples = match depth {
            SampleDepth::U8 => Samples::U8(out_u8),
            SampleDepth::U16 => Samples::U16(out_u16),
            SampleDepth::F32 => unreachable!(),
        };
        let mut out = Image::from_samples(
            work.width(),
            work.height(),
            work.format().with_depth(depth),
            samples,
        )?;
        out.adopt_metadata(source);
        Ok(out)
    }

    fn dither_palette(&self, source: &Image, palette: &[[u8; 3]]) -> Result<Image, DitherError> {
        if palette.is_empty() {
            return Err(DitherError::EmptyPalette);
        }
        // Indices are stored as u8 samples; more entries would wrap.
        if palette.len() > 256 {
            return Err(DitherError::PaletteTooLarge(palette.len()));
        }
        let entries: Vec<[f32; 3]> = palette
            .iter()
            .map(|&[r, g, b]| [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0])
            .collect();
        debug!(entries = entries.len(), serpentine = self.serpentine, "dithering to palette");

        let work = source.to_f32();
        let width = work.width() as usize;
        let height = work.height() as usize;
        let channels = work.format().channels as usize;

        let mut indices = vec![0u8; width * height];
        let stride = width * 3;
        let mut curr = vec![0.0f32; stride];
        let mut next = vec![0.0f32; stride];

        for y in 0..height {
            next.fill(0.0);
            let reverse = self.serpentine && y % 2 == 1;
            let src_row = work.row_f32(y as u32);

            let xs: Box<dyn Iterator<Item = usize>> = if reverse {
                Box::new((0..width).rev())
            } else {
                Box::new(0..width)
            };

            for x in xs {
                // Joint pixel value: replicate gray to three channels so a
                // single palette path serves both layouts.
                let mut px = [0.0f32; 3];
                for (c, p) in px.iter_mut().enumerate() {
                    let s = if channels >= 3 {
                        src_row[x * channels + c]
                    } else {
                        src_row[x * channels]
                    };
                    *p = (s + curr[x * 3 + c]).clamp(0.0, 1.0);
                }

                // Nearest entry by joint squared distance.
                let (best, _) = entries
                    .iter()
                    .enumerate()
                    .map(|(i, e)| {
                        let d = (px[0] - e[0]).powi(2)
                            + (px[1] - e[1]).powi(2)
                            + (px[2] - e[2]).powi(2);
                        (i, d)
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .expect("palette is non-empty");
                indices[y * width + x] = best as u8;

                let chosen = &entries[best];
                for c in 0..3 {
                    let err = px[c] - chosen[c];
                    diffuse(&mut curr, &mut next, x, c, 3, width, reverse, err);
                }
            }
            std::mem::swap(&mut curr, &mut next);
        }

        let mut out = Image::from_samples(
            work.width(),
            work.height(),
            PixelFormat::gray(SampleDepth::U8),
            Samples::U8(indices),
        )?;
        out.adopt_metadata(source);
        Ok(out)
    }
}

/// Spread one sample's residual to its unprocessed neighbors, mirroring
/// the horizontal offsets on serpentine reverse rows.
#[allow(clippy::too_many_arguments)]
fn diffuse(
    curr: &mut [f32],
    next: &mut [f32],
    x: usize,
    c: usize,
    channels: usize,
    width: usize,
    reverse: bool,
    err: f32,
) {
    for (dx, dy, num) in FS_KERNEL {
        let dx = if reverse { -dx } else { dx };
        let nx = x as i64 + dx;
        if nx < 0 || nx >= width as i64 {
            continue;
        }
        let idx = nx as usize * channels + c;
        let share = err * num / 16.0;
        if dy == 0 {
            curr[idx] += share;
        } else {
            next[idx] += share;
        }
    }
}
