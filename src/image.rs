//! In-memory raster: pixel storage, format description, color profile,
//! metadata tags.
//!
//! An [`Image`] is exclusively owned and moves between pipeline stages
//! (decoder → pipeline → encoder); nothing in the crate shares one mutably.
//! The buffer length always equals `width × height × channels` for the
//! stored sample depth — constructors enforce it and every stage preserves
//! it.

use crate::color::ColorProfile;
use std::collections::BTreeMap;
use thiserror::Error;

/// Hard ceiling on `width × height` for a single raster.
///
/// Oversized requests are refused up front as a resource error instead of
/// letting a doomed multi-gigabyte allocation take the process down.
pub const MAX_PIXELS: u64 = 1 << 31;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("degenerate image dimensions {width}x{height}")]
    Degenerate { width: u32, height: u32 },

    #[error("image of {width}x{height} pixels exceeds the {MAX_PIXELS}-pixel allocation limit")]
    TooLarge { width: u32, height: u32 },

    #[error("sample buffer holds {got} samples, format requires {expected}")]
    BufferMismatch { got: usize, expected: usize },
}

/// Storage depth of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDepth {
    U8,
    U16,
    /// Working depth used between pipeline stages; normalized to [0, 1].
    F32,
}

impl SampleDepth {
    pub fn bytes(self) -> usize {
        match self {
            SampleDepth::U8 => 1,
            SampleDepth::U16 => 2,
            SampleDepth::F32 => 4,
        }
    }

    /// Bit depth as written in destination configuration (8 or 16).
    pub fn bits(self) -> u8 {
        match self {
            SampleDepth::U8 => 8,
            SampleDepth::U16 => 16,
            SampleDepth::F32 => 32,
        }
    }
}

/// Channel layout of a pixel: channel count, sample depth, alpha presence.
///
/// The color channels come first; when `alpha` is set the last channel is
/// unassociated alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub channels: u8,
    pub depth: SampleDepth,
    pub alpha: bool,
}

impl PixelFormat {
    pub const fn new(channels: u8, depth: SampleDepth, alpha: bool) -> Self {
        Self { channels, depth, alpha }
    }

    pub const fn gray(depth: SampleDepth) -> Self {
        Self::new(1, depth, false)
    }

    pub const fn rgb(depth: SampleDepth) -> Self {
        Self::new(3, depth, false)
    }

    pub const fn rgba(depth: SampleDepth) -> Self {
        Self::new(4, depth, true)
    }

    /// Channels carrying color (excludes alpha).
    pub fn color_channels(self) -> u8 {
        if self.alpha { self.channels - 1 } else { self.channels }
    }

    pub fn bytes_per_pixel(self) -> usize {
        self.channels as usize * self.depth.bytes()
    }

    pub fn with_depth(self, depth: SampleDepth) -> Self {
        Self { depth, ..self }
    }
}

/// Depth-tagged sample storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::U16(v) => v.len(),
            Samples::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn depth(&self) -> SampleDepth {
        match self {
            Samples::U8(_) => SampleDepth::U8,
            Samples::U16(_) => SampleDepth::U16,
            Samples::F32(_) => SampleDepth::F32,
        }
    }

    fn zeroed(depth: SampleDepth, len: usize) -> Self {
        match depth {
            SampleDepth::U8 => Samples::U8(vec![0; len]),
            SampleDepth::U16 => Samples::U16(vec![0; len]),
            SampleDepth::F32 => Samples::F32(vec![0.0; len]),
        }
    }
}

/// Ordered metadata tag set carried alongside the pixels.
pub type TagSet = BTreeMap<String, String>;

/// An owned raster image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    format: PixelFormat,
    samples: Samples,
    profile: Option<ColorProfile>,
    tags: TagSet,
}

impl Image {
    /// Allocate a zero-filled image, refusing degenerate or oversized
    /// dimensions.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, ImageError> {
        Self::check_dimensions(width, height)?;
        let len = width as usize * height as usize * format.channels as usize;
        Ok(Self {
            width,
            height,
            format,
            samples: Samples::zeroed(format.depth, len),
            profile: None,
            tags: TagSet::new(),
        })
    }

    /// Wrap an existing sample buffer. The buffer length and depth must
    /// match the stated format exactly.
    pub fn from_samples(
        width: u32,
        height: u32,
        format: PixelFormat,
        samples: Samples,
    ) -> Result<Self, ImageError> {
        Self::check_dimensions(width, height)?;
        let expected = width as usize * height as usize * format.channels as usize;
        if samples.len() != expected || samples.depth() != format.depth {
            return Err(ImageError::BufferMismatch { got: samples.len(), expected });
        }
        Ok(Self {
            width,
            height,
            format,
            samples,
            profile: None,
            tags: TagSet::new(),
        })
    }

    fn check_dimensions(width: u32, height: u32) -> Result<(), ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::Degenerate { width, height });
        }
        if width as u64 * height as u64 > MAX_PIXELS {
            return Err(ImageError::TooLarge { width, height });
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn profile(&self) -> Option<&ColorProfile> {
        self.profile.as_ref()
    }

    pub fn set_profile(&mut self, profile: Option<ColorProfile>) {
        self.profile = profile;
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut TagSet {
        &mut self.tags
    }

    /// Move profile and tags from another image onto this one. Used by the
    /// pipeline to carry metadata across stages that rebuild the buffer.
    pub fn adopt_metadata(&mut self, other: &Image) {
        self.profile = other.profile.clone();
        self.tags = other.tags.clone();
    }

    /// Apply an opaque key-remapping to the tag set, as when moving between
    /// format-specific encoders with different tag namespaces. Keys absent
    /// from the table pass through unchanged.
    pub fn remap_tags(&mut self, table: &BTreeMap<String, String>) {
        let old = std::mem::take(&mut self.tags);
        for (key, value) in old {
            let key = table.get(&key).cloned().unwrap_or(key);
            self.tags.insert(key, value);
        }
    }

    /// Borrow the samples as `f32`, if that is the stored depth.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.samples {
            Samples::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match &mut self.samples {
            Samples::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.samples {
            Samples::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&[u16]> {
        match &self.samples {
            Samples::U16(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to the normalized `f32` working depth, preserving profile and
    /// tags. A no-op copy when already `F32`.
    pub fn to_f32(&self) -> Image {
        let data = match &self.samples {
            Samples::U8(v) => v.iter().map(|&s| s as f32 / 255.0).collect(),
            Samples::U16(v) => v.iter().map(|&s| s as f32 / 65535.0).collect(),
            Samples::F32(v) => v.clone(),
        };
        Image {
            width: self.width,
            height: self.height,
            format: self.format.with_depth(SampleDepth::F32),
            samples: Samples::F32(data),
            profile: self.profile.clone(),
            tags: self.tags.clone(),
        }
    }

    /// One row of `f32` samples. Panics if the stored depth is not `F32`;
    /// only the pipeline's working images use this.
    pub fn row_f32(&self, y: u32) -> &[f32] {
        let stride = self.width as usize * self.format.channels as usize;
        let start = y as usize * stride;
        &self.as_f32().expect("row_f32 on non-f32 image")[start..start + stride]
    }
}
