//! Format-specific decode and encode at the pipeline boundary.
//!
//! The pipeline itself never touches bytes on disk; these adapters move
//! between container formats and the owned [`Image`] the pipeline consumes.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality hint) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (compression hint) |
//! | Encode → TIFF | `image::codecs::tiff::TiffEncoder` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | IPTC metadata | [`iptc`] (JPEG APP13 read/write, TIFF IFD read) |
//!
//! JPEG outputs carry the writable IPTC tags back out as an APP13 segment
//! spliced in after encoding. The other encoders cannot embed tags, so
//! there tags are dropped at the write boundary; the pipeline still
//! carries them for callers that consume the [`Image`] directly.

pub mod iptc;

use crate::color::ColorProfile;
use crate::destination::{Destination, OutputFormat};
use crate::image::{Image, ImageError, PixelFormat, SampleDepth, Samples};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{self, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageBuffer, ImageFormat, ImageReader, Luma, LumaA, Rgb, Rgba};
use std::fs::{self, File};
use std::io::{BufWriter, Cursor};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unknown file type: {0}")]
    UnknownFileType(String),

    #[error("IO error: {0}")]
    Open(#[from] std::io::Error),

    #[error("content error in {path}: {message}")]
    Content { path: String, message: String },

    #[error("codec library error: {0}")]
    Library(String),

    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Extensions whose decoders are compiled in.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

/// The set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> impl Iterator<Item = &'static str> {
    INPUT_CANDIDATES.iter().map(|(ext, _)| *ext)
}

fn format_for_path(path: &Path) -> Option<ImageFormat> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    INPUT_CANDIDATES.iter().find(|(e, _)| *e == ext).map(|(_, f)| *f)
}

/// Whether `path` carries an extension this crate can decode.
pub fn is_supported_input(path: &Path) -> bool {
    format_for_path(path).is_some()
}

/// Decode a source file into an owned [`Image`], attaching whatever IPTC
/// tags the container carries. Embedded ICC profile data is ignored; the
/// attached profile is assumed from the channel count (sRGB for color
/// layouts, gray otherwise).
pub fn decode(path: &Path) -> Result<Image, CodecError> {
    let format = format_for_path(path)
        .ok_or_else(|| CodecError::UnknownFileType(path.display().to_string()))?;
    debug!(path = %path.display(), ?format, "decoding");

    let decoded = ImageReader::open(path)?
        .decode()
        .map_err(|e| CodecError::Content { path: path.display().to_string(), message: e.to_string() })?;

    let mut img = from_dynamic(decoded)?;
    // Untagged sources are assumed to carry the standard web tone curve.
    let profile = if img.format().color_channels() >= 3 {
        ColorProfile::Srgb
    } else {
        ColorProfile::Gray
    };
    img.set_profile(Some(profile));
    *img.tags_mut() = iptc::read_tags(path);
    Ok(img)
}

/// Encode `image` to `path` in the destination's format, honoring its
/// encoder hints. JPEG outputs carry the writable IPTC tags as an APP13
/// segment. Input must already be at an 8- or 16-bit storage depth.
pub fn encode(image: &Image, dest: &Destination, path: &Path) -> Result<(), CodecError> {
    let format = dest.output_format();
    let depth = image.format().depth;
    if depth == SampleDepth::F32 {
        return Err(CodecError::Library(
            "encoding requires an 8- or 16-bit image, got the f32 working depth".into(),
        ));
    }
    if depth == SampleDepth::U16 && matches!(format, OutputFormat::Jpeg | OutputFormat::Webp) {
        return Err(CodecError::Library(format!("{format} cannot store 16-bit samples")));
    }
    if !image.tags().is_empty() && format != OutputFormat::Jpeg {
        debug!(
            path = %path.display(),
            tags = image.tags().len(),
            "container cannot carry the tag set, dropping"
        );
    }

    let mut dynamic = to_dynamic(image)?;
    match format {
        // JPEG has no alpha channel; flatten instead of refusing.
        OutputFormat::Jpeg if image.format().alpha => {
            dynamic = if image.format().color_channels() >= 3 {
                DynamicImage::ImageRgb8(dynamic.to_rgb8())
            } else {
                DynamicImage::ImageLuma8(dynamic.to_luma8())
            };
        }
        // The lossless WebP encoder takes RGB layouts only.
        OutputFormat::Webp if image.format().color_channels() == 1 => {
            dynamic = if image.format().alpha {
                DynamicImage::ImageRgba8(dynamic.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(dynamic.to_rgb8())
            };
        }
        _ => {}
    }

    debug!(path = %path.display(), %format, "encoding");
    let lib = |e: image::ImageError| CodecError::Library(e.to_string());
    match format {
        OutputFormat::Jpeg => {
            // Encoded in memory so the IPTC APP13 segment can be spliced
            // in after the SOI marker.
            let mut bytes = Vec::new();
            let enc = JpegEncoder::new_with_quality(
                Cursor::new(&mut bytes),
                dest.jpeg.resolved_quality(),
            );
            dynamic.write_with_encoder(enc).map_err(lib)?;
            if let Some(segment) = iptc::app13_segment(image.tags()) {
                bytes.splice(2..2, segment);
            }
            fs::write(path, &bytes)?;
        }
        OutputFormat::Png => {
            let compression = match dest.png.compression.get() {
                Some(0..=2) => png::CompressionType::Fast,
                Some(8..=9) => png::CompressionType::Best,
                _ => png::CompressionType::Default,
            };
            let enc = PngEncoder::new_with_quality(
                BufWriter::new(File::create(path)?),
                compression,
                png::FilterType::Adaptive,
            );
            dynamic.write_with_encoder(enc).map_err(lib)?;
        }
        OutputFormat::Tiff => {
            let enc = TiffEncoder::new(BufWriter::new(File::create(path)?));
            dynamic.write_with_encoder(enc).map_err(lib)?;
        }
        OutputFormat::Webp => {
            let enc = WebPEncoder::new_lossless(BufWriter::new(File::create(path)?));
            dynamic.write_with_encoder(enc).map_err(lib)?;
        }
    }
    Ok(())
}

/// Convert a decoded `image`-crate buffer into the crate's raster model.
fn from_dynamic(src: DynamicImage) -> Result<Image, CodecError> {
    let (width, height) = (src.width(), src.height());
    let (format, samples) = match src {
        DynamicImage::ImageLuma8(b) => {
            (PixelFormat::gray(SampleDepth::U8), Samples::U8(b.into_raw()))
        }
        DynamicImage::ImageLumaA8(b) => {
            (PixelFormat::new(2, SampleDepth::U8, true), Samples::U8(b.into_raw()))
        }
        DynamicImage::ImageRgb8(b) => {
            (PixelFormat::rgb(SampleDepth::U8), Samples::U8(b.into_raw()))
        }
        DynamicImage::ImageRgba8(b) => {
            (PixelFormat::rgba(SampleDepth::U8), Samples::U8(b.into_raw()))
        }
        DynamicImage::ImageLuma16(b) => {
            (PixelFormat::gray(SampleDepth::U16), Samples::U16(b.into_raw()))
        }
        DynamicImage::ImageLumaA16(b) => {
            (PixelFormat::new(2, SampleDepth::U16, true), Samples::U16(b.into_raw()))
        }
        DynamicImage::ImageRgb16(b) => {
            (PixelFormat::rgb(SampleDepth::U16), Samples::U16(b.into_raw()))
        }
        DynamicImage::ImageRgba16(b) => {
            (PixelFormat::rgba(SampleDepth::U16), Samples::U16(b.into_raw()))
        }
        other => {
            (PixelFormat::rgba(SampleDepth::U8), Samples::U8(other.to_rgba8().into_raw()))
        }
    };
    Ok(Image::from_samples(width, height, format, samples)?)
}

/// Convert the crate's raster model back into an `image`-crate buffer for
/// encoding.
fn to_dynamic(image: &Image) -> Result<DynamicImage, CodecError> {
    let (w, h) = (image.width(), image.height());
    let format = image.format();
    let bad = || CodecError::Library("sample buffer does not match its stated layout".into());

    let dynamic = match (format.depth, format.channels) {
        (SampleDepth::U8, 1) => DynamicImage::ImageLuma8(
            ImageBuffer::<Luma<u8>, _>::from_raw(w, h, image.as_u8().ok_or_else(bad)?.to_vec())
                .ok_or_else(bad)?,
        ),
        (SampleDepth::U8, 2) => DynamicImage::ImageLumaA8(
            ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, image.as_u8().ok_or_else(bad)?.to_vec())
                .ok_or_else(bad)?,
        ),
        (SampleDepth::U8, 3) => DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, image.as_u8().ok_or_else(bad)?.to_vec())
                .ok_or_else(bad)?,
        ),
        (SampleDepth::U8, 4) => DynamicImage::ImageRgba8(
            ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, image.as_u8().ok_or_else(bad)?.to_vec())
                .ok_or_else(bad)?,
        ),
        (SampleDepth::U16, 1) => DynamicImage::ImageLuma16(
            ImageBuffer::<Luma<u16>, _>::from_raw(w, h, image.as_u16().ok_or_else(bad)?.to_vec())
                .ok_or_else(bad)?,
        ),
        (SampleDepth::U16, 2) => DynamicImage::ImageLumaA16(
            ImageBuffer::<LumaA<u16>, _>::from_raw(w, h, image.as_u16().ok_or_else(bad)?.to_vec())
                .ok_or_else(bad)?,
        ),
        (SampleDepth::U16, 3) => DynamicImage::ImageRgb16(
            ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, image.as_u16().ok_or_else(bad)?.to_vec())
                .ok_or_else(bad)?,
        ),
        (SampleDepth::U16, 4) => DynamicImage::ImageRgba16(
            ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, image.as_u16().ok_or_else(bad)?.to_vec())
                .ok_or_else(bad)?,
        ),
        (depth, channels) => {
            return Err(CodecError::Library(format!(
                "no encoder layout for {channels} channels at {depth:?}"
            )))
        }
    };
    Ok(dynamic)
}
