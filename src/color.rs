//! Color-managed pixel transforms.
//!
//! The engine does not reimplement colorimetry: [`ColorEngine`] is the seam
//! to an external color-management service (open a profile, build a
//! transform between two (profile, format) pairs, apply it to a buffer,
//! report rendering-intent support). [`BuiltinEngine`] covers the matrix
//! conversions the pipeline needs to run standalone — sRGB, linear RGB,
//! and their gray counterparts — and refuses anything else.

use crate::image::{Image, PixelFormat, SampleDepth, Samples};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColorError {
    #[error("no transform from {from} to {to}: incompatible profile pairing")]
    ProfileIncompatible { from: ColorProfile, to: ColorProfile },

    #[error("unknown color profile \"{0}\"")]
    UnknownProfile(String),

    #[error("rendering intent {0} is not supported by this engine")]
    UnsupportedIntent(RenderingIntent),

    #[error("color engine error: {0}")]
    Library(String),
}

/// Colorimetric policy for out-of-gamut mapping during a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RenderingIntent {
    #[default]
    Perceptual,
    RelativeColorimetric,
    Saturation,
    AbsoluteColorimetric,
}

impl fmt::Display for RenderingIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderingIntent::Perceptual => "perceptual",
            RenderingIntent::RelativeColorimetric => "relative-colorimetric",
            RenderingIntent::Saturation => "saturation",
            RenderingIntent::AbsoluteColorimetric => "absolute-colorimetric",
        };
        f.write_str(name)
    }
}

/// Identifier of a color profile attached to an image or named by a
/// destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorProfile {
    Srgb,
    LinearRgb,
    Gray,
    LinearGray,
}

impl ColorProfile {
    /// Color channel count of this profile's pixel layout.
    pub fn channels(&self) -> u8 {
        match self {
            ColorProfile::Srgb | ColorProfile::LinearRgb => 3,
            ColorProfile::Gray | ColorProfile::LinearGray => 1,
        }
    }

    fn is_linear(&self) -> bool {
        matches!(self, ColorProfile::LinearRgb | ColorProfile::LinearGray)
    }
}

impl fmt::Display for ColorProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorProfile::Srgb => "sRGB",
            ColorProfile::LinearRgb => "linear-rgb",
            ColorProfile::Gray => "gray",
            ColorProfile::LinearGray => "linear-gray",
        };
        f.write_str(name)
    }
}

impl FromStr for ColorProfile {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "srgb" => Ok(ColorProfile::Srgb),
            "linear-rgb" | "linear" => Ok(ColorProfile::LinearRgb),
            "gray" | "grey" => Ok(ColorProfile::Gray),
            "linear-gray" | "linear-grey" => Ok(ColorProfile::LinearGray),
            other => Err(ColorError::UnknownProfile(other.to_string())),
        }
    }
}

/// The external color-management seam.
///
/// Implementations are trusted services: the pipeline surfaces their errors
/// verbatim and never retries.
pub trait ColorEngine: Sync {
    /// Whether this engine can honor the given intent.
    fn supports_intent(&self, intent: RenderingIntent) -> bool;

    /// Convert `image` (in the normalized `f32` working depth) from
    /// `from` to `to`. Same dimensions out; pixel layout follows `to`.
    fn transform(
        &self,
        image: Image,
        from: &ColorProfile,
        to: &ColorProfile,
        intent: RenderingIntent,
    ) -> Result<Image, ColorError>;
}

/// sRGB gamma decode (IEC 61966-2-1).
fn srgb_to_linear(s: f32) -> f32 {
    if s <= 0.04045 {
        s / 12.92
    } else {
        ((s + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB gamma encode, inverse of [`srgb_to_linear`].
fn linear_to_srgb(l: f32) -> f32 {
    if l <= 0.003_130_8 {
        l * 12.92
    } else {
        1.055 * l.powf(1.0 / 2.4) - 0.055
    }
}

/// Rec. 709 luma coefficients, applied in linear light.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Built-in matrix-profile engine.
///
/// Handles gamma decode/encode and RGB ↔ gray channel conversion. Matrix
/// profiles carry no gamut, so every rendering intent is accepted and
/// collapses to the same conversion.
pub struct BuiltinEngine;

impl BuiltinEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BuiltinEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorEngine for BuiltinEngine {
    fn supports_intent(&self, _intent: RenderingIntent) -> bool {
        true
    }

    fn transform(
        &self,
        image: Image,
        from: &ColorProfile,
        to: &ColorProfile,
        intent: RenderingIntent,
    ) -> Result<Image, ColorError> {
        if !self.supports_intent(intent) {
            return Err(ColorError::UnsupportedIntent(intent));
        }
        let format = image.format();
        if format.depth != SampleDepth::F32 {
            return Err(ColorError::Library(format!(
                "builtin engine transforms f32 working images, got {:?}",
                format.depth
            )));
        }
        if format.color_channels() != from.channels() {
            return Err(ColorError::ProfileIncompatible { from: from.clone(), to: to.clone() });
        }

        if from == to {
            let mut out = image;
            out.set_profile(Some(to.clone()));
            return Ok(out);
        }

        let alpha = format.alpha;
        let in_color = from.channels() as usize;
        let out_color = to.channels() as usize;
        let in_ch = format.channels as usize;
        let out_ch = out_color + alpha as usize;

        let width = image.width();
        let height = image.height();
        let src = image.as_f32().expect("depth checked above");
        let pixels = width as usize * height as usize;
        let mut dst = vec![0.0f32; pixels * out_ch];

        for p in 0..pixels {
            let inp = &src[p * in_ch..p * in_ch + in_ch];
            let out = &mut dst[p * out_ch..(p + 1) * out_ch];

            // Decode to linear light.
            let mut lin = [0.0f32; 3];
            for (c, l) in lin.iter_mut().enumerate().take(in_color) {
                let s = inp[c];
                *l = if from.is_linear() { s } else { srgb_to_linear(s) };
            }

            // Channel conversion in linear light.
            let mut conv = [0.0f32; 3];
            match (in_color, out_color) {
                (3, 3) | (1, 1) => conv[..in_color].copy_from_slice(&lin[..in_color]),
                (3, 1) => conv[0] = LUMA[0] * lin[0] + LUMA[1] * lin[1] + LUMA[2] * lin[2],
                (1, 3) => {
                    conv[0] = lin[0];
                    conv[1] = lin[0];
                    conv[2] = lin[0];
                }
                _ => {
                    return Err(ColorError::ProfileIncompatible {
                        from: from.clone(),
                        to: to.clone(),
                    })
                }
            }

            // Encode to the destination's tone curve.
            for (c, o) in out.iter_mut().enumerate().take(out_color) {
                let l = conv[c];
                *o = if to.is_linear() { l } else { linear_to_srgb(l) };
            }
            if alpha {
                out[out_ch - 1] = inp[in_ch - 1];
            }
        }

        let out_format = PixelFormat::new(out_ch as u8, SampleDepth::F32, alpha);
        let mut out = Image::from_samples(width, height, out_format, Samples::F32(dst))
            .map_err(|e| ColorError::Library(e.to_string()))?;
        out.adopt_metadata(&image);
        out.set_profile(Some(to.clone()));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_image(width: u32, height: u32, format: PixelFormat, data: Vec<f32>) -> Image {
        Image::from_samples(width, height, format, Samples::F32(data)).unwrap()
    }

    #[test]
    fn srgb_gamma_round_trip() {
        for i in 0..=100 {
            let s = i as f32 / 100.0;
            let back = linear_to_srgb(srgb_to_linear(s));
            assert!((back - s).abs() < 1e-5, "s={s} back={back}");
        }
    }

    #[test]
    fn identity_transform_keeps_samples() {
        let img = f32_image(1, 1, PixelFormat::rgb(SampleDepth::F32), vec![0.2, 0.4, 0.6]);
        let out = BuiltinEngine
            .transform(img, &ColorProfile::Srgb, &ColorProfile::Srgb, RenderingIntent::Perceptual)
            .unwrap();
        assert_eq!(out.as_f32().unwrap(), &[0.2, 0.4, 0.6]);
        assert_eq!(out.profile(), Some(&ColorProfile::Srgb));
    }

    #[test]
    fn rgb_to_gray_uses_linear_luma() {
        // Pure green: luma must be the Rec. 709 green weight, not 1/3.
        let img = f32_image(1, 1, PixelFormat::rgb(SampleDepth::F32), vec![0.0, 1.0, 0.0]);
        let out = BuiltinEngine
            .transform(
                img,
                &ColorProfile::LinearRgb,
                &ColorProfile::LinearGray,
                RenderingIntent::RelativeColorimetric,
            )
            .unwrap();
        let g = out.as_f32().unwrap()[0];
        assert!((g - 0.7152).abs() < 1e-6);
        assert_eq!(out.format().channels, 1);
    }

    #[test]
    fn gray_to_rgb_replicates() {
        let img = f32_image(1, 1, PixelFormat::gray(SampleDepth::F32), vec![0.5]);
        let out = BuiltinEngine
            .transform(img, &ColorProfile::Gray, &ColorProfile::Srgb, RenderingIntent::Perceptual)
            .unwrap();
        let s = out.as_f32().unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s[0], s[1]);
        assert_eq!(s[1], s[2]);
    }

    #[test]
    fn alpha_passes_through_unmanaged() {
        let img = f32_image(1, 1, PixelFormat::rgba(SampleDepth::F32), vec![0.1, 0.2, 0.3, 0.7]);
        let out = BuiltinEngine
            .transform(img, &ColorProfile::Srgb, &ColorProfile::Gray, RenderingIntent::Perceptual)
            .unwrap();
        let s = out.as_f32().unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s[1], 0.7);
        assert!(out.format().alpha);
    }

    #[test]
    fn channel_mismatch_is_incompatible() {
        let img = f32_image(1, 1, PixelFormat::gray(SampleDepth::F32), vec![0.5]);
        let err = BuiltinEngine
            .transform(img, &ColorProfile::Srgb, &ColorProfile::Gray, RenderingIntent::Perceptual)
            .unwrap_err();
        assert!(matches!(err, ColorError::ProfileIncompatible { .. }));
    }

    #[test]
    fn profile_names_parse() {
        assert_eq!("sRGB".parse::<ColorProfile>().unwrap(), ColorProfile::Srgb);
        assert_eq!("linear".parse::<ColorProfile>().unwrap(), ColorProfile::LinearRgb);
        assert!("prophoto".parse::<ColorProfile>().is_err());
    }
}
