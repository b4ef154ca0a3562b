//! Render orchestration: one source image through one destination.
//!
//! Stage order per render: crop solve → resample → sharpen (when
//! configured) → color transform (when a profile is configured) → dither to
//! the output depth. Every stage consumes and produces a fully-formed
//! [`Image`] or fails atomically; nothing partial is ever observable.
//!
//! Destinations are independent of each other: [`render_all`] fans a batch
//! out across the rayon pool, with the source image and configuration
//! shared read-only. One destination failing never aborts its siblings.

use crate::codecs;
use crate::color::{ColorEngine, ColorProfile, RenderingIntent};
use crate::crop::{CropSolver, TargetSpec};
use crate::destination::{Destination, Destinations};
use crate::dither::{DitherTarget, Ditherer};
use crate::error::{RenderError, Stage};
use crate::image::Image;
use crate::resample::Resampler;
use crate::sharpen::GaussianSharpen;
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Render `source` through `dest`, producing the finished output image at
/// the destination's storage depth.
pub fn render(
    source: &Image,
    name: &str,
    dest: &Destination,
    engine: &dyn ColorEngine,
) -> Result<Image, RenderError> {
    render_with_spec(source, name, dest, &dest.target_spec(), engine)
}

/// Render the destination's thumbnail companion, if it asks for one.
pub fn render_thumbnail(
    source: &Image,
    name: &str,
    dest: &Destination,
    engine: &dyn ColorEngine,
) -> Option<Result<Image, RenderError>> {
    let spec = dest.thumbnail_spec()?;
    Some(render_with_spec(source, name, dest, &spec, engine))
}

fn render_with_spec(
    source: &Image,
    name: &str,
    dest: &Destination,
    spec: &TargetSpec,
    engine: &dyn ColorEngine,
) -> Result<Image, RenderError> {
    let frame = CropSolver::solve(source.width(), source.height(), spec)
        .map_err(|e| RenderError::new(name, Stage::CropSolve, e))?;
    debug!(
        destination = name,
        crop_w = frame.crop_w(),
        crop_h = frame.crop_h(),
        out_w = frame.width(),
        out_h = frame.height(),
        "frame solved"
    );

    let working = source.to_f32();
    let resized = Resampler::resample(&working, &frame, &dest.resolved_resize())
        .map_err(|e| RenderError::new(name, Stage::Resample, e))?;

    let sharpened = match dest.resolved_sharpen() {
        Some(params) => GaussianSharpen::new(&params)
            .apply(&resized)
            .map_err(|e| RenderError::new(name, Stage::Sharpen, e))?,
        None => resized,
    };

    let colored = match dest.profile.get() {
        Some(to) => {
            let from = sharpened.profile().cloned().unwrap_or_else(|| {
                if sharpened.format().color_channels() >= 3 {
                    ColorProfile::Srgb
                } else {
                    ColorProfile::Gray
                }
            });
            let intent = dest.intent.resolve(RenderingIntent::default());
            engine
                .transform(sharpened, &from, to, intent)
                .map_err(|e| RenderError::new(name, Stage::ColorTransform, e))?
        }
        None => sharpened,
    };

    let out = Ditherer::default()
        .dither(&colored, DitherTarget::Depth(dest.output_depth()))
        .map_err(|e| RenderError::new(name, Stage::Dither, e))?;
    info!(
        destination = name,
        width = out.width(),
        height = out.height(),
        depth = out.format().depth.bits(),
        "rendered"
    );
    Ok(out)
}

/// Render `source` through `dest` and encode the result to `path`.
pub fn render_to_path(
    source: &Image,
    name: &str,
    dest: &Destination,
    engine: &dyn ColorEngine,
    path: &Path,
) -> Result<(), RenderError> {
    let out = render(source, name, dest, engine)?;
    codecs::encode(&out, dest, path).map_err(|e| RenderError::new(name, Stage::Encode, e))
}

/// Render every destination of a batch against one source, in parallel.
///
/// Results come back per destination; failures are carried alongside
/// successes rather than short-circuiting the batch.
pub fn render_all(
    source: &Image,
    dests: &Destinations,
    engine: &dyn ColorEngine,
) -> Vec<(String, Result<Image, RenderError>)> {
    let list: Vec<(&str, &Destination)> = dests.iter().collect();
    list.par_iter()
        .map(|(name, dest)| (name.to_string(), render(source, name, dest, engine)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::BuiltinEngine;
    use crate::destination::Destinations;
    use crate::image::{PixelFormat, SampleDepth, Samples};

    fn source_image() -> Image {
        // 64x32 RGB8 horizontal gradient.
        let data: Vec<u8> = (0..32u32)
            .flat_map(|_| {
                (0..64u32).flat_map(|x| {
                    let v = (x * 4) as u8;
                    [v, v / 2, 255 - v]
                })
            })
            .collect();
        let mut img =
            Image::from_samples(64, 32, PixelFormat::rgb(SampleDepth::U8), Samples::U8(data))
                .unwrap();
        img.set_profile(Some(ColorProfile::Srgb));
        img.tags_mut().insert("Iptc.Application2.ObjectName".into(), "gradient".into());
        img
    }

    fn dests(toml: &str) -> Destinations {
        Destinations::from_toml_str(toml).unwrap()
    }

    #[test]
    fn render_produces_target_dimensions_and_depth() {
        let d = dests(
            r#"
[web]
profile = "srgb"
[web.size]
width = 32
height = 16
"#,
        );
        let out = render(&source_image(), "web", d.get("web").unwrap(), &BuiltinEngine).unwrap();
        assert_eq!((out.width(), out.height()), (32, 16));
        assert_eq!(out.format().depth, SampleDepth::U8);
        // Metadata rides along the whole way.
        assert_eq!(
            out.tags().get("Iptc.Application2.ObjectName").map(String::as_str),
            Some("gradient")
        );
    }

    #[test]
    fn render_is_deterministic() {
        let d = dests(
            r#"
[web]
[web.size]
longest_edge = 40
[web.sharpen]
amount = 0.5
"#,
        );
        let src = source_image();
        let dest = d.get("web").unwrap();
        let a = render(&src, "web", dest, &BuiltinEngine).unwrap();
        let b = render(&src, "web", dest, &BuiltinEngine).unwrap();
        assert_eq!(a.as_u8().unwrap(), b.as_u8().unwrap());
    }

    #[test]
    fn gray_destination_collapses_channels() {
        let d = dests(
            r#"
[mono]
profile = "gray"
[mono.size]
width = 16
"#,
        );
        let out = render(&source_image(), "mono", d.get("mono").unwrap(), &BuiltinEngine).unwrap();
        assert_eq!(out.format().channels, 1);
        assert_eq!(out.profile(), Some(&ColorProfile::Gray));
    }

    #[test]
    fn sixteen_bit_destination_keeps_depth() {
        let d = dests(
            r#"
[deep]
depth = 16
[deep.size]
width = 16
"#,
        );
        let out = render(&source_image(), "deep", d.get("deep").unwrap(), &BuiltinEngine).unwrap();
        assert_eq!(out.format().depth, SampleDepth::U16);
    }

    #[test]
    fn failed_render_names_its_stage() {
        // No target box anywhere: the crop solver must refuse.
        let d = dests("[empty]\n");
        let err =
            render(&source_image(), "empty", d.get("empty").unwrap(), &BuiltinEngine).unwrap_err();
        assert_eq!(err.stage, Stage::CropSolve);
        assert_eq!(err.destination, "empty");
    }

    #[test]
    fn batch_carries_failures_alongside_successes() {
        let d = dests(
            r#"
[good]
[good.size]
width = 20

[bad]
"#,
        );
        let results = render_all(&source_image(), &d, &BuiltinEngine);
        assert_eq!(results.len(), 2);
        let good = results.iter().find(|(n, _)| n == "good").unwrap();
        let bad = results.iter().find(|(n, _)| n == "bad").unwrap();
        assert!(good.1.is_ok());
        assert!(bad.1.is_err());
    }

    #[test]
    fn thumbnail_render_follows_its_role() {
        let d = dests(
            r#"
[web]
[web.size]
width = 48
[web.thumbnail]
enabled = true
longest_edge = 10
aspect = 1.0
"#,
        );
        let dest = d.get("web").unwrap();
        let thumb =
            render_thumbnail(&source_image(), "web", dest, &BuiltinEngine).unwrap().unwrap();
        assert_eq!((thumb.width(), thumb.height()), (10, 10));

        let none = dests("[web]\n[web.size]\nwidth = 48\n");
        assert!(render_thumbnail(
            &source_image(),
            "web",
            none.get("web").unwrap(),
            &BuiltinEngine
        )
        .is_none());
    }

    #[test]
    fn render_to_path_encodes_the_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("web.png");
        let d = dests(
            r#"
[web]
format = "png"
[web.size]
width = 24
"#,
        );
        render_to_path(&source_image(), "web", d.get("web").unwrap(), &BuiltinEngine, &path)
            .unwrap();
        let back = crate::codecs::decode(&path).unwrap();
        assert_eq!(back.width(), 24);
    }
}
