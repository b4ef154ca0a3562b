//! Destination configuration: named output variants loaded from
//! `destinations.toml`.
//!
//! Each top-level table names one destination. Every field is optional; a
//! destination may inherit another by name, in which case its unset fields
//! fall back to the base, layer by layer, up the chain. Hard defaults are
//! applied only at the point of use, never stored back.
//!
//! ```toml
//! [web]
//! format = "jpeg"
//! profile = "srgb"
//! depth = 8
//!
//! [web.size]
//! longest_edge = 1600
//!
//! [web.sharpen]
//! amount = 0.5
//!
//! [web.jpeg]
//! quality = 90
//!
//! # Same treatment at thumbnail size, square-cropped.
//! [thumb]
//! inherits = "web"
//!
//! [thumb.size]
//! longest_edge = 240
//!
//! [thumb.crop]
//! aspect = 1.0
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::color::{ColorProfile, RenderingIntent};
use crate::crop::{CropBox, CropMode, TargetSpec};
use crate::definable::Definable;
use crate::image::SampleDepth;
use crate::resample::kernels::KernelFamily;
use crate::resample::ResolvedResize;
use crate::sharpen::ResolvedSharpen;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DestinationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unknown destination \"{0}\"")]
    Unknown(String),
    #[error("destination \"{name}\" inherits unknown base \"{base}\"")]
    UnknownBase { name: String, base: String },
    #[error("destination inheritance cycle through \"{0}\"")]
    InheritanceCycle(String),
    #[error("destination validation error: {0}")]
    Validation(String),
}

/// Output container a destination encodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Tiff,
    Webp,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Webp => "webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Target box role: the output dimensions a destination asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetBoxRole {
    pub width: Definable<f64>,
    pub height: Definable<f64>,
    pub longest_edge: Definable<f64>,
}

impl TargetBoxRole {
    fn inherit(&self, base: &Self) -> Self {
        Self {
            width: self.width.or(base.width),
            height: self.height.or(base.height),
            longest_edge: self.longest_edge.or(base.longest_edge),
        }
    }
}

/// Crop policy role: aspect constraint, waste tolerance, placement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropRole {
    /// Fixed crop aspect ratio (width / height).
    pub aspect: Definable<f64>,
    /// Fraction of kept-but-off-aspect source area an open crop may carry.
    pub max_waste: Definable<f64>,
    pub mode: Definable<CropMode>,
    /// Placement of the crop within the source as `[x, y]` fractions of
    /// the slack on each axis; `[0.5, 0.5]` centers.
    pub anchor: Definable<[f64; 2]>,
    /// Verbatim crop rectangle, bypassing the solver's optimization.
    #[serde(rename = "box")]
    pub fixed: Definable<CropBox>,
}

impl CropRole {
    fn inherit(&self, base: &Self) -> Self {
        Self {
            aspect: self.aspect.or(base.aspect),
            max_waste: self.max_waste.or(base.max_waste),
            mode: self.mode.or(base.mode),
            anchor: self.anchor.or(base.anchor),
            fixed: self.fixed.or(base.fixed),
        }
    }
}

/// Resize role: kernel family and support radius.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeRole {
    pub filter: Definable<KernelFamily>,
    pub support: Definable<f64>,
}

impl ResizeRole {
    fn inherit(&self, base: &Self) -> Self {
        Self {
            filter: self.filter.or(base.filter),
            support: self.support.or(base.support),
        }
    }
}

/// Sharpen role: unsharp-mask parameters. Sharpening runs only when
/// `amount` is defined somewhere in the inheritance chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SharpenRole {
    pub radius: Definable<u32>,
    pub sigma: Definable<f64>,
    pub amount: Definable<f64>,
    pub threshold: Definable<f64>,
}

impl SharpenRole {
    fn inherit(&self, base: &Self) -> Self {
        Self {
            radius: self.radius.or(base.radius),
            sigma: self.sigma.or(base.sigma),
            amount: self.amount.or(base.amount),
            threshold: self.threshold.or(base.threshold),
        }
    }
}

/// Thumbnail role: an optional square-ish companion render.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailRole {
    pub enabled: Definable<bool>,
    pub longest_edge: Definable<f64>,
    pub aspect: Definable<f64>,
}

impl ThumbnailRole {
    fn inherit(&self, base: &Self) -> Self {
        Self {
            enabled: self.enabled.or(base.enabled),
            longest_edge: self.longest_edge.or(base.longest_edge),
            aspect: self.aspect.or(base.aspect),
        }
    }
}

/// JPEG encoder hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JpegHints {
    /// Encoding quality, 0 (worst) to 100 (best).
    pub quality: Definable<u32>,
}

impl JpegHints {
    fn inherit(&self, base: &Self) -> Self {
        Self { quality: self.quality.or(base.quality) }
    }

    pub fn resolved_quality(&self) -> u8 {
        self.quality.resolve(90) as u8
    }
}

/// PNG encoder hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PngHints {
    /// Compression effort, 0 (fastest) to 9 (smallest).
    pub compression: Definable<u32>,
}

impl PngHints {
    fn inherit(&self, base: &Self) -> Self {
        Self { compression: self.compression.or(base.compression) }
    }
}

/// One named output variant.
///
/// Stored sparse: unset fields stay unset through loading and inheritance
/// resolution; consumers apply hard defaults when they build their resolved
/// parameter structs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Destination {
    /// Name of the base destination this one layers over.
    pub inherits: Option<String>,
    pub format: Definable<OutputFormat>,
    /// Output color profile; the source's profile is kept when unset.
    pub profile: Definable<ColorProfile>,
    pub intent: Definable<RenderingIntent>,
    /// Output bit depth, 8 or 16.
    pub depth: Definable<u8>,
    pub size: TargetBoxRole,
    pub crop: CropRole,
    pub resize: ResizeRole,
    pub sharpen: SharpenRole,
    pub thumbnail: ThumbnailRole,
    pub jpeg: JpegHints,
    pub png: PngHints,
}

impl Destination {
    /// Layer this destination over `base`: a field defined here wins, an
    /// unset field falls back to the base. Pure; neither input is mutated.
    #[must_use]
    pub fn inherit(&self, base: &Self) -> Self {
        Self {
            inherits: base.inherits.clone(),
            format: self.format.or(base.format),
            profile: self.profile.or_ref(&base.profile),
            intent: self.intent.or(base.intent),
            depth: self.depth.or(base.depth),
            size: self.size.inherit(&base.size),
            crop: self.crop.inherit(&base.crop),
            resize: self.resize.inherit(&base.resize),
            sharpen: self.sharpen.inherit(&base.sharpen),
            thumbnail: self.thumbnail.inherit(&base.thumbnail),
            jpeg: self.jpeg.inherit(&base.jpeg),
            png: self.png.inherit(&base.png),
        }
    }

    /// Check resolved values are within acceptable ranges.
    pub fn validate(&self, name: &str) -> Result<(), DestinationError> {
        if let Some(&bits) = self.depth.get() {
            if bits != 8 && bits != 16 {
                return Err(DestinationError::Validation(format!(
                    "{name}: depth must be 8 or 16, got {bits}"
                )));
            }
        }
        if let Some(&q) = self.jpeg.quality.get() {
            if q > 100 {
                return Err(DestinationError::Validation(format!(
                    "{name}: jpeg.quality must be 0-100, got {q}"
                )));
            }
        }
        if let Some(&c) = self.png.compression.get() {
            if c > 9 {
                return Err(DestinationError::Validation(format!(
                    "{name}: png.compression must be 0-9, got {c}"
                )));
            }
        }
        if let Some(&w) = self.crop.max_waste.get() {
            if !(0.0..=1.0).contains(&w) {
                return Err(DestinationError::Validation(format!(
                    "{name}: crop.max_waste must be within 0-1, got {w}"
                )));
            }
        }
        if let Some(&[ax, ay]) = self.crop.anchor.get() {
            if !(0.0..=1.0).contains(&ax) || !(0.0..=1.0).contains(&ay) {
                return Err(DestinationError::Validation(format!(
                    "{name}: crop.anchor components must be within 0-1, got [{ax}, {ay}]"
                )));
            }
        }
        if let Some(&s) = self.resize.support.get() {
            if s <= 0.0 {
                return Err(DestinationError::Validation(format!(
                    "{name}: resize.support must be positive, got {s}"
                )));
            }
        }
        if let Some(&a) = self.sharpen.amount.get() {
            if a < 0.0 {
                return Err(DestinationError::Validation(format!(
                    "{name}: sharpen.amount must not be negative, got {a}"
                )));
            }
        }
        Ok(())
    }

    /// The crop solver's input, with hard defaults applied.
    pub fn target_spec(&self) -> TargetSpec {
        let [ax, ay] = self.crop.anchor.resolve([0.5, 0.5]);
        TargetSpec {
            width: self.size.width.into_option(),
            height: self.size.height.into_option(),
            longest_edge: self.size.longest_edge.into_option(),
            aspect: self.crop.aspect.into_option(),
            crop_box: self.crop.fixed.into_option(),
            max_waste: self.crop.max_waste.into_option(),
            mode: self.crop.mode.resolve(CropMode::default()),
            anchor: (ax, ay),
        }
    }

    /// The thumbnail's crop-solver input, if this destination asks for one.
    pub fn thumbnail_spec(&self) -> Option<TargetSpec> {
        if !self.thumbnail.enabled.resolve(false) {
            return None;
        }
        Some(TargetSpec {
            longest_edge: Some(self.thumbnail.longest_edge.resolve(240.0)),
            aspect: self.thumbnail.aspect.into_option(),
            ..TargetSpec::default()
        })
    }

    pub fn resolved_resize(&self) -> ResolvedResize {
        let family = self.resize.filter.resolve(KernelFamily::default());
        ResolvedResize {
            family,
            support: self.resize.support.resolve(ResolvedResize::default().support),
        }
    }

    /// Sharpen parameters, present only when an amount is configured.
    pub fn resolved_sharpen(&self) -> Option<ResolvedSharpen> {
        let amount = *self.sharpen.amount.get()?;
        Some(ResolvedSharpen {
            radius: self.sharpen.radius.resolve(3),
            sigma: self.sharpen.sigma.resolve(0.0),
            amount,
            threshold: self.sharpen.threshold.resolve(0.0),
        })
    }

    /// Output storage depth; 8-bit unless configured otherwise.
    pub fn output_depth(&self) -> SampleDepth {
        match self.depth.resolve(8) {
            16 => SampleDepth::U16,
            _ => SampleDepth::U8,
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format.resolve(OutputFormat::default())
    }
}

/// The named destinations of one configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destinations {
    map: BTreeMap<String, Destination>,
}

impl Destinations {
    /// Parse from TOML text, resolve every inheritance chain, and validate
    /// the results. Chains are resolved eagerly so configuration mistakes
    /// surface at load time, not mid-batch.
    pub fn from_toml_str(text: &str) -> Result<Self, DestinationError> {
        let raw: Destinations = toml::from_str(text)?;
        let mut resolved = BTreeMap::new();
        for name in raw.map.keys() {
            let dest = raw.resolve_chain(name)?;
            dest.validate(name)?;
            resolved.insert(name.clone(), dest);
        }
        Ok(Self { map: resolved })
    }

    /// Load `destinations.toml`-style configuration from a file.
    pub fn load(path: &Path) -> Result<Self, DestinationError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn get(&self, name: &str) -> Result<&Destination, DestinationError> {
        self.map.get(name).ok_or_else(|| DestinationError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Destination)> {
        self.map.iter().map(|(name, dest)| (name.as_str(), dest))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Walk the inheritance chain of `name`, layering each destination over
    /// its base, with cycle detection.
    fn resolve_chain(&self, name: &str) -> Result<Destination, DestinationError> {
        let mut dest = self
            .map
            .get(name)
            .ok_or_else(|| DestinationError::Unknown(name.to_string()))?
            .clone();
        let mut visited = vec![name.to_string()];

        while let Some(base_name) = dest.inherits.take() {
            if visited.contains(&base_name) {
                return Err(DestinationError::InheritanceCycle(base_name));
            }
            let base = self.map.get(&base_name).ok_or_else(|| DestinationError::UnknownBase {
                name: visited.last().cloned().unwrap_or_default(),
                base: base_name.clone(),
            })?;
            dest = dest.inherit(base);
            visited.push(base_name);
        }
        Ok(dest)
    }
}

/// Returns a fully-commented stock `destinations.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_destinations_toml() -> &'static str {
    r##"# Gravure destinations
# ====================
# Each top-level table names one output variant. All fields are optional;
# a destination may inherit another with `inherits = "name"`, overriding
# only the fields it sets. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Full-size web render
# ---------------------------------------------------------------------------
[web]
format = "jpeg"
profile = "srgb"
depth = 8

[web.size]
# Longest edge in pixels; the other edge follows the crop aspect.
longest_edge = 1600

[web.resize]
# Kernel family and support radius (lobes).
filter = "lanczos"
support = 3.0

[web.sharpen]
# Unsharp mask runs only when an amount is set.
amount = 0.5
radius = 3
threshold = 0.004

[web.jpeg]
quality = 90

# ---------------------------------------------------------------------------
# Square thumbnails, same treatment at small size
# ---------------------------------------------------------------------------
[thumb]
inherits = "web"

[thumb.size]
longest_edge = 240

[thumb.crop]
aspect = 1.0
# Allow the crop to keep a little off-aspect area instead of cutting hard.
mode = "open"
max_waste = 0.05

# ---------------------------------------------------------------------------
# 16-bit archival TIFF, uncropped, unsharpened
# ---------------------------------------------------------------------------
[archive]
format = "tiff"
depth = 16

[archive.size]
width = 3000
height = 2000
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_sparse_destination() {
        let dests = Destinations::from_toml_str(
            r#"
[web]
format = "jpeg"

[web.size]
longest_edge = 1600
"#,
        )
        .unwrap();
        let web = dests.get("web").unwrap();
        assert_eq!(web.format.get(), Some(&OutputFormat::Jpeg));
        assert_eq!(web.size.longest_edge.get(), Some(&1600.0));
        assert!(!web.size.width.is_defined());
        assert!(!web.sharpen.amount.is_defined());
    }

    #[test]
    fn inheritance_overrides_field_by_field() {
        let dests = Destinations::from_toml_str(
            r#"
[base]
format = "jpeg"
depth = 8

[base.size]
longest_edge = 1600

[base.jpeg]
quality = 90

[small]
inherits = "base"

[small.size]
longest_edge = 400
"#,
        )
        .unwrap();
        let small = dests.get("small").unwrap();
        // Overridden in the derived layer.
        assert_eq!(small.size.longest_edge.get(), Some(&400.0));
        // Inherited from the base.
        assert_eq!(small.format.get(), Some(&OutputFormat::Jpeg));
        assert_eq!(small.jpeg.quality.get(), Some(&90));
    }

    #[test]
    fn inheritance_chain_of_three() {
        let dests = Destinations::from_toml_str(
            r#"
[a]
depth = 16

[a.jpeg]
quality = 80

[b]
inherits = "a"
format = "png"

[c]
inherits = "b"
depth = 8
"#,
        )
        .unwrap();
        let c = dests.get("c").unwrap();
        assert_eq!(c.depth.get(), Some(&8));
        assert_eq!(c.format.get(), Some(&OutputFormat::Png));
        assert_eq!(c.jpeg.quality.get(), Some(&80));
    }

    #[test]
    fn inheritance_cycle_is_rejected() {
        let err = Destinations::from_toml_str(
            r#"
[a]
inherits = "b"

[b]
inherits = "a"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, DestinationError::InheritanceCycle(_)));
    }

    #[test]
    fn unknown_base_is_rejected() {
        let err = Destinations::from_toml_str(
            r#"
[a]
inherits = "nope"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, DestinationError::UnknownBase { .. }));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Destinations::from_toml_str(
            r#"
[web]
formt = "jpeg"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, DestinationError::Toml(_)));
    }

    #[test]
    fn bad_depth_is_rejected() {
        let err = Destinations::from_toml_str("[a]\ndepth = 12\n").unwrap_err();
        assert!(matches!(err, DestinationError::Validation(_)));
    }

    #[test]
    fn bad_waste_fraction_is_rejected() {
        let err = Destinations::from_toml_str(
            r#"
[a]
[a.crop]
max_waste = 1.5
"#,
        )
        .unwrap_err();
        assert!(matches!(err, DestinationError::Validation(_)));
    }

    #[test]
    fn validation_sees_inherited_values() {
        // The bad quality lives in the base; the derived chain still fails.
        let err = Destinations::from_toml_str(
            r#"
[base]
[base.jpeg]
quality = 150

[derived]
inherits = "base"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, DestinationError::Validation(_)));
    }

    #[test]
    fn target_spec_maps_roles() {
        let dests = Destinations::from_toml_str(
            r#"
[d]
[d.size]
width = 800
[d.crop]
aspect = 1.5
mode = "open"
max_waste = 0.1
anchor = [0.0, 0.5]
"#,
        )
        .unwrap();
        let spec = dests.get("d").unwrap().target_spec();
        assert_eq!(spec.width, Some(800.0));
        assert_eq!(spec.height, None);
        assert_eq!(spec.aspect, Some(1.5));
        assert_eq!(spec.mode, CropMode::Open);
        assert_eq!(spec.max_waste, Some(0.1));
        assert_eq!(spec.anchor, (0.0, 0.5));
    }

    #[test]
    fn fixed_crop_box_parses() {
        let dests = Destinations::from_toml_str(
            r#"
[d]
[d.crop.box]
x = 10.0
y = 20.0
width = 100.0
height = 50.0
"#,
        )
        .unwrap();
        let spec = dests.get("d").unwrap().target_spec();
        assert_eq!(spec.crop_box, Some(CropBox { x: 10.0, y: 20.0, width: 100.0, height: 50.0 }));
    }

    #[test]
    fn resolved_sharpen_requires_amount() {
        let dests = Destinations::from_toml_str(
            r#"
[off]
[off.sharpen]
radius = 2

[on]
[on.sharpen]
amount = 1.5
"#,
        )
        .unwrap();
        assert_eq!(dests.get("off").unwrap().resolved_sharpen(), None);
        let on = dests.get("on").unwrap().resolved_sharpen().unwrap();
        assert_eq!(on.amount, 1.5);
        assert_eq!(on.radius, 3);
    }

    #[test]
    fn hard_defaults_apply_at_point_of_use() {
        let dests = Destinations::from_toml_str("[d]\n").unwrap();
        let d = dests.get("d").unwrap();
        assert_eq!(d.output_depth(), SampleDepth::U8);
        assert_eq!(d.output_format(), OutputFormat::Jpeg);
        assert_eq!(d.resolved_resize(), ResolvedResize::default());
        assert_eq!(d.jpeg.resolved_quality(), 90);
        // Stored configuration stays sparse.
        assert!(!d.depth.is_defined());
    }

    #[test]
    fn thumbnail_spec_when_enabled() {
        let dests = Destinations::from_toml_str(
            r#"
[d]
[d.thumbnail]
enabled = true
longest_edge = 120
aspect = 1.0
"#,
        )
        .unwrap();
        let spec = dests.get("d").unwrap().thumbnail_spec().unwrap();
        assert_eq!(spec.longest_edge, Some(120.0));
        assert_eq!(spec.aspect, Some(1.0));

        let none = Destinations::from_toml_str("[d]\n").unwrap();
        assert!(none.get("d").unwrap().thumbnail_spec().is_none());
    }

    #[test]
    fn load_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("destinations.toml");
        fs::write(&path, "[web]\nformat = \"webp\"\n").unwrap();
        let dests = Destinations::load(&path).unwrap();
        assert_eq!(dests.get("web").unwrap().output_format(), OutputFormat::Webp);
    }

    #[test]
    fn unknown_destination_name() {
        let dests = Destinations::from_toml_str("[web]\n").unwrap();
        assert!(matches!(dests.get("print"), Err(DestinationError::Unknown(_))));
    }

    #[test]
    fn stock_destinations_parse_and_resolve() {
        let dests = Destinations::from_toml_str(stock_destinations_toml()).unwrap();
        assert!(dests.len() >= 3);

        let thumb = dests.get("thumb").unwrap();
        // Inherited from [web].
        assert_eq!(thumb.jpeg.resolved_quality(), 90);
        assert!(thumb.resolved_sharpen().is_some());
        // Overridden locally.
        assert_eq!(thumb.size.longest_edge.get(), Some(&240.0));
        assert_eq!(thumb.crop.aspect.get(), Some(&1.0));

        let archive = dests.get("archive").unwrap();
        assert_eq!(archive.output_depth(), SampleDepth::U16);
        assert_eq!(archive.output_format(), OutputFormat::Tiff);
    }
}
