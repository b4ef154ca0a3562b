//! # Gravure
//!
//! A batch image-finishing engine: one source raster in, many differently
//! sized, differently profiled outputs out, deterministically. Destinations
//! are declared in TOML — target box, crop policy, resampling kernel,
//! sharpening, color profile, bit depth, format hints — and every render of
//! the same source through the same destination produces identical bytes.
//!
//! # Architecture: One Pipeline Per Destination
//!
//! ```text
//! decode → crop solve → resample → sharpen → color transform → dither → encode
//!          (geometry)   (Lanczos)  (unsharp)  (profile pair)    (8/16-bit)
//! ```
//!
//! The middle five stages work on a normalized `f32` raster and are pure
//! computation: no I/O, no shared mutable state. Destinations are
//! independent, so a batch fans out across the rayon pool with the source
//! image and configuration shared read-only.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`image`] | Owned raster: pixel storage, format, color profile, metadata tags |
//! | [`definable`] | "Value or unset" wrapper with layered merge, used by every destination field |
//! | [`destination`] | Named output variants, role inheritance, TOML loading |
//! | [`crop`] | Crop solver — target constraints to a [`frame::Frame`] |
//! | [`frame`] | Resolved geometry for one (source, destination) pair |
//! | [`resample`] | Variable-support Lanczos kernels and the two-pass resampler |
//! | [`sharpen`] | Gaussian unsharp mask |
//! | [`color`] | Color-management seam and the built-in matrix-profile engine |
//! | [`dither`] | Serpentine error-diffusion quantization |
//! | [`codecs`] | Decode/encode adapters (JPEG, PNG, TIFF, WebP) and IPTC tags |
//! | [`pipeline`] | Per-destination orchestration and the parallel batch driver |
//! | [`error`] | Render-level error rollup: destination name + failing stage |
//!
//! # Design Decisions
//!
//! ## Variable-Support Kernels
//!
//! Downsampling widens the kernel footprint by the reciprocal of the scale
//! so the same Lanczos filter doubles as an anti-aliasing pre-filter. All
//! weights are precomputed into flat tables before pixel work starts; the
//! hot path is a plain weighted sum with no dispatch.
//!
//! ## `f32` Working Depth
//!
//! Sources decode at their native 8- or 16-bit depth, are promoted to a
//! normalized `f32` raster for every transform, and are quantized exactly
//! once — at the dither stage, to the destination's depth. Convolution and
//! color math never round intermediate values.
//!
//! ## Sparse Configuration, Hard Defaults At Use
//!
//! Every destination field is a [`definable::Definable`]: set or unset.
//! Inheritance merges field by field (derived wins), and defaults apply
//! only when a consumer builds its resolved parameter struct. Stored
//! configuration is never mutated, so one `Destinations` load serves any
//! number of concurrent renders.

pub mod codecs;
pub mod color;
pub mod crop;
pub mod definable;
pub mod destination;
pub mod dither;
pub mod error;
pub mod frame;
pub mod image;
pub mod pipeline;
pub mod resample;
pub mod sharpen;
