//! Render-level error rollup.
//!
//! Each pipeline stage has its own closed error type; a failed render wraps
//! the stage error together with the destination name and the stage it died
//! in, so a batch caller can report which output failed and why without
//! aborting its siblings.

use crate::codecs::CodecError;
use crate::color::ColorError;
use crate::crop::CropError;
use crate::dither::DitherError;
use crate::image::ImageError;
use crate::resample::ResampleError;
use crate::sharpen::SharpenError;
use std::fmt;
use thiserror::Error;

/// Pipeline stage a render failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    CropSolve,
    Resample,
    Sharpen,
    ColorTransform,
    Dither,
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decode => "decode",
            Stage::CropSolve => "crop solving",
            Stage::Resample => "resampling",
            Stage::Sharpen => "sharpening",
            Stage::ColorTransform => "color transform",
            Stage::Dither => "dithering",
            Stage::Encode => "encode",
        };
        f.write_str(name)
    }
}

/// Any single stage's failure.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Crop(#[from] CropError),

    #[error(transparent)]
    Resample(#[from] ResampleError),

    #[error(transparent)]
    Sharpen(#[from] SharpenError),

    #[error(transparent)]
    Color(#[from] ColorError),

    #[error(transparent)]
    Dither(#[from] DitherError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

/// A failed render of one destination.
#[derive(Error, Debug)]
#[error("rendering \"{destination}\" failed during {stage}: {source}")]
pub struct RenderError {
    pub destination: String,
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl RenderError {
    pub fn new(destination: &str, stage: Stage, source: impl Into<StageError>) -> Self {
        Self { destination: destination.to_string(), stage, source: source.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_destination_and_stage() {
        let err = RenderError::new("web", Stage::CropSolve, CropError::NoTarget);
        let msg = err.to_string();
        assert!(msg.contains("web"), "{msg}");
        assert!(msg.contains("crop solving"), "{msg}");
    }

    #[test]
    fn source_chain_is_preserved() {
        let err = RenderError::new("web", Stage::CropSolve, CropError::NoTarget);
        let source = std::error::Error::source(&err).expect("has a source");
        assert!(source.to_string().contains("no target"));
    }
}
