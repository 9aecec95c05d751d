//! Compressor trait and the codec plan it executes.
//!
//! A [`CodecPlan`] is an ordered list of [`CodecStage`]s. Each stage reads
//! the previous stage's output, and a stage that does not apply to the bytes
//! it receives hands them on unchanged. The standard plan is fixed:
//!
//! | # | Stage | Applies to |
//! |---|---|---|
//! | 1 | [`CodecStage::WebP`] | PNG, JPEG, TIFF, WebP |
//! | 2 | [`CodecStage::JpegLossless`] | JPEG |
//! | 3 | [`CodecStage::PngQuantize`] | PNG |
//!
//! The production implementation is
//! [`RustCompressor`](super::rust_backend::RustCompressor).

use super::params::{CompressionOptions, PNG_QUALITY_RANGE};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("{stage} stage failed: {message}")]
    Stage {
        stage: &'static str,
        message: String,
    },
    #[error("Codec panicked: {0}")]
    Panicked(String),
    #[error("Compression task was cancelled")]
    Cancelled,
}

/// One step of a codec plan.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecStage {
    /// Lossy or lossless WebP encode.
    WebP(CompressionOptions),
    /// Lossless JPEG optimization: metadata segments dropped, scan data untouched.
    JpegLossless,
    /// Palette quantization within a quality window (fractions of 1.0).
    /// Input that cannot reach the minimum passes through.
    PngQuantize { min_quality: f32, max_quality: f32 },
}

impl CodecStage {
    pub fn name(&self) -> &'static str {
        match self {
            CodecStage::WebP(_) => "webp",
            CodecStage::JpegLossless => "jpeg-lossless",
            CodecStage::PngQuantize { .. } => "png-quantize",
        }
    }
}

/// Ordered codec stages applied to one buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecPlan {
    pub stages: Vec<CodecStage>,
}

impl CodecPlan {
    /// WebP, then lossless JPEG, then PNG quantization at 0.6–0.8.
    pub fn standard(options: &CompressionOptions) -> Self {
        let (min_quality, max_quality) = PNG_QUALITY_RANGE;
        Self {
            stages: vec![
                CodecStage::WebP(options.clone()),
                CodecStage::JpegLossless,
                CodecStage::PngQuantize {
                    min_quality,
                    max_quality,
                },
            ],
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(CodecStage::name).collect()
    }
}

/// Runs a codec plan over an in-memory buffer.
///
/// Implementations are blocking; the async driver in
/// [`compress`](super::compress) moves them onto a worker thread.
pub trait Compressor: Send + Sync + 'static {
    fn compress(&self, content: &[u8], plan: &CodecPlan) -> Result<Vec<u8>, CompressError>;
}
