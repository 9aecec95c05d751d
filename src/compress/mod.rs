//! Compression driver: options, debug bypass, codec plan execution.
//!
//! | Piece | Role |
//! |---|---|
//! | [`CompressionOptions`] | default-filled WebP settings |
//! | [`CodecPlan`] | fixed three-stage plan: WebP, lossless JPEG, PNG quantize |
//! | [`Compressor`] | blocking backend that runs a plan ([`RustCompressor`] in production) |
//! | [`compress`] | async entry point, runs the backend on a blocking worker |
//!
//! The module is split into:
//! - **Parameters**: option types, presets, range checks
//! - **Backend**: [`Compressor`] trait, plan types, mock for tests
//! - **Rust backend**: libwebp / libimagequant implementation
//! - **JPEG markers**: lossless metadata stripping

pub mod backend;
mod jpeg_markers;
mod params;
pub mod rust_backend;

pub use backend::{CodecPlan, CodecStage, CompressError, Compressor};
pub use params::{
    CompressionOptions, Filter, FilterStrategy, PNG_QUALITY_RANGE, Preset, PresetTuning,
};
pub use rust_backend::RustCompressor;

use crate::options::LoaderOptions;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Whether this asset skips compression entirely. Checked before the
/// encoder options are resolved, so nothing about them is validated.
pub fn should_bypass(host_debug: bool, options: &LoaderOptions) -> bool {
    host_debug && options.bypass_on_debug.unwrap_or(false)
}

/// Run the standard codec plan over `content`.
///
/// This is the only point where a loader task suspends. A panic inside the
/// backend comes back as [`CompressError::Panicked`].
pub async fn compress<C: Compressor>(
    compressor: Arc<C>,
    content: Arc<[u8]>,
    options: &CompressionOptions,
) -> Result<Vec<u8>, CompressError> {
    let plan = CodecPlan::standard(options);
    debug!(stages = ?plan.stage_names(), bytes = content.len(), "compressing");

    let handle = tokio::task::spawn_blocking(move || compressor.compress(&content, &plan));
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(CompressError::Panicked(panic_message(e.into_panic()))),
        Err(_) => Err(CompressError::Cancelled),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
