//! Shared test utilities for the asset-webp test suite.
//!
//! Provides an in-memory [`FileEmitter`] that records what the loader
//! registers, and generators for small encoded images so codec tests do not
//! depend on fixture files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let emitter = Arc::new(RecordingEmitter::default());
//! let ctx = LoaderContext::new(emitter.clone());
//! let asset = RawAsset::new(gradient_png(64, 64), "/img/hero.png");
//!
//! load(&ctx, &asset, compressor).await.unwrap();
//! assert_eq!(emitter.names().len(), 2);
//! ```

use crate::emit::{EmitError, FileEmitter};
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

// =========================================================================
// Recording emitter
// =========================================================================

/// Emitter that keeps every registered file in memory.
#[derive(Default)]
pub struct RecordingEmitter {
    files: Mutex<Vec<(String, Vec<u8>)>>,
    cacheable: AtomicBool,
    reject: Option<String>,
}

impl RecordingEmitter {
    /// An emitter that refuses the file named `name`.
    pub fn rejecting(name: &str) -> Self {
        Self {
            reject: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.files().into_iter().map(|(name, _)| name).collect()
    }

    pub fn was_marked_cacheable(&self) -> bool {
        self.cacheable.load(Ordering::SeqCst)
    }
}

impl FileEmitter for RecordingEmitter {
    fn emit_file(&self, name: &str, bytes: &[u8]) -> Result<(), EmitError> {
        if self.reject.as_deref() == Some(name) {
            return Err(EmitError::Rejected {
                name: name.to_string(),
                message: "rejected by test emitter".to_string(),
            });
        }
        self.files
            .lock()
            .unwrap()
            .push((name.to_string(), bytes.to_vec()));
        Ok(())
    }

    fn discard(&self, name: &str) {
        self.files.lock().unwrap().retain(|(emitted, _)| emitted != name);
    }

    fn mark_cacheable(&self) {
        self.cacheable.store(true, Ordering::SeqCst);
    }
}

// =========================================================================
// Image fixtures
// =========================================================================

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

/// Opaque RGB gradient encoded as PNG.
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
}

/// RGBA gradient with alpha falling off left to right, encoded as PNG.
pub fn gradient_rgba_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            64,
            255 - (x * 255 / width.max(1)) as u8,
        ])
    });
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

/// Four flat colour quadrants encoded as PNG. Quantizes without loss.
pub fn flat_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        match (x < width / 2, y < height / 2) {
            (true, true) => image::Rgba([255, 0, 0, 255]),
            (false, true) => image::Rgba([0, 255, 0, 255]),
            (true, false) => image::Rgba([0, 0, 255, 255]),
            (false, false) => image::Rgba([255, 255, 255, 255]),
        }
    });
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

/// Opaque RGB gradient encoded as baseline JPEG.
pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}
