//! Production compressor built on codec crates.
//!
//! ## Crate mapping
//!
//! | Stage | Crate / function |
//! |---|---|
//! | Format sniffing, decode | `image::guess_format`, `image::load_from_memory_with_format` |
//! | WebP encode | `webp::Encoder::encode_advanced` (libwebp, full `WebPConfig`) |
//! | Lossless JPEG | [`jpeg_markers::strip_metadata`](super::jpeg_markers::strip_metadata) |
//! | PNG quantization | `imagequant` (libimagequant) + `png` indexed encoder |

use super::backend::{CodecPlan, CodecStage, CompressError, Compressor};
use super::jpeg_markers;
use super::params::{CompressionOptions, Filter, FilterStrategy};
use image::{DynamicImage, ImageFormat};
use tracing::debug;

/// Formats the WebP stage knows how to read.
const WEBP_INPUTS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Preprocessing bit for segment smoothing in `WebPConfig::preprocessing`.
const SEGMENT_SMOOTH: i32 = 2;

/// Compressor backed by libwebp, libimagequant and a JPEG marker walker.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCompressor;

impl RustCompressor {
    pub fn new() -> Self {
        Self
    }
}

impl Compressor for RustCompressor {
    fn compress(&self, content: &[u8], plan: &CodecPlan) -> Result<Vec<u8>, CompressError> {
        let mut buffer = content.to_vec();
        for stage in &plan.stages {
            let before = buffer.len();
            buffer = match stage {
                CodecStage::WebP(options) => encode_webp(&buffer, options)?,
                CodecStage::JpegLossless => jpeg_markers::strip_metadata(buffer),
                CodecStage::PngQuantize {
                    min_quality,
                    max_quality,
                } => quantize_png(&buffer, *min_quality, *max_quality)?,
            };
            debug!(
                stage = stage.name(),
                before,
                after = buffer.len(),
                "codec stage finished"
            );
        }
        Ok(buffer)
    }
}

fn decode(content: &[u8], format: ImageFormat) -> Result<DynamicImage, CompressError> {
    image::load_from_memory_with_format(content, format)
        .map_err(|e| CompressError::Decode(format!("{format:?}: {e}")))
}

fn stage_error(stage: &'static str, message: impl Into<String>) -> CompressError {
    CompressError::Stage {
        stage,
        message: message.into(),
    }
}

/// Encode readable raster input to WebP. Other input passes through.
fn encode_webp(content: &[u8], options: &CompressionOptions) -> Result<Vec<u8>, CompressError> {
    let format = match image::guess_format(content) {
        Ok(format) if WEBP_INPUTS.contains(&format) => format,
        _ => return Ok(content.to_vec()),
    };
    let img = decode(content, format)?;
    let config = webp_config(options)?;
    let (width, height) = (img.width(), img.height());

    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(&rgba, width, height).encode_advanced(&config)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(&rgb, width, height).encode_advanced(&config)
    };
    let memory = encoded.map_err(|e| stage_error("webp", format!("{e:?}")))?;
    Ok(memory.to_vec())
}

/// Build the libwebp config: preset tuning first, explicit options on top.
fn webp_config(options: &CompressionOptions) -> Result<webp::WebPConfig, CompressError> {
    let mut config = webp::WebPConfig::new()
        .map_err(|()| stage_error("webp", "libwebp rejected the default config"))?;

    if let Some(tuning) = options.preset.tuning() {
        config.sns_strength = tuning.sns_strength as i32;
        config.filter_strength = tuning.filter_strength as i32;
        if let Some(sharpness) = tuning.filter_sharpness {
            config.filter_sharpness = sharpness as i32;
        }
        if let Some(segments) = tuning.segments {
            config.segments = segments as i32;
        }
        match tuning.smooth_preprocessing {
            Some(true) => config.preprocessing |= SEGMENT_SMOOTH,
            Some(false) => config.preprocessing &= !SEGMENT_SMOOTH,
            None => {}
        }
    }

    config.quality = options.quality as f32;
    config.alpha_quality = options.alpha_quality as i32;
    config.method = options.method as i32;
    config.sns_strength = options.sns as i32;
    config.autofilter = i32::from(options.auto_filter);
    config.filter_sharpness = options.sharpness as i32;
    config.lossless = i32::from(options.lossless);
    if let Some(size) = options.size {
        config.target_size = i32::try_from(size).unwrap_or(i32::MAX);
    }
    match options.filter {
        Some(Filter::Strength(strength)) => config.filter_strength = i32::from(strength),
        Some(Filter::Named(FilterStrategy::Simple)) => config.filter_type = 0,
        Some(Filter::Named(FilterStrategy::Strong)) => config.filter_type = 1,
        None => {}
    }
    Ok(config)
}

/// Quantize PNG input to an indexed palette within the quality window.
///
/// Input that cannot meet `min_quality` is returned unchanged, as is
/// anything that is not a PNG.
fn quantize_png(
    content: &[u8],
    min_quality: f32,
    max_quality: f32,
) -> Result<Vec<u8>, CompressError> {
    if !matches!(image::guess_format(content), Ok(ImageFormat::Png)) {
        return Ok(content.to_vec());
    }
    let rgba = decode(content, ImageFormat::Png)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixels: Vec<imagequant::RGBA> = rgba
        .pixels()
        .map(|p| imagequant::RGBA::new(p[0], p[1], p[2], p[3]))
        .collect();

    let quantize_err = |e: imagequant::Error| stage_error("png-quantize", e.to_string());
    let mut liq = imagequant::new();
    liq.set_speed(4).map_err(quantize_err)?;
    liq.set_quality(percent(min_quality), percent(max_quality))
        .map_err(quantize_err)?;

    let mut image = liq
        .new_image(pixels, width as usize, height as usize, 0.0)
        .map_err(quantize_err)?;
    let mut result = match liq.quantize(&mut image) {
        Ok(result) => result,
        Err(imagequant::Error::QualityTooLow) => {
            debug!(min_quality, "palette below minimum quality, keeping original");
            return Ok(content.to_vec());
        }
        Err(e) => return Err(quantize_err(e)),
    };
    result.set_dithering_level(1.0).map_err(quantize_err)?;
    let (palette, indices) = result.remapped(&mut image).map_err(quantize_err)?;

    encode_indexed_png(width, height, &palette, &indices)
}

fn percent(fraction: f32) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Write an 8-bit indexed PNG. A tRNS chunk is added only when the palette
/// has transparent entries.
fn encode_indexed_png(
    width: u32,
    height: u32,
    palette: &[imagequant::RGBA],
    indices: &[u8],
) -> Result<Vec<u8>, CompressError> {
    let png_err = |e: png::EncodingError| stage_error("png-quantize", e.to_string());
    let rgb: Vec<u8> = palette.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
    let alpha: Vec<u8> = palette.iter().map(|c| c.a).collect();

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Best);
        encoder.set_palette(rgb);
        if alpha.iter().any(|&a| a < 255) {
            encoder.set_trns(alpha);
        }
        let mut writer = encoder.write_header().map_err(png_err)?;
        writer.write_image_data(indices).map_err(png_err)?;
        writer.finish().map_err(png_err)?;
    }
    Ok(out)
}
