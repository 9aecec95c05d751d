//! Parameter types for the codec stages.
//!
//! These structs describe *what* the encoders should do, not *how*. They are
//! the interface between option handling (which fills in defaults and checks
//! ranges) and the [`Compressor`](super::Compressor) backend (which does the
//! byte work), so a mock backend can assert on exactly what it was asked to
//! do.
//!
//! ## Types
//!
//! - [`CompressionOptions`]: WebP encoder settings, every field defaulted.
//! - [`Preset`]: content-type tuning applied before explicit settings.
//! - [`Filter`]: deblocking filter override: a strength or a named strategy.
//! - [`PresetTuning`]: the concrete encoder values a preset stands for.

use crate::options::{LoaderOptions, OptionsError};
use serde::{Deserialize, Serialize};

/// Content-type hint for the WebP encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Default,
    Photo,
    Picture,
    Drawing,
    Icon,
    Text,
}

/// Encoder values a preset sets before explicit options are applied.
///
/// `None` leaves the encoder's own default in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetTuning {
    pub sns_strength: u32,
    pub filter_strength: u32,
    pub filter_sharpness: Option<u32>,
    pub segments: Option<u32>,
    /// Segment-smoothing preprocessing on (`Some(true)`) or off.
    pub smooth_preprocessing: Option<bool>,
}

impl Preset {
    /// Tuning for this preset, `None` for [`Preset::Default`].
    pub fn tuning(self) -> Option<PresetTuning> {
        let tuning = match self {
            Preset::Default => return None,
            Preset::Picture => PresetTuning {
                sns_strength: 80,
                filter_strength: 35,
                filter_sharpness: Some(4),
                segments: None,
                smooth_preprocessing: Some(false),
            },
            Preset::Photo => PresetTuning {
                sns_strength: 80,
                filter_strength: 30,
                filter_sharpness: Some(3),
                segments: None,
                smooth_preprocessing: Some(true),
            },
            Preset::Drawing => PresetTuning {
                sns_strength: 25,
                filter_strength: 10,
                filter_sharpness: Some(6),
                segments: None,
                smooth_preprocessing: None,
            },
            Preset::Icon => PresetTuning {
                sns_strength: 0,
                filter_strength: 0,
                filter_sharpness: None,
                segments: None,
                smooth_preprocessing: Some(false),
            },
            Preset::Text => PresetTuning {
                sns_strength: 0,
                filter_strength: 0,
                filter_sharpness: None,
                segments: Some(2),
                smooth_preprocessing: Some(false),
            },
        };
        Some(tuning)
    }
}

/// Named deblocking filter strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterStrategy {
    Simple,
    Strong,
}

/// The `filter` option: a deblocking strength (0–100) or a named strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Strength(u8),
    Named(FilterStrategy),
}

/// WebP encoder settings with every field resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionOptions {
    pub preset: Preset,
    /// Lossy quality 0–100.
    pub quality: u32,
    /// Alpha plane quality 0–100.
    pub alpha_quality: u32,
    /// Speed/size trade-off, 0 (fast) to 6 (slow, smaller).
    pub method: u32,
    /// Spatial noise shaping amplitude 0–100.
    pub sns: u32,
    pub auto_filter: bool,
    /// Filter sharpness 0 (sharpest) to 7.
    pub sharpness: u32,
    pub lossless: bool,
    /// Target output size in bytes.
    pub size: Option<u64>,
    pub filter: Option<Filter>,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            preset: Preset::Default,
            quality: 80,
            alpha_quality: 100,
            method: 1,
            sns: 80,
            auto_filter: false,
            sharpness: 0,
            lossless: false,
            size: None,
            filter: None,
        }
    }
}

impl CompressionOptions {
    /// Fill defaults for every field the loader options leave unset, then
    /// check ranges.
    ///
    /// Only absent fields take the default: an explicit `0` or `false` is kept.
    pub fn resolve(options: &LoaderOptions) -> Result<Self, OptionsError> {
        let d = Self::default();
        Self {
            preset: options.preset.unwrap_or(d.preset),
            quality: options.quality.unwrap_or(d.quality),
            alpha_quality: options.alpha_quality.unwrap_or(d.alpha_quality),
            method: options.method.unwrap_or(d.method),
            sns: options.sns.unwrap_or(d.sns),
            auto_filter: options.auto_filter.unwrap_or(d.auto_filter),
            sharpness: options.sharpness.unwrap_or(d.sharpness),
            lossless: options.lossless.unwrap_or(d.lossless),
            size: options.size,
            filter: options.filter,
        }
        .validate()
    }

    /// Check value ranges.
    pub fn validate(self) -> Result<Self, OptionsError> {
        check_range("quality", self.quality, 100)?;
        check_range("alphaQuality", self.alpha_quality, 100)?;
        check_range("method", self.method, 6)?;
        check_range("sns", self.sns, 100)?;
        check_range("sharpness", self.sharpness, 7)?;
        if let Some(Filter::Strength(strength)) = self.filter {
            check_range("filter", u32::from(strength), 100)?;
        }
        if self.size == Some(0) {
            return Err(OptionsError::Invalid {
                key: "size",
                message: "target size must be greater than 0".into(),
            });
        }
        Ok(self)
    }
}

fn check_range(key: &'static str, value: u32, max: u32) -> Result<(), OptionsError> {
    if value > max {
        return Err(OptionsError::Invalid {
            key,
            message: format!("{value} is outside 0-{max}"),
        });
    }
    Ok(())
}

/// Quality window (fractions of 1.0) for the palette quantization stage.
pub const PNG_QUALITY_RANGE: (f32, f32) = (0.6, 0.8);
