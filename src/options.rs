//! Loader options as supplied by the host.
//!
//! Every field is optional: [`LoaderOptions`] records exactly what the host
//! (or the CLI config file) said, and the consumers apply defaults:
//! [`naming`](crate::naming) for `name`/`regExp`, [`policy`](crate::policy)
//! for `limit`/`mimetype`, and
//! [`CompressionOptions::resolve`](crate::compress::CompressionOptions::resolve)
//! for the encoder fields.
//!
//! ## Sources
//!
//! - Structured values (JSON, TOML tables) via serde, keys in camelCase.
//! - Loader query strings, parsed by [`LoaderOptions::parse_query`]:
//!
//! ```text
//! ?limit=8192&quality=75&lossless      bare key → true
//! ?-lossless&+autoFilter               -key → false, +key → true
//! ?name=[name].[hash:8].[ext]          values are percent-decoded
//! ?{"limit":8192,"preset":"photo"}     JSON object
//! ```
//!
//! Unrecognized keys are ignored. They are reported back to the caller so it
//! can log them, but never fail parsing.

use crate::compress::{Filter, Preset};
use crate::naming::DEFAULT_TEMPLATE;
use crate::policy::DEFAULT_LIMIT;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Malformed loader options: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid option `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Options recognized by the loader. `None` means "not given".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderOptions {
    /// Output name template, default `[hash].[ext]`.
    pub name: Option<String>,
    /// Pattern whose capture groups feed `[N]` tokens in `name`.
    pub reg_exp: Option<String>,
    /// Inline threshold in bytes, default 10240. Zero or negative always inlines.
    pub limit: Option<i64>,
    /// Explicit media type for data URIs.
    pub mimetype: Option<String>,
    /// Historical misspelling of `mimetype`, still honoured.
    pub minetype: Option<String>,
    pub preset: Option<Preset>,
    pub quality: Option<u32>,
    pub alpha_quality: Option<u32>,
    pub method: Option<u32>,
    pub sns: Option<u32>,
    pub auto_filter: Option<bool>,
    pub sharpness: Option<u32>,
    pub lossless: Option<bool>,
    pub bypass_on_debug: Option<bool>,
    /// Target size of the WebP output in bytes.
    pub size: Option<u64>,
    pub filter: Option<Filter>,
}

/// Keys whose query-string values stay strings even when they look numeric.
const STRING_KEYS: &[&str] = &["name", "regExp", "mimetype", "minetype", "preset"];

impl LoaderOptions {
    /// Inline threshold with the default applied.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Name template with the default applied.
    pub fn name_template(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_TEMPLATE)
    }

    /// Explicit media type, from `mimetype` or its misspelled alias.
    pub fn mime_override(&self) -> Option<&str> {
        self.mimetype
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(self.minetype.as_deref().filter(|m| !m.is_empty()))
    }

    /// Deserialize from a JSON value, returning the keys that were ignored.
    pub fn from_json_value(value: Value) -> Result<(Self, Vec<String>), OptionsError> {
        let mut ignored = Vec::new();
        let options = serde_ignored::deserialize(value, |path| ignored.push(path.to_string()))?;
        Ok((options, ignored))
    }

    /// Parse a loader query string (`?a=1&b` or `?{json}`).
    pub fn parse_query(query: &str) -> Result<(Self, Vec<String>), OptionsError> {
        let query = query.trim();
        let query = query.strip_prefix('?').unwrap_or(query);
        if query.is_empty() {
            return Ok((Self::default(), Vec::new()));
        }
        if query.starts_with('{') {
            let value: Value = serde_json::from_str(query)?;
            return Self::from_json_value(value);
        }
        Self::from_json_value(Value::Object(query_to_map(query)))
    }

    /// Layer `overlay` on top of `self`: fields set in `overlay` win.
    pub fn overlay(self, overlay: LoaderOptions) -> LoaderOptions {
        LoaderOptions {
            name: overlay.name.or(self.name),
            reg_exp: overlay.reg_exp.or(self.reg_exp),
            limit: overlay.limit.or(self.limit),
            mimetype: overlay.mimetype.or(self.mimetype),
            minetype: overlay.minetype.or(self.minetype),
            preset: overlay.preset.or(self.preset),
            quality: overlay.quality.or(self.quality),
            alpha_quality: overlay.alpha_quality.or(self.alpha_quality),
            method: overlay.method.or(self.method),
            sns: overlay.sns.or(self.sns),
            auto_filter: overlay.auto_filter.or(self.auto_filter),
            sharpness: overlay.sharpness.or(self.sharpness),
            lossless: overlay.lossless.or(self.lossless),
            bypass_on_debug: overlay.bypass_on_debug.or(self.bypass_on_debug),
            size: overlay.size.or(self.size),
            filter: overlay.filter.or(self.filter),
        }
    }
}

/// Split `a=1&b&c[]=x,d=2` into a JSON object with coerced scalar values.
fn query_to_map(query: &str) -> Map<String, Value> {
    let mut map = Map::new();

    for arg in query.split(['&', ',']).filter(|a| !a.is_empty()) {
        let Some((raw_key, raw_value)) = arg.split_once('=') else {
            let (key, flag) = match arg.as_bytes()[0] {
                b'-' => (&arg[1..], false),
                b'+' => (&arg[1..], true),
                _ => (arg, true),
            };
            map.insert(decode(key), Value::Bool(flag));
            continue;
        };

        let key = decode(raw_key);
        let raw = decode(raw_value);

        if let Some(array_key) = key.strip_suffix("[]") {
            let value = coerce(array_key, raw);
            let entry = map
                .entry(array_key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => items.push(value),
                other => *other = Value::Array(vec![value]),
            }
        } else {
            let value = coerce(&key, raw);
            map.insert(key, value);
        }
    }

    map
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// `null`/`true`/`false` become JSON literals and numeric strings become
/// numbers, except for keys that are always strings.
fn coerce(key: &str, raw: String) -> Value {
    match raw.as_str() {
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if STRING_KEYS.contains(&key) {
        return Value::String(raw);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Some(n) = raw
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .and_then(serde_json::Number::from_f64)
    {
        return Value::Number(n);
    }
    Value::String(raw)
}
