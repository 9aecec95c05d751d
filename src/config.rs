//! CLI configuration module.
//!
//! Handles loading, validating, and merging `asset-webp.toml`. Stock defaults
//! are the base layer; the user file only needs the keys it overrides.
//!
//! ## Config File Location
//!
//! The CLI reads `asset-webp.toml` from the working directory, or the file
//! given with `--config`. A missing file means stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! dir = "dist"                          # Where emitted files are written
//! public_path = "__webpack_public_path__"
//! debug = false                         # Host debug mode (enables bypassOnDebug)
//! # root = "."                          # Root context for [path] tokens
//! # concurrency = 4                     # Parallel assets (omit for CPU cores)
//!
//! [loader]
//! name = "[hash].[ext]"
//! limit = 10240
//! preset = "default"
//! quality = 80
//! alphaQuality = 100
//! method = 1
//! sns = 80
//! autoFilter = false
//! sharpness = 0
//! lossless = false
//! bypassOnDebug = false
//! ```
//!
//! Unknown keys in `[output]` are rejected to catch typos early. Unknown keys
//! in `[loader]` are ignored like any other loader option and reported as
//! warnings, since option bags are often shared between tools.

use crate::compress::CompressionOptions;
use crate::emit::DEFAULT_PUBLIC_PATH;
use crate::naming::NamingTemplate;
use crate::options::{LoaderOptions, OptionsError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "asset-webp.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Invalid [loader] options: {0}")]
    Options(#[from] OptionsError),
}

/// Tool configuration loaded from `asset-webp.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Where and how artifacts are written.
    pub output: OutputConfig,
    /// Loader options applied to every asset; query strings override them.
    pub loader: LoaderOptions,
}

/// Host-side settings the CLI plays the role of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Output directory for emitted files.
    pub dir: String,
    /// Expression prepended to emitted names in module bodies.
    pub public_path: String,
    /// Host debug mode.
    pub debug: bool,
    /// Root context for `[path]` tokens. Absent means the working directory.
    pub root: Option<String>,
    /// Maximum number of assets processed at once.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub concurrency: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "dist".to_string(),
            public_path: DEFAULT_PUBLIC_PATH.to_string(),
            debug: false,
            root: None,
            concurrency: None,
        }
    }
}

impl ToolConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "output.dir must not be empty".into(),
            ));
        }
        if self.output.public_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "output.public_path must not be empty".into(),
            ));
        }
        if self.output.concurrency == Some(0) {
            return Err(ConfigError::Validation(
                "output.concurrency must be at least 1".into(),
            ));
        }
        CompressionOptions::resolve(&self.loader)?;
        NamingTemplate::from_options(self.loader.name.as_deref(), self.loader.reg_exp.as_deref())
            .map_err(|e| ConfigError::Validation(format!("loader: {e}")))?;
        Ok(())
    }
}

/// Resolve the effective number of concurrent assets.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_concurrency(config: &OutputConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.concurrency.map(|n| n.min(cores)).unwrap_or(cores)
}

/// A loaded config plus the `[loader]` keys that were ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: ToolConfig,
    pub ignored_keys: Vec<String>,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ToolConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Path of the config file inside `dir`.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(file: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !file.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(file)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<LoadedConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let mut ignored_keys = Vec::new();
    let config: ToolConfig =
        serde_ignored::deserialize(merged, |path| ignored_keys.push(path.to_string()))?;
    config.validate()?;
    Ok(LoadedConfig {
        config,
        ignored_keys,
    })
}

/// Load config from `file`, merged over stock defaults and validated.
pub fn load_config(file: &Path) -> Result<LoadedConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(file)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `asset-webp.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# asset-webp Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.

# ---------------------------------------------------------------------------
# Output (host settings)
# ---------------------------------------------------------------------------
[output]
# Directory emitted files are written to.
dir = "dist"

# Expression prepended to emitted names in module bodies.
public_path = "__webpack_public_path__"

# Host debug mode. Together with loader.bypassOnDebug, skips compression
# and emits nothing.
debug = false

# Root context that [path] tokens are made relative to.
# Defaults to the working directory.
# root = "."

# Maximum number of assets processed in parallel.
# Omit to use all CPU cores. Values above the core count are clamped.
# concurrency = 4

# ---------------------------------------------------------------------------
# Loader options (applied to every asset, overridden by --query)
# ---------------------------------------------------------------------------
[loader]
# Output name template. Tokens: [hash] [contenthash] [name] [ext] [path]
# [folder] [query] [N], plus [<type>:hash:<digest>:<length>], e.g.
# "img/[name].[sha512:hash:base62:8].[ext]".
name = "[hash].[ext]"

# Pattern matched against the resource path; capture groups fill [N] tokens.
# regExp = "[\\/]([^\\/]+)[\\/][^\\/]+$"

# Assets smaller than this many bytes are inlined as data URIs.
# 0 or a negative value inlines everything.
limit = 10240

# Media type for data URIs. Inferred from the extension when unset.
# mimetype = "image/png"

# WebP encoder settings.
# preset: default, photo, picture, drawing, icon, text
preset = "default"
quality = 80          # 0-100
alphaQuality = 100    # 0-100
method = 1            # 0 (fast) - 6 (small)
sns = 80              # spatial noise shaping, 0-100
autoFilter = false
sharpness = 0         # 0 (sharpest) - 7
lossless = false
bypassOnDebug = false

# Target WebP size in bytes.
# size = 20000

# Deblocking filter: a strength 0-100, or "simple" / "strong".
# filter = 40
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::{Filter, Preset};
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = ToolConfig::default();
        assert_eq!(config.output.dir, "dist");
        assert_eq!(config.output.public_path, "__webpack_public_path__");
        assert!(!config.output.debug);
        assert_eq!(config.loader, LoaderOptions::default());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r##"
[loader]
limit = 4096
preset = "photo"
"##;
        let config: ToolConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.loader.limit, Some(4096));
        assert_eq!(config.loader.preset, Some(Preset::Photo));
        // Defaults preserved
        assert_eq!(config.output.dir, "dist");
        assert_eq!(config.loader.quality, None);
    }

    #[test]
    fn parse_filter_forms() {
        let named: ToolConfig = toml::from_str("[loader]\nfilter = \"simple\"").unwrap();
        assert!(matches!(named.loader.filter, Some(Filter::Named(_))));
        let strength: ToolConfig = toml::from_str("[loader]\nfilter = 25").unwrap();
        assert_eq!(strength.loader.filter, Some(Filter::Strength(25)));
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let loaded = load_config(&config_path(tmp.path())).unwrap();
        assert_eq!(loaded.config, ToolConfig::default());
        assert!(loaded.ignored_keys.is_empty());
    }

    #[test]
    fn load_config_merges_user_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            config_path(tmp.path()),
            "[output]\ndir = \"public/assets\"\n\n[loader]\nquality = 60\n",
        )
        .unwrap();

        let loaded = load_config(&config_path(tmp.path())).unwrap();
        assert_eq!(loaded.config.output.dir, "public/assets");
        assert_eq!(loaded.config.output.public_path, DEFAULT_PUBLIC_PATH);
        assert_eq!(loaded.config.loader.quality, Some(60));
    }

    #[test]
    fn unknown_output_key_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(config_path(tmp.path()), "[output]\ndirr = \"x\"\n").unwrap();
        assert!(matches!(
            load_config(&config_path(tmp.path())),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn unknown_loader_key_reported() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            config_path(tmp.path()),
            "[loader]\nlimit = 1\noutputPath = \"img/\"\n",
        )
        .unwrap();
        let loaded = load_config(&config_path(tmp.path())).unwrap();
        assert_eq!(loaded.config.loader.limit, Some(1));
        assert_eq!(loaded.ignored_keys, vec!["loader.outputPath".to_string()]);
    }

    #[test]
    fn invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(config_path(tmp.path()), "[output\n").unwrap();
        assert!(matches!(
            load_config(&config_path(tmp.path())),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn out_of_range_loader_option_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(config_path(tmp.path()), "[loader]\nmethod = 9\n").unwrap();
        assert!(matches!(
            load_config(&config_path(tmp.path())),
            Err(ConfigError::Options(_))
        ));
    }

    #[test]
    fn bad_reg_exp_rejected() {
        let mut config = ToolConfig::default();
        config.loader.reg_exp = Some("(".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(m)) if m.starts_with("loader:")
        ));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = ToolConfig::default();
        config.output.concurrency = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn empty_public_path_rejected() {
        let mut config = ToolConfig::default();
        config.output.public_path = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_concurrency_clamps_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = OutputConfig {
            concurrency: Some(cores + 100),
            ..Default::default()
        };
        assert_eq!(effective_concurrency(&config), cores);
        assert_eq!(effective_concurrency(&OutputConfig::default()), cores);
        let one = OutputConfig {
            concurrency: Some(1),
            ..Default::default()
        };
        assert_eq!(effective_concurrency(&one), 1);
    }

    #[test]
    fn merge_overlay_wins_and_base_preserved() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\nz = 4").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
        assert_eq!(merged["a"]["z"].as_integer(), Some(4));
    }

    #[test]
    fn stock_config_parses_to_default_semantics() {
        let value: toml::Value = toml::from_str(stock_config_toml()).unwrap();
        let loaded = resolve_config(stock_defaults_value(), Some(value)).unwrap();
        assert!(loaded.ignored_keys.is_empty());
        assert_eq!(loaded.config.output, OutputConfig::default());
        assert_eq!(
            CompressionOptions::resolve(&loaded.config.loader).unwrap(),
            CompressionOptions::default()
        );
        assert_eq!(loaded.config.loader.limit(), 10240);
        assert_eq!(loaded.config.loader.name_template(), "[hash].[ext]");
    }

    #[test]
    fn stock_defaults_value_is_table() {
        let value = stock_defaults_value();
        assert!(value.get("output").is_some_and(|v| v.is_table()));
    }
}
