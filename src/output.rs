//! CLI output formatting for `build` and `check`.
//!
//! Every asset gets a header line (positional index, source, where it went)
//! followed by indented context lines. Formatting is done by pure `format_*`
//! functions returning lines so tests can assert on exact text; the `print_*`
//! wrappers only write to stdout.
//!
//! # Output Format
//!
//! ```text
//! 001 icons/dot.png → inline (412 B)
//!     module.exports = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR4…"
//! 002 photos/hero.jpg → 3f2a9c01.jpg
//!     Derivative: 3f2a9c01.webp (48.2 KB → 12.1 KB, -75%)
//!     module.exports = __webpack_public_path__ + "3f2a9c01.jpg";
//! 003 photos/raw.png → 77b0e1aa.png (debug bypass, nothing emitted)
//!     module.exports = __webpack_public_path__ + "77b0e1aa.png";
//! 004 broken.png → failed
//!     Error: Failed to decode image: Png: ...
//!
//! 4 assets: 1 inlined, 1 emitted, 1 bypassed, 1 failed
//! ```

use crate::config::LoadedConfig;
use crate::emit::EmissionOutcome;
use crate::loader::{Loaded, LoaderError};

/// Longest module body printed before it is cut off.
const MAX_BODY_CHARS: usize = 100;

/// Format a 1-based positional index as zero-padded 3-digit string.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count.
pub fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

/// Size change from `before` to `after` as a signed percentage.
fn format_change(before: usize, after: usize) -> String {
    if before == 0 {
        return "n/a".to_string();
    }
    let pct = (after as f64 / before as f64 - 1.0) * 100.0;
    format!("{:+.0}%", pct)
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let kept: String = body.chars().take(MAX_BODY_CHARS).collect();
    format!("{kept}…")
}

/// Tally of outcomes across one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub inlined: usize,
    pub emitted: usize,
    pub bypassed: usize,
    pub failed: usize,
}

impl BuildSummary {
    pub fn record(&mut self, result: &Result<Loaded, LoaderError>) {
        match result {
            Ok(Loaded {
                outcome: EmissionOutcome::Inlined { .. },
                ..
            }) => self.inlined += 1,
            Ok(Loaded {
                outcome: EmissionOutcome::Emitted {
                    derivative: Some(_),
                    ..
                },
                ..
            }) => self.emitted += 1,
            Ok(_) => self.bypassed += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inlined + self.emitted + self.bypassed + self.failed
    }
}

/// Format one asset's result.
pub fn format_asset_report(
    index: usize,
    source: &str,
    original_bytes: usize,
    result: &Result<Loaded, LoaderError>,
) -> Vec<String> {
    let mut lines = Vec::new();
    let header = format!("{} {}", format_index(index), source);

    let loaded = match result {
        Ok(loaded) => loaded,
        Err(e) => {
            lines.push(format!("{header} → failed"));
            lines.push(format!("{}Error: {e}", indent(1)));
            return lines;
        }
    };

    match &loaded.outcome {
        EmissionOutcome::Inlined { .. } => {
            lines.push(format!("{header} → inline ({})", format_size(original_bytes)));
        }
        EmissionOutcome::Emitted {
            identity,
            derivative: Some(webp),
        } => {
            lines.push(format!("{header} → {}", identity.primary));
            lines.push(format!(
                "{}Derivative: {} ({} → {}, {})",
                indent(1),
                identity.derivative,
                format_size(original_bytes),
                format_size(webp.len()),
                format_change(original_bytes, webp.len())
            ));
        }
        EmissionOutcome::Emitted {
            identity,
            derivative: None,
        } => {
            lines.push(format!(
                "{header} → {} (debug bypass, nothing emitted)",
                identity.primary
            ));
        }
    }
    lines.push(format!(
        "{}{}",
        indent(1),
        truncate_body(&loaded.body.to_string())
    ));
    lines
}

pub fn print_asset_report(
    index: usize,
    source: &str,
    original_bytes: usize,
    result: &Result<Loaded, LoaderError>,
) {
    for line in format_asset_report(index, source, original_bytes, result) {
        println!("{line}");
    }
}

/// Format the closing summary line.
pub fn format_summary(summary: &BuildSummary) -> Vec<String> {
    let noun = if summary.total() == 1 {
        "asset"
    } else {
        "assets"
    };
    vec![format!(
        "{} {noun}: {} inlined, {} emitted, {} bypassed, {} failed",
        summary.total(),
        summary.inlined,
        summary.emitted,
        summary.bypassed,
        summary.failed
    )]
}

pub fn print_summary(summary: &BuildSummary) {
    println!();
    for line in format_summary(summary) {
        println!("{line}");
    }
}

/// Format the result of `check`.
pub fn format_check_output(source: &str, loaded: &LoadedConfig) -> Vec<String> {
    let config = &loaded.config;
    let mut lines = vec![format!("Config OK: {source}")];
    lines.push(format!("{}Output: {}", indent(1), config.output.dir));
    lines.push(format!("{}Public path: {}", indent(1), config.output.public_path));
    lines.push(format!(
        "{}Inline limit: {}",
        indent(1),
        format_size(config.loader.limit().max(0) as usize)
    ));
    lines.push(format!("{}Name: {}", indent(1), config.loader.name_template()));
    for key in &loaded.ignored_keys {
        lines.push(format!("{}Ignored: {key}", indent(1)));
    }
    lines
}

pub fn print_check_output(source: &str, loaded: &LoadedConfig) {
    for line in format_check_output(source, loaded) {
        println!("{line}");
    }
}
