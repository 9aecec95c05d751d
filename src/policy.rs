//! Inline-or-emit decision and data URI construction.
//!
//! Small assets are cheaper as a `data:` URI baked into the module than as a
//! separate request. The cut-off is the `limit` option (bytes):
//!
//! ```text
//! limit <= 0             → always inline
//! len(content) <  limit  → inline
//! len(content) >= limit  → continue to compression and emission
//! ```
//!
//! The media type of the data URI comes from the explicit `mimetype` option
//! when present, otherwise from the resource extension. When neither is
//! known the media type segment is left out and the payload is still encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;

/// Inline threshold used when the options do not set `limit`.
pub const DEFAULT_LIMIT: i64 = 10 * 1024;

/// Outcome of the size policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Embed the asset; carries the finished data URI.
    Inline(String),
    /// Too large to embed; compress and emit.
    Continue,
}

/// Apply the size threshold to `content`.
pub fn decide(
    content: &[u8],
    limit: i64,
    resource_path: &Path,
    explicit_mime: Option<&str>,
) -> Decision {
    let below_limit = i64::try_from(content.len()).is_ok_and(|len| len < limit);
    if limit <= 0 || below_limit {
        let mime = resolve_mime(resource_path, explicit_mime);
        Decision::Inline(data_uri(content, mime.as_deref()))
    } else {
        Decision::Continue
    }
}

/// Explicit override, then the type inferred from the extension, then none.
pub fn resolve_mime(resource_path: &Path, explicit: Option<&str>) -> Option<String> {
    explicit
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .or_else(|| {
            mime_guess::from_path(resource_path)
                .first_raw()
                .map(str::to_string)
        })
}

/// `data:[<mime>;]base64,<payload>`
pub fn data_uri(content: &[u8], mime: Option<&str>) -> String {
    let payload = STANDARD.encode(content);
    match mime {
        Some(mime) => format!("data:{mime};base64,{payload}"),
        None => format!("data:base64,{payload}"),
    }
}
