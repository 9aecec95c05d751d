//! Output naming: template interpolation and derivative names.
//!
//! Every emitted asset gets a name computed from a template such as
//! `[hash].[ext]` or `img/[name].[hash:8].[ext]`. The result is a pure
//! function of the asset bytes, the resource path and the template, so the
//! same input always lands at the same output path and downstream caches stay
//! warm across builds.
//!
//! ## Tokens
//!
//! | Token | Value |
//! |---|---|
//! | `[hash]`, `[contenthash]` | content fingerprint, see [`crate::digest`] |
//! | `[<type>:hash:<digest>:<len>]` | fingerprint with explicit hash, digest and length |
//! | `[ext]` | resource extension without the dot (`bin` if none) |
//! | `[name]` | resource file stem (`file` if none) |
//! | `[path]` | resource directory relative to the root context, with trailing `/` |
//! | `[folder]` | last segment of `[path]` |
//! | `[query]` | resource query string, fragment stripped |
//! | `[0]`, `[1]`, ... | capture groups of the `regExp` pattern against the resource path |
//!
//! Tokens are matched case-insensitively.
//!
//! ## Derivatives
//!
//! The WebP companion of an emitted asset is found purely by convention: it
//! sits next to the primary file and differs only in its final extension
//! (`a.b.c.jpg` → `a.b.c.webp`). See [`derivative_name`].

use crate::digest::{DigestType, HashType, hash_digest};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Template used when the options do not name one.
pub const DEFAULT_TEMPLATE: &str = "[hash].[ext]";

/// Extension given to the transcoded companion file.
pub const DERIVATIVE_EXTENSION: &str = "webp";

static HASH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(?:([^:\]]+):)?(?:hash|contenthash)(?::([a-z]+\d*))?(?::(\d+))?\]")
        .expect("hash token pattern is valid")
});

static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(ext|name|path|folder|query)\]").expect("path token pattern is valid")
});

static PARENT_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\.(/)?").expect("parent segment pattern is valid"));

#[derive(Error, Debug)]
pub enum NamingError {
    #[error("Invalid regExp pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Unsupported hash type in name template: {0}")]
    UnsupportedHash(String),
    #[error("Unsupported digest type in name template: {0}")]
    UnsupportedDigest(String),
}

/// A name template plus the optional pattern feeding its `[N]` tokens.
#[derive(Debug, Clone)]
pub struct NamingTemplate {
    pub template: String,
    pub pattern: Option<Regex>,
}

impl NamingTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Build from the `name` and `regExp` loader options.
    ///
    /// An absent or empty `name` falls back to [`DEFAULT_TEMPLATE`].
    pub fn from_options(name: Option<&str>, reg_exp: Option<&str>) -> Result<Self, NamingError> {
        let template = name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_TEMPLATE);
        let pattern = reg_exp.map(Regex::new).transpose()?;
        Ok(Self {
            template: template.to_string(),
            pattern,
        })
    }
}

impl Default for NamingTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

/// Where the asset came from. Supplies the path-derived tokens.
#[derive(Debug, Clone, Copy)]
pub struct ResourceRef<'a> {
    pub path: &'a Path,
    /// Raw query including the leading `?`, or empty.
    pub query: &'a str,
    /// Directory `[path]` is made relative to. `None` keeps the raw directory.
    pub root_context: Option<&'a Path>,
}

impl<'a> ResourceRef<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self {
            path,
            query: "",
            root_context: None,
        }
    }
}

/// Resolved output names for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputIdentity {
    /// Name the original bytes are emitted under; the module body points here.
    pub primary: String,
    /// Name of the transcoded companion.
    pub derivative: String,
}

/// Resolve the primary and derivative names for `content`.
pub fn resolve(
    content: &[u8],
    template: &NamingTemplate,
    resource: &ResourceRef<'_>,
) -> Result<OutputIdentity, NamingError> {
    let primary = interpolate_name(content, template, resource)?;
    let derivative = derivative_name(&primary);
    Ok(OutputIdentity {
        primary,
        derivative,
    })
}

/// Expand every token in `template` for the given content and resource.
pub fn interpolate_name(
    content: &[u8],
    template: &NamingTemplate,
    resource: &ResourceRef<'_>,
) -> Result<String, NamingError> {
    let hashed = replace_hash_tokens(&template.template, content)?;
    let parts = PathParts::from_resource(resource);

    let mut url = PATH_TOKEN
        .replace_all(&hashed, |caps: &regex::Captures<'_>| {
            match caps[1].to_ascii_lowercase().as_str() {
                "ext" => parts.ext.clone(),
                "name" => parts.name.clone(),
                "path" => parts.directory.clone(),
                "folder" => parts.folder.clone(),
                _ => parts.query.clone(),
            }
        })
        .into_owned();

    if let Some(pattern) = &template.pattern {
        let haystack = resource.path.to_string_lossy();
        if let Some(caps) = pattern.captures(&haystack) {
            for (i, group) in caps.iter().enumerate() {
                let value = group.map_or("", |m| m.as_str());
                url = url.replace(&format!("[{i}]"), value);
            }
        }
    }

    Ok(url)
}

/// Replace `[hash]`-style tokens with content fingerprints.
fn replace_hash_tokens(template: &str, content: &[u8]) -> Result<String, NamingError> {
    let mut out = String::with_capacity(template.len() + 64);
    let mut last = 0;

    for caps in HASH_TOKEN.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);

        let hash = match caps.get(1) {
            Some(m) => HashType::parse(m.as_str())
                .ok_or_else(|| NamingError::UnsupportedHash(m.as_str().to_string()))?,
            None => HashType::default(),
        };
        let digest = match caps.get(2) {
            Some(m) => DigestType::parse(m.as_str())
                .ok_or_else(|| NamingError::UnsupportedDigest(m.as_str().to_string()))?,
            None => DigestType::default(),
        };
        let max_len = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .filter(|&n| n > 0);

        out.push_str(&hash_digest(content, hash, digest, max_len));
        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Path-derived token values for a resource.
struct PathParts {
    ext: String,
    name: String,
    directory: String,
    folder: String,
    query: String,
}

impl PathParts {
    fn from_resource(resource: &ResourceRef<'_>) -> Self {
        let path = resource.path;
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bin".to_string());
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let directory = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => directory_token(dir, resource.root_context),
            _ => String::new(),
        };
        let folder = directory
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
            .to_string();

        let query = if resource.query.len() > 1 {
            resource.query.split('#').next().unwrap_or("").to_string()
        } else {
            String::new()
        };

        Self {
            ext,
            name,
            directory,
            folder,
            query,
        }
    }
}

/// Render a resource directory for `[path]`: `/`-separated, trailing `/`,
/// relative to `root` when given, parent segments rewritten to `_`.
fn directory_token(dir: &Path, root: Option<&Path>) -> String {
    let dir = match root {
        Some(root) => relative_path(root, dir),
        None => dir.to_path_buf(),
    };
    let unix = dir.to_string_lossy().replace('\\', "/");
    let mut rendered = PARENT_SEGMENT.replace_all(&unix, "_$1").into_owned();

    if rendered.is_empty() {
        return rendered;
    }
    if !rendered.ends_with('/') {
        rendered.push('/');
    }
    // A bare "/" carries no information
    if rendered.len() == 1 {
        return String::new();
    }
    rendered
}

/// Lexical relative path from `from` to `to`.
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }
    rel
}

/// Derive the companion file name: replace the final extension of the last
/// path segment with [`DERIVATIVE_EXTENSION`].
///
/// - `abc123.png` → `abc123.webp`
/// - `a.b.c.jpg` → `a.b.c.webp`
/// - `img.v2/logo` → `img.v2/logo.webp` (no extension: appended)
pub fn derivative_name(primary: &str) -> String {
    let segment_start = primary.rfind('/').map_or(0, |i| i + 1);
    match primary[segment_start..].rfind('.') {
        Some(dot) => format!(
            "{}.{}",
            &primary[..segment_start + dot],
            DERIVATIVE_EXTENSION
        ),
        None => format!("{primary}.{DERIVATIVE_EXTENSION}"),
    }
}
