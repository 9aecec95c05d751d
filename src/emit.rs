//! Result emission: artifact registration and module body rendering.
//!
//! The module body is the text a bundler splices into its output in place of
//! the asset import. It has two shapes:
//!
//! ```text
//! module.exports = "data:image/png;base64,iVBO..."          inline
//! module.exports = __webpack_public_path__ + "3f2a.png";    file-backed
//! ```
//!
//! File-backed assets register two artifacts with the host: the original
//! bytes under the primary name and the WebP bytes under the derivative
//! name. The body only ever references the primary; consumers find the
//! derivative by swapping the extension.
//!
//! Registration is all or nothing: both names are checked before either file
//! is written, and a failed derivative write discards the primary again.

use crate::naming::OutputIdentity;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Runtime expression prepended to emitted names.
pub const DEFAULT_PUBLIC_PATH: &str = "__webpack_public_path__";

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("IO error writing {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Refusing to emit {0}: name escapes the output directory")]
    UnsafeName(String),
    #[error("Host rejected {name}: {message}")]
    Rejected { name: String, message: String },
}

/// Host capability for registering output files.
pub trait FileEmitter: Send + Sync {
    /// Register `bytes` as an output file named `name`.
    fn emit_file(&self, name: &str, bytes: &[u8]) -> Result<(), EmitError>;

    /// Check that `name` can be registered, before anything is written.
    fn check_name(&self, _name: &str) -> Result<(), EmitError> {
        Ok(())
    }

    /// Withdraw a file registered earlier in the same emission.
    fn discard(&self, _name: &str) {}

    /// Tell the host the result depends only on the input bytes and options.
    fn mark_cacheable(&self) {}
}

/// What the loader did with an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmissionOutcome {
    /// Embedded as a data URI; nothing registered.
    Inlined { data_uri: String },
    /// File-backed. `derivative` is `None` in debug-bypass mode, where nothing
    /// is registered even though the body references `primary`.
    Emitted {
        identity: OutputIdentity,
        derivative: Option<Vec<u8>>,
    },
}

/// Rendered module body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleBody {
    Inline { data_uri: String },
    PublicPath { token: String, name: String },
}

impl ModuleBody {
    pub fn inline(data_uri: impl Into<String>) -> Self {
        ModuleBody::Inline {
            data_uri: data_uri.into(),
        }
    }

    pub fn public_path(token: impl Into<String>, name: impl Into<String>) -> Self {
        ModuleBody::PublicPath {
            token: token.into(),
            name: name.into(),
        }
    }

    /// Name the body points at, `None` for inline bodies.
    pub fn referenced_name(&self) -> Option<&str> {
        match self {
            ModuleBody::Inline { .. } => None,
            ModuleBody::PublicPath { name, .. } => Some(name),
        }
    }
}

impl fmt::Display for ModuleBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleBody::Inline { data_uri } => {
                write!(f, "module.exports = {}", json_string(data_uri))
            }
            ModuleBody::PublicPath { token, name } => {
                write!(f, "module.exports = {token} + {};", json_string(name))
            }
        }
    }
}

fn json_string(s: &str) -> String {
    // Serializing a str cannot fail
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// Register the artifacts of `outcome` and render the body.
pub fn emit(
    emitter: &dyn FileEmitter,
    outcome: &EmissionOutcome,
    original: &[u8],
    public_path: &str,
) -> Result<ModuleBody, EmitError> {
    match outcome {
        EmissionOutcome::Inlined { data_uri } => Ok(ModuleBody::inline(data_uri.as_str())),
        EmissionOutcome::Emitted {
            identity,
            derivative,
        } => {
            if let Some(derivative) = derivative {
                emitter.check_name(&identity.primary)?;
                emitter.check_name(&identity.derivative)?;
                emitter.emit_file(&identity.primary, original)?;
                if let Err(e) = emitter.emit_file(&identity.derivative, derivative) {
                    emitter.discard(&identity.primary);
                    return Err(e);
                }
                debug!(
                    primary = %identity.primary,
                    derivative = %identity.derivative,
                    original_bytes = original.len(),
                    derivative_bytes = derivative.len(),
                    "emitted artifacts"
                );
            }
            Ok(ModuleBody::public_path(public_path, identity.primary.as_str()))
        }
    }
}

/// Emitter that writes artifacts under a directory on disk.
#[derive(Debug)]
pub struct DirEmitter {
    root: PathBuf,
    emitted: Mutex<Vec<(String, usize)>>,
}

impl DirEmitter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            emitted: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names and sizes written so far, in emission order.
    pub fn emitted(&self) -> Vec<(String, usize)> {
        self.emitted
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    fn target(&self, name: &str) -> Result<PathBuf, EmitError> {
        let relative = Path::new(name.trim_start_matches('/'));
        let escapes = relative.components().any(|c| {
            !matches!(
                c,
                std::path::Component::Normal(_) | std::path::Component::CurDir
            )
        });
        if escapes || relative.as_os_str().is_empty() {
            return Err(EmitError::UnsafeName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl FileEmitter for DirEmitter {
    fn emit_file(&self, name: &str, bytes: &[u8]) -> Result<(), EmitError> {
        let target = self.target(name)?;
        let io_err = |source| EmitError::Io {
            name: name.to_string(),
            source,
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&target, bytes).map_err(io_err)?;
        if let Ok(mut list) = self.emitted.lock() {
            list.push((name.to_string(), bytes.len()));
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<(), EmitError> {
        self.target(name).map(|_| ())
    }

    fn discard(&self, name: &str) {
        let Ok(target) = self.target(name) else {
            return;
        };
        if let Err(e) = std::fs::remove_file(&target) {
            warn!(name, error = %e, "could not remove partially emitted file");
        }
        if let Ok(mut list) = self.emitted.lock() {
            list.retain(|(emitted, _)| emitted != name);
        }
    }
}
