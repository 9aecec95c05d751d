//! Per-asset pipeline: identity → policy → compression → emission.
//!
//! ```text
//! RawAsset ──► naming::resolve ──► policy::decide ──► Inline ──► ModuleBody
//!                                        │
//!                                        ▼ Continue
//!                     bypass? ──yes──► body only, nothing registered
//!                                        │ no
//!                                        ▼
//!                          CompressionOptions::resolve
//!                                        │
//!                                        ▼
//!                          compress::compress (awaits)
//!                                        │
//!                                        ▼
//!                          emit::emit (primary + derivative)
//! ```
//!
//! [`load`] is an `async fn` that resolves exactly once, so a task can never
//! report completion twice. Compression is its only suspension point. A
//! compression failure ends the task before anything is registered.

use crate::compress::{self, CompressError, CompressionOptions, Compressor};
use crate::emit::{self, DEFAULT_PUBLIC_PATH, EmissionOutcome, EmitError, FileEmitter, ModuleBody};
use crate::naming::{self, NamingError, NamingTemplate, ResourceRef};
use crate::options::{LoaderOptions, OptionsError};
use crate::policy::{self, Decision};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Host does not provide the `{0}` capability")]
    HostCapabilityMissing(&'static str),
    #[error(transparent)]
    Compression(#[from] CompressError),
    #[error("Could not resolve output name: {0}")]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error("Could not emit asset: {0}")]
    Emit(#[from] EmitError),
    #[error("Could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One asset as handed over by the host. The bytes are never modified.
#[derive(Debug, Clone)]
pub struct RawAsset {
    pub content: Arc<[u8]>,
    pub resource_path: PathBuf,
    /// Query suffix of the import request (`?size=2`), or empty.
    pub resource_query: String,
}

impl RawAsset {
    pub fn new(content: impl Into<Arc<[u8]>>, resource_path: impl Into<PathBuf>) -> Self {
        Self {
            content: content.into(),
            resource_path: resource_path.into(),
            resource_query: String::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.resource_query = query.into();
        self
    }
}

/// Everything the loader may ask of its host.
#[derive(Clone)]
pub struct LoaderContext {
    pub options: LoaderOptions,
    /// Host is in debug mode.
    pub debug: bool,
    /// Expression the file-backed body prepends to the emitted name.
    pub public_path: String,
    /// Directory `[path]` tokens are relative to.
    pub root_context: Option<PathBuf>,
    pub emitter: Option<Arc<dyn FileEmitter>>,
}

impl LoaderContext {
    pub fn new(emitter: Arc<dyn FileEmitter>) -> Self {
        Self {
            emitter: Some(emitter),
            ..Self::without_emitter()
        }
    }

    /// A context whose host cannot emit files.
    pub fn without_emitter() -> Self {
        Self {
            options: LoaderOptions::default(),
            debug: false,
            public_path: DEFAULT_PUBLIC_PATH.to_string(),
            root_context: None,
            emitter: None,
        }
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_public_path(mut self, public_path: impl Into<String>) -> Self {
        self.public_path = public_path.into();
        self
    }

    pub fn with_root_context(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_context = Some(root.into());
        self
    }
}

impl fmt::Debug for LoaderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderContext")
            .field("options", &self.options)
            .field("debug", &self.debug)
            .field("public_path", &self.public_path)
            .field("root_context", &self.root_context)
            .field("emitter", &self.emitter.as_ref().map(|_| "FileEmitter"))
            .finish()
    }
}

/// Result of one loader task: the body plus what was done to produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded {
    pub body: ModuleBody,
    pub outcome: EmissionOutcome,
}

/// Run the pipeline for one asset and return its module body.
pub async fn load<C: Compressor>(
    ctx: &LoaderContext,
    asset: &RawAsset,
    compressor: Arc<C>,
) -> Result<ModuleBody, LoaderError> {
    load_detailed(ctx, asset, compressor)
        .await
        .map(|loaded| loaded.body)
}

/// Like [`load`], also reporting the emission outcome.
pub async fn load_detailed<C: Compressor>(
    ctx: &LoaderContext,
    asset: &RawAsset,
    compressor: Arc<C>,
) -> Result<Loaded, LoaderError> {
    let emitter = ctx
        .emitter
        .as_deref()
        .ok_or(LoaderError::HostCapabilityMissing("emit_file"))?;
    emitter.mark_cacheable();

    let path: &Path = &asset.resource_path;
    let template = NamingTemplate::from_options(
        Some(ctx.options.name_template()),
        ctx.options.reg_exp.as_deref(),
    )?;
    let resource = ResourceRef {
        path,
        query: &asset.resource_query,
        root_context: ctx.root_context.as_deref(),
    };
    let identity = naming::resolve(&asset.content, &template, &resource)?;
    debug!(
        path = %path.display(),
        primary = %identity.primary,
        bytes = asset.content.len(),
        "resolved output identity"
    );

    let limit = ctx.options.limit();
    if let Decision::Inline(data_uri) =
        policy::decide(&asset.content, limit, path, ctx.options.mime_override())
    {
        debug!(path = %path.display(), limit, "inlining asset");
        let outcome = EmissionOutcome::Inlined { data_uri };
        let body = emit::emit(emitter, &outcome, &asset.content, &ctx.public_path)?;
        return Ok(Loaded { body, outcome });
    }

    let derivative = if compress::should_bypass(ctx.debug, &ctx.options) {
        debug!(path = %path.display(), "debug bypass, skipping compression");
        None
    } else {
        let options = CompressionOptions::resolve(&ctx.options)?;
        Some(compress::compress(compressor, Arc::clone(&asset.content), &options).await?)
    };

    let outcome = EmissionOutcome::Emitted {
        identity,
        derivative,
    };
    let body = emit::emit(emitter, &outcome, &asset.content, &ctx.public_path)?;
    Ok(Loaded { body, outcome })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CodecPlan;
    use crate::compress::backend::tests::MockCompressor;
    use crate::test_helpers::RecordingEmitter;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    fn context(emitter: &Arc<RecordingEmitter>, options: LoaderOptions) -> LoaderContext {
        LoaderContext::new(emitter.clone()).with_options(options)
    }

    fn limit(n: i64) -> LoaderOptions {
        LoaderOptions {
            limit: Some(n),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_emitter_fails_before_processing() {
        let mock = Arc::new(MockCompressor::returning(b"w"));
        let asset = RawAsset::new(vec![0u8; 20_000], "/a.png");
        let err = load(&LoaderContext::without_emitter(), &asset, mock.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::HostCapabilityMissing("emit_file")));
        assert!(mock.get_plans().is_empty());
    }

    #[tokio::test]
    async fn small_asset_is_inlined() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mock = Arc::new(MockCompressor::returning(b"w"));
        let asset = RawAsset::new(&b"tiny"[..], "/img/dot.png");

        let body = load(&context(&emitter, limit(100)), &asset, mock.clone())
            .await
            .unwrap();

        let expected = format!(
            "module.exports = \"data:image/png;base64,{}\"",
            STANDARD.encode(b"tiny")
        );
        assert_eq!(body.to_string(), expected);
        assert!(emitter.files().is_empty());
        assert!(mock.get_plans().is_empty());
        assert!(emitter.was_marked_cacheable());
    }

    #[tokio::test]
    async fn asset_at_limit_is_emitted_with_derivative() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mock = Arc::new(MockCompressor::returning(b"webp-out"));
        let asset = RawAsset::new(vec![9u8; 100], "/img/photo.jpg");
        let options = LoaderOptions {
            name: Some("[name].[hash:8].[ext]".into()),
            limit: Some(100),
            ..Default::default()
        };

        let loaded = load_detailed(&context(&emitter, options), &asset, mock)
            .await
            .unwrap();

        let files = emitter.files();
        assert_eq!(files.len(), 2);
        let (primary, original) = &files[0];
        let (derivative, webp) = &files[1];
        assert!(primary.starts_with("photo.") && primary.ends_with(".jpg"));
        assert_eq!(original, &vec![9u8; 100]);
        assert_eq!(derivative, &naming::derivative_name(primary));
        assert_eq!(webp, b"webp-out");
        assert_eq!(
            loaded.body.to_string(),
            format!("module.exports = __webpack_public_path__ + \"{primary}\";")
        );
    }

    #[tokio::test]
    async fn zero_limit_inlines_large_asset() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mock = Arc::new(MockCompressor::returning(b"w"));
        let asset = RawAsset::new(vec![1u8; 50_000], "/big.png");

        let loaded = load_detailed(&context(&emitter, limit(0)), &asset, mock)
            .await
            .unwrap();
        assert!(matches!(loaded.outcome, EmissionOutcome::Inlined { .. }));
        assert!(emitter.files().is_empty());
    }

    #[tokio::test]
    async fn explicit_mimetype_is_used_for_inline() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mock = Arc::new(MockCompressor::returning(b"w"));
        let options = LoaderOptions {
            minetype: Some("image/x-legacy".into()),
            ..Default::default()
        };
        let body = load(
            &context(&emitter, options),
            &RawAsset::new(&b"x"[..], "/a.png"),
            mock,
        )
        .await
        .unwrap();
        assert!(body.to_string().contains("data:image/x-legacy;base64,"));
    }

    #[tokio::test]
    async fn debug_bypass_emits_nothing() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mock = Arc::new(MockCompressor::returning(b"w"));
        let options = LoaderOptions {
            limit: Some(1),
            bypass_on_debug: Some(true),
            ..Default::default()
        };
        let ctx = context(&emitter, options).with_debug(true);
        let asset = RawAsset::new(vec![3u8; 64], "/a.png");

        let body = load(&ctx, &asset, mock.clone()).await.unwrap();

        assert!(emitter.files().is_empty());
        assert!(mock.get_plans().is_empty());
        let expected = naming::interpolate_name(
            &asset.content,
            &NamingTemplate::default(),
            &ResourceRef::new(Path::new("/a.png")),
        )
        .unwrap();
        assert_eq!(body.referenced_name(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn debug_bypass_skips_option_validation() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mock = Arc::new(MockCompressor::returning(b"w"));
        let options = LoaderOptions {
            limit: Some(1),
            bypass_on_debug: Some(true),
            quality: Some(400),
            ..Default::default()
        };
        let ctx = context(&emitter, options).with_debug(true);

        let loaded = load_detailed(&ctx, &RawAsset::new(vec![3u8; 64], "/a.png"), mock.clone())
            .await
            .unwrap();

        assert!(matches!(
            loaded.outcome,
            EmissionOutcome::Emitted { derivative: None, .. }
        ));
        assert!(emitter.files().is_empty());
        assert!(mock.get_plans().is_empty());
    }

    #[tokio::test]
    async fn bypass_flag_without_debug_host_still_compresses() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mock = Arc::new(MockCompressor::returning(b"w"));
        let options = LoaderOptions {
            limit: Some(1),
            bypass_on_debug: Some(true),
            ..Default::default()
        };
        load(
            &context(&emitter, options),
            &RawAsset::new(vec![3u8; 64], "/a.png"),
            mock.clone(),
        )
        .await
        .unwrap();
        assert_eq!(emitter.files().len(), 2);
        assert_eq!(mock.get_plans().len(), 1);
    }

    #[tokio::test]
    async fn compression_failure_emits_nothing() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mock = Arc::new(MockCompressor::failing("decoder gave up"));
        let result = load(
            &context(&emitter, limit(1)),
            &RawAsset::new(vec![3u8; 64], "/a.png"),
            mock,
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, LoaderError::Compression(CompressError::Stage { .. })));
        assert_eq!(err.to_string(), "webp stage failed: decoder gave up");
        assert!(emitter.files().is_empty());
    }

    #[tokio::test]
    async fn codec_panic_is_reported_once() {
        let emitter = Arc::new(RecordingEmitter::default());
        let result = load(
            &context(&emitter, limit(1)),
            &RawAsset::new(vec![3u8; 64], "/a.png"),
            Arc::new(MockCompressor::panicking()),
        )
        .await;
        assert!(matches!(
            result,
            Err(LoaderError::Compression(CompressError::Panicked(_)))
        ));
        assert!(emitter.files().is_empty());
    }

    #[tokio::test]
    async fn compressor_receives_resolved_options() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mock = Arc::new(MockCompressor::returning(b"w"));
        let options = LoaderOptions {
            limit: Some(1),
            quality: Some(0),
            method: Some(0),
            ..Default::default()
        };
        load(
            &context(&emitter, options),
            &RawAsset::new(vec![3u8; 64], "/a.png"),
            mock.clone(),
        )
        .await
        .unwrap();

        let expected = CompressionOptions {
            quality: 0,
            method: 0,
            ..Default::default()
        };
        assert_eq!(mock.get_plans(), vec![CodecPlan::standard(&expected)]);
    }

    #[tokio::test]
    async fn invalid_option_fails_without_emitting() {
        let emitter = Arc::new(RecordingEmitter::default());
        let options = LoaderOptions {
            limit: Some(1),
            quality: Some(400),
            ..Default::default()
        };
        let result = load(
            &context(&emitter, options),
            &RawAsset::new(vec![3u8; 64], "/a.png"),
            Arc::new(MockCompressor::returning(b"w")),
        )
        .await;
        assert!(matches!(result, Err(LoaderError::Options(_))));
        assert!(emitter.files().is_empty());
    }

    #[tokio::test]
    async fn bad_template_is_naming_error() {
        let emitter = Arc::new(RecordingEmitter::default());
        let options = LoaderOptions {
            name: Some("[md5:hash].[ext]".into()),
            ..Default::default()
        };
        let result = load(
            &context(&emitter, options),
            &RawAsset::new(&b"x"[..], "/a.png"),
            Arc::new(MockCompressor::returning(b"w")),
        )
        .await;
        assert!(matches!(result, Err(LoaderError::Naming(_))));
    }

    #[tokio::test]
    async fn same_input_same_body() {
        let mock = Arc::new(MockCompressor::returning(b"w"));
        let asset = RawAsset::new(vec![5u8; 300], "/x/y.png").with_query("?v=1");
        let first_emitter = Arc::new(RecordingEmitter::default());
        let second_emitter = Arc::new(RecordingEmitter::default());

        let a = load(&context(&first_emitter, limit(10)), &asset, mock.clone())
            .await
            .unwrap();
        let b = load(&context(&second_emitter, limit(10)), &asset, mock)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(first_emitter.files(), second_emitter.files());
    }

    #[tokio::test]
    async fn custom_public_path_and_root_context() {
        let emitter = Arc::new(RecordingEmitter::default());
        let options = LoaderOptions {
            limit: Some(1),
            name: Some("[path][name].[ext]".into()),
            ..Default::default()
        };
        let ctx = context(&emitter, options)
            .with_public_path("window.CDN")
            .with_root_context("/project");
        let body = load(
            &ctx,
            &RawAsset::new(vec![1u8; 8], "/project/assets/logo.png"),
            Arc::new(MockCompressor::returning(b"w")),
        )
        .await
        .unwrap();

        assert_eq!(
            body.to_string(),
            r#"module.exports = window.CDN + "assets/logo.png";"#
        );
        assert_eq!(emitter.names(), vec!["assets/logo.png", "assets/logo.webp"]);
    }
}
