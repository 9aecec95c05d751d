use asset_webp::compress::RustCompressor;
use asset_webp::config::{self, LoadedConfig};
use asset_webp::emit::{DirEmitter, FileEmitter};
use asset_webp::loader::{self, Loaded, LoaderContext, LoaderError, RawAsset};
use asset_webp::options::LoaderOptions;
use asset_webp::output::{self, BuildSummary};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "asset-webp")]
#[command(about = "Inline small images as data URIs, emit larger ones with a WebP derivative")]
#[command(long_about = "\
Inline small images as data URIs, emit larger ones with a WebP derivative

Each input file is one asset. Assets below the inline limit become a
data URI module body. Larger assets are written to the output directory
under a content-hashed name, together with a WebP companion that differs
only in its extension:

  dist/
  ├── 3f2a9c01….jpg     # original bytes, referenced by the module body
  └── 3f2a9c01….webp    # derivative, found by swapping the extension

A resource query can be attached to a file name for the [query] token:
  asset-webp build 'img/logo.png?v=2'

Loader options come from asset-webp.toml ([loader] table) and can be
overridden per run with --query, using loader query syntax:
  --query '?limit=8192&quality=75&lossless'
  --query '{\"preset\":\"photo\",\"name\":\"img/[name].[hash:8].[ext]\"}'

Run 'asset-webp gen-config' to generate a documented asset-webp.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (defaults to ./asset-webp.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline steps at debug level. RUST_LOG takes precedence.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Image files to process
    #[arg(required = true)]
    files: Vec<String>,

    /// Output directory (overrides output.dir)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Root context for [path] tokens (overrides output.root)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Loader options as a query string, layered over the [loader] table
    #[arg(long)]
    query: Option<String>,

    /// Run as a debug-mode host
    #[arg(long)]
    debug: bool,

    /// Maximum number of assets processed at once
    #[arg(long)]
    concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the loader over image files and write emitted artifacts
    Build(BuildArgs),
    /// Validate the config file without processing anything
    Check,
    /// Print a stock asset-webp.toml with all options documented
    GenConfig,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "asset_webp=debug"
    } else {
        "asset_webp=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn config_file(cli_path: Option<&Path>) -> PathBuf {
    cli_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config::config_path(Path::new(".")))
}

fn load_config(file: &Path) -> Result<LoadedConfig, config::ConfigError> {
    let loaded = config::load_config(file)?;
    for key in &loaded.ignored_keys {
        warn!(key = %key, file = %file.display(), "ignoring unknown loader option");
    }
    Ok(loaded)
}

/// Split `img/a.png?v=2` into the path and its resource query.
fn split_resource(spec: &str) -> (&str, &str) {
    match spec.find('?') {
        Some(i) => (&spec[..i], &spec[i..]),
        None => (spec, ""),
    }
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Read one input and run the loader over it. A read failure is reported
/// like any other asset failure.
async fn process_file(
    ctx: &LoaderContext,
    path: PathBuf,
    query: String,
    compressor: Arc<RustCompressor>,
) -> (usize, Result<Loaded, LoaderError>) {
    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(source) => return (0, Err(LoaderError::Read { path, source })),
    };
    let original_bytes = content.len();
    let asset = RawAsset::new(content, path).with_query(query);
    (
        original_bytes,
        loader::load_detailed(ctx, &asset, compressor).await,
    )
}

async fn build(
    args: BuildArgs,
    loaded: LoadedConfig,
) -> Result<BuildSummary, Box<dyn std::error::Error>> {
    let LoadedConfig { config, .. } = loaded;
    let cwd = std::env::current_dir()?;

    let mut options = config.loader.clone();
    if let Some(query) = &args.query {
        let (overlay, ignored) = LoaderOptions::parse_query(query)?;
        for key in ignored {
            warn!(key = %key, "ignoring unknown loader option in --query");
        }
        options = options.overlay(overlay);
    }

    let out_dir = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.output.dir));
    let root = args
        .root
        .or_else(|| config.output.root.as_ref().map(PathBuf::from))
        .map(|r| absolute(&cwd, &r))
        .unwrap_or_else(|| cwd.clone());
    let concurrency = args
        .concurrency
        .map(|n| n.max(1))
        .unwrap_or_else(|| config::effective_concurrency(&config.output));

    let emitter = Arc::new(DirEmitter::new(out_dir));
    let ctx = LoaderContext::new(emitter.clone() as Arc<dyn FileEmitter>)
        .with_options(options)
        .with_debug(args.debug || config.output.debug)
        .with_public_path(config.output.public_path.clone())
        .with_root_context(root);
    info!(
        assets = args.files.len(),
        concurrency,
        output = %emitter.root().display(),
        "starting build"
    );

    let compressor = Arc::new(RustCompressor::new());
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();

    for (index, spec) in args.files.iter().enumerate() {
        let (path, query) = split_resource(spec);
        let path = absolute(&cwd, Path::new(path));
        let query = query.to_string();

        let ctx = ctx.clone();
        let compressor = Arc::clone(&compressor);
        let semaphore = Arc::clone(&semaphore);
        let source = spec.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let (original_bytes, result) = process_file(&ctx, path, query, compressor).await;
            (index, source, original_bytes, result)
        });
    }

    let mut results = Vec::with_capacity(args.files.len());
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(index, ..)| *index);

    let mut summary = BuildSummary::default();
    for (index, source, original_bytes, result) in &results {
        summary.record(result);
        output::print_asset_report(index + 1, source, *original_bytes, result);
    }
    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let file = config_file(cli.config.as_deref());

    match cli.command {
        Command::Build(args) => {
            let loaded = load_config(&file)?;
            let summary = build(args, loaded).await?;
            output::print_summary(&summary);
            if summary.failed > 0 {
                return Err(format!("{} of {} assets failed", summary.failed, summary.total()).into());
            }
        }
        Command::Check => {
            let loaded = load_config(&file)?;
            output::print_check_output(&file.display().to_string(), &loaded);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_webp::config::ToolConfig;
    use tempfile::TempDir;

    #[test]
    fn split_resource_separates_query() {
        assert_eq!(split_resource("img/a.png?v=2"), ("img/a.png", "?v=2"));
        assert_eq!(split_resource("img/a.png"), ("img/a.png", ""));
    }

    #[test]
    fn absolute_joins_relative_paths() {
        let cwd = Path::new("/work");
        assert_eq!(absolute(cwd, Path::new("a.png")), PathBuf::from("/work/a.png"));
        assert_eq!(absolute(cwd, Path::new("/abs/a.png")), PathBuf::from("/abs/a.png"));
    }

    #[test]
    fn config_file_defaults_to_working_directory() {
        assert_eq!(config_file(None), PathBuf::from("./asset-webp.toml"));
        assert_eq!(
            config_file(Some(Path::new("conf/x.toml"))),
            PathBuf::from("conf/x.toml")
        );
    }

    #[test]
    fn cli_parses_build_flags() {
        let cli = Cli::try_parse_from([
            "asset-webp",
            "-v",
            "build",
            "a.png",
            "b.jpg",
            "--query",
            "?limit=0",
            "--debug",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Build(args) => {
                assert_eq!(args.files, vec!["a.png", "b.jpg"]);
                assert_eq!(args.query.as_deref(), Some("?limit=0"));
                assert!(args.debug);
            }
            _ => panic!("expected build"),
        }
    }

    #[tokio::test]
    async fn missing_input_is_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let ok = tmp.path().join("ok.bin");
        std::fs::write(&ok, b"small payload").unwrap();
        let missing = tmp.path().join("missing.png");

        let args = BuildArgs {
            files: vec![
                ok.display().to_string(),
                missing.display().to_string(),
            ],
            output: Some(tmp.path().join("dist")),
            root: Some(tmp.path().to_path_buf()),
            query: None,
            debug: false,
            concurrency: Some(2),
        };
        let loaded = LoadedConfig {
            config: ToolConfig::default(),
            ignored_keys: Vec::new(),
        };

        let summary = build(args, loaded).await.unwrap();
        assert_eq!(
            summary,
            BuildSummary {
                inlined: 1,
                failed: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn read_failure_names_the_path() {
        let ctx = LoaderContext::without_emitter();
        let path = PathBuf::from("/nonexistent/asset-webp/a.png");
        let (bytes, result) =
            process_file(&ctx, path, String::new(), Arc::new(RustCompressor::new())).await;
        assert_eq!(bytes, 0);
        let err = result.unwrap_err();
        assert!(matches!(err, LoaderError::Read { .. }));
        assert!(err.to_string().starts_with("Could not read /nonexistent/asset-webp/a.png:"));
    }

    #[test]
    fn build_requires_files() {
        assert!(Cli::try_parse_from(["asset-webp", "build"]).is_err());
    }
}
