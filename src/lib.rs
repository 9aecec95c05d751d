//! # asset-webp
//!
//! A build-time image asset step for module bundlers. Each image import is
//! either inlined into the bundle as a `data:` URI or emitted as a file with
//! a content-hashed name, in which case a WebP derivative is emitted next to
//! it under the same name with a `.webp` extension.
//!
//! # Architecture: One Task Per Asset
//!
//! Every asset runs through four components in order:
//!
//! ```text
//! 1. Identity   bytes + path + template  →  primary / derivative names
//! 2. Policy     size vs. limit           →  inline data URI, or continue
//! 3. Compress   codec plan (async)       →  WebP bytes, or debug bypass
//! 4. Emit       register artifacts       →  module body
//! ```
//!
//! Identity and policy are pure functions of their inputs. Compression is
//! the only step that suspends: it runs on a blocking worker so a host can
//! drive many assets concurrently on one runtime. Tasks share nothing.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`loader`] | Orchestration: [`loader::load`], [`loader::LoaderContext`], [`loader::RawAsset`] |
//! | [`naming`] | Name template interpolation and derivative names |
//! | [`digest`] | Content fingerprints for `[hash]` tokens |
//! | [`policy`] | Inline-or-emit threshold and data URI construction |
//! | [`compress`] | Compression options, codec plan, [`compress::Compressor`] backends |
//! | [`emit`] | [`emit::FileEmitter`] host capability and module body rendering |
//! | [`options`] | Loader option bag: serde types and query-string parsing |
//! | [`config`] | `asset-webp.toml` loading, merging and validation for the CLI |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Derivative Is Never Referenced
//!
//! The module body always points at the primary (original-format) file.
//! Consumers that want WebP swap the extension, which is why the derivative
//! name differs from the primary only after the last `.`. This keeps the
//! body valid for clients that cannot decode WebP.
//!
//! ## Explicit Host Capabilities
//!
//! The loader never reaches into global state. Everything it needs from the
//! host (options, debug flag, public path, file emission) arrives in a
//! [`loader::LoaderContext`]. A host without file emission is rejected up
//! front with [`loader::LoaderError::HostCapabilityMissing`].
//!
//! ## Absent Versus Falsy Options
//!
//! Every option is `Option<T>` until the consumer fills in its default, so an
//! explicit `0` or `false` is honoured. `limit = 0` inlines everything and
//! `method = 0` selects the fastest WebP method.

pub mod compress;
pub mod config;
pub mod digest;
pub mod emit;
pub mod loader;
pub mod naming;
pub mod options;
pub mod output;
pub mod policy;

pub use loader::{LoaderContext, LoaderError, RawAsset, load};

#[cfg(test)]
pub(crate) mod test_helpers;
