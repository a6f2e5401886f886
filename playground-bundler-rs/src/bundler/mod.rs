//! Module bundling.
//!
//! The resolution pipeline talks to a bundling engine only through the
//! [`BundlePlugin`] contract: the engine asks the plugin to resolve each
//! specifier it discovers and to load each resolved identity, then links the
//! resulting graph into a single script.
//!
//! # Architecture
//!
//! - `loader`: adapts a [`BundlePlugin`] to `deno_graph`'s `Loader` and `Resolver`
//! - `dynamic_import`: hoists `import("...")` targets into the single chunk
//! - `bundle_hook`: rewrites `import.meta` so the output runs as a classic script
//! - `emit`: [`SwcBundleEngine`], graph building and SWC linking

mod bundle_hook;
mod dynamic_import;
mod emit;
mod loader;

use futures::future::LocalBoxFuture;
use std::rc::Rc;

pub use emit::{bundle_graph, SwcBundleEngine};

/// Options for a bundling run.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// The type of bundle output.
    pub bundle_type: BundleType,
    /// Whether to minify the output.
    pub minify: bool,
    /// Require the whole graph, dynamic imports included, in one chunk.
    pub inline_dynamic_imports: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            bundle_type: BundleType::Classic,
            minify: false,
            inline_dynamic_imports: true,
        }
    }
}

/// The type of bundle output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleType {
    /// ES Module output
    Module,
    /// Classic IIFE output
    Classic,
}

impl From<BundleType> for deno_ast::swc::bundler::ModuleType {
    fn from(bt: BundleType) -> Self {
        match bt {
            BundleType::Module => deno_ast::swc::bundler::ModuleType::Es,
            BundleType::Classic => deno_ast::swc::bundler::ModuleType::Iife,
        }
    }
}

/// The result of a bundle operation.
#[derive(Debug)]
pub struct BundleEmit {
    /// The bundled JavaScript code.
    pub code: String,
}

/// Resolution and loading hooks handed to a bundling engine.
///
/// `resolve_id` returns the canonical identity of `specifier` as imported from
/// `importer` (`None` for the entry point). `load` returns the source text of
/// an identity. `Ok(None)` means the plugin has no answer, which the engine
/// reports as a failure.
pub trait BundlePlugin {
    fn name(&self) -> &str;

    fn resolve_id<'a>(
        &'a self,
        specifier: &'a str,
        importer: Option<&'a str>,
    ) -> LocalBoxFuture<'a, anyhow::Result<Option<String>>>;

    fn load<'a>(&'a self, id: &'a str) -> LocalBoxFuture<'a, anyhow::Result<Option<String>>>;
}

/// A module-graph linker that drives a [`BundlePlugin`] from an entry specifier.
pub trait BundleEngine {
    fn bundle<'a>(
        &'a self,
        entry: &'a str,
        plugin: Rc<dyn BundlePlugin>,
        options: &'a BundleOptions,
    ) -> LocalBoxFuture<'a, anyhow::Result<BundleEmit>>;
}
