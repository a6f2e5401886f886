//! Resolution and loading of playground modules.
//!
//! - `specifier`: specifier classification and module identities
//! - `manifest`: package descriptors and export maps
//! - `resolve`: [`ImportResolver`]
//! - `load`: [`ContentLoader`]
//!
//! [`PlaygroundPlugin`] exposes both to a bundling engine.

mod load;
mod manifest;
mod resolve;
mod specifier;

pub use load::ContentLoader;
pub use manifest::{resolve_exports, Conditions, ManifestCache, PackageManifest};
pub use resolve::ImportResolver;
pub use specifier::{classify, BareSpecifier, ModuleId, Specifier, VirtualModule};

use crate::bundler::BundlePlugin;
use crate::error::{BundlerError, BundlerResult};
use anyhow::anyhow;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::cell::RefCell;

/// Bundle plugin for one build.
///
/// Engines only see error messages, so the first typed failure is kept here
/// for the orchestrator to report.
pub struct PlaygroundPlugin {
    resolver: ImportResolver,
    loader: ContentLoader,
    failure: RefCell<Option<BundlerError>>,
}

impl PlaygroundPlugin {
    pub fn new(resolver: ImportResolver, loader: ContentLoader) -> Self {
        Self {
            resolver,
            loader,
            failure: RefCell::new(None),
        }
    }

    /// The first failure recorded during the build, if any.
    pub fn take_failure(&self) -> Option<BundlerError> {
        self.failure.borrow_mut().take()
    }

    fn record<T>(&self, result: BundlerResult<T>) -> anyhow::Result<T> {
        result.map_err(|err| {
            let message = anyhow!(err.to_string());
            let mut failure = self.failure.borrow_mut();
            if failure.is_none() {
                *failure = Some(err);
            }
            message
        })
    }
}

impl BundlePlugin for PlaygroundPlugin {
    fn name(&self) -> &str {
        "playground"
    }

    fn resolve_id<'a>(
        &'a self,
        specifier: &'a str,
        importer: Option<&'a str>,
    ) -> LocalBoxFuture<'a, anyhow::Result<Option<String>>> {
        async move {
            let id = self.record(self.resolver.resolve(specifier, importer).await)?;
            Ok(Some(id.to_string()))
        }
        .boxed_local()
    }

    fn load<'a>(&'a self, id: &'a str) -> LocalBoxFuture<'a, anyhow::Result<Option<String>>> {
        async move {
            let Some(module) = ModuleId::parse(id) else {
                return Ok(None);
            };
            let code = self.record(self.loader.load(&module).await)?;
            Ok(Some(code))
        }
        .boxed_local()
    }
}
