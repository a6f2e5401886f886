//! Import resolution.

use super::manifest::{Conditions, ManifestCache};
use super::specifier::{classify, BareSpecifier, ModuleId, Specifier};
use crate::config::BundlerConfig;
use crate::error::{BundlerError, BundlerResult};
use crate::fetch::FetchCache;
use anyhow::{anyhow, Context};
use log::debug;
use std::rc::Rc;
use url::Url;

/// Maps `(specifier, importer)` pairs to canonical module identities.
pub struct ImportResolver {
    config: Rc<BundlerConfig>,
    cache: Rc<FetchCache>,
    manifests: Rc<ManifestCache>,
    conditions: Conditions,
}

impl ImportResolver {
    pub fn new(
        config: Rc<BundlerConfig>,
        cache: Rc<FetchCache>,
        manifests: Rc<ManifestCache>,
    ) -> Self {
        let conditions = Conditions::new(config.conditions.iter().cloned());
        Self {
            config,
            cache,
            manifests,
            conditions,
        }
    }

    pub async fn resolve(
        &self,
        specifier: &str,
        importer: Option<&str>,
    ) -> BundlerResult<ModuleId> {
        let resolved = match classify(specifier, importer, &self.config.framework.package)? {
            Specifier::Virtual(module) => return Ok(ModuleId::Virtual(module)),
            Specifier::Url(url) => self.canonicalize(&url).await,
            Specifier::Framework { subpath } => self.resolve_framework(subpath).await,
            Specifier::Package(bare) => self.resolve_package(&bare).await,
        };

        match resolved {
            Ok(url) => {
                debug!("{specifier} ({}) -> {url}", importer.unwrap_or("<entry>"));
                Ok(ModuleId::Url(url))
            }
            Err(err) => Err(BundlerError::unresolved(
                specifier,
                importer,
                format!("{err:#}"),
            )),
        }
    }

    async fn canonicalize(&self, url: &Url) -> anyhow::Result<Url> {
        Ok(self.cache.follow_redirects(url).await?)
    }

    async fn resolve_framework(&self, subpath: &str) -> anyhow::Result<Url> {
        let framework = &self.config.framework;
        let path = if subpath.is_empty() {
            framework.default_entry.as_str()
        } else {
            subpath
        };
        let url = framework.source_root.join(path)?;
        self.canonicalize(&url).await
    }

    async fn resolve_package(&self, bare: &BareSpecifier) -> anyhow::Result<Url> {
        let descriptor_url = self
            .config
            .registry_url
            .join(&format!("{}/package.json", bare.name))?;
        let descriptor = self
            .cache
            .fetch_if_uncached(&descriptor_url)
            .await
            .with_context(|| format!("fetching package descriptor for {}", bare.name))?;

        let manifest = self
            .manifests
            .get_or_parse(descriptor.url.as_str(), &descriptor.body)
            .with_context(|| format!("parsing {}", descriptor.url))?;

        let entry = manifest
            .resolve_entry(&bare.subpath, &self.conditions, self.config.legacy_entry)
            .ok_or_else(|| {
                anyhow!(
                    "{} does not export {} for conditions [{}]",
                    bare.name,
                    bare.subpath,
                    self.config.conditions.join(", ")
                )
            })?;

        // Relative to the versioned package root the descriptor redirected to.
        let package_root = descriptor.url.join("./")?;
        let target = package_root.join(&entry)?;
        self.canonicalize(&target).await
    }
}
