//! Runtime configuration for the bundler.
//!
//! Every field has a default matching the public playground deployment, so an
//! empty JSON object is a valid configuration file.

use crate::fetch::CachePolicy;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

lazy_static! {
    static ref DEFAULT_REGISTRY_URL: Url =
        Url::parse("https://unpkg.com/").expect("valid default registry url");
    static ref DEFAULT_FRAMEWORK_ROOT: Url =
        Url::parse("https://unpkg.com/svelte@next/src/").expect("valid default framework url");
}

pub static PLAYGROUND_USER_AGENT: &str =
    concat!("playground-bundler/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BundlerConfig {
    /// Base URL of the CDN that mirrors the package registry.
    pub registry_url: Url,
    pub framework: FrameworkRuntime,
    /// Export-map conditions, in addition to the always-active `default`.
    pub conditions: Vec<String>,
    pub legacy_entry: LegacyEntryPolicy,
    pub env: EnvFlags,
    pub minify: bool,
    pub cache_capacity: Option<usize>,
    pub cache_ttl_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.clone(),
            framework: FrameworkRuntime::default(),
            conditions: ["browser", "svelte", "production", "import"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            legacy_entry: LegacyEntryPolicy::default(),
            env: EnvFlags::default(),
            minify: false,
            cache_capacity: None,
            cache_ttl_secs: None,
            user_agent: PLAYGROUND_USER_AGENT.to_string(),
        }
    }
}

impl BundlerConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(text)?;
        Ok(config.normalized())
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Ensures base URLs end with `/` so joining keeps their last segment.
    pub fn normalized(mut self) -> Self {
        self.registry_url = with_trailing_slash(self.registry_url);
        self.framework.source_root = with_trailing_slash(self.framework.source_root);
        self
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            capacity: self.cache_capacity,
            ttl: self.cache_ttl_secs.map(Duration::from_secs),
        }
    }
}

/// Maps the UI framework's own package onto its served source tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrameworkRuntime {
    pub package: String,
    pub source_root: Url,
    /// File served for the bare package name with no subpath.
    pub default_entry: String,
}

impl Default for FrameworkRuntime {
    fn default() -> Self {
        Self {
            package: "svelte".to_string(),
            source_root: DEFAULT_FRAMEWORK_ROOT.clone(),
            default_entry: "index-client.js".to_string(),
        }
    }
}

/// What to do with a package whose manifest has no `exports` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyEntryPolicy {
    /// Use `browser`, `module`, `main` and finally `index.js` for the root,
    /// and the literal file path for subpaths.
    #[default]
    MainFields,
    /// Treat the package as unresolvable.
    Reject,
}

/// Values exported by the environment shim module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EnvFlags {
    pub browser: bool,
    pub dev: bool,
}

impl Default for EnvFlags {
    fn default() -> Self {
        Self {
            browser: true,
            dev: true,
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
