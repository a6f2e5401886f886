//! `deno_graph` adapter for a [`BundlePlugin`].
//!
//! `deno_graph` resolves specifiers synchronously, while plugin resolution
//! needs the network. The resolver therefore encodes each
//! `(specifier, importer)` pair into a deferred URL; when the graph asks the
//! loader for that URL, the plugin resolves it and the loader answers with a
//! redirect to the canonical identity. The graph records the redirect, so
//! every specifier that resolves to one identity shares one module slot.

use super::BundlePlugin;
use anyhow::anyhow;
use deno_graph::source::{
    LoadError, LoadFuture, LoadOptions, LoadResponse, Loader, ResolutionKind, ResolveError,
    Resolver,
};
use deno_graph::{ModuleSpecifier, Range};
use log::debug;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

lazy_static! {
    static ref DEFERRED_BASE: ModuleSpecifier =
        ModuleSpecifier::parse("playground-resolve://deferred/").unwrap();
    static ref VIRTUAL_BASE: ModuleSpecifier =
        ModuleSpecifier::parse("playground-virtual://module/").unwrap();
}

/// URL standing for "whatever `specifier` resolves to from `importer`".
pub fn deferred_specifier(specifier: &str, importer: Option<&str>) -> ModuleSpecifier {
    let mut url = DEFERRED_BASE.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("specifier", specifier);
        if let Some(importer) = importer {
            query.append_pair("importer", importer);
        }
    }
    url
}

fn parse_deferred(url: &ModuleSpecifier) -> Option<(String, Option<String>)> {
    if url.scheme() != DEFERRED_BASE.scheme() {
        return None;
    }
    let mut specifier = None;
    let mut importer = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "specifier" => specifier = Some(value.into_owned()),
            "importer" => importer = Some(value.into_owned()),
            _ => {}
        }
    }
    specifier.map(|specifier| (specifier, importer))
}

/// Graph specifier for a plugin identity. Identities that are not URLs
/// (virtual modules) are wrapped in a private scheme.
pub fn identity_to_specifier(id: &str) -> ModuleSpecifier {
    match ModuleSpecifier::parse(id) {
        Ok(url) => url,
        Err(_) => {
            let mut url = VIRTUAL_BASE.clone();
            url.query_pairs_mut().append_pair("id", id);
            url
        }
    }
}

/// Inverse of [`identity_to_specifier`].
pub fn specifier_to_identity(specifier: &ModuleSpecifier) -> String {
    if specifier.scheme() == VIRTUAL_BASE.scheme() {
        if let Some((_, id)) = specifier.query_pairs().find(|(key, _)| key == "id") {
            return id.into_owned();
        }
    }
    specifier.to_string()
}

/// Resolver that defers every specifier to the loader.
#[derive(Debug, Default)]
pub struct DeferredResolver;

impl DeferredResolver {
    pub fn as_resolver(&self) -> &dyn Resolver {
        self
    }
}

impl Resolver for DeferredResolver {
    fn resolve(
        &self,
        specifier_text: &str,
        referrer_range: &Range,
        _kind: ResolutionKind,
    ) -> Result<ModuleSpecifier, ResolveError> {
        let importer = specifier_to_identity(&referrer_range.specifier);
        Ok(deferred_specifier(specifier_text, Some(&importer)))
    }
}

/// Loader that answers deferred URLs with plugin resolutions and everything
/// else with plugin loads.
pub struct PluginGraphLoader {
    plugin: Rc<dyn BundlePlugin>,
}

impl PluginGraphLoader {
    pub fn new(plugin: Rc<dyn BundlePlugin>) -> Self {
        Self { plugin }
    }
}

fn load_error(err: anyhow::Error) -> LoadError {
    LoadError::Other(Arc::new(io::Error::new(
        io::ErrorKind::Other,
        format!("{err:#}"),
    )))
}

fn headers_for(specifier: &ModuleSpecifier) -> HashMap<String, String> {
    let content_type = if specifier.path().ends_with(".json") {
        "application/json"
    } else {
        "application/javascript"
    };
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), content_type.to_string());
    headers
}

impl Loader for PluginGraphLoader {
    fn load(&self, specifier: &ModuleSpecifier, _options: LoadOptions) -> LoadFuture {
        let plugin = self.plugin.clone();
        let specifier = specifier.clone();

        Box::pin(async move {
            if let Some((text, importer)) = parse_deferred(&specifier) {
                let resolved = plugin
                    .resolve_id(&text, importer.as_deref())
                    .await
                    .map_err(load_error)?;
                let Some(id) = resolved else {
                    return Err(load_error(anyhow!(
                        "plugin `{}` could not resolve `{}`",
                        plugin.name(),
                        text
                    )));
                };
                debug!("resolved {text} -> {id}");
                return Ok(Some(LoadResponse::Redirect {
                    specifier: identity_to_specifier(&id),
                }));
            }

            let id = specifier_to_identity(&specifier);
            match plugin.load(&id).await.map_err(load_error)? {
                Some(code) => Ok(Some(LoadResponse::Module {
                    maybe_headers: Some(headers_for(&specifier)),
                    specifier,
                    content: Arc::from(code.into_bytes()),
                    mtime: None,
                })),
                None => Ok(None),
            }
        })
    }
}
