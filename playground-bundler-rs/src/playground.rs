//! Build orchestration.

use crate::bundler::{BundleEngine, BundleOptions, BundleType, SwcBundleEngine};
use crate::compiler::ComponentCompiler;
use crate::config::BundlerConfig;
use crate::error::{BundlerError, BundlerResult};
use crate::fetch::{FetchCache, ReqwestTransport, Transport};
use crate::module_loader::{
    ContentLoader, ImportResolver, ManifestCache, PlaygroundPlugin, VirtualModule,
};
use crate::protocol::{WorkerRequest, WorkerResponse};
use log::{error, info};
use std::rc::Rc;
use std::sync::Arc;

/// Turns component source into a bundled script.
///
/// The fetch cache and parsed manifests outlive individual builds, so later
/// builds reuse everything earlier ones fetched. Builds may overlap; they
/// share in-flight fetches.
pub struct PlaygroundBundler {
    config: Rc<BundlerConfig>,
    cache: Rc<FetchCache>,
    manifests: Rc<ManifestCache>,
    compiler: Arc<dyn ComponentCompiler>,
    engine: Rc<dyn BundleEngine>,
}

impl PlaygroundBundler {
    pub fn new(
        config: BundlerConfig,
        compiler: Arc<dyn ComponentCompiler>,
    ) -> Result<Self, reqwest::Error> {
        let transport = ReqwestTransport::new(&config.user_agent)?;
        Ok(Self::with_parts(
            config,
            Rc::new(transport),
            compiler,
            Rc::new(SwcBundleEngine),
        ))
    }

    pub fn with_parts(
        config: BundlerConfig,
        transport: Rc<dyn Transport>,
        compiler: Arc<dyn ComponentCompiler>,
        engine: Rc<dyn BundleEngine>,
    ) -> Self {
        let cache = Rc::new(FetchCache::new(transport, config.cache_policy()));
        Self {
            config: Rc::new(config),
            cache,
            manifests: Rc::new(ManifestCache::new()),
            compiler,
            engine,
        }
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    pub fn bundle_options(&self) -> BundleOptions {
        BundleOptions {
            bundle_type: BundleType::Classic,
            minify: self.config.minify,
            inline_dynamic_imports: true,
        }
    }

    pub async fn compile(&self, source: &str) -> BundlerResult<String> {
        let resolver = ImportResolver::new(
            self.config.clone(),
            self.cache.clone(),
            self.manifests.clone(),
        );
        let loader = ContentLoader::new(
            self.cache.clone(),
            self.compiler.clone(),
            source.to_string(),
            self.config.env,
            self.config.framework.package.clone(),
        );
        let plugin = Rc::new(PlaygroundPlugin::new(resolver, loader));
        let options = self.bundle_options();

        match self
            .engine
            .bundle(VirtualModule::Entry.id(), plugin.clone(), &options)
            .await
        {
            Ok(emit) => Ok(emit.code),
            Err(err) => Err(plugin
                .take_failure()
                .unwrap_or_else(|| BundlerError::Link(format!("{err:#}")))),
        }
    }

    /// Produces exactly one response per request, failures included.
    pub async fn handle(&self, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::Compile { uid, source } => {
                info!("compiling request {uid}");
                match self.compile(&source).await {
                    Ok(code) => {
                        info!("request {uid} bundled ({} bytes)", code.len());
                        WorkerResponse::code(uid, code)
                    }
                    Err(err) => {
                        error!("request {uid} failed: {err}");
                        WorkerResponse::error(uid, err.to_string())
                    }
                }
            }
        }
    }
}
