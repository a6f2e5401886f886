//! Module content loading.

use super::specifier::{ModuleId, VirtualModule};
use crate::compiler::{CompileOptions, ComponentCompiler};
use crate::config::EnvFlags;
use crate::error::{BundlerError, BundlerResult};
use crate::fetch::FetchCache;
use log::debug;
use std::rc::Rc;
use std::sync::Arc;

/// Produces source text for resolved identities: synthesized for virtual
/// modules, compiled for the component, fetched for everything else.
pub struct ContentLoader {
    cache: Rc<FetchCache>,
    compiler: Arc<dyn ComponentCompiler>,
    source: String,
    env: EnvFlags,
    framework_package: String,
}

impl ContentLoader {
    pub fn new(
        cache: Rc<FetchCache>,
        compiler: Arc<dyn ComponentCompiler>,
        source: String,
        env: EnvFlags,
        framework_package: String,
    ) -> Self {
        Self {
            cache,
            compiler,
            source,
            env,
            framework_package,
        }
    }

    pub async fn load(&self, id: &ModuleId) -> BundlerResult<String> {
        match id {
            ModuleId::Virtual(VirtualModule::EnvShim) => Ok(env_shim_source(self.env)),
            ModuleId::Virtual(VirtualModule::Entry) => Ok(entry_source(&self.framework_package)),
            ModuleId::Virtual(VirtualModule::Component) => {
                let compiled = self
                    .compiler
                    .compile(&self.source, &CompileOptions::default())
                    .map_err(|err| BundlerError::Compile(err.to_string()))?;
                debug!("compiled component ({} bytes)", compiled.js.len());
                Ok(compiled.js)
            }
            ModuleId::Url(url) => {
                let fetched = self.cache.fetch_if_uncached(url).await?;
                Ok(fetched.body.clone())
            }
        }
    }
}

fn env_shim_source(env: EnvFlags) -> String {
    format!(
        "export const BROWSER = {};\nexport const DEV = {};\n",
        env.browser, env.dev
    )
}

fn entry_source(framework_package: &str) -> String {
    format!(
        "export {{ mount, unmount, untrack }} from \"{framework_package}\";\n\
         export {{ default as App }} from \"{}\";\n",
        VirtualModule::Component.id()
    )
}
