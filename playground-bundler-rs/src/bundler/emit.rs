//! Graph building and SWC linking.
//!
//! A bundle is produced in two passes:
//! 1. `deno_graph` walks the module graph, asking the plugin to resolve and load
//! 2. SWC parses every graph module, hoists dynamic imports when they are to
//!    be inlined, and links everything into a single script

use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{anyhow, bail};
use deno_ast::swc::ast::EsVersion;
use deno_ast::swc::bundler::{Bundler, Config as SwcConfig, Load, ModuleData, Resolve};
use deno_ast::swc::codegen::text_writer::JsWriter;
use deno_ast::swc::codegen::{Config as CodegenConfig, Emitter};
use deno_ast::swc::common::comments::SingleThreadedComments;
use deno_ast::swc::common::sync::Lrc;
use deno_ast::swc::common::{FileName, Globals, SourceMap, GLOBALS};
use deno_ast::swc::loader::resolve::Resolution;
use deno_ast::swc::parser::lexer::Lexer;
use deno_ast::swc::parser::{EsSyntax, Parser, StringInput, Syntax};
use deno_ast::MediaType;
use deno_graph::{
    BuildOptions, CheckJsOption, GraphKind, Module, ModuleGraph, ModuleSpecifier, WalkOptions,
};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use log::{debug, warn};

use super::bundle_hook::ImportMetaHook;
use super::dynamic_import::inline_dynamic_imports;
use super::loader::{deferred_specifier, DeferredResolver, PluginGraphLoader};
use super::{BundleEmit, BundleEngine, BundleOptions, BundlePlugin};

/// [`BundleEngine`] backed by `deno_graph` and the SWC bundler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SwcBundleEngine;

impl BundleEngine for SwcBundleEngine {
    fn bundle<'a>(
        &'a self,
        entry: &'a str,
        plugin: Rc<dyn BundlePlugin>,
        options: &'a BundleOptions,
    ) -> LocalBoxFuture<'a, anyhow::Result<BundleEmit>> {
        async move {
            let loader = PluginGraphLoader::new(plugin);
            let resolver = DeferredResolver;

            let mut graph = ModuleGraph::new(GraphKind::CodeOnly);
            graph
                .build(
                    vec![deferred_specifier(entry, None)],
                    vec![],
                    &loader,
                    BuildOptions {
                        resolver: Some(resolver.as_resolver()),
                        ..Default::default()
                    },
                )
                .await;

            if options.inline_dynamic_imports {
                // Dynamically imported modules end up in the chunk too.
                graph
                    .walk(
                        graph.roots.iter(),
                        WalkOptions {
                            check_js: CheckJsOption::True,
                            kind: GraphKind::CodeOnly,
                            follow_dynamic: true,
                            prefer_fast_check_graph: false,
                        },
                    )
                    .validate()?;
            } else {
                graph.valid()?;
            }
            debug!("module graph holds {} modules", graph.modules().count());

            bundle_graph(&graph, options)
        }
        .boxed_local()
    }
}

/// Links a fully loaded module graph into a single JavaScript file.
pub fn bundle_graph(graph: &ModuleGraph, options: &BundleOptions) -> anyhow::Result<BundleEmit> {
    let globals = Globals::new();

    GLOBALS.set(&globals, || {
        let source_map = Lrc::new(SourceMap::default());

        let bundle_loader = SWCBundleLoader {
            graph,
            source_map: source_map.clone(),
            inline_dynamic_imports: options.inline_dynamic_imports,
        };
        let bundle_resolver = SWCBundleResolver { graph };

        let config = SwcConfig {
            module: options.bundle_type.into(),
            ..Default::default()
        };

        let mut bundler = Bundler::new(
            &globals,
            source_map.clone(),
            bundle_loader,
            bundle_resolver,
            config,
            Box::new(ImportMetaHook),
        );

        let Some(root) = graph.roots.first() else {
            bail!("No root module in graph");
        };
        let mut entries = HashMap::new();
        entries.insert(
            "bundle".to_string(),
            FileName::Url(graph.resolve(root).clone()),
        );

        let bundles = bundler.bundle(entries)?;
        if bundles.is_empty() {
            bail!("Bundler produced no output");
        }
        if bundles.len() > 1 {
            if options.inline_dynamic_imports {
                bail!(
                    "Bundle split into {} chunks but dynamic imports must be inlined",
                    bundles.len()
                );
            }
            warn!("Discarding {} extra chunks", bundles.len() - 1);
        }

        let mut buf = Vec::new();
        {
            let cfg = CodegenConfig::default()
                .with_minify(options.minify)
                .with_target(EsVersion::Es2020)
                .with_omit_last_semi(false);

            let mut emitter = Emitter {
                cfg,
                cm: source_map.clone(),
                comments: None,
                wr: Box::new(JsWriter::new(source_map.clone(), "\n", &mut buf, None)),
            };

            emitter.emit_module(&bundles[0].module)?;
        }

        Ok(BundleEmit {
            code: String::from_utf8(buf)?,
        })
    })
}

struct SWCBundleLoader<'a> {
    graph: &'a ModuleGraph,
    source_map: Lrc<SourceMap>,
    inline_dynamic_imports: bool,
}

impl<'a> Load for SWCBundleLoader<'a> {
    fn load(&self, file: &FileName) -> Result<ModuleData, anyhow::Error> {
        let specifier = match file {
            FileName::Url(url) => url,
            _ => bail!("Unsupported file name: {:?}", file),
        };

        let module = self
            .graph
            .get(specifier)
            .ok_or_else(|| anyhow!("Module not found in graph: {}", specifier))?;

        let (source, media_type) = match module {
            Module::Js(m) => (m.source.text.as_ref(), m.media_type),
            Module::Json(m) => (m.source.text.as_ref(), m.media_type),
            _ => bail!("Module {} cannot be bundled", specifier),
        };

        let (source_file, mut swc_module) =
            parse_module(specifier, source, media_type, &self.source_map)?;
        if self.inline_dynamic_imports {
            let hoisted = inline_dynamic_imports(&mut swc_module)
                .map_err(|err| anyhow!("{specifier}: {err}"))?;
            if hoisted > 0 {
                debug!("inlined {hoisted} dynamic import target(s) of {specifier}");
            }
        }

        Ok(ModuleData {
            fm: source_file,
            module: swc_module,
            helpers: Default::default(),
        })
    }
}

struct SWCBundleResolver<'a> {
    graph: &'a ModuleGraph,
}

impl<'a> Resolve for SWCBundleResolver<'a> {
    fn resolve(
        &self,
        base: &FileName,
        module_specifier: &str,
    ) -> Result<Resolution, anyhow::Error> {
        let base_specifier = match base {
            FileName::Url(url) => url,
            _ => bail!("Unsupported base file name: {:?}", base),
        };

        // Dependencies point at deferred URLs; the graph maps them to the
        // canonical module through the recorded redirect.
        let deferred = self
            .graph
            .resolve_dependency(module_specifier, base_specifier, false)
            .ok_or_else(|| {
                anyhow!(
                    "Failed to resolve '{}' from '{}'",
                    module_specifier,
                    base_specifier
                )
            })?;

        Ok(Resolution {
            filename: FileName::Url(self.graph.resolve(deferred).clone()),
            slug: None,
        })
    }
}

/// Wraps JSON text as a module whose default export is the parsed value.
fn json_module_source(source: &str) -> anyhow::Result<String> {
    let literal = serde_json::to_string(source)?;
    Ok(format!("export default JSON.parse({literal});"))
}

pub(super) fn parse_module(
    specifier: &ModuleSpecifier,
    source: &str,
    media_type: MediaType,
    source_map: &Lrc<SourceMap>,
) -> Result<
    (
        Rc<deno_ast::swc::common::SourceFile>,
        deno_ast::swc::ast::Module,
    ),
    anyhow::Error,
> {
    let source = source.strip_prefix('\u{FEFF}').unwrap_or(source);
    let source = if media_type == MediaType::Json {
        json_module_source(source)?
    } else {
        source.to_string()
    };

    let source_file =
        source_map.new_source_file(FileName::Url(specifier.clone()).into(), source.clone());

    // Compiled components and CDN sources are plain modern JavaScript.
    let syntax = Syntax::Es(EsSyntax::default());

    let comments = SingleThreadedComments::default();
    let input = StringInput::from(&*source_file);
    let lexer = Lexer::new(syntax, EsVersion::EsNext, input, Some(&comments));
    let mut parser = Parser::new_from(lexer);

    let module = parser
        .parse_module()
        .map_err(|e| anyhow!("Parse error in {}: {:?}", specifier, e))?;

    Ok((Rc::new((*source_file).clone()), module))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_module_source_escapes_text() {
        let source = json_module_source("{\"key\": \"line\nbreak\"}").unwrap();
        assert_eq!(
            source,
            r#"export default JSON.parse("{\"key\": \"line\nbreak\"}");"#
        );
    }
}
