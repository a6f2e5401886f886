mod common;

use common::{TestHttpResponse, TestHttpServer};
use playground_bundler_rs::compiler::{
    CompileError, CompileOptions, CompiledComponent, ComponentCompiler,
};
use playground_bundler_rs::{BundlerConfig, BundlerError, PlaygroundBundler};
use std::sync::Arc;
use url::Url;

/// Stands in for the component compiler with a fixed compiled module.
struct FixedCompiler {
    js: String,
}

const COMPILED_APP: &str = r#"import { mount } from "svelte";
import { tag } from "svelte/internal/client";
import clsx from "clsx";
export default function App(target) {
    target.textContent = clsx("hello from App", tag);
    return mount;
}
"#;

impl ComponentCompiler for FixedCompiler {
    fn compile(
        &self,
        source: &str,
        _options: &CompileOptions,
    ) -> Result<CompiledComponent, CompileError> {
        if source.trim().is_empty() {
            return Err(CompileError::Rejected("empty component".to_string()));
        }
        Ok(CompiledComponent {
            js: self.js.clone(),
        })
    }
}

fn cdn() -> TestHttpServer {
    TestHttpServer::new(vec![
        (
            "/svelte/src/index-client.js",
            TestHttpResponse::ok_js(
                r#"export { untrack } from "./internal/client/util.js";
export function mount(component, options) { return component(options.target); }
export function unmount() {}
"#,
            ),
        ),
        (
            "/svelte/src/internal/client",
            TestHttpResponse::redirect("/svelte/src/internal/client/index.js"),
        ),
        (
            "/svelte/src/internal/client/index.js",
            TestHttpResponse::ok_js(
                r#"export { untrack as helper } from "./util.js";
export const tag = "client-runtime";
"#,
            ),
        ),
        (
            "/svelte/src/internal/client/util.js",
            TestHttpResponse::ok_js(
                r#"import { DEV } from "esm-env";
export const dev_mode = DEV;
export function untrack(fn) { return fn(); }
"#,
            ),
        ),
        (
            "/npm/clsx/package.json",
            TestHttpResponse::redirect("/npm/clsx@2.1.1/package.json"),
        ),
        (
            "/npm/clsx@2.1.1/package.json",
            TestHttpResponse::ok_json(
                r#"{"name": "clsx", "version": "2.1.1", "exports": {".": {"import": "./dist/clsx.mjs", "default": "./dist/clsx.js"}}}"#,
            ),
        ),
        (
            "/npm/clsx@2.1.1/dist/clsx.mjs",
            TestHttpResponse::ok_js(
                "export default function clsx(...parts) { return parts.filter(Boolean).join(' '); }\n",
            ),
        ),
        (
            "/lib@2/lazy.js",
            TestHttpResponse::ok_js("export const lazy = \"LAZY\";\n"),
        ),
    ])
}

fn bundler(server: &TestHttpServer) -> PlaygroundBundler {
    bundler_for(server, COMPILED_APP.to_string())
}

fn bundler_for(server: &TestHttpServer, js: String) -> PlaygroundBundler {
    let mut config = BundlerConfig {
        registry_url: Url::parse(&server.url("/npm/")).unwrap(),
        ..Default::default()
    };
    config.framework.source_root = Url::parse(&server.url("/svelte/src/")).unwrap();
    PlaygroundBundler::new(config, Arc::new(FixedCompiler { js })).unwrap()
}

#[tokio::test]
async fn test_bundle_component_with_cdn_dependencies() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = cdn();
    let bundler = bundler(&server);

    let code = bundler.compile("<h1>hello</h1>").await.unwrap();
    assert!(code.contains("hello from App"), "{code}");
    assert!(code.contains("client-runtime"), "{code}");
    assert!(code.contains("filter(Boolean)"), "{code}");
    assert!(!code.contains("from \""), "{code}");
    assert!(!code.contains("import.meta"), "{code}");

    // Resolution canonicalized each module; loading reused the fetch.
    assert_eq!(server.hits("/npm/clsx@2.1.1/dist/clsx.mjs"), 1);
    assert_eq!(server.hits("/svelte/src/internal/client/util.js"), 1);
    assert_eq!(server.hits("/npm/clsx/package.json"), 1);

    let again = bundler.compile("<h1>hello</h1>").await.unwrap();
    assert_eq!(code, again);
    assert_eq!(server.hits("/npm/clsx/package.json"), 1);
}

#[tokio::test]
async fn test_compile_failure_is_reported() {
    let server = cdn();
    let bundler = bundler(&server);
    let err = bundler.compile("   ").await.unwrap_err();
    assert!(matches!(err, BundlerError::Compile(_)), "{err:?}");
    assert!(err.to_string().contains("empty component"));
}

#[tokio::test]
async fn test_missing_package_is_unresolved() {
    let server = TestHttpServer::new(vec![(
        "/svelte/src/index-client.js",
        TestHttpResponse::ok_js(
            "export function mount() {}\nexport function unmount() {}\nexport function untrack() {}\n",
        ),
    )]);
    let bundler = bundler(&server);
    let err = bundler.compile("<h1>hello</h1>").await.unwrap_err();
    assert!(
        matches!(err, BundlerError::UnresolvedImport { .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_dynamic_import_is_inlined() {
    let server = cdn();
    let lazy_url = server.url("/lib@2/lazy.js");
    let bundler = bundler_for(
        &server,
        format!(
            r#"export default async function App() {{
    const m = await import("{lazy_url}");
    return m.lazy;
}}
"#
        ),
    );

    let code = bundler.compile("<h1>lazy</h1>").await.unwrap();
    assert!(code.contains("LAZY"), "{code}");
    assert!(!code.contains("import("), "{code}");
    assert!(!code.contains(&lazy_url), "{code}");
    assert_eq!(server.hits("/lib@2/lazy.js"), 1);
}

#[tokio::test]
async fn test_non_literal_dynamic_import_fails_to_link() {
    let server = cdn();
    let bundler = bundler_for(
        &server,
        "export default function App(name) { return import(name); }\n".to_string(),
    );
    let err = bundler.compile("<h1>lazy</h1>").await.unwrap_err();
    assert!(matches!(err, BundlerError::Link(_)), "{err:?}");
    assert!(err.to_string().contains("non-literal"), "{err}");
}
