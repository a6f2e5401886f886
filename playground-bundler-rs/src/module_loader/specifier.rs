//! Classification of import specifiers and module identities.

use crate::error::{BundlerError, BundlerResult};
use regex::Regex;
use std::fmt;
use url::Url;

lazy_static! {
    static ref BARE_SPECIFIER_RE: Regex =
        Regex::new(r"^(?P<name>(?:@[^/@]+/)?[^/@#.][^/]*)(?P<subpath>/.*)?$").unwrap();
}

/// Modules whose source is synthesized rather than fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualModule {
    /// `esm-env`: build-time environment flags.
    EnvShim,
    /// Generated entry that re-exports the framework primitives and the component.
    Entry,
    /// The user's component, compiled on load.
    Component,
}

impl VirtualModule {
    pub const ALL: [VirtualModule; 3] = [
        VirtualModule::EnvShim,
        VirtualModule::Entry,
        VirtualModule::Component,
    ];

    pub fn id(self) -> &'static str {
        match self {
            VirtualModule::EnvShim => "esm-env",
            VirtualModule::Entry => "./__entry.js",
            VirtualModule::Component => "./App.svelte",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|module| module.id() == id)
    }
}

/// Canonical key of a module in the build graph.
///
/// Two specifiers naming the same module must produce equal identities, so
/// URL identities are always post-redirect URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleId {
    Virtual(VirtualModule),
    Url(Url),
}

impl ModuleId {
    pub fn parse(id: &str) -> Option<Self> {
        if let Some(module) = VirtualModule::from_id(id) {
            return Some(ModuleId::Virtual(module));
        }
        Url::parse(id).ok().map(ModuleId::Url)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ModuleId::Virtual(module) => module.id(),
            ModuleId::Url(url) => url.as_str(),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bare package specifier split into package name and export-map subpath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BareSpecifier {
    /// `name` or `@scope/name`.
    pub name: String,
    /// `.` for the package root, otherwise `./<rest>`.
    pub subpath: String,
}

impl BareSpecifier {
    pub fn parse(specifier: &str) -> Option<Self> {
        let caps = BARE_SPECIFIER_RE.captures(specifier)?;
        let name = caps.name("name")?.as_str().to_string();
        let subpath = match caps.name("subpath").map(|m| m.as_str()) {
            None | Some("/") => ".".to_string(),
            Some(rest) => format!(".{rest}"),
        };
        Some(Self { name, subpath })
    }
}

/// The class a specifier falls into, decided once before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier<'a> {
    Virtual(VirtualModule),
    /// A relative or absolute URL, already joined against its importer.
    Url(Url),
    /// The framework runtime itself; `subpath` is what follows `<package>/`.
    Framework { subpath: &'a str },
    Package(BareSpecifier),
}

// Covers `.` and `..` as well as `./x` and `../x`; package names never start with a dot.
fn is_relative(specifier: &str) -> bool {
    specifier.starts_with('.') || specifier.starts_with('/')
}

pub fn classify<'a>(
    specifier: &'a str,
    importer: Option<&str>,
    framework_package: &str,
) -> BundlerResult<Specifier<'a>> {
    if let Some(module) = VirtualModule::from_id(specifier) {
        return Ok(Specifier::Virtual(module));
    }

    if is_relative(specifier) {
        let Some(importer) = importer else {
            return Err(BundlerError::unresolved(
                specifier,
                None,
                "relative import without an importer",
            ));
        };
        // Virtual and compiler-managed modules have no URL to resolve against.
        let base = Url::parse(importer).map_err(|_| {
            BundlerError::unresolved(specifier, Some(importer), "importer is not a URL")
        })?;
        let joined = base
            .join(specifier)
            .map_err(|err| BundlerError::unresolved(specifier, Some(importer), err))?;
        return Ok(Specifier::Url(joined));
    }

    if let Ok(url) = Url::parse(specifier) {
        if matches!(url.scheme(), "http" | "https") {
            return Ok(Specifier::Url(url));
        }
        return Err(BundlerError::InvalidSpecifier(specifier.to_string()));
    }

    if specifier == framework_package {
        return Ok(Specifier::Framework { subpath: "" });
    }
    if let Some(subpath) = specifier
        .strip_prefix(framework_package)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        return Ok(Specifier::Framework { subpath });
    }

    BareSpecifier::parse(specifier)
        .map(Specifier::Package)
        .ok_or_else(|| BundlerError::InvalidSpecifier(specifier.to_string()))
}
