//! Package descriptors and conditional export-map evaluation.

use crate::config::LegacyEntryPolicy;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The parts of a `package.json` the resolver reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub exports: Option<Value>,
    #[serde(default)]
    pub browser: Option<Value>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
}

/// Active export conditions. `default` always matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditions(Vec<String>);

impl Conditions {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, condition: &str) -> bool {
        condition == "default" || self.0.iter().any(|c| c == condition)
    }
}

impl PackageManifest {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Maps a subpath (`.` or `./x`) to a file path relative to the package
    /// root. Packages with an export map are resolved strictly through it.
    pub fn resolve_entry(
        &self,
        subpath: &str,
        conditions: &Conditions,
        legacy: LegacyEntryPolicy,
    ) -> Option<String> {
        match &self.exports {
            Some(exports) => resolve_exports(exports, subpath, conditions),
            None => match legacy {
                LegacyEntryPolicy::MainFields => Some(self.legacy_entry(subpath)),
                LegacyEntryPolicy::Reject => None,
            },
        }
    }

    fn legacy_entry(&self, subpath: &str) -> String {
        if subpath != "." {
            return subpath.to_string();
        }
        let browser = match &self.browser {
            Some(Value::String(path)) => Some(path.as_str()),
            _ => None,
        };
        let entry = browser
            .or(self.module.as_deref())
            .or(self.main.as_deref())
            .unwrap_or("index.js");
        if entry.starts_with("./") {
            entry.to_string()
        } else {
            format!("./{entry}")
        }
    }
}

/// Evaluates an `exports` value for `subpath`.
pub fn resolve_exports(
    exports: &Value,
    subpath: &str,
    conditions: &Conditions,
) -> Option<String> {
    match exports {
        Value::Object(map) if is_subpath_map(map)? => resolve_subpath(map, subpath, conditions),
        // Strings, arrays and condition objects are sugar for `{".": exports}`.
        _ if subpath == "." => resolve_target(exports, None, conditions),
        _ => None,
    }
}

/// `Some(true)` for subpath keys, `Some(false)` for condition keys, `None`
/// when the two are mixed, which makes the map invalid.
fn is_subpath_map(map: &Map<String, Value>) -> Option<bool> {
    let mut keys = map.keys().map(|key| key.starts_with('.'));
    let first = keys.next().unwrap_or(false);
    keys.all(|is_subpath| is_subpath == first).then_some(first)
}

fn resolve_subpath(
    map: &Map<String, Value>,
    subpath: &str,
    conditions: &Conditions,
) -> Option<String> {
    if let Some(target) = map.get(subpath) {
        if !subpath.contains('*') {
            return resolve_target(target, None, conditions);
        }
    }

    // Pattern keys: the longest prefix before `*` wins, then the longest key.
    let mut best: Option<(&str, &Value, &str)> = None;
    for (key, target) in map {
        let Some((prefix, suffix)) = key.split_once('*') else {
            continue;
        };
        if suffix.contains('*') || subpath.len() < prefix.len() + suffix.len() {
            continue;
        }
        if let Some(captured) = subpath
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
        {
            if best.map_or(true, |(best_key, _, _)| pattern_key_outranks(key, best_key)) {
                best = Some((key.as_str(), target, captured));
            }
        }
    }
    let (_, target, captured) = best?;
    resolve_target(target, Some(captured), conditions)
}

fn pattern_key_outranks(key: &str, other: &str) -> bool {
    (pattern_prefix_len(key), key.len()) > (pattern_prefix_len(other), other.len())
}

fn pattern_prefix_len(key: &str) -> usize {
    key.find('*').unwrap_or(key.len())
}

fn resolve_target(
    target: &Value,
    captured: Option<&str>,
    conditions: &Conditions,
) -> Option<String> {
    match target {
        Value::String(path) => {
            if !path.starts_with("./") {
                return None;
            }
            Some(match captured {
                Some(captured) => path.replace('*', captured),
                None => path.clone(),
            })
        }
        Value::Array(alternatives) => alternatives
            .iter()
            .find_map(|alternative| resolve_target(alternative, captured, conditions)),
        Value::Object(branches) => branches
            .iter()
            .filter(|(condition, _)| conditions.matches(condition))
            .find_map(|(_, branch)| resolve_target(branch, captured, conditions)),
        _ => None,
    }
}

/// Parsed manifests keyed by canonical descriptor URL, shared across builds.
#[derive(Default)]
pub struct ManifestCache {
    manifests: RefCell<HashMap<String, Rc<PackageManifest>>>,
}

impl ManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_parse(
        &self,
        descriptor_url: &str,
        body: &str,
    ) -> Result<Rc<PackageManifest>, serde_json::Error> {
        if let Some(manifest) = self.manifests.borrow().get(descriptor_url) {
            return Ok(manifest.clone());
        }
        let manifest = Rc::new(PackageManifest::from_json(body)?);
        self.manifests
            .borrow_mut()
            .insert(descriptor_url.to_string(), manifest.clone());
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.manifests.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
