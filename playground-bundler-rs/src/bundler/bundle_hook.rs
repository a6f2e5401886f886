//! `import.meta` rewriting.
//!
//! A classic script has no `import.meta`, so every access is replaced with a
//! literal object describing the module it came from.

use deno_ast::swc::ast::{Bool, Expr, KeyValueProp, Lit, PropName, Str};
use deno_ast::swc::bundler::{Hook, ModuleRecord};
use deno_ast::swc::common::{FileName, Span};

use super::loader::specifier_to_identity;

pub struct ImportMetaHook;

fn module_url(file_name: &FileName) -> String {
    match file_name {
        FileName::Url(url) => specifier_to_identity(url),
        other => other.to_string(),
    }
}

impl Hook for ImportMetaHook {
    fn get_import_meta_props(
        &self,
        span: Span,
        module_record: &ModuleRecord,
    ) -> Result<Vec<KeyValueProp>, anyhow::Error> {
        Ok(vec![
            // import.meta.url = "<module identity>"
            KeyValueProp {
                key: PropName::Ident("url".into()),
                value: Box::new(Expr::Lit(Lit::Str(Str {
                    span,
                    value: module_url(&module_record.file_name).into(),
                    raw: None,
                }))),
            },
            KeyValueProp {
                key: PropName::Ident("main".into()),
                value: Box::new(Expr::Lit(Lit::Bool(Bool {
                    span,
                    value: module_record.is_entry,
                }))),
            },
        ])
    }
}
