//! Dynamic import inlining.
//!
//! The output is one chunk, so `import("x")` becomes `Promise.resolve(ns)`
//! where `ns` is bound by a hoisted `import * as ns from "x"`. The linker then
//! treats the target like any static dependency. Targets are evaluated eagerly.

use anyhow::bail;
use deno_ast::swc::ast::{
    CallExpr, Callee, Expr, ExprOrSpread, Ident, IdentName, ImportDecl, ImportSpecifier,
    ImportStarAsSpecifier, Lit, MemberExpr, MemberProp, Module, ModuleDecl, ModuleItem, Str,
};
use deno_ast::swc::atoms::Atom;
use deno_ast::swc::common::{Span, DUMMY_SP};
use deno_ast::swc::ecma_visit::{VisitMut, VisitMutWith};

/// Rewrites every dynamic import in `module` and returns how many distinct
/// targets were hoisted.
pub fn inline_dynamic_imports(module: &mut Module) -> anyhow::Result<usize> {
    let mut inliner = DynamicImportInliner::default();
    module.visit_mut_with(&mut inliner);

    if inliner.non_literal > 0 {
        bail!(
            "{} dynamic import(s) with a non-literal specifier cannot be inlined",
            inliner.non_literal
        );
    }

    let hoisted = inliner.namespaces.len();
    let decls = inliner
        .namespaces
        .into_iter()
        .map(|(specifier, local)| namespace_import(specifier, local));
    module.body.splice(0..0, decls);
    Ok(hoisted)
}

#[derive(Default)]
struct DynamicImportInliner {
    namespaces: Vec<(String, Ident)>,
    non_literal: usize,
}

impl DynamicImportInliner {
    fn namespace_for(&mut self, specifier: String) -> Ident {
        if let Some((_, local)) = self.namespaces.iter().find(|(s, _)| *s == specifier) {
            return local.clone();
        }
        let name = format!("__dynamic_import_{}", self.namespaces.len());
        let local = Ident::from(Atom::from(name));
        self.namespaces.push((specifier, local.clone()));
        local
    }
}

impl VisitMut for DynamicImportInliner {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let Expr::Call(call) = expr else {
            return;
        };
        if !matches!(call.callee, Callee::Import(_)) {
            return;
        }
        let span = call.span;
        let specifier = match call.args.first().map(|arg| &*arg.expr) {
            Some(Expr::Lit(Lit::Str(s))) => s.value.to_atom_lossy().as_str().to_string(),
            _ => {
                self.non_literal += 1;
                return;
            }
        };
        let local = self.namespace_for(specifier);
        *expr = promise_resolve(span, local);
    }
}

fn namespace_import(specifier: String, local: Ident) -> ModuleItem {
    ModuleItem::ModuleDecl(ModuleDecl::Import(ImportDecl {
        span: DUMMY_SP,
        specifiers: vec![ImportSpecifier::Namespace(ImportStarAsSpecifier {
            span: DUMMY_SP,
            local,
        })],
        src: Box::new(Str {
            span: DUMMY_SP,
            value: specifier.into(),
            raw: None,
        }),
        type_only: false,
        with: None,
        phase: Default::default(),
    }))
}

// Promise.resolve(<namespace>)
fn promise_resolve(span: Span, namespace: Ident) -> Expr {
    Expr::Call(CallExpr {
        span,
        ctxt: Default::default(),
        callee: Callee::Expr(Box::new(Expr::Member(MemberExpr {
            span,
            obj: Box::new(Expr::Ident(Ident::from(Atom::from("Promise")))),
            prop: MemberProp::Ident(IdentName::from(Atom::from("resolve"))),
        }))),
        args: vec![ExprOrSpread {
            spread: None,
            expr: Box::new(Expr::Ident(namespace)),
        }],
        type_args: None,
    })
}
