//! Find the modules referenced by a module.
//!
//! ESM imports and exports are collected with `swc_ecma_dep_graph`, calls
//! to `require()`, `require.resolve()` and `import()` are collected by
//! visiting call expressions. A call whose argument is not a string
//! literal cannot be followed statically and is reported as dynamic.

use indexmap::IndexMap;
use serde::Serialize;

use swc_common::{comments::SingleThreadedComments, BytePos};
use swc_ecma_ast::*;
use swc_ecma_dep_graph::analyze_dependencies;
use swc_ecma_visit::{Node, Visit, VisitWith};

const REQUIRE: &str = "require";
const RESOLVE: &str = "resolve";
const IMPORT: &str = "import";

/// Kind of reference to another module.
#[derive(Serialize, Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceKind {
    /// Static `import` or `export ... from` declaration.
    Import,
    /// Call to `require()`.
    Require,
    /// Call to `require.resolve()`.
    Resolve,
    /// Call to `import()`.
    DynamicImport,
}

/// Reference to a module using a string literal specifier.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Reference {
    /// The module specifier.
    pub specifier: String,
    /// How the module was referenced.
    pub kind: ReferenceKind,
}

/// Reference whose specifier is computed at runtime.
#[derive(Debug, Clone)]
pub struct DynamicReference {
    /// How the module was referenced.
    pub kind: ReferenceKind,
    /// Start position of the call expression.
    pub pos: BytePos,
}

/// Result of analyzing a module.
#[derive(Debug, Default)]
pub struct ModuleAnalysis {
    /// Static references without duplicates.
    pub references: Vec<Reference>,
    /// References that could not be analyzed statically.
    pub dynamic: Vec<DynamicReference>,
}

/// Analyze the references of a module.
pub fn analyze_module(
    module: &Module,
    comments: &SingleThreadedComments,
) -> ModuleAnalysis {
    let mut calls = CallAnalysis::default();
    module.visit_children_with(&mut calls);

    let mut references: IndexMap<String, ReferenceKind> = IndexMap::new();
    for reference in calls.references {
        references
            .entry(reference.specifier)
            .or_insert(reference.kind);
    }
    for dep in analyze_dependencies(module, comments) {
        references
            .entry(dep.specifier.to_string())
            .or_insert(ReferenceKind::Import);
    }

    ModuleAnalysis {
        references: references
            .into_iter()
            .map(|(specifier, kind)| Reference { specifier, kind })
            .collect(),
        dynamic: calls.dynamic,
    }
}

#[derive(Default)]
struct CallAnalysis {
    references: Vec<Reference>,
    dynamic: Vec<DynamicReference>,
}

impl Visit for CallAnalysis {
    fn visit_call_expr(&mut self, n: &CallExpr, _: &dyn Node) {
        if let Some(kind) = call_kind(&n.callee) {
            if let Some(arg) = n.args.get(0) {
                match string_literal(&arg.expr) {
                    Some(specifier) => self.references.push(Reference {
                        specifier: specifier.to_string(),
                        kind,
                    }),
                    None => self.dynamic.push(DynamicReference {
                        kind,
                        pos: n.span.lo(),
                    }),
                }
            }
        }
        n.visit_children_with(self);
    }
}

/// Detect a callee that loads a module.
fn call_kind(callee: &ExprOrSuper) -> Option<ReferenceKind> {
    let expr = match callee {
        ExprOrSuper::Expr(expr) => expr,
        _ => return None,
    };
    match &**expr {
        Expr::Ident(id) if id.sym.as_ref() == REQUIRE => {
            Some(ReferenceKind::Require)
        }
        Expr::Ident(id) if id.sym.as_ref() == IMPORT => {
            Some(ReferenceKind::DynamicImport)
        }
        // `require.resolve('module')`
        Expr::Member(member) if !member.computed => {
            let is_require = match &member.obj {
                ExprOrSuper::Expr(obj) => match &**obj {
                    Expr::Ident(id) => id.sym.as_ref() == REQUIRE,
                    _ => false,
                },
                _ => false,
            };
            match &*member.prop {
                Expr::Ident(prop)
                    if is_require && prop.sym.as_ref() == RESOLVE =>
                {
                    Some(ReferenceKind::Resolve)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn string_literal(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Lit(Lit::Str(s)) => Some(s.value.as_ref()),
        Expr::Paren(paren) => string_literal(&paren.expr),
        Expr::Tpl(tpl) if tpl.exprs.is_empty() => tpl
            .quasis
            .first()
            .map(|q| q.cooked.as_ref().unwrap_or(&q.raw).value.as_ref()),
        _ => None,
    }
}
