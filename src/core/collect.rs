/// Metadata collector — scans the reduced tree for definitions, exports,
/// imports, and overridable variable names.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::core::reduce::{Meta, ReducedNode, ValueExpr};

#[derive(Debug, Error)]
pub enum CollectError {
    /// The same generated name was defined twice with different value
    /// expressions. Deterministic name derivation makes this a genuine
    /// collision, never legitimate sharing.
    #[error("conflicting definitions for '{0}'")]
    ConflictingDefinition(String),
}

/// Everything the lowering stage needs, pulled out of the reduced tree in
/// one walk.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Generated identifier → definition body.
    pub definitions: FxHashMap<String, ValueExpr>,
    /// Export key → target expression, in declaration order.
    pub exports: Vec<(String, ValueExpr)>,
    /// `(file, alias)` pairs, in declaration order.
    pub imports: Vec<(String, String)>,
    /// Overridable variable names, sorted and deduplicated.
    pub variables: Vec<String>,
}

/// Walk the reduced tree and build the metadata tables.
///
/// Re-registering a definition under the same name is allowed only when
/// the value expression is identical (the legitimate shared/recursive
/// case); a different body is a hard compile error.
pub fn collect(tree: &[ReducedNode]) -> Result<Metadata, CollectError> {
    let mut meta = Metadata::default();
    collect_nodes(tree, &mut meta)?;

    let mut variables = FxHashSet::default();
    for expr in meta.definitions.values() {
        collect_variables(expr, &mut variables);
    }
    for (_, expr) in &meta.exports {
        collect_variables(expr, &mut variables);
    }
    meta.variables = variables.into_iter().collect();
    meta.variables.sort();

    Ok(meta)
}

fn collect_nodes(nodes: &[ReducedNode], meta: &mut Metadata) -> Result<(), CollectError> {
    for node in nodes {
        collect_nodes(&node.children, meta)?;

        match &node.meta {
            Some(Meta::Import { file, alias }) => {
                meta.imports.push((file.clone(), alias.clone()));
            }
            Some(Meta::Export { key, target }) => {
                meta.exports.push((key.clone(), target.clone()));
            }
            None => {
                if let (Some(name), Some(value)) = (&node.name, &node.value) {
                    match meta.definitions.get(name) {
                        Some(existing) if existing != value => {
                            return Err(CollectError::ConflictingDefinition(name.clone()));
                        }
                        _ => {
                            meta.definitions.insert(name.clone(), value.clone());
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn collect_variables(expr: &ValueExpr, out: &mut FxHashSet<String>) {
    match expr {
        ValueExpr::VarRef { name, .. } => {
            out.insert(name.clone());
        }
        ValueExpr::Choice(parts) | ValueExpr::Concat(parts) => {
            for part in parts {
                collect_variables(part, out);
            }
        }
        ValueExpr::Weighted { expr, .. } => collect_variables(expr, out),
        ValueExpr::Call { args, .. } => {
            for arg in args {
                collect_variables(arg, out);
            }
        }
        ValueExpr::Literal(_) | ValueExpr::Ref(_) | ValueExpr::SelfRef(_) => {}
    }
}

/// Collect the plain definition references an expression depends on.
/// Self-references are excluded: they are pre-broken into lazy wrappers
/// before dependency ordering runs. Variable fallbacks are excluded too;
/// they may legitimately name nothing and are gathered separately by
/// [`collect_fallbacks`].
pub fn collect_refs(expr: &ValueExpr, out: &mut Vec<String>) {
    match expr {
        ValueExpr::Ref(name) => out.push(name.clone()),
        ValueExpr::VarRef { .. } => {}
        ValueExpr::Choice(parts) | ValueExpr::Concat(parts) => {
            for part in parts {
                collect_refs(part, out);
            }
        }
        ValueExpr::Weighted { expr, .. } => collect_refs(expr, out),
        ValueExpr::Call { args, .. } => {
            for arg in args {
                collect_refs(arg, out);
            }
        }
        ValueExpr::Literal(_) | ValueExpr::SelfRef(_) => {}
    }
}

/// Collect the fallback definition names of every variable reference in
/// an expression. A fallback that resolves to an existing definition is
/// a real dependency: without an override it is forced like any other
/// reference, so cycles through fallbacks must be visible to the
/// dependency ordering.
pub fn collect_fallbacks(expr: &ValueExpr, out: &mut Vec<String>) {
    match expr {
        ValueExpr::VarRef { fallback, .. } => out.push(fallback.clone()),
        ValueExpr::Choice(parts) | ValueExpr::Concat(parts) => {
            for part in parts {
                collect_fallbacks(part, out);
            }
        }
        ValueExpr::Weighted { expr, .. } => collect_fallbacks(expr, out),
        ValueExpr::Call { args, .. } => {
            for arg in args {
                collect_fallbacks(arg, out);
            }
        }
        ValueExpr::Literal(_) | ValueExpr::Ref(_) | ValueExpr::SelfRef(_) => {}
    }
}
