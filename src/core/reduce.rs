/// Tree reducer — walks the grammar AST once, threading a scope path, and
/// produces a parallel tree of reduced nodes carrying either a generated
/// definition name or an inline value expression.
///
/// Reduction is a pure function of its inputs. A node whose shape does not
/// match its tag is logged and degraded to a neutral node so sibling
/// reduction continues.

use tracing::warn;

use crate::schema::ast::GrammarNode;

/// Ordered sequence of block names accumulated while descending into
/// scope/list blocks. Two nodes reached via the same path collapse to the
/// same generated identifier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopePath {
    segments: Vec<String>,
}

impl ScopePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Extend the path with one block name.
    pub fn child(&self, name: &str) -> ScopePath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        ScopePath { segments }
    }

    /// The generated identifier for this path: segments joined with `__`,
    /// anything outside `[A-Za-z0-9_]` replaced with `_`.
    pub fn ident(&self) -> String {
        sanitize_ident(&self.segments.join("__"))
    }

    /// True if `ident` names this path or any enclosing prefix of it.
    /// Used to spot recursive self-references.
    pub fn encloses(&self, ident: &str) -> bool {
        let mut prefix = ScopePath::root();
        for segment in &self.segments {
            prefix = prefix.child(segment);
            if prefix.ident() == ident {
                return true;
            }
        }
        false
    }
}

/// The generated identifier for a dotted reference path like `animal.sound`.
pub fn path_ident(path: &str) -> String {
    sanitize_ident(&path.split('.').collect::<Vec<_>>().join("__"))
}

fn sanitize_ident(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// A value expression — the typed intermediate form a reduced node
/// contributes to its parent, later lowered into the thunk arena.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    /// Fixed text.
    Literal(String),
    /// Reference to a named definition.
    Ref(String),
    /// Variable reference: override table first, then the named fallback
    /// definition.
    VarRef { name: String, fallback: String },
    /// Reference back into an enclosing block; evaluated lazily with a
    /// strictly-less-than-one continuation chance.
    SelfRef(String),
    /// Uniform random choice over the flattened branch pool.
    Choice(Vec<ValueExpr>),
    /// Ordered concatenation.
    Concat(Vec<ValueExpr>),
    /// Branch duplicated `weight` times in the owning choice pool.
    Weighted { weight: u32, expr: Box<ValueExpr> },
    /// Invocation of an imported function by qualified identifier.
    Call { function: String, args: Vec<ValueExpr> },
}

/// A compile-time directive carried by a reduced node.
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
    Import { file: String, alias: String },
    Export { key: String, target: ValueExpr },
}

/// One reduced node, produced per grammar node.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedNode {
    /// Tag of the source grammar node, for diagnostics.
    pub kind: &'static str,
    /// Generated identifier, set when this node is a definition point.
    pub name: Option<String>,
    /// Value expression: the definition body for named nodes, the inline
    /// expression otherwise.
    pub value: Option<ValueExpr>,
    pub children: Vec<ReducedNode>,
    pub meta: Option<Meta>,
}

impl ReducedNode {
    fn neutral(kind: &'static str) -> Self {
        ReducedNode {
            kind,
            name: None,
            value: None,
            children: Vec::new(),
            meta: None,
        }
    }

    pub fn is_meta(&self) -> bool {
        self.meta.is_some()
    }

    /// The expression this node contributes to its parent's composition:
    /// named definitions contribute a reference, meta and neutral nodes
    /// contribute nothing.
    pub fn contribution(&self) -> Option<ValueExpr> {
        if self.is_meta() {
            return None;
        }
        if let Some(ref name) = self.name {
            return Some(ValueExpr::Ref(name.clone()));
        }
        self.value.clone()
    }
}

/// Reduce a node sequence under the given scope context.
pub fn reduce(nodes: &[GrammarNode], context: &ScopePath) -> Vec<ReducedNode> {
    nodes
        .iter()
        .map(|node| match reduce_node(node, context) {
            Ok(reduced) => reduced,
            Err(why) => {
                warn!(
                    tag = node.tag(),
                    context = %context.ident(),
                    %why,
                    "malformed grammar node, substituting neutral node"
                );
                ReducedNode::neutral(node.tag())
            }
        })
        .collect()
}

fn reduce_node(node: &GrammarNode, context: &ScopePath) -> Result<ReducedNode, String> {
    match node {
        GrammarNode::MetaImport { file, alias } => Ok(ReducedNode {
            kind: node.tag(),
            name: None,
            value: None,
            children: Vec::new(),
            meta: Some(Meta::Import {
                file: file.clone(),
                alias: alias.clone(),
            }),
        }),
        GrammarNode::MetaExport { key, value } => {
            let reduced = reduce(std::slice::from_ref(value.as_ref()), context);
            let target = reduced[0]
                .contribution()
                .ok_or_else(|| "export value contributes no expression".to_string())?;
            Ok(ReducedNode {
                kind: node.tag(),
                name: None,
                value: None,
                children: Vec::new(),
                meta: Some(Meta::Export {
                    key: key.clone(),
                    target,
                }),
            })
        }
        GrammarNode::ScopeBlock { name, children } => {
            let full = context.child(name);
            Ok(reduce_block(node.tag(), &full, children))
        }
        GrammarNode::ListBlock { name, children } => {
            let full = match name {
                Some(name) => context.child(name),
                None => context.clone(),
            };
            Ok(reduce_block(node.tag(), &full, children))
        }
        GrammarNode::Identifier { path } => {
            if path.is_empty() || path == "$" {
                return Err("empty identifier path".to_string());
            }
            let value = if let Some(var_name) = path.strip_prefix('$') {
                ValueExpr::VarRef {
                    name: var_name.to_string(),
                    fallback: path_ident(var_name),
                }
            } else {
                let target = path_ident(path);
                if context.encloses(&target) {
                    ValueExpr::SelfRef(target)
                } else {
                    ValueExpr::Ref(target)
                }
            };
            Ok(ReducedNode {
                kind: node.tag(),
                name: None,
                value: Some(value),
                children: Vec::new(),
                meta: None,
            })
        }
        GrammarNode::InterpolatedString { children, weight } => {
            if *weight == 0 {
                return Err("interpolated string weight must be >= 1".to_string());
            }
            let reduced = reduce(children, context);
            let parts: Vec<ValueExpr> =
                reduced.iter().filter_map(ReducedNode::contribution).collect();
            let mut value = ValueExpr::Concat(parts);
            if *weight > 1 {
                value = ValueExpr::Weighted {
                    weight: *weight,
                    expr: Box::new(value),
                };
            }
            Ok(ReducedNode {
                kind: node.tag(),
                name: None,
                value: Some(value),
                children: reduced,
                meta: None,
            })
        }
        GrammarNode::Tag {
            children,
            quantifier,
        } => {
            let reduced = reduce(children, context);
            let mut parts: Vec<ValueExpr> =
                reduced.iter().filter_map(ReducedNode::contribution).collect();
            let inner = match parts.len() {
                0 => ValueExpr::Literal(String::new()),
                1 => parts.remove(0),
                _ => ValueExpr::Concat(parts),
            };
            let value = match quantifier {
                None => inner,
                Some('?') => {
                    ValueExpr::Choice(vec![inner, ValueExpr::Literal(String::new())])
                }
                Some(other) => {
                    return Err(format!("unknown tag quantifier '{}'", other));
                }
            };
            Ok(ReducedNode {
                kind: node.tag(),
                name: None,
                value: Some(value),
                children: reduced,
                meta: None,
            })
        }
        GrammarNode::TagChoice { left, right } => {
            let mut reduced = reduce(left, context);
            reduced.extend(reduce(right, context));
            let parts: Vec<ValueExpr> =
                reduced.iter().filter_map(ReducedNode::contribution).collect();
            Ok(ReducedNode {
                kind: node.tag(),
                name: None,
                value: Some(ValueExpr::Choice(parts)),
                children: reduced,
                meta: None,
            })
        }
        GrammarNode::TagConcat { left, right } => {
            let mut reduced = reduce(left, context);
            reduced.extend(reduce(right, context));
            let parts: Vec<ValueExpr> =
                reduced.iter().filter_map(ReducedNode::contribution).collect();
            Ok(ReducedNode {
                kind: node.tag(),
                name: None,
                value: Some(ValueExpr::Concat(parts)),
                children: reduced,
                meta: None,
            })
        }
        GrammarNode::Literal { text } => Ok(ReducedNode {
            kind: node.tag(),
            name: None,
            value: Some(ValueExpr::Literal(text.clone())),
            children: Vec::new(),
            meta: None,
        }),
        GrammarNode::Transform { args, function } => {
            let function_path = match function.as_ref() {
                GrammarNode::Identifier { path } if !path.starts_with('$') && !path.is_empty() => {
                    path_ident(path)
                }
                other => {
                    return Err(format!(
                        "transform function must be an identifier, got {}",
                        other.tag()
                    ));
                }
            };
            let reduced_args = reduce(std::slice::from_ref(args.as_ref()), context);
            let call_args: Vec<ValueExpr> = reduced_args
                .iter()
                .filter_map(ReducedNode::contribution)
                .collect();
            Ok(ReducedNode {
                kind: node.tag(),
                name: None,
                value: Some(ValueExpr::Call {
                    function: function_path,
                    args: call_args,
                }),
                children: reduced_args,
                meta: None,
            })
        }
        GrammarNode::Call { function, args } => {
            if function.is_empty() {
                return Err("empty call function path".to_string());
            }
            let reduced_args = reduce(args, context);
            let call_args: Vec<ValueExpr> = reduced_args
                .iter()
                .filter_map(ReducedNode::contribution)
                .collect();
            Ok(ReducedNode {
                kind: node.tag(),
                name: None,
                value: Some(ValueExpr::Call {
                    function: path_ident(function),
                    args: call_args,
                }),
                children: reduced_args,
                meta: None,
            })
        }
        GrammarNode::Mapping => Ok(ReducedNode::neutral(node.tag())),
    }
}

/// Compose a scope/list block: more than one non-meta child becomes a
/// choice, a single child is used unwrapped, none becomes the empty
/// string.
fn reduce_block(kind: &'static str, full: &ScopePath, children: &[GrammarNode]) -> ReducedNode {
    let reduced = reduce(children, full);
    let mut parts: Vec<ValueExpr> =
        reduced.iter().filter_map(ReducedNode::contribution).collect();
    let value = match parts.len() {
        0 => ValueExpr::Literal(String::new()),
        1 => parts.remove(0),
        _ => ValueExpr::Choice(parts),
    };
    ReducedNode {
        kind,
        name: Some(full.ident()),
        value: Some(value),
        children: reduced,
        meta: None,
    }
}
