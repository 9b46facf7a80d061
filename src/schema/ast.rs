/// Grammar AST — the tagged node sequence produced by an external parser.
///
/// The compiler consumes this interface; it never builds it from concrete
/// syntax. Node trees can also be written directly as RON data files,
/// which is how the test fixtures and tools feed the compiler.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AstError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// One node of a parsed grammar.
///
/// `MetaImport` and `MetaExport` are compile-time directives and never
/// contribute a generated value. Everything else composes into the value
/// expression of its enclosing block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GrammarNode {
    /// `@import "file" as alias` — wire in an external function module.
    MetaImport { file: String, alias: String },
    /// `@export key = value` — expose a grammar entry point.
    MetaExport { key: String, value: Box<GrammarNode> },
    /// A named block of alternatives; extends the scope path.
    ScopeBlock {
        name: String,
        children: Vec<GrammarNode>,
    },
    /// An optionally named list of alternatives.
    ListBlock {
        name: Option<String>,
        children: Vec<GrammarNode>,
    },
    /// Dotted reference to another named block. A leading `$` sigil marks
    /// a variable reference resolved against the override table at
    /// generation time, falling back to the named block's definition.
    Identifier { path: String },
    /// Ordered concatenation of children into one string. `weight` >= 1
    /// biases selection when the string sits inside a parent choice.
    InterpolatedString {
        children: Vec<GrammarNode>,
        #[serde(default = "default_weight")]
        weight: u32,
    },
    /// A tagged group; `quantifier: Some('?')` makes it optional (50/50
    /// with the empty string).
    Tag {
        children: Vec<GrammarNode>,
        #[serde(default)]
        quantifier: Option<char>,
    },
    /// Binary choice between two node lists.
    TagChoice {
        left: Vec<GrammarNode>,
        right: Vec<GrammarNode>,
    },
    /// Binary concatenation of two node lists.
    TagConcat {
        left: Vec<GrammarNode>,
        right: Vec<GrammarNode>,
    },
    /// Fixed text.
    Literal { text: String },
    /// Apply an imported function (referenced by `function`, normally an
    /// `Identifier`) to an argument node.
    Transform {
        args: Box<GrammarNode>,
        function: Box<GrammarNode>,
    },
    /// Invoke an imported function by dotted path with reduced arguments.
    Call {
        function: String,
        args: Vec<GrammarNode>,
    },
    /// Structurally present but carries no generated value.
    Mapping,
}

fn default_weight() -> u32 {
    1
}

impl GrammarNode {
    /// Short tag name for diagnostics, mirroring the variant.
    pub fn tag(&self) -> &'static str {
        match self {
            GrammarNode::MetaImport { .. } => "meta_import",
            GrammarNode::MetaExport { .. } => "meta_export",
            GrammarNode::ScopeBlock { .. } => "scope_block",
            GrammarNode::ListBlock { .. } => "list_block",
            GrammarNode::Identifier { .. } => "identifier",
            GrammarNode::InterpolatedString { .. } => "interpolated_string",
            GrammarNode::Tag { .. } => "tag",
            GrammarNode::TagChoice { .. } => "tag_choice",
            GrammarNode::TagConcat { .. } => "tag_concat",
            GrammarNode::Literal { .. } => "literal",
            GrammarNode::Transform { .. } => "transform",
            GrammarNode::Call { .. } => "call",
            GrammarNode::Mapping => "mapping",
        }
    }
}

/// Load a grammar AST from a RON file containing a `Vec<GrammarNode>`.
pub fn load_from_ron(path: &Path) -> Result<Vec<GrammarNode>, AstError> {
    let contents = std::fs::read_to_string(path)?;
    parse_ron(&contents)
}

/// Parse a grammar AST from a RON string.
pub fn parse_ron(input: &str) -> Result<Vec<GrammarNode>, AstError> {
    Ok(ron::from_str(input)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_ast() {
        let src = r#"[
            ScopeBlock(name: "animal", children: [
                Literal(text: "cat"),
                Literal(text: "dog"),
            ]),
            MetaExport(key: "animal", value: Identifier(path: "animal")),
        ]"#;
        let nodes = parse_ron(src).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].tag(), "scope_block");
        assert_eq!(nodes[1].tag(), "meta_export");
    }

    #[test]
    fn interpolated_string_default_weight() {
        let src = r#"[
            InterpolatedString(children: [Literal(text: "a")]),
        ]"#;
        let nodes = parse_ron(src).unwrap();
        match &nodes[0] {
            GrammarNode::InterpolatedString { weight, .. } => assert_eq!(*weight, 1),
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn tag_quantifier_optional() {
        let src = r#"[
            Tag(children: [Literal(text: "maybe")], quantifier: Some('?')),
            Tag(children: [Literal(text: "always")]),
        ]"#;
        let nodes = parse_ron(src).unwrap();
        assert!(matches!(
            nodes[0],
            GrammarNode::Tag {
                quantifier: Some('?'),
                ..
            }
        ));
        assert!(matches!(nodes[1], GrammarNode::Tag { quantifier: None, .. }));
    }

    #[test]
    fn ron_round_trip() {
        let node = GrammarNode::ScopeBlock {
            name: "color".to_string(),
            children: vec![
                GrammarNode::Literal {
                    text: "red".to_string(),
                },
                GrammarNode::Identifier {
                    path: "$hue".to_string(),
                },
            ],
        };
        let serialized = ron::to_string(&node).unwrap();
        let deserialized: GrammarNode = ron::from_str(&serialized).unwrap();
        assert_eq!(deserialized, node);
    }
}
