/// Grammar Linter — compile-checks grammar AST files and reports
/// structural issues.
///
/// Usage: grammar_linter <ast.ron> [<ast.ron> ...]

use fabler::core::compile::Compiler;
use fabler::schema::ast::{self, GrammarNode};
use std::collections::HashSet;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: grammar_linter <ast.ron> [<ast.ron> ...]");
        process::exit(0);
    }

    let mut failed = false;
    for path_str in &args[1..] {
        let path = Path::new(path_str);
        println!("-- {}", path_str);
        if !lint_file(path) {
            failed = true;
        }
    }

    if failed {
        process::exit(1);
    }
    println!("OK");
}

fn lint_file(path: &Path) -> bool {
    let nodes = match ast::load_from_ron(path) {
        Ok(nodes) => nodes,
        Err(e) => {
            eprintln!("ERROR: failed to load AST: {}", e);
            return false;
        }
    };

    let mut clean = true;

    // Duplicate export keys compile last-wins; surface them here.
    let mut seen = HashSet::new();
    for key in export_keys(&nodes) {
        if !seen.insert(key.clone()) {
            println!("WARN: export key '{}' declared more than once", key);
        }
    }
    if seen.is_empty() {
        println!("WARN: grammar exports no entry points");
    }

    match Compiler::new().compile_file(path) {
        Ok(program) => {
            println!(
                "{} definitions, {} exports, {} variables",
                program.definition_names().len(),
                program.export_names().len(),
                program.variable_names().len()
            );
        }
        Err(e) => {
            eprintln!("ERROR: compilation failed: {}", e);
            clean = false;
        }
    }

    clean
}

fn export_keys(nodes: &[GrammarNode]) -> Vec<String> {
    let mut keys = Vec::new();
    for node in nodes {
        match node {
            GrammarNode::MetaExport { key, .. } => keys.push(key.clone()),
            GrammarNode::ScopeBlock { children, .. }
            | GrammarNode::ListBlock { children, .. } => {
                keys.extend(export_keys(children));
            }
            _ => {}
        }
    }
    keys
}
