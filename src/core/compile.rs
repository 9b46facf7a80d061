/// The compiler — wires reduction, metadata collection, import
/// resolution, dependency ordering, and lowering into the thunk arena.

use rustc_hash::FxHashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::collect::{collect, collect_fallbacks, collect_refs, CollectError, Metadata};
use crate::core::order::{topo_sort, OrderError};
use crate::core::program::{CompiledProgram, FnId, Thunk, ThunkId};
use crate::core::reduce::{path_ident, reduce, ScopePath, ValueExpr};
use crate::core::transform::{compile_function, CompiledFunction, TransformError};
use crate::schema::ast::{self, AstError, GrammarNode};
use crate::schema::module::{FunctionModule, ModuleError, ModuleRegistry};

/// Upper bound for the recursion continuation chance. Anything below 1
/// guarantees termination with probability 1.
const MAX_CONTINUE_CHANCE: f64 = 0.99;

/// Default chance that a self-reference expands again instead of
/// producing the empty string.
const DEFAULT_CONTINUE_CHANCE: f64 = 0.5;

#[derive(Debug, Error)]
pub enum CompileError {
    /// An `@import` names a module no one can provide. Fatal: a missing
    /// import would otherwise fail silently at generation time.
    #[error("unresolved import: {0}")]
    UnresolvedImport(String),
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),
    #[error("unresolved function: {0}")]
    UnresolvedFunction(String),
    /// A non-self-reference cycle between named definitions.
    #[error("cyclic dependency between definitions: {0}")]
    CyclicDependency(String),
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Ast(#[from] AstError),
    /// A rule-module file exists but failed to load.
    #[error("failed to load module: {0}")]
    Module(#[from] ModuleError),
}

/// Grammar compiler. Configure modules and the recursion policy, then
/// feed it AST node sequences.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    modules: ModuleRegistry,
    continue_chance: Option<f64>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function module under the path grammars import it by.
    pub fn with_module(mut self, path: &str, module: FunctionModule) -> Self {
        self.modules.register(path, module);
        self
    }

    /// Replace the whole module registry.
    pub fn with_registry(mut self, registry: ModuleRegistry) -> Self {
        self.modules = registry;
        self
    }

    /// Set the chance that a recursive self-reference expands again on
    /// each force. Clamped strictly below 1 to keep generation
    /// terminating.
    pub fn recursion_continue_chance(mut self, chance: f64) -> Self {
        let clamped = chance.clamp(0.0, MAX_CONTINUE_CHANCE);
        if clamped != chance {
            warn!(chance, clamped, "recursion continuation chance clamped");
        }
        self.continue_chance = Some(clamped);
        self
    }

    /// Compile an AST node sequence into a runnable program.
    pub fn compile(&self, nodes: &[GrammarNode]) -> Result<CompiledProgram, CompileError> {
        let tree = reduce(nodes, &ScopePath::root());
        let meta = collect(&tree)?;
        debug!(
            definitions = meta.definitions.len(),
            exports = meta.exports.len(),
            imports = meta.imports.len(),
            "collected grammar metadata"
        );

        let (functions, fn_ids) = self.resolve_imports(&meta)?;
        let order = definition_order(&meta)?;

        let continue_chance = self.continue_chance.unwrap_or(DEFAULT_CONTINUE_CHANCE);
        lower(&meta, functions, fn_ids, &order, continue_chance)
    }

    /// Compile an AST written as RON.
    pub fn compile_str(&self, input: &str) -> Result<CompiledProgram, CompileError> {
        let nodes = ast::parse_ron(input)?;
        self.compile(&nodes)
    }

    /// Compile an AST loaded from a RON file.
    pub fn compile_file(&self, path: &Path) -> Result<CompiledProgram, CompileError> {
        let nodes = ast::load_from_ron(path)?;
        self.compile(&nodes)
    }

    /// Resolve every `(file, alias)` import into compiled functions keyed
    /// by qualified identifier. Function IDs are assigned in a
    /// deterministic order.
    fn resolve_imports(
        &self,
        meta: &Metadata,
    ) -> Result<(Vec<CompiledFunction>, FxHashMap<String, FnId>), CompileError> {
        let mut functions = Vec::new();
        let mut fn_ids = FxHashMap::default();

        for (file, alias) in &meta.imports {
            let module = self
                .modules
                .resolve(file)?
                .ok_or_else(|| CompileError::UnresolvedImport(file.clone()))?;

            let mut names: Vec<&String> = module.functions.keys().collect();
            names.sort();
            for name in names {
                let qualified = path_ident(&format!("{}.{}", alias, name));
                let compiled = compile_function(&module.functions[name])?;
                let id = FnId(functions.len());
                functions.push(compiled);
                fn_ids.insert(qualified, id);
            }
        }

        Ok((functions, fn_ids))
    }
}

/// Order definitions so dependencies are lowered first, rejecting
/// unresolved references and non-self-reference cycles.
fn definition_order(meta: &Metadata) -> Result<Vec<String>, CompileError> {
    let mut nodes: Vec<String> = meta.definitions.keys().cloned().collect();
    nodes.sort();

    let mut edges = Vec::new();
    for (name, expr) in &meta.definitions {
        let mut refs = Vec::new();
        collect_refs(expr, &mut refs);
        for dep in refs {
            if !meta.definitions.contains_key(&dep) {
                return Err(CompileError::UnresolvedReference(dep));
            }
            edges.push((name.clone(), dep));
        }

        // A variable fallback that resolves to a definition is forced
        // whenever no override is supplied, so it is a dependency edge
        // too; a cycle through one would otherwise recurse without
        // bound at generation time. Absent fallbacks stay legal and
        // contribute no edge.
        let mut fallbacks = Vec::new();
        collect_fallbacks(expr, &mut fallbacks);
        for dep in fallbacks {
            if meta.definitions.contains_key(&dep) {
                edges.push((name.clone(), dep));
            }
        }
    }

    topo_sort(&nodes, &edges).map_err(|err| match err {
        OrderError::ClosedChain(chain) => CompileError::CyclicDependency(chain.join(" -> ")),
    })
}

struct Lowerer<'a> {
    arena: Vec<Thunk>,
    roots: FxHashMap<String, ThunkId>,
    fn_ids: &'a FxHashMap<String, FnId>,
    continue_chance: f64,
}

impl Lowerer<'_> {
    /// Lower an expression to a thunk, allocating arena slots for its
    /// children.
    fn lower_thunk(&mut self, expr: &ValueExpr) -> Result<Thunk, CompileError> {
        match expr {
            ValueExpr::Literal(text) => Ok(Thunk::Literal(text.clone())),
            // A bare reference as a whole body forwards to the target
            // definition.
            ValueExpr::Ref(_) => {
                let id = self.lower_id(expr)?;
                Ok(Thunk::Concat(vec![id]))
            }
            ValueExpr::VarRef { name, fallback } => {
                let fallback = match self.roots.get(fallback) {
                    Some(id) => *id,
                    None => {
                        // The variable can still be satisfied by an
                        // override; an absent default degrades to the
                        // empty string so generation never fails.
                        warn!(
                            variable = %name,
                            fallback = %fallback,
                            "variable fallback has no definition, defaulting to empty"
                        );
                        self.push(Thunk::Literal(String::new()))
                    }
                };
                Ok(Thunk::VarRef {
                    name: name.clone(),
                    fallback,
                })
            }
            ValueExpr::SelfRef(name) => {
                let target = self
                    .roots
                    .get(name)
                    .copied()
                    .ok_or_else(|| CompileError::UnresolvedReference(name.clone()))?;
                Ok(Thunk::Recurse {
                    target,
                    continue_chance: self.continue_chance,
                })
            }
            ValueExpr::Choice(parts) => {
                let mut pool = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        // Weight realized by inserting the same branch
                        // `weight` times into the pool.
                        ValueExpr::Weighted { weight, expr } => {
                            let id = self.lower_id(expr)?;
                            pool.extend(std::iter::repeat(id).take(*weight as usize));
                        }
                        other => {
                            pool.push(self.lower_id(other)?);
                        }
                    }
                }
                Ok(Thunk::Choice(pool))
            }
            ValueExpr::Concat(parts) => {
                let mut children = Vec::with_capacity(parts.len());
                for part in parts {
                    children.push(self.lower_id(part)?);
                }
                Ok(Thunk::Concat(children))
            }
            // Weight is meaningful only inside a choice pool.
            ValueExpr::Weighted { expr, .. } => self.lower_thunk(expr),
            ValueExpr::Call { function, args } => {
                let id = self
                    .fn_ids
                    .get(function)
                    .copied()
                    .ok_or_else(|| CompileError::UnresolvedFunction(function.clone()))?;
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_id(arg)?);
                }
                Ok(Thunk::Call {
                    function: id,
                    args: lowered,
                })
            }
        }
    }

    /// Lower an expression to an arena slot. Plain references reuse the
    /// target definition's root slot instead of allocating.
    fn lower_id(&mut self, expr: &ValueExpr) -> Result<ThunkId, CompileError> {
        if let ValueExpr::Ref(name) = expr {
            return self
                .roots
                .get(name)
                .copied()
                .ok_or_else(|| CompileError::UnresolvedReference(name.clone()));
        }
        let thunk = self.lower_thunk(expr)?;
        Ok(self.push(thunk))
    }

    fn push(&mut self, thunk: Thunk) -> ThunkId {
        let id = ThunkId(self.arena.len());
        self.arena.push(thunk);
        id
    }
}

/// Build the thunk arena bottom-up in dependency order and assemble the
/// program.
fn lower(
    meta: &Metadata,
    functions: Vec<CompiledFunction>,
    fn_ids: FxHashMap<String, FnId>,
    order: &[String],
    continue_chance: f64,
) -> Result<CompiledProgram, CompileError> {
    let mut lowerer = Lowerer {
        arena: Vec::new(),
        roots: FxHashMap::default(),
        fn_ids: &fn_ids,
        continue_chance,
    };

    // Reserve every definition's root slot first so self-references and
    // forward references resolve during lowering.
    for name in order {
        let id = lowerer.push(Thunk::Literal(String::new()));
        lowerer.roots.insert(name.clone(), id);
    }
    for name in order {
        let expr = &meta.definitions[name];
        let thunk = lowerer.lower_thunk(expr)?;
        let root = lowerer.roots[name];
        lowerer.arena[root.0] = thunk;
    }

    let mut exports = FxHashMap::default();
    for (key, target) in &meta.exports {
        let id = lowerer.lower_id(target)?;
        // Later exports of the same key win.
        exports.insert(key.clone(), id);
    }

    debug!(
        thunks = lowerer.arena.len(),
        exports = exports.len(),
        "lowered grammar to thunk arena"
    );

    Ok(CompiledProgram {
        arena: lowerer.arena,
        definitions: lowerer.roots,
        exports,
        functions,
        variables: meta.variables.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lit(text: &str) -> GrammarNode {
        GrammarNode::Literal {
            text: text.to_string(),
        }
    }

    fn ident(path: &str) -> GrammarNode {
        GrammarNode::Identifier {
            path: path.to_string(),
        }
    }

    fn block(name: &str, children: Vec<GrammarNode>) -> GrammarNode {
        GrammarNode::ScopeBlock {
            name: name.to_string(),
            children,
        }
    }

    fn export(key: &str, path: &str) -> GrammarNode {
        GrammarNode::MetaExport {
            key: key.to_string(),
            value: Box::new(ident(path)),
        }
    }

    #[test]
    fn compile_and_generate_simple_grammar() {
        let ast = vec![
            block("animal", vec![lit("cat"), lit("dog")]),
            export("animal", "animal"),
        ];
        let program = Compiler::new().compile(&ast).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let out = program
            .generate("animal", &Default::default(), &mut rng)
            .unwrap();
        assert!(out == "cat" || out == "dog");
    }

    #[test]
    fn forward_reference_compiles() {
        // "pet" references "animal" before it is declared.
        let ast = vec![
            block("pet", vec![ident("animal")]),
            block("animal", vec![lit("cat"), lit("dog")]),
            export("pet", "pet"),
        ];
        let program = Compiler::new().compile(&ast).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let out = program
            .generate("pet", &Default::default(), &mut rng)
            .unwrap();
        assert!(out == "cat" || out == "dog");
    }

    #[test]
    fn self_reference_compiles_and_terminates() {
        let ast = vec![
            block(
                "chain",
                vec![GrammarNode::InterpolatedString {
                    children: vec![lit("x"), ident("chain")],
                    weight: 1,
                }],
            ),
            export("chain", "chain"),
        ];
        let program = Compiler::new().compile(&ast).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let out = program
                .generate("chain", &Default::default(), &mut rng)
                .unwrap();
            assert!(out.chars().all(|c| c == 'x'));
            assert!(!out.is_empty());
        }
    }

    #[test]
    fn mutual_recursion_is_rejected() {
        let ast = vec![
            block("a", vec![ident("b")]),
            block("b", vec![ident("a")]),
            export("a", "a"),
        ];
        let err = Compiler::new().compile(&ast).unwrap_err();
        match err {
            CompileError::CyclicDependency(chain) => {
                assert!(chain.contains("a") && chain.contains("b"));
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn variable_fallback_cycle_is_rejected() {
        // "a" forces "b", whose variable fallback forces "a" again
        // whenever no override is supplied.
        let ast = vec![
            block("a", vec![ident("b")]),
            block("b", vec![ident("$a")]),
            export("a", "a"),
        ];
        let err = Compiler::new().compile(&ast).unwrap_err();
        match err {
            CompileError::CyclicDependency(chain) => {
                assert!(chain.contains("a") && chain.contains("b"));
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn variable_fallback_naming_its_own_block_is_rejected() {
        let ast = vec![block("x", vec![ident("$x")]), export("x", "x")];
        assert!(matches!(
            Compiler::new().compile(&ast),
            Err(CompileError::CyclicDependency(_))
        ));
    }

    #[test]
    fn unresolved_reference_is_rejected() {
        let ast = vec![
            block("a", vec![ident("missing"), lit("x")]),
            export("a", "a"),
        ];
        assert!(matches!(
            Compiler::new().compile(&ast),
            Err(CompileError::UnresolvedReference(ref name)) if name == "missing"
        ));
    }

    #[test]
    fn unresolved_import_is_fatal() {
        let ast = vec![GrammarNode::MetaImport {
            file: "no/such/module".to_string(),
            alias: "ghost".to_string(),
        }];
        assert!(matches!(
            Compiler::new().compile(&ast),
            Err(CompileError::UnresolvedImport(_))
        ));
    }

    #[test]
    fn unresolved_function_is_rejected() {
        let ast = vec![
            GrammarNode::MetaImport {
                file: "lang".to_string(),
                alias: "lang".to_string(),
            },
            block(
                "a",
                vec![GrammarNode::Call {
                    function: "lang.missing".to_string(),
                    args: vec![lit("x")],
                }],
            ),
            export("a", "a"),
        ];
        let compiler = Compiler::new().with_module("lang", FunctionModule::new());
        assert!(matches!(
            compiler.compile(&ast),
            Err(CompileError::UnresolvedFunction(_))
        ));
    }

    #[test]
    fn imported_function_is_applied() {
        let mut module = FunctionModule::new();
        module.register_native("shout", |args: &[String]| args.concat().to_uppercase());
        let ast = vec![
            GrammarNode::MetaImport {
                file: "lang".to_string(),
                alias: "lang".to_string(),
            },
            block(
                "word",
                vec![GrammarNode::Call {
                    function: "lang.shout".to_string(),
                    args: vec![lit("quiet")],
                }],
            ),
            export("word", "word"),
        ];
        let program = Compiler::new()
            .with_module("lang", module)
            .compile(&ast)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(
            program
                .generate("word", &Default::default(), &mut rng)
                .unwrap(),
            "QUIET"
        );
    }

    #[test]
    fn variable_without_definition_defaults_to_empty() {
        let ast = vec![
            block("greeting", vec![ident("$name")]),
            export("greeting", "greeting"),
        ];
        let program = Compiler::new().compile(&ast).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(
            program
                .generate("greeting", &Default::default(), &mut rng)
                .unwrap(),
            ""
        );

        let mut overrides = crate::core::program::Overrides::new();
        overrides.insert("name".to_string(), "Ada".to_string());
        assert_eq!(
            program.generate("greeting", &overrides, &mut rng).unwrap(),
            "Ada"
        );
    }

    #[test]
    fn literal_export_target() {
        let ast = vec![GrammarNode::MetaExport {
            key: "version".to_string(),
            value: Box::new(lit("1.0")),
        }];
        let program = Compiler::new().compile(&ast).unwrap();
        let mut rng = StdRng::seed_from_u64(6);
        assert_eq!(
            program
                .generate("version", &Default::default(), &mut rng)
                .unwrap(),
            "1.0"
        );
    }

    #[test]
    fn duplicate_export_key_last_wins() {
        let ast = vec![
            GrammarNode::MetaExport {
                key: "k".to_string(),
                value: Box::new(lit("first")),
            },
            GrammarNode::MetaExport {
                key: "k".to_string(),
                value: Box::new(lit("second")),
            },
        ];
        let program = Compiler::new().compile(&ast).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            program.generate("k", &Default::default(), &mut rng).unwrap(),
            "second"
        );
    }

    #[test]
    fn continuation_chance_is_clamped() {
        let compiler = Compiler::new().recursion_continue_chance(1.5);
        assert_eq!(compiler.continue_chance, Some(MAX_CONTINUE_CHANCE));
    }

    #[test]
    fn compiled_shape_is_deterministic() {
        let src = r#"[
            ScopeBlock(name: "animal", children: [
                Literal(text: "cat"),
                Identifier(path: "$mood"),
            ]),
            MetaExport(key: "animal", value: Identifier(path: "animal")),
        ]"#;
        let first = Compiler::new().compile_str(src).unwrap();
        let second = Compiler::new().compile_str(src).unwrap();
        assert_eq!(first.export_names(), second.export_names());
        assert_eq!(first.variable_names(), second.variable_names());
        assert_eq!(first.definition_names(), second.definition_names());
    }
}
