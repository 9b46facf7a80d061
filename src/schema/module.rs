/// Function modules — the import interface of the compiler.
///
/// A grammar's `@import "file" as alias` directive names a module; the
/// registry maps module paths to a set of named functions. Rewrite-rule
/// functions can be declared in RON files, native functions are registered
/// programmatically by the host.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A host-provided string transform: forced argument strings in,
/// transformed string out.
pub type NativeFn = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

/// A case-insensitive first-match rewrite: `pattern` is a regex, the first
/// match anywhere in the input is replaced with `replacement`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RewriteRule {
    pub pattern: String,
    pub replacement: String,
}

/// One step of a transform pipeline.
#[derive(Clone)]
pub enum PipelineRule {
    /// Pattern/replacement pair. A match replaces and stops further
    /// rewrite rules in the pipeline.
    Rewrite(RewriteRule),
    /// Callable transform. Always applies and never short-circuits.
    Call(NativeFn),
}

impl fmt::Debug for PipelineRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineRule::Rewrite(rule) => f.debug_tuple("Rewrite").field(rule).finish(),
            PipelineRule::Call(_) => f.debug_tuple("Call").field(&"<native>").finish(),
        }
    }
}

/// A named function exposed by a module.
#[derive(Clone)]
pub enum ModuleFunction {
    /// Direct native callable.
    Native(NativeFn),
    /// Ordered rule pipeline applied to the concatenated arguments.
    Pipeline(Vec<PipelineRule>),
}

impl fmt::Debug for ModuleFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleFunction::Native(_) => f.debug_tuple("Native").field(&"<native>").finish(),
            ModuleFunction::Pipeline(rules) => f.debug_tuple("Pipeline").field(rules).finish(),
        }
    }
}

/// A module's mapping from function name to function.
#[derive(Debug, Clone, Default)]
pub struct FunctionModule {
    pub functions: FxHashMap<String, ModuleFunction>,
}

impl FunctionModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native callable under `name`.
    pub fn register_native<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        self.functions
            .insert(name.to_string(), ModuleFunction::Native(Arc::new(f)));
    }

    /// Register a rule pipeline under `name`.
    pub fn register_pipeline(&mut self, name: &str, rules: Vec<PipelineRule>) {
        self.functions
            .insert(name.to_string(), ModuleFunction::Pipeline(rules));
    }

    /// Load a module of rewrite-rule pipelines from a RON file.
    ///
    /// The file holds a map from function name to a list of
    /// `(pattern, replacement)` rules:
    ///
    /// ```ron
    /// {
    ///     "pluralize": [
    ///         (pattern: "y$", replacement: "ies"),
    ///         (pattern: "$", replacement: "s"),
    ///     ],
    /// }
    /// ```
    pub fn load_from_ron(path: &Path) -> Result<FunctionModule, ModuleError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a rewrite-rule module from a RON string.
    pub fn parse_ron(input: &str) -> Result<FunctionModule, ModuleError> {
        let raw: FxHashMap<String, Vec<RewriteRule>> = ron::from_str(input)?;
        let mut module = FunctionModule::new();
        for (name, rules) in raw {
            let rules = rules.into_iter().map(PipelineRule::Rewrite).collect();
            module.functions.insert(name, ModuleFunction::Pipeline(rules));
        }
        Ok(module)
    }
}

/// Registry of modules available to `@import` directives, keyed by the
/// path the grammar names. Paths with no registered module fall back to
/// the filesystem (a RON rule module at that path).
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: FxHashMap<String, FunctionModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &str, module: FunctionModule) {
        self.modules.insert(path.to_string(), module);
    }

    /// Resolve a module path: registered modules first, then a RON rule
    /// file on disk. `Ok(None)` means no module exists at the path; a
    /// file that exists but fails to load surfaces its load error so the
    /// diagnostic names the actual cause.
    pub fn resolve(&self, path: &str) -> Result<Option<FunctionModule>, ModuleError> {
        if let Some(module) = self.modules.get(path) {
            return Ok(Some(module.clone()));
        }
        let fs_path = Path::new(path);
        if fs_path.is_file() {
            return FunctionModule::load_from_ron(fs_path).map(Some);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rule_module() {
        let src = r#"{
            "pluralize": [
                (pattern: "y$", replacement: "ies"),
                (pattern: "$", replacement: "s"),
            ],
        }"#;
        let module = FunctionModule::parse_ron(src).unwrap();
        assert_eq!(module.functions.len(), 1);
        match &module.functions["pluralize"] {
            ModuleFunction::Pipeline(rules) => assert_eq!(rules.len(), 2),
            other => panic!("unexpected function: {:?}", other),
        }
    }

    #[test]
    fn register_native_function() {
        let mut module = FunctionModule::new();
        module.register_native("shout", |args: &[String]| {
            args.concat().to_uppercase()
        });
        match &module.functions["shout"] {
            ModuleFunction::Native(f) => {
                assert_eq!(f(&["hey".to_string()]), "HEY");
            }
            other => panic!("unexpected function: {:?}", other),
        }
    }

    #[test]
    fn registry_resolves_registered_module() {
        let mut registry = ModuleRegistry::new();
        registry.register("lang/english", FunctionModule::new());
        assert!(registry.resolve("lang/english").unwrap().is_some());
        assert!(registry.resolve("lang/missing").unwrap().is_none());
    }
}
