/// Compiled program — the thunk arena and its evaluation semantics.
///
/// Thunks are built once at compile time and never memoize their results:
/// each force may produce a different string. Choice pools are flattened
/// (weights expanded in place) before the first force; selection is
/// uniform per force. The override table is threaded as an explicit
/// parameter through every force call, so concurrent generation passes
/// are independent.

use rand::rngs::StdRng;
use rand::Rng;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use thiserror::Error;

use crate::core::transform::{self, CompiledFunction};

/// Index of a thunk in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThunkId(pub(crate) usize);

/// Index of an imported function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FnId(pub(crate) usize);

/// Caller-supplied variable overrides for one generation pass.
pub type Overrides = HashMap<String, String>;

/// A deferred, repeatable computation producing a string.
#[derive(Debug, Clone)]
pub enum Thunk {
    /// Fixed text.
    Literal(String),
    /// Uniform selection from a pre-flattened candidate pool. Weighted
    /// branches appear multiple times in the pool.
    Choice(Vec<ThunkId>),
    /// Children forced in order and joined with no separator.
    Concat(Vec<ThunkId>),
    /// Non-empty override returned verbatim, otherwise the fallback is
    /// forced.
    VarRef { name: String, fallback: ThunkId },
    /// Lazy self-reference: continue with `continue_chance`, otherwise
    /// produce the empty string. `continue_chance` is strictly below 1,
    /// so evaluation terminates with probability 1.
    Recurse { target: ThunkId, continue_chance: f64 },
    /// Imported function applied to forced argument strings.
    Call { function: FnId, args: Vec<ThunkId> },
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("unknown entry point: {0}")]
    UnknownEntry(String),
}

/// The durable compilation artifact, reused across many generation calls.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub(crate) arena: Vec<Thunk>,
    pub(crate) definitions: FxHashMap<String, ThunkId>,
    pub(crate) exports: FxHashMap<String, ThunkId>,
    pub(crate) functions: Vec<CompiledFunction>,
    pub(crate) variables: Vec<String>,
}

impl CompiledProgram {
    /// Generate a string from a named entry point. Every call is a fresh
    /// generation pass; the same overrides and RNG state give the same
    /// result.
    pub fn generate(
        &self,
        entry: &str,
        overrides: &Overrides,
        rng: &mut StdRng,
    ) -> Result<String, GenerateError> {
        let id = self
            .exports
            .get(entry)
            .copied()
            .ok_or_else(|| GenerateError::UnknownEntry(entry.to_string()))?;
        Ok(self.force(id, overrides, rng))
    }

    /// Look up an entry point as a reusable handle.
    pub fn entry(&self, key: &str) -> Option<EntryPoint<'_>> {
        self.exports.get(key).map(|id| EntryPoint {
            program: self,
            root: *id,
        })
    }

    /// Export keys, sorted.
    pub fn export_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Overridable variable names, sorted.
    pub fn variable_names(&self) -> &[String] {
        &self.variables
    }

    /// Generated identifiers with a definition, sorted. Exposed for
    /// tooling (linter, preview).
    pub fn definition_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn force(&self, id: ThunkId, overrides: &Overrides, rng: &mut StdRng) -> String {
        match &self.arena[id.0] {
            Thunk::Literal(text) => text.clone(),
            Thunk::Choice(pool) => {
                if pool.is_empty() {
                    return String::new();
                }
                let pick = pool[rng.gen_range(0..pool.len())];
                self.force(pick, overrides, rng)
            }
            Thunk::Concat(children) => children
                .iter()
                .map(|child| self.force(*child, overrides, rng))
                .collect(),
            Thunk::VarRef { name, fallback } => match overrides.get(name) {
                Some(value) if !value.is_empty() => value.clone(),
                _ => self.force(*fallback, overrides, rng),
            },
            Thunk::Recurse {
                target,
                continue_chance,
            } => {
                if rng.gen_bool(*continue_chance) {
                    self.force(*target, overrides, rng)
                } else {
                    String::new()
                }
            }
            Thunk::Call { function, args } => {
                let forced: Vec<String> = args
                    .iter()
                    .map(|arg| self.force(*arg, overrides, rng))
                    .collect();
                transform::invoke(&self.functions[function.0], &forced)
            }
        }
    }
}

/// A resolved entry point bound to its program.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint<'a> {
    program: &'a CompiledProgram,
    root: ThunkId,
}

impl EntryPoint<'_> {
    /// Force the entry thunk under an optional override table.
    pub fn invoke(&self, overrides: Option<&Overrides>, rng: &mut StdRng) -> String {
        let empty = Overrides::new();
        self.program
            .force(self.root, overrides.unwrap_or(&empty), rng)
    }
}
