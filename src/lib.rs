//! Fabler — a compiler for declarative generative grammars.
//!
//! Turns a parsed grammar AST (nested choice/concatenation blocks,
//! variables, imports, string transforms) into a `CompiledProgram`: an
//! arena of lazily-evaluated, randomly-resolving thunks with named entry
//! points and caller-overridable variables. Forcing an entry point yields
//! a fresh randomized string on every call.

pub mod core;
pub mod schema;
