/// Transform pipelines — compiled regex rewrite rules and native
/// callables, applied to forced strings at generation time.
///
/// Patterns are compiled once at import-resolution time, case-insensitive,
/// matching anywhere in the input; a match replaces the first occurrence.

use regex::{Regex, RegexBuilder};
use std::fmt;
use thiserror::Error;

use crate::schema::module::{ModuleFunction, NativeFn, PipelineRule};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid rewrite pattern '{pattern}': {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },
}

/// One compiled step of a pipeline.
#[derive(Clone)]
pub enum CompiledRule {
    Rewrite { regex: Regex, replacement: String },
    Call(NativeFn),
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledRule::Rewrite { regex, replacement } => f
                .debug_struct("Rewrite")
                .field("regex", &regex.as_str())
                .field("replacement", replacement)
                .finish(),
            CompiledRule::Call(_) => f.debug_tuple("Call").field(&"<native>").finish(),
        }
    }
}

/// A resolved imported function, registered under its qualified
/// identifier (`alias__name`).
#[derive(Clone)]
pub enum CompiledFunction {
    Native(NativeFn),
    Pipeline(Vec<CompiledRule>),
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledFunction::Native(_) => f.debug_tuple("Native").field(&"<native>").finish(),
            CompiledFunction::Pipeline(rules) => {
                f.debug_tuple("Pipeline").field(rules).finish()
            }
        }
    }
}

/// Compile a module function's rules for the runtime.
pub fn compile_function(function: &ModuleFunction) -> Result<CompiledFunction, TransformError> {
    match function {
        ModuleFunction::Native(f) => Ok(CompiledFunction::Native(f.clone())),
        ModuleFunction::Pipeline(rules) => {
            let mut compiled = Vec::with_capacity(rules.len());
            for rule in rules {
                compiled.push(match rule {
                    PipelineRule::Rewrite(rewrite) => CompiledRule::Rewrite {
                        regex: RegexBuilder::new(&rewrite.pattern)
                            .case_insensitive(true)
                            .build()
                            .map_err(|source| TransformError::BadPattern {
                                pattern: rewrite.pattern.clone(),
                                source,
                            })?,
                        replacement: rewrite.replacement.clone(),
                    },
                    PipelineRule::Call(f) => CompiledRule::Call(f.clone()),
                });
            }
            Ok(CompiledFunction::Pipeline(compiled))
        }
    }
}

/// Run a pipeline over an input string.
///
/// The first rewrite rule whose pattern matches replaces the first match
/// and short-circuits the remaining rewrite rules. Callable rules always
/// apply and never short-circuit.
pub fn apply_pipeline(input: &str, rules: &[CompiledRule]) -> String {
    let mut text = input.to_string();
    let mut rewritten = false;
    for rule in rules {
        match rule {
            CompiledRule::Rewrite { regex, replacement } => {
                if !rewritten && regex.is_match(&text) {
                    text = regex.replace(&text, replacement.as_str()).into_owned();
                    rewritten = true;
                }
            }
            CompiledRule::Call(f) => {
                text = f(&[text]);
            }
        }
    }
    text
}

/// Invoke a compiled function with forced argument strings.
pub fn invoke(function: &CompiledFunction, args: &[String]) -> String {
    match function {
        CompiledFunction::Native(f) => f(args),
        CompiledFunction::Pipeline(rules) => apply_pipeline(&args.concat(), rules),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::module::RewriteRule;
    use std::sync::Arc;

    fn rewrite(pattern: &str, replacement: &str) -> CompiledRule {
        CompiledRule::Rewrite {
            regex: RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .unwrap(),
            replacement: replacement.to_string(),
        }
    }

    fn suffix_bang() -> CompiledRule {
        CompiledRule::Call(Arc::new(|args: &[String]| format!("{}!", args.concat())))
    }

    #[test]
    fn first_matching_rewrite_stops_later_rewrites() {
        let rules = vec![rewrite("a+", "b"), rewrite("b", "z")];
        assert_eq!(apply_pipeline("aaa", &rules), "b");
    }

    #[test]
    fn non_matching_rewrite_is_skipped() {
        let rules = vec![rewrite("q", "x"), rewrite("a+", "b")];
        assert_eq!(apply_pipeline("aaa", &rules), "b");
    }

    #[test]
    fn callable_applies_after_rewrite_match() {
        // A matched rewrite stops further rewrites, not callables.
        let rules = vec![rewrite("a+", "b"), suffix_bang()];
        assert_eq!(apply_pipeline("aaa", &rules), "b!");
    }

    #[test]
    fn callable_before_rewrite_does_not_short_circuit() {
        let rules = vec![suffix_bang(), rewrite("a+", "b")];
        assert_eq!(apply_pipeline("aaa", &rules), "b");
    }

    #[test]
    fn match_is_case_insensitive() {
        let rules = vec![rewrite("cat", "dog")];
        assert_eq!(apply_pipeline("CAT nap", &rules), "dog nap");
    }

    #[test]
    fn replaces_first_match_only() {
        let rules = vec![rewrite("a", "x")];
        assert_eq!(apply_pipeline("banana", &rules), "bxnana");
    }

    #[test]
    fn no_match_passes_through() {
        let rules = vec![rewrite("z+", "q")];
        assert_eq!(apply_pipeline("hello", &rules), "hello");
    }

    #[test]
    fn bad_pattern_is_a_compile_error() {
        let function = ModuleFunction::Pipeline(vec![PipelineRule::Rewrite(RewriteRule {
            pattern: "(".to_string(),
            replacement: "x".to_string(),
        })]);
        assert!(compile_function(&function).is_err());
    }

    #[test]
    fn invoke_pipeline_concatenates_args() {
        let function = compile_function(&ModuleFunction::Pipeline(vec![PipelineRule::Rewrite(
            RewriteRule {
                pattern: "y$".to_string(),
                replacement: "ies".to_string(),
            },
        )]))
        .unwrap();
        assert_eq!(
            invoke(&function, &["pon".to_string(), "y".to_string()]),
            "ponies"
        );
    }

    #[test]
    fn invoke_native_receives_all_args() {
        let function = CompiledFunction::Native(Arc::new(|args: &[String]| {
            args.join("-")
        }));
        assert_eq!(
            invoke(&function, &["a".to_string(), "b".to_string()]),
            "a-b"
        );
    }
}
