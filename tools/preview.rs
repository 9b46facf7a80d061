/// Preview — compile a grammar AST file and print generated samples.
///
/// Usage: preview --grammar <ast.ron> [--seed <n>] [--count <n>] [--set var=value ...]
///
/// Each export of the compiled grammar is forced `count` times. Imports
/// that name RON rule-module files are resolved from the filesystem.

use fabler::core::compile::Compiler;
use fabler::core::program::Overrides;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut grammar_path = None;
    let mut seed: u64 = 42;
    let mut count: usize = 5;
    let mut overrides = Overrides::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--grammar" if i + 1 < args.len() => {
                i += 1;
                grammar_path = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            "--count" if i + 1 < args.len() => {
                i += 1;
                count = args[i].parse().unwrap_or(5);
            }
            "--set" if i + 1 < args.len() => {
                i += 1;
                match args[i].split_once('=') {
                    Some((name, value)) => {
                        overrides.insert(name.to_string(), value.to_string());
                    }
                    None => {
                        eprintln!("--set expects var=value, got '{}'", args[i]);
                        process::exit(1);
                    }
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let grammar_path = match grammar_path {
        Some(p) => p,
        None => {
            eprintln!("ERROR: --grammar is required");
            print_usage();
            process::exit(1);
        }
    };

    let program = match Compiler::new().compile_file(Path::new(&grammar_path)) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("ERROR: compilation failed: {}", e);
            process::exit(1);
        }
    };

    let variables = program.variable_names();
    if !variables.is_empty() {
        println!("Overridable variables: {}", variables.join(", "));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    for export in program.export_names() {
        println!("== {} ==", export);
        for _ in 0..count {
            match program.generate(export, &overrides, &mut rng) {
                Ok(text) => println!("  {}", text),
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    process::exit(1);
                }
            }
        }
    }
}

fn print_usage() {
    println!(
        "Usage: preview --grammar <ast.ron> [--seed <n>] [--count <n>] [--set var=value ...]"
    );
}
