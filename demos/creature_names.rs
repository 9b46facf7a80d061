/// Creature name generator — a small end-to-end tour of the compiler.
///
/// Builds a grammar with nested blocks, a weighted alternative, an
/// optional tag, an overridable variable, and an imported transform
/// module, then generates names with and without overrides.

use fabler::core::compile::Compiler;
use fabler::core::program::Overrides;
use fabler::schema::module::FunctionModule;
use rand::rngs::StdRng;
use rand::SeedableRng;

const GRAMMAR: &str = r#"[
    MetaImport(file: "lang/english", alias: "english"),
    ScopeBlock(name: "part", children: [
        ScopeBlock(name: "prefix", children: [
            Literal(text: "grim"),
            Literal(text: "ember"),
            Literal(text: "shadow"),
            Literal(text: "thorn"),
        ]),
        ScopeBlock(name: "suffix", children: [
            Literal(text: "fang"),
            Literal(text: "claw"),
            Literal(text: "maw"),
        ]),
    ]),
    ScopeBlock(name: "name", children: [
        InterpolatedString(children: [
            Identifier(path: "part.prefix"),
            Identifier(path: "part.suffix"),
        ]),
        // Double-barreled names show up twice as often.
        InterpolatedString(weight: 2, children: [
            Identifier(path: "part.prefix"),
            Literal(text: "-"),
            Identifier(path: "part.suffix"),
        ]),
    ]),
    ScopeBlock(name: "mood", children: [
        Literal(text: "restless"),
        Literal(text: "sleepy"),
    ]),
    ScopeBlock(name: "sighting", children: [
        InterpolatedString(children: [
            Literal(text: "a "),
            Tag(quantifier: Some('?'), children: [
                InterpolatedString(children: [
                    Identifier(path: "$mood"),
                    Literal(text: " "),
                ]),
            ]),
            Identifier(path: "name"),
        ]),
    ]),
    ScopeBlock(name: "pack", children: [
        InterpolatedString(children: [
            Literal(text: "a pack of "),
            Call(function: "english.pluralize", args: [Identifier(path: "name")]),
        ]),
    ]),
    MetaExport(key: "name", value: Identifier(path: "name")),
    MetaExport(key: "sighting", value: Identifier(path: "sighting")),
    MetaExport(key: "pack", value: Identifier(path: "pack")),
]"#;

const ENGLISH_RULES: &str = r#"{
    "pluralize": [
        (pattern: "y$", replacement: "ies"),
        (pattern: "(s|x|z|ch|sh)$", replacement: "${1}es"),
        (pattern: "$", replacement: "s"),
    ],
}"#;

fn main() {
    let english = FunctionModule::parse_ron(ENGLISH_RULES).expect("valid rule module");
    let program = Compiler::new()
        .with_module("lang/english", english)
        .compile_str(GRAMMAR)
        .expect("grammar compiles");

    let mut rng = StdRng::seed_from_u64(2024);

    println!("Entry points: {}", program.export_names().join(", "));
    println!("Variables:    {}", program.variable_names().join(", "));
    println!();

    for export in ["name", "sighting", "pack"] {
        println!("== {} ==", export);
        for _ in 0..5 {
            let text = program
                .generate(export, &Overrides::new(), &mut rng)
                .expect("known entry point");
            println!("  {}", text);
        }
        println!();
    }

    // Variable overrides pin a value for one generation pass.
    let mut overrides = Overrides::new();
    overrides.insert("mood".to_string(), "ferocious".to_string());
    println!("== sighting (mood=ferocious) ==");
    for _ in 0..5 {
        let text = program
            .generate("sighting", &overrides, &mut rng)
            .expect("known entry point");
        println!("  {}", text);
    }
}
