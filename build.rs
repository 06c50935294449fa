// Compiles rules/rules.json into the two fuzzy rule tables: a Rust array
// included by src/url_rewriting/fuzzy.rs and a JavaScript array emitted into
// the bundle next to the runtime helper. Keeping a single source file is what
// guarantees the offline and in-browser engines cannot drift apart.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=rules/rules.json");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));

    let raw = fs::read_to_string(manifest_dir.join("rules/rules.json"))
        .expect("rules/rules.json is missing");
    let doc: serde_json::Value = serde_json::from_str(&raw).expect("rules/rules.json is not JSON");
    let rules = doc["fuzzyRules"]
        .as_array()
        .expect("rules/rules.json has no fuzzyRules array");

    let mut rust_table = String::new();
    writeln!(
        rust_table,
        "// Generated from rules/rules.json by build.rs. Do not edit."
    )
    .unwrap();
    writeln!(
        rust_table,
        "pub(crate) static DEFAULT_RULE_TABLE: &[(&str, &str)] = &["
    )
    .unwrap();

    let mut js_table = String::new();
    writeln!(
        js_table,
        "// Generated from rules/rules.json by build.rs. Do not edit."
    )
    .unwrap();
    writeln!(js_table, "var ZIM_FUZZY_RULES = [").unwrap();

    for rule in rules {
        let pattern = rule["pattern"].as_str().expect("rule without pattern");
        let replace = rule["replace"].as_str().expect("rule without replace");

        // serde_json string output uses only \\ \" \n escapes on this input,
        // valid in both a Rust and a JavaScript string literal.
        let pattern_lit = serde_json::to_string(pattern).unwrap();
        let replace_lit = serde_json::to_string(replace).unwrap();

        writeln!(rust_table, "    ({pattern_lit}, {replace_lit}),").unwrap();
        writeln!(
            js_table,
            "  {{ match: {pattern_lit}, replace: {replace_lit} }},"
        )
        .unwrap();
    }

    writeln!(rust_table, "];").unwrap();
    writeln!(js_table, "];").unwrap();

    fs::write(out_dir.join("fuzzy_rules.rs"), rust_table).expect("write fuzzy_rules.rs");
    fs::write(out_dir.join("fuzzy_rules.js"), js_table).expect("write fuzzy_rules.js");
}
