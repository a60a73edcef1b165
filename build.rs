use std::fmt::Write as _;
use std::path::Path;
use std::{env, fs};

const DEFAULT_LOCALE: &str = "en";
const LOCALES_DIR: &str = "locales";

fn main() {
    println!("cargo:rerun-if-changed={LOCALES_DIR}");

    let mut locales = Vec::new();
    let entries = fs::read_dir(LOCALES_DIR).expect("locales directory must exist");
    for entry in entries {
        let path = entry.expect("locale entry must be readable").path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        println!("cargo:rerun-if-changed={}", path.display());

        let locale = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .expect("locale file name must be valid utf-8")
            .to_string();
        let source = fs::read_to_string(&path).expect("locale file must be readable");
        let table = source
            .parse::<toml::Table>()
            .unwrap_or_else(|error| panic!("invalid locale file {}: {error}", path.display()));

        let mut messages = Vec::new();
        flatten("", &table, &mut messages);
        messages.sort();
        locales.push((locale, messages));
    }
    locales.sort();

    let mut generated = String::new();
    writeln!(generated, "pub const DEFAULT_LOCALE: &str = {DEFAULT_LOCALE:?};").unwrap();
    writeln!(
        generated,
        "pub static LOCALES: &[(&str, &[(&str, &str)])] = &["
    )
    .unwrap();
    for (locale, messages) in &locales {
        writeln!(generated, "    ({locale:?}, &[").unwrap();
        for (key, value) in messages {
            writeln!(generated, "        ({key:?}, {value:?}),").unwrap();
        }
        writeln!(generated, "    ]),").unwrap();
    }
    writeln!(generated, "];").unwrap();

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    fs::write(
        Path::new(&out_dir).join("inform_i18n_generated.rs"),
        generated,
    )
    .expect("generated catalog must be writable");
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut Vec<(String, String)>) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::String(message) => out.push((path, message.clone())),
            toml::Value::Table(nested) => flatten(&path, nested, out),
            other => panic!("locale key {path} must be a string or table, got {other:?}"),
        }
    }
}
