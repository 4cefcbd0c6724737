//! Per-language environment injection.
//!
//! The remote engine keeps no state between jobs, so a session's env is
//! replayed as a source preamble in front of every submission. Languages
//! without an entry in [`INJECTORS`] are submitted unchanged.

use std::collections::BTreeMap;

use j0_core::Language;

/// Renders the preamble for one language.
pub type Injector = fn(&BTreeMap<String, String>) -> String;

/// Language -> preamble template.
pub const INJECTORS: &[(Language, Injector)] = &[
    (Language::Bash, shell_preamble),
    (Language::Python, python_preamble),
    (Language::JavaScript, javascript_preamble),
    (Language::Ruby, ruby_preamble),
];

/// Look up the injector for `language`, falling back to a no-op.
#[must_use]
pub fn injector_for(language: Language) -> Injector {
    INJECTORS
        .iter()
        .find(|(candidate, _)| *candidate == language)
        .map_or(no_preamble, |(_, injector)| *injector)
}

/// Prepend the env preamble for `language` to `code`.
#[must_use]
pub fn inject(language: Language, env: &BTreeMap<String, String>, code: &str) -> String {
    if env.is_empty() {
        return code.to_string();
    }
    let mut source = injector_for(language)(env);
    source.push_str(code);
    source
}

/// Whether `key` is usable as a variable name in every template.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn no_preamble(_env: &BTreeMap<String, String>) -> String {
    String::new()
}

fn shell_preamble(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(key, value)| format!("export {key}=\"{}\"\n", escape_shell(value)))
        .collect()
}

fn python_preamble(env: &BTreeMap<String, String>) -> String {
    let mut preamble = String::from("import os\n");
    for (key, value) in env {
        preamble.push_str(&format!(
            "os.environ['{}']='{}'\n",
            escape_single_quoted(key),
            escape_single_quoted(value)
        ));
    }
    preamble
}

fn javascript_preamble(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(key, value)| {
            format!(
                "process.env[{}] = {};\n",
                double_quoted(key),
                double_quoted(value)
            )
        })
        .collect()
}

fn ruby_preamble(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(key, value)| {
            format!(
                "ENV[{}] = {}\n",
                double_quoted(key).replace('#', "\\#"),
                double_quoted(value).replace('#', "\\#")
            )
        })
        .collect()
}

fn escape_shell(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn escape_single_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// JSON string literals are valid JavaScript and Ruby string literals.
fn double_quoted(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
