//! Import statement normalisation.
//!
//! Each language's import syntax is reduced to dot-delimited raw keys that
//! the linker can split on `.`:
//!
//! | Source                                   | Keys                        |
//! |------------------------------------------|-----------------------------|
//! | `from ..pkg.mod import A, B as C`        | `..pkg.mod.A`, `..pkg.mod.B` |
//! | `import os.path as p, sys`               | `os.path`, `sys`            |
//! | `import { A, B as C } from '../lib/x.js'`| `..lib.x.A`, `..lib.x.B`    |
//! | `import Cart from './cart'`              | `.cart.Cart`                |
//! | `import * as util from 'node:util'`      | `util`                      |
//! | `require('./db')`                        | `.db`                       |
//! | `import "github.com/acme/shop/stock"`    | `github.com.acme.shop.stock`|
//!
//! Keys are stored uninterpreted; nothing here decides what they point at.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::Language;

/// Normalise one import statement's text into raw dependency keys.
pub fn normalize_import(language: Language, statement: &str) -> Vec<String> {
    match language {
        Language::Python => python_import(statement),
        Language::JavaScript | Language::TypeScript | Language::Tsx => js_import(statement),
        Language::Go => go_import(statement),
    }
}

/// Compile `pattern` once. A pattern that fails to compile disables the
/// rule that uses it instead of aborting extraction.
pub(crate) fn cached_regex(
    cell: &'static OnceLock<Option<Regex>>,
    pattern: &str,
) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Append `keys` to `out`, skipping ones already present.
pub fn push_unique(out: &mut Vec<String>, keys: Vec<String>) {
    for key in keys {
        if !key.is_empty() && !out.contains(&key) {
            out.push(key);
        }
    }
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

fn python_import(statement: &str) -> Vec<String> {
    // Parenthesised and backslash-continued lists collapse to one line.
    let flat: String = statement
        .replace(['(', ')', '\\'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if let Some(rest) = flat.strip_prefix("from ") {
        let Some((module, names)) = rest.split_once(" import ") else {
            return Vec::new();
        };
        let module = module.trim();
        return names
            .split(',')
            .filter_map(|n| n.split_whitespace().next())
            .map(|name| {
                if name == "*" {
                    module.to_string()
                } else if module.ends_with('.') {
                    format!("{module}{name}")
                } else {
                    format!("{module}.{name}")
                }
            })
            .collect();
    }

    if let Some(rest) = flat.strip_prefix("import ") {
        return rest
            .split(',')
            .filter_map(|part| part.split_whitespace().next())
            .map(str::to_string)
            .collect();
    }

    Vec::new()
}

// ---------------------------------------------------------------------------
// JavaScript / TypeScript
// ---------------------------------------------------------------------------

fn js_from_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r#"(?s)^\s*(?:import|export)\s+(?:type\s+)?(.*?)\s*from\s*['"]([^'"]+)['"]"#)
}

fn js_bare_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r#"^\s*import\s*['"]([^'"]+)['"]"#)
}

fn js_require_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#)
}

fn js_import(statement: &str) -> Vec<String> {
    if let Some(caps) = js_from_re().and_then(|re| re.captures(statement)) {
        let module = js_module_key(&caps[2]);
        return js_clause_keys(&caps[1], &module);
    }
    if let Some(caps) = js_bare_re().and_then(|re| re.captures(statement)) {
        return vec![js_module_key(&caps[1])];
    }
    let Some(re) = js_require_re() else {
        return Vec::new();
    };
    re.captures_iter(statement)
        .map(|caps| js_module_key(&caps[1]))
        .collect()
}

/// Keys for an import clause such as `Default, { A, B as C }` or `* as ns`.
fn js_clause_keys(clause: &str, module: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let clause = clause.trim();

    let (outside, named) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if close > open => (
            format!("{} {}", &clause[..open], &clause[close + 1..]),
            Some(&clause[open + 1..close]),
        ),
        _ => (clause.to_string(), None),
    };

    for part in outside.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part.starts_with('*') {
            keys.push(module.to_string());
        } else if is_identifier(part) {
            keys.push(format!("{module}.{part}"));
        }
    }

    if let Some(named) = named {
        for spec in named.split(',') {
            let name = spec
                .trim()
                .trim_start_matches("type ")
                .split_whitespace()
                .next()
                .unwrap_or("");
            if is_identifier(name) {
                keys.push(format!("{module}.{name}"));
            }
        }
    }

    if keys.is_empty() {
        keys.push(module.to_string());
    }
    keys
}

/// `./a/b.js` -> `.a.b`, `../../x` -> `...x`, `@scope/pkg` -> `@scope.pkg`.
pub fn js_module_key(specifier: &str) -> String {
    let mut spec = specifier.trim().trim_start_matches("node:");
    for ext in [".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs", ".mts", ".cts"] {
        if let Some(stripped) = spec.strip_suffix(ext) {
            spec = stripped;
            break;
        }
    }

    let mut prefix = String::new();
    loop {
        if let Some(rest) = spec.strip_prefix("./") {
            if prefix.is_empty() {
                prefix.push('.');
            }
            spec = rest;
        } else if let Some(rest) = spec.strip_prefix("../") {
            prefix.push_str(if prefix.is_empty() { ".." } else { "." });
            spec = rest;
        } else {
            break;
        }
    }

    let body = spec
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(".");
    format!("{prefix}{body}")
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

// ---------------------------------------------------------------------------
// Go
// ---------------------------------------------------------------------------

fn go_path_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r#""([^"]+)"|`([^`]+)`"#)
}

fn go_import(statement: &str) -> Vec<String> {
    let Some(re) = go_path_re() else {
        return Vec::new();
    };
    re.captures_iter(statement)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().replace('/', "."))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
