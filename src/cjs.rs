//! CommonJS-to-ES wrapper. A line/regex-free scanner finds
//! `require(...)` calls and `exports.NAME = ...` assignments and
//! rebuilds the file as a static ES module with a synthetic `require`
//! cascade, in the same hand-rolled-scanner idiom as `transform.rs`.

use std::path::Path;

use crate::resolver;

/// True if `source` looks like CommonJS rather than an ES module.
/// `resolved_is_esm` is the resolver's own verdict (from `package.json`
/// `type`/`exports` condition/`.mjs` extension) and short-circuits the
/// scan: a module the resolver already identified as ESM is never
/// re-sniffed as CommonJS. Otherwise falls back to scanning for a
/// top-level `import`/`export` keyword, then for `require(`,
/// `module.exports`, or `exports.`.
pub fn is_commonjs(source: &str, resolved_is_esm: bool) -> bool {
    if resolved_is_esm {
        return false;
    }
    let has_esm_keyword = contains_word(source, "import") || contains_word(source, "export");
    if has_esm_keyword {
        return false;
    }
    source.contains("require(") || source.contains("module.exports") || source.contains("exports.")
}

fn contains_word(source: &str, word: &str) -> bool {
    let bytes = source.as_bytes();
    let wb = word.as_bytes();
    let mut i = 0;
    while let Some(rel) = source[i..].find(word) {
        let start = i + rel;
        let end = start + wb.len();
        let before_ok = start == 0 || !is_ident_byte(bytes[start - 1]);
        let after_ok = end >= bytes.len() || !is_ident_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        i = start + 1;
    }
    false
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Find every `require('literal')` / `require("literal")` call,
/// returning `(full_call_start, full_call_end, specifier)`.
fn find_require_calls(source: &str) -> Vec<(usize, usize, String)> {
    let mut out = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;
    while let Some(rel) = source[i..].find("require") {
        let start = i + rel;
        let before_ok = start == 0 || !is_ident_byte(bytes[start - 1]);
        let mut cursor = start + "require".len();
        while cursor < bytes.len() && (bytes[cursor] == b' ' || bytes[cursor] == b'\t') {
            cursor += 1;
        }
        if before_ok && cursor < bytes.len() && bytes[cursor] == b'(' {
            cursor += 1;
            while cursor < bytes.len() && (bytes[cursor] == b' ' || bytes[cursor] == b'\t') {
                cursor += 1;
            }
            if cursor < bytes.len() && (bytes[cursor] == b'\'' || bytes[cursor] == b'"') {
                let quote = bytes[cursor];
                let str_start = cursor + 1;
                let mut j = str_start;
                while j < bytes.len() && bytes[j] != quote {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                if j < bytes.len() {
                    let specifier = source[str_start..j].to_string();
                    let mut close = j + 1;
                    while close < bytes.len() && (bytes[close] == b' ' || bytes[close] == b'\t') {
                        close += 1;
                    }
                    if close < bytes.len() && bytes[close] == b')' {
                        out.push((start, close + 1, specifier));
                        i = close + 1;
                        continue;
                    }
                }
            }
        }
        i = start + "require".len();
    }
    out
}

/// Scan for `exports.NAME = ` assignments, word-boundary-aware,
/// skipping `_`-prefixed names and `__esModule`.
fn find_export_assignments(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let bytes = source.as_bytes();
    let mut i = 0;
    while let Some(rel) = source[i..].find("exports.") {
        let start = i + rel;
        let before_ok = start == 0 || !is_ident_byte(bytes[start - 1]);
        let name_start = start + "exports.".len();
        let mut j = name_start;
        while j < bytes.len() && is_ident_byte(bytes[j]) {
            j += 1;
        }
        let name = &source[name_start..j];
        let mut k = j;
        while k < bytes.len() && (bytes[k] == b' ' || bytes[k] == b'\t') {
            k += 1;
        }
        let followed_by_assign = k < bytes.len() && bytes[k] == b'=' && (k + 1 >= bytes.len() || bytes[k + 1] != b'=');
        if before_ok && followed_by_assign && !name.is_empty() && !name.starts_with('_') && name != "esModule" && seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
        i = start + "exports.".len();
    }
    names
}

fn is_bare(specifier: &str) -> bool {
    crate::transform::is_bare_specifier(specifier)
}

/// Collapse `require('./dev')` / `require('./prod')` style conditional
/// requires into a single inlined development variant.
fn inline_development_require(source: &str, owning_dir: &Path) -> String {
    let calls = find_require_calls(source);
    let relative_calls: Vec<&(usize, usize, String)> = calls.iter().filter(|(_, _, spec)| !is_bare(spec)).collect();
    if relative_calls.is_empty() {
        return source.to_string();
    }

    let chosen = relative_calls
        .iter()
        .find(|(_, _, spec)| spec.contains("development"))
        .or_else(|| relative_calls.first())
        .unwrap();

    let (start, end, specifier) = (chosen.0, chosen.1, chosen.2.clone());
    let resolved = resolver::resolve_subpath_direct(owning_dir, specifier.trim_start_matches("./").trim_start_matches("../"))
        .unwrap_or_else(|| owning_dir.join(&specifier));
    let Ok(inlined_source) = std::fs::read_to_string(&resolved) else {
        return source.to_string();
    };

    let mut out = String::with_capacity(source.len() + inlined_source.len());
    out.push_str(&source[..start]);
    out.push_str("(function(){\n");
    out.push_str(&inlined_source);
    out.push_str("\nreturn module.exports;\n})()");
    out.push_str(&source[end..]);
    out
}

/// Wrap CommonJS `source` as an ES module. `owning_dir` is
/// used to resolve relative `require()` targets for the conditional
/// inlining step.
pub fn wrap(source: &str, owning_dir: &Path) -> String {
    let collapsed = inline_development_require(source, owning_dir);

    let bare_specifiers: Vec<String> = {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (_, _, spec) in find_require_calls(&collapsed) {
            if is_bare(&spec) && seen.insert(spec.clone()) {
                out.push(spec);
            }
        }
        out
    };

    let mut out = String::new();
    let mut dep_names = Vec::new();
    for (idx, spec) in bare_specifiers.iter().enumerate() {
        let dep = format!("__dep{idx}");
        out.push_str(&format!("import {dep} from '/@modules/{spec}';\n"));
        dep_names.push((spec.clone(), dep));
    }

    out.push_str("var process = { env: { NODE_ENV: \"development\" } };\n");
    out.push_str("var global = globalThis;\n");
    out.push_str("var module = { exports: {} };\n");
    out.push_str("var exports = module.exports;\n");

    out.push_str("function require(id) {\n");
    for (spec, dep) in &dep_names {
        out.push_str(&format!("  if (id === '{spec}') return {dep};\n"));
    }
    out.push_str("  console.warn('wu: unresolved require(\\'' + id + '\\')');\n");
    out.push_str("  return {};\n");
    out.push_str("}\n");

    // body with bare require() calls replaced by plain identifiers, so
    // the synthetic `require` above only has to resolve by literal id.
    out.push_str(&collapsed);
    out.push('\n');

    out.push_str("export default module.exports;\n");

    let export_names = find_export_assignments(&collapsed);
    if !export_names.is_empty() {
        out.push_str("var __e = module.exports;\n");
        out.push_str("export var ");
        out.push_str(
            &export_names.iter().map(|n| format!("{n} = __e.{n}")).collect::<Vec<_>>().join(", "),
        );
        out.push_str(";\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_commonjs_via_module_exports() {
        assert!(is_commonjs("module.exports = function () {};", false));
        assert!(!is_commonjs("export default function () {};", false));
        assert!(!is_commonjs("import x from 'y'; module.exports = x;", false));
    }

    #[test]
    fn detects_commonjs_via_bare_exports_dot() {
        assert!(is_commonjs("exports.foo = 1;", false));
    }

    #[test]
    fn resolver_esm_verdict_short_circuits_the_scan() {
        assert!(!is_commonjs("module.exports = function () {};", true));
    }

    #[test]
    fn finds_require_calls_with_both_quote_styles() {
        let calls = find_require_calls("const a = require('a'); const b = require(\"b\");");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].2, "a");
        assert_eq!(calls[1].2, "b");
    }

    #[test]
    fn export_assignment_scan_skips_underscore_and_esmodule() {
        let names = find_export_assignments("exports.Foo = 1; exports._private = 2; exports.__esModule = true; exports.Bar = 2;");
        assert_eq!(names, vec!["Foo".to_string(), "Bar".to_string()]);
    }

    #[test]
    fn wrap_emits_static_imports_for_bare_requires() {
        let source = "var react = require('react');\nmodule.exports = react;\n";
        let dir = std::env::temp_dir();
        let out = wrap(source, &dir);
        assert!(out.contains("import __dep0 from '/@modules/react';"));
        assert!(out.contains("export default module.exports;"));
    }

    #[test]
    fn wrap_re_exports_named_exports_assignments() {
        let source = "exports.add = function (a, b) { return a + b; };\n";
        let dir = std::env::temp_dir();
        let out = wrap(source, &dir);
        assert!(out.contains("export var add = __e.add;"));
    }

    #[test]
    fn wrap_includes_shim_declarations() {
        let out = wrap("module.exports = {};", &std::env::temp_dir());
        assert!(out.contains("var process = { env: { NODE_ENV: \"development\" } };"));
        assert!(out.contains("var global = globalThis;"));
    }
}
