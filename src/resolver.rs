//! npm-style module resolver. The `package.json` reader is a
//! hand-rolled brace-depth scanner, not `serde_json` — the full document
//! is rarely well-formed enough for strict deserialization across the
//! npm ecosystem, and we only ever need a handful of top-level fields.

use std::path::{Path, PathBuf};

const CONDITION_PRIORITY: &[&str] = &["import", "module", "browser", "default", "require"];

#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub file_path: PathBuf,
    pub package_dir: PathBuf,
    pub is_esm: bool,
}

/// Top-level fields of a `package.json`, kept as raw (unresolved) JSON
/// text so condition objects can be resolved lazily against a subpath.
struct PackageFields {
    exports: Option<String>,
    module: Option<String>,
    main: Option<String>,
    typ: Option<String>,
    imports: Option<String>,
}

fn is_ws(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\n' || b == b'\r'
}

/// Parse the top-level (depth-1) `"key": value` entries of a JSON
/// object, skipping string bodies (honoring backslash escapes). Returns
/// raw, untrimmed-of-braces value text for each key.
fn outer_object_entries(text: &str) -> Vec<(String, String)> {
    let bytes = text.as_bytes();
    let n = bytes.len();
    let start = match bytes.iter().position(|&b| b == b'{') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let mut i = start + 1;
    let mut entries = Vec::new();

    loop {
        while i < n && is_ws(bytes[i]) {
            i += 1;
        }
        if i < n && bytes[i] == b',' {
            i += 1;
            continue;
        }
        if i >= n || bytes[i] == b'}' {
            break;
        }
        if bytes[i] != b'"' {
            break;
        }

        let key_start = i + 1;
        let mut j = key_start;
        while j < n {
            if bytes[j] == b'\\' {
                j += 2;
                continue;
            }
            if bytes[j] == b'"' {
                break;
            }
            j += 1;
        }
        if j >= n {
            break;
        }
        let key = text[key_start..j].to_string();
        i = j + 1;

        while i < n && is_ws(bytes[i]) {
            i += 1;
        }
        if i >= n || bytes[i] != b':' {
            break;
        }
        i += 1;
        while i < n && is_ws(bytes[i]) {
            i += 1;
        }
        if i >= n {
            break;
        }

        let value_start = i;
        match bytes[i] {
            b'"' => {
                let mut k = i + 1;
                while k < n {
                    if bytes[k] == b'\\' {
                        k += 2;
                        continue;
                    }
                    if bytes[k] == b'"' {
                        k += 1;
                        break;
                    }
                    k += 1;
                }
                i = k;
            }
            open @ (b'{' | b'[') => {
                let close = if open == b'{' { b'}' } else { b']' };
                let mut depth = 1i32;
                let mut k = i + 1;
                while k < n && depth > 0 {
                    if bytes[k] == b'"' {
                        k += 1;
                        while k < n {
                            if bytes[k] == b'\\' {
                                k += 2;
                                continue;
                            }
                            if bytes[k] == b'"' {
                                k += 1;
                                break;
                            }
                            k += 1;
                        }
                        continue;
                    }
                    if bytes[k] == open {
                        depth += 1;
                    } else if bytes[k] == close {
                        depth -= 1;
                    }
                    k += 1;
                }
                i = k;
            }
            _ => {
                let mut k = i;
                while k < n && bytes[k] != b',' && bytes[k] != b'}' {
                    k += 1;
                }
                i = k;
            }
        }

        entries.push((key, text[value_start..i].trim().to_string()));
    }

    entries
}

fn unquote(raw: &str) -> String {
    let t = raw.trim();
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
        t[1..t.len() - 1].replace("\\\"", "\"").replace("\\/", "/").replace("\\\\", "\\")
    } else {
        t.to_string()
    }
}

/// Extract a single top-level string field (e.g. `"name"`) from a raw
/// `package.json` document.
pub fn extract_string_field(json: &str, key: &str) -> Option<String> {
    outer_object_entries(json).into_iter().find(|(k, _)| k == key).map(|(_, v)| unquote(&v))
}

fn read_package_json(path: &Path) -> Option<PackageFields> {
    let content = std::fs::read_to_string(path).ok()?;
    let entries = outer_object_entries(&content);
    let get = |k: &str| entries.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
    Some(PackageFields {
        exports: get("exports"),
        module: get("module"),
        main: get("main"),
        typ: get("type"),
        imports: get("imports"),
    })
}

fn is_types_value(s: &str) -> bool {
    let u = unquote(s);
    u.ends_with(".d.ts") || u.ends_with(".d.mts")
}

/// Resolve a condition-keyed value (string, subpath map, or nested
/// condition object) to a final string, honoring priority order. The
/// bool tags whether the `"import"` condition was the one that led to
/// this value at any level of nesting — callers use it as one of the
/// ESM signals for `ResolvedModule::is_esm`.
fn resolve_condition_value(raw: &str, priority: &[&str]) -> Option<(String, bool)> {
    let t = raw.trim();
    if t.starts_with('"') {
        if is_types_value(t) {
            return None;
        }
        return Some((unquote(t), false));
    }
    if t.starts_with('{') {
        let entries = outer_object_entries(t);
        for cond in priority {
            if let Some((_, v)) = entries.iter().find(|(k, _)| k == cond) {
                if let Some((resolved, nested_import)) = resolve_condition_value(v, priority) {
                    return Some((resolved, nested_import || *cond == "import"));
                }
            }
        }
    }
    None
}

/// Resolve `exports` for a specific subpath key (`"."` for the root, or
/// `"./foo"` for a subpath), handling the plain-string / subpath-map /
/// conditions-object shapes `exports` can take.
fn resolve_exports_entry(exports_raw: &str, subpath_key: &str) -> Option<(String, bool)> {
    let t = exports_raw.trim();
    if t.starts_with('"') {
        return if subpath_key == "." { Some((unquote(t), false)) } else { None };
    }
    if t.starts_with('{') {
        let entries = outer_object_entries(t);
        let is_subpath_map = entries.iter().any(|(k, _)| k.starts_with('.'));
        if is_subpath_map {
            let (_, v) = entries.iter().find(|(k, _)| k == subpath_key)?;
            return resolve_condition_value(v, CONDITION_PRIORITY);
        }
        if subpath_key == "." {
            return resolve_condition_value(t, CONDITION_PRIORITY);
        }
    }
    None
}

fn resolve_package_root(dir: &Path, fields: &PackageFields) -> Option<(PathBuf, bool)> {
    if let Some(exports_raw) = &fields.exports {
        if let Some((rel, via_import)) = resolve_exports_entry(exports_raw, ".") {
            let candidate = dir.join(rel.trim_start_matches("./"));
            if candidate.is_file() {
                return Some((candidate, via_import));
            }
        }
    }
    if let Some(m) = &fields.module {
        let candidate = dir.join(unquote(m).trim_start_matches("./"));
        if candidate.is_file() {
            return Some((candidate, false));
        }
    }
    if let Some(m) = &fields.main {
        let candidate = dir.join(unquote(m).trim_start_matches("./"));
        if candidate.is_file() {
            return Some((candidate, false));
        }
    }
    let index = dir.join("index.js");
    if index.is_file() {
        return Some((index, false));
    }
    None
}

pub(crate) fn resolve_subpath_direct(dir: &Path, subpath: &str) -> Option<PathBuf> {
    let base = subpath.trim_start_matches('/');
    for ext in [".js", ".mjs", ".ts", ".tsx", ".jsx"] {
        let candidate = dir.join(format!("{base}{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    for ext in ["js", "mjs", "ts", "tsx"] {
        let candidate = dir.join(base).join(format!("index.{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    let verbatim = dir.join(base);
    if verbatim.is_file() {
        return Some(verbatim);
    }
    None
}

/// Split a bare specifier into its package name and optional subpath.
pub fn split_specifier(spec: &str) -> (String, Option<String>) {
    if spec.starts_with('@') {
        if let Some(first_slash) = spec.find('/') {
            if let Some(second_slash) = spec[first_slash + 1..].find('/') {
                let pkg_end = first_slash + 1 + second_slash;
                return (spec[..pkg_end].to_string(), Some(spec[pkg_end + 1..].to_string()));
            }
        }
        return (spec.to_string(), None);
    }
    match spec.find('/') {
        Some(i) => (spec[..i].to_string(), Some(spec[i + 1..].to_string())),
        None => (spec.to_string(), None),
    }
}

/// Resolve `specifier` by searching `search_dirs` in order: first
/// `<dir>/node_modules/<pkg>`, then `<dir>/<pkg>` as a workspace
/// fallback.
pub fn resolve(specifier: &str, search_dirs: &[PathBuf]) -> Option<ResolvedModule> {
    let (pkg, subpath) = split_specifier(specifier);

    let package_dir = search_dirs
        .iter()
        .map(|d| d.join("node_modules").join(&pkg))
        .find(|d| d.join("package.json").is_file())
        .or_else(|| search_dirs.iter().map(|d| d.join(&pkg)).find(|d| d.join("package.json").is_file()))?;

    let fields = read_package_json(&package_dir.join("package.json"))?;
    let type_is_module = fields.typ.as_deref().map(|t| unquote(t) == "module").unwrap_or(false);

    let (resolved_path, via_import) = match &subpath {
        Some(sub) => {
            let via_exports = fields.exports.as_ref().and_then(|exports_raw| {
                let key = format!("./{}", sub.trim_start_matches('/'));
                resolve_exports_entry(exports_raw, &key).and_then(|(rel, via_import)| {
                    let candidate = package_dir.join(rel.trim_start_matches("./"));
                    candidate.is_file().then_some((candidate, via_import))
                })
            });
            via_exports.or_else(|| resolve_subpath_direct(&package_dir, sub).map(|p| (p, false)))
        }
        None => resolve_package_root(&package_dir, &fields),
    }?;

    let is_esm = via_import
        || type_is_module
        || resolved_path.extension().and_then(|e| e.to_str()) == Some("mjs");

    Some(ResolvedModule { file_path: resolved_path, package_dir, is_esm })
}

/// Resolve a Node-style `#import` specifier against the owning
/// package's `imports` field, rewriting to a `/@modules/...` URL.
pub fn resolve_hash_import(specifier: &str, owning_package_dir: &Path, owning_package_name: &str) -> Option<String> {
    let fields = read_package_json(&owning_package_dir.join("package.json"))?;
    let imports_raw = fields.imports?;
    let entries = outer_object_entries(&imports_raw);
    let (_, raw_value) = entries.into_iter().find(|(k, _)| k == specifier)?;
    let (resolved, _) = resolve_condition_value(&raw_value, CONDITION_PRIORITY)?;
    Some(format!("/@modules/{}/{}", owning_package_name, resolved.trim_start_matches("./")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_package(dir: &Path, name: &str, body: &str) -> PathBuf {
        let pkg_dir = dir.join("node_modules").join(name);
        fs::create_dir_all(&pkg_dir).unwrap();
        fs::write(pkg_dir.join("package.json"), body).unwrap();
        pkg_dir
    }

    #[test]
    fn split_specifier_scoped_and_plain() {
        assert_eq!(split_specifier("lodash/debounce"), ("lodash".to_string(), Some("debounce".to_string())));
        assert_eq!(split_specifier("@babel/core/lib"), ("@babel/core".to_string(), Some("lib".to_string())));
        assert_eq!(split_specifier("react"), ("react".to_string(), None));
    }

    #[test]
    fn resolves_via_main_field() {
        let dir = tempdir().unwrap();
        let pkg_dir = write_package(dir.path(), "foo", r#"{"name":"foo","main":"lib/index.js"}"#);
        fs::create_dir_all(pkg_dir.join("lib")).unwrap();
        fs::write(pkg_dir.join("lib/index.js"), "export default 1;").unwrap();

        let resolved = resolve("foo", &[dir.path().to_path_buf()]).unwrap();
        assert!(resolved.file_path.ends_with("lib/index.js"));
    }

    #[test]
    fn exports_condition_priority_prefers_import_over_require() {
        let dir = tempdir().unwrap();
        let pkg_dir = write_package(
            dir.path(),
            "bar",
            r#"{"name":"bar","exports":{"import":"./esm.js","require":"./cjs.js"}}"#,
        );
        fs::write(pkg_dir.join("esm.js"), "export default 1;").unwrap();
        fs::write(pkg_dir.join("cjs.js"), "module.exports = 1;").unwrap();

        let resolved = resolve("bar", &[dir.path().to_path_buf()]).unwrap();
        assert!(resolved.file_path.ends_with("esm.js"));
    }

    #[test]
    fn exports_subpath_map_resolution() {
        let dir = tempdir().unwrap();
        let pkg_dir = write_package(
            dir.path(),
            "baz",
            r#"{"name":"baz","exports":{".":"./index.js","./utils":"./utils.js"}}"#,
        );
        fs::write(pkg_dir.join("utils.js"), "export default 1;").unwrap();

        let resolved = resolve("baz/utils", &[dir.path().to_path_buf()]).unwrap();
        assert!(resolved.file_path.ends_with("utils.js"));
    }

    #[test]
    fn falls_through_nonexistent_candidate_to_next_tier() {
        let dir = tempdir().unwrap();
        let pkg_dir = write_package(
            dir.path(),
            "qux",
            r#"{"name":"qux","module":"./missing.js","main":"./present.js"}"#,
        );
        fs::write(pkg_dir.join("present.js"), "module.exports = 1;").unwrap();

        let resolved = resolve("qux", &[dir.path().to_path_buf()]).unwrap();
        assert!(resolved.file_path.ends_with("present.js"));
    }

    #[test]
    fn skips_types_only_export_condition() {
        let dir = tempdir().unwrap();
        let pkg_dir = write_package(
            dir.path(),
            "typed",
            r#"{"name":"typed","exports":{"types":"./index.d.ts","default":"./index.js"}}"#,
        );
        fs::write(pkg_dir.join("index.js"), "export default 1;").unwrap();

        let resolved = resolve("typed", &[dir.path().to_path_buf()]).unwrap();
        assert!(resolved.file_path.ends_with("index.js"));
    }

    #[test]
    fn workspace_fallback_without_node_modules() {
        let dir = tempdir().unwrap();
        let pkg_dir = dir.path().join("local-pkg");
        fs::create_dir_all(&pkg_dir).unwrap();
        fs::write(pkg_dir.join("package.json"), r#"{"name":"local-pkg","main":"index.js"}"#).unwrap();
        fs::write(pkg_dir.join("index.js"), "export default 1;").unwrap();

        let resolved = resolve("local-pkg", &[dir.path().to_path_buf()]).unwrap();
        assert!(resolved.file_path.ends_with("index.js"));
    }

    #[test]
    fn scoped_package_subpath_via_import_condition_is_esm() {
        let dir = tempdir().unwrap();
        let pkg_dir = dir.path().join("node_modules").join("@angular").join("core");
        fs::create_dir_all(pkg_dir.join("fesm2022")).unwrap();
        fs::write(
            pkg_dir.join("package.json"),
            r#"{"name":"@angular/core","exports":{".":{"import":"./fesm2022/core.mjs"}}}"#,
        )
        .unwrap();
        fs::write(pkg_dir.join("fesm2022/core.mjs"), "export default 1;").unwrap();

        let resolved = resolve("@angular/core", &[dir.path().to_path_buf()]).unwrap();
        assert!(resolved.file_path.ends_with("fesm2022/core.mjs"));
        assert!(resolved.is_esm);
    }

    #[test]
    fn hash_import_resolves_against_imports_field() {
        let dir = tempdir().unwrap();
        let pkg_dir = write_package(
            dir.path(),
            "withimports",
            r#"{"name":"withimports","imports":{"#util":"./util.js"}}"#,
        );
        let resolved = resolve_hash_import("#util", &pkg_dir, "withimports").unwrap();
        assert_eq!(resolved, "/@modules/withimports/util.js");
    }
}
