//! Source transformer: TypeScript erasure, bare-import rewriting,
//! CSS-import marking, and version stamping. Line-oriented,
//! brace-depth tracked — no AST, by design.

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// ---------------------------------------------------------------------
// TypeScript erasure
// ---------------------------------------------------------------------

fn is_type_alias(trimmed: &str) -> bool {
    let rest = if let Some(r) = trimmed.strip_prefix("export type ") {
        r
    } else if let Some(r) = trimmed.strip_prefix("type ") {
        r
    } else {
        return false;
    };

    let bytes = rest.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() && is_ident_char(bytes[i] as char) {
        i += 1;
    }
    if i == 0 {
        return false;
    }
    while i < bytes.len() && bytes[i] == b' ' {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'<' {
        let mut depth = 0i32;
        while i < bytes.len() {
            match bytes[i] {
                b'<' => depth += 1,
                b'>' => {
                    depth -= 1;
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }
    while i < bytes.len() && bytes[i] == b' ' {
        i += 1;
    }
    i < bytes.len() && bytes[i] == b'='
}

fn should_remove_line(trimmed: &str) -> bool {
    trimmed.starts_with("interface ")
        || trimmed.starts_with("export interface")
        || trimmed.starts_with("import type")
        || trimmed.starts_with("export type {")
        || trimmed.starts_with("export type *")
        || is_type_alias(trimmed)
        || trimmed.starts_with("declare ")
        || trimmed == "declare"
        || trimmed.starts_with("export declare")
        || trimmed.starts_with("namespace ")
        || trimmed.starts_with("export namespace")
        || trimmed.starts_with("abstract class")
        || trimmed == "};"
}

/// Strip TypeScript-only syntax, preserving the exact input line count
/// so downstream source maps stay aligned. No AST is built; this mirrors
/// a line-oriented preprocessor.
pub fn strip_ts(source: &str) -> String {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut out_lines: Vec<String> = Vec::with_capacity(lines.len());
    let mut skip_depth: i32 = -1;
    let mut in_block_comment = false;

    for raw_line in lines {
        let content = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        let trimmed = content.trim_start();

        if in_block_comment {
            if let Some(pos) = trimmed.find("*/") {
                if trimmed[pos + 2..].trim().is_empty() {
                    in_block_comment = false;
                }
            }
            out_lines.push(String::new());
            continue;
        }

        if skip_depth >= 0 {
            let opens = content.matches('{').count() as i32;
            let closes = content.matches('}').count() as i32;
            skip_depth += opens - closes;
            if skip_depth <= 0 {
                skip_depth = -1;
            }
            out_lines.push(String::new());
            continue;
        }

        if should_remove_line(trimmed) {
            let opens = content.matches('{').count() as i32;
            let closes = content.matches('}').count() as i32;
            let depth = opens - closes;
            if depth > 0 {
                skip_depth = depth;
            }
            out_lines.push(String::new());
            continue;
        }

        if trimmed.starts_with("//") {
            out_lines.push(String::new());
            continue;
        }

        if trimmed.starts_with("/*") {
            if let Some(pos) = trimmed.find("*/") {
                if trimmed[pos + 2..].trim().is_empty() {
                    // single-line block comment, fully consumed
                } else {
                    in_block_comment = true;
                }
            } else {
                in_block_comment = true;
            }
            out_lines.push(String::new());
            continue;
        }

        out_lines.push(strip_inline(content));
    }

    out_lines.join("\n")
}

fn word_end_at(chars: &[char], i: usize) -> usize {
    let mut j = i;
    while j < chars.len() && is_ident_char(chars[j]) {
        j += 1;
    }
    j
}

fn is_word_start(chars: &[char], i: usize) -> bool {
    if !chars[i].is_ascii_alphabetic() {
        return false;
    }
    i == 0 || !is_ident_char(chars[i - 1])
}

fn last_significant_char(out: &str) -> Option<char> {
    out.trim_end_matches([' ', '\t']).chars().last()
}

fn preceded_by_cast_context(out: &str) -> bool {
    matches!(last_significant_char(out), Some(')') | Some(']')) || last_significant_char(out).map(is_ident_char).unwrap_or(false)
}

fn preceded_by_annotation_context(out: &str) -> bool {
    matches!(last_significant_char(out), Some(')') | Some('?') | Some('!'))
        || last_significant_char(out).map(is_ident_char).unwrap_or(false)
}

/// Scan a type expression starting at `i`, tracking `<>`/`()` depth, and
/// return the index of the first stop character (`,`, `)`, `;`, `=`,
/// `{`, `}` at depth 0, or end of line).
fn skip_type_expr(chars: &[char], mut i: usize) -> usize {
    let n = chars.len();
    let mut depth = 0i32;
    while i < n {
        match chars[i] {
            '(' | '<' => {
                depth += 1;
                i += 1;
            }
            ')' => {
                if depth > 0 {
                    depth -= 1;
                    i += 1;
                } else {
                    break;
                }
            }
            '>' => {
                if depth > 0 {
                    depth -= 1;
                }
                i += 1;
            }
            ',' | ';' | '=' if depth == 0 => break,
            '{' | '}' if depth == 0 => break,
            '\'' | '"' | '`' => {
                let quote = chars[i];
                i += 1;
                while i < n && chars[i] != quote {
                    if chars[i] == '\\' && i + 1 < n {
                        i += 1;
                    }
                    i += 1;
                }
                if i < n {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    i
}

/// Strip in-place constructs from a single kept line: access modifiers,
/// `as`/`satisfies` casts, `: T` annotations, `implements` clauses.
/// String literals and comments pass through untouched.
fn strip_inline(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let n = chars.len();
    let mut out = String::with_capacity(line.len());
    let mut i = 0usize;

    while i < n {
        let c = chars[i];

        if c == '\'' || c == '"' || c == '`' {
            let quote = c;
            out.push(c);
            i += 1;
            while i < n {
                out.push(chars[i]);
                if chars[i] == '\\' && i + 1 < n {
                    i += 1;
                    out.push(chars[i]);
                    i += 1;
                    continue;
                }
                if chars[i] == quote {
                    i += 1;
                    break;
                }
                i += 1;
            }
            continue;
        }

        if c == '/' && i + 1 < n && chars[i + 1] == '/' {
            out.extend(&chars[i..]);
            break;
        }

        if c == '/' && i + 1 < n && chars[i + 1] == '*' {
            out.push(chars[i]);
            out.push(chars[i + 1]);
            i += 2;
            while i < n {
                if chars[i] == '*' && i + 1 < n && chars[i + 1] == '/' {
                    out.push(chars[i]);
                    out.push(chars[i + 1]);
                    i += 2;
                    break;
                }
                out.push(chars[i]);
                i += 1;
            }
            continue;
        }

        if is_word_start(&chars, i) {
            let word_end = word_end_at(&chars, i);
            let word: String = chars[i..word_end].iter().collect();
            match word.as_str() {
                "public" | "private" | "protected" | "readonly" | "override" | "abstract" => {
                    i = word_end;
                    if i < n && chars[i] == ' ' {
                        i += 1;
                    }
                    continue;
                }
                "as" | "satisfies" if preceded_by_cast_context(&out) => {
                    if out.ends_with(' ') {
                        out.pop();
                    }
                    let mut j = word_end;
                    while j < n && chars[j] == ' ' {
                        j += 1;
                    }
                    i = skip_type_expr(&chars, j);
                    continue;
                }
                "implements" => {
                    let mut j = word_end;
                    let mut depth = 0i32;
                    while j < n {
                        match chars[j] {
                            '(' | '[' | '<' => depth += 1,
                            ')' | ']' => depth -= 1,
                            '>' if depth > 0 => depth -= 1,
                            '{' if depth <= 0 => break,
                            _ => {}
                        }
                        j += 1;
                    }
                    i = j;
                    continue;
                }
                _ => {
                    out.push_str(&word);
                    i = word_end;
                    continue;
                }
            }
        }

        if c == ':' && preceded_by_annotation_context(&out) {
            i = skip_type_expr(&chars, i + 1);
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

// ---------------------------------------------------------------------
// Import-specifier scanning (shared by bare-import, CSS, version rewrites)
// ---------------------------------------------------------------------

fn skip_string_literal(bytes: &[u8], mut i: usize) -> usize {
    let quote = bytes[i];
    i += 1;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            return i + 1;
        }
        i += 1;
    }
    i
}

fn skip_line_comment(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

fn skip_block_comment(bytes: &[u8], mut i: usize) -> usize {
    i += 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_hspace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    i
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn word_end_bytes(bytes: &[u8], i: usize) -> usize {
    let mut j = i;
    while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_' || bytes[j] == b'$') {
        j += 1;
    }
    j
}

fn is_word_boundary_start(bytes: &[u8], i: usize) -> bool {
    if !bytes[i].is_ascii_alphabetic() {
        return false;
    }
    i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_' || bytes[i - 1] == b'$')
}

/// Locate every import/from/import(...) specifier, returning byte
/// ranges of the literal's *content* (excluding the surrounding quotes).
fn find_import_specifiers(source: &str) -> Vec<(usize, usize)> {
    let bytes = source.as_bytes();
    let n = bytes.len();
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < n {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = skip_string_literal(bytes, i);
            }
            b'/' if i + 1 < n && bytes[i + 1] == b'/' => {
                i = skip_line_comment(bytes, i);
            }
            b'/' if i + 1 < n && bytes[i + 1] == b'*' => {
                i = skip_block_comment(bytes, i);
            }
            _ if is_word_boundary_start(bytes, i) => {
                let word_end = word_end_bytes(bytes, i);
                let word = &source[i..word_end];

                if word == "import" {
                    let j = skip_hspace(bytes, word_end);
                    if j < n && (bytes[j] == b'\'' || bytes[j] == b'"') {
                        let content_start = j + 1;
                        let end = skip_string_literal(bytes, j);
                        out.push((content_start, end - 1));
                        i = end;
                        continue;
                    } else if j < n && bytes[j] == b'(' {
                        let k = skip_ws(bytes, j + 1);
                        if k < n && (bytes[k] == b'\'' || bytes[k] == b'"') {
                            let content_start = k + 1;
                            let end = skip_string_literal(bytes, k);
                            out.push((content_start, end - 1));
                            i = end;
                            continue;
                        }
                    }
                    i = word_end;
                } else if word == "from" {
                    let j = skip_hspace(bytes, word_end);
                    if j < n && (bytes[j] == b'\'' || bytes[j] == b'"') {
                        let content_start = j + 1;
                        let end = skip_string_literal(bytes, j);
                        out.push((content_start, end - 1));
                        i = end;
                        continue;
                    }
                    i = word_end;
                } else {
                    i = word_end;
                }
            }
            _ => i += 1,
        }
    }

    out
}

pub(crate) fn apply_specifier_rewrite(source: &str, mut rewrite: impl FnMut(&str) -> Option<String>) -> String {
    let specifiers = find_import_specifiers(source);
    let mut out = String::with_capacity(source.len());
    let mut last = 0usize;
    for (cs, ce) in specifiers {
        let content = &source[cs..ce];
        out.push_str(&source[last..cs]);
        match rewrite(content) {
            Some(new_content) => out.push_str(&new_content),
            None => out.push_str(content),
        }
        last = ce;
    }
    out.push_str(&source[last..]);
    out
}

/// A specifier is "bare" when it starts with an alphabetic/`@`/`_` char,
/// is not relative/absolute/a URL, and has no whitespace or bracket
/// characters.
pub fn is_bare_specifier(spec: &str) -> bool {
    let first = match spec.chars().next() {
        Some(c) => c,
        None => return false,
    };
    if !(first.is_ascii_alphabetic() || first == '@' || first == '_') {
        return false;
    }
    if spec.starts_with("http:") || spec.starts_with("https:") || spec.starts_with("data:") {
        return false;
    }
    if spec.chars().any(|c| c.is_whitespace() || matches!(c, '[' | ']' | '(' | ')' | '{' | '}')) {
        return false;
    }
    true
}

pub fn rewrite_bare_imports(source: &str) -> String {
    apply_specifier_rewrite(source, |spec| {
        if is_bare_specifier(spec) {
            Some(format!("/@modules/{}", spec))
        } else {
            None
        }
    })
}

pub fn rewrite_css_imports(source: &str) -> String {
    apply_specifier_rewrite(source, |spec| {
        if spec.ends_with(".css") {
            Some(format!("{}?import", spec))
        } else {
            None
        }
    })
}

pub fn stamp_versions(source: &str, counter: u64) -> String {
    if counter == 0 {
        return source.to_string();
    }
    apply_specifier_rewrite(source, |spec| {
        if (spec.starts_with("./") || spec.starts_with("../")) && !spec.contains('?') {
            Some(format!("{}?t={}", spec, counter))
        } else {
            None
        }
    })
}

/// Whole-token replacement used by the module pipeline for feature
/// flags like `process.env.NODE_ENV`.
pub fn substitute_tokens(source: &str, table: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(source.len());
    let chars: Vec<char> = source.chars().collect();
    let n = chars.len();
    let mut i = 0usize;

    'outer: while i < n {
        for (token, replacement) in table {
            let tchars: Vec<char> = token.chars().collect();
            let tlen = tchars.len();
            if i + tlen <= n && chars[i..i + tlen] == tchars[..] {
                let before_ok = i == 0 || !is_ident_char(chars[i - 1]);
                let after_ok = i + tlen == n || !is_ident_char(chars[i + tlen]);
                if before_ok && after_ok {
                    out.push_str(replacement);
                    i += tlen;
                    continue 'outer;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

pub const FEATURE_FLAGS: &[(&str, &str)] = &[
    ("process.env.NODE_ENV", "\"development\""),
    ("__VUE_OPTIONS_API__", "true"),
    ("__VUE_PROD_DEVTOOLS__", "false"),
    ("__VUE_PROD_HYDRATION_MISMATCH_DETAILS__", "false"),
];

/// Entry point for plain (non-JSX) JavaScript/TypeScript-family files:
/// TS erasure (if applicable) + bare-import rewrite + CSS marking +
/// version stamping. Always returns owned bytes.
pub fn transform(source: &str, file_path: &str, reload_counter: u64) -> Vec<u8> {
    let is_ts = file_path.ends_with(".ts") || file_path.ends_with(".mts");
    let stage1 = if is_ts { strip_ts(source) } else { source.to_string() };
    let stage2 = rewrite_bare_imports(&stage1);
    let stage3 = rewrite_css_imports(&stage2);
    let stage4 = stamp_versions(&stage3, reload_counter);
    stage4.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_count_preserved_by_strip_ts() {
        let src = "type Foo = string | number;\nconst x = 1;\n";
        let out = strip_ts(src);
        assert_eq!(out.matches('\n').count(), src.matches('\n').count());
        assert!(out.contains("const x = 1;"));
        assert!(!out.contains("type Foo"));
    }

    #[test]
    fn transform_preserves_line_count() {
        let src = "interface A { x: number }\nconst y: string = 'z';\n";
        let out = String::from_utf8(transform(src, "a.ts", 0)).unwrap();
        assert_eq!(out.matches('\n').count(), src.matches('\n').count());
    }

    #[test]
    fn strips_access_modifiers_and_annotations() {
        let src = "class A { private x: number; public readonly y: string; }";
        let out = strip_ts(src);
        assert!(!out.contains("private"));
        assert!(!out.contains("readonly"));
        assert!(!out.contains(": number"));
        assert!(!out.contains(": string"));
    }

    #[test]
    fn strips_as_cast() {
        let out = strip_inline("const x = (y as string).length;");
        assert_eq!(out, "const x = (y).length;");
    }

    #[test]
    fn strips_implements_clause() {
        let out = strip_inline("class Foo extends Bar implements Baz, Qux {");
        assert_eq!(out, "class Foo extends Bar {");
    }

    #[test]
    fn strings_and_comments_pass_through() {
        let src = "const s = \"type Foo\"; // type Bar\n";
        let out = strip_ts(src);
        assert!(out.contains("\"type Foo\""));
    }

    #[test]
    fn bare_import_rewrite_minified() {
        let src = r#"import"@lit/reactive-element";import"lit-html";export*from"lit-element/lit-element.js";"#;
        let out = rewrite_bare_imports(src);
        assert!(out.contains("/@modules/@lit/reactive-element"));
        assert!(out.contains("/@modules/lit-html"));
        assert!(out.contains("/@modules/lit-element/lit-element.js"));
        assert!(!out.contains("/@modules/./"));
    }

    #[test]
    fn relative_specifier_untouched() {
        let src = "import x from './local.js';";
        assert_eq!(rewrite_bare_imports(src), src);
    }

    #[test]
    fn string_literal_body_not_rewritten() {
        let src = "const msg = 'import foo from bar';";
        assert_eq!(rewrite_bare_imports(src), src);
    }

    #[test]
    fn css_rewrite_is_idempotent() {
        let src = "import './style.css';";
        let once = rewrite_css_imports(src);
        let twice = rewrite_css_imports(&once);
        assert_eq!(once, twice);
        assert_eq!(once.matches("?import").count(), 1);
    }

    #[test]
    fn version_stamp_only_relative_without_query() {
        let src = "import a from './a.js'; import b from 'pkg'; import c from './c.js?x=1';";
        let out = stamp_versions(src, 42);
        assert!(out.contains("./a.js?t=42"));
        assert!(!out.contains("pkg?t=42"));
        assert!(out.contains("./c.js?x=1"));
        assert!(!out.contains("./c.js?x=1?t=42"));
    }

    #[test]
    fn feature_flag_whole_token_replacement() {
        let src = "if (process.env.NODE_ENV) {} const processEnvNODE_ENV = 1;";
        let out = substitute_tokens(src, FEATURE_FLAGS);
        assert!(out.contains("if (\"development\")"));
        assert!(out.contains("processEnvNODE_ENV = 1"));
    }

    #[test]
    fn dynamic_import_specifier_rewritten() {
        let src = "const m = import('lodash');";
        let out = rewrite_bare_imports(src);
        assert!(out.contains("import('/@modules/lodash')"));
    }
}
