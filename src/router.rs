//! Request router and the module/app/CSS pipelines.
//! The WebSocket and SSE HMR routes are intercepted by the connection
//! loop in `server.rs` before reaching here, since they take over the
//! raw stream; everything else is a plain request/response mapping.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use serde::Serialize;

use crate::cjs;
use crate::config::{AppEntry, ProjectConfig};
use crate::hmr;
use crate::http::{Method, Request};
use crate::mime;
use crate::resolver;
use crate::server::DevServer;
use crate::transform;

pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    fn new(status: u16, reason: &'static str, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            reason,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    fn ok(content_type: &str, body: Vec<u8>) -> Self {
        Self::new(200, "OK", content_type, body)
    }

    fn not_found() -> Self {
        Self::ok("text/plain; charset=utf-8", b"404 not found".to_vec())
    }

    fn forbidden() -> Self {
        Self::new(403, "Forbidden", "text/plain; charset=utf-8", b"403 forbidden".to_vec())
    }

    fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn encode(mut self) -> Vec<u8> {
        self.headers.push(("Content-Length".to_string(), self.body.len().to_string()));
        self.headers.push(("Connection".to_string(), "keep-alive".to_string()));
        self.headers.push(("Access-Control-Allow-Origin".to_string(), "*".to_string()));
        self.headers.push(("Access-Control-Allow-Methods".to_string(), "GET, OPTIONS".to_string()));
        self.headers.push(("Access-Control-Allow-Headers".to_string(), "*".to_string()));

        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// `(color, entry_extension)` per framework tag.
fn framework_meta(framework: &str) -> (&'static str, &'static str) {
    match framework {
        "react" => ("#61dafb", "jsx"),
        "preact" => ("#673ab8", "jsx"),
        "solid" => ("#2c4f7c", "jsx"),
        "qwik" => ("#ac7ef4", "jsx"),
        "angular" => ("#dd0031", "ts"),
        "vue" => ("#42b883", "js"),
        "svelte" => ("#ff3e00", "js"),
        "lit" => ("#324fff", "js"),
        "astro" => ("#ff5d01", "js"),
        _ => ("#888888", "js"),
    }
}

#[derive(Serialize)]
struct AppRecord {
    name: String,
    dir: String,
    framework: String,
    color: String,
    ext: String,
}

fn apps_json(config: &ProjectConfig) -> String {
    let records: Vec<AppRecord> = config
        .apps
        .iter()
        .map(|app| {
            let (color, ext) = framework_meta(&app.framework);
            AppRecord { name: app.name.clone(), dir: app.dir.clone(), framework: app.framework.clone(), color: color.to_string(), ext: ext.to_string() }
        })
        .collect();
    serde_json::to_string(&records).unwrap_or_else(|_| "[]".to_string())
}

fn contains_traversal(raw: &str) -> bool {
    raw.contains("..")
}

fn find_owning_app<'a>(config: &'a ProjectConfig, clean_path: &str) -> Option<&'a AppEntry> {
    config.apps.iter().find(|app| {
        let prefix = app.dir.trim_start_matches("./");
        let rel = clean_path.trim_start_matches('/');
        rel == prefix || rel.starts_with(&format!("{prefix}/"))
    })
}

/// Entry point for everything except the two upgrade routes and the
/// 405/OPTIONS/traversal short-circuits already handled by the caller.
pub fn route(server: &DevServer, request: &Request<'_>, decoded_path: &str) -> Response {
    if contains_traversal(request.path) || contains_traversal(decoded_path) {
        return Response::forbidden();
    }

    if decoded_path == "/@wu/client.js" {
        return Response::ok("application/javascript; charset=utf-8", hmr::client_script().as_bytes().to_vec())
            .with_header("Cache-Control", "no-store");
    }

    let config = server.config.read().clone();

    if decoded_path == "/@wu/apps.json" {
        return Response::ok("application/json; charset=utf-8", apps_json(&config).into_bytes())
            .with_header("Cache-Control", "no-store");
    }

    if let Some(specifier) = decoded_path.strip_prefix("/@modules/") {
        return module_pipeline(server, &config, specifier);
    }

    if decoded_path.ends_with("/wu.json") {
        return wu_json_pipeline(server, &config, decoded_path);
    }

    if let Some(css_path) = request.query.filter(|q| *q == "import").and(decoded_path.strip_suffix(".css")) {
        let full_path = format!("{css_path}.css");
        return css_module_pipeline(server, &full_path);
    }

    if let Some(app) = find_owning_app(&config, decoded_path) {
        return app_file_pipeline(server, &config, app, decoded_path);
    }

    shell_pipeline(server, &config, decoded_path)
}

pub fn handle_method_guard(request: &Request<'_>) -> Option<Response> {
    match request.method {
        Method::Get => None,
        Method::Options => Some(Response { status: 204, reason: "No Content", headers: Vec::new(), body: Vec::new() }),
        _ => Some(Response::new(405, "Method Not Allowed", "text/plain; charset=utf-8", b"405 method not allowed".to_vec())),
    }
}

fn resolve_search_dirs(server: &DevServer, config: &ProjectConfig) -> Vec<PathBuf> {
    let mut dirs = vec![server.root.clone()];
    for app in &config.apps {
        dirs.push(server.root.join(&app.dir));
    }
    dirs.push(server.root.join(&config.shell.dir));
    dirs
}

fn module_pipeline(server: &DevServer, config: &ProjectConfig, specifier: &str) -> Response {
    let dirs = resolve_search_dirs(server, config);

    let Some(resolved) = resolver::resolve(specifier, &dirs) else {
        let stub = format!("console.error({:?});\n", format!("wu: could not resolve \"{specifier}\""));
        return Response::ok("application/javascript; charset=utf-8", stub.into_bytes())
            .with_header("Cache-Control", "no-store");
    };

    if let Some(cached) = server.cache.get(&resolved.file_path) {
        return Response::ok("application/javascript; charset=utf-8", cached).with_header("Cache-Control", "max-age=86400");
    }

    let Ok(source) = std::fs::read_to_string(&resolved.file_path) else {
        let stub = format!("console.error({:?});\n", format!("wu: failed reading resolved module \"{specifier}\""));
        return Response::ok("application/javascript; charset=utf-8", stub.into_bytes())
            .with_header("Cache-Control", "no-store");
    };

    let body = if cjs::is_commonjs(&source, resolved.is_esm) {
        cjs::wrap(&source, &resolved.package_dir)
    } else {
        let transformed = transform::transform(&source, &resolved.file_path.to_string_lossy(), 0);
        let transformed = String::from_utf8_lossy(&transformed).to_string();
        let anchored = anchor_relative_imports(&transformed, &resolved.file_path, &resolved.package_dir, specifier);
        let flagged = transform::substitute_tokens(&anchored, transform::FEATURE_FLAGS);
        resolve_hash_imports(&flagged, &resolved.package_dir, specifier)
    };

    let bytes = body.into_bytes();
    server.cache.put(&resolved.file_path, &bytes);
    Response::ok("application/javascript; charset=utf-8", bytes).with_header("Cache-Control", "max-age=86400")
}

/// Rewrite `./x`/`../x` specifiers inside a resolved package file to
/// absolute `/@modules/<pkg>/<resolved-subpath>` URLs, since the
/// browser resolves `/@modules/...` as a flat namespace with no notion
/// of "relative to this file".
fn anchor_relative_imports(source: &str, file_path: &Path, package_dir: &Path, pkg_specifier: &str) -> String {
    let pkg_name = resolver::split_specifier(pkg_specifier).0;
    let file_dir = file_path.parent().unwrap_or(package_dir);

    transform::apply_specifier_rewrite(source, |spec| {
        if !(spec.starts_with("./") || spec.starts_with("../")) {
            return None;
        }
        let candidate = file_dir.join(spec);
        let resolved = if candidate.is_file() {
            Some(candidate)
        } else {
            resolver_subpath_sibling(file_dir, spec)
        }?;
        let rel = resolved.strip_prefix(package_dir).ok()?;
        Some(format!("/@modules/{}/{}", pkg_name, rel.to_string_lossy().replace('\\', "/")))
    })
}

fn resolver_subpath_sibling(dir: &Path, spec: &str) -> Option<PathBuf> {
    let base = spec.trim_start_matches("./").trim_start_matches("../");
    for ext in [".js", ".mjs", ".ts", ".tsx", ".jsx"] {
        let candidate = dir.join(format!("{base}{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn resolve_hash_imports(source: &str, package_dir: &Path, pkg_specifier: &str) -> String {
    let pkg_name = resolver::split_specifier(pkg_specifier).0;
    transform::apply_specifier_rewrite(source, |spec| {
        if !spec.starts_with('#') {
            return None;
        }
        resolver::resolve_hash_import(spec, package_dir, &pkg_name)
    })
}

fn wu_json_pipeline(server: &DevServer, config: &ProjectConfig, decoded_path: &str) -> Response {
    let disk_path = server.root.join(decoded_path.trim_start_matches('/'));
    if disk_path.is_file() {
        if let Ok(body) = std::fs::read(&disk_path) {
            return Response::ok("application/json; charset=utf-8", body);
        }
    }

    let dir_part = decoded_path.trim_end_matches("/wu.json").trim_start_matches('/');
    if let Some(app) = config.apps.iter().find(|a| a.dir.trim_start_matches("./") == dir_part) {
        let (_, ext) = framework_meta(&app.framework);
        let manifest = serde_json::json!({
            "name": app.name,
            "dir": app.dir,
            "framework": app.framework,
            "entry": format!("index.{}", ext),
        });
        return Response::ok("application/json; charset=utf-8", manifest.to_string().into_bytes());
    }

    Response::not_found()
}

fn css_module_pipeline(server: &DevServer, css_path: &str) -> Response {
    let disk_path = server.root.join(css_path.trim_start_matches('/'));
    let Ok(css) = std::fs::read_to_string(&disk_path) else {
        return Response::not_found();
    };
    let escaped = css.replace('\\', "\\\\").replace('`', "\\`").replace("${", "\\${");
    let module = format!(
        "let __wu_style = document.querySelector('style[data-wu-css=\"{path}\"]');\n\
         if (!__wu_style) {{\n  __wu_style = document.createElement('style');\n  __wu_style.setAttribute('data-wu-css', '{path}');\n  document.head.appendChild(__wu_style);\n}}\n\
         __wu_style.textContent = `{escaped}`;\nexport default {{}};\n",
        path = css_path
    );
    Response::ok("application/javascript; charset=utf-8", module.into_bytes()).with_header("Cache-Control", "no-store")
}

fn app_file_pipeline(server: &DevServer, config: &ProjectConfig, app: &AppEntry, decoded_path: &str) -> Response {
    let app_dir = server.root.join(&app.dir);
    let rel = decoded_path.trim_start_matches('/').strip_prefix(app.dir.trim_start_matches("./")).unwrap_or("").trim_start_matches('/');
    let rel = if rel.is_empty() { "index.html" } else { rel };
    let file_path = app_dir.join(rel);

    let Ok(metadata) = std::fs::metadata(&file_path) else { return Response::not_found() };
    if !metadata.is_file() {
        return Response::not_found();
    }

    let ext = mime::extension_of(&file_path.to_string_lossy()).trim_start_matches('.').to_ascii_lowercase();
    let content_type = mime::content_type_for(&format!(".{ext}"));

    let needs_broker = matches!(ext.as_str(), "jsx" | "tsx" | "svelte" | "vue") || (ext == "ts" && app.framework == "angular");

    if needs_broker {
        let Ok(source) = std::fs::read_to_string(&file_path) else { return Response::not_found() };
        return match server.broker.compile(&source, &file_path, &app.framework) {
            Ok(bytes) => {
                let stamped = transform::stamp_versions(&String::from_utf8_lossy(&bytes), server.reload_counter.load(Ordering::Acquire));
                Response::ok("application/javascript; charset=utf-8", stamped.into_bytes()).with_header("Cache-Control", "no-store")
            }
            Err(e) => {
                let stub = format!("console.error({:?});\n", format!("wu: compile failed for {}: {e}", file_path.display()));
                Response::ok("application/javascript; charset=utf-8", stub.into_bytes()).with_header("Cache-Control", "no-store")
            }
        };
    }

    let Ok(bytes) = std::fs::read(&file_path) else { return Response::not_found() };

    if ext == "js" || ext == "mjs" || ext == "ts" || ext == "jsx" || ext == "tsx" {
        let source = String::from_utf8_lossy(&bytes);
        let transformed = transform::transform(&source, &file_path.to_string_lossy(), server.reload_counter.load(Ordering::Acquire));
        return Response::ok(content_type, transformed).with_header("Cache-Control", "no-store");
    }

    if ext == "html" || ext == "htm" {
        let html = String::from_utf8_lossy(&bytes).to_string();
        let injected = hmr::inject_into_html(&html, &apps_json(config));
        return Response::ok(content_type, injected.into_bytes()).with_header("Cache-Control", "no-store");
    }

    Response::ok(content_type, bytes).with_header("Cache-Control", "no-store")
}

fn shell_pipeline(server: &DevServer, config: &ProjectConfig, decoded_path: &str) -> Response {
    let shell_dir = server.root.join(&config.shell.dir);
    let clean = decoded_path.trim_start_matches('/');

    let candidates = [
        shell_dir.join("dist").join(clean),
        shell_dir.join(clean),
        shell_dir.join("dist").join(clean).join("index.html"),
    ];

    for candidate in candidates {
        if candidate.is_file() {
            let Ok(bytes) = std::fs::read(&candidate) else { continue };
            let ext = mime::extension_of(&candidate.to_string_lossy());
            let content_type = mime::content_type_for(&ext);
            if ext == ".html" || ext == ".htm" {
                let html = String::from_utf8_lossy(&bytes).to_string();
                let injected = hmr::inject_into_html(&html, &apps_json(config));
                return Response::ok(content_type, injected.into_bytes()).with_header("Cache-Control", "no-store");
            }
            if ext == ".js" || ext == ".mjs" || ext == ".ts" {
                let source = String::from_utf8_lossy(&bytes);
                let transformed = transform::transform(&source, &candidate.to_string_lossy(), server.reload_counter.load(Ordering::Acquire));
                return Response::ok(content_type, transformed).with_header("Cache-Control", "no-store");
            }
            return Response::ok(content_type, bytes).with_header("Cache-Control", "no-store");
        }
    }

    Response::not_found()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_meta_matches_spec_table() {
        assert_eq!(framework_meta("react").1, "jsx");
        assert_eq!(framework_meta("angular").1, "ts");
        assert_eq!(framework_meta("vue").1, "js");
    }

    #[test]
    fn traversal_detected_in_raw_path() {
        assert!(contains_traversal("/a/../../etc/passwd"));
        assert!(!contains_traversal("/a/b/c"));
    }

    #[test]
    fn owning_app_matches_directory_prefix() {
        let config = ProjectConfig {
            name: "demo".into(),
            version: String::new(),
            shell: crate::config::ShellEntry { dir: ".".into(), port: 3000, framework: String::new() },
            apps: vec![AppEntry { name: "shop".into(), dir: "shop".into(), framework: "react".into(), port: 5001 }],
            proxy: Default::default(),
        };
        assert!(find_owning_app(&config, "/shop/main.jsx").is_some());
        assert!(find_owning_app(&config, "/shopkeeper/main.jsx").is_none());
    }
}
