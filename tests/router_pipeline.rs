//! End-to-end router tests: build a throwaway
//! project directory with `tempfile`, wire it into a real `DevServer`,
//! and drive `router::route` directly — same request/response types
//! the TCP accept loop uses, without opening a socket.

use std::fs;
use std::path::Path;

use wu::config::{AppEntry, ProjectConfig, ProxyConfig, ShellEntry};
use wu::http::{Method, Request, Version};
use wu::router;
use wu::server::DevServer;

fn get(path: &'static str, query: Option<&'static str>) -> Request<'static> {
    Request { method: Method::Get, path, query, version: Version::Http11, headers: Vec::new(), body: b"" }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn demo_server(root: &Path) -> std::sync::Arc<DevServer> {
    let config = ProjectConfig {
        name: "demo".into(),
        version: String::new(),
        shell: ShellEntry { dir: ".".into(), port: 4321, framework: String::new() },
        apps: vec![AppEntry { name: "shop".into(), dir: "shop".into(), framework: "react".into(), port: 5001 }],
        proxy: ProxyConfig::default(),
    };
    DevServer::new(root.to_path_buf(), config)
}

#[test]
fn apps_json_lists_live_apps_with_color_and_ext() {
    let dir = tempfile::tempdir().unwrap();
    let server = demo_server(dir.path());

    let req = get("/@wu/apps.json", None);
    let resp = router::route(&server, &req, "/@wu/apps.json");
    assert_eq!(resp.status, 200);

    let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    let apps = body.as_array().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0]["name"], "shop");
    assert_eq!(apps[0]["framework"], "react");
    assert_eq!(apps[0]["ext"], "jsx");
    assert_eq!(apps[0]["color"], "#61dafb");
}

#[test]
fn bare_import_resolves_from_node_modules_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("node_modules/left-pad/package.json"), r#"{"name":"left-pad","main":"index.js"}"#);
    write(&dir.path().join("node_modules/left-pad/index.js"), "export default function leftPad(s) { return s; }\n");

    let server = demo_server(dir.path());
    let req = get("/@modules/left-pad", None);

    let first = router::route(&server, &req, "/@modules/left-pad");
    assert_eq!(first.status, 200);
    assert!(String::from_utf8_lossy(&first.body).contains("leftPad"));
    assert!(first.headers.iter().any(|(k, v)| k == "Cache-Control" && v == "max-age=86400"));

    // second request should be served from the compile cache; body identical
    let second = router::route(&server, &req, "/@modules/left-pad");
    assert_eq!(first.body, second.body);
}

#[test]
fn unresolvable_bare_import_yields_console_error_stub_not_an_error_status() {
    let dir = tempfile::tempdir().unwrap();
    let server = demo_server(dir.path());
    let req = get("/@modules/totally-missing-package", None);

    let resp = router::route(&server, &req, "/@modules/totally-missing-package");
    assert_eq!(resp.status, 200);
    assert!(String::from_utf8_lossy(&resp.body).contains("console.error"));
}

#[test]
fn css_as_module_pipeline_wraps_stylesheet_in_js() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("shop/style.css"), "body { color: red; }");

    let server = demo_server(dir.path());
    let req = get("/shop/style.css", Some("import"));

    let resp = router::route(&server, &req, "/shop/style.css");
    assert_eq!(resp.status, 200);
    let body = String::from_utf8_lossy(&resp.body);
    assert!(body.contains("data-wu-css"));
    assert!(body.contains("color: red"));
    assert!(resp.headers.iter().any(|(k, v)| k == "Content-Type" && v.contains("javascript")));
}

#[test]
fn path_traversal_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let server = demo_server(dir.path());
    let req = Request {
        method: Method::Get,
        path: "/shop/../../etc/passwd",
        query: None,
        version: Version::Http11,
        headers: Vec::new(),
        body: b"",
    };
    let resp = router::route(&server, &req, "/shop/../../etc/passwd");
    assert_eq!(resp.status, 403);
}

#[test]
fn html_response_receives_hmr_client_and_apps_injection() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("index.html"), "<html><head><title>demo</title></head><body>hi</body></html>");

    let server = demo_server(dir.path());
    let req = get("/index.html", None);
    let resp = router::route(&server, &req, "/index.html");

    assert_eq!(resp.status, 200);
    let body = String::from_utf8_lossy(&resp.body);
    assert!(body.contains("window.__wu_apps"));
    assert!(body.contains("__wu_ws"));
    let head_close = body.find("</head>").unwrap();
    let script_pos = body.find("<script").unwrap();
    assert!(script_pos < head_close);
}

#[test]
fn app_file_pipeline_compiles_jsx_through_native_tier() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("shop/main.jsx"), "export const el = <div className=\"x\">hi</div>;\n");

    let server = demo_server(dir.path());
    let req = get("/shop/main.jsx", None);
    let resp = router::route(&server, &req, "/shop/main.jsx");

    assert_eq!(resp.status, 200);
    let body = String::from_utf8_lossy(&resp.body);
    assert!(body.contains("__jsx(\"div\""));
    assert!(body.contains("from '/@modules/react'"));
}
