//! End-to-end configuration loading scenarios.

use std::fs;

use wu::config::ProjectConfig;

#[test]
fn minimal_config_parse_scenario() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("wu.config.json"),
        r#"{
            "name": "microfrontend-demo",
            "version": "1.0.0",
            "shell": { "dir": "shell", "port": 4321, "framework": "vanilla" },
            "apps": [
                { "name": "header", "dir": "mf-header", "framework": "react", "port": 5001 }
            ],
            "proxy": { "port": 3000, "open_browser": true }
        }"#,
    )
    .unwrap();

    let config = ProjectConfig::load(dir.path().to_str().unwrap()).unwrap();

    assert_eq!(config.apps.len(), 1);
    assert_eq!(config.shell.port, 4321);
    assert_eq!(config.proxy.port, 3000);
    assert_eq!(config.apps[0].name, "header");
    assert_eq!(config.apps[0].dir, "mf-header");
    assert_eq!(config.apps[0].framework, "react");
}

#[test]
fn discovers_multiple_apps_with_distinct_frameworks() {
    let dir = tempfile::tempdir().unwrap();

    let vue_app = dir.path().join("cart");
    fs::create_dir(&vue_app).unwrap();
    fs::write(vue_app.join("vite.config.ts"), "export default { server: { port: 5055 } }").unwrap();
    fs::write(vue_app.join("package.json"), r#"{"dependencies":{"vue":"^3.4.0"}}"#).unwrap();

    let svelte_app = dir.path().join("nav");
    fs::create_dir(&svelte_app).unwrap();
    fs::write(svelte_app.join("vite.config.js"), "export default {}").unwrap();
    fs::write(svelte_app.join("package.json"), r#"{"dependencies":{"svelte":"^4.0.0"}}"#).unwrap();

    let config = ProjectConfig::load(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(config.apps.len(), 2);

    let cart = config.apps.iter().find(|a| a.name == "cart").unwrap();
    assert_eq!(cart.framework, "vue");
    assert_eq!(cart.port, 5055);

    let nav = config.apps.iter().find(|a| a.name == "nav").unwrap();
    assert_eq!(nav.framework, "svelte");
    assert_eq!(nav.port, 5001); // no port hint in vite.config.js -> sequential fallback
}
