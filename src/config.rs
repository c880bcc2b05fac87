//! Project configuration: `wu.config.json` loading with an
//! auto-discovery fallback when the file is absent, split between an
//! explicit `load` and a directory-scanning default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, ServerError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEntry {
    pub name: String,
    pub dir: String,
    pub framework: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellEntry {
    pub dir: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub framework: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    #[serde(default)]
    pub open_browser: bool,
}

fn default_proxy_port() -> u16 {
    3000
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { port: default_proxy_port(), open_browser: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub shell: ShellEntry,
    #[serde(default)]
    pub apps: Vec<AppEntry>,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Substring table mapping a `package.json` dependency name to a
/// framework tag.
const FRAMEWORK_TABLE: &[(&str, &str)] = &[
    ("@angular/core", "angular"),
    ("react", "react"),
    ("vue", "vue"),
    ("svelte", "svelte"),
    ("solid-js", "solid"),
    ("preact", "preact"),
    ("lit", "lit"),
    ("astro", "astro"),
];

impl ProjectConfig {
    pub fn load(root: &str) -> Result<Self> {
        let root = PathBuf::from(root)
            .canonicalize()
            .map_err(|e| ServerError::config(format!("invalid root {root}: {e}")))?;
        let config_path = root.join("wu.config.json");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: ProjectConfig = serde_json::from_str(&content)
                .map_err(|e| ServerError::config(format!("malformed wu.config.json: {e}")))?;
            Ok(config)
        } else {
            Ok(Self::discover(&root))
        }
    }

    /// Auto-discovery fallback: scan immediate subdirectories;
    /// a directory is an app iff it contains a vite or astro config file.
    fn discover(root: &Path) -> Self {
        let mut apps = Vec::new();
        let mut next_port = 5001u16;

        let entries = match std::fs::read_dir(root) {
            Ok(e) => e,
            Err(_) => {
                return Self {
                    name: project_name_from_root(root),
                    version: String::new(),
                    shell: ShellEntry { dir: ".".to_string(), port: 3000, framework: String::new() },
                    apps,
                    proxy: ProxyConfig::default(),
                };
            }
        };

        let mut dirs: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()).collect();
        dirs.sort();

        for dir in dirs {
            if !is_app_directory(&dir) {
                continue;
            }
            let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("app").to_string();
            let framework = infer_framework(&dir).unwrap_or_default();
            let port = read_port_hint(&dir).unwrap_or_else(|| {
                let p = next_port;
                next_port += 1;
                p
            });
            apps.push(AppEntry { name, dir: dir.display().to_string(), framework, port });
        }

        Self {
            name: project_name_from_root(root),
            version: String::new(),
            shell: ShellEntry { dir: ".".to_string(), port: 3000, framework: String::new() },
            apps,
            proxy: ProxyConfig::default(),
        }
    }
}

fn project_name_from_root(root: &Path) -> String {
    root.file_name().and_then(|n| n.to_str()).unwrap_or("project").to_string()
}

fn is_app_directory(dir: &Path) -> bool {
    for name in ["vite.config.js", "vite.config.ts", "vite.config.mjs", "astro.config.mjs", "astro.config.ts"] {
        if dir.join(name).is_file() {
            return true;
        }
    }
    false
}

fn infer_framework(dir: &Path) -> Option<String> {
    let package_json = dir.join("package.json");
    let content = std::fs::read_to_string(package_json).ok()?;
    for (needle, framework) in FRAMEWORK_TABLE {
        if content.contains(needle) {
            return Some(framework.to_string());
        }
    }
    None
}

/// Regex-free scan for a `port: NNNN` hint inside the app's own config
/// file.
fn read_port_hint(dir: &Path) -> Option<u16> {
    for name in ["vite.config.js", "vite.config.ts", "vite.config.mjs", "astro.config.mjs", "astro.config.ts"] {
        let path = dir.join(name);
        let Ok(content) = std::fs::read_to_string(&path) else { continue };
        if let Some(pos) = content.find("port:") {
            let rest = content[pos + "port:".len()..].trim_start();
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(port) = digits.parse::<u16>() {
                return Some(port);
            }
        }
    }
    None
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveredApps {
    pub apps: Vec<AppEntry>,
}

impl From<&ProjectConfig> for HashMap<String, AppEntry> {
    fn from(config: &ProjectConfig) -> Self {
        config.apps.iter().cloned().map(|a| (a.name.clone(), a)).collect()
    }
}
