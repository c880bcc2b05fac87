//! Polling file watcher. A dedicated thread rescans every live app
//! directory (plus the shell) every 100ms, classifies what changed,
//! and publishes one `HmrEvent` per round that produced a change. No
//! `notify`/inotify dependency, polling only.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::ProjectConfig;
use crate::hash::hash_path;
use crate::hmr::{HmrEvent, HmrSlot};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TABLE_CAPACITY: usize = 4096;
const CONFIG_DEBOUNCE_SCANS: u32 = 5;

const WATCHED_EXTENSIONS: &[&str] =
    &["js", "mjs", "ts", "tsx", "jsx", "html", "css", "json", "svelte", "vue", "astro"];

const SKIP_DIRS: &[&str] =
    &["node_modules", "dist", "build", ".git", ".svelte-kit", ".next", ".nuxt", "coverage", ".claude"];

struct WatchEntry {
    mtime: i128,
    generation: u64,
}

/// Shared handles the watcher thread needs; constructed by the server
/// core and handed to `spawn`.
pub struct WatcherContext {
    pub root: PathBuf,
    pub config: Arc<RwLock<Arc<ProjectConfig>>>,
    /// Every superseded config snapshot is appended here so request
    /// tasks that captured an older `Arc<ProjectConfig>` remain valid.
    pub config_history: Arc<parking_lot::Mutex<Vec<Arc<ProjectConfig>>>>,
    pub slot: Arc<HmrSlot>,
    pub reload_counter: Arc<AtomicU64>,
    pub shutdown: Arc<AtomicBool>,
}

pub fn spawn(ctx: WatcherContext) -> JoinHandle<()> {
    std::thread::spawn(move || run(ctx))
}

fn mtime_as_i128(metadata: &std::fs::Metadata) -> i128 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase())
}

/// Recursively collect every watched file under `dir`, skipping
/// vendor/build/dot directories.
fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with('.') || SKIP_DIRS.contains(&name) {
                continue;
            }
            walk(&path, out);
        } else if file_type.is_file() {
            if let Some(ext) = extension_of(&path) {
                if WATCHED_EXTENSIONS.contains(&ext.as_str()) {
                    out.push(path);
                }
            }
        }
    }
}

/// A named directory to scan: the shell, or one app.
struct Target {
    label: TargetLabel,
    dir: PathBuf,
}

#[derive(Clone)]
enum TargetLabel {
    Shell,
    App { name: String, dir: String, framework: String },
}

fn targets_for(config: &ProjectConfig, root: &Path) -> Vec<Target> {
    let mut targets = vec![Target { label: TargetLabel::Shell, dir: root.join(&config.shell.dir) }];
    for app in &config.apps {
        targets.push(Target {
            label: TargetLabel::App { name: app.name.clone(), dir: app.dir.clone(), framework: app.framework.clone() },
            dir: root.join(&app.dir),
        });
    }
    targets
}

fn run(ctx: WatcherContext) {
    let mut table: HashMap<u64, WatchEntry> = HashMap::new();
    let mut generation: u64 = 0;
    let mut first_round = true;

    let config_path = ctx.root.join("wu.config.json");
    let mut last_config_mtime: Option<i128> = None;
    let mut config_stable_scans: u32 = 0;

    loop {
        if ctx.shutdown.load(Ordering::Acquire) {
            return;
        }
        generation = generation.wrapping_add(1);

        // --- config debounce ---
        let current_config_mtime = std::fs::metadata(&config_path).ok().as_ref().map(mtime_as_i128);
        if current_config_mtime != last_config_mtime {
            last_config_mtime = current_config_mtime;
            config_stable_scans = 0;
        } else if config_stable_scans <= CONFIG_DEBOUNCE_SCANS {
            config_stable_scans += 1;
        }

        let mut config_reloaded = false;
        if config_stable_scans == CONFIG_DEBOUNCE_SCANS && current_config_mtime.is_some() {
            if let Some(root_str) = ctx.root.to_str() {
                if let Ok(reloaded) = ProjectConfig::load(root_str) {
                    let previous = std::mem::replace(&mut *ctx.config.write(), Arc::new(reloaded));
                    ctx.config_history.lock().push(previous);
                    config_reloaded = true;
                }
            }
            config_stable_scans += 1; // don't retrigger every round while stable
        }

        // --- file scan ---
        let snapshot = ctx.config.read().clone();
        let targets = targets_for(&snapshot, &ctx.root);

        let mut shell_changed = false;
        let mut any_deletion = false;
        let mut changed_apps: HashMap<String, HashSet<String>> = HashMap::new();

        for target in &targets {
            let mut files = Vec::new();
            walk(&target.dir, &mut files);

            for file in &files {
                let Ok(metadata) = std::fs::metadata(file) else { continue };
                let mtime = mtime_as_i128(&metadata);
                let path_hash = hash_path(file);

                match table.get_mut(&path_hash) {
                    Some(entry) => {
                        if entry.mtime != mtime {
                            entry.mtime = mtime;
                            record_change(&target.label, file, &mut shell_changed, &mut changed_apps);
                        }
                        entry.generation = generation;
                    }
                    None => {
                        if table.len() < TABLE_CAPACITY {
                            table.insert(path_hash, WatchEntry { mtime, generation });
                        }
                        if !first_round {
                            record_change(&target.label, file, &mut shell_changed, &mut changed_apps);
                        }
                    }
                }
            }
        }

        // prune deletions: anything not touched this round.
        let stale: Vec<u64> = table.iter().filter(|(_, e)| e.generation != generation).map(|(k, _)| *k).collect();
        if !stale.is_empty() && !first_round {
            any_deletion = true;
        }
        for key in stale {
            table.remove(&key);
        }

        if !first_round {
            let event = classify(config_reloaded, shell_changed, any_deletion, &changed_apps).map(|event| {
                resolve_app_metadata(event, &targets)
            });
            if let Some(event) = event {
                ctx.slot.write(&event);
                ctx.reload_counter.fetch_add(1, Ordering::Release);
            }
        }

        first_round = false;
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn record_change(
    label: &TargetLabel,
    file: &Path,
    shell_changed: &mut bool,
    changed_apps: &mut HashMap<String, HashSet<String>>,
) {
    match label {
        TargetLabel::Shell => *shell_changed = true,
        TargetLabel::App { name, .. } => {
            let ext = extension_of(file).unwrap_or_default();
            changed_apps.entry(name.clone()).or_default().insert(ext);
        }
    }
}

fn classify(
    config_reloaded: bool,
    shell_changed: bool,
    any_deletion: bool,
    changed_apps: &HashMap<String, HashSet<String>>,
) -> Option<HmrEvent> {
    if config_reloaded || shell_changed || any_deletion || changed_apps.len() >= 2 {
        return Some(HmrEvent::FullReload);
    }

    if changed_apps.len() == 1 {
        let (name, exts) = changed_apps.iter().next().unwrap();
        if exts.len() == 1 && exts.contains("css") {
            return Some(HmrEvent::CssUpdate { app: name.clone() });
        }
        return Some(HmrEvent::AppUpdate { app: name.clone(), dir: String::new(), framework: String::new() });
    }

    None
}

/// Fill in `dir`/`framework` on an `AppUpdate` event from the scan
/// targets, since `classify` only sees extension sets.
fn resolve_app_metadata(event: HmrEvent, targets: &[Target]) -> HmrEvent {
    if let HmrEvent::AppUpdate { app, .. } = &event {
        for target in targets {
            if let TargetLabel::App { name, dir, framework } = &target.label {
                if name == app {
                    return HmrEvent::AppUpdate { app: app.clone(), dir: dir.clone(), framework: framework.clone() };
                }
            }
        }
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefers_full_reload_on_config_change() {
        let event = classify(true, false, false, &HashMap::new());
        assert!(matches!(event, Some(HmrEvent::FullReload)));
    }

    #[test]
    fn classify_full_reload_on_multi_app_change() {
        let mut apps = HashMap::new();
        apps.insert("a".to_string(), HashSet::from(["js".to_string()]));
        apps.insert("b".to_string(), HashSet::from(["js".to_string()]));
        let event = classify(false, false, false, &apps);
        assert!(matches!(event, Some(HmrEvent::FullReload)));
    }

    #[test]
    fn classify_css_update_for_single_css_only_change() {
        let mut apps = HashMap::new();
        apps.insert("shop".to_string(), HashSet::from(["css".to_string()]));
        let event = classify(false, false, false, &apps);
        assert!(matches!(event, Some(HmrEvent::CssUpdate { app }) if app == "shop"));
    }

    #[test]
    fn classify_app_update_for_single_non_css_change() {
        let mut apps = HashMap::new();
        apps.insert("shop".to_string(), HashSet::from(["tsx".to_string()]));
        let event = classify(false, false, false, &apps);
        assert!(matches!(event, Some(HmrEvent::AppUpdate { .. })));
    }

    #[test]
    fn classify_none_when_nothing_changed() {
        assert!(classify(false, false, false, &HashMap::new()).is_none());
    }

    #[test]
    fn walk_skips_vendor_and_dot_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/x.js"), "ignored").unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/x.js"), "ignored").unwrap();
        std::fs::write(dir.path().join("app.ts"), "export const x = 1;").unwrap();

        let mut out = Vec::new();
        walk(dir.path(), &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].ends_with("app.ts"));
    }

    #[test]
    fn first_round_never_emits_baseline_as_change() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wu.config.json"), r#"{"name":"x","shell":{"dir":"."},"apps":[]}"#).unwrap();
        let ctx = WatcherContext {
            root: dir.path().to_path_buf(),
            config: Arc::new(RwLock::new(Arc::new(ProjectConfig::load(dir.path().to_str().unwrap()).unwrap()))),
            config_history: Arc::new(parking_lot::Mutex::new(Vec::new())),
            slot: Arc::new(HmrSlot::new()),
            reload_counter: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        let shutdown = ctx.shutdown.clone();
        let counter = ctx.reload_counter.clone();
        let handle = spawn(ctx);
        std::thread::sleep(Duration::from_millis(150));
        shutdown.store(true, Ordering::Release);
        handle.join().unwrap();
        assert_eq!(counter.load(Ordering::Acquire), 0);
    }
}
