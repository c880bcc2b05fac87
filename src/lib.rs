//! Library surface for the `wu` dev server binary. `main.rs` is a thin
//! CLI shell over this crate so integration tests (`tests/`) can drive
//! the router, resolver, transformer, and config loader directly
//! instead of only through a spawned process.

pub mod broker;
pub mod cache;
pub mod cjs;
pub mod cli;
pub mod config;
pub mod errors;
pub mod hash;
pub mod hmr;
pub mod http;
pub mod jsx;
pub mod logging;
pub mod mime;
pub mod resolver;
pub mod router;
pub mod server;
pub mod transform;
pub mod watcher;
pub mod ws;

use std::path::PathBuf;

use config::ProjectConfig;
use server::DevServer;

/// Load the project configuration at `root` and run the dev server on
/// `host:port` until shutdown. Shared by `main.rs` and anything else
/// (tests, future embedders) that wants to start the whole thing.
pub fn run_dev(root: PathBuf, host: &str, port: u16) -> anyhow::Result<()> {
    let root_str = root.to_str().ok_or_else(|| anyhow::anyhow!("root path is not valid UTF-8"))?;
    let config = ProjectConfig::load(root_str)?;
    let canonical_root = root.canonicalize()?;

    let server = DevServer::new(canonical_root, config);
    server.run(host, port)?;
    Ok(())
}
