//! Dev-server core: owns every piece of shared state and runs the
//! accept loop. One OS thread per accepted connection, blocking I/O
//! throughout, no async runtime.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::broker::Broker;
use crate::cache::CompileCache;
use crate::config::ProjectConfig;
use crate::hmr::{self, HmrSlot};
use crate::http;
use crate::router;
use crate::watcher::{self, WatcherContext};

const MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;

pub struct DevServer {
    pub root: PathBuf,
    /// Shared with the watcher thread: it is the sole writer, every
    /// request task is a reader.
    pub config: Arc<RwLock<Arc<ProjectConfig>>>,
    pub config_history: Arc<Mutex<Vec<Arc<ProjectConfig>>>>,
    pub cache: CompileCache,
    pub broker: Broker,
    pub hmr_slot: Arc<HmrSlot>,
    pub reload_counter: Arc<AtomicU64>,
    pub shutdown: Arc<AtomicBool>,
}

impl DevServer {
    pub fn new(root: PathBuf, config: ProjectConfig) -> Arc<Self> {
        let cache = CompileCache::new(&root);
        let broker = Broker::new(root.clone());
        Arc::new(Self {
            root,
            config: Arc::new(RwLock::new(Arc::new(config))),
            config_history: Arc::new(Mutex::new(Vec::new())),
            cache,
            broker,
            hmr_slot: Arc::new(HmrSlot::new()),
            reload_counter: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Bind and serve until the shutdown flag is set.
    pub fn run(self: &Arc<Self>, host: &str, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind((host, port))?;
        info!(host, port, "wu dev server listening");

        let watcher_ctx = WatcherContext {
            root: self.root.clone(),
            config: self.config.clone(),
            config_history: self.config_history.clone(),
            slot: self.hmr_slot.clone(),
            reload_counter: self.reload_counter.clone(),
            shutdown: self.shutdown.clone(),
        };
        watcher::spawn(watcher_ctx);

        install_signal_handler(self.clone());

        listener.set_nonblocking(false)?;
        for stream in listener.incoming() {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let server = self.clone();
                    std::thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, server) {
                            warn!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }

        Ok(())
    }

    /// Tear down shared resources.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.cache.teardown();
    }
}

fn install_signal_handler(server: Arc<DevServer>) {
    let result = ctrlc::set_handler(move || {
        info!("shutdown signal received");
        server.shutdown();
        std::process::exit(0);
    });
    if let Err(e) = result {
        warn!(error = %e, "failed to install signal handler");
    }
}

fn handle_connection(mut stream: TcpStream, server: Arc<DevServer>) -> std::io::Result<()> {
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let mut percent_buf = Vec::new();

    loop {
        if server.shutdown.load(Ordering::Acquire) {
            return Ok(());
        }

        let request_end = loop {
            match http::parse(&buf) {
                Ok(req) => {
                    let header_len = buf.len() - req.body.len();
                    let total_needed = header_len + req.content_length();
                    if buf.len() >= total_needed {
                        break total_needed;
                    }
                }
                Err(http::ParseError::IncompleteRequest) => {}
                Err(_) => return Ok(()), // malformed request: drop the connection
            }

            if buf.len() > MAX_REQUEST_BYTES {
                return Ok(());
            }
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Ok(()); // peer closed mid-request
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        let request = match http::parse(&buf[..request_end]) {
            Ok(req) => req,
            Err(_) => return Ok(()),
        };

        if request.path == "/__wu_ws" {
            return hmr::serve_websocket(&mut stream, &request, &server.hmr_slot, &server.reload_counter);
        }
        if request.path == "/__wu_hmr" {
            return hmr::serve_sse(&mut stream, &server.hmr_slot, &server.reload_counter);
        }

        let response = if let Some(early) = router::handle_method_guard(&request) {
            early
        } else {
            let decoded = http::percent_decode(request.path, &mut percent_buf).to_string();
            router::route(&server, &request, &decoded)
        };

        stream.write_all(&response.encode())?;

        buf.drain(..request_end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_server_starts_with_zero_reload_counter() {
        let config = ProjectConfig { name: "x".into(), version: String::new(), shell: crate::config::ShellEntry { dir: ".".into(), port: 3000, framework: String::new() }, apps: vec![], proxy: Default::default() };
        let server = DevServer::new(std::env::temp_dir(), config);
        assert_eq!(server.reload_counter.load(Ordering::Acquire), 0);
    }
}
