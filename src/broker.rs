//! Compilation broker: a three-tier dispatch from
//! extension+framework to compiled bytes. Tier 1 is the native
//! transformer already in this crate (`jsx.rs`/`transform.rs`); tiers 2
//! and 3 shell out to a bundled Node.js compiler host
//! (`.wu-cache/wu-compiler.cjs`) over a small length-prefixed stdio
//! protocol, since this crate does not embed a JS toolchain.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use parking_lot::Mutex;

use crate::errors::{Result, ServerError};
use crate::jsx;
use crate::transform;

const MAX_PATH_LEN: usize = 4096;

/// The daemon/one-shot compiler host, written to `.wu-cache/wu-compiler.cjs`
/// on first use. It speaks the same
/// length-prefixed `COMPILE\t...` request line this module writes in
/// `Daemon::request`, and understands `--one-shot --filename <f>` for the
/// Tier-3 fallback. The actual per-framework transforms it dispatches to
/// (svelte/vue/solid/qwik/angular compilers) are out of this crate's scope;
/// this module only owns getting the right bytes onto the right process.
const BUNDLED_COMPILER_SCRIPT: &str = r#"#!/usr/bin/env node
// wu-compiler.cjs — bundled daemon/one-shot host for non-native compile tiers.
'use strict';

const KIND_LOADERS = {
  'jsx-solid': 'solid',
  'jsx-qwik': 'qwik',
  svelte: 'svelte',
  vue: 'vue',
  'angular-bundle': 'angular',
};

function loaderFor(kind) {
  const name = KIND_LOADERS[kind];
  if (!name) throw new Error(`unknown compiler kind: ${kind}`);
  // eslint-disable-next-line import/no-dynamic-require, global-require
  return require(`wu-compiler-${name}`);
}

function compileOneShot(kind, filename) {
  const chunks = [];
  process.stdin.on('data', (c) => chunks.push(c));
  process.stdin.on('end', () => {
    try {
      const source = Buffer.concat(chunks).toString('utf8');
      const out = loaderFor(kind).compile(source, filename);
      process.stdout.write(out);
      process.exit(0);
    } catch (err) {
      process.stderr.write(String(err && err.message ? err.message : err));
      process.exit(1);
    }
  });
}

function runDaemon() {
  let buf = Buffer.alloc(0);
  process.stdin.on('data', (chunk) => {
    buf = Buffer.concat([buf, chunk]);
    for (;;) {
      const nl = buf.indexOf('\n');
      if (nl === -1) return;
      const header = buf.slice(0, nl).toString('utf8');
      const parts = header.split('\t');
      if (parts[0] !== 'COMPILE') return;
      const [, kind, filename, , , lenStr] = parts;
      const bodyLen = Number(lenStr);
      if (buf.length < nl + 1 + bodyLen) return;
      const body = buf.slice(nl + 1, nl + 1 + bodyLen).toString('utf8');
      buf = buf.slice(nl + 1 + bodyLen);
      try {
        const out = loaderFor(kind).compile(body, filename);
        process.stdout.write(`OK\t${out.length}\n`);
        process.stdout.write(out);
      } catch (err) {
        process.stdout.write(`ERR\t${String(err && err.message ? err.message : err)}\n`);
      }
    }
  });
}

const args = process.argv.slice(2);
const oneShotIdx = args.indexOf('--one-shot');
if (oneShotIdx !== -1) {
  const filenameIdx = args.indexOf('--filename');
  const filename = filenameIdx !== -1 ? args[filenameIdx + 1] : '<unknown>';
  compileOneShot(args[0], filename);
} else {
  runDaemon();
}
"#;

/// Write the bundled compiler script under `<root>/.wu-cache/` if it is
/// not already present, and return its path. Idempotent — an existing
/// file is left untouched so a developer vendoring a patched copy of
/// the script is not overwritten on every run.
fn ensure_bundled_script(root: &Path) -> std::io::Result<PathBuf> {
    let dir = root.join(".wu-cache");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("wu-compiler.cjs");
    if !path.exists() {
        std::fs::write(&path, BUNDLED_COMPILER_SCRIPT)?;
    }
    Ok(path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Native,
    Daemon,
    Subprocess,
    Unsupported,
}

/// Decision table keyed on (extension, framework).
fn tier_for(extension: &str, framework: &str) -> (Tier, &'static str) {
    match (extension, framework) {
        ("jsx", "react") | ("tsx", "react") | ("jsx", "preact") | ("tsx", "preact") => (Tier::Native, "jsx"),
        ("jsx", "solid") | ("tsx", "solid") => (Tier::Daemon, "jsx-solid"),
        ("jsx", "qwik") | ("tsx", "qwik") => (Tier::Daemon, "jsx-qwik"),
        ("svelte", _) => (Tier::Daemon, "svelte"),
        ("vue", _) => (Tier::Daemon, "vue"),
        ("ts", "angular") => (Tier::Daemon, "angular-bundle"),
        ("ts", _) | ("mts", _) => (Tier::Unsupported, ""), // handled by the TS erasure pass directly, no daemon/fallback
        _ => (Tier::Unsupported, ""),
    }
}

/// A lazily-spawned, mutex-guarded Tier-2 daemon process. One instance
/// per compiler `kind`.
struct Daemon {
    child: Child,
    stdin: std::process::ChildStdin,
    stdout: BufReader<std::process::ChildStdout>,
}

impl Daemon {
    fn spawn(script: &Path, kind: &str) -> std::io::Result<Self> {
        let mut child = Command::new("node")
            .arg(script)
            .arg(kind)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = BufReader::new(child.stdout.take().expect("piped stdout"));
        Ok(Self { child, stdin, stdout })
    }

    fn request(&mut self, kind: &str, filename: &str, loader_hint: &str, source_hint: &str, body: &[u8]) -> std::io::Result<Vec<u8>> {
        let header = format!("COMPILE\t{kind}\t{filename}\t{loader_hint}\t{source_hint}\t{}\n", body.len());
        self.stdin.write_all(header.as_bytes())?;
        self.stdin.write_all(body)?;
        self.stdin.flush()?;

        let mut status_line = String::new();
        self.stdout.read_line(&mut status_line)?;
        let status_line = status_line.trim_end_matches('\n');
        let mut parts = status_line.splitn(2, '\t');
        match parts.next() {
            Some("OK") => {
                let len: usize = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed OK response"))?;
                let mut out = vec![0u8; len];
                self.stdout.read_exact(&mut out)?;
                Ok(out)
            }
            Some("ERR") => {
                let message = parts.next().unwrap_or("compile failed").to_string();
                Err(std::io::Error::new(std::io::ErrorKind::Other, message))
            }
            _ => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed daemon response")),
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Owns the (at most one, per compiler kind) running daemon. Torn down
/// on first unrecoverable I/O error so the next request respawns.
pub struct Broker {
    root: PathBuf,
    daemons: Mutex<std::collections::HashMap<String, Daemon>>,
}

impl Broker {
    pub fn new(root: PathBuf) -> Self {
        Self { root, daemons: Mutex::new(std::collections::HashMap::new()) }
    }

    /// Compile `source` originating from `file_path` within `app_dir`,
    /// tagged with `framework`.
    pub fn compile(&self, source: &str, file_path: &Path, framework: &str) -> Result<Vec<u8>> {
        let path_str = file_path.to_string_lossy();
        if path_str.len() > MAX_PATH_LEN {
            return Err(ServerError::PathTooLong(file_path.to_path_buf()));
        }

        let extension = file_path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        let (tier, kind) = tier_for(&extension, framework);

        match tier {
            Tier::Native => {
                let is_tsx = extension == "tsx";
                let bytes = jsx::compile_jsx_native(source, framework, is_tsx);
                Ok(bytes)
            }
            Tier::Unsupported => {
                // .ts/other: TS erasure only, no daemon/fallback tiers.
                Ok(transform::strip_ts(source).into_bytes())
            }
            Tier::Daemon => self.compile_via_daemon_or_subprocess(kind, source, file_path),
            Tier::Subprocess => unreachable!("tier_for never returns Subprocess directly"),
        }
    }

    fn compile_via_daemon_or_subprocess(&self, kind: &str, source: &str, file_path: &Path) -> Result<Vec<u8>> {
        let filename = file_path.to_string_lossy().to_string();
        let loader_hint = kind;
        let source_hint = "utf8";

        let daemon_result = self.try_daemon(kind, &filename, loader_hint, source_hint, source.as_bytes());
        let raw = match daemon_result {
            Ok(bytes) => bytes,
            Err(_) => self.compile_via_subprocess(kind, &filename, source)?,
        };

        Ok(transform::rewrite_bare_imports(&String::from_utf8_lossy(&raw)).into_bytes())
    }

    fn try_daemon(&self, kind: &str, filename: &str, loader_hint: &str, source_hint: &str, body: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut daemons = self.daemons.lock();
        if !daemons.contains_key(kind) {
            let script = ensure_bundled_script(&self.root)?;
            let spawned = Daemon::spawn(&script, kind)?;
            daemons.insert(kind.to_string(), spawned);
        }
        let daemon = daemons.get_mut(kind).expect("just inserted");
        match daemon.request(kind, filename, loader_hint, source_hint, body) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                daemons.remove(kind); // tear down: next request respawns
                Err(e)
            }
        }
    }

    fn compile_via_subprocess(&self, kind: &str, filename: &str, source: &str) -> Result<Vec<u8>> {
        let script = ensure_bundled_script(&self.root)
            .map_err(|_| ServerError::CompilerNotFound { file: filename.to_string() })?;
        let mut child = Command::new("node")
            .arg(&script)
            .arg(kind)
            .arg("--one-shot")
            .arg("--filename")
            .arg(filename)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|_| ServerError::CompilerNotFound { file: filename.to_string() })?;

        {
            let stdin = child.stdin.as_mut().expect("piped stdin");
            stdin.write_all(source.as_bytes()).map_err(|e| {
                ServerError::compile(filename, format!("failed writing to one-shot compiler: {e}"))
            })?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| ServerError::compile(filename, format!("one-shot compiler wait failed: {e}")))?;

        if !output.status.success() {
            let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ServerError::compile(filename, message));
        }

        Ok(output.stdout)
    }
}
