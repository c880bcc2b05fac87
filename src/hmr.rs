//! HMR channel: WebSocket and Server-Sent Events share one event
//! source (the reload counter + `HmrSlot`). Blocking I/O with a short
//! read timeout stands in for a non-blocking receive, since there is
//! no async runtime in this crate.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::http::Request;
use crate::ws;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum HmrEvent {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "css-update")]
    CssUpdate { app: String },
    #[serde(rename = "app-update")]
    AppUpdate { app: String, dir: String, framework: String },
    #[serde(rename = "full-reload")]
    FullReload,
}

/// Mutex-protected holder of the most recently published event, read by
/// consumers that woke up late.
pub struct HmrSlot {
    bytes: Mutex<Vec<u8>>,
}

impl HmrSlot {
    pub fn new() -> Self {
        Self { bytes: Mutex::new(serde_json::to_vec(&HmrEvent::Connected).unwrap()) }
    }

    /// Write the slot, then the caller is responsible for incrementing
    /// the reload counter with release ordering so readers observe the
    /// new bytes before the bumped count.
    pub fn write(&self, event: &HmrEvent) {
        let encoded = serde_json::to_vec(event).expect("HmrEvent always serializes");
        *self.bytes.lock() = encoded;
    }

    pub fn read(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl Default for HmrSlot {
    fn default() -> Self {
        Self::new()
    }
}

fn write_all(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
    stream.write_all(data)
}

/// Serve the WebSocket upgrade: validate headers, send the handshake
/// response, then loop polling the reload counter and forwarding
/// inbound control frames.
pub fn serve_websocket(stream: &mut TcpStream, request: &Request<'_>, slot: &HmrSlot, counter: &AtomicU64) -> std::io::Result<()> {
    let upgrade = request.header("upgrade");
    let connection = request.header("connection");
    let version = request.header("sec-websocket-version");
    let key = request.header("sec-websocket-key");

    if !ws::is_valid_handshake(upgrade, connection, version, key) {
        write_all(stream, b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")?;
        return Ok(());
    }

    let accept = ws::accept_key(key.unwrap());
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    write_all(stream, response.as_bytes())?;
    write_all(stream, &ws::build_text("{\"type\":\"connected\"}"))?;

    stream.set_read_timeout(Some(POLL_INTERVAL))?;

    let mut last_seen = counter.load(Ordering::Acquire);
    let mut last_ping = Instant::now();
    let mut read_buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let current = counter.load(Ordering::Acquire);
        if current != last_seen {
            last_seen = current;
            write_all(stream, &ws::build_text(&String::from_utf8_lossy(&slot.read())))?;
        }

        if last_ping.elapsed() >= PING_INTERVAL {
            write_all(stream, &ws::build_ping())?;
            last_ping = Instant::now();
        }

        match stream.read(&mut chunk) {
            Ok(0) => return Ok(()), // peer closed
            Ok(n) => {
                read_buf.extend_from_slice(&chunk[..n]);
                loop {
                    match ws::parse_frame(&read_buf) {
                        Ok((frame, consumed)) => {
                            read_buf.drain(..consumed);
                            match frame.opcode {
                                ws::Opcode::Ping => {
                                    write_all(stream, &ws::build_pong(&frame.payload))?;
                                }
                                ws::Opcode::Close => {
                                    write_all(stream, &ws::build_close())?;
                                    return Ok(());
                                }
                                _ => {}
                            }
                        }
                        Err(ws::FrameError::Incomplete) => break,
                        Err(_) => return Ok(()), // malformed frame: drop the connection
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e),
        }
    }
}

/// Serve the Server-Sent Events HMR transport.
pub fn serve_sse(stream: &mut TcpStream, slot: &HmrSlot, counter: &AtomicU64) -> std::io::Result<()> {
    write_all(
        stream,
        b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\n\r\n",
    )?;

    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    stream.set_write_timeout(Some(Duration::from_secs(1)))?;

    let mut last_seen = counter.load(Ordering::Acquire);
    let mut last_ping = Instant::now();
    let mut probe = [0u8; 64];

    loop {
        let current = counter.load(Ordering::Acquire);
        if current != last_seen {
            last_seen = current;
            let event = String::from_utf8_lossy(&slot.read()).to_string();
            if write_all(stream, format!("data: {event}\n\n").as_bytes()).is_err() {
                return Ok(());
            }
        }

        if last_ping.elapsed() >= PING_INTERVAL {
            if write_all(stream, b": ping\n\n").is_err() {
                return Ok(());
            }
            last_ping = Instant::now();
        }

        // SSE is one-directional; we only read to detect peer disconnects.
        match stream.read(&mut probe) {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(_) => return Ok(()),
        }
    }
}

const CLIENT_SCRIPT: &str = r#"<script type="module">
(function () {
  function connect() {
    try {
      const ws = new WebSocket('ws://' + location.host + '/__wu_ws');
      ws.onmessage = (ev) => handle(JSON.parse(ev.data));
      ws.onerror = () => connectSse();
    } catch (e) {
      connectSse();
    }
  }
  function connectSse() {
    const es = new EventSource('/__wu_hmr');
    es.onmessage = (ev) => handle(JSON.parse(ev.data));
  }
  function handle(event) {
    if (event.type === 'full-reload') {
      location.reload();
    } else if (event.type === 'css-update') {
      document.querySelectorAll('style[data-wu-css="' + event.app + '"]').forEach((el) => {
        fetch(el.getAttribute('data-wu-css') + '?t=' + Date.now()).then((r) => r.text()).then((css) => { el.textContent = css; });
      });
    } else if (event.type === 'app-update') {
      import(event.dir + '?t=' + Date.now()).then((mod) => {
        if (window.__wu_mount) window.__wu_mount(event.app, mod);
      });
    }
  }
  connect();
})();
</script>
"#;

pub fn client_script() -> &'static str {
    CLIENT_SCRIPT
}

/// Inject the HMR client and the live-apps registration before
/// `</head>`, else `</body>`, else at the top of the document.
pub fn inject_into_html(html: &str, apps_json: &str) -> String {
    let snippet = format!("{}<script>window.__wu_apps = {};</script>\n", client_script(), apps_json);

    if let Some(pos) = html.find("</head>") {
        let mut out = String::with_capacity(html.len() + snippet.len());
        out.push_str(&html[..pos]);
        out.push_str(&snippet);
        out.push_str(&html[pos..]);
        return out;
    }
    if let Some(pos) = html.find("</body>") {
        let mut out = String::with_capacity(html.len() + snippet.len());
        out.push_str(&html[..pos]);
        out.push_str(&snippet);
        out.push_str(&html[pos..]);
        return out;
    }
    format!("{}{}", snippet, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_event_serializes_to_spec_shape() {
        let json = serde_json::to_string(&HmrEvent::Connected).unwrap();
        assert_eq!(json, r#"{"type":"connected"}"#);
    }

    #[test]
    fn css_update_event_includes_app_field() {
        let json = serde_json::to_string(&HmrEvent::CssUpdate { app: "shop".into() }).unwrap();
        assert_eq!(json, r#"{"type":"css-update","app":"shop"}"#);
    }

    #[test]
    fn slot_read_reflects_last_write() {
        let slot = HmrSlot::new();
        slot.write(&HmrEvent::FullReload);
        let read_back: serde_json::Value = serde_json::from_slice(&slot.read()).unwrap();
        assert_eq!(read_back["type"], "full-reload");
    }

    #[test]
    fn injects_before_head_close_when_present() {
        let html = "<html><head><title>x</title></head><body>hi</body></html>";
        let out = inject_into_html(html, "[]");
        let head_close = out.find("</head>").unwrap();
        let script_pos = out.find("<script").unwrap();
        assert!(script_pos < head_close);
    }

    #[test]
    fn injects_before_body_close_without_head() {
        let html = "<html><body>hi</body></html>";
        let out = inject_into_html(html, "[]");
        let body_close = out.find("</body>").unwrap();
        let script_pos = out.find("<script").unwrap();
        assert!(script_pos < body_close);
    }

    #[test]
    fn injects_at_top_without_head_or_body() {
        let html = "<div>no shell</div>";
        let out = inject_into_html(html, "[]");
        assert!(out.starts_with("<script"));
    }
}
