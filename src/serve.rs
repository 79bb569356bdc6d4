//! Development server with live reload support.
//!
//! This module provides a lightweight HTTP server for local development,
//! built on `tiny_http` with the following features:
//!
//! - Static file serving from the build output directory
//! - Automatic `index.html` resolution for directories
//! - Live-reload client injected into every HTML response
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Server Thread  │     │  Runtime Thread  │     │  Reload Thread  │
//! │  (HTTP, reads)  │     │ (watch, builds)  │     │   (WebSocket)   │
//! └────────┬────────┘     └────────┬─────────┘     └────────┬────────┘
//!          │                       │ writes                 │
//!          ▼                       ▼                        ▼
//!    config.build.output ◄─────────┘              connected pages
//! ```

use crate::log;
use anyhow::{Context, Result, anyhow};
use std::{
    fs,
    io::Cursor,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
    thread::JoinHandle,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

// ============================================================================
// Server Entry Point
// ============================================================================

/// A bound development server.
pub struct DevServer {
    server: Arc<Server>,
    addr: SocketAddr,
}

impl DevServer {
    /// Bind to the configured interface and port (with auto-retry on port conflict).
    pub fn bind(interface: &str, port: u16) -> Result<Self> {
        let interface: IpAddr = interface
            .parse()
            .with_context(|| format!("[serve.interface] `{interface}` is not an IP address"))?;
        let (server, addr) = try_bind_port(interface, port, MAX_PORT_RETRIES)?;
        Ok(Self {
            server: Arc::new(server),
            addr,
        })
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle for stopping the server from another thread.
    pub fn shutdown_handle(&self) -> impl Fn() + Send + Sync + 'static {
        let server = Arc::clone(&self.server);
        move || server.unblock()
    }

    /// Serve `root` on a background thread until shut down.
    pub fn spawn(self, root: PathBuf, ws_port: u16) -> JoinHandle<()> {
        log!("serve"; "http://{}", self.addr);
        std::thread::spawn(move || {
            for request in self.server.incoming_requests() {
                if let Err(e) = handle_request(request, &root, ws_port) {
                    log!("serve"; "request error: {e}");
                }
            }
        })
    }
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                // Port 0 asks the OS, report what it picked
                let addr = server.server_addr().to_ip().unwrap_or(addr);
                return Ok((server, addr));
            }
            Err(_) if offset + 1 < max_retries => continue,
            Err(e) => {
                return Err(anyhow!(
                    "Failed to bind after {} attempts (ports {}-{}): {}",
                    max_retries,
                    base_port,
                    port,
                    e
                ));
            }
        }
    }
    Err(anyhow!("Failed to bind: no ports tried"))
}

// ============================================================================
// Request Handling
// ============================================================================

/// Map a request URL onto a file below `root`.
///
/// Resolution order:
/// 1. Exact file match → that file
/// 2. Directory with index.html → its index.html
/// 3. Anything else, or a path escaping `root` → `None`
fn resolve(root: &Path, url: &str) -> Option<PathBuf> {
    // Decode URL-encoded characters (e.g., %20 → space)
    let url_path = urlencoding::decode(url).ok()?;

    // Strip query string (e.g., ?t=123456) before resolving path
    let path = url_path.split(['?', '#']).next().unwrap_or_default();
    let request_path = Path::new(path.trim_matches('/'));

    if !request_path
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let local = root.join(request_path);
    if local.is_file() {
        return Some(local);
    }
    let index = local.join("index.html");
    index.is_file().then_some(index)
}

fn handle_request(request: Request, root: &Path, ws_port: u16) -> Result<()> {
    match resolve(root, request.url()) {
        Some(path) => serve_file(request, &path, ws_port),
        None => serve_not_found(request),
    }
}

// ============================================================================
// Response Helpers
// ============================================================================

fn content_type_header(value: &str) -> Result<Header> {
    Header::from_bytes("Content-Type", value).map_err(|()| anyhow!("invalid header `{value}`"))
}

/// Serve a file with appropriate content type; HTML gets the reload client.
fn serve_file(request: Request, path: &Path, ws_port: u16) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content_type = guess_content_type(path);

    let body = if content_type.starts_with("text/html") {
        inject_reload_script(&String::from_utf8_lossy(&content), ws_port).into_bytes()
    } else {
        content
    };

    let response = Response::from_data(body).with_header(content_type_header(content_type)?);
    request.respond(response)?;
    Ok(())
}

/// Serve 404 Not Found response.
fn serve_not_found(request: Request) -> Result<()> {
    let response = Response::new(
        StatusCode(404),
        vec![content_type_header("text/plain")?],
        Cursor::new("404 Not Found"),
        Some(13),
        None,
    );
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Live Reload Client
// ============================================================================

/// Reconnecting client: reloads the page on every `reload` message.
const RELOAD_CLIENT: &str = r#"<script>(function(){var p=__PORT__;function c(){var ws=new WebSocket("ws://"+location.hostname+":"+p);ws.onmessage=function(e){if(e.data==="reload")location.reload();};ws.onclose=function(){setTimeout(c,1000);};}c();})();</script>"#;

/// Insert the reload client before the last `</body>`, or append it.
fn inject_reload_script(html: &str, ws_port: u16) -> String {
    let script = RELOAD_CLIENT.replace("__PORT__", &ws_port.to_string());
    let at = html.to_ascii_lowercase().rfind("</body>").unwrap_or(html.len());

    let mut out = String::with_capacity(html.len() + script.len());
    out.push_str(&html[..at]);
    out.push_str(&script);
    out.push_str(&html[at..]);
    out
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json" | "map") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Tests
// ============================================================================
