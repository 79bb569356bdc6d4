//! WebSocket hub for live reload.
//!
//! Pages served by the development server open a WebSocket to this hub. After
//! every change to the output tree the hub sends `reload` to each of them.
//!
//! ```text
//! acceptor thread ──handshake──► clients ◄──broadcast── Reconciler (spawn_blocking)
//! ```

use crate::{log, watch::ReloadNotifier};
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::{
    net::{IpAddr, TcpListener, TcpStream},
    sync::Arc,
};
use tungstenite::{Message, WebSocket};

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Message telling a page to reload itself.
const RELOAD_MESSAGE: &str = "reload";

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

pub struct LiveReload {
    clients: Clients,
    port: u16,
}

impl LiveReload {
    /// Bind the first free port from `base_port` and accept clients on a
    /// background thread.
    pub fn start(interface: IpAddr, base_port: u16) -> Result<Self> {
        let (listener, port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
        let clients: Clients = Arc::default();

        let accepted = Arc::clone(&clients);
        std::thread::spawn(move || accept_loop(&listener, &accepted));

        log!("reload"; "ws://{interface}:{port}");
        Ok(Self { clients, port })
    }

    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl ReloadNotifier for LiveReload {
    fn notify_reload(&self) {
        let clients = Arc::clone(&self.clients);
        // Socket writes block; keep them off the runtime thread
        tokio::task::spawn_blocking(move || broadcast(&clients));
    }
}

fn accept_loop(listener: &TcpListener, clients: &Clients) {
    for stream in listener.incoming() {
        match stream.map(tungstenite::accept) {
            Ok(Ok(ws)) => clients.lock().push(ws),
            Ok(Err(err)) => log!("reload"; "handshake failed: {err}"),
            Err(err) => log!("reload"; "accept error: {err}"),
        }
    }
}

/// Send `reload` to every client, dropping the ones that went away.
fn broadcast(clients: &Clients) {
    let mut clients = clients.lock();
    if clients.is_empty() {
        return;
    }
    clients.retain_mut(|ws| ws.send(Message::text(RELOAD_MESSAGE)).is_ok());
}

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind((interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "Failed to bind WebSocket server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
