//! `[serve]` and `[watch]` section configuration.
//!
//! Contains development server and watch-session settings.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[serve]` section in kiln.toml - development server settings.
///
/// # Example
/// ```toml
/// [serve]
/// interface = "0.0.0.0"  # Listen on all interfaces
/// port = 3000
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    #[serde(default = "defaults::serve::interface")]
    #[educe(Default = defaults::serve::interface())]
    pub interface: String,

    /// HTTP port number (default: 3000). The live-reload socket takes the
    /// next free port after it.
    #[serde(default = "defaults::serve::port")]
    #[educe(Default = defaults::serve::port())]
    pub port: u16,
}

/// `[watch]` section in kiln.toml - change reconciliation timing.
///
/// # Example
/// ```toml
/// [watch]
/// settle_ms = 100   # delay between an event and acting on it
/// retries = 3       # immediate retries when the file is still locked
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    #[serde(default = "defaults::watch::settle_ms")]
    #[educe(Default = defaults::watch::settle_ms())]
    pub settle_ms: u64,

    #[serde(default = "defaults::watch::retries")]
    #[educe(Default = defaults::watch::retries())]
    pub retries: u32,
}

impl WatchConfig {
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
