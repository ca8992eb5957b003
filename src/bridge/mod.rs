pub mod coordinator;
pub mod runtime;

pub use coordinator::ConnectionCoordinator;
pub use runtime::{Bridge, BridgeHandle, Intent};

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::relay::{DEFAULT_HOST, RELAY_PORT};
use crate::serial::DEFAULT_BAUD_RATE;

/// Which transport is active. Exactly one value at any time; only the
/// coordinator transitions it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    None,
    Serial,
    Socket,
}

/// How long a status message stays up before the runtime clears it.
pub const STATUS_TTL: Duration = Duration::from_secs(4);

/// Transient notification to the presentation layer. Not persisted.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub expires_at: Instant,
}

impl StatusMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expires_at: Instant::now() + STATUS_TTL,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub relay_port: u16,
    pub default_host: String,
    pub default_baud_rate: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            relay_port: RELAY_PORT,
            default_host: DEFAULT_HOST.to_string(),
            default_baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// What the core needs from the presentation layer. The embedding UI (or a
/// headless frontend) implements this; the core never touches a UI toolkit.
pub trait PresentationSink: Send {
    /// Raw bytes from the serial path, UTF-8 text bytes from the TCP
    /// client path. Decoding for display happens behind this seam.
    fn append_to_log(&mut self, data: &[u8]);

    /// A new status message, or an empty string when the TTL cleared it.
    fn status_changed(&mut self, message: &str);

    fn connection_state_changed(&mut self, state: ConnectionState);

    /// The user asked for the log view to be emptied.
    fn clear_log(&mut self) {}

    /// A device arrived or was removed; the port list should be rebuilt.
    fn refresh_port_list(&mut self) {}
}
