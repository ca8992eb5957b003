pub mod client;
pub mod server;

pub use client::RelayClient;
pub use server::RelayServer;

use tokio::net::TcpStream;

/// Fixed port the relay server listens on and the client connects to.
pub const RELAY_PORT: u16 = 12345;

/// Target host offered to the user by default in TCP client mode.
pub const DEFAULT_HOST: &str = "localhost";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("bind failed on port {port}: {source}")]
    BindFailed {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Transport events delivered to the coordinator's event loop. Server-role
/// and client-role events share one channel; which ones can fire is
/// decided by the active connection state.
#[derive(Debug)]
pub enum RelayEvent {
    /// The accept task received a connection. The coordinator decides
    /// whether to attach it or refuse it.
    IncomingPeer(TcpStream),
    /// The attached peer went away.
    PeerDisconnected,
    /// Transport error on the attached peer.
    PeerError(String),
    /// The outbound client connection completed.
    ClientConnected,
    /// Bytes received over the outbound client connection.
    ClientData(Vec<u8>),
    /// The outbound connection failed or broke (includes the remote end
    /// closing; the client path treats that as an error, not a clean stop).
    ClientError(String),
}
