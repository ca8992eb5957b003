//! The state machine arbitrating serial, relay server, and TCP client.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::ports::DeviceChange;
use crate::relay::{RelayClient, RelayEvent, RelayServer};
use crate::serial::{ReaderControl, ReaderEvent, SerialConfig};

use super::{BridgeConfig, ConnectionState, PresentationSink, StatusMessage};

/// Single source of truth for [`ConnectionState`]; nothing else writes it.
///
/// UI intents call in (`connect_serial`, `connect_remote`, `disconnect`),
/// transport events call back (`handle_reader_event`,
/// `handle_relay_event`), and every observation flows out through the
/// [`PresentationSink`].
pub struct ConnectionCoordinator<R, S> {
    config: BridgeConfig,
    state: ConnectionState,
    reader: R,
    server: RelayServer,
    client: RelayClient,
    sink: S,
    status: Option<StatusMessage>,
}

impl<R, S> ConnectionCoordinator<R, S>
where
    R: ReaderControl,
    S: PresentationSink,
{
    pub fn new(
        config: BridgeConfig,
        reader: R,
        relay_events: mpsc::UnboundedSender<RelayEvent>,
        sink: S,
    ) -> Self {
        let server = RelayServer::new(relay_events.clone(), config.relay_port);
        let client = RelayClient::new(relay_events);
        Self {
            config,
            state: ConnectionState::None,
            reader,
            server,
            client,
            sink,
            status: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn relay_listening(&self) -> bool {
        self.server.is_listening()
    }

    pub fn relay_peer_attached(&self) -> bool {
        self.server.has_peer()
    }

    pub fn relay_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    pub fn current_status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn status_deadline(&self) -> Option<Instant> {
        self.status.as_ref().map(|status| status.expires_at)
    }

    /// Connect intent with a serial target. On success the relay server
    /// starts listening; a bind failure only posts a status, the serial
    /// session stays up.
    pub async fn connect_serial(&mut self, config: SerialConfig) {
        if self.state != ConnectionState::None {
            return;
        }

        if self.reader.configure(config.baud_rate).is_err() {
            self.set_status("invalid baudrate");
            return;
        }
        if self.reader.start(&config.port_name).is_err() {
            self.set_status(format!("could not connect to port {}", config.port_name));
            return;
        }

        log::info!(
            "serial session on {} at {} baud",
            config.port_name,
            config.baud_rate
        );
        self.set_state(ConnectionState::Serial);
        self.set_status(format!("connected to port {}", config.port_name));

        if let Err(e) = self.server.listen().await {
            log::warn!("{}", e);
            self.set_status("server could not be started");
        }
    }

    /// Connect intent with the TCP/IP target. State stays `None` until the
    /// asynchronous connect completes.
    pub async fn connect_remote(&mut self, host: &str) {
        if self.state != ConnectionState::None {
            return;
        }
        self.client.connect(host, self.config.relay_port);
        self.set_status(format!("connecting to {}...", host));
    }

    pub async fn disconnect(&mut self) {
        match self.state {
            ConnectionState::Serial => {
                // The reader must be confirmed stopped, and the state must
                // leave Serial, before the server goes down: the re-listen
                // policy consults the state.
                self.reader.stop().await;
                self.set_state(ConnectionState::None);
                if self.server.is_listening() {
                    self.set_status("server stopped");
                }
                self.server.stop();
                self.set_status("disconnected");
            }
            ConnectionState::Socket => {
                self.client.disconnect();
                self.set_state(ConnectionState::None);
                self.set_status("disconnected");
            }
            ConnectionState::None => {}
        }
    }

    pub async fn handle_reader_event(&mut self, event: ReaderEvent) {
        match event {
            ReaderEvent::Data(bytes) => {
                self.sink.append_to_log(&bytes);
                self.server.write(&bytes).await;
            }
            ReaderEvent::Fatal(message) => {
                log::error!("serial reader failed: {}", message);
                self.disconnect().await;
                self.set_status(message);
            }
            // Acknowledgement of a stop this coordinator requested.
            ReaderEvent::Stopped => {}
        }
    }

    pub async fn handle_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::IncomingPeer(stream) => self.attach_peer(stream),
            RelayEvent::PeerDisconnected => {
                self.server.detach_peer();
                self.set_status("client disconnected");
                if self.state == ConnectionState::Serial {
                    if let Err(e) = self.server.listen().await {
                        log::warn!("{}", e);
                        self.set_status("server could not be started");
                    }
                }
            }
            RelayEvent::PeerError(message) => {
                // Peer errors occur in the server role only; the serial
                // session continues, the detach runs on PeerDisconnected.
                self.set_status(format!("socket error: {}", message));
            }
            RelayEvent::ClientConnected => {
                self.set_state(ConnectionState::Socket);
                self.set_status("connection established");
            }
            RelayEvent::ClientData(bytes) => {
                // Passive sink path: decoded as text at this boundary.
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.sink.append_to_log(text.as_bytes());
            }
            RelayEvent::ClientError(message) => {
                if self.state == ConnectionState::Socket {
                    self.disconnect().await;
                }
                self.set_status(format!("socket error: {}", message));
            }
        }
    }

    /// Attaches an incoming peer if the slot is free; refuses it otherwise
    /// without touching the existing session.
    pub fn attach_peer<T>(&mut self, stream: T)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if !self.server.attach_peer(stream) {
            self.set_status("can't accept further connections");
            return;
        }
        self.set_status("client connected");
    }

    pub fn handle_device_change(&mut self, change: DeviceChange) {
        match change {
            DeviceChange::Arrived => self.set_status("device detected"),
            DeviceChange::Removed => self.set_status("device removed"),
        }
        self.sink.refresh_port_list();
    }

    pub fn clear_log(&mut self) {
        self.sink.clear_log();
    }

    /// Called by the runtime when the status TTL elapses.
    pub fn clear_status(&mut self) {
        if self.status.take().is_some() {
            self.sink.status_changed("");
        }
    }

    fn set_status(&mut self, text: impl Into<String>) {
        let message = StatusMessage::new(text);
        self.sink.status_changed(&message.text);
        self.status = Some(message);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.sink.connection_state_changed(state);
        }
    }
}
