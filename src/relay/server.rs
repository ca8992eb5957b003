//! Relay server role: one listener, at most one attached peer.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{RelayError, RelayEvent, Result};

struct PeerHandle {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    watch_task: JoinHandle<()>,
}

/// TCP server socket that forwards serial data to a single peer.
///
/// While a peer is attached the listener is closed, so no further
/// connections queue up; the coordinator re-opens it when the peer leaves
/// and a serial session is still active.
pub struct RelayServer {
    events: mpsc::UnboundedSender<RelayEvent>,
    port: u16,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    peer: Option<PeerHandle>,
}

impl RelayServer {
    pub fn new(events: mpsc::UnboundedSender<RelayEvent>, port: u16) -> Self {
        Self {
            events,
            port,
            accept_task: None,
            local_addr: None,
            peer: None,
        }
    }

    /// Binds on all IPv4 interfaces and starts accepting. Calling while
    /// already listening is a no-op success.
    pub async fn listen(&mut self) -> Result<()> {
        if self.is_listening() {
            return Ok(());
        }

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|source| RelayError::BindFailed {
                port: self.port,
                source,
            })?;
        self.local_addr = listener.local_addr().ok();

        let events = self.events.clone();
        self.accept_task = Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        log::debug!("incoming connection from {}", addr);
                        if events.send(RelayEvent::IncomingPeer(stream)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("accept failed: {}", e);
                    }
                }
            }
        }));

        log::info!("relay server listening on port {}", self.port);
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.accept_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Address actually bound, while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.filter(|_| self.is_listening())
    }

    pub fn has_peer(&self) -> bool {
        self.peer.is_some()
    }

    /// Attaches a peer to the empty slot and closes the listener. Returns
    /// false without touching anything if a peer is already attached; the
    /// caller drops the refused stream.
    pub fn attach_peer<S>(&mut self, stream: S) -> bool
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.peer.is_some() {
            return false;
        }

        let (mut reader, writer) = tokio::io::split(stream);
        let events = self.events.clone();
        let watch_task = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        let _ = events.send(RelayEvent::PeerDisconnected);
                        break;
                    }
                    // The relay is one-way; bytes from the peer are drained
                    // and dropped.
                    Ok(_) => {}
                    Err(e) => {
                        let _ = events.send(RelayEvent::PeerError(e.to_string()));
                        let _ = events.send(RelayEvent::PeerDisconnected);
                        break;
                    }
                }
            }
        });

        self.peer = Some(PeerHandle {
            writer: Box::new(writer),
            watch_task,
        });
        self.close_listener();
        true
    }

    /// Drops the attached peer, if any.
    pub fn detach_peer(&mut self) {
        if let Some(peer) = self.peer.take() {
            peer.watch_task.abort();
        }
    }

    /// Best-effort send to the attached peer. A no-op without one; write
    /// errors are reported through the event channel, not returned.
    pub async fn write(&mut self, data: &[u8]) {
        if let Some(peer) = self.peer.as_mut() {
            if let Err(e) = peer.writer.write_all(data).await {
                let _ = self.events.send(RelayEvent::PeerError(e.to_string()));
            }
        }
    }

    /// Closes the listener and detaches the peer.
    pub fn stop(&mut self) {
        self.close_listener();
        self.detach_peer();
    }

    fn close_listener(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        self.local_addr = None;
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.stop();
    }
}
