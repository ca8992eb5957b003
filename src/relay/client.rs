//! Relay client role: one outbound, receive-only connection.

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::RelayEvent;

/// Outbound TCP socket used when the user selected the "TCP/IP" target.
/// Mutually exclusive with the server role; the coordinator only drives
/// one of the two at a time.
pub struct RelayClient {
    events: mpsc::UnboundedSender<RelayEvent>,
    task: Option<JoinHandle<()>>,
}

impl RelayClient {
    pub fn new(events: mpsc::UnboundedSender<RelayEvent>) -> Self {
        Self { events, task: None }
    }

    /// Starts connecting. Completion arrives as
    /// [`RelayEvent::ClientConnected`], failure as
    /// [`RelayEvent::ClientError`]; afterwards the task delivers received
    /// bytes as [`RelayEvent::ClientData`].
    pub fn connect(&mut self, host: &str, port: u16) {
        // A stale attempt, if any, is torn down first.
        self.disconnect();

        let host = host.to_string();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            let mut stream = match TcpStream::connect((host.as_str(), port)).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = events.send(RelayEvent::ClientError(e.to_string()));
                    return;
                }
            };
            log::info!("connected to {}:{}", host, port);
            if events.send(RelayEvent::ClientConnected).is_err() {
                return;
            }

            let mut buf = [0u8; 512];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) => {
                        let _ = events.send(RelayEvent::ClientError(
                            "remote host closed the connection".to_string(),
                        ));
                        break;
                    }
                    Ok(n) => {
                        if events.send(RelayEvent::ClientData(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = events.send(RelayEvent::ClientError(e.to_string()));
                        break;
                    }
                }
            }
        }));
    }

    /// Tears the connection (or a pending attempt) down. Completion is
    /// implicit; the coordinator transitions to the idle state itself.
    pub fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
