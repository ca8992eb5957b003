//! End-to-end relay path over real loopback sockets: a scripted serial
//! reader feeds the coordinator, a real TCP client attaches to the relay
//! server, and the test pumps the event channel the way the runtime does.

use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use portbridge::bridge::{BridgeConfig, ConnectionCoordinator, ConnectionState, PresentationSink};
use portbridge::relay::RelayEvent;
use portbridge::serial::{
    is_valid_baud_rate, ReaderControl, ReaderEvent, Result as SerialResult, SerialConfig,
    SerialError,
};

struct ScriptedReader {
    running: bool,
}

#[async_trait::async_trait]
impl ReaderControl for ScriptedReader {
    fn configure(&mut self, baud_rate: u32) -> SerialResult<()> {
        if is_valid_baud_rate(baud_rate) {
            Ok(())
        } else {
            Err(SerialError::InvalidBaudRate(baud_rate))
        }
    }

    fn start(&mut self, port_name: &str) -> SerialResult<()> {
        if self.running {
            return Err(SerialError::AlreadyRunning);
        }
        if port_name.is_empty() {
            return Err(SerialError::EmptyPortName);
        }
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

#[derive(Clone, Default)]
struct SharedSink {
    statuses: Arc<Mutex<Vec<String>>>,
}

impl SharedSink {
    fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }
}

impl PresentationSink for SharedSink {
    fn append_to_log(&mut self, _data: &[u8]) {}

    fn status_changed(&mut self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn connection_state_changed(&mut self, _state: ConnectionState) {}
}

type Coordinator = ConnectionCoordinator<ScriptedReader, SharedSink>;

fn coordinator() -> (Coordinator, mpsc::UnboundedReceiver<RelayEvent>, SharedSink) {
    let (tx, rx) = mpsc::unbounded_channel();
    let config = BridgeConfig {
        relay_port: 0,
        ..Default::default()
    };
    let sink = SharedSink::default();
    let coord =
        ConnectionCoordinator::new(config, ScriptedReader { running: false }, tx, sink.clone());
    (coord, rx, sink)
}

#[tokio::test]
async fn serial_bytes_reach_a_real_tcp_peer() {
    let (mut coord, mut relay_rx, sink) = coordinator();

    coord.connect_serial(SerialConfig::new("COM-TEST", 115200)).await;
    assert_eq!(coord.state(), ConnectionState::Serial);
    let addr = coord.relay_addr().expect("relay should be listening");

    // Bytes before any peer attaches are dropped, never buffered.
    coord
        .handle_reader_event(ReaderEvent::Data(b"AB".to_vec()))
        .await;

    let mut peer = TcpStream::connect(addr).await.unwrap();
    let event = relay_rx.recv().await.expect("accept event");
    coord.handle_relay_event(event).await;
    assert!(coord.relay_peer_attached());
    assert!(!coord.relay_listening());

    coord
        .handle_reader_event(ReaderEvent::Data(b"CD".to_vec()))
        .await;

    let mut buf = [0u8; 2];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"CD", "peer must see exactly the post-attach bytes");

    assert!(sink.statuses().contains(&"client connected".to_string()));
}

#[tokio::test]
async fn peer_leaving_reopens_the_listener_for_the_next_client() {
    let (mut coord, mut relay_rx, _sink) = coordinator();
    coord.connect_serial(SerialConfig::new("COM-TEST", 115200)).await;
    let addr = coord.relay_addr().unwrap();

    let peer = TcpStream::connect(addr).await.unwrap();
    let event = relay_rx.recv().await.unwrap();
    coord.handle_relay_event(event).await;

    drop(peer);
    // Pump until the hangup is observed.
    loop {
        let event = relay_rx.recv().await.unwrap();
        let was_disconnect = matches!(event, RelayEvent::PeerDisconnected);
        coord.handle_relay_event(event).await;
        if was_disconnect {
            break;
        }
    }

    assert!(!coord.relay_peer_attached());
    assert!(coord.relay_listening());

    // A second client can attach to the re-opened listener.
    let addr = coord.relay_addr().unwrap();
    let mut second = TcpStream::connect(addr).await.unwrap();
    let event = relay_rx.recv().await.unwrap();
    coord.handle_relay_event(event).await;

    coord
        .handle_reader_event(ReaderEvent::Data(b"EF".to_vec()))
        .await;
    let mut buf = [0u8; 2];
    second.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"EF");
}

#[tokio::test]
async fn refused_second_client_leaves_the_first_session_intact() {
    let (mut coord, mut relay_rx, sink) = coordinator();
    coord.connect_serial(SerialConfig::new("COM-TEST", 115200)).await;
    let addr = coord.relay_addr().unwrap();

    let mut first = TcpStream::connect(addr).await.unwrap();
    let event = relay_rx.recv().await.unwrap();
    coord.handle_relay_event(event).await;

    // The listener is closed now; a raw connect attempt to the old address
    // must not displace the attached peer even if it lands before the
    // close takes effect.
    if let Ok(_second) = TcpStream::connect(addr).await {
        while let Ok(event) = relay_rx.try_recv() {
            coord.handle_relay_event(event).await;
        }
    }
    assert!(coord.relay_peer_attached());
    assert_eq!(coord.state(), ConnectionState::Serial);

    coord
        .handle_reader_event(ReaderEvent::Data(b"GH".to_vec()))
        .await;
    let mut buf = [0u8; 2];
    first.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"GH");

    assert!(!sink
        .statuses()
        .iter()
        .any(|s| s == "server stopped"), "session must not have been torn down");
}

#[tokio::test]
async fn disconnect_stops_the_relay_completely() {
    let (mut coord, _relay_rx, sink) = coordinator();
    coord.connect_serial(SerialConfig::new("COM-TEST", 115200)).await;
    let addr = coord.relay_addr().unwrap();

    coord.disconnect().await;
    assert_eq!(coord.state(), ConnectionState::None);
    assert!(!coord.relay_listening());
    // Give the aborted accept task a moment to release the socket.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(TcpStream::connect(addr).await.is_err());

    let statuses = sink.statuses();
    let stopped = statuses.iter().position(|s| s == "server stopped");
    let disconnected = statuses.iter().position(|s| s == "disconnected");
    assert!(stopped.is_some() && disconnected.is_some());
    assert!(stopped < disconnected);
}
