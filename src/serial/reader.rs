//! Background serial read task with cooperative stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;

use super::{is_valid_baud_rate, Result, SerialError, DEFAULT_BAUD_RATE};

/// Upper bound on how long one read waits for data before the stop flag
/// is re-checked.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Bound on `stop()` waiting for the task to exit. Twice the poll
/// interval: the loop observes the flag at the next poll boundary at the
/// latest, the rest is slack.
pub const JOIN_TIMEOUT: Duration = Duration::from_millis(1000);

/// Events the read task delivers to the coordinator, in read order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// Raw bytes as read from the port. Never decoded here; text decoding
    /// happens at the presentation boundary only.
    Data(Vec<u8>),
    /// Terminal failure (open failure or unexpected closure). The session
    /// must be torn down; there is no automatic reconnect.
    Fatal(String),
    /// Clean exit after a stop request.
    Stopped,
}

/// Control seam between the coordinator and the reader, so tests can
/// substitute a scripted implementation.
#[async_trait::async_trait]
pub trait ReaderControl: Send {
    /// Rejects out-of-set baud rates without starting anything.
    fn configure(&mut self, baud_rate: u32) -> Result<()>;

    /// Begins the background read loop. Refuses if a session is already
    /// running or the port name is empty. The port is opened inside the
    /// task, so an open failure arrives as [`ReaderEvent::Fatal`].
    fn start(&mut self, port_name: &str) -> Result<()>;

    /// Requests cooperative termination and waits for the task up to
    /// [`JOIN_TIMEOUT`].
    async fn stop(&mut self);

    fn is_running(&self) -> bool;
}

pub struct SerialReader {
    events: mpsc::UnboundedSender<ReaderEvent>,
    baud_rate: u32,
    stop: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SerialReader {
    pub fn new(events: mpsc::UnboundedSender<ReaderEvent>) -> Self {
        Self {
            events,
            baud_rate: DEFAULT_BAUD_RATE,
            stop: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[async_trait::async_trait]
impl ReaderControl for SerialReader {
    fn configure(&mut self, baud_rate: u32) -> Result<()> {
        if !is_valid_baud_rate(baud_rate) {
            return Err(SerialError::InvalidBaudRate(baud_rate));
        }
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn start(&mut self, port_name: &str) -> Result<()> {
        if self.is_running() {
            return Err(SerialError::AlreadyRunning);
        }
        if port_name.is_empty() {
            return Err(SerialError::EmptyPortName);
        }

        self.stop.store(false, Ordering::Relaxed);
        self.task = Some(tokio::spawn(read_task(
            port_name.to_string(),
            self.baud_rate,
            self.stop.clone(),
            self.events.clone(),
        )));
        Ok(())
    }

    async fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(JOIN_TIMEOUT, task).await.is_err() {
                // The task owns the port handle and closes it whenever it
                // finally observes the flag. Teardown proceeds regardless.
                log::warn!(
                    "serial reader did not stop within {:?}, proceeding",
                    JOIN_TIMEOUT
                );
            }
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

async fn read_task(
    port_name: String,
    baud_rate: u32,
    stop: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ReaderEvent>,
) {
    let mut port = match tokio_serial::new(&port_name, baud_rate).open_native_async() {
        Ok(port) => port,
        Err(e) => {
            let error = SerialError::OpenFailed {
                port: port_name.clone(),
                reason: e.to_string(),
            };
            let _ = events.send(ReaderEvent::Fatal(error.to_string()));
            return;
        }
    };
    log::info!("reading from {} at {} baud", port_name, baud_rate);

    let mut buf = [0u8; 512];
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        match tokio::time::timeout(POLL_INTERVAL, port.read(&mut buf)).await {
            // No data within the poll interval, go back to the flag check.
            Err(_) => continue,
            Ok(Ok(n)) if n > 0 => {
                let _ = events.send(ReaderEvent::Data(buf[..n].to_vec()));
            }
            Ok(Ok(_)) => {
                let _ = events.send(ReaderEvent::Fatal(
                    "serial port closed unexpectedly".to_string(),
                ));
                return;
            }
            Ok(Err(e)) => {
                let _ = events.send(ReaderEvent::Fatal(format!(
                    "serial port closed unexpectedly: {}",
                    e
                )));
                return;
            }
        }
    }

    log::info!("serial reader for {} stopped", port_name);
    let _ = events.send(ReaderEvent::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> (SerialReader, mpsc::UnboundedReceiver<ReaderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SerialReader::new(tx), rx)
    }

    #[tokio::test]
    async fn start_with_empty_port_name_fails_without_side_effects() {
        let (mut r, mut rx) = reader();
        assert!(matches!(r.start(""), Err(SerialError::EmptyPortName)));
        assert!(!r.is_running());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn configure_rejects_out_of_set_rates() {
        let (mut r, _rx) = reader();
        assert!(matches!(
            r.configure(115201),
            Err(SerialError::InvalidBaudRate(115201))
        ));
        // Rejection leaves the previous rate in place.
        assert_eq!(r.baud_rate(), DEFAULT_BAUD_RATE);
        r.configure(9600).unwrap();
        assert_eq!(r.baud_rate(), 9600);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let (mut r, mut rx) = reader();
        r.stop().await;
        assert!(!r.is_running());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn open_failure_is_reported_as_fatal_event() {
        let (mut r, mut rx) = reader();
        r.start("port-that-does-not-exist").unwrap();
        match rx.recv().await {
            Some(ReaderEvent::Fatal(msg)) => {
                assert!(msg.contains("port-that-does-not-exist"), "got: {msg}");
            }
            other => panic!("expected fatal open error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_start_fails_while_a_session_is_running() {
        let (mut r, mut rx) = reader();
        r.start("port-that-does-not-exist").unwrap();
        // The task may fail fast; only a still-running task refuses.
        if r.is_running() {
            assert!(matches!(r.start("other"), Err(SerialError::AlreadyRunning)));
        }
        let _ = rx.recv().await;
        while r.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Once the previous session ended, starting again is allowed.
        assert!(r.start("port-that-does-not-exist").is_ok());
        r.stop().await;
    }
}
