//! Single-task event loop tying intents and transport events together.
//!
//! Mirrors the original single-dispatch-thread model: the coordinator,
//! relay sockets, and sink all live on this task; only the serial read
//! task runs elsewhere and talks to it through a channel.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::ports::{DeviceChange, TCP_TARGET};
use crate::relay::RelayEvent;
use crate::serial::{ReaderEvent, SerialConfig, SerialReader};

use super::{BridgeConfig, ConnectionCoordinator, ConnectionState, PresentationSink};

/// UI-originated requests into the core.
#[derive(Debug, Clone)]
pub enum Intent {
    /// `target` is a serial port name or [`TCP_TARGET`]; `param` is the
    /// baud rate text or the host respectively, exactly as the user typed
    /// it.
    Connect { target: String, param: String },
    Disconnect,
    Clear,
    DeviceChange(DeviceChange),
}

/// Cloneable entry point the presentation layer and platform hooks use to
/// reach the running bridge.
#[derive(Clone)]
pub struct BridgeHandle {
    intents: mpsc::UnboundedSender<Intent>,
}

impl BridgeHandle {
    pub fn connect(&self, target: impl Into<String>, param: impl Into<String>) {
        let _ = self.intents.send(Intent::Connect {
            target: target.into(),
            param: param.into(),
        });
    }

    pub fn disconnect(&self) {
        let _ = self.intents.send(Intent::Disconnect);
    }

    pub fn clear(&self) {
        let _ = self.intents.send(Intent::Clear);
    }

    /// Entry point for the platform hotplug notifier.
    pub fn device_changed(&self, change: DeviceChange) {
        let _ = self.intents.send(Intent::DeviceChange(change));
    }
}

pub struct Bridge<S: PresentationSink> {
    coordinator: ConnectionCoordinator<SerialReader, S>,
    intents: mpsc::UnboundedReceiver<Intent>,
    reader_events: mpsc::UnboundedReceiver<ReaderEvent>,
    relay_events: mpsc::UnboundedReceiver<RelayEvent>,
    default_host: String,
}

impl<S: PresentationSink> Bridge<S> {
    pub fn new(config: BridgeConfig, sink: S) -> (Self, BridgeHandle) {
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (reader_tx, reader_rx) = mpsc::unbounded_channel();
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();

        let default_host = config.default_host.clone();
        let reader = SerialReader::new(reader_tx);
        let coordinator = ConnectionCoordinator::new(config, reader, relay_tx, sink);

        (
            Self {
                coordinator,
                intents: intent_rx,
                reader_events: reader_rx,
                relay_events: relay_rx,
                default_host,
            },
            BridgeHandle { intents: intent_tx },
        )
    }

    /// Runs until every [`BridgeHandle`] is gone, then tears down any
    /// active session.
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            let deadline = self.coordinator.status_deadline();
            tokio::select! {
                intent = self.intents.recv() => match intent {
                    Some(intent) => self.handle_intent(intent).await,
                    None => break,
                },
                Some(event) = self.reader_events.recv() => {
                    self.coordinator.handle_reader_event(event).await;
                }
                Some(event) = self.relay_events.recv() => {
                    self.coordinator.handle_relay_event(event).await;
                }
                _ = status_expiry(deadline) => {
                    self.coordinator.clear_status();
                }
            }
        }

        log::info!("bridge shutting down");
        self.coordinator.disconnect().await;
        Ok(())
    }

    async fn handle_intent(&mut self, intent: Intent) {
        match intent {
            Intent::Connect { target, param } => {
                if self.coordinator.state() != ConnectionState::None {
                    return;
                }
                if target == TCP_TARGET {
                    let host = if param.is_empty() {
                        self.default_host.clone()
                    } else {
                        param
                    };
                    self.coordinator.connect_remote(&host).await;
                } else {
                    // Malformed input parses to 0, which the validator
                    // rejects.
                    let baud_rate = param.trim().parse().unwrap_or(0);
                    self.coordinator
                        .connect_serial(SerialConfig::new(target, baud_rate))
                        .await;
                }
            }
            Intent::Disconnect => self.coordinator.disconnect().await,
            Intent::Clear => self.coordinator.clear_log(),
            Intent::DeviceChange(change) => self.coordinator.handle_device_change(change),
        }
    }
}

async fn status_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending::<()>().await,
    }
}
