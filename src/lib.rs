//! Connection/relay core for a single-operator serial↔TCP bridge.
//!
//! A background task reads bytes from one serial port and the bridge
//! relays them to a single connected TCP client; alternatively the bridge
//! itself connects outward as a TCP client to receive a remote serial
//! stream. The graphical presentation layer, file dialogs, and OS hotplug
//! notifications live outside this crate and talk to it through
//! [`bridge::PresentationSink`] and [`bridge::BridgeHandle`].

pub mod bridge;
pub mod ports;
pub mod relay;
pub mod serial;

pub use bridge::{Bridge, BridgeConfig, BridgeHandle, ConnectionState, Intent, PresentationSink};
pub use ports::{available_targets, DeviceChange, PortTarget, TCP_TARGET};
pub use serial::{is_valid_baud_rate, SerialConfig};
