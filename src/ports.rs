//! Port enumeration for the connect dialog.
//!
//! The core does not watch for hotplug itself; a platform notifier
//! (outside this crate) calls [`crate::bridge::BridgeHandle::device_changed`]
//! and the presentation layer rebuilds its list from
//! [`available_targets`].

use serde::{Deserialize, Serialize};

use crate::relay::DEFAULT_HOST;
use crate::serial::{Result, DEFAULT_BAUD_RATE};

/// Synthetic entry selecting TCP client mode instead of a serial port.
pub const TCP_TARGET: &str = "TCP/IP";

/// One selectable connect target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortTarget {
    pub name: String,
    /// Human-readable device detail for display next to the selection.
    pub detail: String,
    /// Value to pre-fill the parameter field with: a baud rate for serial
    /// targets, a host for the TCP/IP target.
    pub default_param: String,
}

/// A device appeared or went away, as reported by the platform notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChange {
    Arrived,
    Removed,
}

/// Enumerates the serial ports and appends the TCP/IP pseudo-target.
pub fn available_targets() -> Result<Vec<PortTarget>> {
    let mut targets = Vec::new();

    for port in serialport::available_ports()? {
        let detail = match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => format!(
                "{}, {} ({})",
                usb.product.unwrap_or_default(),
                usb.manufacturer.unwrap_or_default(),
                usb.serial_number.unwrap_or_default()
            ),
            _ => String::new(),
        };
        targets.push(PortTarget {
            name: port.port_name,
            detail,
            default_param: DEFAULT_BAUD_RATE.to_string(),
        });
    }

    targets.push(PortTarget {
        name: TCP_TARGET.to_string(),
        detail: String::new(),
        default_param: DEFAULT_HOST.to_string(),
    });
    Ok(targets)
}
