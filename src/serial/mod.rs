pub mod reader;

pub use reader::{ReaderControl, ReaderEvent, SerialReader};

use serde::{Deserialize, Serialize};

/// Baud rates the reader accepts. Anything else is rejected before a
/// session starts; malformed user input parses to 0, which is not in the
/// set.
pub const VALID_BAUD_RATES: [u32; 9] = [
    9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600, 1_000_000,
];

/// Baud rate offered to the user by default.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

pub fn is_valid_baud_rate(baud_rate: u32) -> bool {
    VALID_BAUD_RATES.contains(&baud_rate)
}

/// Settings for one serial session, built from user input at connect time
/// and discarded at disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
}

impl SerialConfig {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("invalid baudrate")]
    InvalidBaudRate(u32),

    #[error("port name is empty")]
    EmptyPortName,

    #[error("reader already running")]
    AlreadyRunning,

    #[error("can't open {port}, error: {reason}")]
    OpenFailed { port: String, reason: String },

    #[error("serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
