//! Serial device discovery.
//!
//! Enumerates the serial ports the host exposes and guesses which one is
//! the target board from its description. Every call re-queries the OS,
//! callers poll it on their own timer for auto-discovery.

use std::fmt;
use std::hash::{Hash, Hasher};

use serialport::{SerialPortInfo, SerialPortType, available_ports};
use tracing::{debug, warn};

/// Description keywords of the bridge chips and native USB used by the
/// target board family. Matched case-insensitively.
pub const DEFAULT_KEYWORDS: &[&str] = &["esp32", "cp210", "ch340", "ch910", "serial", "uart"];

/// A serial device as reported by the OS.
///
/// Equality is by identifier only.
#[derive(Debug, Clone, Eq)]
pub struct SerialDevice {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM4`.
    pub identifier: String,
    /// Human readable description.
    pub description: String,
}

impl SerialDevice {
    pub fn new(identifier: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            description: description.into(),
        }
    }
}

impl PartialEq for SerialDevice {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Hash for SerialDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

impl fmt::Display for SerialDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.identifier, self.description)
    }
}

impl From<SerialPortInfo> for SerialDevice {
    fn from(info: SerialPortInfo) -> Self {
        let description = match info.port_type {
            SerialPortType::UsbPort(usb) => usb
                .product
                .filter(|s| !s.trim().is_empty())
                .or(usb.manufacturer.filter(|s| !s.trim().is_empty()))
                .unwrap_or_else(|| format!("USB {:04X}:{:04X}", usb.vid, usb.pid)),
            SerialPortType::BluetoothPort => "Bluetooth Link".to_string(),
            SerialPortType::PciPort | SerialPortType::Unknown => "n/a".to_string(),
        };
        Self {
            identifier: info.port_name,
            description,
        }
    }
}

/// Enumerates serial devices and picks the likely target.
#[derive(Debug, Clone)]
pub struct DeviceCatalog {
    keywords: Vec<String>,
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::with_keywords(DEFAULT_KEYWORDS.iter().copied())
    }
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog using a custom keyword set.
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// List currently attached serial devices.
    ///
    /// Enumeration errors are reported as "no devices".
    pub fn list(&self) -> Vec<SerialDevice> {
        match available_ports() {
            Ok(ports) => {
                let devices: Vec<SerialDevice> = ports.into_iter().map(SerialDevice::from).collect();
                debug!(count = devices.len(), "Enumerated serial ports");
                devices
            }
            Err(e) => {
                warn!(error = %e, "Serial port enumeration failed");
                Vec::new()
            }
        }
    }

    /// First device, in enumeration order, whose description contains a
    /// target keyword.
    pub fn guess_target<'a>(&self, devices: &'a [SerialDevice]) -> Option<&'a SerialDevice> {
        devices.iter().find(|d| {
            let desc = d.description.to_lowercase();
            self.keywords.iter().any(|k| desc.contains(k.as_str()))
        })
    }

    /// Guessed target, falling back to the first enumerated device.
    pub fn select<'a>(&self, devices: &'a [SerialDevice]) -> Option<&'a SerialDevice> {
        self.guess_target(devices).or_else(|| devices.first())
    }
}
