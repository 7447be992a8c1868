//! Tool invocation: connection parameters and argument vector.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::ImagePlan;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported baud rate {0} (expected 115200, 460800 or 921600)")]
pub struct InvalidBaudRate(pub String);

/// Baud rates the bootloader link is known to work at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    B115200,
    B460800,
    #[default]
    B921600,
}

impl BaudRate {
    pub const ALL: [BaudRate; 3] = [BaudRate::B115200, BaudRate::B460800, BaudRate::B921600];

    pub fn as_u32(&self) -> u32 {
        match self {
            BaudRate::B115200 => 115_200,
            BaudRate::B460800 => 460_800,
            BaudRate::B921600 => 921_600,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = InvalidBaudRate;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL
            .into_iter()
            .find(|b| b.as_u32() == value)
            .ok_or_else(|| InvalidBaudRate(value.to_string()))
    }
}

impl From<BaudRate> for u32 {
    fn from(value: BaudRate) -> Self {
        value.as_u32()
    }
}

impl FromStr for BaudRate {
    type Err = InvalidBaudRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map_err(|_| InvalidBaudRate(s.to_string()))
            .and_then(BaudRate::try_from)
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Port and speed for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub device: String,
    pub baud: BaudRate,
}

impl ConnectionParams {
    pub fn new(device: impl Into<String>, baud: BaudRate) -> Self {
        Self {
            device: device.into(),
            baud,
        }
    }
}

/// How the external tool is invoked. Fixed to a known-good ESP32-S3 setup
/// by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Executable, e.g. `esptool.py` or `python3`.
    pub program: String,
    /// Arguments placed before the tool options, e.g. `["-m", "esptool"]`.
    pub program_args: Vec<String>,
    pub chip: String,
    pub before: String,
    pub after: String,
    pub flash_mode: String,
    /// `None` or an empty string leaves the frequency in the image header.
    pub flash_freq: Option<String>,
    pub flash_size: String,
    /// Compress images in transit (`-z`).
    pub compress: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "esptool.py".to_string(),
            program_args: Vec::new(),
            chip: "esp32s3".to_string(),
            before: "default-reset".to_string(),
            after: "hard-reset".to_string(),
            flash_mode: "dio".to_string(),
            flash_freq: Some("80m".to_string()),
            flash_size: "detect".to_string(),
            compress: true,
        }
    }
}

impl ToolConfig {
    /// Argument vector for writing `plan` over `params`, excluding the
    /// program itself. Address/path pairs keep plan order.
    pub fn build_args(&self, plan: &ImagePlan, params: &ConnectionParams) -> Vec<String> {
        let mut args = self.program_args.clone();
        args.extend([
            "--chip".to_string(),
            self.chip.clone(),
            "--port".to_string(),
            params.device.clone(),
            "--baud".to_string(),
            params.baud.to_string(),
            "--before".to_string(),
            self.before.clone(),
            "--after".to_string(),
            self.after.clone(),
            "write-flash".to_string(),
        ]);
        if self.compress {
            args.push("-z".to_string());
        }
        args.extend(["--flash-mode".to_string(), self.flash_mode.clone()]);
        if let Some(freq) = &self.flash_freq
            && !freq.is_empty()
        {
            args.extend(["--flash-freq".to_string(), freq.clone()]);
        }
        args.extend(["--flash-size".to_string(), self.flash_size.clone()]);
        for entry in plan.entries() {
            args.push(entry.address_arg());
            args.push(entry.path.to_string_lossy().into_owned());
        }
        args
    }
}
