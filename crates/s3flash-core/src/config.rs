//! Flasher configuration, persisted as TOML.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::DeviceCatalog;
use crate::plan::{EmptyPlan, ImageEntry, ImagePlan};
use crate::process::{BaudRate, ToolConfig};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "Bootloader address not set (use 0x0 for ESP32-S3, 0x1000 for classic ESP32)"
    )]
    MissingBootloaderAddress,

    #[error("Configured image list is empty")]
    EmptyImages,
}

impl From<EmptyPlan> for ConfigError {
    fn from(_: EmptyPlan) -> Self {
        ConfigError::EmptyImages
    }
}

/// Everything needed to run a flash attempt apart from the port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlasherConfig {
    /// Link speed.
    pub baud: BaudRate,
    /// Directory holding the binaries. Defaults to the working directory.
    pub base_dir: Option<PathBuf>,
    /// Bootloader offset. No default, it depends on the chip variant.
    pub bootloader_address: Option<u32>,
    /// Overrides the port-matching keywords.
    pub device_keywords: Option<Vec<String>>,
    pub tool: ToolConfig,
    /// Explicit image list replacing the standard three-image set.
    pub images: Option<Vec<ImageEntry>>,
}

impl FlasherConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: FlasherConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Build the image plan.
    ///
    /// Relative image paths resolve against `base_dir`. The standard set
    /// needs `bootloader_address`; an explicit image list does not.
    pub fn plan(&self) -> Result<ImagePlan, ConfigError> {
        let base = self.base_dir();
        match &self.images {
            Some(images) => {
                let entries = images
                    .iter()
                    .map(|e| ImageEntry::new(e.name.clone(), e.address, base.join(&e.path)))
                    .collect();
                Ok(ImagePlan::new(entries)?)
            }
            None => {
                let address = self
                    .bootloader_address
                    .ok_or(ConfigError::MissingBootloaderAddress)?;
                Ok(ImagePlan::standard(base, address))
            }
        }
    }

    pub fn catalog(&self) -> DeviceCatalog {
        match &self.device_keywords {
            Some(keywords) => DeviceCatalog::with_keywords(keywords.iter().cloned()),
            None => DeviceCatalog::default(),
        }
    }
}
