//! Image plan: the ordered (address, binary) pairs written in one attempt.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Partition table offset shared by the ESP32 family.
pub const PARTITIONS_ADDRESS: u32 = 0x8000;
/// Application image offset.
pub const FIRMWARE_ADDRESS: u32 = 0x10000;

/// One binary and the flash offset it is written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Display name, e.g. "Bootloader".
    pub name: String,
    /// Flash offset.
    pub address: u32,
    pub path: PathBuf,
}

impl ImageEntry {
    pub fn new(name: impl Into<String>, address: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            address,
            path: path.into(),
        }
    }

    /// Address as passed to the tool.
    pub fn address_arg(&self) -> String {
        format!("0x{:x}", self.address)
    }

    fn is_readable_file(&self) -> bool {
        self.path.is_file() && File::open(&self.path).is_ok()
    }
}

impl fmt::Display for ImageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ 0x{:05X} ({})", self.name, self.address, self.path.display())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Image plan has no entries")]
pub struct EmptyPlan;

/// Names of every entry whose file is missing or unreadable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Missing image files: {}", .0.join(", "))]
pub struct MissingFiles(pub Vec<String>);

/// Ordered, immutable list of images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlan {
    entries: Vec<ImageEntry>,
}

impl ImagePlan {
    pub fn new(entries: Vec<ImageEntry>) -> Result<Self, EmptyPlan> {
        if entries.is_empty() {
            return Err(EmptyPlan);
        }
        Ok(Self { entries })
    }

    /// Bootloader, partition table and application from `base_dir`.
    ///
    /// The bootloader offset differs across chip variants (0x0 on the
    /// ESP32-S3, 0x1000 on the classic ESP32) so the caller supplies it.
    pub fn standard(base_dir: impl AsRef<Path>, bootloader_address: u32) -> Self {
        let base = base_dir.as_ref();
        Self {
            entries: vec![
                ImageEntry::new("Bootloader", bootloader_address, base.join("bootloader.bin")),
                ImageEntry::new("Partitions", PARTITIONS_ADDRESS, base.join("partitions.bin")),
                ImageEntry::new("Firmware", FIRMWARE_ADDRESS, base.join("firmware.bin")),
            ],
        }
    }

    pub fn entries(&self) -> &[ImageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImageEntry> {
        self.entries.get(index)
    }

    /// Check that every entry refers to a readable regular file.
    ///
    /// Collects every missing entry name, not just the first.
    pub fn validate(&self) -> Result<(), MissingFiles> {
        let missing: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_readable_file())
            .map(|e| e.name.clone())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MissingFiles(missing))
        }
    }

    /// Index of the entry at exactly `address`, searching from `from`
    /// first so duplicate addresses resolve in plan order.
    pub fn find_by_address(&self, address: u32, from: usize) -> Option<usize> {
        let from = from.min(self.entries.len());
        self.entries[from..]
            .iter()
            .position(|e| e.address == address)
            .map(|i| i + from)
            .or_else(|| self.entries.iter().position(|e| e.address == address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), [0u8; 16]).unwrap();
    }

    #[test]
    fn test_standard_layout() {
        let plan = ImagePlan::standard("/opt/fw", 0x0);
        let addrs: Vec<u32> = plan.entries().iter().map(|e| e.address).collect();
        assert_eq!(addrs, vec![0x0, 0x8000, 0x10000]);
        assert_eq!(plan.get(2).unwrap().path, Path::new("/opt/fw/firmware.bin"));

        let classic = ImagePlan::standard("/opt/fw", 0x1000);
        assert_eq!(classic.get(0).unwrap().address, 0x1000);
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert_eq!(ImagePlan::new(Vec::new()), Err(EmptyPlan));
    }

    #[test]
    fn test_validate_ok() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bootloader.bin");
        touch(dir.path(), "partitions.bin");
        touch(dir.path(), "firmware.bin");
        assert!(ImagePlan::standard(dir.path(), 0x0).validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_missing() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "partitions.bin");
        let err = ImagePlan::standard(dir.path(), 0x0).validate().unwrap_err();
        assert_eq!(
            err,
            MissingFiles(vec!["Bootloader".into(), "Firmware".into()])
        );
    }

    #[test]
    fn test_validate_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("firmware.bin")).unwrap();
        let plan = ImagePlan::new(vec![ImageEntry::new(
            "Firmware",
            0x10000,
            dir.path().join("firmware.bin"),
        )])
        .unwrap();
        assert_eq!(
            plan.validate(),
            Err(MissingFiles(vec!["Firmware".into()]))
        );
    }

    #[test]
    fn test_find_by_address() {
        let plan = ImagePlan::new(vec![
            ImageEntry::new("a", 0x0, "a.bin"),
            ImageEntry::new("b", 0x8000, "b.bin"),
            ImageEntry::new("c", 0x8000, "c.bin"),
        ])
        .unwrap();
        assert_eq!(plan.find_by_address(0x0, 0), Some(0));
        assert_eq!(plan.find_by_address(0x8000, 0), Some(1));
        assert_eq!(plan.find_by_address(0x8000, 2), Some(2));
        assert_eq!(plan.find_by_address(0x0, 2), Some(0));
        assert_eq!(plan.find_by_address(0x9000, 0), None);
    }

    #[test]
    fn test_address_arg() {
        assert_eq!(ImageEntry::new("p", 0x8000, "p.bin").address_arg(), "0x8000");
        assert_eq!(ImageEntry::new("b", 0x0, "b.bin").address_arg(), "0x0");
    }
}
