// SPDX-License-Identifier: Apache-2.0

//! Switch description strings, with the optional override from the
//! system-firmware inventory.

use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// MAC OUI that marks a product UUID as carrying adoptable firmware
/// descriptions.
const NICIRA_OUI: &str = "002320";

/// The four description strings reported by description statistics,
/// read-only after startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SwitchDesc {
    pub mfr_desc: String,
    pub hw_desc: String,
    pub sw_desc: String,
    pub serial_num: String,
}

impl Default for SwitchDesc {
    fn default() -> Self {
        Self {
            mfr_desc: "ofdp".to_string(),
            hw_desc: "Reference Userspace Switch".to_string(),
            sw_desc: env!("CARGO_PKG_VERSION").to_string(),
            serial_num: "None".to_string(),
        }
    }
}

impl SwitchDesc {
    /// Applies the firmware override from the host's DMI inventory, when
    /// present and from a known vendor.
    #[must_use]
    pub fn with_firmware_override(mut self) -> Self {
        self.apply_firmware(Path::new("/sys/class/dmi/id"));
        self
    }

    /// Overrides manufacturer/hardware/serial from firmware inventory
    /// files under `dir`. Only applies when the product UUID is a
    /// version-1 UUID whose node field carries the Nicira OUI, i.e. the
    /// firmware was written by a known switch vendor.
    pub(crate) fn apply_firmware(&mut self, dir: &Path) {
        let read = |name: &str| -> Option<String> {
            let raw = std::fs::read_to_string(dir.join(name)).ok()?;
            let trimmed = raw.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        };

        let Some(uuid) = read("product_uuid") else {
            return;
        };
        if uuid.len() != 36 {
            return;
        }
        // version-1 UUIDs end in an IEEE 802 MAC address
        if uuid.as_bytes()[14] != b'1' {
            return;
        }
        let node = uuid[24..].replace('-', "");
        if !node.to_lowercase().starts_with(NICIRA_OUI) {
            return;
        }

        debug!("adopting switch descriptions from firmware inventory");
        if let Some(vendor) = read("sys_vendor") {
            self.mfr_desc = vendor;
        }
        let name = read("product_name");
        let version = read("product_version");
        if name.is_some() || version.is_some() {
            self.hw_desc = format!(
                "{} {}",
                name.unwrap_or_default(),
                version.unwrap_or_default()
            )
            .trim()
            .to_string();
        }
        if let Some(serial) = read("product_serial") {
            self.serial_num = serial;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn firmware_dir(uuid: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "dmi-test-{}-{uuid_hash}",
            std::process::id(),
            uuid_hash = uuid.len() as u32 + uuid.as_bytes().iter().map(|&b| u32::from(b)).sum::<u32>()
        ));
        let _ = fs::create_dir_all(&dir);
        fs::write(dir.join("product_uuid"), uuid).unwrap();
        fs::write(dir.join("sys_vendor"), "Example Switch Co\n").unwrap();
        fs::write(dir.join("product_name"), "SwitchBlade\n").unwrap();
        fs::write(dir.join("product_version"), "4000\n").unwrap();
        fs::write(dir.join("product_serial"), "SN-1234\n").unwrap();
        dir
    }

    #[test]
    fn override_applies_for_known_vendor_uuid() {
        // version 1 (byte 14), node field starting with the OUI
        let dir = firmware_dir("12345678-1234-1234-1234-002320abcdef");
        let mut desc = SwitchDesc::default();
        desc.apply_firmware(&dir);
        assert_eq!(desc.mfr_desc, "Example Switch Co");
        assert_eq!(desc.hw_desc, "SwitchBlade 4000");
        assert_eq!(desc.serial_num, "SN-1234");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn override_ignored_for_other_uuids() {
        // version 4 UUID: not derived from a MAC
        let dir = firmware_dir("12345678-1234-4234-1234-002320abcdef");
        let mut desc = SwitchDesc::default();
        desc.apply_firmware(&dir);
        assert_eq!(desc.mfr_desc, "ofdp");
        let _ = fs::remove_dir_all(dir);

        // version 1 but an unknown vendor OUI
        let dir = firmware_dir("12345678-1234-1234-1234-00aabbccddee");
        let mut desc = SwitchDesc::default();
        desc.apply_firmware(&dir);
        assert_eq!(desc.serial_num, "None");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_inventory_is_harmless() {
        let mut desc = SwitchDesc::default();
        desc.apply_firmware(Path::new("/nonexistent/dmi"));
        assert_eq!(desc.hw_desc, "Reference Userspace Switch");
    }
}
