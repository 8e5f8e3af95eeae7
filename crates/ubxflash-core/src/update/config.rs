//! Update session tuning
//!
//! Defaults match the receiver's firmware update protocol. A TOML file can
//! override any subset of them:
//!
//! ```toml
//! chunk_size = 1024
//! erase_timeout_ms = 15000
//! max_pending_erases = 4
//! flash_base = "0x00800000"
//! chip_erase = true
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::catalog::parse_number;
use crate::error::{Error, Result};
use crate::protocol::MAX_PAYLOAD_LEN;

/// Address + size fields preceding the data of a write command
const WRITE_HEADER_LEN: usize = 8;

/// Limits and switches of an update session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfig {
    /// Bytes per write command
    pub chunk_size: usize,
    /// Wait for a sector erase acknowledgment
    pub erase_timeout: Duration,
    /// Wait for a write acknowledgment
    pub write_timeout: Duration,
    /// Wait for the chip erase acknowledgment
    pub chip_erase_timeout: Duration,
    /// Wait for the checksum poll answer
    pub crc_timeout: Duration,
    /// Re-sends allowed per erase command
    pub erase_retries: u32,
    /// Re-sends allowed per write command
    pub write_retries: u32,
    /// Sectors erased ahead of the writes
    pub max_pending_erases: usize,
    /// Flash address of image offset 0
    pub flash_base: u32,
    /// Minimum time between progress reports
    pub progress_interval: Duration,
    /// Erase the whole chip instead of sector by sector
    pub chip_erase: bool,
    /// Poll the device checksum after writing
    pub verify: bool,
    /// Reboot the receiver after a successful update
    pub reboot: bool,
    /// Checksum poll message version (1 or 2)
    pub crc_message_version: u8,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            erase_timeout: Duration::from_secs(12),
            write_timeout: Duration::from_secs(3),
            chip_erase_timeout: Duration::from_secs(45),
            crc_timeout: Duration::from_secs(3),
            erase_retries: 4,
            write_retries: 4,
            max_pending_erases: 2,
            flash_base: 0x0080_0000,
            progress_interval: Duration::from_secs(1),
            chip_erase: false,
            verify: true,
            reboot: false,
            crc_message_version: 1,
        }
    }
}

/// On-disk form, every key optional
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    chunk_size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    erase_timeout_ms: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    write_timeout_ms: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    chip_erase_timeout_ms: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    crc_timeout_ms: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    erase_retries: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    write_retries: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    max_pending_erases: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    flash_base: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    progress_interval_ms: Option<u32>,
    chip_erase: Option<bool>,
    verify: Option<bool>,
    reboot: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    crc_message_version: Option<u32>,
}

/// Deserialize an optional u32 given as integer or hex/decimal string
fn deserialize_opt_number<'de, D>(deserializer: D) -> core::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match Option::<HexOrInt>::deserialize(deserializer)? {
        None => Ok(None),
        Some(HexOrInt::Int(n)) => Ok(Some(n)),
        Some(HexOrInt::Str(s)) => parse_number(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid number '{}'", s))),
    }
}

fn millis(ms: u32) -> Duration {
    Duration::from_millis(ms as u64)
}

impl UpdateConfig {
    /// Defaults overridden by the keys of a TOML file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        let config = Self::from_toml(&content)?;
        log::debug!("update: loaded config from {}", path.display());
        Ok(config)
    }

    /// Defaults overridden by the keys of a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let mut config = Self::default();

        if let Some(v) = file.chunk_size {
            config.chunk_size = v as usize;
        }
        if let Some(v) = file.erase_timeout_ms {
            config.erase_timeout = millis(v);
        }
        if let Some(v) = file.write_timeout_ms {
            config.write_timeout = millis(v);
        }
        if let Some(v) = file.chip_erase_timeout_ms {
            config.chip_erase_timeout = millis(v);
        }
        if let Some(v) = file.crc_timeout_ms {
            config.crc_timeout = millis(v);
        }
        if let Some(v) = file.erase_retries {
            config.erase_retries = v;
        }
        if let Some(v) = file.write_retries {
            config.write_retries = v;
        }
        if let Some(v) = file.max_pending_erases {
            config.max_pending_erases = v as usize;
        }
        if let Some(v) = file.flash_base {
            config.flash_base = v;
        }
        if let Some(v) = file.progress_interval_ms {
            config.progress_interval = millis(v);
        }
        if let Some(v) = file.chip_erase {
            config.chip_erase = v;
        }
        if let Some(v) = file.verify {
            config.verify = v;
        }
        if let Some(v) = file.reboot {
            config.reboot = v;
        }
        if let Some(v) = file.crc_message_version {
            config.crc_message_version = u8::try_from(v).map_err(|_| {
                Error::InvalidConfig(format!("crc_message_version {} out of range", v))
            })?;
        }
        Ok(config)
    }

    /// Check the settings against a flash with `sector_size` byte sectors
    pub fn validate(&self, sector_size: u32) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be nonzero".into()));
        }
        if self.chunk_size > MAX_PAYLOAD_LEN - WRITE_HEADER_LEN {
            return Err(Error::InvalidConfig(format!(
                "chunk size {} exceeds the {} byte frame limit",
                self.chunk_size,
                MAX_PAYLOAD_LEN - WRITE_HEADER_LEN
            )));
        }
        if sector_size == 0 || sector_size as usize % self.chunk_size != 0 {
            return Err(Error::InvalidConfig(format!(
                "chunk size {} does not divide sector size {}",
                self.chunk_size, sector_size
            )));
        }
        if self.max_pending_erases == 0 {
            return Err(Error::InvalidConfig(
                "max pending erases must be nonzero".into(),
            ));
        }
        if !matches!(self.crc_message_version, 1 | 2) {
            return Err(Error::InvalidConfig(format!(
                "unknown crc message version {}",
                self.crc_message_version
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UpdateConfig::default();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.erase_timeout, Duration::from_secs(12));
        assert_eq!(config.chip_erase_timeout, Duration::from_secs(45));
        assert_eq!(config.max_pending_erases, 2);
        assert_eq!(config.flash_base, 0x0080_0000);
        assert!(config.verify);
        assert!(!config.chip_erase);
        config.validate(4096).unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config = UpdateConfig::from_toml(
            r#"
            chunk_size = "0x400"
            erase_timeout_ms = 15000
            flash_base = "0x01000000"
            chip_erase = true
            "#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.erase_timeout, Duration::from_millis(15000));
        assert_eq!(config.flash_base, 0x0100_0000);
        assert!(config.chip_erase);
        assert_eq!(config.write_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            UpdateConfig::from_toml("chunk_sise = 4"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            UpdateConfig::from_toml("chunk_size = \"lots\""),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate() {
        let config = UpdateConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate(4096).is_err());

        let config = UpdateConfig {
            chunk_size: 768,
            ..Default::default()
        };
        assert!(config.validate(4096).is_err());

        let config = UpdateConfig {
            max_pending_erases: 0,
            ..Default::default()
        };
        assert!(config.validate(4096).is_err());

        let config = UpdateConfig {
            crc_message_version: 3,
            ..Default::default()
        };
        assert!(config.validate(4096).is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.toml");
        std::fs::write(&path, "write_retries = 9\nverify = false\n").unwrap();

        let config = UpdateConfig::load_file(&path).unwrap();
        assert_eq!(config.write_retries, 9);
        assert!(!config.verify);

        assert!(matches!(
            UpdateConfig::load_file(&dir.path().join("missing.toml")),
            Err(Error::FileNotFound { .. })
        ));
    }
}
