//! Flash descriptor types

use core::fmt;

use super::{Capabilities, JedecId};

/// Supply voltage class of a flash chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supply {
    /// 1.8 V part
    Low,
    /// Any other supply (3 V class)
    Standard,
}

impl Supply {
    /// Parse a catalog `supply` attribute such as `1.8V` or `3.3V`
    pub fn parse(s: &str) -> Self {
        if s.trim().starts_with("1.8V") {
            Supply::Low
        } else {
            Supply::Standard
        }
    }
}

impl fmt::Display for Supply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Supply::Low => write!(f, "1.8V"),
            Supply::Standard => write!(f, "3V"),
        }
    }
}

/// Catalog format revision (`fisVersion`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FisRevision {
    /// Major revision
    pub major: u8,
    /// Minor revision
    pub minor: u8,
}

impl fmt::Display for FisRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Optional record fields a catalog entry may override
///
/// `None` keeps the value of the command set template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Supply voltage class
    pub supply: Option<Supply>,
    /// High speed parameter word
    pub hsp: Option<u32>,
    /// Configuration word
    pub cfg: Option<u32>,
    /// Minimum erase time before suspending
    pub min_erase_suspend: Option<u32>,
    /// Bytes per write command
    pub num_bytes_write: Option<u32>,
    /// Opcode entering deep sleep
    pub deep_sleep_opcode: Option<u8>,
    /// Opcode waking up from deep sleep
    pub wakeup_opcode: Option<u8>,
    /// Wake-up time (us)
    pub wakeup_timeout: Option<u8>,
    /// Maximum clock speed
    pub max_speed: Option<u8>,
}

/// A flash chip entry of the catalog
///
/// Immutable once loaded. `sector_size * sector_count` is the addressable
/// capacity; both are nonzero powers of two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashDescriptor {
    /// JEDEC ID keying this entry
    pub jedec: JedecId,
    /// Erase sector size in bytes
    pub sector_size: u32,
    /// Number of sectors
    pub sector_count: u32,
    /// Capability flags (catalog-controlled bits only)
    pub capabilities: Capabilities,
    /// Catalog format revision the entry was read with
    pub revision: FisRevision,
    /// Name of the command set providing the record template
    pub command_set: String,
    /// Optional overrides
    pub settings: DeviceSettings,
}

impl FlashDescriptor {
    /// Addressable capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.sector_size as u64 * self.sector_count as u64
    }
}

/// Record template referenced by devices through their `cmd` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    /// Name of the command set
    pub name: String,
    /// Template bytes including a verified checksum
    pub code: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_parse() {
        assert_eq!(Supply::parse("1.8V"), Supply::Low);
        assert_eq!(Supply::parse(" 1.8V "), Supply::Low);
        assert_eq!(Supply::parse("3.3V"), Supply::Standard);
        assert_eq!(Supply::parse("1.8"), Supply::Standard);
    }

    #[test]
    fn test_capacity() {
        let desc = FlashDescriptor {
            jedec: JedecId::from_u32(0xEF4015),
            sector_size: 4096,
            sector_count: 512,
            capabilities: Capabilities::empty(),
            revision: FisRevision { major: 2, minor: 0 },
            command_set: "winbond".into(),
            settings: DeviceSettings::default(),
        };
        assert_eq!(desc.capacity(), 2 * 1024 * 1024);
    }
}
