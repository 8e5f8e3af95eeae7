//! Current FIS layout

use super::{read_u32, write_u32, FisV3, FIS_RECORD_LEN};
use crate::catalog::{Capabilities, DeviceSettings, JedecId, Supply};
use crate::error::{Error, Result};

const CAPABILITIES: usize = 0x01;
const JEDEC: usize = 0x04;
const SUPPLY: usize = 0x07;
const SECTOR_SIZE: usize = 0x08;
const SECTOR_COUNT: usize = 0x0C;
const HSP: usize = 0x10;
const CFG: usize = 0x14;
const MIN_ERASE_SUSPEND: usize = 0x18;
const NUM_BYTES_WRITE: usize = 0x1C;
const DEEP_SLEEP_OPCODE: usize = 0x38;
const WAKEUP_OPCODE: usize = 0x39;
const WAKEUP_TIMEOUT: usize = 0x3A;
const REVISION: usize = 0x3C;
const MAX_SPEED: usize = 0x43;

/// Low-voltage flag in the supply byte
const SUPPLY_LOW: u8 = 0x01;

/// Decoded V1 record
///
/// Bytes without a field of their own (command opcodes, timings, anything
/// past the field block of a long record) are kept from the decoded source
/// and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FisV1 {
    /// Capability flags
    pub capabilities: Capabilities,
    /// JEDEC ID
    pub jedec: JedecId,
    /// Supply voltage class
    pub supply: Supply,
    /// Erase sector size in bytes
    pub sector_size: u32,
    /// Number of sectors
    pub sector_count: u32,
    /// High speed parameter word
    pub hsp: u32,
    /// Configuration word
    pub cfg: u32,
    /// Minimum erase time before suspending
    pub min_erase_suspend: u32,
    /// Bytes per write command
    pub num_bytes_write: u32,
    /// Opcode entering deep sleep
    pub deep_sleep_opcode: u8,
    /// Opcode waking up from deep sleep
    pub wakeup_opcode: u8,
    /// Wake-up time (us)
    pub wakeup_timeout: u8,
    /// Catalog database revision
    pub revision: u32,
    /// Maximum clock speed
    pub max_speed: u8,
    base: Vec<u8>,
}

impl FisV1 {
    /// Decode a V1 record (checksum not checked)
    ///
    /// `raw` is the whole record; only its field block is interpreted.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < FIS_RECORD_LEN {
            return Err(Error::corrupted(format!(
                "FIS record needs {} bytes, got {}",
                FIS_RECORD_LEN,
                raw.len()
            )));
        }
        Ok(Self {
            capabilities: Capabilities::from_bits_retain(raw[CAPABILITIES]),
            jedec: JedecId::new(raw[JEDEC], raw[JEDEC + 1], raw[JEDEC + 2]),
            supply: if raw[SUPPLY] & SUPPLY_LOW != 0 {
                Supply::Low
            } else {
                Supply::Standard
            },
            sector_size: read_u32(raw, SECTOR_SIZE),
            sector_count: read_u32(raw, SECTOR_COUNT),
            hsp: read_u32(raw, HSP),
            cfg: read_u32(raw, CFG),
            min_erase_suspend: read_u32(raw, MIN_ERASE_SUSPEND),
            num_bytes_write: read_u32(raw, NUM_BYTES_WRITE),
            deep_sleep_opcode: raw[DEEP_SLEEP_OPCODE],
            wakeup_opcode: raw[WAKEUP_OPCODE],
            wakeup_timeout: raw[WAKEUP_TIMEOUT],
            revision: read_u32(raw, REVISION),
            max_speed: raw[MAX_SPEED],
            base: raw.to_vec(),
        })
    }

    /// Record length in bytes, checksum included
    pub fn record_len(&self) -> usize {
        self.base.len()
    }

    /// Serialize without checksum
    ///
    /// Fails if the JEDEC bytes would be mistaken for the legacy marker.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let [manufacturer, memory_type, capacity] = self.jedec.to_bytes();
        if manufacturer == FisV3::MAJOR && memory_type == FisV3::MINOR {
            return Err(Error::VersionError(format!(
                "JEDEC {} collides with the legacy FIS marker",
                self.jedec
            )));
        }

        let mut raw = self.base.clone();
        raw[CAPABILITIES] = self.capabilities.bits();
        raw[JEDEC] = manufacturer;
        raw[JEDEC + 1] = memory_type;
        raw[JEDEC + 2] = capacity;
        raw[SUPPLY] = match self.supply {
            Supply::Low => raw[SUPPLY] | SUPPLY_LOW,
            Supply::Standard => raw[SUPPLY] & !SUPPLY_LOW,
        };
        write_u32(&mut raw, SECTOR_SIZE, self.sector_size);
        write_u32(&mut raw, SECTOR_COUNT, self.sector_count);
        write_u32(&mut raw, HSP, self.hsp);
        write_u32(&mut raw, CFG, self.cfg);
        write_u32(&mut raw, MIN_ERASE_SUSPEND, self.min_erase_suspend);
        write_u32(&mut raw, NUM_BYTES_WRITE, self.num_bytes_write);
        raw[DEEP_SLEEP_OPCODE] = self.deep_sleep_opcode;
        raw[WAKEUP_OPCODE] = self.wakeup_opcode;
        raw[WAKEUP_TIMEOUT] = self.wakeup_timeout;
        write_u32(&mut raw, REVISION, self.revision);
        raw[MAX_SPEED] = self.max_speed;
        Ok(raw)
    }

    /// Apply the optional overrides of a catalog entry
    pub fn apply(&mut self, settings: &DeviceSettings) {
        if let Some(v) = settings.supply {
            self.supply = v;
        }
        if let Some(v) = settings.hsp {
            self.hsp = v;
        }
        if let Some(v) = settings.cfg {
            self.cfg = v;
        }
        if let Some(v) = settings.min_erase_suspend {
            self.min_erase_suspend = v;
        }
        if let Some(v) = settings.num_bytes_write {
            self.num_bytes_write = v;
        }
        if let Some(v) = settings.deep_sleep_opcode {
            self.deep_sleep_opcode = v;
        }
        if let Some(v) = settings.wakeup_opcode {
            self.wakeup_opcode = v;
        }
        if let Some(v) = settings.wakeup_timeout {
            self.wakeup_timeout = v;
        }
        if let Some(v) = settings.max_speed {
            self.max_speed = v;
        }
    }
}
