//! Legacy FIS layout
//!
//! Sector size is implicit (4 KiB) and the record carries no capability
//! flags. Supply is stored as tenths of a volt.

use super::{read_u16, read_u32, write_u16, write_u32, FIS_RECORD_LEN};
use crate::catalog::JedecId;
use crate::error::{Error, Result};

const JEDEC: usize = 0x00;
const MAJOR: usize = 0x04;
const MINOR: usize = 0x05;
const SECTOR_COUNT: usize = 0x08;
const DEEP_SLEEP_OPCODE: usize = 0x0A;
const WAKEUP_OPCODE: usize = 0x0B;
const WAKEUP_TIMEOUT: usize = 0x0F;
const SUPPLY: usize = 0x1E;
const MAX_SPEED: usize = 0x1F;
const REVISION: usize = 0x20;

/// Decoded legacy record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FisV3 {
    /// JEDEC ID
    pub jedec: JedecId,
    /// Number of 4 KiB sectors
    pub sector_count: u16,
    /// Opcode entering deep sleep
    pub deep_sleep_opcode: u8,
    /// Opcode waking up from deep sleep
    pub wakeup_opcode: u8,
    /// Wake-up time (us)
    pub wakeup_timeout: u8,
    /// Supply voltage in tenths of a volt
    pub supply_decivolts: u8,
    /// Maximum clock speed
    pub max_speed: u8,
    /// Git revision of the record source
    pub revision: u32,
    base: Vec<u8>,
}

impl FisV3 {
    /// Major revision marker at byte 4
    pub const MAJOR: u8 = 3;
    /// Minor revision marker at byte 5
    pub const MINOR: u8 = 0;
    /// Fixed sector size
    pub const SECTOR_SIZE: u32 = 0x1000;

    /// Blank record for `jedec` with `sector_count` sectors
    pub fn new(jedec: JedecId, sector_count: u16) -> Self {
        let mut base = vec![0xFF; FIS_RECORD_LEN];
        base[MAJOR] = Self::MAJOR;
        base[MINOR] = Self::MINOR;
        Self {
            jedec,
            sector_count,
            deep_sleep_opcode: 0xB9,
            wakeup_opcode: 0xAB,
            wakeup_timeout: 0,
            supply_decivolts: 33,
            max_speed: 0,
            revision: 0,
            base,
        }
    }

    /// Decode a legacy record (checksum not checked)
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < FIS_RECORD_LEN {
            return Err(Error::corrupted(format!(
                "legacy FIS record needs {} bytes, got {}",
                FIS_RECORD_LEN,
                raw.len()
            )));
        }
        Ok(Self {
            jedec: JedecId::new(raw[JEDEC], raw[JEDEC + 1], raw[JEDEC + 2]),
            sector_count: read_u16(raw, SECTOR_COUNT),
            deep_sleep_opcode: raw[DEEP_SLEEP_OPCODE],
            wakeup_opcode: raw[WAKEUP_OPCODE],
            wakeup_timeout: raw[WAKEUP_TIMEOUT],
            supply_decivolts: raw[SUPPLY],
            max_speed: raw[MAX_SPEED],
            revision: read_u32(raw, REVISION),
            base: raw.to_vec(),
        })
    }

    /// Record length in bytes, checksum included
    pub fn record_len(&self) -> usize {
        self.base.len()
    }

    /// Serialize without checksum
    pub fn encode(&self) -> Vec<u8> {
        let mut raw = self.base.clone();
        raw[JEDEC..JEDEC + 3].copy_from_slice(&self.jedec.to_bytes());
        raw[MAJOR] = Self::MAJOR;
        raw[MINOR] = Self::MINOR;
        write_u16(&mut raw, SECTOR_COUNT, self.sector_count);
        raw[DEEP_SLEEP_OPCODE] = self.deep_sleep_opcode;
        raw[WAKEUP_OPCODE] = self.wakeup_opcode;
        raw[WAKEUP_TIMEOUT] = self.wakeup_timeout;
        raw[SUPPLY] = self.supply_decivolts;
        raw[MAX_SPEED] = self.max_speed;
        write_u32(&mut raw, REVISION, self.revision);
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_positions() {
        let mut fis = FisV3::new(JedecId::from_u32(0x1F8501), 0x0201);
        fis.supply_decivolts = 18;
        fis.revision = 0xA1B2C3D4;
        let raw = fis.encode();

        assert_eq!(&raw[0..3], &[0x1F, 0x85, 0x01]);
        assert_eq!(&raw[8..10], &[0x01, 0x02]);
        assert_eq!(raw[0x0A], 0xB9);
        assert_eq!(raw[0x1E], 18);
        assert_eq!(&raw[0x20..0x24], &[0xD4, 0xC3, 0xB2, 0xA1]);

        let decoded = FisV3::decode(&raw).unwrap();
        assert_eq!(decoded.jedec, fis.jedec);
        assert_eq!(decoded.sector_count, 0x0201);
        assert_eq!(decoded.revision, 0xA1B2C3D4);
        assert_eq!(decoded.encode(), raw);
    }
}
