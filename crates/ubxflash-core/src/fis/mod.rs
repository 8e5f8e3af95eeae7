//! Flash Information Structure (FIS) records
//!
//! A FIS record is embedded in the firmware image at [`FIS_OFFSET`]. Its
//! fields live in the first [`FIS_RECORD_LEN`] bytes; catalog command sets
//! may declare longer records (up to [`FIS_MAX_LEN`]) whose extra bytes are
//! carried through unchanged. The last four bytes always hold a CRC-32
//! seeded with [`FIS_CHECKSUM_SEED`](crate::checksum::FIS_CHECKSUM_SEED).
//!
//! Two incompatible layouts exist and share byte positions:
//!
//! - [`FisV1`]: the current layout, JEDEC ID at bytes 4..7
//! - [`FisV3`]: the legacy layout, JEDEC ID at bytes 0..3 and
//!   major/minor revision 3/0 at bytes 4/5
//!
//! [`FisFormat::detect`] looks at bytes 4/5 and the matching decoder is
//! used. A V1 record whose JEDEC manufacturer/type bytes are 3/0 would read
//! back as V3, so encoding one is refused.

mod v1;
mod v3;

pub use v1::FisV1;
pub use v3::FisV3;

use crate::catalog::{Capabilities, JedecId};
use crate::checksum::{stamp_record, verify_record, FIS_CHECKSUM_SEED};
use crate::error::{Error, Result};

/// Size of the field block, and of the shortest record (checksum included)
pub const FIS_RECORD_LEN: usize = 72;

/// Offset of the FIS record inside a firmware image
pub const FIS_OFFSET: usize = 0x40;

/// Longest record: the FIS window ends at the first 4 KiB boundary
pub const FIS_MAX_LEN: usize = 0x1000 - FIS_OFFSET;

/// Position of the major revision byte of the legacy layout
const MAJOR_REV_POS: usize = 0x04;
/// Position of the minor revision byte of the legacy layout
const MINOR_REV_POS: usize = 0x05;

/// Record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FisFormat {
    /// Current layout
    V1,
    /// Legacy layout ("version 3")
    V3,
}

impl FisFormat {
    /// Pick the layout of a raw record
    pub fn detect(raw: &[u8]) -> Self {
        if raw.len() > MINOR_REV_POS
            && raw[MAJOR_REV_POS] == FisV3::MAJOR
            && raw[MINOR_REV_POS] == FisV3::MINOR
        {
            FisFormat::V3
        } else {
            FisFormat::V1
        }
    }
}

impl core::fmt::Display for FisFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FisFormat::V1 => write!(f, "v1"),
            FisFormat::V3 => write!(f, "v3 (legacy)"),
        }
    }
}

/// A decoded FIS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FisRecord {
    /// Current layout
    V1(FisV1),
    /// Legacy layout
    V3(FisV3),
}

impl FisRecord {
    /// Decode a whole record, verifying its checksum first
    ///
    /// `bytes` is the record itself: between [`FIS_RECORD_LEN`] and
    /// [`FIS_MAX_LEN`] bytes, checksum last.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(bytes.len())?;
        if !verify_record(FIS_CHECKSUM_SEED, bytes) {
            return Err(Error::corrupted("FIS checksum mismatch"));
        }

        Ok(match FisFormat::detect(bytes) {
            FisFormat::V1 => FisRecord::V1(FisV1::decode(bytes)?),
            FisFormat::V3 => FisRecord::V3(FisV3::decode(bytes)?),
        })
    }

    /// Find and decode the record at the start of `window`
    ///
    /// The record length is not stored anywhere, so the shortest prefix
    /// whose trailing checksum verifies is taken.
    pub fn locate(window: &[u8]) -> Result<Self> {
        let longest = window.len().min(FIS_MAX_LEN);
        (FIS_RECORD_LEN..=longest)
            .find(|&len| verify_record(FIS_CHECKSUM_SEED, &window[..len]))
            .ok_or_else(|| {
                Error::corrupted(format!(
                    "no FIS record with a valid checksum in {} bytes",
                    window.len()
                ))
            })
            .and_then(|len| {
                log::debug!("fis: found a {} byte record", len);
                Self::decode(&window[..len])
            })
    }

    /// Serialize and stamp the checksum
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut raw = match self {
            FisRecord::V1(r) => r.encode()?,
            FisRecord::V3(r) => r.encode(),
        };
        stamp_record(FIS_CHECKSUM_SEED, &mut raw);
        Ok(raw)
    }

    /// Record length in bytes, checksum included
    pub fn record_len(&self) -> usize {
        match self {
            FisRecord::V1(r) => r.record_len(),
            FisRecord::V3(r) => r.record_len(),
        }
    }

    /// Layout of this record
    pub fn format(&self) -> FisFormat {
        match self {
            FisRecord::V1(_) => FisFormat::V1,
            FisRecord::V3(_) => FisFormat::V3,
        }
    }

    /// JEDEC ID of the flash the record describes
    pub fn jedec(&self) -> JedecId {
        match self {
            FisRecord::V1(r) => r.jedec,
            FisRecord::V3(r) => r.jedec,
        }
    }

    /// Erase sector size in bytes
    pub fn sector_size(&self) -> u32 {
        match self {
            FisRecord::V1(r) => r.sector_size,
            FisRecord::V3(_) => FisV3::SECTOR_SIZE,
        }
    }

    /// Number of sectors
    pub fn sector_count(&self) -> u32 {
        match self {
            FisRecord::V1(r) => r.sector_count,
            FisRecord::V3(r) => r.sector_count as u32,
        }
    }

    /// Capability flags (legacy records have none)
    pub fn capabilities(&self) -> Capabilities {
        match self {
            FisRecord::V1(r) => r.capabilities,
            FisRecord::V3(_) => Capabilities::empty(),
        }
    }

    /// Database (V1) or git (V3) revision
    pub fn revision(&self) -> u32 {
        match self {
            FisRecord::V1(r) => r.revision,
            FisRecord::V3(r) => r.revision,
        }
    }
}

/// Fail with `CodeCorrupted` unless `len` is a valid record length
pub(crate) fn check_len(len: usize) -> Result<()> {
    if (FIS_RECORD_LEN..=FIS_MAX_LEN).contains(&len) {
        Ok(())
    } else {
        Err(Error::corrupted(format!(
            "FIS record of {} bytes, need {} to {}",
            len, FIS_RECORD_LEN, FIS_MAX_LEN
        )))
    }
}

pub(crate) fn read_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

pub(crate) fn read_u32(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

pub(crate) fn write_u16(raw: &mut [u8], at: usize, value: u16) {
    raw[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u32(raw: &mut [u8], at: usize, value: u32) {
    raw[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{long_template_code, template_code};

    fn template() -> Vec<u8> {
        template_code()
    }

    #[test]
    fn test_detect_format() {
        let mut raw = template();
        assert_eq!(FisFormat::detect(&raw), FisFormat::V1);
        raw[4] = 3;
        raw[5] = 0;
        assert_eq!(FisFormat::detect(&raw), FisFormat::V3);
        raw[5] = 1;
        assert_eq!(FisFormat::detect(&raw), FisFormat::V1);
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut raw = template();
        raw[20] ^= 0xFF;
        assert!(matches!(
            FisRecord::decode(&raw),
            Err(Error::CodeCorrupted(_))
        ));
    }

    #[test]
    fn test_decode_rejects_short_input() {
        assert!(matches!(
            FisRecord::decode(&[0u8; 40]),
            Err(Error::CodeCorrupted(_))
        ));
    }

    #[test]
    fn test_v1_encode_decode() {
        let mut fis = FisV1::decode(&template()).unwrap();
        fis.jedec = JedecId::from_u32(0xEF4015);
        fis.sector_size = 0x1000;
        fis.sector_count = 512;
        fis.revision = 77;

        let raw = FisRecord::V1(fis).encode().unwrap();
        assert_eq!(&raw[4..7], &[0xEF, 0x40, 0x15]);

        let decoded = FisRecord::decode(&raw).unwrap();
        assert_eq!(decoded.format(), FisFormat::V1);
        assert_eq!(decoded.jedec(), JedecId::from_u32(0xEF4015));
        assert_eq!(decoded.sector_size(), 0x1000);
        assert_eq!(decoded.sector_count(), 512);
        assert_eq!(decoded.revision(), 77);
        assert_eq!(decoded.encode().unwrap(), raw);
    }

    #[test]
    fn test_v3_encode_decode() {
        let fis = FisV3::new(JedecId::from_u32(0xC22536), 2048);
        let raw = FisRecord::V3(fis).encode().unwrap();
        assert_eq!(raw[4], 3);
        assert_eq!(raw[5], 0);

        let decoded = FisRecord::decode(&raw).unwrap();
        assert_eq!(decoded.format(), FisFormat::V3);
        assert_eq!(decoded.jedec(), JedecId::from_u32(0xC22536));
        assert_eq!(decoded.sector_size(), 4096);
        assert_eq!(decoded.sector_count(), 2048);
        assert_eq!(decoded.capabilities(), Capabilities::empty());
    }

    #[test]
    fn test_v1_with_legacy_marker_is_refused() {
        let mut fis = FisV1::decode(&template()).unwrap();
        fis.jedec = JedecId::new(0x03, 0x00, 0x17);
        assert!(matches!(
            FisRecord::V1(fis).encode(),
            Err(Error::VersionError(_))
        ));
    }

    #[test]
    fn test_long_record_encode_decode() {
        let raw = long_template_code(300);
        let FisRecord::V1(mut fis) = FisRecord::decode(&raw).unwrap() else {
            panic!("expected a V1 record");
        };
        assert_eq!(fis.record_len(), 300);

        fis.sector_count = 4096;
        let out = FisRecord::V1(fis).encode().unwrap();
        assert_eq!(out.len(), 300);
        assert_eq!(&out[FIS_RECORD_LEN..296], &raw[FIS_RECORD_LEN..296]);
        assert!(verify_record(FIS_CHECKSUM_SEED, &out));
        assert_eq!(FisRecord::decode(&out).unwrap().sector_count(), 4096);
    }

    #[test]
    fn test_decode_rejects_oversized_record() {
        let raw = long_template_code(FIS_MAX_LEN + 4);
        assert!(matches!(
            FisRecord::decode(&raw),
            Err(Error::CodeCorrupted(_))
        ));
    }

    #[test]
    fn test_locate_finds_record_length() {
        for len in [FIS_RECORD_LEN, 73, 512, FIS_MAX_LEN] {
            let mut window = long_template_code(len);
            window.extend((0..64).map(|i| i as u8));
            let record = FisRecord::locate(&window).unwrap();
            assert_eq!(record.record_len(), len);
            assert_eq!(record.format(), FisFormat::V1);
        }
    }

    #[test]
    fn test_locate_without_record() {
        let window: Vec<u8> = (0..FIS_MAX_LEN).map(|i| (i % 251) as u8).collect();
        assert!(matches!(
            FisRecord::locate(&window),
            Err(Error::CodeCorrupted(_))
        ));
    }
}
