//! Checksums shared by the merge and update stages
//!
//! - [`fis_crc32`]: seeded, non-inverted reflected CRC-32 used by FIS records
//!   and image footers
//! - [`fletcher32`]: UBX 32-bit Fletcher over little-endian words, used for
//!   the whole-image checksum and the post-flash verification
//! - [`ubx_checksum`]: 8-bit Fletcher closing every UBX frame

/// Seed of the FIS record checksum
pub const FIS_CHECKSUM_SEED: u32 = 0x1234_5678;

/// Seed of the image footer checksum (newer receiver generations)
pub const FOOTER_CHECKSUM_SEED: u32 = 0x0F5D_4C69;

/// Reflected CRC-32 (polynomial 0xEDB88320) starting from `seed`
///
/// Unlike the common zlib variant there is no initial or final inversion:
/// the register starts at `seed` and its final value is the result.
/// `crc32fast` inverts on entry and exit, so both are undone here.
pub fn fis_crc32(seed: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(!seed);
    hasher.update(data);
    !hasher.finalize()
}

/// Compute the checksum of a record whose last 4 bytes hold it (LE)
///
/// Returns `None` for records shorter than the checksum itself.
pub fn record_checksum(seed: u32, record: &[u8]) -> Option<u32> {
    let body_len = record.len().checked_sub(4)?;
    Some(fis_crc32(seed, &record[..body_len]))
}

/// Stamp the checksum of `record` into its last 4 bytes
///
/// Records shorter than 4 bytes are left untouched.
pub fn stamp_record(seed: u32, record: &mut [u8]) {
    if let Some(crc) = record_checksum(seed, record) {
        let at = record.len() - 4;
        record[at..].copy_from_slice(&crc.to_le_bytes());
    }
}

/// Check the checksum stored in the last 4 bytes of `record`
pub fn verify_record(seed: u32, record: &[u8]) -> bool {
    match record_checksum(seed, record) {
        Some(crc) => {
            let at = record.len() - 4;
            record[at..] == crc.to_le_bytes()
        }
        None => false,
    }
}

/// UBX Fletcher-32 over little-endian u32 words
///
/// Trailing bytes that do not fill a whole word are ignored.
pub fn fletcher32(data: &[u8]) -> (u32, u32) {
    let mut a: u32 = 0;
    let mut b: u32 = 0;
    for word in data.chunks_exact(4) {
        a = a.wrapping_add(u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        b = b.wrapping_add(a);
    }
    (a, b)
}

/// UBX 8-bit Fletcher checksum over class, id, length and payload
pub fn ubx_checksum(data: &[u8]) -> (u8, u8) {
    let mut a: u8 = 0;
    let mut b: u8 = 0;
    for &byte in data {
        a = a.wrapping_add(byte);
        b = b.wrapping_add(a);
    }
    (a, b)
}
