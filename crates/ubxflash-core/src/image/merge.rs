//! FIS merge
//!
//! Builds the FIS record of a catalog entry from its command set template
//! and patches it into a copy of the image. The input is never modified.

use super::{checksum_span, stamp_checksum, IMAGE_CHECKSUM_LEN};
use crate::catalog::{Catalog, FlashDescriptor, JedecId};
use crate::error::{Error, Result};
use crate::fis::{FisFormat, FisRecord, FisV1, FIS_OFFSET};

/// Merge the FIS record for `jedec` into `image`
///
/// Returns the patched image with a fresh checksum trailer.
pub fn merge(image: &[u8], jedec: JedecId, catalog: &Catalog) -> Result<Vec<u8>> {
    checksum_span(image)?;

    let descriptor = catalog
        .lookup(jedec)
        .ok_or(Error::JedecNotSupported(jedec))?;
    let record = build_record(descriptor, catalog)?;

    log::info!(
        "merge: {} ({} x {} bytes, caps {})",
        jedec,
        descriptor.sector_count,
        descriptor.sector_size,
        record.capabilities().describe()
    );
    merge_record(image, &record)
}

/// Build the FIS record of a catalog entry
pub fn build_record(descriptor: &FlashDescriptor, catalog: &Catalog) -> Result<FisRecord> {
    let set = catalog.command_set(&descriptor.command_set).ok_or_else(|| {
        Error::Unknown(format!(
            "device {} references missing cmdset '{}'",
            descriptor.jedec, descriptor.command_set
        ))
    })?;
    if FisFormat::detect(&set.code) != FisFormat::V1 {
        return Err(Error::VersionError(format!(
            "cmdset '{}' uses the legacy FIS layout",
            set.name
        )));
    }

    let mut fis = FisV1::decode(&set.code)?;
    fis.apply(&descriptor.settings);
    fis.capabilities = fis.capabilities.with_catalog_flags(descriptor.capabilities);
    fis.jedec = descriptor.jedec;
    fis.sector_size = descriptor.sector_size;
    fis.sector_count = descriptor.sector_count;
    if let Some(revision) = catalog.revision() {
        fis.revision = revision;
    }
    Ok(FisRecord::V1(fis))
}

/// Patch an already built record into a copy of `image`
pub fn merge_record(image: &[u8], record: &FisRecord) -> Result<Vec<u8>> {
    let span = checksum_span(image)?;
    let raw = record.encode()?;

    let end = FIS_OFFSET + raw.len();
    if end > span - IMAGE_CHECKSUM_LEN {
        return Err(Error::corrupted(format!(
            "{} byte FIS record does not fit before the checksum at 0x{:X}",
            raw.len(),
            span - IMAGE_CHECKSUM_LEN
        )));
    }

    let mut out = image.to_vec();
    out[FIS_OFFSET..end].copy_from_slice(&raw);
    stamp_checksum(&mut out)?;
    Ok(out)
}
