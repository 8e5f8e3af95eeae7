//! Firmware image handling
//!
//! A firmware image is a byte buffer with:
//!
//! - an optional header (`UBX7`/`UBX8`/... magic) giving the extent of the
//!   checksummed code
//! - the FIS record window at [`FIS_OFFSET`]
//! - an 8-byte Fletcher-32 checksum at the end of the checksummed span
//!
//! Images without a recognized header are checksummed over their whole
//! length. u-blox 9 images have no header; they end with an
//! [`ImageFooter`] instead.

mod footer;
mod merge;

pub use footer::{ImageFooter, FOOTER_MAGIC, MAX_FOOTER_IMAGES};
pub use merge::{build_record, merge, merge_record};

use std::fs;
use std::path::Path;

use crate::catalog::{Catalog, JedecId};
use crate::checksum::fletcher32;
use crate::error::{Error, Result};
use crate::fis::{FisRecord, FIS_OFFSET, FIS_RECORD_LEN};

/// Size of the image checksum trailer (`a`, `b`)
pub const IMAGE_CHECKSUM_LEN: usize = 8;

/// Smallest image that can hold the FIS window and the checksum trailer
pub const MIN_IMAGE_LEN: usize = FIS_OFFSET + FIS_RECORD_LEN + IMAGE_CHECKSUM_LEN;

/// Checksum coverage starts after the magic word
const CHECKSUM_START: usize = 4;

const HEADER_LEN: usize = 0x1C;
const P_BASE: usize = 0x0C;
const P_START: usize = 0x10;
const P_END: usize = 0x14;
const P_VERSION: usize = 0x18;

/// Header pointers must fall into the external flash window
const FLASH_WINDOW: u32 = 0x0080_0000;
const FLASH_WINDOW_MASK: u32 = 0xFF80_0000;

/// Longest version string read from the image
const MAX_VERSION_LEN: usize = 100;

/// Generation reported for headerless images with a valid footer
pub const FOOTER_GENERATION: u8 = 91;

/// Known header magics and the receiver generation they identify
const MAGICS: &[(&[u8; 4], u8)] = &[
    (b"UBX5", 50),
    (b"UB51", 60),
    (b"UBX7", 70),
    (b"UBX8", 80),
];

/// Image header of a receiver firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Magic at offset 0
    pub magic: [u8; 4],
    /// Receiver generation (50, 60, 70, 80)
    pub generation: u8,
    /// Load address of the image
    pub base: u32,
    /// Entry point
    pub start: u32,
    /// End of code (bit 0 is a flag)
    pub end: u32,
    /// Address of the version string
    pub version: u32,
}

impl ImageHeader {
    /// Parse the header, `None` if the magic is not recognized
    pub fn parse(image: &[u8]) -> Option<Self> {
        if image.len() < HEADER_LEN {
            return None;
        }
        let magic: [u8; 4] = image[0..4].try_into().ok()?;
        let generation = MAGICS
            .iter()
            .find(|(m, _)| **m == magic)
            .map(|(_, g)| *g)?;

        Some(Self {
            magic,
            generation,
            base: read_u32(image, P_BASE),
            start: read_u32(image, P_START),
            end: read_u32(image, P_END),
            version: read_u32(image, P_VERSION),
        })
    }

    /// Check that the pointers are ordered and inside the flash window
    pub fn check_pointers(&self) -> Result<()> {
        let in_window = |p: u32| p & FLASH_WINDOW_MASK == FLASH_WINDOW;
        if self.end < self.start
            || self.start < self.base
            || !in_window(self.base)
            || !in_window(self.start)
            || !in_window(self.end)
        {
            return Err(Error::corrupted(format!(
                "{} header addresses invalid (base 0x{:08X}, start 0x{:08X}, end 0x{:08X})",
                self.magic_str(),
                self.base,
                self.start,
                self.end
            )));
        }
        Ok(())
    }

    /// Version string the header points to, if it lies inside `image`
    pub fn version_string(&self, image: &[u8]) -> Option<String> {
        if self.version & FLASH_WINDOW_MASK != FLASH_WINDOW {
            return None;
        }
        let at = self.version.checked_sub(self.base)? as usize;
        let text = image.get(at..)?;
        let text = &text[..text.len().min(MAX_VERSION_LEN)];
        let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        Some(String::from_utf8_lossy(&text[..end]).into_owned())
    }

    /// Length of the checksummed span, trailer included
    ///
    /// `None` if the pointers are inconsistent.
    pub fn span(&self) -> Option<usize> {
        let end = self.end & !1;
        let code = end.checked_sub(self.base)? as usize;
        code.checked_add(IMAGE_CHECKSUM_LEN)
    }

    /// Magic as text
    pub fn magic_str(&self) -> String {
        String::from_utf8_lossy(&self.magic).into_owned()
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Length of the checksummed span of `image`
///
/// Fails with `CodeCorrupted` if the image cannot hold the FIS window and
/// the checksum trailer, or if its header is inconsistent.
pub fn checksum_span(image: &[u8]) -> Result<usize> {
    if image.len() < MIN_IMAGE_LEN {
        return Err(Error::corrupted(format!(
            "image of {} bytes is shorter than the FIS window (need {})",
            image.len(),
            MIN_IMAGE_LEN
        )));
    }

    let span = match ImageHeader::parse(image) {
        Some(header) => {
            let span = header.span().ok_or_else(|| {
                Error::corrupted(format!(
                    "{} header: end 0x{:08X} before base 0x{:08X}",
                    header.magic_str(),
                    header.end,
                    header.base
                ))
            })?;
            if span > image.len() {
                return Err(Error::corrupted(format!(
                    "{} header claims {} bytes, image has {}",
                    header.magic_str(),
                    span,
                    image.len()
                )));
            }
            span
        }
        None => image.len(),
    };

    if span < MIN_IMAGE_LEN {
        return Err(Error::corrupted(format!(
            "checksummed span of {} bytes does not cover the FIS window",
            span
        )));
    }
    if span % 4 != 0 {
        return Err(Error::corrupted(format!(
            "checksummed span of {} bytes is not word aligned",
            span
        )));
    }
    Ok(span)
}

/// Fletcher-32 of the checksummed span, trailer excluded
fn compute_checksum(image: &[u8], span: usize) -> (u32, u32) {
    fletcher32(&image[CHECKSUM_START..span - IMAGE_CHECKSUM_LEN])
}

/// Checksum stored in the trailer
fn stored_checksum(image: &[u8], span: usize) -> (u32, u32) {
    let at = span - IMAGE_CHECKSUM_LEN;
    (read_u32(image, at), read_u32(image, at + 4))
}

/// Recompute and write the image checksum, then verify it
pub(crate) fn stamp_checksum(image: &mut [u8]) -> Result<()> {
    let span = checksum_span(image)?;
    let (a, b) = compute_checksum(image, span);
    let at = span - IMAGE_CHECKSUM_LEN;
    image[at..at + 4].copy_from_slice(&a.to_le_bytes());
    image[at + 4..at + 8].copy_from_slice(&b.to_le_bytes());
    log::debug!("merge: image checksum a=0x{:08X} b=0x{:08X} over {} bytes", a, b, span);
    verify_checksum(image)
}

/// Check the image checksum trailer
pub fn verify_checksum(image: &[u8]) -> Result<()> {
    let span = checksum_span(image)?;
    if compute_checksum(image, span) == stored_checksum(image, span) {
        Ok(())
    } else {
        Err(Error::CrcFailure)
    }
}

/// Decode the FIS record embedded in a merged image
///
/// The record may extend up to the checksum trailer or the end of the FIS
/// window, whichever comes first.
pub fn read_record(image: &[u8]) -> Result<FisRecord> {
    let span = checksum_span(image)?;
    FisRecord::locate(&image[FIS_OFFSET..span - IMAGE_CHECKSUM_LEN])
}

/// Sector count of the flash a merged image targets
pub fn sector_count(image: &[u8]) -> Result<u32> {
    read_record(image).map(|fis| fis.sector_count())
}

/// Sector size of the flash a merged image targets
pub fn sector_size(image: &[u8]) -> Result<u32> {
    read_record(image).map(|fis| fis.sector_size())
}

/// An image accepted by [`validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// Receiver generation the image is built for (91 for footer-only images)
    pub generation: u8,
    /// Footer, if present
    pub footer: Option<ImageFooter>,
    /// Version string, headered images only
    pub version: Option<String>,
}

/// Check that `image` is a receiver firmware
///
/// A footer, when present, must be valid. A headerless image is accepted
/// on its footer alone, as its content is scrambled. A headered image must
/// have sane pointers and a matching checksum.
pub fn validate(image: &[u8]) -> Result<Validation> {
    let footer = ImageFooter::find(image)?;

    let Some(header) = ImageHeader::parse(image) else {
        return match footer {
            Some(footer) => {
                log::info!("image: u-blox 9 image ({} bytes) accepted", image.len());
                Ok(Validation {
                    generation: FOOTER_GENERATION,
                    footer: Some(footer),
                    version: None,
                })
            }
            None => Err(Error::corrupted("no image magic and no footer")),
        };
    };

    header.check_pointers()?;
    verify_checksum(image)?;

    let version = header.version_string(image);
    log::info!(
        "image: {} bytes for u-blox {} accepted, version '{}'",
        image.len(),
        header.generation / 10,
        version.as_deref().unwrap_or("")
    );
    Ok(Validation {
        generation: header.generation,
        footer,
        version,
    })
}

/// Summary of an image for display
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Total length
    pub len: usize,
    /// Header, if recognized
    pub header: Option<ImageHeader>,
    /// Checksummed span
    pub span: usize,
    /// Checksum stored in the trailer
    pub checksum: (u32, u32),
    /// Whether the stored checksum matches the content
    pub checksum_valid: bool,
    /// Embedded FIS record, or why it could not be decoded
    pub fis: core::result::Result<FisRecord, String>,
    /// Validation outcome, or why the image was rejected
    pub validation: core::result::Result<Validation, String>,
}

/// Gather header, checksum and FIS information about an image
pub fn inspect(image: &[u8]) -> Result<ImageInfo> {
    let span = checksum_span(image)?;
    let checksum = stored_checksum(image, span);
    Ok(ImageInfo {
        len: image.len(),
        header: ImageHeader::parse(image),
        span,
        checksum,
        checksum_valid: compute_checksum(image, span) == checksum,
        fis: read_record(image).map_err(|e| e.to_string()),
        validation: validate(image).map_err(|e| e.to_string()),
    })
}

/// An owned firmware image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Wrap raw bytes
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Read an image file
    pub fn load_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| Error::file(path, e))?;
        log::debug!("merge: read {} bytes from {}", data.len(), path.display());
        Ok(Self { data })
    }

    /// Write the image to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.data).map_err(|e| Error::file(path, e))
    }

    /// Image bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume into the byte buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Image length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check for an empty image
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Header, if recognized
    pub fn header(&self) -> Option<ImageHeader> {
        ImageHeader::parse(&self.data)
    }

    /// Length of the checksummed span
    pub fn checksum_span(&self) -> Result<usize> {
        checksum_span(&self.data)
    }

    /// Embedded FIS record
    pub fn fis(&self) -> Result<FisRecord> {
        read_record(&self.data)
    }

    /// Sector count from the embedded FIS record
    pub fn sector_count(&self) -> Result<u32> {
        sector_count(&self.data)
    }

    /// Sector size from the embedded FIS record
    pub fn sector_size(&self) -> Result<u32> {
        sector_size(&self.data)
    }

    /// Check the checksum trailer
    pub fn verify_checksum(&self) -> Result<()> {
        verify_checksum(&self.data)
    }

    /// Merge the FIS record of `jedec` into a copy of this image
    pub fn merge(&self, jedec: JedecId, catalog: &Catalog) -> Result<FirmwareImage> {
        merge(&self.data, jedec, catalog).map(Self::from_bytes)
    }

    /// Check that this is a receiver firmware
    pub fn validate(&self) -> Result<Validation> {
        validate(&self.data)
    }

    /// Header, checksum and FIS summary
    pub fn inspect(&self) -> Result<ImageInfo> {
        inspect(&self.data)
    }
}

impl From<Vec<u8>> for FirmwareImage {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

impl AsRef<[u8]> for FirmwareImage {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::raw_image;

    fn with_header(magic: &[u8; 4], len: usize, base: u32, end: u32) -> Vec<u8> {
        let mut image = raw_image(len);
        image[0..4].copy_from_slice(magic);
        image[P_BASE..P_BASE + 4].copy_from_slice(&base.to_le_bytes());
        image[P_START..P_START + 4].copy_from_slice(&(base + 0x100).to_le_bytes());
        image[P_END..P_END + 4].copy_from_slice(&end.to_le_bytes());
        image
    }

    /// Valid UBX8 image of 1 KiB with a version string at 0x300
    fn valid_image() -> Vec<u8> {
        let mut image = with_header(b"UBX8", 1024, 0x0080_0000, 0x0080_03F9);
        image[P_VERSION..P_VERSION + 4].copy_from_slice(&0x0080_0300u32.to_le_bytes());
        image[0x300..0x30C].copy_from_slice(b"ROM 3.01\0xyz");
        stamp_checksum(&mut image).unwrap();
        image
    }

    #[test]
    fn test_span_without_header() {
        assert_eq!(checksum_span(&raw_image(512)).unwrap(), 512);
        assert!(ImageHeader::parse(&raw_image(512)).is_none());
    }

    #[test]
    fn test_span_from_header() {
        // end has its flag bit set; 0x200 bytes of code + 8-byte trailer
        let image = with_header(b"UBX8", 1024, 0x0080_0000, 0x0080_0201);
        let header = ImageHeader::parse(&image).unwrap();
        assert_eq!(header.generation, 80);
        assert_eq!(header.magic_str(), "UBX8");
        assert_eq!(checksum_span(&image).unwrap(), 0x208);
    }

    #[test]
    fn test_inconsistent_header() {
        let image = with_header(b"UBX7", 1024, 0x0080_0000, 0x0070_0000);
        assert!(matches!(checksum_span(&image), Err(Error::CodeCorrupted(_))));

        let image = with_header(b"UBX7", 1024, 0x0080_0000, 0x0080_1000);
        assert!(matches!(checksum_span(&image), Err(Error::CodeCorrupted(_))));
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            checksum_span(&raw_image(MIN_IMAGE_LEN - 4)),
            Err(Error::CodeCorrupted(_))
        ));
        assert!(matches!(
            checksum_span(&raw_image(MIN_IMAGE_LEN + 2)),
            Err(Error::CodeCorrupted(_))
        ));
        assert_eq!(checksum_span(&raw_image(MIN_IMAGE_LEN)).unwrap(), 0x90);
    }

    #[test]
    fn test_stamp_and_verify() {
        let mut image = raw_image(256);
        assert!(matches!(verify_checksum(&image), Err(Error::CrcFailure)));

        stamp_checksum(&mut image).unwrap();
        verify_checksum(&image).unwrap();

        let (a, b) = fletcher32(&image[4..248]);
        assert_eq!(&image[248..252], &a.to_le_bytes());
        assert_eq!(&image[252..256], &b.to_le_bytes());

        image[100] ^= 1;
        assert!(matches!(verify_checksum(&image), Err(Error::CrcFailure)));
    }

    #[test]
    fn test_stamp_leaves_bytes_past_span() {
        let mut image = with_header(b"UBX8", 1024, 0x1000, 0x1100);
        let tail = image[0x108..].to_vec();
        stamp_checksum(&mut image).unwrap();
        assert_eq!(&image[0x108..], &tail[..]);
    }

    #[test]
    fn test_read_record_of_unmerged_image() {
        assert!(matches!(
            read_record(&raw_image(512)),
            Err(Error::CodeCorrupted(_))
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.bin");
        let image = FirmwareImage::from_bytes(raw_image(300));
        image.save(&path).unwrap();
        assert_eq!(FirmwareImage::load_file(&path).unwrap(), image);

        let err = FirmwareImage::load_file(&dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn test_validate_headered_image() {
        let image = valid_image();
        let validation = validate(&image).unwrap();
        assert_eq!(validation.generation, 80);
        assert_eq!(validation.version.as_deref(), Some("ROM 3.01"));
        assert_eq!(validation.footer, None);

        let mut bad = image.clone();
        bad[0x200] ^= 0x10;
        assert!(matches!(validate(&bad), Err(Error::CrcFailure)));
    }

    #[test]
    fn test_validate_rejects_pointers() {
        // start below base
        let mut image = valid_image();
        image[P_START..P_START + 4].copy_from_slice(&0x007F_FF00u32.to_le_bytes());
        assert!(matches!(validate(&image), Err(Error::CodeCorrupted(_))));

        // outside the flash window
        let mut image = with_header(b"UBX7", 1024, 0x0000_1000, 0x0000_1100);
        stamp_checksum(&mut image).unwrap();
        assert!(matches!(validate(&image), Err(Error::CodeCorrupted(ref m)) if m.contains("addresses")));
    }

    #[test]
    fn test_validate_footer_only_image() {
        let mut image = raw_image(510);
        let footer = ImageFooter {
            image_sizes: vec![510],
            config_size: 0,
            offset: 0,
        };
        image.extend(footer.to_bytes());
        image.extend([0xFF; 2]);

        let validation = validate(&image).unwrap();
        assert_eq!(validation.generation, FOOTER_GENERATION);
        assert_eq!(validation.footer.unwrap().image_sizes, vec![510]);

        let info = inspect(&image).unwrap();
        assert!(info.validation.is_ok());
    }

    #[test]
    fn test_validate_without_magic_or_footer() {
        assert!(matches!(
            validate(&raw_image(512)),
            Err(Error::CodeCorrupted(_))
        ));
        let info = inspect(&raw_image(512)).unwrap();
        assert!(info.validation.unwrap_err().contains("no image magic"));
    }

    #[test]
    fn test_version_string_bounds() {
        let image = valid_image();
        let mut header = ImageHeader::parse(&image).unwrap();
        header.version = 0x0080_1000;
        assert_eq!(header.version_string(&image), None);
        header.version = 0x0000_0300;
        assert_eq!(header.version_string(&image), None);
    }
}
