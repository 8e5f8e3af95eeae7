//! Image footer of headerless (u-blox 9) firmware
//!
//! Layout, ending at the `UBFL` magic (the file may carry up to three 0xFF
//! padding bytes after it), all words little-endian:
//!
//! ```text
//! crc | size[0] .. size[n-1] | n | config size | version (0) | "UBFL"
//! ```
//!
//! The CRC covers everything after itself, magic included.

use crate::checksum::{fis_crc32, FOOTER_CHECKSUM_SEED};
use crate::error::{Error, Result};

/// Footer magic
pub const FOOTER_MAGIC: &[u8; 4] = b"UBFL";

/// Most images a footer can describe
pub const MAX_FOOTER_IMAGES: usize = 2;

/// Fixed words: crc, count, config size, version, magic
const FIXED_LEN: usize = 5 * 4;

/// Parsed image footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFooter {
    /// Size of each image in the file
    pub image_sizes: Vec<u32>,
    /// Size of the configuration attached to the image
    pub config_size: u32,
    /// Offset of the footer (its CRC word) in the file
    pub offset: usize,
}

impl ImageFooter {
    /// Look for a footer at the end of `image`
    ///
    /// `Ok(None)` when there is no magic. A magic followed by inconsistent
    /// fields or a failing CRC is `CodeCorrupted`.
    pub fn find(image: &[u8]) -> Result<Option<Self>> {
        let Some(magic_at) = (0..4)
            .filter_map(|pad| image.len().checked_sub(4 + pad))
            .find(|&at| &image[at..at + 4] == FOOTER_MAGIC)
        else {
            return Ok(None);
        };

        let word = |back: usize| magic_at.checked_sub(back).map(|at| read_u32(image, at));
        let (Some(version), Some(count)) = (word(4), word(12)) else {
            return Err(invalid("truncated"));
        };
        if version != 0 {
            return Err(invalid(&format!("version {}", version)));
        }
        let count = count as usize;
        if count > MAX_FOOTER_IMAGES {
            return Err(invalid(&format!("{} images", count)));
        }

        let offset = magic_at
            .checked_sub(FIXED_LEN - 4 + 4 * count)
            .ok_or_else(|| invalid("truncated"))?;
        let stored = read_u32(image, offset);
        let computed = fis_crc32(FOOTER_CHECKSUM_SEED, &image[offset + 4..magic_at + 4]);
        if stored != computed {
            return Err(invalid(&format!(
                "CRC 0x{:08X}, computed 0x{:08X}",
                stored, computed
            )));
        }

        let image_sizes: Vec<u32> = (0..count)
            .map(|i| read_u32(image, offset + 4 + 4 * i))
            .collect();
        let config_size = read_u32(image, magic_at - 8);
        for (i, size) in image_sizes.iter().enumerate() {
            log::debug!("image: footer image {} size {}", i, size);
        }
        log::debug!("image: footer config size {}", config_size);

        Ok(Some(Self {
            image_sizes,
            config_size,
            offset,
        }))
    }

    /// Serialize with a fresh CRC
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0; 4];
        for size in &self.image_sizes {
            out.extend_from_slice(&size.to_le_bytes());
        }
        out.extend_from_slice(&(self.image_sizes.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.config_size.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(FOOTER_MAGIC);
        let crc = fis_crc32(FOOTER_CHECKSUM_SEED, &out[4..]);
        out[..4].copy_from_slice(&crc.to_le_bytes());
        out
    }
}

fn invalid(what: &str) -> Error {
    Error::corrupted(format!("invalid image footer: {}", what))
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::raw_image;

    fn footer() -> ImageFooter {
        ImageFooter {
            image_sizes: vec![0x1_0000, 0x2000],
            config_size: 0x400,
            offset: 0,
        }
    }

    fn image_with_footer(padding: usize) -> Vec<u8> {
        let mut image = raw_image(256);
        image.extend(footer().to_bytes());
        image.extend(std::iter::repeat(0xFF).take(padding));
        image
    }

    #[test]
    fn test_find_footer() {
        for padding in 0..4 {
            let found = ImageFooter::find(&image_with_footer(padding))
                .unwrap()
                .unwrap();
            assert_eq!(found.image_sizes, vec![0x1_0000, 0x2000]);
            assert_eq!(found.config_size, 0x400);
            assert_eq!(found.offset, 256);
        }
    }

    #[test]
    fn test_layout() {
        let bytes = footer().to_bytes();
        assert_eq!(bytes.len(), 28);
        assert_eq!(&bytes[4..8], &0x1_0000u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &2u32.to_le_bytes());
        assert_eq!(&bytes[24..], b"UBFL");
    }

    #[test]
    fn test_no_footer() {
        assert_eq!(ImageFooter::find(&raw_image(256)).unwrap(), None);
        assert_eq!(ImageFooter::find(&[]).unwrap(), None);
        // Magic beyond the padding allowance
        assert_eq!(ImageFooter::find(&image_with_footer(4)).unwrap(), None);
    }

    #[test]
    fn test_corrupted_footer() {
        let mut image = image_with_footer(0);
        image[256 + 6] ^= 0x01;
        assert!(matches!(
            ImageFooter::find(&image),
            Err(Error::CodeCorrupted(ref m)) if m.contains("CRC")
        ));
    }

    #[test]
    fn test_footer_field_checks() {
        let mut image = image_with_footer(0);
        let version_at = image.len() - 8;
        image[version_at] = 1;
        assert!(matches!(
            ImageFooter::find(&image),
            Err(Error::CodeCorrupted(ref m)) if m.contains("version")
        ));

        let mut image = image_with_footer(0);
        let count_at = image.len() - 16;
        image[count_at] = 3;
        assert!(matches!(
            ImageFooter::find(&image),
            Err(Error::CodeCorrupted(ref m)) if m.contains("3 images")
        ));

        assert!(ImageFooter::find(b"xxUBFL").is_err());
    }
}
