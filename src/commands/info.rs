//! Image info command

use std::path::Path;

use ubxflash_core::fis::FisRecord;
use ubxflash_core::image::{FirmwareImage, ImageInfo, Validation};

use super::CommandResult;

/// Print header, checksum and FIS fields of an image
pub fn run_info(input: &Path) -> CommandResult {
    let image = FirmwareImage::load_file(input)?;
    let info = image.inspect()?;

    print!("{}", format_info(&info));

    Ok(())
}

fn format_info(info: &ImageInfo) -> String {
    let mut out = String::new();

    out.push_str(&format!("Image size:      {} bytes\n", info.len));
    match &info.header {
        Some(header) => {
            out.push_str(&format!(
                "Header:          {} (generation {})\n",
                header.magic_str(),
                header.generation
            ));
            out.push_str(&format!("Base:            0x{:08X}\n", header.base));
            out.push_str(&format!("Start:           0x{:08X}\n", header.start));
            out.push_str(&format!("End:             0x{:08X}\n", header.end));
            out.push_str(&format!("Version ptr:     0x{:08X}\n", header.version));
        }
        None => out.push_str("Header:          not recognized\n"),
    }

    out.push_str(&format!("Checksummed:     {} bytes\n", info.span));
    out.push_str(&format!(
        "Checksum:        0x{:08X} 0x{:08X} ({})\n",
        info.checksum.0,
        info.checksum.1,
        if info.checksum_valid { "valid" } else { "INVALID" }
    ));

    match &info.validation {
        Ok(validation) => out.push_str(&format_validation(validation)),
        Err(e) => out.push_str(&format!("Validation:      rejected ({})\n", e)),
    }

    match &info.fis {
        Ok(fis) => out.push_str(&format_fis(fis)),
        Err(e) => out.push_str(&format!("FIS:             {}\n", e)),
    }

    out
}

fn format_validation(validation: &Validation) -> String {
    let mut out = format!(
        "Validation:      accepted for u-blox {}\n",
        validation.generation / 10
    );
    if let Some(version) = &validation.version {
        out.push_str(&format!("Version:         {}\n", version));
    }
    if let Some(footer) = &validation.footer {
        let sizes: Vec<String> = footer.image_sizes.iter().map(|s| s.to_string()).collect();
        out.push_str(&format!(
            "Footer:          images [{}], config {} bytes\n",
            sizes.join(", "),
            footer.config_size
        ));
    }
    out
}

fn format_fis(fis: &FisRecord) -> String {
    let mut out = String::new();

    out.push_str(&format!("FIS format:      {}\n", fis.format()));
    out.push_str(&format!("JEDEC ID:        {}\n", fis.jedec()));
    out.push_str(&format!(
        "Flash:           {} sectors x {} bytes ({} KiB)\n",
        fis.sector_count(),
        fis.sector_size(),
        fis.sector_count() as u64 * fis.sector_size() as u64 / 1024
    ));
    out.push_str(&format!("Capabilities:    {}\n", fis.capabilities().describe()));
    out.push_str(&format!("Revision:        {}\n", fis.revision()));

    if let FisRecord::V1(v1) = fis {
        out.push_str(&format!("Supply:          {}\n", v1.supply));
        out.push_str(&format!("Bytes per write: {}\n", v1.num_bytes_write));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ubxflash_core::catalog::JedecId;
    use ubxflash_core::fis::FisV3;
    use ubxflash_core::image::ImageFooter;

    #[test]
    fn test_format_without_header() {
        let info = ImageInfo {
            len: 256,
            header: None,
            span: 256,
            checksum: (0x1234, 0x5678),
            checksum_valid: false,
            fis: Err("Code corrupted: bad FIS checksum".into()),
            validation: Err("Code corrupted: no image magic and no footer".into()),
        };
        let text = format_info(&info);
        assert!(text.contains("not recognized"));
        assert!(text.contains("INVALID"));
        assert!(text.contains("bad FIS checksum"));
        assert!(text.contains("rejected (Code corrupted: no image magic"));
    }

    #[test]
    fn test_format_validation() {
        let text = format_validation(&Validation {
            generation: 91,
            footer: Some(ImageFooter {
                image_sizes: vec![4096, 512],
                config_size: 64,
                offset: 0,
            }),
            version: None,
        });
        assert!(text.contains("accepted for u-blox 9"));
        assert!(text.contains("images [4096, 512], config 64 bytes"));
        assert!(!text.contains("Version:"));

        let text = format_validation(&Validation {
            generation: 80,
            footer: None,
            version: Some("ROM CORE 3.01".into()),
        });
        assert!(text.contains("u-blox 8"));
        assert!(text.contains("Version:         ROM CORE 3.01"));
    }

    #[test]
    fn test_format_fis_v3() {
        let fis = FisRecord::V3(FisV3::new(JedecId::from_u32(0xC22817), 256));
        let text = format_fis(&fis);
        assert!(text.contains("0xC22817"));
        assert!(text.contains("256 sectors x 4096 bytes (1024 KiB)"));
        assert!(!text.contains("Supply"));
    }
}
