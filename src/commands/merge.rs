//! Merge command

use std::path::Path;

use ubxflash_core::catalog::{Catalog, JedecId};
use ubxflash_core::image::FirmwareImage;

use super::CommandResult;

/// Merge the FIS of `jedec` into `input` and write the result to `output`
pub fn run_merge(catalog: &Path, jedec: JedecId, input: &Path, output: &Path) -> CommandResult {
    let catalog = Catalog::open(catalog)?;
    let image = FirmwareImage::load_file(input)?;

    let merged = image.merge(jedec, &catalog)?;
    merged.save(output)?;

    let fis = merged.fis()?;
    println!(
        "Merged {} ({} x {} bytes, {} FIS) into {}",
        jedec,
        fis.sector_count(),
        fis.sector_size(),
        fis.format(),
        output.display()
    );

    Ok(())
}
