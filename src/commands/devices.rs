//! Devices command implementation

use std::path::Path;

use ubxflash_core::catalog::{Catalog, FlashDescriptor};

use super::CommandResult;

/// List the flash chips of a catalog
pub fn run_devices(catalog: &Path) -> CommandResult {
    let catalog = Catalog::open(catalog)?;

    let revision = catalog
        .revision()
        .map_or_else(|| "none".to_string(), |r| r.to_string());
    println!(
        "Flash catalog: fisVersion {}, revision {}",
        catalog.fis_version(),
        revision
    );
    println!();
    println!(
        "{:<10} {:>10} {:>8} {:>10} {:<10} Capabilities",
        "JEDEC ID", "Sector", "Count", "Size", "Cmdset"
    );
    println!("{}", "-".repeat(72));

    for device in catalog.iter() {
        println!("{}", format_device(device));
    }

    println!();
    println!("{} devices", catalog.len());

    Ok(())
}

fn format_device(device: &FlashDescriptor) -> String {
    format!(
        "{:<10} {:>10} {:>8} {:>10} {:<10} {}",
        device.jedec.to_string(),
        format_size(device.sector_size as u64),
        device.sector_count,
        format_size(device.capacity()),
        device.command_set,
        device.capabilities.describe()
    )
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ubxflash_core::catalog::{Capabilities, DeviceSettings, FisRevision, JedecId};

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(4096), "4 KiB");
        assert_eq!(format_size(16 * 1024 * 1024), "16 MiB");
    }

    #[test]
    fn test_format_device() {
        let device = FlashDescriptor {
            jedec: JedecId::from_u32(0xEF4015),
            sector_size: 4096,
            sector_count: 512,
            capabilities: Capabilities::WRITE_SUSPEND,
            revision: FisRevision { major: 2, minor: 0 },
            command_set: "winbond".into(),
            settings: DeviceSettings::default(),
        };
        let line = format_device(&device);
        assert!(line.starts_with("0xEF4015"));
        assert!(line.contains("4 KiB"));
        assert!(line.contains("2 MiB"));
        assert!(line.contains("winbond"));
        assert!(line.contains("write-suspend"));
    }
}
