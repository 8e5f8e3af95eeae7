//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ubxflash_core::catalog::JedecId;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a JEDEC ID such as `EF4015` or `0xEF4015`
fn parse_jedec(s: &str) -> Result<JedecId, String> {
    s.parse::<JedecId>().map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "ubxflash")]
#[command(
    author,
    version,
    about = "Merge flash information into u-blox GNSS firmware and flash receivers",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Receiver link, exactly one required
#[derive(clap::Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct LinkArgs {
    /// Serial port, optionally with baud rate (e.g. /dev/ttyACM0:921600)
    #[arg(long)]
    pub port: Option<String>,

    /// TCP bridge (host:port)
    #[arg(long)]
    pub tcp: Option<String>,

    /// Emulated receiver (dry run)
    #[arg(long)]
    pub dummy: bool,
}

/// Flash selection for merging before an update
#[derive(clap::Args, Debug, Clone, Default)]
pub struct MergeArgs {
    /// Flash catalog (XML)
    #[arg(short, long, requires = "jedec")]
    pub catalog: Option<PathBuf>,

    /// JEDEC ID of the target flash (e.g. EF4015)
    #[arg(short, long, value_parser = parse_jedec, requires = "catalog")]
    pub jedec: Option<JedecId>,
}

/// Update session overrides applied on top of the config file
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Update settings (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Erase the whole chip instead of sector by sector
    #[arg(long)]
    pub chip_erase: bool,

    /// Skip the checksum poll after writing
    #[arg(long)]
    pub no_verify: bool,

    /// Reboot the receiver after a successful update
    #[arg(long)]
    pub reboot: bool,

    /// Bytes per write command
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Flash address of image offset 0 (hex or decimal)
    #[arg(long, value_parser = parse_hex_u32)]
    pub flash_base: Option<u32>,

    /// Sectors erased ahead of the writes
    #[arg(long)]
    pub max_pending: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge the flash information structure of a chip into an image
    Merge {
        /// Flash catalog (XML)
        #[arg(short, long)]
        catalog: PathBuf,

        /// JEDEC ID of the target flash (e.g. EF4015)
        #[arg(short, long, value_parser = parse_jedec)]
        jedec: JedecId,

        /// Input firmware image
        #[arg(short, long)]
        input: PathBuf,

        /// Output firmware image
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a firmware image to a receiver
    Update {
        /// Firmware image
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        link: LinkArgs,

        #[command(flatten)]
        merge: MergeArgs,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Show header, checksum and flash information of an image
    Info {
        /// Firmware image
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List the flash chips of a catalog
    Devices {
        /// Flash catalog (XML)
        #[arg(short, long)]
        catalog: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x800000"), Ok(0x80_0000));
        assert_eq!(parse_hex_u32("4096"), Ok(4096));
        assert!(parse_hex_u32("0xZZ").is_err());
    }

    #[test]
    fn test_update_requires_one_link() {
        assert!(Cli::try_parse_from(["ubxflash", "update", "-i", "fw.bin"]).is_err());
        assert!(Cli::try_parse_from([
            "ubxflash", "update", "-i", "fw.bin", "--dummy", "--tcp", "h:1"
        ])
        .is_err());

        let cli = Cli::try_parse_from([
            "ubxflash",
            "update",
            "-i",
            "fw.bin",
            "--port",
            "/dev/ttyACM0:921600",
            "--flash-base",
            "0x800000",
            "--no-verify",
        ])
        .unwrap();
        match cli.command {
            Commands::Update { link, session, .. } => {
                assert_eq!(link.port.as_deref(), Some("/dev/ttyACM0:921600"));
                assert_eq!(session.flash_base, Some(0x80_0000));
                assert!(session.no_verify);
                assert!(!session.chip_erase);
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_merge_args_pair() {
        assert!(Cli::try_parse_from([
            "ubxflash", "update", "-i", "fw.bin", "--dummy", "--jedec", "EF4015"
        ])
        .is_err());

        let cli = Cli::try_parse_from([
            "ubxflash", "-v", "merge", "-c", "flash.xml", "-j", "0xEF4015", "-i", "a", "-o", "b",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Merge { jedec, .. } => assert_eq!(jedec, JedecId::from_u32(0xEF4015)),
            _ => panic!("expected merge"),
        }
    }
}
