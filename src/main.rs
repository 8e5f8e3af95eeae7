//! ubxflash - firmware tool for u-blox GNSS receivers
//!
//! Merges the flash information structure (FIS) of a flash chip, looked up
//! in an XML catalog by JEDEC ID, into a firmware image, and writes images
//! to a receiver through the flash update protocol.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

/// Level forced by `-v` flags, `None` leaves `RUST_LOG` (or info) in charge
fn verbosity_filter(verbose: u8) -> Option<log::LevelFilter> {
    match verbose {
        0 => None,
        1 => Some(log::LevelFilter::Debug),
        _ => Some(log::LevelFilter::Trace),
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logger
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = verbosity_filter(cli.verbose) {
        logger.filter_level(level);
    }
    logger.init();

    let result = match cli.command {
        Commands::Merge {
            catalog,
            jedec,
            input,
            output,
        } => commands::merge::run_merge(&catalog, jedec, &input, &output),
        Commands::Update {
            input,
            link,
            merge,
            session,
        } => commands::update::run_update(&input, &link, &merge, &session),
        Commands::Info { input } => commands::info::run_info(&input),
        Commands::Devices { catalog } => commands::devices::run_devices(&catalog),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
