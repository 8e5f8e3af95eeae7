//! Update command and its progress display

use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use ubxflash_core::catalog::Catalog;
use ubxflash_core::fis::FisRecord;
use ubxflash_core::image::FirmwareImage;
use ubxflash_core::transport::Transport;
use ubxflash_core::update::{
    FlashGeometry, ProgressReport, UpdateConfig, UpdateProgress, UpdateSession,
};

use super::CommandResult;
use crate::cli::{LinkArgs, MergeArgs, SessionArgs};

/// Flash an image, merging a FIS record first when a catalog is given
pub fn run_update(
    input: &Path,
    link: &LinkArgs,
    merge: &MergeArgs,
    session: &SessionArgs,
) -> CommandResult {
    let config = build_config(session)?;

    let mut image = FirmwareImage::load_file(input)?;
    if let Err(e) = image.validate() {
        log::warn!("update: {} does not validate: {}", input.display(), e);
    }
    if let (Some(catalog), Some(jedec)) = (&merge.catalog, merge.jedec) {
        let catalog = Catalog::open(catalog)?;
        image = image.merge(jedec, &catalog)?;
        log::info!("update: merged FIS of {} into {}", jedec, input.display());
    }

    let fis = image.fis()?;
    let geometry = FlashGeometry::from_record(&fis);
    println!(
        "Flashing {} bytes to a {} ({} sectors x {} bytes) at 0x{:08X}",
        image.len(),
        fis.jedec(),
        geometry.sector_count,
        geometry.sector_size,
        config.flash_base
    );

    let mut transport = open_transport(link, &fis, &config)?;
    let update = UpdateSession::for_image(&image, config)?;
    let mut progress = IndicatifProgress::new();

    let report = update.run(transport.as_mut(), &mut progress).into_result()?;

    println!(
        "Update complete: {} bytes in {} chunks, {} sectors erased",
        report.bytes_written, report.chunks_written, report.sectors_erased
    );

    Ok(())
}

/// Defaults, then the config file, then command-line switches
fn build_config(args: &SessionArgs) -> Result<UpdateConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => UpdateConfig::load_file(path)?,
        None => UpdateConfig::default(),
    };

    if args.chip_erase {
        config.chip_erase = true;
    }
    if args.no_verify {
        config.verify = false;
    }
    if args.reboot {
        config.reboot = true;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(flash_base) = args.flash_base {
        config.flash_base = flash_base;
    }
    if let Some(max_pending) = args.max_pending {
        config.max_pending_erases = max_pending;
    }

    Ok(config)
}

fn open_transport(
    link: &LinkArgs,
    fis: &FisRecord,
    config: &UpdateConfig,
) -> Result<Box<dyn Transport + Send>, Box<dyn std::error::Error>> {
    if let Some(port) = &link.port {
        return open_serial(port);
    }
    if let Some(tcp) = &link.tcp {
        return open_tcp(tcp);
    }
    open_dummy(fis, config)
}

#[cfg(feature = "serial")]
fn open_serial(port: &str) -> Result<Box<dyn Transport + Send>, Box<dyn std::error::Error>> {
    Ok(ubxflash_serial::Connection::serial(port)?.open()?)
}

#[cfg(not(feature = "serial"))]
fn open_serial(_port: &str) -> Result<Box<dyn Transport + Send>, Box<dyn std::error::Error>> {
    Err("serial support not compiled in (enable the 'serial' feature)".into())
}

#[cfg(feature = "serial")]
fn open_tcp(addr: &str) -> Result<Box<dyn Transport + Send>, Box<dyn std::error::Error>> {
    Ok(ubxflash_serial::Connection::tcp(addr)?.open()?)
}

#[cfg(not(feature = "serial"))]
fn open_tcp(_addr: &str) -> Result<Box<dyn Transport + Send>, Box<dyn std::error::Error>> {
    Err("TCP support not compiled in (enable the 'serial' feature)".into())
}

/// Emulated receiver sized after the image's FIS record
#[cfg(feature = "dummy")]
fn open_dummy(
    fis: &FisRecord,
    config: &UpdateConfig,
) -> Result<Box<dyn Transport + Send>, Box<dyn std::error::Error>> {
    use ubxflash_dummy::{DummyConfig, DummyReceiver};

    let dummy = DummyConfig {
        jedec: fis.jedec(),
        sector_size: fis.sector_size() as usize,
        sector_count: fis.sector_count() as usize,
        flash_base: config.flash_base,
        ..DummyConfig::default()
    };
    log::info!(
        "update: emulated receiver with {} x {} byte sectors",
        dummy.sector_count,
        dummy.sector_size
    );
    Ok(Box::new(DummyReceiver::new(dummy)))
}

#[cfg(not(feature = "dummy"))]
fn open_dummy(
    _fis: &FisRecord,
    _config: &UpdateConfig,
) -> Result<Box<dyn Transport + Send>, Box<dyn std::error::Error>> {
    Err("dummy receiver not compiled in (enable the 'dummy' feature)".into())
}

/// Create a progress bar over the image bytes
fn create_progress_bar(total: u64) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Create a standard spinner style
fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?)
}

fn sectors_message(report: &ProgressReport) -> String {
    format!(
        "{} {}/{} sectors",
        report.phase, report.sectors_erased, report.total_sectors
    )
}

/// Progress reporter using indicatif progress bars
pub struct IndicatifProgress {
    current_bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self { current_bar: None }
    }

    fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateProgress for IndicatifProgress {
    fn starting(&mut self, report: &ProgressReport) {
        let total = report.total_bytes as u64;
        let pb = create_progress_bar(total).unwrap_or_else(|_| ProgressBar::new(total));
        pb.set_message(sectors_message(report));
        self.current_bar = Some(pb);
    }

    fn progress(&mut self, report: &ProgressReport) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(report.bytes_written as u64);
            pb.set_message(sectors_message(report));
        }
    }

    fn verifying(&mut self, report: &ProgressReport) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(report.bytes_written as u64);
        }
        self.finish("Write complete");

        let pb = ProgressBar::new_spinner();
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        pb.set_message("Verifying device checksum...");
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn complete(&mut self, _report: &ProgressReport) {
        self.finish("Done");
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon();
        }
    }
}
