//! ubxflash-dummy - In-memory receiver emulator for testing
//!
//! [`DummyReceiver`] implements the core transport contract and answers
//! the flash update messages the way a receiver in update mode does. Its
//! flash starts erased and programs like NOR flash (bits only go 1 -> 0).
//! Faults can be injected to exercise the retry paths.

use std::collections::VecDeque;
use std::time::Instant;

use ubxflash_core::catalog::JedecId;
use ubxflash_core::checksum::fletcher32;
use ubxflash_core::protocol::{self, class, upd, Frame, FrameDecoder, Response};
use ubxflash_core::transport::{Transport, TransportError};

/// Configuration for the emulated receiver
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// JEDEC ID of the emulated flash
    pub jedec: JedecId,
    /// Erase sector size in bytes
    pub sector_size: usize,
    /// Number of sectors
    pub sector_count: usize,
    /// Address of flash offset 0
    pub flash_base: u32,
    /// Erase acknowledgments to swallow (the erase still happens)
    pub drop_erase_acks: usize,
    /// Write acknowledgments to swallow (the write still happens)
    pub drop_write_acks: usize,
    /// Writes to reject without programming
    pub nack_writes: usize,
    /// Flip a bit at this flash offset after programming it
    pub corrupt_offset: Option<usize>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            jedec: JedecId::from_u32(0xEF4015), // W25Q16
            sector_size: 4096,
            sector_count: 512,
            flash_base: 0x0080_0000,
            drop_erase_acks: 0,
            drop_write_acks: 0,
            nack_writes: 0,
            corrupt_offset: None,
        }
    }
}

/// Command counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// Sector erase commands
    pub erases: usize,
    /// Write commands
    pub writes: usize,
    /// Chip erase commands
    pub chip_erases: usize,
    /// Checksum polls
    pub crc_polls: usize,
    /// Reboot commands
    pub reboots: usize,
}

/// Emulated receiver
pub struct DummyReceiver {
    config: DummyConfig,
    flash: Vec<u8>,
    decoder: FrameDecoder,
    outbox: VecDeque<u8>,
    stats: DummyStats,
}

impl DummyReceiver {
    /// Create a receiver with erased flash
    pub fn new(config: DummyConfig) -> Self {
        let flash = vec![0xFF; config.sector_size * config.sector_count];
        Self {
            config,
            flash,
            decoder: FrameDecoder::new(),
            outbox: VecDeque::new(),
            stats: DummyStats::default(),
        }
    }

    /// Create a receiver with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a receiver with pre-filled flash
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut receiver = Self::new(config);
        let len = initial_data.len().min(receiver.flash.len());
        receiver.flash[..len].copy_from_slice(&initial_data[..len]);
        receiver
    }

    /// Flash contents
    pub fn data(&self) -> &[u8] {
        &self.flash
    }

    /// Configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Command counters
    pub fn stats(&self) -> DummyStats {
        self.stats
    }

    /// Flash offset of `address`, if `len` bytes from there fit
    fn offset(&self, address: u32, len: usize) -> Option<usize> {
        let offset = address.checked_sub(self.config.flash_base)? as usize;
        (offset.checked_add(len)? <= self.flash.len()).then_some(offset)
    }

    fn reply(&mut self, response: Response) {
        self.outbox.extend(response.to_frame().encode());
    }

    fn handle_erase(&mut self, payload: &[u8]) {
        let Some(address) = read_u32(payload, 0) else {
            return;
        };
        self.stats.erases += 1;

        let sector_size = self.config.sector_size;
        let success = match self.offset(address, sector_size) {
            Some(offset) if offset % sector_size == 0 => {
                self.flash[offset..offset + sector_size].fill(0xFF);
                true
            }
            _ => false,
        };
        log::debug!("dummy: erase 0x{:08X} -> {}", address, success);

        if self.config.drop_erase_acks > 0 {
            self.config.drop_erase_acks -= 1;
            log::debug!("dummy: dropping erase ack");
            return;
        }
        self.reply(Response::Erase { address, success });
    }

    fn handle_write(&mut self, payload: &[u8]) {
        let (Some(address), Some(size)) = (read_u32(payload, 0), read_u32(payload, 4)) else {
            return;
        };
        self.stats.writes += 1;
        let data = &payload[8..];

        if self.config.nack_writes > 0 {
            self.config.nack_writes -= 1;
            log::debug!("dummy: rejecting write at 0x{:08X}", address);
            self.reply(Response::Write {
                address,
                success: false,
            });
            return;
        }

        let success = match self.offset(address, data.len()) {
            Some(offset) if size as usize == data.len() => {
                let target = &mut self.flash[offset..offset + data.len()];
                // Flash programming: can only change 1 -> 0
                for (cell, &byte) in target.iter_mut().zip(data) {
                    *cell &= byte;
                }
                let programmed = target == data;
                if let Some(at) = self.config.corrupt_offset {
                    if (offset..offset + data.len()).contains(&at) {
                        self.flash[at] ^= 0x01;
                    }
                }
                programmed
            }
            _ => false,
        };
        log::trace!("dummy: write {} bytes at 0x{:08X} -> {}", size, address, success);

        if self.config.drop_write_acks > 0 {
            self.config.drop_write_acks -= 1;
            log::debug!("dummy: dropping write ack");
            return;
        }
        self.reply(Response::Write { address, success });
    }

    fn handle_chip_erase(&mut self) {
        self.stats.chip_erases += 1;
        self.flash.fill(0xFF);
        log::debug!("dummy: chip erase");
        self.reply(Response::ChipErase { success: true });
    }

    fn handle_crc(&mut self, payload: &[u8]) {
        // Extended form carries version and region first
        let (region, fields) = match payload.len() {
            16 => (protocol::REGION_FLASH, payload),
            18 => (payload[1], &payload[2..]),
            _ => return,
        };
        self.stats.crc_polls += 1;
        if region != protocol::REGION_FLASH {
            log::debug!("dummy: checksum poll for region {} has no backing memory", region);
            self.reply(Response::Crc { success: false });
            return;
        }

        let (Some(address), Some(size), Some(a), Some(b)) = (
            read_u32(fields, 0),
            read_u32(fields, 4),
            read_u32(fields, 8),
            read_u32(fields, 12),
        ) else {
            return;
        };
        let success = match self.offset(address, size as usize) {
            Some(offset) => fletcher32(&self.flash[offset..offset + size as usize]) == (a, b),
            None => false,
        };
        log::debug!("dummy: checksum poll over {} bytes -> {}", size, success);
        self.reply(Response::Crc { success });
    }

    fn handle(&mut self, frame: &Frame) {
        if frame.class != class::UPD {
            log::debug!("dummy: ignoring {:02X}-{:02X}", frame.class, frame.id);
            return;
        }
        match frame.id {
            upd::ERASE => self.handle_erase(&frame.payload),
            upd::FLWRI => self.handle_write(&frame.payload),
            upd::CERASE => self.handle_chip_erase(),
            upd::CRC => self.handle_crc(&frame.payload),
            upd::RBOOT => {
                self.stats.reboots += 1;
                log::info!("dummy: reboot");
            }
            other => log::debug!("dummy: unknown UPD message 0x{:02X}", other),
        }
    }
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl Transport for DummyReceiver {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.decoder.push(data);
        while let Some(frame) = self.decoder.next_frame() {
            self.handle(&frame);
        }
        Ok(())
    }

    fn receive(&mut self, _deadline: Instant) -> Result<Vec<u8>, TransportError> {
        if self.outbox.is_empty() {
            return Err(TransportError::Timeout);
        }
        Ok(self.outbox.drain(..).collect())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        self.outbox.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ubxflash_core::fis::{FisRecord, FisV3};
    use ubxflash_core::image::{merge_record, FirmwareImage};
    use ubxflash_core::update::{
        FailureReason, NoProgress, Outcome, Phase, UpdateConfig, UpdateSession,
    };

    fn fast_config() -> UpdateConfig {
        UpdateConfig {
            erase_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            chip_erase_timeout: Duration::ZERO,
            crc_timeout: Duration::ZERO,
            progress_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    /// A merged image of `len` bytes for a 4 KiB x 512 flash
    fn merged_image(len: usize) -> FirmwareImage {
        let raw: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        let record = FisRecord::V3(FisV3::new(JedecId::from_u32(0xEF4015), 512));
        FirmwareImage::from_bytes(merge_record(&raw, &record).unwrap())
    }

    fn flash(receiver: &mut DummyReceiver, image: &FirmwareImage, config: UpdateConfig) -> Outcome {
        UpdateSession::for_image(image, config)
            .unwrap()
            .run(receiver, &mut NoProgress)
    }

    #[test]
    fn test_write_and_read_back() {
        let image = merged_image(10_000);
        let mut receiver = DummyReceiver::new_default();
        let outcome = flash(&mut receiver, &image, fast_config());

        assert!(outcome.is_success(), "{:?}", outcome);
        assert_eq!(&receiver.data()[..image.len()], image.as_bytes());
        assert!(receiver.data()[image.len()..].iter().all(|&b| b == 0xFF));

        let stats = receiver.stats();
        assert_eq!(stats.erases, 3);
        assert_eq!(stats.writes, 20);
        assert_eq!(stats.crc_polls, 1);
    }

    #[test]
    fn test_overwrites_old_firmware() {
        let image = merged_image(8192);
        let mut receiver = DummyReceiver::with_data(DummyConfig::default(), &[0x00; 20_000]);
        assert!(flash(&mut receiver, &image, fast_config()).is_success());
        assert_eq!(&receiver.data()[..8192], image.as_bytes());
        // Sectors past the image are not touched
        assert!(receiver.data()[8192..20_000].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_lost_acks_are_recovered() {
        let image = merged_image(6000);
        let mut receiver = DummyReceiver::new(DummyConfig {
            drop_erase_acks: 2,
            drop_write_acks: 3,
            ..Default::default()
        });
        let outcome = flash(&mut receiver, &image, fast_config());

        assert!(outcome.is_success(), "{:?}", outcome);
        assert_eq!(&receiver.data()[..image.len()], image.as_bytes());
        assert_eq!(receiver.stats().erases, 2 + 2);
        assert_eq!(receiver.stats().writes, 12 + 3);
    }

    #[test]
    fn test_rejected_write_stops_update() {
        let image = merged_image(6000);
        let mut receiver = DummyReceiver::new(DummyConfig {
            nack_writes: 1,
            ..Default::default()
        });
        let Outcome::Failed(failure) = flash(&mut receiver, &image, fast_config()) else {
            panic!("expected failure");
        };

        assert_eq!(failure.reason, FailureReason::WriteRejected);
        assert_eq!(failure.snapshot.phase, Phase::Write);
        assert_eq!(failure.snapshot.address, 0x0080_0000);
        let stats = receiver.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.crc_polls, 0);
        // Nothing was programmed
        assert!(receiver.data()[..512].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_extended_checksum_poll_targets_flash() {
        let image = merged_image(4096);
        let mut receiver = DummyReceiver::new_default();
        let config = UpdateConfig {
            crc_message_version: 2,
            ..fast_config()
        };
        assert!(flash(&mut receiver, &image, config).is_success());
        assert_eq!(receiver.stats().crc_polls, 1);

        // A poll for the RAM region finds nothing to compare against
        let checksum = fletcher32(image.as_bytes());
        let poll = protocol::crc_v2(protocol::REGION_RAM, 0x0080_0000, 4096, checksum);
        receiver.send(&poll.encode()).unwrap();
        let bytes = receiver.receive(Instant::now()).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        assert_eq!(
            Response::parse(&decoder.next_frame().unwrap()),
            Some(Response::Crc { success: false })
        );
    }

    #[test]
    fn test_chip_erase_and_reboot() {
        let image = merged_image(4096);
        let mut receiver = DummyReceiver::with_data(DummyConfig::default(), &[0x55; 8192]);
        let config = UpdateConfig {
            chip_erase: true,
            reboot: true,
            ..fast_config()
        };
        assert!(flash(&mut receiver, &image, config).is_success());

        let stats = receiver.stats();
        assert_eq!(stats.chip_erases, 1);
        assert_eq!(stats.erases, 0);
        assert_eq!(stats.reboots, 1);
        assert!(receiver.data()[4096..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_corrupted_flash_fails_verification() {
        let image = merged_image(4096);
        let mut receiver = DummyReceiver::new(DummyConfig {
            corrupt_offset: Some(1000),
            ..Default::default()
        });
        let Outcome::Failed(failure) = flash(&mut receiver, &image, fast_config()) else {
            panic!("expected failure");
        };
        assert_eq!(failure.reason, FailureReason::CrcMismatch);
        assert_eq!(failure.snapshot.phase, Phase::Verify);
        assert_eq!(failure.snapshot.chunks_written, 8);
    }

    #[test]
    fn test_rejects_unaligned_erase() {
        let mut receiver = DummyReceiver::new_default();
        receiver
            .send(&protocol::erase(0x0080_0100).encode())
            .unwrap();
        receiver
            .send(&protocol::erase(0x0000_1000).encode())
            .unwrap();

        let bytes = receiver.receive(Instant::now()).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        for _ in 0..2 {
            let frame = decoder.next_frame().unwrap();
            assert!(matches!(
                Response::parse(&frame),
                Some(Response::Erase { success: false, .. })
            ));
        }
        assert!(matches!(
            receiver.receive(Instant::now()),
            Err(TransportError::Timeout)
        ));
    }

    #[test]
    fn test_write_without_erase_fails() {
        let mut receiver = DummyReceiver::with_data(DummyConfig::default(), &[0x00; 16]);
        receiver
            .send(&protocol::write(0x0080_0000, &[0xFF; 16]).encode())
            .unwrap();
        let bytes = receiver.receive(Instant::now()).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        assert_eq!(
            Response::parse(&decoder.next_frame().unwrap()),
            Some(Response::Write {
                address: 0x0080_0000,
                success: false
            })
        );
    }
}
