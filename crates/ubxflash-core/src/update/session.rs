//! Update session state machine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::geometry::ChunkMap;
use super::{
    AckState, Failure, FailureReason, FlashGeometry, Outcome, Phase, ProgressReport,
    ProgressThrottle, Snapshot, UpdateConfig, UpdateProgress,
};
use crate::checksum::fletcher32;
use crate::error::{Error, Result};
use crate::image::FirmwareImage;
use crate::protocol::{self, FrameDecoder, Response};
use crate::transport::{Transport, TransportError};

/// Handle to abort a running session between commands
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the session to stop before its next command
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum Stop {
    Cancelled,
    Failed(FailureReason),
}

type Step<T = ()> = core::result::Result<T, Stop>;

enum Action {
    Erase(usize),
    Write(usize),
    Done,
}

/// One flashing run against one device
///
/// Created per update and consumed by [`run`](Self::run).
pub struct UpdateSession<'a> {
    image: &'a [u8],
    geometry: FlashGeometry,
    config: UpdateConfig,
    map: ChunkMap,
    cancel: CancelToken,
    decoder: FrameDecoder,
    throttle: ProgressThrottle,

    chunk_states: Vec<AckState>,
    state: AckState,
    phase: Phase,
    address: u32,
    chunk: Option<usize>,
    sector: Option<usize>,

    next_chunk: usize,
    next_sector: usize,
    pending_erases: usize,
    chunks_written: usize,
    sectors_erased: usize,
    bytes_written: usize,
    max_erase_retries: u32,
    max_write_retries: u32,
}

impl<'a> UpdateSession<'a> {
    /// Prepare a session for `image` on a flash of the given geometry
    ///
    /// Fails before any I/O if the configuration is invalid or the image
    /// does not fit.
    pub fn new(image: &'a [u8], geometry: FlashGeometry, config: UpdateConfig) -> Result<Self> {
        config.validate(geometry.sector_size)?;
        if image.is_empty() {
            return Err(Error::corrupted("empty image"));
        }
        if image.len() as u64 > geometry.capacity() {
            return Err(Error::corrupted(format!(
                "image of {} bytes exceeds the {} byte flash",
                image.len(),
                geometry.capacity()
            )));
        }
        if config.flash_base as u64 + image.len() as u64 > 1 << 32 {
            return Err(Error::InvalidConfig(format!(
                "image does not fit above flash base 0x{:08X}",
                config.flash_base
            )));
        }

        let map = ChunkMap::new(image.len(), config.chunk_size, geometry.sector_size as usize);
        let throttle = ProgressThrottle::new(config.progress_interval);
        let first_phase = if config.chip_erase {
            Phase::ChipErase
        } else {
            Phase::Erase
        };

        Ok(Self {
            image,
            geometry,
            address: config.flash_base,
            config,
            map,
            cancel: CancelToken::new(),
            decoder: FrameDecoder::new(),
            throttle,
            chunk_states: vec![AckState::Init; map.chunks()],
            state: AckState::Init,
            phase: first_phase,
            chunk: None,
            sector: None,
            next_chunk: 0,
            next_sector: 0,
            pending_erases: 0,
            chunks_written: 0,
            sectors_erased: 0,
            bytes_written: 0,
            max_erase_retries: 0,
            max_write_retries: 0,
        })
    }

    /// Prepare a session using the geometry of the image's FIS record
    pub fn for_image(image: &'a FirmwareImage, config: UpdateConfig) -> Result<Self> {
        let fis = image.fis()?;
        Self::new(image.as_bytes(), FlashGeometry::from_record(&fis), config)
    }

    /// Use `token` for cancellation
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token cancelling this session
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Flash geometry in use
    pub fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    /// Number of write commands the image needs
    pub fn total_chunks(&self) -> usize {
        self.map.chunks()
    }

    /// Number of sectors the image touches
    pub fn total_sectors(&self) -> usize {
        self.map.sectors()
    }

    /// Flash the image
    pub fn run<T, P>(mut self, transport: &mut T, progress: &mut P) -> Outcome
    where
        T: Transport + ?Sized,
        P: UpdateProgress + ?Sized,
    {
        log::info!(
            "update: {} bytes at 0x{:08X}, {} chunks of {} bytes, {} of {} sectors of {} bytes",
            self.image.len(),
            self.config.flash_base,
            self.map.chunks(),
            self.config.chunk_size,
            self.map.sectors(),
            self.geometry.sector_count,
            self.geometry.sector_size
        );
        if let Err(e) = transport.clear() {
            log::warn!("update: cannot discard stale input: {}", e);
        }

        progress.starting(&self.report());
        self.throttle.allow(Instant::now(), true);

        let result = self.drive(transport, progress);
        match result {
            Ok(()) => {
                let report = self.report();
                progress.complete(&report);
                log::info!(
                    "update: done, {} bytes in {} chunks (max retries: erase {}, write {})",
                    self.bytes_written,
                    self.chunks_written,
                    self.max_erase_retries,
                    self.max_write_retries
                );
                Outcome::Success(report)
            }
            Err(Stop::Cancelled) => {
                progress.progress(&self.report());
                let snapshot = self.snapshot();
                log::warn!("update: cancelled after {}", snapshot);
                Outcome::Cancelled(snapshot)
            }
            Err(Stop::Failed(reason)) => {
                let snapshot = self.snapshot();
                if let Some(k) = self.chunk {
                    self.chunk_states[k] = AckState::Failed;
                }
                self.trace_state();
                log::error!("update: {}; {}", reason, snapshot);
                Outcome::Failed(Failure { reason, snapshot })
            }
        }
    }

    fn drive<T, P>(&mut self, t: &mut T, progress: &mut P) -> Step
    where
        T: Transport + ?Sized,
        P: UpdateProgress + ?Sized,
    {
        if self.config.chip_erase {
            self.check_cancel()?;
            self.chip_erase(t)?;
            self.report_progress(progress, false);
        }

        loop {
            match self.next_action() {
                Action::Done => break,
                Action::Erase(sector) => {
                    self.check_cancel()?;
                    self.erase_sector(t, sector)?;
                }
                Action::Write(chunk) => {
                    self.check_cancel()?;
                    self.write_chunk(t, chunk)?;
                }
            }
            self.report_progress(progress, false);
            self.trace_state();
        }
        self.report_progress(progress, true);

        if self.config.verify {
            self.check_cancel()?;
            progress.verifying(&self.report());
            self.verify(t)?;
        }
        if self.config.reboot {
            self.reboot(t)?;
        }
        Ok(())
    }

    /// Erase ahead while under the pending bound, else write
    fn next_action(&self) -> Action {
        if self.next_chunk >= self.map.chunks() {
            return Action::Done;
        }
        let sector_due = self.map.sector_of(self.next_chunk) >= self.next_sector;
        if self.next_sector < self.map.sectors()
            && (sector_due || self.pending_erases < self.config.max_pending_erases)
        {
            Action::Erase(self.next_sector)
        } else {
            Action::Write(self.next_chunk)
        }
    }

    fn check_cancel(&self) -> Step {
        if self.cancel.is_cancelled() {
            Err(Stop::Cancelled)
        } else {
            Ok(())
        }
    }

    fn flash_address(&self, offset: usize) -> u32 {
        self.config.flash_base.wrapping_add(offset as u32)
    }

    fn begin(
        &mut self,
        phase: Phase,
        address: u32,
        chunk: Option<usize>,
        sector: Option<usize>,
        state: AckState,
    ) {
        self.phase = phase;
        self.address = address;
        self.chunk = chunk;
        self.sector = sector;
        self.state = state;
    }

    fn chip_erase<T: Transport + ?Sized>(&mut self, t: &mut T) -> Step {
        self.begin(
            Phase::ChipErase,
            self.config.flash_base,
            None,
            None,
            AckState::EraseSent,
        );
        self.chunk_states.fill(AckState::EraseSent);
        log::info!("update: chip erase");

        let frame = protocol::chip_erase().encode();
        let used = self.exchange(
            t,
            &frame,
            self.config.chip_erase_timeout,
            self.config.erase_retries,
            |r| match *r {
                Response::ChipErase { success } => Some(success),
                _ => None,
            },
        )?;
        self.max_erase_retries = self.max_erase_retries.max(used);

        self.chunk_states.fill(AckState::EraseAcked);
        self.state = AckState::EraseAcked;
        self.sectors_erased = self.map.sectors();
        self.next_sector = self.map.sectors();
        Ok(())
    }

    fn erase_sector<T: Transport + ?Sized>(&mut self, t: &mut T, sector: usize) -> Step {
        let address = self.flash_address(self.map.sector_offset(sector));
        let chunks = self.map.chunks_of(sector);
        self.begin(
            Phase::Erase,
            address,
            Some(chunks.start),
            Some(sector),
            AckState::EraseSent,
        );
        self.chunk_states[chunks.clone()].fill(AckState::EraseSent);
        log::debug!("update: erase sector {} at 0x{:08X}", sector, address);

        let frame = protocol::erase(address).encode();
        let used = self.exchange(
            t,
            &frame,
            self.config.erase_timeout,
            self.config.erase_retries,
            |r| match *r {
                Response::Erase { address: a, success } if a == address => Some(success),
                _ => None,
            },
        )?;
        self.max_erase_retries = self.max_erase_retries.max(used);

        self.chunk_states[chunks].fill(AckState::EraseAcked);
        self.state = AckState::EraseAcked;
        self.pending_erases += 1;
        self.sectors_erased += 1;
        self.next_sector = sector + 1;
        debug_assert!(self.pending_erases <= self.config.max_pending_erases);
        Ok(())
    }

    fn write_chunk<T: Transport + ?Sized>(&mut self, t: &mut T, chunk: usize) -> Step {
        let range = self.map.chunk_range(chunk);
        let len = range.len();
        let address = self.flash_address(range.start);
        let sector = self.map.sector_of(chunk);
        debug_assert_eq!(self.chunk_states[chunk], AckState::EraseAcked);

        self.begin(
            Phase::Write,
            address,
            Some(chunk),
            Some(sector),
            AckState::WriteSent,
        );
        self.chunk_states[chunk] = AckState::WriteSent;
        log::debug!("update: write chunk {} ({} bytes) at 0x{:08X}", chunk, len, address);

        let frame = protocol::write(address, &self.image[range]).encode();
        let used = self.exchange(
            t,
            &frame,
            self.config.write_timeout,
            self.config.write_retries,
            |r| match *r {
                Response::Write { address: a, success } if a == address => Some(success),
                _ => None,
            },
        )?;
        self.max_write_retries = self.max_write_retries.max(used);

        self.chunk_states[chunk] = AckState::WriteAcked;
        self.state = AckState::WriteAcked;
        self.chunks_written += 1;
        self.bytes_written += len;
        self.next_chunk = chunk + 1;
        if !self.config.chip_erase && self.map.is_last_in_sector(chunk) {
            self.pending_erases = self.pending_erases.saturating_sub(1);
        }
        Ok(())
    }

    fn verify<T: Transport + ?Sized>(&mut self, t: &mut T) -> Step {
        let checksum = fletcher32(self.image);
        let base = self.config.flash_base;
        let size = self.image.len() as u32;
        let frame = match self.config.crc_message_version {
            2 => protocol::crc_v2(protocol::REGION_FLASH, base, size, checksum),
            _ => protocol::crc_v1(base, size, checksum),
        };
        let state = self.state;
        self.begin(Phase::Verify, base, None, None, state);
        log::debug!(
            "update: checksum poll a=0x{:08X} b=0x{:08X}",
            checksum.0,
            checksum.1
        );

        self.send(t, &frame.encode())?;
        let deadline = Instant::now() + self.config.crc_timeout;
        match self.await_response(t, deadline, |r| match *r {
            Response::Crc { success } => Some(success),
            _ => None,
        })? {
            Some(true) => {
                log::info!("update: device checksum verified");
                Ok(())
            }
            Some(false) => Err(Stop::Failed(FailureReason::CrcMismatch)),
            None => Err(Stop::Failed(FailureReason::RetryExhausted(Phase::Verify))),
        }
    }

    fn reboot<T: Transport + ?Sized>(&mut self, t: &mut T) -> Step {
        log::info!("update: rebooting receiver");
        self.send(t, &protocol::reboot().encode())
    }

    /// Send `frame` until a matching positive answer arrives
    ///
    /// Timeouts are re-sent within `retries`, as are negative erase
    /// answers. A negative write answer ends the session at once.
    /// Returns the number of re-sends that were needed.
    fn exchange<T, F>(
        &mut self,
        t: &mut T,
        frame: &[u8],
        timeout: Duration,
        retries: u32,
        matches: F,
    ) -> Step<u32>
    where
        T: Transport + ?Sized,
        F: Fn(&Response) -> Option<bool>,
    {
        let mut attempt = 0;
        loop {
            self.send(t, frame)?;
            let deadline = Instant::now() + timeout;
            match self.await_response(t, deadline, &matches)? {
                Some(true) => return Ok(attempt),
                Some(false) if self.phase == Phase::Write => {
                    // A failed program operation is not retried
                    log::error!(
                        "update: write at 0x{:08X} rejected, defective flash in 0x{:08X}..0x{:08X}",
                        self.address,
                        self.address,
                        self.address.wrapping_add(self.config.chunk_size as u32)
                    );
                    return Err(Stop::Failed(FailureReason::WriteRejected));
                }
                Some(false) => log::warn!(
                    "update: {} at 0x{:08X} rejected by device (attempt {}/{})",
                    self.phase,
                    self.address,
                    attempt + 1,
                    retries + 1
                ),
                None => log::warn!(
                    "update: {} at 0x{:08X} timed out (attempt {}/{})",
                    self.phase,
                    self.address,
                    attempt + 1,
                    retries + 1
                ),
            }
            attempt += 1;
            if attempt > retries {
                return Err(Stop::Failed(FailureReason::RetryExhausted(self.phase)));
            }
        }
    }

    /// Wait for a response `matches` recognizes
    ///
    /// Other frames are skipped. The transport is polled at least once
    /// even when the deadline has already passed.
    fn await_response<T, F>(&mut self, t: &mut T, deadline: Instant, matches: F) -> Step<Option<bool>>
    where
        T: Transport + ?Sized,
        F: Fn(&Response) -> Option<bool>,
    {
        let mut polled = false;
        loop {
            while let Some(frame) = self.decoder.next_frame() {
                match Response::parse(&frame) {
                    Some(response) => match matches(&response) {
                        Some(success) => return Ok(Some(success)),
                        None => log::debug!("update: ignoring stale {:?}", response),
                    },
                    None => log::debug!(
                        "update: ignoring frame {:02X}-{:02X}",
                        frame.class,
                        frame.id
                    ),
                }
            }
            if polled && Instant::now() >= deadline {
                return Ok(None);
            }
            polled = true;

            match t.receive(deadline) {
                Ok(bytes) => self.decoder.push(&bytes),
                Err(TransportError::Timeout) => return Ok(None),
                Err(e) => return Err(Stop::Failed(FailureReason::Transport(e.to_string()))),
            }
        }
    }

    fn send<T: Transport + ?Sized>(&mut self, t: &mut T, frame: &[u8]) -> Step {
        t.send(frame)
            .and_then(|()| t.flush())
            .map_err(|e| Stop::Failed(FailureReason::Transport(e.to_string())))
    }

    fn report(&self) -> ProgressReport {
        ProgressReport {
            bytes_written: self.bytes_written,
            total_bytes: self.image.len(),
            chunks_written: self.chunks_written,
            total_chunks: self.map.chunks(),
            sectors_erased: self.sectors_erased,
            total_sectors: self.map.sectors(),
            phase: self.phase,
        }
    }

    fn report_progress<P: UpdateProgress + ?Sized>(&mut self, progress: &mut P, force: bool) {
        if self.throttle.allow(Instant::now(), force) {
            progress.progress(&self.report());
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            phase: self.phase,
            address: self.address,
            chunk: self.chunk,
            sector: self.sector,
            chunks_written: self.chunks_written,
            sectors_erased: self.sectors_erased,
            bytes_written: self.bytes_written,
        }
    }

    fn trace_state(&self) {
        if log::log_enabled!(log::Level::Trace) {
            let map: String = self.chunk_states.iter().map(|s| s.symbol()).collect();
            log::trace!(
                "update: [{}] pending {} max retries erase {} write {}",
                map,
                self.pending_erases,
                self.max_erase_retries,
                self.max_write_retries
            );
        }
    }
}
