//! UBX framing of the flash update messages
//!
//! Frame layout: `B5 62 class id len(u16 LE) payload ck_a ck_b`, where the
//! checksum is [`ubx_checksum`] over class, id, length and payload.

use crate::checksum::ubx_checksum;

/// First sync byte
pub const SYNC_1: u8 = 0xB5;
/// Second sync byte
pub const SYNC_2: u8 = 0x62;

/// Sync, class, id and length
pub const HEADER_LEN: usize = 6;
/// Header plus the two checksum bytes
pub const FRAME_OVERHEAD: usize = HEADER_LEN + 2;
/// Frames announcing a longer payload are discarded
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024;

/// Message classes
pub mod class {
    /// Acknowledgments
    pub const ACK: u8 = 0x05;
    /// Firmware update
    pub const UPD: u8 = 0x09;
}

/// UPD message ids
pub mod upd {
    /// Sector erase
    pub const ERASE: u8 = 0x0B;
    /// Flash write
    pub const FLWRI: u8 = 0x0C;
    /// Checksum poll
    pub const CRC: u8 = 0x0D;
    /// Reboot
    pub const RBOOT: u8 = 0x0E;
    /// Chip erase
    pub const CERASE: u8 = 0x16;
}

/// CRC poll version byte of the extended message
const CRC_V2_VERSION: u8 = 0x01;

/// Region selector of the extended CRC poll: RAM
pub const REGION_RAM: u8 = 0x00;
/// Region selector of the extended CRC poll: flash
pub const REGION_FLASH: u8 = 0x01;

/// A UBX frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message class
    pub class: u8,
    /// Message id
    pub id: u8,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame
    pub fn new(class: u8, id: u8, payload: Vec<u8>) -> Self {
        Self { class, id, payload }
    }

    /// Serialize with sync bytes and checksum
    pub fn encode(&self) -> Vec<u8> {
        let len = self.payload.len() as u16;
        let mut out = Vec::with_capacity(self.payload.len() + FRAME_OVERHEAD);
        out.extend_from_slice(&[SYNC_1, SYNC_2, self.class, self.id]);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.payload);
        let (ck_a, ck_b) = ubx_checksum(&out[2..]);
        out.push(ck_a);
        out.push(ck_b);
        out
    }
}

/// UPD-ERASE for the sector at `address`
pub fn erase(address: u32) -> Frame {
    Frame::new(class::UPD, upd::ERASE, address.to_le_bytes().to_vec())
}

/// UPD-FLWRI writing `data` at `address`
pub fn write(address: u32, data: &[u8]) -> Frame {
    let mut payload = Vec::with_capacity(8 + data.len());
    payload.extend_from_slice(&address.to_le_bytes());
    payload.extend_from_slice(&(data.len() as u32).to_le_bytes());
    payload.extend_from_slice(data);
    Frame::new(class::UPD, upd::FLWRI, payload)
}

/// UPD-CERASE
pub fn chip_erase() -> Frame {
    Frame::new(class::UPD, upd::CERASE, Vec::new())
}

fn crc_fields(payload: &mut Vec<u8>, address: u32, size: u32, checksum: (u32, u32)) {
    payload.extend_from_slice(&address.to_le_bytes());
    payload.extend_from_slice(&size.to_le_bytes());
    payload.extend_from_slice(&checksum.0.to_le_bytes());
    payload.extend_from_slice(&checksum.1.to_le_bytes());
}

/// UPD-CRC poll, original message
pub fn crc_v1(address: u32, size: u32, checksum: (u32, u32)) -> Frame {
    let mut payload = Vec::with_capacity(16);
    crc_fields(&mut payload, address, size, checksum);
    Frame::new(class::UPD, upd::CRC, payload)
}

/// UPD-CRC poll, extended message with a region selector
pub fn crc_v2(region: u8, address: u32, size: u32, checksum: (u32, u32)) -> Frame {
    let mut payload = vec![CRC_V2_VERSION, region];
    crc_fields(&mut payload, address, size, checksum);
    Frame::new(class::UPD, upd::CRC, payload)
}

/// UPD-RBOOT
pub fn reboot() -> Frame {
    Frame::new(class::UPD, upd::RBOOT, Vec::new())
}

/// Answers of the receiver to update commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Sector erase finished
    Erase {
        /// Sector address
        address: u32,
        /// Operation succeeded
        success: bool,
    },
    /// Chunk written
    Write {
        /// Chunk address
        address: u32,
        /// Operation succeeded
        success: bool,
    },
    /// Chip erase finished
    ChipErase {
        /// Operation succeeded
        success: bool,
    },
    /// Checksum poll result
    Crc {
        /// Checksums matched
        success: bool,
    },
}

impl Response {
    /// Interpret a frame, `None` for anything else
    pub fn parse(frame: &Frame) -> Option<Self> {
        if frame.class != class::UPD {
            return None;
        }
        let p = &frame.payload;
        match (frame.id, p.len()) {
            (upd::ERASE, 5) => Some(Response::Erase {
                address: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
                success: p[4] != 0,
            }),
            (upd::FLWRI, 5) => Some(Response::Write {
                address: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
                success: p[4] != 0,
            }),
            (upd::CERASE, 1) => Some(Response::ChipErase { success: p[0] == 1 }),
            (upd::CRC, 5) => Some(Response::Crc { success: p[4] != 0 }),
            _ => None,
        }
    }

    /// Build the frame a receiver sends for this response
    pub fn to_frame(self) -> Frame {
        let ack = |id: u8, address: u32, success: bool| {
            let mut payload = address.to_le_bytes().to_vec();
            payload.push(success as u8);
            Frame::new(class::UPD, id, payload)
        };
        match self {
            Response::Erase { address, success } => ack(upd::ERASE, address, success),
            Response::Write { address, success } => ack(upd::FLWRI, address, success),
            Response::ChipErase { success } => {
                Frame::new(class::UPD, upd::CERASE, vec![success as u8])
            }
            Response::Crc { success } => ack(upd::CRC, 0, success),
        }
    }
}

/// Incremental frame extractor for a byte stream
///
/// Garbage between frames is skipped. Frames with an oversized length or a
/// bad checksum are dropped and the search resumes one byte later.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Drop buffered bytes
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Number of buffered bytes
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete frame
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let start = match self.buf.windows(2).position(|w| w == [SYNC_1, SYNC_2]) {
                Some(start) => start,
                None => {
                    // Keep a trailing first sync byte, its partner may follow
                    let keep = usize::from(self.buf.last() == Some(&SYNC_1));
                    let drop = self.buf.len() - keep;
                    self.buf.drain(..drop);
                    return None;
                }
            };
            if start > 0 {
                log::trace!("ubx: skipping {} bytes of garbage", start);
                self.buf.drain(..start);
            }
            if self.buf.len() < HEADER_LEN {
                return None;
            }

            let len = u16::from_le_bytes([self.buf[4], self.buf[5]]) as usize;
            if len > MAX_PAYLOAD_LEN {
                log::debug!("ubx: dropping frame with oversized length {}", len);
                self.buf.drain(..1);
                continue;
            }
            let total = len + FRAME_OVERHEAD;
            if self.buf.len() < total {
                return None;
            }

            let (ck_a, ck_b) = ubx_checksum(&self.buf[2..HEADER_LEN + len]);
            if self.buf[total - 2] != ck_a || self.buf[total - 1] != ck_b {
                log::debug!(
                    "ubx: checksum mismatch on {:02X}-{:02X}",
                    self.buf[2],
                    self.buf[3]
                );
                self.buf.drain(..1);
                continue;
            }

            let frame = Frame::new(
                self.buf[2],
                self.buf[3],
                self.buf[HEADER_LEN..HEADER_LEN + len].to_vec(),
            );
            self.buf.drain(..total);
            return Some(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_erase() {
        let bytes = erase(0x0080_1000).encode();
        assert_eq!(&bytes[..6], &[0xB5, 0x62, 0x09, 0x0B, 0x04, 0x00]);
        assert_eq!(&bytes[6..10], &[0x00, 0x10, 0x80, 0x00]);
        let (a, b) = ubx_checksum(&bytes[2..10]);
        assert_eq!(&bytes[10..], &[a, b]);
    }

    #[test]
    fn test_write_payload() {
        let frame = write(0x0080_0200, &[1, 2, 3]);
        assert_eq!(frame.id, upd::FLWRI);
        assert_eq!(
            frame.payload,
            vec![0x00, 0x02, 0x80, 0x00, 3, 0, 0, 0, 1, 2, 3]
        );
    }

    #[test]
    fn test_crc_payloads() {
        let v1 = crc_v1(0x0080_0000, 0x200, (1, 2));
        assert_eq!(v1.payload.len(), 16);
        let v2 = crc_v2(REGION_FLASH, 0x0080_0000, 0x200, (1, 2));
        assert_eq!(v2.payload.len(), 18);
        assert_eq!(&v2.payload[..2], &[0x01, 0x01]);
        assert_eq!(&v2.payload[2..], &v1.payload[..]);
    }

    #[test]
    fn test_decoder_skips_garbage_and_splits() {
        let ack = Response::Erase {
            address: 0x0080_0000,
            success: true,
        }
        .to_frame();
        let mut stream = vec![0x00, 0xB5, 0x11];
        stream.extend(ack.encode());
        stream.extend(Response::ChipErase { success: true }.to_frame().encode());

        let mut dec = FrameDecoder::new();
        dec.push(&stream[..7]);
        assert_eq!(dec.next_frame(), None);
        dec.push(&stream[7..]);

        let first = dec.next_frame().unwrap();
        assert_eq!(
            Response::parse(&first),
            Some(Response::Erase {
                address: 0x0080_0000,
                success: true
            })
        );
        let second = dec.next_frame().unwrap();
        assert_eq!(
            Response::parse(&second),
            Some(Response::ChipErase { success: true })
        );
        assert_eq!(dec.next_frame(), None);
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn test_decoder_drops_bad_checksum() {
        let mut bad = erase(0x1000).encode();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let good = reboot().encode();

        let mut dec = FrameDecoder::new();
        dec.push(&bad);
        dec.push(&good);
        assert_eq!(dec.next_frame(), Some(reboot()));
    }

    #[test]
    fn test_decoder_drops_oversized_length() {
        let mut dec = FrameDecoder::new();
        dec.push(&[0xB5, 0x62, 0x09, 0x0C, 0xFF, 0xFF]);
        dec.push(&chip_erase().encode());
        assert_eq!(dec.next_frame(), Some(chip_erase()));
    }

    #[test]
    fn test_parse_rejects_foreign_frames() {
        assert_eq!(Response::parse(&Frame::new(class::ACK, 0x01, vec![0x09, 0x0B])), None);
        assert_eq!(Response::parse(&Frame::new(class::UPD, upd::ERASE, vec![0; 4])), None);
        assert_eq!(
            Response::parse(&Frame::new(class::UPD, upd::CERASE, vec![2])),
            Some(Response::ChipErase { success: false })
        );
    }
}
