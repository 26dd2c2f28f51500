//! On-wire framing for K5 messages.
//!
//! ```text
//! AB CD | len (u16 LE) | payload ^ key | crc16 (LE) ^ key | DC BA
//! ```
//!
//! The CRC is CRC-16/XMODEM over the plain payload. Payload and CRC are XORed
//! with a 16-byte key stream starting at index 0 of the payload.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use super::constants::*;
use super::message::Message;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("No frame header in {0} bytes")]
    NoHeader(usize),
    #[error("Invalid payload length {0}")]
    BadLength(usize),
    #[error("Invalid frame footer {0:02X?}")]
    BadFooter([u8; 2]),
    #[error("CRC mismatch: frame 0x{frame:04X}, computed 0x{computed:04X}")]
    BadCrc { frame: u16, computed: u16 },
    #[error("Frame claiming {0} payload bytes overlaps a later valid frame")]
    Overlapped(usize),
}

/// Outcome of scanning the head of a receive buffer.
#[derive(Debug)]
pub enum Scan {
    /// Not enough bytes to decide.
    Incomplete,
    /// Leading bytes that can never start a valid frame.
    Skip { len: usize, reason: FrameError },
    /// One complete frame occupying `len` leading bytes.
    Frame { message: Message, len: usize },
}

/// CRC-16/XMODEM (poly 0x1021, init 0).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &b in data {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// XOR `data` with the obfuscation key stream. Self-inverse.
pub fn obfuscate(data: &mut [u8]) {
    for (i, b) in data.iter_mut().enumerate() {
        *b ^= OBFUSCATION_KEY[i % OBFUSCATION_KEY.len()];
    }
}

/// Wrap a message payload for transmission.
pub fn make_frame(payload: &[u8]) -> Vec<u8> {
    debug_assert!((MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN).contains(&payload.len()));

    let mut body = Vec::with_capacity(payload.len() + FRAME_CRC_LEN);
    body.extend_from_slice(payload);
    let mut crc = [0u8; FRAME_CRC_LEN];
    LittleEndian::write_u16(&mut crc, crc16(payload));
    body.extend_from_slice(&crc);
    obfuscate(&mut body);

    let mut len = [0u8; FRAME_LEN_FIELD];
    LittleEndian::write_u16(&mut len, payload.len() as u16);

    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.extend_from_slice(&FRAME_HEADER);
    frame.extend_from_slice(&len);
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&FRAME_FOOTER);
    frame
}

/// Frame decoder for the receive direction.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    verify_crc: bool,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self { verify_crc: true }
    }
}

impl FrameCodec {
    pub fn new(verify_crc: bool) -> Self {
        Self { verify_crc }
    }

    /// Inspect the head of `pending`.
    ///
    /// Returns the decoded message (if a valid frame is at the head) and the
    /// number of leading bytes the caller must drop. `(None, 0)` means more
    /// data is needed; `(None, n)` with `n > 0` means `n` bytes of garbage or
    /// a corrupt frame were discarded.
    pub fn try_take_frame(&self, pending: &[u8]) -> (Option<Message>, usize) {
        match self.scan(pending) {
            Scan::Incomplete => (None, 0),
            Scan::Skip { len, .. } => (None, len),
            Scan::Frame { message, len } => (Some(message), len),
        }
    }

    pub fn scan(&self, pending: &[u8]) -> Scan {
        let Some(start) = find_header(pending) else {
            // A trailing first header byte may be completed by the next read.
            let keep = usize::from(pending.last() == Some(&FRAME_HEADER[0]));
            let len = pending.len() - keep;
            if len == 0 {
                return Scan::Incomplete;
            }
            return Scan::Skip {
                len,
                reason: FrameError::NoHeader(len),
            };
        };
        if start > 0 {
            return Scan::Skip {
                len: start,
                reason: FrameError::NoHeader(start),
            };
        }

        match self.decode_head(pending) {
            Head::Frame { message, len } => Scan::Frame { message, len },
            Head::Invalid(reason) => skip_header(reason),
            Head::Incomplete { claimed } => {
                // A damaged length can claim bytes that belong to later frames.
                // If one of those is already complete and valid, the head is junk.
                if self.valid_frame_after_head(pending) {
                    skip_header(FrameError::Overlapped(claimed))
                } else {
                    Scan::Incomplete
                }
            }
        }
    }

    /// Decode the frame whose header sits at `buf[0]`, without resync.
    fn decode_head(&self, buf: &[u8]) -> Head {
        let len_end = FRAME_HEADER.len() + FRAME_LEN_FIELD;
        if buf.len() < len_end {
            return Head::Incomplete { claimed: 0 };
        }
        let payload_len = LittleEndian::read_u16(&buf[FRAME_HEADER.len()..len_end]) as usize;
        if !(MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN).contains(&payload_len) {
            return Head::Invalid(FrameError::BadLength(payload_len));
        }

        let total = payload_len + FRAME_OVERHEAD;
        if buf.len() < total {
            return Head::Incomplete {
                claimed: payload_len,
            };
        }

        let footer = [buf[total - 2], buf[total - 1]];
        if footer != FRAME_FOOTER {
            return Head::Invalid(FrameError::BadFooter(footer));
        }

        let mut body = buf[len_end..total - FRAME_FOOTER.len()].to_vec();
        obfuscate(&mut body);
        let crc_frame = LittleEndian::read_u16(&body[payload_len..]);
        body.truncate(payload_len);

        if self.verify_crc {
            let computed = crc16(&body);
            if computed != crc_frame {
                return Head::Invalid(FrameError::BadCrc {
                    frame: crc_frame,
                    computed,
                });
            }
        }

        Head::Frame {
            message: Message::from_bytes(body),
            len: total,
        }
    }

    fn valid_frame_after_head(&self, pending: &[u8]) -> bool {
        let mut pos = FRAME_HEADER.len();
        while let Some(next) = find_header(&pending[pos..]) {
            pos += next;
            if matches!(self.decode_head(&pending[pos..]), Head::Frame { .. }) {
                return true;
            }
            pos += FRAME_HEADER.len();
        }
        false
    }
}

/// Decode result for a buffer known to start with a header.
enum Head {
    Incomplete { claimed: usize },
    Invalid(FrameError),
    Frame { message: Message, len: usize },
}

fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_HEADER.len())
        .position(|w| w == FRAME_HEADER)
}

/// Drop only the header so the scan resumes right after it; a genuine frame
/// may start inside the span of the bad one.
fn skip_header(reason: FrameError) -> Scan {
    Scan::Skip {
        len: FRAME_HEADER.len(),
        reason,
    }
}
