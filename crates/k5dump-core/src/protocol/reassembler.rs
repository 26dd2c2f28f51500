//! Reassembly of framed messages from a partial-read byte stream.

use tracing::{debug, trace};

use super::constants::{MAX_PENDING_BYTES, READ_BUFFER_SIZE};
use super::frame::{FrameCodec, FrameError, Scan};
use super::message::Message;
use crate::transport::{ByteTransport, TransportError};

/// Pending receive buffer that yields one message at a time.
#[derive(Debug)]
pub struct StreamReassembler {
    codec: FrameCodec,
    pending: Vec<u8>,
    rx_buf: [u8; READ_BUFFER_SIZE],
    discarded: usize,
    last_error: Option<FrameError>,
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new(FrameCodec::default())
    }
}

impl StreamReassembler {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            pending: Vec::with_capacity(READ_BUFFER_SIZE),
            rx_buf: [0; READ_BUFFER_SIZE],
            discarded: 0,
            last_error: None,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        self.trim_backlog();
    }

    fn trim_backlog(&mut self) {
        if self.pending.len() > MAX_PENDING_BYTES {
            let excess = self.pending.len() - MAX_PENDING_BYTES;
            debug!(excess, "Receive backlog full, dropping oldest bytes");
            self.pending.drain(..excess);
            self.discarded += excess;
        }
    }

    /// Read from `transport` until a read comes back short.
    ///
    /// Returns the number of bytes appended.
    pub fn drain<T: ByteTransport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<usize, TransportError> {
        let mut total = 0;
        loop {
            let n = transport.read_into(&mut self.rx_buf)?;
            if n > 0 {
                self.pending.extend_from_slice(&self.rx_buf[..n]);
                self.trim_backlog();
                total += n;
            }
            if n < self.rx_buf.len() {
                break;
            }
        }
        if total > 0 {
            trace!(bytes = total, pending = self.pending.len(), "Drained transport");
        }
        Ok(total)
    }

    /// Next complete message, dropping any garbage in front of it.
    pub fn try_extract(&mut self) -> Option<Message> {
        loop {
            match self.codec.scan(&self.pending) {
                Scan::Incomplete => return None,
                Scan::Skip { len, reason } => {
                    debug!(bytes = len, %reason, "Discarding invalid frame data");
                    self.pending.drain(..len);
                    self.discarded += len;
                    self.last_error = Some(reason);
                }
                Scan::Frame { message, len } => {
                    self.pending.drain(..len);
                    return Some(message);
                }
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total bytes discarded as garbage or corrupt frames so far.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Reason for the most recent discard, cleared on read.
    pub fn take_last_error(&mut self) -> Option<FrameError> {
        self.last_error.take()
    }
}
