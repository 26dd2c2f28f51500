//! DumpEeprom - fetch the selected range 16 bytes at a time.

use tracing::{debug, info};

use super::{Exchange, StepContext};
use crate::events::{DumpEvent, DumpObserver, DumpPhase, RetryReason, progress_percent};
use crate::protocol::constants::{CHUNK_SIZE, MSG_READ_EEPROM_RESP};
use crate::protocol::messages::read_eeprom_request;
use crate::protocol::ChunkResponse;
use crate::region::AddressRange;
use crate::state::machine::{Completion, Step};
use crate::transport::{ByteTransport, TransportError};

/// Chunked transfer bookkeeping.
///
/// `offset` only moves (by exactly one chunk) when a response echoing the
/// requested offset and chunk size arrives; `remaining` reaches zero exactly
/// when the whole range has been collected. [`AddressRange`] guarantees the
/// range is chunk aligned and addressable with 16-bit offsets.
#[derive(Debug)]
pub struct DumpState {
    range: AddressRange,
    offset: u32,
    remaining: u32,
    data: Vec<u8>,
    timestamp: u32,
    exchange: Exchange,
}

impl DumpState {
    pub fn new(range: AddressRange, timestamp: u32) -> Self {
        Self {
            range,
            offset: range.base(),
            remaining: range.size(),
            data: Vec::with_capacity(range.size() as usize),
            timestamp,
            exchange: Exchange::default(),
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn fetched(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn range(&self) -> AddressRange {
        self.range
    }

    /// Requests sent again after a mismatch or timeout.
    pub fn resends(&self) -> u32 {
        self.exchange.resends()
    }

    pub fn percent(&self) -> u32 {
        progress_percent(self.fetched(), self.remaining)
    }

    fn progress_event(&self) -> DumpEvent {
        DumpEvent::Progress {
            offset: self.offset,
            fetched: self.fetched(),
            remaining: self.remaining,
            percent: self.percent(),
        }
    }

    fn finish(&mut self) -> Step {
        info!(bytes = self.data.len(), "Done");
        Step::Finished(Completion::Dumped(std::mem::take(&mut self.data)))
    }

    pub fn step<T: ByteTransport, O: DumpObserver + ?Sized>(
        &mut self,
        ctx: &mut StepContext<'_, T, O>,
    ) -> Result<Step, TransportError> {
        if self.remaining == 0 {
            ctx.emit(self.progress_event());
            return Ok(self.finish());
        }

        if self.exchange.is_idle() {
            ctx.emit(self.progress_event());
            let req = read_eeprom_request(self.offset as u16, self.timestamp);
            self.exchange.start(ctx, req)?;
            return Ok(Step::Continue);
        }

        let Some(msg) = self.exchange.poll(ctx, DumpPhase::DumpEeprom)? else {
            return Ok(Step::Continue);
        };
        if msg.msg_type() != MSG_READ_EEPROM_RESP {
            ctx.emit(DumpEvent::Ignored {
                phase: DumpPhase::DumpEeprom,
                msg_type: msg.msg_type(),
            });
            return Ok(Step::Continue);
        }

        let chunk = match ChunkResponse::parse(&msg) {
            Ok(c) if c.matches(self.offset as u16) => c,
            Ok(c) => {
                let detail = format!(
                    "offset 0x{:04X} size {} for request 0x{:04X}",
                    c.offset, c.size, self.offset
                );
                self.exchange
                    .resend(ctx, DumpPhase::DumpEeprom, RetryReason::Mismatch(detail))?;
                return Ok(Step::Continue);
            }
            Err(e) => {
                self.exchange
                    .resend(ctx, DumpPhase::DumpEeprom, RetryReason::Mismatch(e.to_string()))?;
                return Ok(Step::Continue);
            }
        };

        self.data.extend_from_slice(&chunk.data);
        self.offset += CHUNK_SIZE as u32;
        self.remaining -= CHUNK_SIZE as u32;
        self.exchange.finish();
        debug!(offset = self.offset, remaining = self.remaining, "Chunk accepted");

        if self.remaining == 0 {
            ctx.emit(self.progress_event());
            return Ok(self.finish());
        }
        Ok(Step::Continue)
    }
}
