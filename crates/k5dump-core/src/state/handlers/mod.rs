//! State handlers - send/await/validate logic for each session state.
//!
//! This module is split into submodules by state:
//! - `link_sync`: drain unsolicited bytes until the line is quiet
//! - `device_info`: identify the radio and collect its challenge
//! - `access`: answer the challenge
//! - `dump`: fetch the EEPROM range chunk by chunk

mod access;
mod device_info;
mod dump;
mod link_sync;

pub use access::AccessState;
pub use device_info::DeviceInfoState;
pub use dump::DumpState;
pub use link_sync::LinkSyncState;

use std::time::Instant;
use tracing::debug;

use super::machine::RetryPolicy;
use crate::auth::ChallengeResponder;
use crate::events::{DumpEvent, DumpObserver, DumpPhase, PacketDirection, RetryReason};
use crate::protocol::{Message, StreamReassembler, make_frame};
use crate::region::AddressRange;
use crate::transport::{ByteTransport, TransportError};

/// Resources a state may use during a step. Holds no protocol state.
pub struct StepContext<'a, T: ByteTransport, O: DumpObserver + ?Sized> {
    pub transport: &'a mut T,
    pub observer: &'a O,
    pub rx: &'a mut StreamReassembler,
    pub policy: &'a RetryPolicy,
    pub responder: &'a dyn ChallengeResponder,
    /// EEPROM span requested for this session.
    pub range: AddressRange,
}

impl<'a, T: ByteTransport, O: DumpObserver + ?Sized> StepContext<'a, T, O> {
    pub(crate) fn emit(&self, event: DumpEvent) {
        self.observer.on_event(&event);
    }

    /// Frame, write and flush one message.
    pub(crate) fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        self.transport.write(&make_frame(msg.as_bytes()))?;
        self.transport.flush()?;
        self.emit(DumpEvent::Packet {
            direction: PacketDirection::Tx,
            msg_type: msg.msg_type(),
            length: msg.len(),
        });
        Ok(())
    }

    /// One drain attempt, then the next complete message if any.
    pub(crate) fn receive(&mut self) -> Result<Option<Message>, TransportError> {
        let discarded_before = self.rx.discarded();
        self.rx.drain(&mut *self.transport)?;
        let msg = self.rx.try_extract();

        let discarded = self.rx.discarded() - discarded_before;
        if discarded > 0 {
            let reason = self
                .rx
                .take_last_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "backlog overflow".into());
            self.emit(DumpEvent::FrameDiscarded {
                bytes: discarded,
                reason,
            });
        }
        if let Some(m) = &msg {
            self.emit(DumpEvent::Packet {
                direction: PacketDirection::Rx,
                msg_type: m.msg_type(),
                length: m.len(),
            });
        }
        Ok(msg)
    }
}

/// One outstanding request and its retry bookkeeping.
///
/// Idle until [`Exchange::start`]; resends always repeat the stored request
/// byte for byte.
#[derive(Debug, Default)]
pub(crate) struct Exchange {
    request: Option<Message>,
    sent_at: Option<Instant>,
    timeouts: u32,
    resends: u32,
}

impl Exchange {
    pub fn is_idle(&self) -> bool {
        self.request.is_none()
    }

    pub fn resends(&self) -> u32 {
        self.resends
    }

    pub fn start<T: ByteTransport, O: DumpObserver + ?Sized>(
        &mut self,
        ctx: &mut StepContext<'_, T, O>,
        msg: Message,
    ) -> Result<(), TransportError> {
        ctx.send(&msg)?;
        self.request = Some(msg);
        self.sent_at = Some(Instant::now());
        self.timeouts = 0;
        Ok(())
    }

    pub fn resend<T: ByteTransport, O: DumpObserver + ?Sized>(
        &mut self,
        ctx: &mut StepContext<'_, T, O>,
        phase: DumpPhase,
        reason: RetryReason,
    ) -> Result<(), TransportError> {
        let Some(msg) = &self.request else {
            return Ok(());
        };
        if let RetryReason::Mismatch(_) = reason {
            self.timeouts = 0;
        }
        self.resends += 1;
        ctx.emit(DumpEvent::Retry {
            phase,
            reason,
            attempt: self.resends,
        });
        ctx.send(msg)?;
        self.sent_at = Some(Instant::now());
        Ok(())
    }

    /// Next received message; resends on timeout.
    pub fn poll<T: ByteTransport, O: DumpObserver + ?Sized>(
        &mut self,
        ctx: &mut StepContext<'_, T, O>,
        phase: DumpPhase,
    ) -> Result<Option<Message>, TransportError> {
        if let Some(msg) = ctx.receive()? {
            return Ok(Some(msg));
        }

        let timeout = ctx.policy.response_timeout;
        let expired = self.sent_at.is_some_and(|t| t.elapsed() >= timeout);
        if !expired {
            return Ok(None);
        }

        self.timeouts += 1;
        let max = ctx.policy.max_timeouts;
        if max > 0 && self.timeouts >= max {
            debug!(phase = %phase, timeouts = self.timeouts, "Giving up on request");
            return Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
                attempts: self.timeouts,
            });
        }
        self.resend(ctx, phase, RetryReason::Timeout)?;
        Ok(None)
    }

    /// Response accepted; back to idle.
    pub fn finish(&mut self) {
        self.request = None;
        self.sent_at = None;
        self.timeouts = 0;
    }
}
