//! DeviceInfo - identify the radio and collect its AES challenge.

use tracing::{debug, info};

use super::{AccessState, Exchange, StepContext};
use crate::events::{DumpEvent, DumpObserver, DumpPhase, RetryReason};
use crate::protocol::constants::MSG_DEVICE_INFO_RESP;
use crate::protocol::messages::device_info_request;
use crate::protocol::DeviceInfo;
use crate::state::machine::{SessionState, Step, unix_timestamp};
use crate::transport::{ByteTransport, TransportError};

#[derive(Debug, Default)]
pub struct DeviceInfoState {
    exchange: Exchange,
    /// Captured when the request goes out; reused by every later request.
    timestamp: u32,
}

impl DeviceInfoState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step<T: ByteTransport, O: DumpObserver + ?Sized>(
        &mut self,
        ctx: &mut StepContext<'_, T, O>,
    ) -> Result<Step, TransportError> {
        if self.exchange.is_idle() {
            info!("Examining device info..");
            self.timestamp = unix_timestamp();
            self.exchange.start(ctx, device_info_request(self.timestamp))?;
            return Ok(Step::Continue);
        }

        let Some(msg) = self.exchange.poll(ctx, DumpPhase::DeviceInfo)? else {
            return Ok(Step::Continue);
        };
        if msg.msg_type() != MSG_DEVICE_INFO_RESP {
            ctx.emit(DumpEvent::Ignored {
                phase: DumpPhase::DeviceInfo,
                msg_type: msg.msg_type(),
            });
            return Ok(Step::Continue);
        }

        let device = match DeviceInfo::parse(&msg) {
            Ok(d) => d,
            Err(e) => {
                debug!(error = %e, "Unusable device info");
                self.exchange.resend(
                    ctx,
                    DumpPhase::DeviceInfo,
                    RetryReason::Mismatch(e.to_string()),
                )?;
                return Ok(Step::Continue);
            }
        };
        self.exchange.finish();

        ctx.emit(DumpEvent::DeviceIdentified {
            version: device.version.clone(),
            has_aes_key: device.has_aes_key,
            lock_screen: device.lock_screen,
            challenge: device.challenge,
        });

        Ok(Step::TransitionTo(SessionState::AccessRequest(
            AccessState::new(device, self.timestamp),
        )))
    }
}
