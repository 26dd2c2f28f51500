//! AccessRequest - answer the radio's challenge.

use tracing::{debug, info};

use super::{DumpState, Exchange, StepContext};
use crate::events::{DumpEvent, DumpObserver, DumpPhase, RetryReason};
use crate::protocol::constants::MSG_ACCESS_RESP;
use crate::protocol::messages::access_request;
use crate::protocol::{AccessResponse, DeviceInfo};
use crate::state::machine::{Completion, SessionState, Step};
use crate::transport::{ByteTransport, TransportError};

#[derive(Debug)]
pub struct AccessState {
    device: DeviceInfo,
    timestamp: u32,
    exchange: Exchange,
}

impl AccessState {
    pub fn new(device: DeviceInfo, timestamp: u32) -> Self {
        Self {
            device,
            timestamp,
            exchange: Exchange::default(),
        }
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn step<T: ByteTransport, O: DumpObserver + ?Sized>(
        &mut self,
        ctx: &mut StepContext<'_, T, O>,
    ) -> Result<Step, TransportError> {
        if self.exchange.is_idle() {
            info!("Obtaining access permission..");
            let response = ctx.responder.respond(&self.device.challenge);
            self.exchange.start(ctx, access_request(&response))?;
            return Ok(Step::Continue);
        }

        let Some(msg) = self.exchange.poll(ctx, DumpPhase::AccessRequest)? else {
            return Ok(Step::Continue);
        };
        if msg.msg_type() != MSG_ACCESS_RESP {
            ctx.emit(DumpEvent::Ignored {
                phase: DumpPhase::AccessRequest,
                msg_type: msg.msg_type(),
            });
            return Ok(Step::Continue);
        }

        let resp = match AccessResponse::parse(&msg) {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "Unusable access response");
                self.exchange.resend(
                    ctx,
                    DumpPhase::AccessRequest,
                    RetryReason::Mismatch(e.to_string()),
                )?;
                return Ok(Step::Continue);
            }
        };
        self.exchange.finish();

        ctx.emit(DumpEvent::AccessResult {
            granted: resp.granted(),
            error_code: resp.error_code,
        });
        if !resp.granted() {
            return Ok(Step::Finished(Completion::AccessDenied {
                error_code: resp.error_code,
            }));
        }

        Ok(Step::TransitionTo(SessionState::DumpEeprom(DumpState::new(
            ctx.range,
            self.timestamp,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ChallengeResponder;
    use crate::events::NullObserver;
    use crate::protocol::constants::*;
    use crate::protocol::{ChallengeWords, make_frame};
    use crate::region::Region;
    use crate::state::handlers::test_support::Harness;
    use crate::transport::MockTransport;

    fn device() -> DeviceInfo {
        DeviceInfo {
            version: "2.01.32".into(),
            has_aes_key: false,
            lock_screen: false,
            challenge: [0xAAAA_0001, 0xBBBB_0002, 0xCCCC_0003, 0xDDDD_0004],
        }
    }

    #[test]
    fn test_zero_response_sent() {
        let mut h = Harness::new(MockTransport::new(), Region::Calib.range());
        let mut state = AccessState::new(device(), 77);
        state.step(&mut h.ctx()).unwrap();

        let expected = make_frame(access_request(&[0; 4]).as_bytes());
        assert_eq!(h.transport.writes(), &[expected]);
    }

    #[test]
    fn test_custom_responder_sees_challenge() {
        let mut h = Harness::new(MockTransport::new(), Region::Calib.range());
        let invert = |c: &ChallengeWords| c.map(|w| !w);
        let mut ctx = StepContext {
            transport: &mut h.transport,
            observer: &NullObserver,
            rx: &mut h.rx,
            policy: &h.policy,
            responder: &invert as &dyn ChallengeResponder,
            range: h.range,
        };
        let mut state = AccessState::new(device(), 77);
        state.step(&mut ctx).unwrap();

        let expected = access_request(&device().challenge.map(|w| !w));
        assert_eq!(h.transport.writes(), &[make_frame(expected.as_bytes())]);
    }

    #[test]
    fn test_granted_moves_to_dump_with_range() {
        let mut h = Harness::new(MockTransport::new(), Region::Calib.range());
        let mut state = AccessState::new(device(), 77);
        state.step(&mut h.ctx()).unwrap();

        h.transport.queue_message(&AccessResponse { error_code: 0 }.to_message());
        match state.step(&mut h.ctx()).unwrap() {
            Step::TransitionTo(SessionState::DumpEeprom(dump)) => {
                assert_eq!(dump.range(), Region::Calib.range());
                assert_eq!(dump.offset(), CALIB_BASE);
                assert_eq!(dump.remaining(), 0x200);
                assert_eq!(dump.timestamp(), 77);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_denied_finishes_without_resend() {
        let mut h = Harness::new(MockTransport::new(), Region::Config.range());
        let mut state = AccessState::new(device(), 1);
        state.step(&mut h.ctx()).unwrap();

        h.transport.queue_message(&AccessResponse { error_code: 1 }.to_message());
        match state.step(&mut h.ctx()).unwrap() {
            Step::Finished(Completion::AccessDenied { error_code }) => assert_eq!(error_code, 1),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(h.transport.writes().len(), 1);
    }

    #[test]
    fn test_wrong_type_ignored() {
        let mut h = Harness::new(MockTransport::new(), Region::Config.range());
        let mut state = AccessState::new(device(), 1);
        state.step(&mut h.ctx()).unwrap();

        h.transport.queue_message(&device().to_message());
        assert!(matches!(state.step(&mut h.ctx()).unwrap(), Step::Continue));
        assert_eq!(h.transport.writes().len(), 1);
        assert_eq!(h.transport.pending_reads(), 0);
    }
}
