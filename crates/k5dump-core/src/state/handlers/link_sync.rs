//! LinkSync - wait for the line to go quiet before talking.

use std::time::Instant;

use super::{DeviceInfoState, StepContext};
use crate::events::{DumpEvent, DumpObserver};
use crate::protocol::constants::READ_BUFFER_SIZE;
use crate::state::machine::{SessionState, Step};
use crate::transport::{ByteTransport, TransportError};

/// Drains whatever the radio sends unprompted (boot chatter, leftovers of an
/// earlier session). Advances on the first empty drain if nothing was ever
/// received, otherwise once the line has been silent for the quiet period.
#[derive(Debug, Default)]
pub struct LinkSyncState {
    last_rx: Option<Instant>,
    drained: usize,
}

impl LinkSyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes thrown away so far.
    pub fn drained(&self) -> usize {
        self.drained
    }

    pub fn step<T: ByteTransport, O: DumpObserver + ?Sized>(
        &mut self,
        ctx: &mut StepContext<'_, T, O>,
    ) -> Result<Step, TransportError> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut n = 0;
        loop {
            let got = ctx.transport.read_into(&mut buf)?;
            n += got;
            if got < buf.len() {
                break;
            }
        }

        if n > 0 {
            self.last_rx = Some(Instant::now());
            self.drained += n;
            ctx.emit(DumpEvent::LineNoise { bytes: n });
            return Ok(Step::Continue);
        }

        let quiet = match self.last_rx {
            None => true,
            Some(t) => t.elapsed() >= ctx.policy.link_quiet,
        };
        if !quiet {
            return Ok(Step::Continue);
        }

        Ok(Step::TransitionTo(SessionState::DeviceInfo(
            DeviceInfoState::new(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DumpPhase;
    use crate::region::Region;
    use crate::state::handlers::test_support::Harness;
    use crate::transport::MockTransport;
    use std::time::Duration;

    #[test]
    fn test_silent_line_advances_immediately() {
        let mut h = Harness::new(MockTransport::new(), Region::Config.range());
        let mut state = LinkSyncState::new();
        match state.step(&mut h.ctx()).unwrap() {
            Step::TransitionTo(next) => assert_eq!(next.phase(), DumpPhase::DeviceInfo),
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.transport.writes().is_empty());
    }

    #[test]
    fn test_noise_is_drained_first() {
        let mut mock = MockTransport::new();
        mock.queue_read(&[0x55; 300]);
        mock.queue_read(&[0x55; 10]);
        let mut h = Harness::new(mock, Region::Config.range());
        let mut state = LinkSyncState::new();

        // 256 + 44 in the first drain: the 44-byte read is short.
        assert!(matches!(state.step(&mut h.ctx()).unwrap(), Step::Continue));
        assert_eq!(state.drained(), 300);
        assert!(matches!(state.step(&mut h.ctx()).unwrap(), Step::Continue));
        assert_eq!(state.drained(), 310);
        assert!(matches!(
            state.step(&mut h.ctx()).unwrap(),
            Step::TransitionTo(SessionState::DeviceInfo(_))
        ));
    }

    #[test]
    fn test_waits_for_quiet_period() {
        let mut mock = MockTransport::new();
        mock.queue_read(&[0x01]);
        let mut h = Harness::new(mock, Region::Config.range());
        h.policy.link_quiet = Duration::from_secs(3600);
        let mut state = LinkSyncState::new();

        assert!(matches!(state.step(&mut h.ctx()).unwrap(), Step::Continue));
        assert!(matches!(state.step(&mut h.ctx()).unwrap(), Step::Continue));
    }
}
