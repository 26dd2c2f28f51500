//! State machine for the EEPROM dump exchange.
//!
//! Each state owns exactly the data it needs and hands the next state its
//! inputs on transition. The driver only sees [`Step`] results.

use std::fmt;
use std::time::Duration;

use super::handlers::{AccessState, DeviceInfoState, DumpState, LinkSyncState, StepContext};
use crate::events::{DumpObserver, DumpPhase};
use crate::transport::{ByteTransport, TransportError};

/// Timing knobs for requests and link sync.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Resend a request when nothing acceptable arrived within this bound.
    pub response_timeout: Duration,
    /// Consecutive timeouts tolerated for one request; 0 retries forever.
    pub max_timeouts: u32,
    /// Line must stay silent this long after unsolicited bytes.
    pub link_quiet: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(1000),
            max_timeouts: 5,
            link_quiet: Duration::from_millis(200),
        }
    }
}

/// How a finished session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Every byte of the range, in address order.
    Dumped(Vec<u8>),
    /// The radio refused the challenge response.
    AccessDenied { error_code: u8 },
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Dumped(_))
    }
}

/// Result of one step of the active state.
#[derive(Debug)]
pub enum Step {
    /// Stay in the current state.
    Continue,
    /// Replace the current state.
    TransitionTo(SessionState),
    /// Session over.
    Finished(Completion),
}

/// Current state of a dump session.
#[derive(Debug)]
pub enum SessionState {
    LinkSync(LinkSyncState),
    DeviceInfo(DeviceInfoState),
    AccessRequest(AccessState),
    DumpEeprom(DumpState),
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::LinkSync(LinkSyncState::new())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.phase())
    }
}

impl SessionState {
    pub fn phase(&self) -> DumpPhase {
        match self {
            SessionState::LinkSync(_) => DumpPhase::LinkSync,
            SessionState::DeviceInfo(_) => DumpPhase::DeviceInfo,
            SessionState::AccessRequest(_) => DumpPhase::AccessRequest,
            SessionState::DumpEeprom(_) => DumpPhase::DumpEeprom,
        }
    }

    /// Run one send-or-poll step of the active state.
    pub fn step<T: ByteTransport, O: DumpObserver + ?Sized>(
        &mut self,
        ctx: &mut StepContext<'_, T, O>,
    ) -> Result<Step, TransportError> {
        match self {
            SessionState::LinkSync(s) => s.step(ctx),
            SessionState::DeviceInfo(s) => s.step(ctx),
            SessionState::AccessRequest(s) => s.step(ctx),
            SessionState::DumpEeprom(s) => s.step(ctx),
        }
    }
}

/// Current Unix time truncated to 32 bits (wraps rather than saturates).
pub fn unix_timestamp() -> u32 {
    truncate_timestamp(chrono::Utc::now().timestamp())
}

pub fn truncate_timestamp(secs: i64) -> u32 {
    secs as u32
}
