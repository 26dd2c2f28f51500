//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to follow a dump without the
//! state machine knowing how progress is presented.

use std::fmt;

use crate::protocol::ChallengeWords;

/// Dump session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpPhase {
    /// Waiting for the line to go quiet.
    LinkSync,
    /// Identifying the radio.
    DeviceInfo,
    /// Answering the access challenge.
    AccessRequest,
    /// Fetching EEPROM chunks.
    DumpEeprom,
    /// Dump written.
    Complete,
    /// Session ended without output.
    Failed,
}

impl fmt::Display for DumpPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpPhase::LinkSync => write!(f, "Link Sync"),
            DumpPhase::DeviceInfo => write!(f, "Device Info"),
            DumpPhase::AccessRequest => write!(f, "Access Request"),
            DumpPhase::DumpEeprom => write!(f, "Dump EEPROM"),
            DumpPhase::Complete => write!(f, "Complete"),
            DumpPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Events emitted by the dump session.
#[derive(Debug, Clone)]
pub enum DumpEvent {
    /// Phase changed.
    PhaseChanged { from: DumpPhase, to: DumpPhase },
    /// Unsolicited bytes seen while syncing the link.
    LineNoise { bytes: usize },
    /// Radio identified itself.
    DeviceIdentified {
        version: String,
        has_aes_key: bool,
        lock_screen: bool,
        challenge: ChallengeWords,
    },
    /// Access request answered.
    AccessResult { granted: bool, error_code: u8 },
    /// Progress of the EEPROM transfer.
    Progress {
        offset: u32,
        fetched: u32,
        remaining: u32,
        percent: u32,
    },
    /// A request is being sent again.
    Retry {
        phase: DumpPhase,
        reason: RetryReason,
        attempt: u32,
    },
    /// A response arrived that was not the one awaited.
    Ignored { phase: DumpPhase, msg_type: u16 },
    /// Receive bytes thrown away while resynchronizing.
    FrameDiscarded { bytes: usize, reason: String },
    /// Message sent/received.
    Packet {
        direction: PacketDirection,
        msg_type: u16,
        length: usize,
    },
    /// Dump finished and handed to the sink.
    Complete { bytes: usize },
}

/// Why a request was resent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    /// Right message type, wrong content.
    Mismatch(String),
    /// Nothing acceptable arrived in time.
    Timeout,
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::Mismatch(detail) => write!(f, "mismatch: {}", detail),
            RetryReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// Message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Radio
    Rx, // Radio -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving dump events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait DumpObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DumpEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DumpObserver for NullObserver {
    fn on_event(&self, _event: &DumpEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DumpObserver for TracingObserver {
    fn on_event(&self, event: &DumpEvent) {
        match event {
            DumpEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            DumpEvent::LineNoise { bytes } => {
                tracing::debug!(bytes, "Draining line");
            }
            DumpEvent::DeviceIdentified {
                version,
                has_aes_key,
                lock_screen,
                challenge,
            } => {
                tracing::info!(
                    version = %version,
                    aes_key = has_aes_key,
                    lock_screen = lock_screen,
                    "Device info"
                );
                tracing::info!(
                    "AES challenge: {:08x} {:08x} {:08x} {:08x}",
                    challenge[0],
                    challenge[1],
                    challenge[2],
                    challenge[3]
                );
            }
            DumpEvent::AccessResult {
                granted,
                error_code,
            } => {
                if *granted {
                    tracing::info!("Access granted");
                } else {
                    tracing::error!(code = error_code, "Access rejected");
                }
            }
            DumpEvent::Progress {
                offset, percent, ..
            } => {
                tracing::debug!(
                    offset = %format!("0x{:04X}", offset),
                    "Fetching data.. {}%",
                    percent
                );
            }
            DumpEvent::Retry {
                phase,
                reason,
                attempt,
            } => {
                tracing::warn!(phase = %phase, attempt, "Invalid response ({}), retrying", reason);
            }
            DumpEvent::Ignored { phase, msg_type } => {
                tracing::debug!(
                    phase = %phase,
                    msg_type = %format!("0x{:04X}", msg_type),
                    "Ignoring unexpected message"
                );
            }
            DumpEvent::FrameDiscarded { bytes, reason } => {
                tracing::debug!(bytes, reason = %reason, "Discarded receive bytes");
            }
            DumpEvent::Packet {
                direction,
                msg_type,
                length,
            } => {
                tracing::trace!(
                    dir = %direction,
                    msg_type = %format!("0x{:04X}", msg_type),
                    len = length,
                    "Message"
                );
            }
            DumpEvent::Complete { bytes } => {
                tracing::info!(bytes, "Dump complete");
            }
        }
    }
}

/// Percentage of a transfer done, `fetched * 100 / (fetched + remaining)`.
///
/// An empty transfer counts as done.
pub fn progress_percent(fetched: u32, remaining: u32) -> u32 {
    let total = fetched as u64 + remaining as u64;
    if total == 0 {
        return 100;
    }
    (fetched as u64 * 100 / total) as u32
}
