//! Access challenge responders.
//!
//! The radio issues a 4-word AES challenge in its DeviceInfo response and
//! expects a 16-byte answer in the access request. The real computation is
//! not available here; [`ZeroResponder`] answers four zero words, which is
//! only accepted by radios configured without an AES key.

use crate::protocol::ChallengeWords;

pub trait ChallengeResponder: Send + Sync {
    fn respond(&self, challenge: &ChallengeWords) -> ChallengeWords;
}

/// Answers every challenge with zeros.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroResponder;

impl ChallengeResponder for ZeroResponder {
    fn respond(&self, _challenge: &ChallengeWords) -> ChallengeWords {
        [0; 4]
    }
}

impl<F> ChallengeResponder for F
where
    F: Fn(&ChallengeWords) -> ChallengeWords + Send + Sync,
{
    fn respond(&self, challenge: &ChallengeWords) -> ChallengeWords {
        self(challenge)
    }
}
