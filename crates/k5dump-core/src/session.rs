//! Dump session - drives the state machine from link sync to saved dump.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::auth::{ChallengeResponder, ZeroResponder};
use crate::events::{DumpEvent, DumpObserver, DumpPhase, TracingObserver};
use crate::protocol::constants::DEFAULT_BAUD_RATE;
use crate::protocol::{FrameCodec, StreamReassembler};
use crate::region::Region;
use crate::sink::{DumpSink, FileSink};
use crate::state::handlers::StepContext;
use crate::state::machine::{Completion, RetryPolicy, SessionState, Step};
use crate::transport::{ByteTransport, SerialTransport, TransportError};

/// Configuration for a dump session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial device, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// EEPROM region to dump.
    pub region: Region,
    /// Dump file; defaults to `eeprom-<region>.bin`.
    pub output_path: Option<String>,
    /// Bound on a single blocking serial read.
    pub read_timeout_ms: u64,
    /// Resend a request after this long without an acceptable answer.
    pub response_timeout_ms: u64,
    /// Consecutive timeouts before giving up; 0 retries forever.
    pub max_timeouts: u32,
    /// Silence required after boot chatter before the handshake starts.
    pub link_quiet_ms: u64,
    /// Check the CRC of received frames.
    pub verify_crc: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            region: Region::default(),
            output_path: None,
            read_timeout_ms: 50,
            response_timeout_ms: 1000,
            max_timeouts: 5,
            link_quiet_ms: 200,
            verify_crc: true,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn output_path(&self) -> PathBuf {
        match &self.output_path {
            Some(p) => PathBuf::from(p),
            None => PathBuf::from(format!("eeprom-{}.bin", self.region)),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            max_timeouts: self.max_timeouts,
            link_quiet: Duration::from_millis(self.link_quiet_ms),
        }
    }

    pub fn frame_codec(&self) -> FrameCodec {
        FrameCodec::new(self.verify_crc)
    }
}

/// How a session that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpOutcome {
    /// The sink received the whole region.
    Written { bytes: usize },
    /// The radio refused access; nothing was written.
    AccessRejected { error_code: u8 },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to save dump: {0}")]
    Sink(#[source] std::io::Error),

    #[error("No serial port configured")]
    NoPort,
}

/// Dump session - owns region selection and drives the state machine.
pub struct DumpSession<O: DumpObserver> {
    config: SessionConfig,
    observer: Arc<O>,
    responder: Box<dyn ChallengeResponder>,
}

impl DumpSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: DumpObserver> DumpSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self {
            config,
            observer,
            responder: Box::new(ZeroResponder),
        }
    }

    /// Replace the placeholder challenge responder.
    pub fn with_responder(mut self, responder: impl ChallengeResponder + 'static) -> Self {
        self.responder = Box::new(responder);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open the configured serial port and dump into the configured file.
    #[instrument(skip(self), fields(region = %self.config.region))]
    pub fn run_serial(&self) -> Result<DumpOutcome, SessionError> {
        let port = self.config.port.as_deref().ok_or(SessionError::NoPort)?;
        let mut transport = SerialTransport::open(
            port,
            self.config.baud_rate,
            Duration::from_millis(self.config.read_timeout_ms),
        )?;
        let mut sink = FileSink::new(self.config.output_path());
        self.run(&mut transport, &mut sink)
    }

    /// Run the session to completion over `transport`.
    ///
    /// The sink is written once, only if the whole region was fetched.
    #[instrument(skip(self, transport, sink), fields(region = %self.config.region))]
    pub fn run<T: ByteTransport, S: DumpSink>(
        &self,
        transport: &mut T,
        sink: &mut S,
    ) -> Result<DumpOutcome, SessionError> {
        let range = self.config.region.range();
        info!(
            base = %format!("0x{:04X}", range.base()),
            size = %format!("0x{:04X}", range.size()),
            "Starting EEPROM dump"
        );

        let policy = self.config.retry_policy();
        let mut rx = StreamReassembler::new(self.config.frame_codec());
        let mut state = SessionState::default();
        let mut ctx = StepContext {
            transport,
            observer: self.observer.as_ref(),
            rx: &mut rx,
            policy: &policy,
            responder: self.responder.as_ref(),
            range,
        };

        loop {
            let step = match state.step(&mut ctx) {
                Ok(step) => step,
                Err(e) => {
                    warn!(phase = %state.phase(), error = %e, "Session aborted");
                    self.phase_changed(state.phase(), DumpPhase::Failed);
                    return Err(e.into());
                }
            };

            match step {
                Step::Continue => {}
                Step::TransitionTo(next) => {
                    self.phase_changed(state.phase(), next.phase());
                    state = next;
                }
                Step::Finished(Completion::Dumped(data)) => {
                    if let Err(e) = sink.persist(&data) {
                        self.phase_changed(state.phase(), DumpPhase::Failed);
                        return Err(SessionError::Sink(e));
                    }
                    self.observer.on_event(&DumpEvent::Complete { bytes: data.len() });
                    self.phase_changed(state.phase(), DumpPhase::Complete);
                    return Ok(DumpOutcome::Written { bytes: data.len() });
                }
                Step::Finished(Completion::AccessDenied { error_code }) => {
                    self.phase_changed(state.phase(), DumpPhase::Failed);
                    return Ok(DumpOutcome::AccessRejected { error_code });
                }
            }
        }
    }

    fn phase_changed(&self, from: DumpPhase, to: DumpPhase) {
        self.observer.on_event(&DumpEvent::PhaseChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RetryReason;
    use crate::protocol::{ChallengeWords, DeviceInfo};
    use crate::protocol::constants::*;
    use crate::transport::{ChunkFault, SimulatedRadio};
    use std::sync::Mutex;

    /// Observer that keeps every event for inspection.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<DumpEvent>>,
    }

    impl DumpObserver for Recorder {
        fn on_event(&self, event: &DumpEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    impl Recorder {
        fn phases(&self) -> Vec<DumpPhase> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    DumpEvent::PhaseChanged { to, .. } => Some(*to),
                    _ => None,
                })
                .collect()
        }

        fn retries(&self) -> Vec<RetryReason> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    DumpEvent::Retry { reason, .. } => Some(reason.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    fn config(region: Region) -> SessionConfig {
        SessionConfig {
            region,
            link_quiet_ms: 0,
            response_timeout_ms: 60_000,
            ..Default::default()
        }
    }

    fn session(region: Region) -> (DumpSession<Recorder>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (
            DumpSession::with_observer(config(region), recorder.clone()),
            recorder,
        )
    }

    fn chunk_requests(radio: &SimulatedRadio) -> Vec<u16> {
        radio
            .requests_of(MSG_READ_EEPROM_REQ)
            .map(|m| m.halfword(4))
            .collect()
    }

    #[test]
    fn test_config_region_takes_1920_round_trips() {
        let (session, recorder) = session(Region::Config);
        let mut radio = SimulatedRadio::new();
        let mut sink = Vec::new();

        let outcome = session.run(&mut radio, &mut sink).unwrap();

        assert_eq!(outcome, DumpOutcome::Written { bytes: 0x1E00 });
        assert_eq!(chunk_requests(&radio).len(), 0x1E00 / 16);
        assert_eq!(sink, radio.eeprom()[..0x1E00]);
        assert_eq!(
            recorder.phases(),
            vec![
                DumpPhase::DeviceInfo,
                DumpPhase::AccessRequest,
                DumpPhase::DumpEeprom,
                DumpPhase::Complete
            ]
        );
    }

    #[test]
    fn test_calib_and_all_regions() {
        for (region, range) in [(Region::Calib, 0x1E00..0x2000), (Region::All, 0..0x2000)] {
            let (session, _) = session(region);
            let mut radio = SimulatedRadio::new();
            let mut sink = Vec::new();
            let outcome = session.run(&mut radio, &mut sink).unwrap();

            assert_eq!(outcome, DumpOutcome::Written { bytes: range.len() });
            assert_eq!(sink, radio.eeprom()[range.clone()]);
            let offsets = chunk_requests(&radio);
            let expected: Vec<u16> = range.step_by(16).map(|o| o as u16).collect();
            assert_eq!(offsets, expected, "{region}");
        }
    }

    #[test]
    fn test_access_rejected_performs_no_chunk_requests() {
        let (session, recorder) = session(Region::Config);
        let mut radio = SimulatedRadio::new();
        radio.set_access_error(1);
        let mut sink = vec![0xEE];

        let outcome = session.run(&mut radio, &mut sink).unwrap();

        assert_eq!(outcome, DumpOutcome::AccessRejected { error_code: 1 });
        assert_eq!(chunk_requests(&radio).len(), 0);
        assert_eq!(radio.requests_of(MSG_ACCESS_REQ).count(), 1);
        assert_eq!(sink, vec![0xEE], "sink untouched");
        assert_eq!(recorder.phases().last(), Some(&DumpPhase::Failed));
    }

    #[test]
    fn test_mismatched_chunks_are_refetched() {
        let (session, recorder) = session(Region::Calib);
        let mut radio = SimulatedRadio::new();
        radio.add_chunk_fault(0x1E20, ChunkFault::WrongOffset);
        radio.add_chunk_fault(0x1E20, ChunkFault::WrongSize);
        radio.add_chunk_fault(0x1F00, ChunkFault::Truncated);
        let mut sink = Vec::new();

        let outcome = session.run(&mut radio, &mut sink).unwrap();

        assert_eq!(outcome, DumpOutcome::Written { bytes: 0x200 });
        assert_eq!(sink, radio.eeprom()[0x1E00..0x2000]);
        assert_eq!(chunk_requests(&radio).len(), 0x200 / 16 + 3);

        // Resends repeat the original request byte for byte.
        let to_1e20: Vec<_> = radio
            .requests_of(MSG_READ_EEPROM_REQ)
            .filter(|m| m.halfword(4) == 0x1E20)
            .collect();
        assert_eq!(to_1e20.len(), 3);
        assert!(to_1e20.iter().all(|m| *m == to_1e20[0]));
        assert_eq!(recorder.retries().len(), 3);
    }

    #[test]
    fn test_noise_stray_and_corrupt_frames_are_tolerated() {
        let (session, recorder) = session(Region::Calib);
        let mut radio = SimulatedRadio::new();
        radio.push_noise(&[0x00, 0xAB, 0x13, 0x37]);
        radio.add_chunk_fault(0x1E40, ChunkFault::StrayFirst);
        radio.add_chunk_fault(0x1E80, ChunkFault::CorruptFirst);
        radio.add_chunk_fault(0x1E00, ChunkFault::CorruptLength);
        radio.set_max_read(5);
        let mut sink = Vec::new();

        let outcome = session.run(&mut radio, &mut sink).unwrap();

        assert_eq!(outcome, DumpOutcome::Written { bytes: 0x200 });
        assert_eq!(sink, radio.eeprom()[0x1E00..0x2000]);
        // Neither a stray message nor a corrupt frame causes a resend.
        assert_eq!(chunk_requests(&radio).len(), 0x200 / 16);
        assert!(recorder.retries().is_empty());
        let events = recorder.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, DumpEvent::LineNoise { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            DumpEvent::Ignored {
                msg_type: MSG_DEVICE_INFO_RESP,
                ..
            }
        )));
        assert!(events.iter().any(|e| matches!(e, DumpEvent::FrameDiscarded { .. })));
    }

    #[test]
    fn test_inflated_length_field_does_not_stall_session() {
        let recorder = Arc::new(Recorder::default());
        let cfg = SessionConfig {
            response_timeout_ms: 0,
            ..config(Region::Calib)
        };
        let session = DumpSession::with_observer(cfg, recorder.clone());
        let mut radio = SimulatedRadio::new();
        radio.add_chunk_fault(0x1E00, ChunkFault::CorruptLength);
        radio.add_chunk_fault(0x1E40, ChunkFault::CorruptLength);
        let mut sink = Vec::new();

        let outcome = session.run(&mut radio, &mut sink).unwrap();

        assert_eq!(outcome, DumpOutcome::Written { bytes: 0x200 });
        assert_eq!(sink, radio.eeprom()[0x1E00..0x2000]);
        assert_eq!(chunk_requests(&radio).len(), 0x200 / 16);
        assert!(recorder.retries().is_empty());
        let discarded: usize = recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                DumpEvent::FrameDiscarded { bytes, .. } => Some(*bytes),
                _ => None,
            })
            .sum();
        assert_eq!(discarded, 2 * (READ_EEPROM_RESP_SIZE + FRAME_OVERHEAD));
    }

    #[test]
    fn test_device_info_reaches_observer_and_responder() {
        let recorder = Arc::new(Recorder::default());
        let session = DumpSession::with_observer(config(Region::Calib), recorder.clone())
            .with_responder(|c: &ChallengeWords| c.map(|w| w.rotate_left(8)));
        let mut radio = SimulatedRadio::new();
        let info = DeviceInfo {
            version: "2.01.31".into(),
            has_aes_key: true,
            lock_screen: true,
            challenge: [0x0102_0304, 0x0506_0708, 0x090A_0B0C, 0x0D0E_0F10],
        };
        radio.set_device_info(info.clone());

        session.run(&mut radio, &mut Vec::<u8>::new()).unwrap();

        let types: Vec<u16> = radio
            .requests()
            .iter()
            .take(3)
            .map(|m| m.msg_type())
            .collect();
        assert_eq!(types, [MSG_DEVICE_INFO_REQ, MSG_ACCESS_REQ, MSG_READ_EEPROM_REQ]);
        let access = &radio.requests()[1];
        assert_eq!(access.word(4), 0x0203_0401);
        assert_eq!(access.word(16), 0x0E0F_100D);

        let events = recorder.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            DumpEvent::DeviceIdentified {
                version,
                has_aes_key: true,
                lock_screen: true,
                challenge,
            } if version == "2.01.31" && *challenge == info.challenge
        )));
    }

    #[test]
    fn test_timeout_resends_then_recovers() {
        let recorder = Arc::new(Recorder::default());
        let cfg = SessionConfig {
            response_timeout_ms: 0,
            max_timeouts: 0,
            ..config(Region::Calib)
        };
        let session = DumpSession::with_observer(cfg, recorder.clone());
        let mut radio = SimulatedRadio::new();
        radio.drop_requests(MSG_DEVICE_INFO_REQ, 2);
        radio.add_chunk_fault(0x1E00, ChunkFault::Drop);
        let mut sink = Vec::new();

        let outcome = session.run(&mut radio, &mut sink).unwrap();

        assert_eq!(outcome, DumpOutcome::Written { bytes: 0x200 });
        assert_eq!(radio.requests_of(MSG_DEVICE_INFO_REQ).count(), 3);
        assert_eq!(chunk_requests(&radio).len(), 0x200 / 16 + 1);
        assert_eq!(chunk_requests(&radio)[..2], [0x1E00, 0x1E00]);
        assert!(recorder.retries().iter().all(|r| *r == RetryReason::Timeout));
    }

    #[test]
    fn test_silent_radio_is_a_transport_failure() {
        let cfg = SessionConfig {
            response_timeout_ms: 0,
            max_timeouts: 3,
            ..config(Region::Config)
        };
        let recorder = Arc::new(Recorder::default());
        let session = DumpSession::with_observer(cfg, recorder.clone());
        let mut radio = SimulatedRadio::new();
        radio.drop_requests(MSG_DEVICE_INFO_REQ, usize::MAX);
        let mut sink = Vec::new();

        let err = session.run(&mut radio, &mut sink).unwrap_err();

        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Timeout { attempts: 3, .. })
        ));
        assert_eq!(radio.requests_of(MSG_DEVICE_INFO_REQ).count(), 3);
        assert!(sink.is_empty());
        assert_eq!(recorder.phases().last(), Some(&DumpPhase::Failed));
    }

    #[test]
    fn test_write_failure_aborts_without_output() {
        let (session, _) = session(Region::Config);
        let mut radio = SimulatedRadio::new();
        radio.fail_after_writes(10);
        let mut sink = Vec::new();

        let err = session.run(&mut radio, &mut sink).unwrap_err();

        assert!(matches!(
            err,
            SessionError::Transport(TransportError::WriteFailed(_))
        ));
        assert!(sink.is_empty());
        assert_eq!(chunk_requests(&radio).len(), 8);
    }

    #[test]
    fn test_sink_failure_is_reported() {
        struct Broken;
        impl DumpSink for Broken {
            fn persist(&mut self, _data: &[u8]) -> std::io::Result<()> {
                Err(std::io::Error::other("disk full"))
            }
        }

        let (session, _) = session(Region::Calib);
        let mut radio = SimulatedRadio::new();
        let err = session.run(&mut radio, &mut Broken).unwrap_err();
        assert!(matches!(err, SessionError::Sink(_)));
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let (session, recorder) = session(Region::Calib);
        let mut radio = SimulatedRadio::new();
        session.run(&mut radio, &mut Vec::<u8>::new()).unwrap();

        let percents: Vec<u32> = recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                DumpEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents.first(), Some(&0));
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = std::env::temp_dir().join(format!("k5dump-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("k5dump.toml");

        let cfg = SessionConfig {
            port: Some("/dev/ttyUSB0".into()),
            region: Region::All,
            verify_crc: false,
            ..Default::default()
        };
        cfg.save_to_file(&path).unwrap();
        let loaded = SessionConfig::load_from_file(&path).unwrap();

        assert_eq!(loaded.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(loaded.region, Region::All);
        assert!(!loaded.verify_crc);
        assert_eq!(loaded.baud_rate, DEFAULT_BAUD_RATE);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: SessionConfig = toml::from_str("region = \"calib\"\n").unwrap();
        assert_eq!(cfg.region, Region::Calib);
        assert_eq!(cfg.max_timeouts, 5);
        assert_eq!(cfg.output_path(), PathBuf::from("eeprom-calib.bin"));
    }
}
