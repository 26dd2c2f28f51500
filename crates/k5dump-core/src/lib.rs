//! k5dump-core: EEPROM dump protocol for Quansheng UV-K5 class radios.
//!
//! Talks to the radio's bootloader-less programming mode over a serial link
//! and reads back the configuration and calibration EEPROM.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Message types, framing/obfuscation codec, stream reassembly
//! - **Transport**: Byte-stream abstraction (serial, mock, simulated radio)
//! - **State**: LinkSync/DeviceInfo/AccessRequest/DumpEeprom state machine
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator and configuration
//! - **Region / Sink**: What to dump and where it ends up
//!
//! # Example
//!
//! ```no_run
//! use k5dump_core::region::Region;
//! use k5dump_core::session::{DumpSession, SessionConfig};
//!
//! let config = SessionConfig {
//!     port: Some("/dev/ttyUSB0".to_string()),
//!     region: Region::Calib,
//!     ..Default::default()
//! };
//!
//! let session = DumpSession::new(config);
//! session.run_serial().expect("dump failed");
//! ```

pub mod auth;
pub mod events;
pub mod protocol;
pub mod region;
pub mod session;
pub mod sink;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use auth::{ChallengeResponder, ZeroResponder};
pub use events::{DumpEvent, DumpObserver, DumpPhase, NullObserver, TracingObserver};
pub use protocol::{FrameCodec, Message, StreamReassembler};
pub use region::{AddressRange, RangeError, Region};
pub use session::{DumpOutcome, DumpSession, SessionConfig, SessionError};
pub use sink::{DumpSink, FileSink};
pub use transport::{
    ByteTransport, MockTransport, SerialTransport, SimulatedRadio, TransportError,
};
