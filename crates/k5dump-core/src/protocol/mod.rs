//! Protocol module - K5 serial protocol definitions.

pub mod constants;
pub mod frame;
pub mod message;
pub mod messages;
pub mod reassembler;

pub use frame::{FrameCodec, FrameError, make_frame};
pub use message::Message;
pub use messages::{AccessResponse, ChallengeWords, ChunkResponse, DeviceInfo, ProtocolError};
pub use reassembler::StreamReassembler;
