//! Transport layer module.

pub mod mock;
pub mod serial;
pub mod sim;
pub mod traits;

pub use mock::MockTransport;
pub use serial::{PortInfo, SerialTransport};
pub use sim::{ChunkFault, SimulatedRadio};
pub use traits::{ByteTransport, TransportError};
