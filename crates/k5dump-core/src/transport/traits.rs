//! Byte transport abstraction.
//!
//! Defines the `ByteTransport` trait for the serial link,
//! allowing different implementations (serialport, mock, simulated radio).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    #[error("Failed to open {port}: {message}")]
    OpenFailed { port: String, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("No response after {attempts} attempts of {timeout_ms}ms")]
    Timeout { timeout_ms: u64, attempts: u32 },
}

/// Duplex byte stream to the radio.
///
/// Reads are best effort: `read_into` returns as soon as some bytes are
/// available or the implementation's read bound expires. `Ok(0)` means
/// nothing is available right now and is not an error.
pub trait ByteTransport {
    /// Queue bytes for transmission.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Push queued bytes onto the wire.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Read whatever is available into `buf`, returning the count.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

impl<T: ByteTransport + ?Sized> ByteTransport for &mut T {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read_into(buf)
    }
}
