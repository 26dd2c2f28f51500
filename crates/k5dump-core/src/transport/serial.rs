//! serialport-based transport implementation.

use serialport::{SerialPort, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::traits::{ByteTransport, TransportError};

/// Serial connection to the radio's programming cable.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

/// One entry of [`SerialTransport::available_ports`].
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`, 8N1, no flow control.
    ///
    /// `read_timeout` bounds how long a single read blocks with no data.
    #[instrument(
        level = "info",
        skip(read_timeout),
        fields(timeout_ms = read_timeout.as_millis() as u64)
    )]
    pub fn open(
        path: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(path.to_string()),
                _ => TransportError::OpenFailed {
                    port: path.to_string(),
                    message: e.to_string(),
                },
            })?;

        info!(port = %path, baud = baud_rate, "Serial port opened");
        Ok(Self { port })
    }

    /// Enumerate serial ports visible to the OS.
    pub fn available_ports() -> Result<Vec<PortInfo>, TransportError> {
        let ports = serialport::available_ports().map_err(|e| TransportError::OpenFailed {
            port: "*".into(),
            message: e.to_string(),
        })?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let description = match p.port_type {
                    SerialPortType::UsbPort(usb) => format!(
                        "USB {:04X}:{:04X} {}",
                        usb.vid,
                        usb.pid,
                        usb.product.unwrap_or_default()
                    ),
                    SerialPortType::PciPort => "PCI".into(),
                    SerialPortType::BluetoothPort => "Bluetooth".into(),
                    SerialPortType::Unknown => "Unknown".into(),
                };
                PortInfo {
                    name: p.port_name,
                    description,
                }
            })
            .collect())
    }
}

impl ByteTransport for SerialTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        debug!(bytes_written = data.len(), "Write complete");
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port
            .flush()
            .map_err(|e| TransportError::FlushFailed(e.to_string()))
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(TransportError::Disconnected),
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }
}
