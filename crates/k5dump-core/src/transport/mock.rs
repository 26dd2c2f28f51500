//! Mock transport for testing.

use std::collections::VecDeque;

use super::traits::{ByteTransport, TransportError};
use crate::protocol::{Message, make_frame};

/// Scripted transport for unit testing receive and state logic.
#[derive(Debug)]
pub struct MockTransport {
    /// Queued chunks returned by successive reads.
    read_queue: VecDeque<Vec<u8>>,
    /// Captured writes.
    write_log: Vec<Vec<u8>>,
    flushes: usize,
    /// Whether the link is "connected".
    connected: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            read_queue: VecDeque::new(),
            write_log: Vec::new(),
            flushes: 0,
            connected: true,
        }
    }

    /// Queue raw bytes returned by one future read.
    pub fn queue_read(&mut self, bytes: &[u8]) {
        self.read_queue.push_back(bytes.to_vec());
    }

    /// Queue a framed message returned by one future read.
    pub fn queue_message(&mut self, msg: &Message) {
        self.queue_read(&make_frame(msg.as_bytes()));
    }

    pub fn pending_reads(&self) -> usize {
        self.read_queue.len()
    }

    /// Get all captured writes.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.write_log
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Simulate cable unplug.
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn reconnect(&mut self) {
        self.connected = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteTransport for MockTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        self.write_log.push(data.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        self.flushes += 1;
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        let Some(mut chunk) = self.read_queue.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunk.drain(..n);
            self.read_queue.push_front(chunk);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_queue() {
        let mut mock = MockTransport::new();
        mock.queue_read(b"Hello");
        mock.queue_read(b"World!");

        let mut buf = [0u8; 4];
        assert_eq!(mock.read_into(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"Hell");
        assert_eq!(mock.read_into(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'o');
        assert_eq!(mock.read_into(&mut buf).unwrap(), 4);
        assert_eq!(mock.read_into(&mut buf).unwrap(), 2);

        // Queue is empty now
        assert_eq!(mock.read_into(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_mock_write_capture() {
        let mut mock = MockTransport::new();
        mock.write(b"Hello").unwrap();
        mock.write(b"World").unwrap();
        mock.flush().unwrap();

        let writes = mock.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
        assert_eq!(mock.flushes(), 1);
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockTransport::new();
        mock.disconnect();
        assert!(matches!(mock.write(b"test"), Err(TransportError::Disconnected)));
        assert!(mock.read_into(&mut [0u8; 8]).is_err());

        mock.reconnect();
        assert!(mock.write(b"test").is_ok());
    }
}
