//! Application-level message buffer.
//!
//! A [`Message`] is a fixed-length byte buffer with little-endian field
//! accessors. The buffer is never resized after construction. Field accesses
//! outside the buffer are programming errors and panic.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use std::ops::Range;

use super::constants::{MSG_TYPE_OFFSET, msg_type_name};

#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    buf: Vec<u8>,
}

impl Message {
    /// Zero-filled message of `size` bytes with `msg_type` at offset 0.
    pub fn new(msg_type: u16, size: usize) -> Self {
        let mut msg = Self { buf: vec![0; size] };
        msg.set_halfword(MSG_TYPE_OFFSET, msg_type);
        msg
    }

    /// Wrap a received payload for typed reads.
    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn msg_type(&self) -> u16 {
        self.halfword(MSG_TYPE_OFFSET)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn byte(&self, offset: usize) -> u8 {
        self.buf[offset]
    }

    pub fn halfword(&self, offset: usize) -> u16 {
        LittleEndian::read_u16(&self.buf[offset..offset + 2])
    }

    pub fn word(&self, offset: usize) -> u32 {
        LittleEndian::read_u32(&self.buf[offset..offset + 4])
    }

    pub fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    /// ASCII text in `offset..offset + window`, cut at the first NUL.
    ///
    /// Without a NUL the whole window is returned. Non-ASCII bytes are
    /// replaced rather than rejected.
    pub fn ascii(&self, offset: usize, window: usize) -> String {
        let field = &self.buf[offset..offset + window];
        let end = field.iter().position(|&b| b == 0).unwrap_or(window);
        field[..end]
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect()
    }

    pub fn set_byte(&mut self, offset: usize, value: u8) {
        self.buf[offset] = value;
    }

    pub fn set_halfword(&mut self, offset: usize, value: u16) {
        LittleEndian::write_u16(&mut self.buf[offset..offset + 2], value);
    }

    pub fn set_word(&mut self, offset: usize, value: u32) {
        LittleEndian::write_u32(&mut self.buf[offset..offset + 4], value);
    }

    pub fn set_bytes(&mut self, offset: usize, data: &[u8]) {
        self.buf[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn with_byte(mut self, offset: usize, value: u8) -> Self {
        self.set_byte(offset, value);
        self
    }

    pub fn with_halfword(mut self, offset: usize, value: u16) -> Self {
        self.set_halfword(offset, value);
        self
    }

    pub fn with_word(mut self, offset: usize, value: u32) -> Self {
        self.set_word(offset, value);
        self
    }

    pub fn with_bytes(mut self, offset: usize, data: &[u8]) -> Self {
        self.set_bytes(offset, data);
        self
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.buf.len() < 2 {
            return write!(f, "Message({:02X?})", self.buf);
        }
        write!(
            f,
            "Message({:04X} {}, {} bytes)",
            self.msg_type(),
            msg_type_name(self.msg_type()),
            self.buf.len()
        )
    }
}
