//! Typed requests and responses of the EEPROM dump exchange.

use thiserror::Error;

use super::constants::*;
use super::message::Message;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unexpected message type: expected 0x{expected:04X}, got 0x{actual:04X}")]
    UnexpectedType { expected: u16, actual: u16 },
    #[error("Response 0x{msg_type:04X} truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        msg_type: u16,
        expected: usize,
        actual: usize,
    },
}

fn check(msg: &Message, msg_type: u16, min_len: usize) -> Result<(), ProtocolError> {
    if msg.len() < MSG_TYPE_OFFSET + 2 || msg.msg_type() != msg_type {
        return Err(ProtocolError::UnexpectedType {
            expected: msg_type,
            actual: if msg.len() >= 2 { msg.msg_type() } else { 0 },
        });
    }
    if msg.len() < min_len {
        return Err(ProtocolError::Truncated {
            msg_type,
            expected: min_len,
            actual: msg.len(),
        });
    }
    Ok(())
}

/// Four 32-bit words, used both for the AES challenge and its response.
pub type ChallengeWords = [u32; 4];

pub fn device_info_request(timestamp: u32) -> Message {
    Message::new(MSG_DEVICE_INFO_REQ, DEVICE_INFO_REQ_SIZE).with_word(4, timestamp)
}

pub fn access_request(response: &ChallengeWords) -> Message {
    let mut msg = Message::new(MSG_ACCESS_REQ, ACCESS_REQ_SIZE);
    for (i, &w) in response.iter().enumerate() {
        msg.set_word(4 + i * 4, w);
    }
    msg
}

pub fn read_eeprom_request(offset: u16, timestamp: u32) -> Message {
    Message::new(MSG_READ_EEPROM_REQ, READ_EEPROM_REQ_SIZE)
        .with_halfword(4, offset)
        .with_halfword(6, CHUNK_SIZE as u16)
        .with_word(8, timestamp)
}

/// Snapshot of a DeviceInfo (0x0515) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub version: String,
    pub has_aes_key: bool,
    pub lock_screen: bool,
    pub challenge: ChallengeWords,
}

impl DeviceInfo {
    pub fn parse(msg: &Message) -> Result<Self, ProtocolError> {
        check(msg, MSG_DEVICE_INFO_RESP, DEVICE_INFO_RESP_SIZE)?;
        Ok(Self {
            version: msg.ascii(VERSION_OFFSET, VERSION_LEN),
            has_aes_key: msg.byte(20) != 0,
            lock_screen: msg.byte(21) != 0,
            challenge: [msg.word(24), msg.word(28), msg.word(32), msg.word(36)],
        })
    }

    /// Encode as the device would send it.
    pub fn to_message(&self) -> Message {
        let mut msg = Message::new(MSG_DEVICE_INFO_RESP, DEVICE_INFO_RESP_SIZE);
        let version = self.version.as_bytes();
        msg.set_bytes(VERSION_OFFSET, &version[..version.len().min(VERSION_LEN)]);
        msg.set_byte(20, self.has_aes_key as u8);
        msg.set_byte(21, self.lock_screen as u8);
        for (i, &w) in self.challenge.iter().enumerate() {
            msg.set_word(24 + i * 4, w);
        }
        msg
    }
}

/// Access (0x052E) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessResponse {
    pub error_code: u8,
}

impl AccessResponse {
    pub fn parse(msg: &Message) -> Result<Self, ProtocolError> {
        check(msg, MSG_ACCESS_RESP, ACCESS_RESP_SIZE)?;
        Ok(Self {
            error_code: msg.byte(4),
        })
    }

    pub fn granted(&self) -> bool {
        self.error_code == 0
    }

    pub fn to_message(&self) -> Message {
        Message::new(MSG_ACCESS_RESP, 8).with_byte(4, self.error_code)
    }
}

/// ReadEeprom (0x051C) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResponse {
    pub offset: u16,
    pub size: u8,
    pub data: [u8; CHUNK_SIZE],
}

impl ChunkResponse {
    pub fn parse(msg: &Message) -> Result<Self, ProtocolError> {
        check(msg, MSG_READ_EEPROM_RESP, READ_EEPROM_RESP_SIZE)?;
        let mut data = [0u8; CHUNK_SIZE];
        data.copy_from_slice(msg.bytes(8..8 + CHUNK_SIZE));
        Ok(Self {
            offset: msg.halfword(4),
            size: msg.byte(6),
            data,
        })
    }

    /// Whether this response answers a request for `offset`.
    pub fn matches(&self, offset: u16) -> bool {
        self.offset == offset && self.size as usize == CHUNK_SIZE
    }

    pub fn to_message(&self) -> Message {
        Message::new(MSG_READ_EEPROM_RESP, READ_EEPROM_RESP_SIZE)
            .with_halfword(4, self.offset)
            .with_byte(6, self.size)
            .with_bytes(8, &self.data)
    }
}
