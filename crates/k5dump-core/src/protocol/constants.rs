//! Wire constants for the K5 serial protocol.

// Message types
pub const MSG_DEVICE_INFO_REQ: u16 = 0x0514;
pub const MSG_DEVICE_INFO_RESP: u16 = 0x0515;
pub const MSG_READ_EEPROM_REQ: u16 = 0x051B;
pub const MSG_READ_EEPROM_RESP: u16 = 0x051C;
pub const MSG_ACCESS_REQ: u16 = 0x052D;
pub const MSG_ACCESS_RESP: u16 = 0x052E;

// Message sizes (requests are exact, responses are minimums)
pub const DEVICE_INFO_REQ_SIZE: usize = 8;
pub const DEVICE_INFO_RESP_SIZE: usize = 40;
pub const ACCESS_REQ_SIZE: usize = 20;
pub const ACCESS_RESP_SIZE: usize = 5;
pub const READ_EEPROM_REQ_SIZE: usize = 12;
pub const READ_EEPROM_RESP_SIZE: usize = 24;

/// Offset of the message type halfword inside every message.
pub const MSG_TYPE_OFFSET: usize = 0;

/// Version string window inside a DeviceInfo response.
pub const VERSION_OFFSET: usize = 4;
pub const VERSION_LEN: usize = 16;

/// Bytes transferred per EEPROM read request.
pub const CHUNK_SIZE: usize = 16;

// EEPROM layout
pub const EEPROM_SIZE: u32 = 0x2000;
pub const CALIB_BASE: u32 = 0x1E00;

// Frame wrapper
pub const FRAME_HEADER: [u8; 2] = [0xAB, 0xCD];
pub const FRAME_FOOTER: [u8; 2] = [0xDC, 0xBA];
pub const FRAME_LEN_FIELD: usize = 2;
pub const FRAME_CRC_LEN: usize = 2;
/// Header + length + crc + footer.
pub const FRAME_OVERHEAD: usize = 8;
pub const MIN_PAYLOAD_LEN: usize = 2;
pub const MAX_PAYLOAD_LEN: usize = 512;

/// XOR key applied to payload and CRC on the wire.
pub const OBFUSCATION_KEY: [u8; 16] = [
    0x16, 0x6C, 0x14, 0xE6, 0x2E, 0x91, 0x0D, 0x40, 0x21, 0x35, 0xD5, 0x40, 0x13, 0x03, 0xE9, 0x80,
];

// Serial defaults
pub const DEFAULT_BAUD_RATE: u32 = 38400;
pub const READ_BUFFER_SIZE: usize = 256;
/// Upper bound on unconsumed receive backlog.
pub const MAX_PENDING_BYTES: usize = 4096;

/// Human readable name of a message type, for logs.
pub fn msg_type_name(msg_type: u16) -> &'static str {
    match msg_type {
        MSG_DEVICE_INFO_REQ => "DeviceInfoReq",
        MSG_DEVICE_INFO_RESP => "DeviceInfo",
        MSG_READ_EEPROM_REQ => "ReadEepromReq",
        MSG_READ_EEPROM_RESP => "ReadEeprom",
        MSG_ACCESS_REQ => "AccessReq",
        MSG_ACCESS_RESP => "Access",
        _ => "Unknown",
    }
}
