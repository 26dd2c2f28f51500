//! In-memory model of a K5 radio answering the dump exchange.
//!
//! Used by session tests to run the real driver end to end, with knobs for
//! the faults a serial link and a busy firmware produce.

use std::collections::{HashMap, VecDeque};

use super::traits::{ByteTransport, TransportError};
use crate::protocol::constants::*;
use crate::protocol::{
    AccessResponse, ChunkResponse, DeviceInfo, Message, StreamReassembler, make_frame,
};

/// Misbehaviour applied to one EEPROM read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFault {
    /// Echo an offset 16 bytes past the requested one.
    WrongOffset,
    /// Echo a chunk size of 8.
    WrongSize,
    /// Send a response too short to hold the payload.
    Truncated,
    /// Swallow the request without answering.
    Drop,
    /// Answer with a DeviceInfo response first, then the real chunk.
    StrayFirst,
    /// Send a corrupt frame first, then the real chunk.
    CorruptFirst,
    /// Send a frame whose length field claims 256 extra bytes, then the real chunk.
    CorruptLength,
}

#[derive(Debug)]
pub struct SimulatedRadio {
    eeprom: Vec<u8>,
    info: DeviceInfo,
    access_error: u8,
    rx: StreamReassembler,
    tx: VecDeque<u8>,
    max_read: usize,
    chunk_faults: HashMap<u16, VecDeque<ChunkFault>>,
    drop_requests: HashMap<u16, usize>,
    requests: Vec<Message>,
    fail_after_writes: Option<usize>,
    writes: usize,
}

impl SimulatedRadio {
    /// Radio with a recognisable EEPROM pattern and access granted.
    pub fn new() -> Self {
        let eeprom = (0..EEPROM_SIZE as usize)
            .map(|i| (i as u8) ^ ((i >> 8) as u8).wrapping_mul(31))
            .collect();
        Self {
            eeprom,
            info: DeviceInfo {
                version: "2.01.32".into(),
                has_aes_key: false,
                lock_screen: false,
                challenge: [0x1234_5678, 0x9ABC_DEF0, 0x0F0E_0D0C, 0x0302_0100],
            },
            access_error: 0,
            rx: StreamReassembler::default(),
            tx: VecDeque::new(),
            max_read: usize::MAX,
            chunk_faults: HashMap::new(),
            drop_requests: HashMap::new(),
            requests: Vec::new(),
            fail_after_writes: None,
            writes: 0,
        }
    }

    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn set_device_info(&mut self, info: DeviceInfo) {
        self.info = info;
    }

    /// Error code returned for the access request; non-zero denies.
    pub fn set_access_error(&mut self, code: u8) {
        self.access_error = code;
    }

    /// Cap the bytes returned per read to exercise partial reads.
    pub fn set_max_read(&mut self, max_read: usize) {
        self.max_read = max_read.max(1);
    }

    /// Bytes already on the line before the host says anything.
    pub fn push_noise(&mut self, bytes: &[u8]) {
        self.tx.extend(bytes);
    }

    /// Apply `fault` to the next request for `offset`. Faults queue up.
    pub fn add_chunk_fault(&mut self, offset: u16, fault: ChunkFault) {
        self.chunk_faults.entry(offset).or_default().push_back(fault);
    }

    /// Swallow the next `count` requests of `msg_type`.
    pub fn drop_requests(&mut self, msg_type: u16, count: usize) {
        *self.drop_requests.entry(msg_type).or_default() += count;
    }

    /// Fail every write after the first `writes` succeed.
    pub fn fail_after_writes(&mut self, writes: usize) {
        self.fail_after_writes = Some(writes);
    }

    /// Every request received, in order.
    pub fn requests(&self) -> &[Message] {
        &self.requests
    }

    pub fn requests_of(&self, msg_type: u16) -> impl Iterator<Item = &Message> {
        self.requests
            .iter()
            .filter(move |m| m.msg_type() == msg_type)
    }

    fn reply(&mut self, msg: &Message) {
        self.tx.extend(make_frame(msg.as_bytes()));
    }

    fn handle(&mut self, req: Message) {
        self.requests.push(req.clone());

        if let Some(n) = self.drop_requests.get_mut(&req.msg_type()) {
            if *n > 0 {
                *n -= 1;
                return;
            }
        }

        match req.msg_type() {
            MSG_DEVICE_INFO_REQ => {
                let resp = self.info.to_message();
                self.reply(&resp);
            }
            MSG_ACCESS_REQ => {
                let resp = AccessResponse {
                    error_code: self.access_error,
                }
                .to_message();
                self.reply(&resp);
            }
            MSG_READ_EEPROM_REQ => self.handle_read(&req),
            _ => {}
        }
    }

    fn handle_read(&mut self, req: &Message) {
        let offset = req.halfword(4);
        let start = offset as usize;
        let mut data = [0u8; CHUNK_SIZE];
        if start + CHUNK_SIZE <= self.eeprom.len() {
            data.copy_from_slice(&self.eeprom[start..start + CHUNK_SIZE]);
        }
        let mut chunk = ChunkResponse {
            offset,
            size: CHUNK_SIZE as u8,
            data,
        };

        let fault = self
            .chunk_faults
            .get_mut(&offset)
            .and_then(|q| q.pop_front());

        match fault {
            None => {}
            Some(ChunkFault::WrongOffset) => chunk.offset = offset.wrapping_add(CHUNK_SIZE as u16),
            Some(ChunkFault::WrongSize) => chunk.size = 8,
            Some(ChunkFault::Truncated) => {
                let short = Message::new(MSG_READ_EEPROM_RESP, 8).with_halfword(4, offset);
                self.reply(&short);
                return;
            }
            Some(ChunkFault::Drop) => return,
            Some(ChunkFault::StrayFirst) => {
                let stray = self.info.to_message();
                self.reply(&stray);
            }
            Some(ChunkFault::CorruptFirst) => {
                let mut bad = make_frame(chunk.to_message().as_bytes());
                bad[8] ^= 0x40;
                self.tx.extend(bad);
            }
            Some(ChunkFault::CorruptLength) => {
                let mut bad = make_frame(chunk.to_message().as_bytes());
                bad[3] ^= 0x01;
                self.tx.extend(bad);
            }
        }
        let resp = chunk.to_message();
        self.reply(&resp);
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteTransport for SimulatedRadio {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if let Some(limit) = self.fail_after_writes {
            if self.writes >= limit {
                return Err(TransportError::WriteFailed("simulated cable fault".into()));
            }
        }
        self.writes += 1;
        self.rx.feed(data);
        while let Some(req) = self.rx.try_extract() {
            self.handle(req);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = self.tx.len().min(buf.len()).min(self.max_read);
        for (slot, b) in buf.iter_mut().zip(self.tx.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}
