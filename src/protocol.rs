use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// Linux input event types
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;

// Event codes
pub const SYN_REPORT: u16 = 0x00;
pub const REL_X: u16 = 0x00;
pub const REL_Y: u16 = 0x01;
pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;

/// Kind of an input event; decides how `code` and `value` are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum EventType {
    Sync = EV_SYN,
    Key = EV_KEY,
    Relative = EV_REL,
    Absolute = EV_ABS,
}

impl EventType {
    /// Every type the virtual device registers as a capability.
    pub const ALL: [EventType; 4] = [
        EventType::Key,
        EventType::Relative,
        EventType::Absolute,
        EventType::Sync,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            EV_SYN => Some(EventType::Sync),
            EV_KEY => Some(EventType::Key),
            EV_REL => Some(EventType::Relative),
            EV_ABS => Some(EventType::Absolute),
            _ => None,
        }
    }
}

/// A single input event without timestamp.
///
/// This is both what gets written to the uinput device and what a client
/// sends to the daemon. On the wire a record is `type: u16`, `code: u16`,
/// `value: i32` in native byte order with no padding and no framing, the same
/// bytes a C client produces by writing the equivalent struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: EventType,
    pub code: u16,
    pub value: i32,
}

impl EventRecord {
    pub const WIRE_SIZE: usize = 8;

    pub fn new(event_type: EventType, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
        }
    }

    pub fn key(code: u16, value: i32) -> Self {
        Self::new(EventType::Key, code, value)
    }

    /// The SYN_REPORT marker that commits preceding events
    pub fn sync() -> Self {
        Self::new(EventType::Sync, SYN_REPORT, 0)
    }

    pub fn is_sync(&self) -> bool {
        self.event_type == EventType::Sync && self.code == SYN_REPORT
    }

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0..2].copy_from_slice(&self.event_type.code().to_ne_bytes());
        buf[2..4].copy_from_slice(&self.code.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.value.to_ne_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::WIRE_SIZE]) -> Result<Self> {
        let raw_type = u16::from_ne_bytes([buf[0], buf[1]]);
        let code = u16::from_ne_bytes([buf[2], buf[3]]);
        let value = i32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]);

        let event_type = EventType::from_code(raw_type)
            .ok_or_else(|| Error::Protocol(format!("unsupported event type 0x{:04x}", raw_type)))?;

        Ok(Self::new(event_type, code, value))
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} code={} value={}",
            self.event_type, self.code, self.value
        )
    }
}
