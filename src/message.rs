//! Message variants and the 77-bit payload they are packed into.

use std::fmt;

use crate::constant::*;
use crate::error::Result;
use crate::hash::CallsignHashTable;
use crate::pack::{encode_message, parse_message};
use crate::text::int_to_dd;
use crate::unpack::decode_message;

/// 77 bits of source-encoded message, MSB first. The last 3 bits of byte 9 are unused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Payload(pub [u8; FTX_PAYLOAD_BYTES]);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8; FTX_PAYLOAD_BYTES] {
        &self.0
    }

    /// Stores the low `width` bits of `value` at bit offset `start`.
    pub fn write_bits(&mut self, start: usize, width: usize, value: u128) {
        debug_assert!(start + width <= FTX_PAYLOAD_BITS);
        for i in 0..width {
            let pos = start + i;
            let mask = 0x80u8 >> (pos % 8);
            if (value >> (width - 1 - i)) & 1 != 0 {
                self.0[pos / 8] |= mask;
            } else {
                self.0[pos / 8] &= !mask;
            }
        }
    }

    pub fn read_bits(&self, start: usize, width: usize) -> u128 {
        debug_assert!(start + width <= FTX_PAYLOAD_BITS);
        (start..start + width).fold(0u128, |acc, pos| {
            (acc << 1) | ((self.0[pos / 8] >> (7 - pos % 8)) & 1) as u128
        })
    }

    /// Message type, bits 74..76
    pub fn i3(&self) -> u8 {
        self.read_bits(74, 3) as u8
    }

    /// Message subtype for i3 = 0, bits 71..73
    pub fn n3(&self) -> u8 {
        self.read_bits(71, 3) as u8
    }
}

/// Contents of a 28-bit callsign field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    De,
    Qrz,
    Cq,
    /// "CQ 123": three digit directed CQ
    CqNumber(u16),
    /// "CQ DX": up to four letters
    CqModifier(String),
    /// 22-bit hash standing in for a callsign that doesn't fit the field.
    /// `call` is known when encoding, or when the hash table resolves it.
    Hashed { hash: u32, call: Option<String> },
    /// Standard callsign without any /R or /P suffix
    Standard(String),
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::De => f.write_str("DE"),
            Call::Qrz => f.write_str("QRZ"),
            Call::Cq => f.write_str("CQ"),
            Call::CqNumber(n) => write!(f, "CQ {:03}", n),
            Call::CqModifier(m) => write!(f, "CQ {}", m),
            Call::Hashed { call: Some(call), .. } => write!(f, "<{}>", call),
            Call::Hashed { call: None, .. } => f.write_str("<...>"),
            Call::Standard(call) => f.write_str(call),
        }
    }
}

/// Grid, report or acknowledgement following the two calls of a standard message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extra {
    None,
    Grid(String),
    Report(i32),
    Rrr,
    Rr73,
    Seventy3,
}

/// Closing acknowledgement of a non-standard message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    None,
    Rrr,
    Rr73,
    Seventy3,
}

impl Reply {
    pub fn as_str(self) -> &'static str {
        match self {
            Reply::None => "",
            Reply::Rrr => "RRR",
            Reply::Rr73 => "RR73",
            Reply::Seventy3 => "73",
        }
    }
}

/// Type 1 and type 2 messages: two 28-bit calls, an optional grid or report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StandardMessage {
    pub call_to: Call,
    pub to_suffix: bool,
    pub call_de: Call,
    pub de_suffix: bool,
    /// Suffixes read "/P" (type 2) instead of "/R" (type 1)
    pub portable: bool,
    /// "R" acknowledgement in front of the grid or report
    pub ack: bool,
    pub extra: Extra,
}

/// Type 4 message: one callsign of up to 11 characters sent in full,
/// the other reduced to a 12-bit hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NonStandardMessage {
    pub call: String,
    pub hash12: u16,
    pub hashed_call: Option<String>,
    /// The full callsign comes first in the text
    pub call_first: bool,
    pub cq: bool,
    pub reply: Reply,
}

/// 71 raw bits, shown as 18 hex digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Telemetry(pub u128);

impl Telemetry {
    pub const BITS: usize = 71;

    pub fn new(value: u128) -> Option<Self> {
        (value >> Self::BITS == 0).then_some(Telemetry(value))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Standard(StandardMessage),
    NonStandard(NonStandardMessage),
    FreeText(String),
    Telemetry(Telemetry),
}

impl Message {
    /// Parses message text, registering every callsign it mentions in `table`.
    pub fn parse(text: &str, table: &dyn CallsignHashTable) -> Result<Message> {
        parse_message(text, table)
    }

    pub fn to_payload(&self) -> Result<Payload> {
        encode_message(self)
    }

    pub fn from_payload(payload: &Payload, table: &dyn CallsignHashTable) -> Result<Message> {
        decode_message(payload, table)
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Message::Standard(_) => "standard",
            Message::NonStandard(_) => "non-standard",
            Message::FreeText(_) => "free text",
            Message::Telemetry(_) => "telemetry",
        }
    }
}

impl fmt::Display for StandardMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = if self.portable { "/P" } else { "/R" };
        write!(f, "{}", self.call_to)?;
        if self.to_suffix {
            f.write_str(suffix)?;
        }
        write!(f, " {}", self.call_de)?;
        if self.de_suffix {
            f.write_str(suffix)?;
        }
        match &self.extra {
            Extra::None => Ok(()),
            Extra::Grid(grid) if self.ack => write!(f, " R {}", grid),
            Extra::Grid(grid) => write!(f, " {}", grid),
            Extra::Report(dd) if self.ack => write!(f, " R{}", int_to_dd(*dd, true)),
            Extra::Report(dd) => write!(f, " {}", int_to_dd(*dd, true)),
            Extra::Rrr => f.write_str(" RRR"),
            Extra::Rr73 => f.write_str(" RR73"),
            Extra::Seventy3 => f.write_str(" 73"),
        }
    }
}

impl fmt::Display for NonStandardMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hashed = match &self.hashed_call {
            Some(call) => format!("<{}>", call),
            None => "<...>".to_string(),
        };
        if self.cq {
            return write!(f, "CQ {}", self.call);
        }
        if self.call_first {
            write!(f, "{} {}", self.call, hashed)?;
        } else {
            write!(f, "{} {}", hashed, self.call)?;
        }
        if self.reply != Reply::None {
            write!(f, " {}", self.reply.as_str())?;
        }
        Ok(())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Standard(m) => m.fmt(f),
            Message::NonStandard(m) => m.fmt(f),
            Message::FreeText(text) => f.write_str(text),
            Message::Telemetry(Telemetry(bits)) => write!(f, "{:018X}", bits),
        }
    }
}
