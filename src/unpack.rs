use tracing::trace;

use crate::error::{Ft8Error, Result};
use crate::hash::{CallsignHashTable, HashKind};
use crate::message::*;
use crate::pack::{
    is_nonstandard_call, pack_basecall, register_calls, CQ_MODIFIER_FIRST, CQ_MODIFIER_LAST,
    CQ_NUMBER_FIRST, MAX22, MAXGRID4, NTOKENS,
};
use crate::text::*;

fn unknown(what: impl Into<String>) -> Ft8Error {
    Ft8Error::UnknownVariant(what.into())
}

// Rejects blank results and spaces inside what should be one word.
fn single_word(s: &str, what: &str) -> Result<String> {
    let word = s.trim();
    if word.is_empty() || word.contains(' ') {
        return Err(unknown(format!("malformed {} '{}'", what, s)));
    }
    Ok(word.to_string())
}

// n28 is a 28-bit integer, e.g. n28a or n28b, containing all the
// call sign bits from a packed message.
pub fn unpack_callsign(n28: u32, table: &dyn CallsignHashTable) -> Result<Call> {
    // Check for special tokens DE, QRZ, CQ, CQ_nnn, CQ_aaaa
    if n28 < NTOKENS {
        return match n28 {
            0 => Ok(Call::De),
            1 => Ok(Call::Qrz),
            2 => Ok(Call::Cq),
            n if n < CQ_MODIFIER_FIRST => Ok(Call::CqNumber((n - CQ_NUMBER_FIRST) as u16)),
            n if n <= CQ_MODIFIER_LAST => {
                let mut n = n - CQ_MODIFIER_FIRST;
                let mut aaaa = [' '; 4];
                for c in aaaa.iter_mut().rev() {
                    *c = charn(n % 27, CharTable::LettersSpace).unwrap_or(' ');
                    n /= 27;
                }
                let aaaa: String = aaaa.iter().collect();
                // modifiers are right aligned
                if aaaa.ends_with(' ') {
                    return Err(unknown(format!("malformed CQ modifier '{}'", aaaa)));
                }
                Ok(Call::CqModifier(single_word(&aaaa, "CQ modifier")?))
            }
            n => Err(unknown(format!("unassigned call token {}", n))),
        };
    }

    let n28 = n28 - NTOKENS;
    if n28 < MAX22 {
        // This is a 22-bit hash of a callsign
        return Ok(Call::Hashed {
            hash: n28,
            call: table.lookup(HashKind::Bits22, n28),
        });
    }

    // Standard callsign
    let value = n28 - MAX22;
    let mut n = value;
    let mut c6 = [' '; 6];
    for (i, c) in c6.iter_mut().enumerate().rev() {
        let (radix, chars) = match i {
            0 => (37, CharTable::AlphanumSpace),
            1 => (36, CharTable::Alphanum),
            2 => (10, CharTable::Numeric),
            _ => (27, CharTable::LettersSpace),
        };
        *c = charn(n % radix, chars).unwrap_or(' ');
        n /= radix;
    }
    if n != 0 {
        return Err(unknown(format!("call field {} out of range", n28)));
    }
    let c6: String = c6.iter().collect();

    let callsign = if c6.starts_with("3D0") && !c6[3..].starts_with(' ') {
        // Swaziland prefix: 3D0XYZ -> 3DA0XYZ
        format!("3DA0{}", &c6[3..])
    } else if c6.starts_with('Q') && c6[1..].starts_with(|c: char| c.is_ascii_uppercase()) {
        // Guinea prefixes: QA0XYZ -> 3XA0XYZ
        format!("3X{}", &c6[1..])
    } else {
        c6
    };
    let callsign = single_word(&callsign, "callsign")?;
    // must be exactly what the encoder would have sent for this call
    if pack_basecall(&callsign) != Some(value) {
        return Err(unknown(format!("'{}' is not a standard callsign", callsign)));
    }
    Ok(Call::Standard(callsign))
}

// Decodes the R flag and 15-bit grid/report field into (ack, extra).
fn unpack_extra(ir: bool, igrid4: u16) -> Result<(bool, Extra)> {
    if igrid4 < MAXGRID4 {
        // Extract 4 symbol grid locator
        let mut n = igrid4;
        let d3 = (b'0' + (n % 10) as u8) as char;
        n /= 10;
        let d2 = (b'0' + (n % 10) as u8) as char;
        n /= 10;
        let c1 = (b'A' + (n % 18) as u8) as char;
        n /= 18;
        let c0 = (b'A' + (n % 18) as u8) as char;
        return Ok((ir, Extra::Grid([c0, c1, d2, d3].iter().collect())));
    }

    // Extract report
    match igrid4 - MAXGRID4 {
        1 => Ok((false, Extra::None)),
        2 => Ok((false, Extra::Rrr)),
        3 => Ok((false, Extra::Rr73)),
        4 => Ok((false, Extra::Seventy3)),
        irpt @ 5..=84 => Ok((ir, Extra::Report(irpt as i32 - 35))),
        irpt => Err(unknown(format!("unassigned report value {}", irpt))),
    }
}

pub fn unpack_type1(
    b77: &Payload,
    i3: u8,
    table: &dyn CallsignHashTable,
) -> Result<StandardMessage> {
    // Extract packed fields
    let n28a = b77.read_bits(0, 28) as u32;
    let ipa = b77.read_bits(28, 1) != 0;
    let n28b = b77.read_bits(29, 28) as u32;
    let ipb = b77.read_bits(57, 1) != 0;
    let ir = b77.read_bits(58, 1) != 0;
    let igrid4 = b77.read_bits(59, 15) as u16;

    // Unpack both callsigns
    let call_to = unpack_callsign(n28a, table)?;
    let call_de = unpack_callsign(n28b, table)?;
    let (ack, extra) = unpack_extra(ir, igrid4)?;

    // DE, QRZ and CQ only ever address the message
    if !matches!(call_de, Call::Standard(_) | Call::Hashed { .. }) {
        return Err(unknown(format!("'{}' in the second call field", call_de)));
    }
    let suffixable = |call: &Call| matches!(call, Call::Standard(_));
    if (ipa && !suffixable(&call_to)) || (ipb && !suffixable(&call_de)) {
        return Err(unknown("suffix on a call that can't carry one"));
    }

    Ok(StandardMessage {
        call_to,
        to_suffix: ipa,
        call_de,
        de_suffix: ipb,
        portable: i3 == 2,
        ack,
        extra,
    })
}

pub fn unpack_text(b77: &Payload) -> Result<String> {
    let mut f71 = b77.read_bits(0, 71);
    let mut c13 = [' '; 13];
    for c in c13.iter_mut().rev() {
        *c = charn((f71 % 42) as u32, CharTable::Full).unwrap_or(' ');
        f71 /= 42;
    }
    if f71 != 0 {
        return Err(unknown("free text value out of range"));
    }
    let text: String = c13.iter().collect();
    let text = text.trim();
    if text.is_empty() {
        return Err(unknown("blank free text"));
    }
    Ok(text.to_string())
}

pub fn unpack_telemetry(b77: &Payload) -> Telemetry {
    Telemetry(b77.read_bits(0, Telemetry::BITS))
}

//none standard for wsjt-x 2.0
pub fn unpack_nonstandard(
    b77: &Payload,
    table: &dyn CallsignHashTable,
) -> Result<NonStandardMessage> {
    let n12 = b77.read_bits(0, 12) as u16;
    let mut n58 = b77.read_bits(12, 58) as u64;
    let iflip = b77.read_bits(70, 1) != 0;
    let nrpt = b77.read_bits(71, 2);
    let icq = b77.read_bits(73, 1) != 0;

    let mut c11 = [' '; 11];
    for c in c11.iter_mut().rev() {
        *c = charn((n58 % 38) as u32, CharTable::AlphanumSpaceSlash).unwrap_or(' ');
        n58 /= 38;
    }
    if n58 != 0 {
        return Err(unknown("non-standard call value out of range"));
    }
    let c11: String = c11.iter().collect();
    let call = single_word(&c11, "non-standard callsign")?;
    // left aligned, and only calls that don't fit a 28-bit field
    if c11.starts_with(' ') || !is_nonstandard_call(&call) {
        return Err(unknown(format!("'{}' is not a non-standard callsign", c11.trim())));
    }
    if icq && (iflip || nrpt != 0) {
        return Err(unknown("reply fields set on a CQ"));
    }

    let reply = match nrpt {
        1 => Reply::Rrr,
        2 => Reply::Rr73,
        3 => Reply::Seventy3,
        _ => Reply::None,
    };
    let hashed_call = if icq { None } else { table.lookup(HashKind::Bits12, n12 as u32) };
    Ok(NonStandardMessage {
        call,
        hash12: n12,
        hashed_call,
        call_first: iflip,
        cq: icq,
        reply,
    })
}

/// Decodes a payload into its message variant. Callsigns in the message
/// are remembered in `table` to resolve later hashes.
pub fn decode_message(b77: &Payload, table: &dyn CallsignHashTable) -> Result<Message> {
    let i3 = b77.i3();
    let message = match i3 {
        0 => match b77.n3() {
            // 0.0  Free text
            0 => Message::FreeText(unpack_text(b77)?),
            // 0.5  Telemetry
            5 => Message::Telemetry(unpack_telemetry(b77)),
            n3 => return Err(unknown(format!("message type 0.{}", n3))),
        },
        // Type 1 (standard message) or Type 2 ("/P" form for EU VHF contest)
        1 | 2 => Message::Standard(unpack_type1(b77, i3, table)?),
        // Type 4: Nonstandard calls, e.g. <WA9XYZ> PJ4/KA1ABC RR73
        4 => Message::NonStandard(unpack_nonstandard(b77, table)?),
        _ => return Err(unknown(format!("message type {}", i3))),
    };

    register_calls(&message, table);
    trace!("decoded {} message '{}'", message.variant_name(), message);
    Ok(message)
}

pub fn unpack77(b77: &Payload, table: &dyn CallsignHashTable) -> Result<String> {
    decode_message(b77, table).map(|m| m.to_string())
}
