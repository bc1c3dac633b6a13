use tracing::trace;

use crate::error::{Ft8Error, Result};
use crate::hash::{hash, hash22, CallsignHashTable, HashKind};
use crate::message::*;
use crate::text::*;

pub(crate) const NTOKENS: u32 = 2063592;
pub(crate) const MAX22: u32 = 4194304;
pub(crate) const MAXGRID4: u16 = 32400;
pub(crate) const CQ_NUMBER_FIRST: u32 = 3;
pub(crate) const CQ_MODIFIER_FIRST: u32 = 1003;
pub(crate) const CQ_MODIFIER_LAST: u32 = 532443;

const MAX_FREE_TEXT: usize = 13;
const MAX_NONSTD_CALL: usize = 11;

/// Trims, collapses runs of whitespace and upper-cases message text.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

// Check if a string could be a valid standard base call (no suffix):
// one or two prefix characters with at least one letter, a call area
// digit in position 2 or 3, then at most three letters.
fn is_standard_basecall(call: &str) -> bool {
    let b = call.as_bytes();
    if b.len() < 3 || b.len() > 6 {
        return false;
    }
    if !b.iter().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return false;
    }
    let Some(iarea) = b.iter().rposition(|c| c.is_ascii_digit()) else {
        return false;
    };
    let nplet = b[..iarea].iter().filter(|c| c.is_ascii_uppercase()).count();
    let npdig = b[..iarea].iter().filter(|c| c.is_ascii_digit()).count();
    let nslet = b.len() - iarea - 1;
    (1..=2).contains(&iarea) && nplet > 0 && npdig < iarea && nslet <= 3
}

/// Packs a standard base call into the 6-character mixed radix value.
pub fn pack_basecall(callsign: &str) -> Option<u32> {
    if !callsign.is_ascii() {
        return None;
    }
    let bytes = callsign.as_bytes();
    let c6 = if callsign.starts_with("3DA0") && callsign.len() <= 7 {
        // Work-around for Swaziland prefix: 3DA0XYZ -> 3D0XYZ
        format!("3D0{}", &callsign[4..])
    } else if callsign.starts_with("3X")
        && bytes.get(2).map_or(false, u8::is_ascii_uppercase)
        && callsign.len() <= 7
    {
        // Work-around for Guinea prefixes: 3XA0XYZ -> QA0XYZ
        format!("Q{}", &callsign[2..])
    } else {
        callsign.to_string()
    };

    if !is_standard_basecall(&c6) {
        return None;
    }
    let b = c6.as_bytes();
    let aligned = if b[2].is_ascii_digit() {
        // AB0XYZ
        c6
    } else if b[1].is_ascii_digit() && b.len() <= 5 {
        // A0XYZ -> " A0XYZ"
        format!(" {}", c6)
    } else {
        return None;
    };

    let call: Vec<char> = format!("{:<6}", aligned).chars().collect();
    let mut n28 = nchar(call[0], CharTable::AlphanumSpace)?;
    n28 = n28 * 36 + nchar(call[1], CharTable::Alphanum)?;
    n28 = n28 * 10 + nchar(call[2], CharTable::Numeric)?;
    n28 = n28 * 27 + nchar(call[3], CharTable::LettersSpace)?;
    n28 = n28 * 27 + nchar(call[4], CharTable::LettersSpace)?;
    n28 = n28 * 27 + nchar(call[5], CharTable::LettersSpace)?;
    Some(n28)
}

// Pack a special token, a 22-bit hash code, or a valid base call
// into a 28-bit integer.
pub fn pack28(call: &Call) -> Result<u32> {
    match call {
        Call::De => Ok(0),
        Call::Qrz => Ok(1),
        Call::Cq => Ok(2),
        Call::CqNumber(n) if *n <= 999 => Ok(CQ_NUMBER_FIRST + *n as u32),
        Call::CqModifier(m) if (1..=4).contains(&m.len()) => {
            // right aligned, e.g. "  DX"
            let mut n = 0;
            for c in format!("{:>4}", m).chars() {
                let i = nchar(c, CharTable::LettersSpace)
                    .ok_or_else(|| Ft8Error::InvalidFormat(format!("bad CQ modifier '{}'", m)))?;
                n = n * 27 + i;
            }
            Ok(CQ_MODIFIER_FIRST + n)
        }
        Call::Hashed { hash, .. } if *hash < MAX22 => Ok(NTOKENS + hash),
        Call::Standard(callsign) => pack_basecall(callsign)
            .map(|n| NTOKENS + MAX22 + n)
            .ok_or_else(|| {
                Ft8Error::InvalidFormat(format!("'{}' is not a standard callsign", callsign))
            }),
        other => Err(Ft8Error::InvalidFormat(format!("can't pack call field {:?}", other))),
    }
}

// Check if a string could be a compound or otherwise non-standard callsign.
pub fn chkcall(call: &str) -> bool {
    if call.len() < 3 || call.len() > MAX_NONSTD_CALL {
        return false;
    }
    if call.starts_with('/') || call.ends_with('/') || call.contains("//") {
        return false;
    }
    if !call.chars().all(|c| c != ' ' && nchar(c, CharTable::AlphanumSpaceSlash).is_some()) {
        return false;
    }
    call.chars().any(|c| c.is_ascii_digit())
        && call.chars().any(|c| c.is_ascii_uppercase())
        && !is_grid(call)
}

/// True for calls that only fit the 58-bit field of a type 4 message.
pub(crate) fn is_nonstandard_call(call: &str) -> bool {
    matches!(CallText::classify(call), Some(CallText::NonStandard(_)))
}

fn is_grid(token: &str) -> bool {
    let g = token.as_bytes();
    if g.len() != 4 && g.len() != 6 {
        return false;
    }
    let field = |c: u8| (b'A'..=b'R').contains(&c);
    let square = |c: u8| c.is_ascii_digit();
    let subsquare = |c: u8| (b'A'..=b'X').contains(&c);
    field(g[0])
        && field(g[1])
        && square(g[2])
        && square(g[3])
        && (g.len() == 4 || (subsquare(g[4]) && subsquare(g[5])))
}

pub fn packgrid(grid4: &str) -> Result<u16> {
    let gstr: Vec<char> = grid4.chars().collect();
    if gstr.len() == 4
        && in_range(gstr[0], 'A', 'R')
        && in_range(gstr[1], 'A', 'R')
        && in_range(gstr[2], '0', '9')
        && in_range(gstr[3], '0', '9')
    {
        let mut igrid4: u16 = gstr[0] as u16 - 'A' as u16;
        igrid4 = igrid4 * 18 + (gstr[1] as u16 - 'A' as u16);
        igrid4 = igrid4 * 10 + (gstr[2] as u16 - '0' as u16);
        igrid4 = igrid4 * 10 + (gstr[3] as u16 - '0' as u16);
        return Ok(igrid4);
    }
    Err(Ft8Error::InvalidFormat(format!("'{}' is not a grid locator", grid4)))
}

fn pack_extra(extra: &Extra) -> Result<u16> {
    match extra {
        Extra::None => Ok(MAXGRID4 + 1),
        Extra::Rrr => Ok(MAXGRID4 + 2),
        Extra::Rr73 => Ok(MAXGRID4 + 3),
        Extra::Seventy3 => Ok(MAXGRID4 + 4),
        Extra::Grid(grid) => packgrid(grid),
        Extra::Report(dd) if (-30..=49).contains(dd) => Ok(MAXGRID4 + (35 + dd) as u16),
        Extra::Report(dd) => Err(Ft8Error::InvalidFormat(format!("report {} out of range", dd))),
    }
}

// Pack Type 1 (Standard 77-bit message) and Type 2 (ditto, with a "/P" call)
pub fn pack77_1(msg: &StandardMessage) -> Result<Payload> {
    let n28a = pack28(&msg.call_to)?;
    let n28b = pack28(&msg.call_de)?;
    let igrid4 = pack_extra(&msg.extra)?;
    let i3 = if msg.portable { 2 } else { 1 };

    // (28 + 1) + (28 + 1) + (1 + 15) + 3 bits
    let mut b77 = Payload::new();
    b77.write_bits(0, 28, n28a as u128);
    b77.write_bits(28, 1, msg.to_suffix as u128);
    b77.write_bits(29, 28, n28b as u128);
    b77.write_bits(57, 1, msg.de_suffix as u128);
    b77.write_bits(58, 1, msg.ack as u128);
    b77.write_bits(59, 15, igrid4 as u128);
    b77.write_bits(74, 3, i3);
    Ok(b77)
}

// Pack Type 4: one hashed call and one non-standard call of up to 11 characters
pub fn pack77_4(msg: &NonStandardMessage) -> Result<Payload> {
    if msg.call.len() > MAX_NONSTD_CALL {
        return Err(Ft8Error::InvalidFormat(format!("'{}' is too long", msg.call)));
    }
    let mut n58: u64 = 0;
    for c in format!("{:<11}", msg.call).chars() {
        let i = nchar(c, CharTable::AlphanumSpaceSlash)
            .ok_or_else(|| Ft8Error::InvalidFormat(format!("bad character in '{}'", msg.call)))?;
        n58 = n58 * 38 + i as u64;
    }
    let nrpt = match msg.reply {
        Reply::None => 0,
        Reply::Rrr => 1,
        Reply::Rr73 => 2,
        Reply::Seventy3 => 3,
    };

    let mut b77 = Payload::new();
    b77.write_bits(0, 12, (msg.hash12 & 0x0FFF) as u128);
    b77.write_bits(12, 58, n58 as u128);
    b77.write_bits(70, 1, msg.call_first as u128);
    b77.write_bits(71, 2, nrpt);
    b77.write_bits(73, 1, msg.cq as u128);
    b77.write_bits(74, 3, 4);
    Ok(b77)
}

pub fn packtext77(text: &str) -> Result<Payload> {
    if text.len() > MAX_FREE_TEXT {
        return Err(Ft8Error::InvalidFormat(format!(
            "free text '{}' is longer than {} characters",
            text, MAX_FREE_TEXT
        )));
    }
    // Express the text as a base-42 number, padded with spaces on the right
    let mut f71: u128 = 0;
    for c in format!("{:<13}", text).chars() {
        let q = nchar(c, CharTable::Full)
            .ok_or_else(|| {
                Ft8Error::InvalidFormat(format!("'{}' can't be sent as free text", text))
            })?;
        f71 = f71 * 42 + q as u128;
    }

    // n3 = 0, i3 = 0
    let mut b77 = Payload::new();
    b77.write_bits(0, 71, f71);
    Ok(b77)
}

pub fn packtelemetry(telemetry: &Telemetry) -> Payload {
    let mut b77 = Payload::new();
    b77.write_bits(0, 71, telemetry.0);
    b77.write_bits(71, 3, 5);
    b77
}

pub fn encode_message(msg: &Message) -> Result<Payload> {
    match msg {
        Message::Standard(m) => pack77_1(m),
        Message::NonStandard(m) => pack77_4(m),
        Message::FreeText(text) => packtext77(text),
        Message::Telemetry(t) => Ok(packtelemetry(t)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Suffix {
    Rover,
    Portable,
}

/// How a callsign token can be carried.
#[derive(Clone, Copy, Debug)]
enum CallText<'a> {
    Standard { base: &'a str, suffix: Option<Suffix> },
    /// "<CALL>", always sent as a hash
    Bracketed(&'a str),
    NonStandard(&'a str),
}

impl<'a> CallText<'a> {
    fn classify(token: &'a str) -> Option<Self> {
        if let Some(inner) = token.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
            let hashable = !inner.is_empty() && hash22(inner).is_some();
            return hashable.then_some(CallText::Bracketed(inner));
        }
        let (base, suffix) = match token.rsplit_once('/') {
            Some((base, "R")) => (base, Some(Suffix::Rover)),
            Some((base, "P")) => (base, Some(Suffix::Portable)),
            _ => (token, None),
        };
        if pack_basecall(base).is_some() {
            return Some(CallText::Standard { base, suffix });
        }
        chkcall(token).then_some(CallText::NonStandard(token))
    }

    /// The callsign as written, without brackets.
    fn text(&self, token: &'a str) -> &'a str {
        match self {
            CallText::Bracketed(inner) => inner,
            _ => token,
        }
    }
}

enum ToField<'a> {
    Token(Call),
    Text(&'a str),
}

fn cq_target(modifier: &str) -> Option<Call> {
    let b = modifier.as_bytes();
    if b.len() == 3 && b.iter().all(u8::is_ascii_digit) {
        return modifier.parse().ok().map(Call::CqNumber);
    }
    if (1..=4).contains(&b.len()) && b.iter().all(u8::is_ascii_uppercase) {
        return Some(Call::CqModifier(modifier.to_string()));
    }
    None
}

// Splits tokens into the addressee, the sender and whatever follows.
fn split_fields<'a>(tokens: &[&'a str]) -> Option<(ToField<'a>, &'a str, Vec<&'a str>)> {
    let (to, rest) = match tokens {
        ["CQ", modifier, rest @ ..] if !rest.is_empty() && cq_target(modifier).is_some() => {
            (ToField::Token(cq_target(modifier)?), rest)
        }
        ["CQ", rest @ ..] => (ToField::Token(Call::Cq), rest),
        ["DE", rest @ ..] => (ToField::Token(Call::De), rest),
        ["QRZ", rest @ ..] => (ToField::Token(Call::Qrz), rest),
        [to, rest @ ..] => (ToField::Text(*to), rest),
        [] => return None,
    };
    let (de, extra) = rest.split_first()?;
    Some((to, *de, extra.to_vec()))
}

fn parse_report(token: &str) -> Option<i32> {
    if !token.starts_with(&['+', '-'][..]) {
        return None;
    }
    dd_to_int(token).filter(|dd| (-30..=49).contains(dd))
}

fn parse_extra(extra: &[&str]) -> Option<(bool, Extra)> {
    // specials before grids, RR73 is also a valid locator
    match extra {
        [] => Some((false, Extra::None)),
        ["RRR"] => Some((false, Extra::Rrr)),
        ["RR73"] => Some((false, Extra::Rr73)),
        ["73"] => Some((false, Extra::Seventy3)),
        ["R", grid] if is_grid(grid) => Some((true, Extra::Grid(grid[..4].to_string()))),
        [grid] if is_grid(grid) => Some((false, Extra::Grid(grid[..4].to_string()))),
        [report] => match report.strip_prefix('R') {
            Some(rest) => parse_report(rest).map(|dd| (true, Extra::Report(dd))),
            None => parse_report(report).map(|dd| (false, Extra::Report(dd))),
        },
        _ => None,
    }
}

fn parse_reply(extra: &[&str]) -> Option<Reply> {
    match extra {
        [] => Some(Reply::None),
        ["RRR"] => Some(Reply::Rrr),
        ["RR73"] => Some(Reply::Rr73),
        ["73"] => Some(Reply::Seventy3),
        _ => None,
    }
}

fn hashed22(callsign: &str) -> Option<Call> {
    Some(Call::Hashed {
        hash: hash22(callsign)?,
        call: Some(callsign.to_string()),
    })
}

// Standard form of one call, allowing a hashed non-standard call only
// when a grid or report makes type 4 unusable.
fn standard_call(token: &str, allow_nonstd: bool) -> Option<(Call, Option<Suffix>, bool)> {
    match CallText::classify(token)? {
        CallText::Standard { base, suffix } => {
            Some((Call::Standard(base.to_string()), suffix, false))
        }
        CallText::Bracketed(inner) => Some((hashed22(inner)?, None, false)),
        CallText::NonStandard(call) if allow_nonstd => Some((hashed22(call)?, None, true)),
        CallText::NonStandard(_) => None,
    }
}

fn parse_standard(tokens: &[&str]) -> Option<StandardMessage> {
    let (to, de, extra) = split_fields(tokens)?;
    let (ack, extra) = parse_extra(&extra)?;
    let allow_nonstd = matches!(extra, Extra::Grid(_) | Extra::Report(_));

    let (call_de, de_suffix, de_nonstd) = standard_call(de, allow_nonstd)?;
    let (call_to, to_suffix, to_nonstd) = match to {
        ToField::Token(call) => (call, None, false),
        ToField::Text(token) => standard_call(token, allow_nonstd)?,
    };
    if to_nonstd && de_nonstd {
        return None;
    }
    if to_suffix.is_some() && de_suffix.is_some() && to_suffix != de_suffix {
        return None;
    }
    Some(StandardMessage {
        call_to,
        to_suffix: to_suffix.is_some(),
        call_de,
        de_suffix: de_suffix.is_some(),
        portable: to_suffix == Some(Suffix::Portable) || de_suffix == Some(Suffix::Portable),
        ack,
        extra,
    })
}

fn parse_nonstandard(tokens: &[&str]) -> Option<NonStandardMessage> {
    let (to, de, extra) = split_fields(tokens)?;
    let reply = parse_reply(&extra)?;

    let to = match to {
        ToField::Token(Call::Cq) => {
            let CallText::NonStandard(call) = CallText::classify(de)? else {
                return None;
            };
            if reply != Reply::None {
                return None;
            }
            return Some(NonStandardMessage {
                call: call.to_string(),
                hash12: 0,
                hashed_call: None,
                call_first: false,
                cq: true,
                reply,
            });
        }
        ToField::Token(_) => return None,
        ToField::Text(to) => to,
    };

    let kinds = (CallText::classify(to)?, CallText::classify(de)?);
    let (full, other, other_kind, call_first) = match kinds {
        (CallText::NonStandard(full), other) => (full, de, other, true),
        (other, CallText::NonStandard(full)) => (full, to, other, false),
        _ => return None,
    };
    if matches!(other_kind, CallText::NonStandard(_)) {
        return None;
    }
    let hashed_call = other_kind.text(other);
    Some(NonStandardMessage {
        call: full.to_string(),
        hash12: hash(hashed_call, HashKind::Bits12)? as u16,
        hashed_call: Some(hashed_call.to_string()),
        call_first,
        cq: false,
        reply,
    })
}

fn parse_telemetry(msg: &str) -> Option<Telemetry> {
    if msg.len() != 18 || !msg.bytes().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Telemetry::new(u128::from_str_radix(msg, 16).ok()?)
}

pub(crate) fn register_calls(msg: &Message, table: &dyn CallsignHashTable) {
    match msg {
        Message::Standard(m) => {
            let suffix = if m.portable { "/P" } else { "/R" };
            for (call, suffixed) in [(&m.call_to, m.to_suffix), (&m.call_de, m.de_suffix)] {
                match call {
                    Call::Standard(base) if suffixed => table.save(&format!("{}{}", base, suffix)),
                    Call::Standard(base) => table.save(base),
                    Call::Hashed { call: Some(c), .. } => table.save(c),
                    _ => {}
                }
            }
        }
        Message::NonStandard(m) => {
            table.save(&m.call);
            if let Some(c) = &m.hashed_call {
                table.save(c);
            }
        }
        Message::FreeText(_) | Message::Telemetry(_) => {}
    }
}

/// Parses message text into the first variant whose grammar accepts it.
pub fn parse_message(text: &str, table: &dyn CallsignHashTable) -> Result<Message> {
    let msg = normalize(text);
    if msg.is_empty() {
        return Err(Ft8Error::InvalidFormat("empty message".to_string()));
    }

    let tokens: Vec<&str> = msg.split(' ').collect();
    let message = if let Some(t) = parse_telemetry(&msg) {
        Message::Telemetry(t)
    } else if let Some(m) = parse_standard(&tokens) {
        Message::Standard(m)
    } else if let Some(m) = parse_nonstandard(&tokens) {
        Message::NonStandard(m)
    } else if msg.len() <= MAX_FREE_TEXT
        && msg.chars().all(|c| nchar(c, CharTable::Full).is_some())
    {
        Message::FreeText(msg.clone())
    } else {
        return Err(Ft8Error::InvalidFormat(format!("'{}' fits no message type", msg)));
    };

    register_calls(&message, table);
    trace!("'{}' parsed as {} message", msg, message.variant_name());
    Ok(message)
}

pub fn pack77(msg: &str, table: &dyn CallsignHashTable) -> Result<Payload> {
    parse_message(msg, table)?.to_payload()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{MemoryHashTable, NoHashTable};

    fn parse(text: &str) -> Message {
        parse_message(text, &NoHashTable).unwrap()
    }

    fn is_invalid(text: &str) -> bool {
        matches!(parse_message(text, &NoHashTable), Err(Ft8Error::InvalidFormat(_)))
    }

    #[test]
    fn normalizes_text() {
        assert_eq!(normalize("  cq   k1abc\tfn42 "), "CQ K1ABC FN42");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn basecall_validity() {
        for call in ["K1ABC", "W9XYZ", "G4ABC", "KA1A", "JA1XYZ", "3DA0XYZ", "3XA0XYZ", "K1A"] {
            assert!(pack_basecall(call).is_some(), "{} rejected", call);
        }
        for call in ["73", "RR73", "FN20", "K1ABCD", "ABCDEF", "K1ABC/P", "12ABC", ""] {
            assert!(pack_basecall(call).is_none(), "{} accepted", call);
        }
    }

    #[test]
    fn basecall_alignment() {
        // " K1ABC" and "KA1ABC" land on different values
        assert_ne!(pack_basecall("K1ABC"), pack_basecall("KA1ABC"));
        assert_eq!(pack_basecall("3DA0XYZ"), pack_basecall("3D0XYZ"));
        assert_eq!(pack_basecall("3XA0XYZ"), pack_basecall("QA0XYZ"));
    }

    #[test]
    fn token_values() {
        assert_eq!(pack28(&Call::De).unwrap(), 0);
        assert_eq!(pack28(&Call::Qrz).unwrap(), 1);
        assert_eq!(pack28(&Call::Cq).unwrap(), 2);
        assert_eq!(pack28(&Call::CqNumber(0)).unwrap(), 3);
        assert_eq!(pack28(&Call::CqNumber(999)).unwrap(), 1002);
        assert_eq!(pack28(&Call::CqModifier("A".into())).unwrap(), 1004);
        assert_eq!(pack28(&Call::CqModifier("ZZZZ".into())).unwrap(), CQ_MODIFIER_LAST);
        assert!(pack28(&Call::CqNumber(1000)).is_err());
        assert!(pack28(&Call::CqModifier("TOOLONG".into())).is_err());
    }

    #[test]
    fn grid_values() {
        assert_eq!(packgrid("AA00").unwrap(), 0);
        assert_eq!(packgrid("RR99").unwrap(), MAXGRID4 - 1);
        assert!(packgrid("SA00").is_err());
        assert!(packgrid("FN2").is_err());
    }

    #[test]
    fn standard_grammar() {
        match parse("K1ABC W9XYZ R FN20QI") {
            Message::Standard(m) => {
                assert_eq!(m.call_to, Call::Standard("K1ABC".into()));
                assert!(m.ack);
                assert_eq!(m.extra, Extra::Grid("FN20".into()));
            }
            other => panic!("{:?}", other),
        }
        match parse("CQ DX K1ABC FN42") {
            Message::Standard(m) => assert_eq!(m.call_to, Call::CqModifier("DX".into())),
            other => panic!("{:?}", other),
        }
        match parse("K1ABC/P W9XYZ R-11") {
            Message::Standard(m) => {
                assert!(m.portable && m.to_suffix && !m.de_suffix);
                assert_eq!(m.extra, Extra::Report(-11));
            }
            other => panic!("{:?}", other),
        }
        assert!(matches!(
            parse("K1ABC W9XYZ RR73"),
            Message::Standard(StandardMessage { extra: Extra::Rr73, .. })
        ));
    }

    #[test]
    fn mixed_suffixes_are_not_standard() {
        let tokens = ["K1ABC/R", "W9XYZ/P"];
        assert!(parse_standard(&tokens).is_none());
        assert!(parse_nonstandard(&tokens).is_none());
        assert!(is_invalid("K1ABC/R W9XYZ/P"));
    }

    #[test]
    fn nonstandard_call_with_grid_is_hashed() {
        match parse("PJ4/K1ABC W9XYZ -12") {
            Message::Standard(m) => {
                let hash = hash22("PJ4/K1ABC").unwrap();
                assert_eq!(m.call_to, Call::Hashed { hash, call: Some("PJ4/K1ABC".into()) });
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn nonstandard_grammar() {
        match parse("W9XYZ PJ4/K1ABC RR73") {
            Message::NonStandard(m) => {
                assert_eq!(m.call, "PJ4/K1ABC");
                assert!(!m.call_first);
                assert_eq!(m.hash12 as u32, hash("W9XYZ", HashKind::Bits12).unwrap());
                assert_eq!(m.reply, Reply::Rr73);
            }
            other => panic!("{:?}", other),
        }
        match parse("CQ YW18FIFA") {
            Message::NonStandard(m) => assert!(m.cq),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn falls_back_to_free_text() {
        assert_eq!(parse("tnx fer qso"), Message::FreeText("TNX FER QSO".into()));
        assert!(matches!(parse("K1ABC FN20"), Message::FreeText(_)));
        assert!(is_invalid("THIS IS TOO LONG FOR FT8"));
        assert!(is_invalid(""));
        assert!(is_invalid("HI @ HOME"));
    }

    #[test]
    fn telemetry_grammar() {
        let expected = Message::Telemetry(Telemetry(0x123456789ABCDEF012));
        assert_eq!(parse("123456789abcdef012"), expected);
        // first digit above 7 doesn't fit 71 bits
        assert!(is_invalid("923456789ABCDEF012"));
    }

    #[test]
    fn reports_outside_range_are_rejected() {
        assert!(parse_report("-31").is_none());
        assert!(parse_report("+50").is_none());
        assert_eq!(parse_report("+49"), Some(49));
        assert!(parse_report("05").is_none());
    }

    #[test]
    fn registers_heard_calls() {
        let table = MemoryHashTable::new();
        parse_message("<PJ4/K1ABC> W9XYZ", &table).unwrap();
        let h = hash22("PJ4/K1ABC").unwrap();
        assert_eq!(table.lookup(HashKind::Bits22, h).as_deref(), Some("PJ4/K1ABC"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn type_bits() {
        assert_eq!(pack77("K1ABC W9XYZ FN20", &NoHashTable).unwrap().i3(), 1);
        assert_eq!(pack77("K1ABC W9XYZ/P FN20", &NoHashTable).unwrap().i3(), 2);
        assert_eq!(pack77("W9XYZ PJ4/K1ABC", &NoHashTable).unwrap().i3(), 4);
        let text = pack77("HELLO", &NoHashTable).unwrap();
        assert_eq!((text.i3(), text.n3()), (0, 0));
        let tlm = pack77("0123456789ABCDEF01", &NoHashTable).unwrap();
        assert_eq!((tlm.i3(), tlm.n3()), (0, 5));
    }
}
