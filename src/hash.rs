//! Callsign hashes and the lookup table used to resolve them.
//!
//! Compound and non-standard callsigns don't fit the 28-bit callsign field,
//! so messages carry a 22-, 12- or 10-bit hash instead. Turning a hash back
//! into text needs a table of callsigns heard earlier; the codec only talks
//! to that table through [`CallsignHashTable`].

use std::collections::HashMap;
use std::sync::RwLock;

use crate::text::{nchar, CharTable};

const HASH_MULTIPLIER: u64 = 47055833459;
const MAX_HASHED_CALL: usize = 11;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashKind {
    Bits22,
    Bits12,
    Bits10,
}

impl HashKind {
    fn shift(self) -> u32 {
        match self {
            HashKind::Bits22 => 0,
            HashKind::Bits12 => 10,
            HashKind::Bits10 => 12,
        }
    }
}

/// 22-bit hash of a callsign, or `None` if it has characters outside " 0-9A-Z/"
/// or more than 11 of them.
pub fn hash22(callsign: &str) -> Option<u32> {
    if callsign.len() > MAX_HASHED_CALL {
        return None;
    }
    let mut n58: u64 = 0;
    let mut len = 0;
    for c in callsign.chars() {
        n58 = 38 * n58 + nchar(c, CharTable::AlphanumSpaceSlash)? as u64;
        len += 1;
    }
    // left aligned, padded with spaces
    for _ in len..MAX_HASHED_CALL {
        n58 *= 38;
    }
    Some((HASH_MULTIPLIER.wrapping_mul(n58) >> (64 - 22)) as u32 & 0x3F_FFFF)
}

pub fn hash(callsign: &str, kind: HashKind) -> Option<u32> {
    hash22(callsign).map(|h| h >> kind.shift())
}

/// Injectable callsign hash resolution.
pub trait CallsignHashTable: Send + Sync {
    /// Remember a callsign so later hashes of it can be resolved.
    fn save(&self, callsign: &str);

    /// Callsign whose hash of the given kind equals `hash`.
    fn lookup(&self, kind: HashKind, hash: u32) -> Option<String>;
}

/// Table that never resolves anything; hashed fields decode as `<...>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHashTable;

impl CallsignHashTable for NoHashTable {
    fn save(&self, _callsign: &str) {}

    fn lookup(&self, _kind: HashKind, _hash: u32) -> Option<String> {
        None
    }
}

/// Thread-safe in-memory table keyed by the 22-bit hash.
#[derive(Debug, Default)]
pub struct MemoryHashTable {
    calls: RwLock<HashMap<u32, String>>,
}

impl MemoryHashTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.calls.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CallsignHashTable for MemoryHashTable {
    fn save(&self, callsign: &str) {
        let Some(h22) = hash22(callsign) else { return };
        if let Ok(mut calls) = self.calls.write() {
            calls.insert(h22, callsign.to_string());
        }
    }

    fn lookup(&self, kind: HashKind, hash: u32) -> Option<String> {
        let calls = self.calls.read().ok()?;
        if kind == HashKind::Bits22 {
            return calls.get(&hash).cloned();
        }
        calls
            .iter()
            .find(|(h22, _)| *h22 >> kind.shift() == hash)
            .map(|(_, call)| call.clone())
    }
}
