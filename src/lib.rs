//! FT8 message codec, modulator and decoder.
//!
//! Transmit: text → 77-bit payload → CRC-14 → LDPC(174,91) → 79 tones → GFSK audio.
//! Receive: audio → waterfall → Costas sync search → tone LLRs → LDPC → text.
//!
//! ```no_run
//! let samples = ft8codec::encode("CQ K1ABC FN42", 1500.0).unwrap();
//! for msg in ft8codec::decode(&samples) {
//!     println!("{:5.1} dB {:7.1} Hz {}", msg.snr, msg.freq_hz, msg.text);
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod constant;
pub mod crc;
pub mod decoder;
pub mod error;
pub mod ft8decode;
pub mod ft8encode;
pub mod gfsk;
pub mod hash;
pub mod ldpc;
pub mod message;
pub mod monitor;
pub mod pack;
pub mod spectrogram;
pub mod text;
pub mod unpack;

use std::sync::OnceLock;

use tracing::warn;

pub use cancel::CancelToken;
pub use config::Config;
pub use constant::FTX_LDPC_K_BYTES;
pub use decoder::{Decoder, DecoderConfig};
pub use error::{ConfigError, Ft8Error, Result};
pub use ft8decode::DecodedMessage;
pub use ft8encode::{Encoder, EncoderConfig};
pub use hash::{CallsignHashTable, HashKind, MemoryHashTable, NoHashTable};
pub use ldpc::LdpcAlgorithm;
pub use message::{Message, Payload};
pub use monitor::{MonitorConfig, WindowKind};

use crc::{ftx_add_crc, ftx_check_crc, ftx_strip_crc};

/// Candidate cap used by [`decode`].
pub const DEFAULT_MAX_CANDIDATES: usize = 140;

/// Synthesizes `text` as 79 symbols of 12 kHz audio with tone 0 at `f0` Hz.
pub fn encode(text: &str, f0: f32) -> Result<Vec<f32>> {
    Encoder::default().encode(text, f0)
}

// Built on first use; it holds no hash table, so calls don't share state.
static DEFAULT_DECODER: OnceLock<Result<Decoder>> = OnceLock::new();

/// Decodes one receive window of 12 kHz audio with default settings.
/// All calls share one [`Decoder`] and its worker pool.
pub fn decode(samples: &[f32]) -> Vec<DecodedMessage> {
    match DEFAULT_DECODER.get_or_init(|| Decoder::init(DEFAULT_MAX_CANDIDATES)) {
        Ok(decoder) => decoder.decode(samples),
        Err(e) => {
            warn!("decoder unavailable: {}", e);
            Vec::new()
        }
    }
}

/// Packs message text into 77 payload bits followed by the 14-bit CRC, MSB first.
pub fn pack(text: &str) -> Result<[u8; FTX_LDPC_K_BYTES]> {
    let payload = pack::pack77(text, &NoHashTable)?;
    Ok(ftx_add_crc(payload.as_bytes()))
}

/// Inverse of [`pack`]; the CRC is checked before any field is read.
pub fn unpack(a91: &[u8; FTX_LDPC_K_BYTES]) -> Result<String> {
    if !ftx_check_crc(a91) {
        return Err(Ft8Error::ChecksumInvalid);
    }
    unpack::unpack77(&Payload(ftx_strip_crc(a91)), &NoHashTable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_decode_reuses_its_session() {
        assert!(decode(&[]).is_empty());
        let first: *const Result<Decoder> = DEFAULT_DECODER.get().unwrap();
        assert!(decode(&[0.0; 4000]).is_empty());
        assert!(std::ptr::eq(first, DEFAULT_DECODER.get().unwrap()));
        assert!(DEFAULT_DECODER.get().unwrap().is_ok());
    }
}
