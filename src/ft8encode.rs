use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constant::*;
use crate::crc::*;
use crate::error::{ConfigError, Ft8Error, Result};
use crate::gfsk::synth_gfsk;
use crate::hash::{CallsignHashTable, NoHashTable};
use crate::ldpc::protect;
use crate::message::{Message, Payload};

/// Transmit side settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Peak sample value
    pub amplitude: f32,
    /// Extend the output with silence to a full 15 s slot
    pub pad_to_slot: bool,
    /// Seconds of silence before the first symbol
    pub lead_in: f32,
}

impl EncoderConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.amplitude > 0.0 && self.amplitude <= 1.0) {
            return Err("[encoder].amplitude must be in range (0, 1]".to_string());
        }
        if !(self.lead_in >= 0.0 && self.lead_in < FT8_SLOT_TIME) {
            return Err("[encoder].lead_in must be in range 0..15 seconds".to_string());
        }
        Ok(())
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            pad_to_slot: false,
            lead_in: 0.0,
        }
    }
}

/// Maps a 174-bit codeword to channel tones.
/// Message structure: S7 D29 S7 D29 S7
pub fn codeword_to_tones(codeword: &[u8; FTX_LDPC_N_BYTES]) -> [usize; FT8_NN] {
    let mut tones = [0usize; FT8_NN];
    let mut i_bit = 0usize;

    for (i_tone, tone) in tones.iter_mut().enumerate() {
        let sync = i_tone % FT8_SYNC_OFFSET;
        if sync < FT8_LENGTH_SYNC {
            *tone = FT8_COSTAS_PATTERN[sync];
            continue;
        }
        // Extract 3 bits from codeword at i-th position
        let mut bits3 = 0usize;
        for _ in 0..3 {
            bits3 = (bits3 << 1) | ((codeword[i_bit / 8] >> (7 - i_bit % 8)) & 1) as usize;
            i_bit += 1;
        }
        // Gray coded: adjacent tones differ in one bit
        *tone = FT8_GRAY_MAP[bits3];
    }
    tones
}

/// Adds the CRC, LDPC-encodes and maps the result to 79 tones.
pub fn ft8_encode(payload: &Payload) -> [usize; FT8_NN] {
    // a91 contains 77 bits of payload + 14 bits of CRC
    let a91 = ftx_add_crc(payload.as_bytes());
    let codeword = protect(&a91);
    codeword_to_tones(&codeword)
}

pub struct Encoder {
    config: EncoderConfig,
    hash_table: Arc<dyn CallsignHashTable>,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            hash_table: Arc::new(NoHashTable),
        }
    }

    /// Callsigns in encoded messages are saved here.
    pub fn with_hash_table(mut self, hash_table: Arc<dyn CallsignHashTable>) -> Self {
        self.hash_table = hash_table;
        self
    }

    pub fn tones(&self, text: &str) -> Result<[usize; FT8_NN]> {
        let message = Message::parse(text, self.hash_table.as_ref())?;
        Ok(ft8_encode(&message.to_payload()?))
    }

    /// Synthesizes `text` with tone 0 at `f0` Hz.
    pub fn encode(&self, text: &str, f0: f32) -> Result<Vec<f32>> {
        self.config
            .validate()
            .map_err(|e| Ft8Error::Config(ConfigError::Invalid(e)))?;
        let sample_rate = FT8_SAMPLE_RATE as f32;
        let top = f0 + (FT8_NUM_TONES - 1) as f32 * FT8_TONE_SPACING;
        if !f0.is_finite() || f0 < 0.0 || top >= sample_rate / 2.0 {
            return Err(Ft8Error::InvalidFrequency(f0));
        }

        let tones = self.tones(text)?;
        let wave = synth_gfsk(&tones, f0, FT8_SYMBOL_PERIOD, sample_rate)?;

        let lead = (self.config.lead_in * sample_rate) as usize;
        let mut total = lead
            .checked_add(wave.len())
            .ok_or(Ft8Error::Allocation { samples: usize::MAX })?;
        if self.config.pad_to_slot {
            total = total.max(FT8_SLOT_SAMPLES);
        }
        let mut signal = Vec::new();
        signal
            .try_reserve_exact(total)
            .map_err(|_| Ft8Error::Allocation { samples: total })?;
        signal.resize(lead, 0.0);
        signal.extend(wave.iter().map(|s| s * self.config.amplitude));
        signal.resize(total, 0.0);

        debug!("encoded '{}' at {} Hz, {} samples", text, f0, signal.len());
        Ok(signal)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(EncoderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::MemoryHashTable;

    #[test]
    fn sync_blocks_are_fixed() {
        let tones = ft8_encode(&Payload::new());
        for block in 0..FT8_NUM_SYNC {
            let start = block * FT8_SYNC_OFFSET;
            assert_eq!(tones[start..start + FT8_LENGTH_SYNC], FT8_COSTAS_PATTERN);
        }
        // an all-zero codeword maps every data symbol to tone 0
        assert!(tones[7..36].iter().all(|&t| t == 0));
    }

    #[test]
    fn tones_stay_in_the_alphabet() {
        let tones = Encoder::default().tones("CQ K1ABC FN42").unwrap();
        assert!(tones.iter().all(|&t| t < FT8_NUM_TONES));
    }

    #[test]
    fn adjacent_tones_differ_by_one_bit() {
        let mut bits_of_tone = [0usize; 8];
        for (bits, &tone) in FT8_GRAY_MAP.iter().enumerate() {
            bits_of_tone[tone] = bits;
        }
        for t in 0..7 {
            assert_eq!((bits_of_tone[t] ^ bits_of_tone[t + 1]).count_ones(), 1);
        }
    }

    #[test]
    fn output_length_and_padding() {
        let wave = Encoder::default().encode("K1ABC W9XYZ FN20", 1500.0).unwrap();
        assert_eq!(wave.len(), FT8_WAVE_SAMPLES);

        let padded = Encoder::new(EncoderConfig {
            amplitude: 0.5,
            pad_to_slot: true,
            lead_in: 0.5,
        })
        .encode("K1ABC W9XYZ FN20", 1500.0)
        .unwrap();
        assert_eq!(padded.len(), FT8_SLOT_SAMPLES);
        assert!(padded[..6000].iter().all(|&s| s == 0.0));
        assert!(padded.iter().all(|s| s.abs() <= 0.5));
        assert!(padded[6000 + FT8_WAVE_SAMPLES..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn rejects_bad_input() {
        let encoder = Encoder::default();
        assert!(matches!(encoder.encode("", 1500.0), Err(Ft8Error::InvalidFormat(_))));
        for f0 in [-5.0, 5990.0, f32::NAN] {
            let result = encoder.encode("K1ABC W9XYZ FN20", f0);
            assert!(matches!(result, Err(Ft8Error::InvalidFrequency(_))), "{}", f0);
        }
    }

    #[test]
    fn rejects_bad_settings() {
        let settings = [
            (1.0, f32::INFINITY),
            (1.0, f32::NAN),
            (1.0, -0.5),
            (1.0, 20.0),
            (0.0, 0.0),
            (1.5, 0.0),
            (f32::NAN, 0.0),
        ];
        for (amplitude, lead_in) in settings {
            let encoder = Encoder::new(EncoderConfig { amplitude, lead_in, pad_to_slot: true });
            let result = encoder.encode("K1ABC W9XYZ FN20", 1500.0);
            assert!(
                matches!(result, Err(Ft8Error::Config(ConfigError::Invalid(_)))),
                "amplitude {} lead_in {}",
                amplitude,
                lead_in
            );
        }
    }

    #[test]
    fn encoder_saves_calls() {
        let table = Arc::new(MemoryHashTable::new());
        let encoder = Encoder::default().with_hash_table(table.clone());
        encoder.tones("W9XYZ PJ4/K1ABC RR73").unwrap();
        assert_eq!(table.len(), 2);
    }
}
