//! Costas sync search, tone likelihoods and per-candidate decoding.

use tracing::trace;

use crate::cancel::CancelToken;
use crate::constant::*;
use crate::crc::ftx_strip_crc;
use crate::error::{Ft8Error, Result};
use crate::ft8encode::ft8_encode;
use crate::hash::CallsignHashTable;
use crate::ldpc::{recover, LdpcAlgorithm};
use crate::message::{Message, Payload};
use crate::monitor::{Candidate, Waterfall};

/// Time offsets searched, in blocks relative to the buffer start
const TIME_OFFSET_FROM: i32 = -12;
const TIME_OFFSET_TO: i32 = 24;

/// Reported SNR never goes below this, dB
const MIN_SNR_DB: f32 = -30.0;

/// Target variance of the normalized channel LLRs
const LLR_VARIANCE: f32 = 24.0;

pub struct FT8FindSync<'a> {
    wf: &'a Waterfall,
}

impl<'a> FT8FindSync<'a> {
    pub fn new(wf: &'a Waterfall) -> FT8FindSync<'a> {
        FT8FindSync { wf }
    }

    /// Average contrast of each Costas tone against its neighbours in
    /// frequency and in time.
    pub fn ft8_sync_score(&self, candidate: &Candidate) -> i32 {
        let mut score = 0i32;
        let mut num_average = 0i32;

        for m in 0..FT8_NUM_SYNC {
            for k in 0..FT8_LENGTH_SYNC {
                let block = (FT8_SYNC_OFFSET * m) + k;
                let Some(p8) = self.wf.tones(candidate, block) else {
                    continue;
                };
                let sm = FT8_COSTAS_PATTERN[k];
                let v = p8[sm] as i32;

                if sm > 0 {
                    score += v - p8[sm - 1] as i32;
                    num_average += 1;
                }
                if sm < 7 {
                    score += v - p8[sm + 1] as i32;
                    num_average += 1;
                }
                if k > 0 {
                    if let Some(prev) = self.wf.tones(candidate, block - 1) {
                        score += v - prev[sm] as i32;
                        num_average += 1;
                    }
                }
                if k + 1 < FT8_LENGTH_SYNC {
                    if let Some(next) = self.wf.tones(candidate, block + 1) {
                        score += v - next[sm] as i32;
                        num_average += 1;
                    }
                }
            }
        }
        if num_average > 0 {
            score /= num_average;
        }
        score
    }

    /// Local maxima of the sync score at or above `min_score`, best first,
    /// at most `max_candidates` of them.
    pub fn ft8_find_sync(&self, min_score: i32, max_candidates: usize) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        let num_offsets = self.wf.num_bins.saturating_sub(FT8_NUM_TONES - 1);
        let num_times = (TIME_OFFSET_TO - TIME_OFFSET_FROM) as usize;
        if self.wf.num_blocks == 0 || num_offsets == 0 {
            return candidates;
        }

        let mut scores = vec![0i32; num_times * num_offsets];
        for time_sub in 0..self.wf.time_osr {
            for freq_sub in 0..self.wf.freq_osr {
                for (t, time_offset) in (TIME_OFFSET_FROM..TIME_OFFSET_TO).enumerate() {
                    for freq_offset in 0..num_offsets {
                        let c = Candidate {
                            score: 0,
                            time_offset,
                            freq_offset,
                            time_sub,
                            freq_sub,
                        };
                        scores[t * num_offsets + freq_offset] = self.ft8_sync_score(&c);
                    }
                }

                for t in 0..num_times {
                    for f in 0..num_offsets {
                        let score = scores[t * num_offsets + f];
                        if score < min_score {
                            continue;
                        }
                        if !is_local_max(&scores, num_times, num_offsets, t, f) {
                            continue;
                        }
                        candidates.push(Candidate {
                            score,
                            time_offset: TIME_OFFSET_FROM + t as i32,
                            freq_offset: f,
                            time_sub,
                            freq_sub,
                        });
                    }
                }
            }
        }

        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates.truncate(max_candidates);
        trace!("sync search kept {} candidates", candidates.len());
        candidates
    }
}

fn is_local_max(scores: &[i32], rows: usize, cols: usize, t: usize, f: usize) -> bool {
    let score = scores[t * cols + f];
    for dt in -1i32..=1 {
        for df in -1i32..=1 {
            if dt == 0 && df == 0 {
                continue;
            }
            let (tn, fn_) = (t as i32 + dt, f as i32 + df);
            if tn < 0 || fn_ < 0 || tn as usize >= rows || fn_ as usize >= cols {
                continue;
            }
            if scores[tn as usize * cols + fn_ as usize] > score {
                return false;
            }
        }
    }
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub text: String,
    pub message: Message,
    pub freq_hz: f32,
    pub time_sec: f32,
    pub snr: f32,
    pub score: i32,
}

pub struct FT8Decode<'a> {
    wf: &'a Waterfall,
}

fn max4(a: f32, b: f32, c: f32, d: f32) -> f32 {
    a.max(b).max(c.max(d))
}

/// Scales LLRs so that their variance is fixed; a flat vector is left alone.
pub fn ftx_normalize_logl(log174: &mut [f32; FTX_LDPC_N]) {
    let mut sum = 0.0f32;
    let mut sum2 = 0.0f32;

    for lg in log174.iter() {
        sum += lg;
        sum2 += lg * lg;
    }

    let inv_n = 1.0f32 / FTX_LDPC_N as f32;
    let variance = (sum2 - (sum * sum * inv_n)) * inv_n;
    if !(variance > 0.0) {
        return;
    }

    let norm_factor = (LLR_VARIANCE / variance).sqrt();
    for lg in log174.iter_mut() {
        *lg *= norm_factor;
    }
}

impl<'a> FT8Decode<'a> {
    pub fn new(wf: &'a Waterfall) -> FT8Decode<'a> {
        FT8Decode { wf }
    }

    fn ft8_extract_symbol(p8: &[u8], logl: &mut [f32; FTX_LDPC_N], bit_idx: usize) {
        // tone energies in 3-bit Gray code order
        let mut s2 = [0.0f32; 8];
        for (j, s) in s2.iter_mut().enumerate() {
            *s = p8[FT8_GRAY_MAP[j]] as f32;
        }
        logl[bit_idx] = max4(s2[4], s2[5], s2[6], s2[7]) - max4(s2[0], s2[1], s2[2], s2[3]);
        logl[bit_idx + 1] = max4(s2[2], s2[3], s2[6], s2[7]) - max4(s2[0], s2[1], s2[4], s2[5]);
        logl[bit_idx + 2] = max4(s2[1], s2[3], s2[5], s2[7]) - max4(s2[0], s2[2], s2[4], s2[6]);
    }

    /// Max-log bit likelihoods of the 58 data symbols; symbols outside the
    /// waterfall contribute zero.
    pub fn ft8_extract_likelihood(&self, c: &Candidate) -> [f32; FTX_LDPC_N] {
        let mut log174 = [0.0f32; FTX_LDPC_N];
        for k in 0..FT8_ND {
            // skip over the Costas blocks
            let sym_idx = k + if k < 29 { 7 } else { 14 };
            if let Some(p8) = self.wf.tones(c, sym_idx) {
                Self::ft8_extract_symbol(p8, &mut log174, 3 * k);
            }
        }
        log174
    }

    /// Power of the transmitted tone against the mean of the other seven,
    /// referred to a 2500 Hz bandwidth.
    pub fn ft8_snr(&self, c: &Candidate, tones: &[usize; FT8_NN]) -> f32 {
        let lin = |m: u8| 10f32.powf((m as f32 - 240.0) / 20.0);
        let mut signal = 0.0f32;
        let mut noise = 0.0f32;
        let mut n = 0;

        for (i, &tone) in tones.iter().enumerate() {
            let Some(p8) = self.wf.tones(c, i) else {
                continue;
            };
            let p: Vec<f32> = p8.iter().map(|&m| lin(m)).collect();
            let total: f32 = p.iter().sum();
            signal += p[tone];
            noise += (total - p[tone]) / (FT8_NUM_TONES - 1) as f32;
            n += 1;
        }
        if n == 0 {
            return MIN_SNR_DB;
        }

        let excess = (signal - noise).max(1e-12);
        let snr = 10.0 * (excess / noise.max(1e-12)).log10() + self.wf.snr_correction_db;
        snr.max(MIN_SNR_DB)
    }

    pub fn ft8_decode(
        &self,
        c: &Candidate,
        algorithm: LdpcAlgorithm,
        max_iteration: usize,
        cancel: &CancelToken,
        table: &dyn CallsignHashTable,
    ) -> Result<DecodedMessage> {
        let mut log174 = self.ft8_extract_likelihood(c);
        ftx_normalize_logl(&mut log174);

        let a91 = recover(&log174, algorithm, max_iteration, cancel)?;
        // an all-zero codeword satisfies every check and the CRC
        if a91.iter().all(|&b| b == 0) {
            return Err(Ft8Error::ChecksumInvalid);
        }

        let payload = Payload(ftx_strip_crc(&a91));
        let message = Message::from_payload(&payload, table)?;
        let snr = self.ft8_snr(c, &ft8_encode(&payload));

        Ok(DecodedMessage {
            text: message.to_string(),
            message,
            freq_hz: self.wf.frequency(c),
            time_sec: self.wf.time(c),
            snr,
            score: c.score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ft8encode::Encoder;
    use crate::hash::NoHashTable;
    use crate::monitor::{Monitor, MonitorConfig};

    fn waterfall_of(text: &str, f0: f32) -> Waterfall {
        let samples = Encoder::default().encode(text, f0).unwrap();
        Monitor::new(&MonitorConfig::default()).unwrap().waterfall(&samples).unwrap()
    }

    #[test]
    fn normalize_sets_variance() {
        let mut llr = [0.0f32; FTX_LDPC_N];
        for (i, l) in llr.iter_mut().enumerate() {
            *l = if i % 3 == 0 { 2.0 } else { -1.0 };
        }
        ftx_normalize_logl(&mut llr);
        let mean = llr.iter().sum::<f32>() / FTX_LDPC_N as f32;
        let var = llr.iter().map(|l| (l - mean) * (l - mean)).sum::<f32>() / FTX_LDPC_N as f32;
        assert!((var - 24.0).abs() < 1e-2, "{}", var);

        let mut flat = [0.0f32; FTX_LDPC_N];
        ftx_normalize_logl(&mut flat);
        assert!(flat.iter().all(|&l| l == 0.0));
    }

    #[test]
    fn finds_the_costas_arrays() {
        let wf = waterfall_of("K1ABC W9XYZ FN20", 1500.0);
        let candidates = FT8FindSync::new(&wf).ft8_find_sync(10, 20);
        assert!(!candidates.is_empty());
        assert!(candidates.len() <= 20);
        assert!(candidates.windows(2).all(|w| w[0].score >= w[1].score));

        let best = &candidates[0];
        assert_eq!(best.time_offset, 0);
        assert_eq!(best.time_sub, 0);
        assert!((wf.frequency(best) - 1500.0).abs() <= FT8_TONE_SPACING);
    }

    #[test]
    fn candidate_cap_is_honoured() {
        let wf = waterfall_of("K1ABC W9XYZ FN20", 1500.0);
        let candidates = FT8FindSync::new(&wf).ft8_find_sync(i32::MIN, 5);
        assert_eq!(candidates.len(), 5);
    }

    #[test]
    fn silence_has_no_candidates() {
        let wf = Monitor::new(&MonitorConfig::default())
            .unwrap()
            .waterfall(&vec![0.0; FT8_SLOT_SAMPLES])
            .unwrap();
        assert!(FT8FindSync::new(&wf).ft8_find_sync(10, 100).is_empty());
    }

    #[test]
    fn decodes_the_best_candidate() {
        let wf = waterfall_of("CQ K1ABC FN42", 1000.0);
        let candidates = FT8FindSync::new(&wf).ft8_find_sync(10, 20);
        let decoder = FT8Decode::new(&wf);
        let cancel = CancelToken::new();
        let msg = decoder
            .ft8_decode(&candidates[0], LdpcAlgorithm::SumProduct, 25, &cancel, &NoHashTable)
            .unwrap();
        assert_eq!(msg.text, "CQ K1ABC FN42");
        assert!((msg.freq_hz - 1000.0).abs() <= FT8_TONE_SPACING);
        assert!(msg.time_sec.abs() < 0.1);
        // leakage between neighbouring symbols caps the estimate of a clean signal
        assert!(msg.snr > -12.0 && msg.snr < 0.0, "{}", msg.snr);
    }

    #[test]
    fn likelihoods_follow_the_tones() {
        let wf = waterfall_of("K1ABC W9XYZ FN20", 1500.0);
        let best = FT8FindSync::new(&wf).ft8_find_sync(10, 1)[0];
        let llr = FT8Decode::new(&wf).ft8_extract_likelihood(&best);

        let tones = Encoder::default().tones("K1ABC W9XYZ FN20").unwrap();
        // first data symbol, MSB of its Gray code value
        let value = FT8_GRAY_MAP.iter().position(|&t| t == tones[7]).unwrap();
        assert_eq!(llr[0] > 0.0, value & 4 != 0);
    }
}
