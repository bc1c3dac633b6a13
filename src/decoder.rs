//! Receive session: waterfall, candidate search and parallel decoding.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::cancel::CancelToken;
use crate::error::{ConfigError, Result};
use crate::ft8decode::{DecodedMessage, FT8Decode, FT8FindSync};
use crate::hash::{CallsignHashTable, NoHashTable};
use crate::ldpc::{LdpcAlgorithm, DEFAULT_LDPC_ITERATIONS};
use crate::monitor::{Candidate, Monitor, MonitorConfig, Waterfall};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Most candidates tried per receive window
    pub max_candidates: usize,
    /// Lowest sync score worth decoding
    pub min_score: i32,
    pub ldpc_iterations: usize,
    pub ldpc_algorithm: LdpcAlgorithm,
    /// Worker threads, 0 lets rayon decide
    pub threads: usize,
    /// Same text within this distance is one signal
    pub dedup_tolerance_hz: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_candidates: 140,
            min_score: 10,
            ldpc_iterations: DEFAULT_LDPC_ITERATIONS,
            ldpc_algorithm: LdpcAlgorithm::SumProduct,
            threads: 0,
            dedup_tolerance_hz: 12.5,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_candidates == 0 {
            return Err("[decoder].max_candidates must be > 0".to_string());
        }
        if self.ldpc_iterations == 0 {
            return Err("[decoder].ldpc_iterations must be > 0".to_string());
        }
        if !(self.dedup_tolerance_hz >= 0.0) {
            return Err("[decoder].dedup_tolerance_hz must be >= 0".to_string());
        }
        Ok(())
    }
}

/// A decode session. Owns the spectrum analyser and the worker pool; every
/// call to [`Decoder::decode`] builds its own waterfall, so sessions share
/// nothing and can run side by side.
pub struct Decoder {
    config: DecoderConfig,
    monitor: Monitor,
    pool: ThreadPool,
    hash_table: Arc<dyn CallsignHashTable>,
}

impl Decoder {
    /// Session with protocol defaults and a candidate cap.
    pub fn init(max_candidates: usize) -> Result<Self> {
        let config = DecoderConfig { max_candidates, ..Default::default() };
        Self::new(config, &MonitorConfig::default())
    }

    pub fn new(config: DecoderConfig, monitor_config: &MonitorConfig) -> Result<Self> {
        config.validate().map_err(ConfigError::Invalid)?;
        let monitor = Monitor::new(monitor_config)?;

        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("ft8-decode-{}", i));
        if config.threads > 0 {
            builder = builder.num_threads(config.threads);
        }
        let pool = builder.build()?;
        debug!(
            "decoder ready: {} workers, up to {} candidates",
            pool.current_num_threads(),
            config.max_candidates
        );

        Ok(Self {
            config,
            monitor,
            pool,
            hash_table: Arc::new(NoHashTable),
        })
    }

    /// Callsigns from decoded messages are saved here and used to resolve hashes.
    pub fn with_hash_table(mut self, hash_table: Arc<dyn CallsignHashTable>) -> Self {
        self.hash_table = hash_table;
        self
    }

    pub fn waterfall(&self, samples: &[f32]) -> Result<Waterfall> {
        self.monitor.waterfall(samples)
    }

    pub fn candidates(&self, wf: &Waterfall) -> Vec<Candidate> {
        FT8FindSync::new(wf).ft8_find_sync(self.config.min_score, self.config.max_candidates)
    }

    pub fn decode(&self, samples: &[f32]) -> Vec<DecodedMessage> {
        self.decode_with_cancel(samples, &CancelToken::new())
    }

    /// Decodes one receive window. Never fails: anything that goes wrong
    /// leaves the result empty. A cancelled decode returns nothing.
    pub fn decode_with_cancel(&self, samples: &[f32], cancel: &CancelToken) -> Vec<DecodedMessage> {
        let wf = match self.waterfall(samples) {
            Ok(wf) => wf,
            Err(e) => {
                warn!("no waterfall for {} samples: {}", samples.len(), e);
                return Vec::new();
            }
        };
        let candidates = self.candidates(&wf);
        let decoded = self.decode_candidates(&wf, &candidates, cancel);

        if cancel.is_cancelled() {
            debug!("decode cancelled");
            return Vec::new();
        }

        let messages = dedup(decoded, self.config.dedup_tolerance_hz);
        info!(
            "{} candidates, {} messages decoded",
            candidates.len(),
            messages.len()
        );
        messages
    }

    fn decode_candidates(
        &self,
        wf: &Waterfall,
        candidates: &[Candidate],
        cancel: &CancelToken,
    ) -> Vec<DecodedMessage> {
        let decoder = FT8Decode::new(wf);
        let table = self.hash_table.as_ref();
        let config = &self.config;

        self.pool.install(|| {
            candidates
                .par_iter()
                .filter_map(|c| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let algorithm = config.ldpc_algorithm;
                    match decoder.ft8_decode(c, algorithm, config.ldpc_iterations, cancel, table) {
                        Ok(message) => Some(message),
                        Err(e) => {
                            trace!("candidate {:?}: {}", c, e);
                            None
                        }
                    }
                })
                .collect()
        })
    }

    /// Ends the session.
    pub fn close(self) {
        debug!("decoder closed");
    }
}

/// Keeps the best scoring copy of every message heard more than once
/// within `tolerance_hz`. The result is ordered by descending score.
pub fn dedup(mut decoded: Vec<DecodedMessage>, tolerance_hz: f32) -> Vec<DecodedMessage> {
    decoded.sort_by(|a, b| b.score.cmp(&a.score));
    let mut kept: Vec<DecodedMessage> = Vec::with_capacity(decoded.len());
    for message in decoded {
        let duplicate = kept
            .iter()
            .any(|k| k.text == message.text && (k.freq_hz - message.freq_hz).abs() <= tolerance_hz);
        if !duplicate {
            kept.push(message);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn decoded(text: &str, freq_hz: f32, score: i32) -> DecodedMessage {
        DecodedMessage {
            text: text.to_string(),
            message: Message::FreeText(text.to_string()),
            freq_hz,
            time_sec: 0.0,
            snr: 0.0,
            score,
        }
    }

    #[test]
    fn dedup_keeps_highest_score() {
        let out = dedup(
            vec![
                decoded("TNX 73", 1000.0, 12),
                decoded("TNX 73", 1006.25, 30),
                decoded("TNX 73", 1500.0, 11),
                decoded("HELLO", 1003.0, 20),
            ],
            12.5,
        );
        let summary: Vec<(&str, f32, i32)> =
            out.iter().map(|m| (m.text.as_str(), m.freq_hz, m.score)).collect();
        assert_eq!(
            summary,
            vec![("TNX 73", 1006.25, 30), ("HELLO", 1003.0, 20), ("TNX 73", 1500.0, 11)]
        );
    }

    #[test]
    fn rejects_bad_config() {
        let config = DecoderConfig { max_candidates: 0, ..Default::default() };
        assert!(Decoder::new(config, &MonitorConfig::default()).is_err());
        let config = DecoderConfig { dedup_tolerance_hz: f32::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_input_decodes_to_nothing() {
        let decoder = Decoder::init(50).unwrap();
        assert!(decoder.decode(&[]).is_empty());
        assert!(decoder.decode(&[0.0; 1000]).is_empty());
        decoder.close();
    }

    #[test]
    fn fixed_worker_count() {
        let config = DecoderConfig { threads: 2, ..Default::default() };
        let decoder = Decoder::new(config, &MonitorConfig::default()).unwrap();
        assert_eq!(decoder.pool.current_num_threads(), 2);
    }
}
