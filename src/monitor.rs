//! Spectrogram ("waterfall") of a receive buffer.

use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constant::*;
use crate::error::{ConfigError, Ft8Error, Result};

/// Noise bandwidth the SNR estimate is referred to, Hertz
const SNR_REFERENCE_BANDWIDTH: f32 = 2500.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Hann,
    Hamming,
    Blackman,
    Rect,
}

impl WindowKind {
    pub fn coefficient(self, i: usize, n: usize) -> f32 {
        let x = std::f32::consts::PI * i as f32 / n as f32;
        match self {
            WindowKind::Hann => {
                let s = x.sin();
                s * s
            }
            WindowKind::Hamming => 0.54 - 0.46 * (2.0 * x).cos(),
            WindowKind::Blackman => 0.42 - 0.5 * (2.0 * x).cos() + 0.08 * (4.0 * x).cos(),
            WindowKind::Rect => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sample_rate: u32, // Wave sample rate
    pub f_min: f32,       // Lowest base frequency searched, Hertz
    pub f_max: f32,       // Highest base frequency searched, Hertz
    pub time_osr: usize,
    pub freq_osr: usize,
    pub window: WindowKind,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_rate: FT8_SAMPLE_RATE,
            f_min: 200.0,
            f_max: 3000.0,
            time_osr: 2,
            freq_osr: 2,
            window: WindowKind::Hann,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sample_rate < 2 * FT8_NUM_TONES as u32 * FT8_TONE_SPACING as u32 {
            return Err(format!("[monitor].sample_rate {} is too low", self.sample_rate));
        }
        if self.time_osr == 0 || self.freq_osr == 0 {
            return Err("[monitor].time_osr and freq_osr must be > 0".to_string());
        }
        if !(self.f_min >= 0.0 && self.f_min < self.f_max) {
            return Err(format!(
                "[monitor] search band {}..{} Hz is empty",
                self.f_min, self.f_max
            ));
        }
        let top = self.f_max + (FT8_NUM_TONES + 1) as f32 * FT8_TONE_SPACING;
        if top > self.sample_rate as f32 / 2.0 {
            return Err(format!(
                "[monitor].f_max {} Hz leaves no room below Nyquist",
                self.f_max
            ));
        }
        Ok(())
    }
}

/// A hypothesized signal position in the waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub score: i32,
    pub time_offset: i32, // in blocks, may start before the buffer
    pub freq_offset: usize, // in bins above the waterfall's lowest bin
    pub time_sub: usize,
    pub freq_sub: usize,
}

pub struct Waterfall {
    pub num_blocks: usize, // number of blocks (symbols) stored in the mag array
    pub min_bin: usize,    // first 6.25 Hz bin stored
    pub num_bins: usize,   // number of FFT bins in terms of 6.25 Hz
    pub time_osr: usize,   // number of time subdivisions
    pub freq_osr: usize,   // number of frequency subdivisions
    pub mag: Vec<u8>,      // magnitudes stored as [blocks][time_osr][freq_osr][num_bins]
    pub block_stride: usize, // time_osr * freq_osr * num_bins
    pub max_mag: f32,        // loudest bin seen, dB
    /// Converts a per-bin power ratio to SNR in a 2500 Hz bandwidth
    pub snr_correction_db: f32,
}

impl Waterfall {
    pub fn new(
        num_blocks: usize,
        min_bin: usize,
        num_bins: usize,
        time_osr: usize,
        freq_osr: usize,
    ) -> Result<Self> {
        let block_stride = time_osr * freq_osr * num_bins;
        let mag_size = num_blocks * block_stride;
        let mut mag = Vec::new();
        mag.try_reserve_exact(mag_size)
            .map_err(|_| Ft8Error::Allocation { samples: mag_size })?;
        mag.resize(mag_size, 0);
        Ok(Waterfall {
            num_blocks,
            min_bin,
            num_bins,
            time_osr,
            freq_osr,
            mag,
            block_stride,
            max_mag: -120.0,
            snr_correction_db: 0.0,
        })
    }

    pub fn index(&self, block: usize, time_sub: usize, freq_sub: usize, bin: usize) -> usize {
        block * self.block_stride + (time_sub * self.freq_osr + freq_sub) * self.num_bins + bin
    }

    /// Magnitudes of the eight tones of `c` at a block relative to its time offset,
    /// or `None` outside the waterfall.
    pub fn tones(&self, c: &Candidate, block: usize) -> Option<&[u8]> {
        let block_abs = c.time_offset + block as i32;
        if block_abs < 0 || block_abs as usize >= self.num_blocks {
            return None;
        }
        if c.freq_offset + FT8_NUM_TONES > self.num_bins {
            return None;
        }
        let start = self.index(block_abs as usize, c.time_sub, c.freq_sub, c.freq_offset);
        self.mag.get(start..start + FT8_NUM_TONES)
    }

    /// Frequency of tone 0 of a candidate, Hertz.
    pub fn frequency(&self, c: &Candidate) -> f32 {
        let bin = (self.min_bin + c.freq_offset) as f32 + c.freq_sub as f32 / self.freq_osr as f32;
        bin * FT8_TONE_SPACING
    }

    /// Start time of a candidate relative to the buffer, seconds.
    pub fn time(&self, c: &Candidate) -> f32 {
        (c.time_offset as f32 + c.time_sub as f32 / self.time_osr as f32) * FT8_SYMBOL_PERIOD
    }
}

pub struct Monitor {
    block_size: usize,    // Number of samples per symbol (block)
    subblock_size: usize, // Analysis shift size (number of samples)
    nfft: usize,          // FFT size
    fft_forward: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    min_bin: usize,
    num_bins: usize,
    max_blocks: usize,
    time_osr: usize,
    freq_osr: usize,
    snr_correction_db: f32,
}

impl Monitor {
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Ft8Error::Config(ConfigError::Invalid(e)))?;

        let block_size = (config.sample_rate as f32 * FT8_SYMBOL_PERIOD).round() as usize; // 1920
        let subblock_size = block_size / config.time_osr; // 960
        let nfft = block_size * config.freq_osr; // 3840
        let fft_forward = RealFftPlanner::<f32>::new().plan_fft_forward(nfft);
        let fft_norm = 2.0f32 / nfft as f32;
        let window: Vec<f32> = (0..nfft)
            .map(|i| fft_norm * config.window.coefficient(i, nfft))
            .collect();

        // equivalent noise bandwidth of one bin
        let (sum, sum2) = window
            .iter()
            .fold((0.0f32, 0.0f32), |(s, s2), w| (s + w, s2 + w * w));
        let enbw = config.sample_rate as f32 * sum2 / (sum * sum);

        let min_bin = (config.f_min / FT8_TONE_SPACING) as usize;
        let max_bin = (config.f_max / FT8_TONE_SPACING).ceil() as usize + FT8_NUM_TONES;

        Ok(Monitor {
            block_size,
            subblock_size,
            nfft,
            fft_forward,
            window,
            min_bin,
            num_bins: max_bin - min_bin,
            max_blocks: (FT8_SLOT_TIME / FT8_SYMBOL_PERIOD) as usize, // 93
            time_osr: config.time_osr,
            freq_osr: config.freq_osr,
            snr_correction_db: 10.0 * (enbw / SNR_REFERENCE_BANDWIDTH).log10(),
        })
    }

    /// Builds the waterfall of up to one slot of `samples`. Each analysis
    /// window is centred on its sub-block and zero padded at the buffer edges.
    pub fn waterfall(&self, samples: &[f32]) -> Result<Waterfall> {
        let num_blocks = (samples.len() / self.block_size).min(self.max_blocks);
        let mut wf = Waterfall::new(
            num_blocks,
            self.min_bin,
            self.num_bins,
            self.time_osr,
            self.freq_osr,
        )?;
        wf.snr_correction_db = self.snr_correction_db;

        let mut input = self.fft_forward.make_input_vec();
        let mut spectrum: Vec<Complex<f32>> = self.fft_forward.make_output_vec();
        let mut scratch = self.fft_forward.make_scratch_vec();
        let pad = ((self.nfft - self.block_size) / 2) as isize;

        for block in 0..num_blocks {
            for time_sub in 0..wf.time_osr {
                let frame_from =
                    (block * self.block_size + time_sub * self.subblock_size) as isize - pad;
                for (i, v) in input.iter_mut().enumerate() {
                    let n = frame_from + i as isize;
                    let s = if n < 0 {
                        0.0
                    } else {
                        samples.get(n as usize).copied().unwrap_or(0.0)
                    };
                    *v = s * self.window[i];
                }

                self.fft_forward
                    .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                    .map_err(|e| Ft8Error::Fft(e.to_string()))?;

                for freq_sub in 0..wf.freq_osr {
                    let offset = wf.index(block, time_sub, freq_sub, 0);
                    for bin in 0..wf.num_bins {
                        let src_bin = (wf.min_bin + bin) * wf.freq_osr + freq_sub;
                        let mag2 = spectrum.get(src_bin).map_or(0.0, |c| c.norm_sqr());
                        let db = 10.0 * (1e-12 + mag2).log10();
                        // 0.5 dB steps
                        let scaled = (2.0 * db + 240.0) as i32;
                        wf.mag[offset + bin] = scaled.clamp(0, 255) as u8;

                        if db > wf.max_mag {
                            wf.max_mag = db;
                        }
                    }
                }
            }
        }

        debug!(
            "{} points FFT invoked {} times, peak {:.1} dB",
            self.nfft,
            wf.num_blocks * wf.time_osr,
            wf.max_mag
        );
        Ok(wf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (seconds * FT8_SAMPLE_RATE as f32) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / FT8_SAMPLE_RATE as f32).sin())
            .collect()
    }

    #[test]
    fn empty_buffer_has_no_blocks() {
        let monitor = Monitor::new(&MonitorConfig::default()).unwrap();
        let wf = monitor.waterfall(&[]).unwrap();
        assert_eq!(wf.num_blocks, 0);
        assert!(wf.mag.is_empty());
    }

    #[test]
    fn blocks_are_capped_at_one_slot() {
        let monitor = Monitor::new(&MonitorConfig::default()).unwrap();
        let wf = monitor.waterfall(&vec![0.0; 20 * FT8_SAMPLE_RATE as usize]).unwrap();
        assert_eq!(wf.num_blocks, 93);
        assert_eq!(wf.mag.len(), 93 * wf.block_stride);
    }

    #[test]
    fn tone_lands_in_its_bin() {
        let monitor = Monitor::new(&MonitorConfig::default()).unwrap();
        let wf = monitor.waterfall(&tone(1000.0, 2.0)).unwrap();
        // 1000 Hz is bin 160, the waterfall starts at bin 32
        let start = wf.index(5, 0, 0, 0);
        let row = &wf.mag[start..start + wf.num_bins];
        let peak = (0..row.len()).max_by_key(|&b| row[b]).unwrap();
        assert_eq!(peak, 160 - 32);
        assert!(row[peak] as i32 - row[peak + 4] as i32 > 40);

        let c = Candidate { score: 0, time_offset: 0, freq_offset: 128, time_sub: 0, freq_sub: 0 };
        assert_eq!(wf.frequency(&c), 1000.0);
        assert_eq!(wf.tones(&c, 5).unwrap()[0], row[peak]);
        assert!(wf.tones(&c, 20).is_none());
    }

    #[test]
    fn hann_noise_bandwidth_correction() {
        let monitor = Monitor::new(&MonitorConfig::default()).unwrap();
        assert!((monitor.snr_correction_db + 27.27).abs() < 0.05, "{}", monitor.snr_correction_db);
    }

    #[test]
    fn window_shapes() {
        assert_eq!(WindowKind::Rect.coefficient(3, 16), 1.0);
        assert!((WindowKind::Hann.coefficient(8, 16) - 1.0).abs() < 1e-6);
        assert!(WindowKind::Blackman.coefficient(0, 16).abs() < 1e-6);
        assert!((WindowKind::Hamming.coefficient(0, 16) - 0.08).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_band() {
        let config = MonitorConfig { f_min: 3000.0, f_max: 200.0, ..Default::default() };
        assert!(matches!(Monitor::new(&config), Err(Ft8Error::Config(_))));
        let config = MonitorConfig { f_max: 5990.0, ..Default::default() };
        assert!(config.validate().is_err());
        let config = MonitorConfig { time_osr: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
