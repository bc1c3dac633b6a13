use std::f32::consts::PI;

use crate::constant::FT8_NN;
use crate::error::{Ft8Error, Result};

pub const FT8_SYMBOL_BT: f32 = 2.0f32; // symbol smoothing filter bandwidth factor (BT)
const GFSK_CONST_K: f32 = 5.336446f32; // == pi * sqrt(2 / log(2))

/// Computes a GFSK smoothing pulse.
/// The pulse is theoretically infinitely long, however, here it's truncated
/// at 3 times the symbol length.
/// @param[in] n_spsym Number of samples per symbol
/// @param[in] symbol_bt Shape parameter (2 for FT8)
#[cfg(not(feature = "disable_gfsk"))]
pub fn gfsk_pulse(n_spsym: usize, symbol_bt: f32) -> Vec<f32> {
    (0..3 * n_spsym)
        .map(|i| {
            let t = i as f32 / n_spsym as f32 - 1.5;
            let arg1 = GFSK_CONST_K * symbol_bt * (t + 0.5);
            let arg2 = GFSK_CONST_K * symbol_bt * (t - 0.5);
            (libm::erff(arg1) - libm::erff(arg2)) / 2.0
        })
        .collect()
}

/// Rectangular pulse: plain continuous phase FSK.
#[cfg(feature = "disable_gfsk")]
pub fn gfsk_pulse(n_spsym: usize, _symbol_bt: f32) -> Vec<f32> {
    (0..3 * n_spsym)
        .map(|i| if (n_spsym..2 * n_spsym).contains(&i) { 1.0 } else { 0.0 })
        .collect()
}

fn alloc(samples: usize) -> Result<Vec<f32>> {
    let mut v = Vec::new();
    v.try_reserve_exact(samples)
        .map_err(|_| Ft8Error::Allocation { samples })?;
    v.resize(samples, 0.0);
    Ok(v)
}

/// Synthesize waveform data using GFSK phase shaping, one symbol period per tone.
/// @param[in] symbols Array of tones (0-7)
/// @param[in] f0 Audio frequency in Hertz for tone 0 (base frequency)
/// @param[in] symbol_period Symbol period (duration), seconds
/// @param[in] signal_rate Sample rate of synthesized signal, Hertz
pub fn synth_gfsk(
    symbols: &[usize; FT8_NN],
    f0: f32,
    symbol_period: f32,
    signal_rate: f32,
) -> Result<Vec<f32>> {
    let n_sym = symbols.len();
    let n_spsym = (0.5 + signal_rate * symbol_period) as usize; // Samples per symbol
    let n_wave = n_sym * n_spsym; // Number of output samples
    let hmod = 1.0f32;

    // Compute the smoothed frequency waveform.
    // Length = (nsym+2)*n_spsym samples, first and last symbols extended
    let dphi_peak = 2.0 * PI * hmod / n_spsym as f32;
    let mut dphi = alloc(n_wave + 2 * n_spsym)?;

    // Shift frequency up by f0
    dphi.fill(2.0 * PI * f0 / signal_rate);

    let pulse = gfsk_pulse(n_spsym, FT8_SYMBOL_BT);

    for (i, &tone) in symbols.iter().enumerate() {
        let ib = i * n_spsym;
        for (j, p) in pulse.iter().enumerate() {
            dphi[j + ib] += dphi_peak * tone as f32 * p;
        }
    }

    // Add dummy symbols at beginning and end with tone values equal to
    // 1st and last symbol, respectively
    for j in 0..(2 * n_spsym) {
        dphi[j] += dphi_peak * pulse[j + n_spsym] * symbols[0] as f32;
        dphi[j + n_sym * n_spsym] += dphi_peak * pulse[j] * symbols[n_sym - 1] as f32;
    }

    // Calculate and insert the audio waveform
    let mut signal = alloc(n_wave)?;
    let mut phi = 0.0f32;
    for k in 0..n_wave {
        // Don't include dummy symbols
        signal[k] = phi.sin();
        phi = libm::fmodf(phi + dphi[k + n_spsym], 2.0 * PI);
    }

    // Apply envelope shaping to the first and last symbols
    #[cfg(not(feature = "disable_gfsk_ramp"))]
    {
        let n_ramp = n_spsym / 8;
        for i in 0..n_ramp {
            let env = (1.0 - (2.0 * PI * i as f32 / (2.0 * n_ramp as f32)).cos()) / 2.0;
            signal[i] *= env;
            signal[n_wave - 1 - i] *= env;
        }
    }

    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::*;

    #[test]
    fn waveform_length_and_range() {
        let tones = [0usize; FT8_NN];
        let wave = synth_gfsk(&tones, 1000.0, FT8_SYMBOL_PERIOD, FT8_SAMPLE_RATE as f32).unwrap();
        assert_eq!(wave.len(), FT8_WAVE_SAMPLES);
        assert!(wave.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn pulse_area_is_one_symbol() {
        let pulse = gfsk_pulse(FT8_SYMBOL_SAMPLES, FT8_SYMBOL_BT);
        let area: f32 = pulse.iter().sum::<f32>() / FT8_SYMBOL_SAMPLES as f32;
        assert!((area - 1.0).abs() < 1e-3, "area {}", area);
    }

    #[test]
    fn steady_tone_has_the_expected_frequency() {
        // constant tone 4 at 1000 Hz base -> 1025 Hz; count zero crossings over the middle second
        let tones = [4usize; FT8_NN];
        let wave = synth_gfsk(&tones, 1000.0, FT8_SYMBOL_PERIOD, FT8_SAMPLE_RATE as f32).unwrap();
        let mid = &wave[24000..36000];
        let crossings = mid.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count();
        assert!((1024..=1026).contains(&crossings), "{} crossings", crossings);
    }
}
