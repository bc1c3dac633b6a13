//! Shared helpers for the integration tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

/// Adds white Gaussian noise of the given power (Box-Muller).
pub fn add_awgn(samples: &mut [f32], noise_power: f64, seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let std_dev = noise_power.sqrt();
    for pair in samples.chunks_mut(2) {
        let u1: f64 = rng.gen::<f64>().max(1e-10);
        let u2: f64 = rng.gen();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;
        pair[0] += (r * theta.cos() * std_dev) as f32;
        if let Some(second) = pair.get_mut(1) {
            *second += (r * theta.sin() * std_dev) as f32;
        }
    }
}

/// Noise power giving `snr_db` in a 2500 Hz bandwidth for a unit sine at 12 kHz.
pub fn noise_power_for_snr(snr_db: f64) -> f64 {
    let signal_power = 0.5;
    signal_power / 10f64.powf(snr_db / 10.0) * 6000.0 / 2500.0
}
