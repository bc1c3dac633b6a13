//! LDPC(174,91) encoder and iterative decoders.
//!
//! LLR convention: a positive value favours bit 1.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cancel::CancelToken;
use crate::constant::*;
use crate::crc::ftx_check_crc;
use crate::error::{Ft8Error, Result};

/// Channel LLRs are saturated to this magnitude before decoding.
pub const LLR_CLAMP: f32 = 30.0;
pub const DEFAULT_LDPC_ITERATIONS: usize = 25;

/// Scaling of the min-sum check messages.
const MIN_SUM_ALPHA: f32 = 0.75;

/// Check node update rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LdpcAlgorithm {
    #[default]
    SumProduct,
    MinSum,
}

#[cfg(not(feature = "use_f32tan"))]
fn fast_tanh(x: f32) -> f32 {
    if x < -4.97f32 {
        return -1.0f32;
    }
    if x > 4.97f32 {
        return 1.0f32;
    }
    let x2 = x * x;
    let a = x * (945.0f32 + x2 * (105.0f32 + x2));
    let b = 945.0f32 + x2 * (420.0f32 + x2 * 15.0f32);
    a / b
}

#[cfg(not(feature = "use_f32tan"))]
fn fast_atanh(x: f32) -> f32 {
    let x2 = x * x;
    let a = x * (945.0f32 + x2 * (-735.0f32 + x2 * 64.0f32));
    let b = 945.0f32 + x2 * (-1050.0f32 + x2 * 225.0f32);
    a / b
}

#[cfg(feature = "use_f32tan")]
fn fast_tanh(x: f32) -> f32 {
    libm::tanhf(x)
}

#[cfg(feature = "use_f32tan")]
fn fast_atanh(x: f32) -> f32 {
    // keep away from the poles at +-1
    libm::atanhf(x.clamp(-0.999_999, 0.999_999))
}

// Returns 1 if an odd number of bits are set in x, zero otherwise
pub fn parity8(mut x: u8) -> u8 {
    x ^= x >> 4; // a b c d ae bf cg dh
    x ^= x >> 2; // a b ac bd cae dbf aecg bfdh
    x ^= x >> 1; // a ab bac acbd bdcae caedbf aecgbfdh
    x % 2 // modulo 2
}

/// Systematic LDPC encode: the 91 message bits followed by 83 parity bits,
/// each the parity of the message ANDed with one generator row.
pub fn protect(message: &[u8; FTX_LDPC_K_BYTES]) -> [u8; FTX_LDPC_N_BYTES] {
    // Fill the codeword with message and zeros, as we will only update binary ones later
    let mut codeword = [0u8; FTX_LDPC_N_BYTES];
    codeword[..FTX_LDPC_K_BYTES].copy_from_slice(message);
    // bits past the 91st belong to the parity section
    codeword[FTX_LDPC_K_BYTES - 1] &= 0xE0;

    // Compute the byte index and bit mask for the first checksum bit
    let mut col_mask = 0x80u8 >> (FTX_LDPC_K % 8);
    let mut col_idx = FTX_LDPC_K_BYTES - 1;

    for row in FTX_LDPC_GENERATOR.iter() {
        // dot product modulo 2 between message and the generator row
        let nsum = message
            .iter()
            .zip(row.iter())
            .fold(0u8, |acc, (m, g)| acc ^ parity8(m & g));

        if nsum != 0 {
            codeword[col_idx] |= col_mask;
        }

        col_mask >>= 1;
        if col_mask == 0 {
            col_mask = 0x80;
            col_idx += 1;
        }
    }
    codeword
}

/// Expands packed MSB-first bytes into one bit per element.
pub fn unpack_bits(packed: &[u8], bits: &mut [u8]) {
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (packed[i / 8] >> (7 - i % 8)) & 1;
    }
}

/// Packs one bit per element into MSB-first bytes.
pub fn pack_bits(bits: &[u8], packed: &mut [u8]) {
    packed.fill(0);
    for (i, &bit) in bits.iter().enumerate() {
        if bit != 0 {
            packed[i / 8] |= 0x80 >> (i % 8);
        }
    }
}

/// Number of unsatisfied parity checks.
pub fn ldpc_check(codeword: &[u8; FTX_LDPC_N]) -> usize {
    let mut errors: usize = 0;
    for m in 0..FTX_LDPC_M {
        let x = FTX_LDPC_NM[m][..FTX_LDPC_NUM_ROWS[m]]
            .iter()
            .fold(0u8, |x, &i| x ^ codeword[i - 1]);
        if x != 0 {
            errors += 1;
        }
    }
    errors
}

fn hard_decision(
    llr: &[f32; FTX_LDPC_N],
    tov: &[[f32; 3]; FTX_LDPC_N],
    plain: &mut [u8; FTX_LDPC_N],
) {
    for n in 0..FTX_LDPC_N {
        plain[n] = if (llr[n] + tov[n][0] + tov[n][1] + tov[n][2]) > 0.0f32 { 1 } else { 0 };
    }
}

/// Message passing decoder. `plain` ends up with the last hard decision;
/// returns the fewest unsatisfied checks seen.
pub fn bp_decode(
    codeword: &[f32; FTX_LDPC_N],
    algorithm: LdpcAlgorithm,
    max_iters: usize,
    plain: &mut [u8; FTX_LDPC_N],
    cancel: &CancelToken,
) -> Result<usize> {
    let mut tov = [[0.0f32; 3]; FTX_LDPC_N];
    let mut toc = [[0.0f32; 7]; FTX_LDPC_M];

    let mut min_errors = FTX_LDPC_M;

    for it in 0..max_iters {
        if cancel.is_cancelled() {
            return Err(Ft8Error::Cancelled);
        }

        hard_decision(codeword, &tov, plain);
        let errors = ldpc_check(plain);
        if errors < min_errors {
            min_errors = errors;
            if errors == 0 {
                trace!("ldpc converged after {} iterations", it);
                return Ok(0);
            }
        }

        // variable to check
        for m in 0..FTX_LDPC_M {
            for n_idx in 0..FTX_LDPC_NUM_ROWS[m] {
                let n = FTX_LDPC_NM[m][n_idx] - 1;
                let mut tnm = codeword[n];
                for m_idx in 0..3 {
                    if (FTX_LDPC_MN[n][m_idx] - 1) != m {
                        tnm += tov[n][m_idx];
                    }
                }
                toc[m][n_idx] = match algorithm {
                    LdpcAlgorithm::SumProduct => fast_tanh(-tnm / 2.0f32),
                    LdpcAlgorithm::MinSum => -tnm,
                };
            }
        }

        // check to variable
        for n in 0..FTX_LDPC_N {
            for m_idx in 0..3 {
                let m = FTX_LDPC_MN[n][m_idx] - 1;
                let others = (0..FTX_LDPC_NUM_ROWS[m])
                    .filter(|&n_idx| (FTX_LDPC_NM[m][n_idx] - 1) != n)
                    .map(|n_idx| toc[m][n_idx]);
                tov[n][m_idx] = match algorithm {
                    LdpcAlgorithm::SumProduct => -2.0f32 * fast_atanh(others.product::<f32>()),
                    LdpcAlgorithm::MinSum => {
                        let (sign, min) = others.fold((1.0f32, f32::MAX), |(s, mag), v| {
                            (if v < 0.0 { -s } else { s }, mag.min(v.abs()))
                        });
                        -MIN_SUM_ALPHA * sign * min
                    }
                };
            }
        }
    }

    // decide on the messages of the last update too
    hard_decision(codeword, &tov, plain);
    let errors = ldpc_check(plain);
    if errors == 0 {
        trace!("ldpc converged after {} iterations", max_iters);
    }
    Ok(errors.min(min_errors))
}

/// Saturates channel LLRs; NaN carries no information.
pub fn clamp_llr(llr: &[f32; FTX_LDPC_N]) -> [f32; FTX_LDPC_N] {
    let mut clamped = [0.0f32; FTX_LDPC_N];
    for (c, &l) in clamped.iter_mut().zip(llr.iter()) {
        *c = if l.is_nan() { 0.0 } else { l.clamp(-LLR_CLAMP, LLR_CLAMP) };
    }
    clamped
}

/// Decodes 174 channel LLRs back to the 91-bit message (payload and CRC).
pub fn recover(
    llr: &[f32; FTX_LDPC_N],
    algorithm: LdpcAlgorithm,
    max_iters: usize,
    cancel: &CancelToken,
) -> Result<[u8; FTX_LDPC_K_BYTES]> {
    let llr = clamp_llr(llr);
    let mut plain = [0u8; FTX_LDPC_N];
    let errors = bp_decode(&llr, algorithm, max_iters, &mut plain, cancel)?;
    if errors > 0 {
        return Err(Ft8Error::NotConverged { errors });
    }

    let mut a91 = [0u8; FTX_LDPC_K_BYTES];
    pack_bits(&plain[..FTX_LDPC_K], &mut a91);
    if !ftx_check_crc(&a91) {
        return Err(Ft8Error::ChecksumInvalid);
    }
    Ok(a91)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::ftx_add_crc;

    fn sample_message() -> [u8; FTX_LDPC_K_BYTES] {
        ftx_add_crc(&[0x09, 0x5e, 0x3c, 0x2a, 0x71, 0x80, 0x11, 0x9f, 0x44, 0x08])
    }

    fn to_llr(codeword: &[u8; FTX_LDPC_N_BYTES], magnitude: f32) -> [f32; FTX_LDPC_N] {
        let mut bits = [0u8; FTX_LDPC_N];
        unpack_bits(codeword, &mut bits);
        let mut llr = [0.0f32; FTX_LDPC_N];
        for (l, &b) in llr.iter_mut().zip(bits.iter()) {
            *l = if b == 1 { magnitude } else { -magnitude };
        }
        llr
    }

    #[test]
    fn parity() {
        assert_eq!(parity8(0), 0);
        assert_eq!(parity8(0b1011_0000), 1);
        assert_eq!(parity8(0xFF), 0);
    }

    #[test]
    fn protected_codeword_satisfies_all_checks() {
        let a91 = sample_message();
        let codeword = protect(&a91);
        let mut bits = [0u8; FTX_LDPC_N];
        unpack_bits(&codeword, &mut bits);
        assert_eq!(ldpc_check(&bits), 0);
        // systematic
        assert_eq!(&codeword[..11], &a91[..11]);
        assert_eq!(codeword[11] & 0xE0, a91[11] & 0xE0);
    }

    #[test]
    fn zero_message_gives_zero_codeword() {
        assert_eq!(protect(&[0u8; FTX_LDPC_K_BYTES]), [0u8; FTX_LDPC_N_BYTES]);
    }

    #[test]
    fn bit_packing_is_msb_first() {
        let mut packed = [0u8; 2];
        pack_bits(&[1, 0, 0, 0, 0, 0, 0, 1, 1], &mut packed);
        assert_eq!(packed, [0x81, 0x80]);
        let mut bits = [0u8; 9];
        unpack_bits(&packed, &mut bits);
        assert_eq!(bits, [1, 0, 0, 0, 0, 0, 0, 1, 1]);
    }

    #[test]
    fn clean_llrs_recover_without_iterating() {
        let a91 = sample_message();
        let llr = to_llr(&protect(&a91), 5.0);
        let token = CancelToken::new();
        for algorithm in [LdpcAlgorithm::SumProduct, LdpcAlgorithm::MinSum] {
            assert_eq!(recover(&llr, algorithm, 1, &token).unwrap(), a91);
        }
    }

    #[test]
    fn corrects_flipped_bits() {
        let a91 = sample_message();
        let mut llr = to_llr(&protect(&a91), 4.0);
        for i in [3, 40, 77, 100, 150, 170] {
            llr[i] = -llr[i];
        }
        let token = CancelToken::new();
        for algorithm in [LdpcAlgorithm::SumProduct, LdpcAlgorithm::MinSum] {
            assert_eq!(recover(&llr, algorithm, DEFAULT_LDPC_ITERATIONS, &token).unwrap(), a91);
        }
    }

    #[test]
    fn last_update_is_checked() {
        let a91 = sample_message();
        let mut expected = [0u8; FTX_LDPC_N];
        unpack_bits(&protect(&a91), &mut expected);
        let mut llr = to_llr(&protect(&a91), 4.0);
        llr[17] = -llr[17];

        let token = CancelToken::new();
        let mut plain = [0u8; FTX_LDPC_N];
        // one flipped bit is outvoted by its three checks in a single update
        assert_eq!(bp_decode(&llr, LdpcAlgorithm::SumProduct, 1, &mut plain, &token), Ok(0));
        assert_eq!(plain, expected);
        assert_eq!(recover(&llr, LdpcAlgorithm::SumProduct, 1, &token), Ok(a91));

        // with no iterations the channel decision is still checked
        let clean = to_llr(&protect(&a91), 4.0);
        assert_eq!(bp_decode(&clean, LdpcAlgorithm::MinSum, 0, &mut plain, &token), Ok(0));
    }

    #[test]
    fn saturates_and_ignores_nan() {
        let mut llr = [1.0f32; FTX_LDPC_N];
        llr[0] = 1e9;
        llr[1] = f32::NEG_INFINITY;
        llr[2] = f32::NAN;
        let clamped = clamp_llr(&llr);
        assert_eq!(clamped[0], LLR_CLAMP);
        assert_eq!(clamped[1], -LLR_CLAMP);
        assert_eq!(clamped[2], 0.0);
    }

    #[test]
    fn garbage_does_not_converge() {
        // alternating strong LLRs aren't a codeword
        let mut llr = [0.0f32; FTX_LDPC_N];
        for (i, l) in llr.iter_mut().enumerate() {
            *l = if (i * 7) % 3 == 0 { 8.0 } else { -8.0 };
        }
        let result = recover(&llr, LdpcAlgorithm::SumProduct, 5, &CancelToken::new());
        assert!(matches!(
            result,
            Err(Ft8Error::NotConverged { .. }) | Err(Ft8Error::ChecksumInvalid)
        ));
    }

    #[test]
    fn cancelled_before_first_iteration() {
        let token = CancelToken::new();
        token.cancel();
        let llr = to_llr(&protect(&sample_message()), 5.0);
        assert_eq!(recover(&llr, LdpcAlgorithm::SumProduct, 25, &token), Err(Ft8Error::Cancelled));
    }
}
