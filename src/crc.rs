use crate::constant::*;

const TOPBIT: u16 = 1u16 << (FT8_CRC_WIDTH - 1);

/// CRC-14 over the first `num_bits` bits of `message` (MSB first).
pub fn ftx_compute_crc(message: &[u8], num_bits: usize) -> u16 {
    let mut remainder: u16 = 0;
    let mut idx_byte: usize = 0;

    for idx_bit in 0..num_bits {
        if idx_bit % 8 == 0 {
            remainder ^= (message[idx_byte] as u16) << (FT8_CRC_WIDTH - 8);
            idx_byte += 1;
        }

        if (remainder & TOPBIT) != 0 {
            remainder = (remainder << 1) ^ FT8_CRC_POLYNOMIAL;
        } else {
            remainder <<= 1;
        }
    }
    remainder & ((TOPBIT << 1) - 1u16)
}

pub fn ftx_extract_crc(a91: &[u8; FTX_LDPC_K_BYTES]) -> u16 {
    (((a91[9] & 0x07u8) as u16) << 11) | (a91[10] as u16) << 3 | (a91[11] as u16) >> 5
}

/// Appends the CRC to 77 bits of payload, giving the 91-bit LDPC message.
pub fn ftx_add_crc(payload: &[u8; FTX_PAYLOAD_BYTES]) -> [u8; FTX_LDPC_K_BYTES] {
    let mut a91 = [0u8; FTX_LDPC_K_BYTES];
    a91[..FTX_PAYLOAD_BYTES].copy_from_slice(payload);
    // Clear 3 bits after the payload to make 82 bits
    a91[9] &= 0xF8u8;

    // 'The CRC is calculated on the source-encoded message, zero-extended from 77 to 82 bits'
    let checksum = ftx_compute_crc(&a91, 96 - 14);

    a91[9] |= (checksum >> 11) as u8;
    a91[10] = (checksum >> 3) as u8;
    a91[11] = (checksum << 5) as u8;
    a91
}

/// Recomputes the CRC over the payload part of `a91` and compares it with the stored one.
pub fn ftx_check_crc(a91: &[u8; FTX_LDPC_K_BYTES]) -> bool {
    let crc_extracted = ftx_extract_crc(a91);
    let mut zeroed = *a91;
    zeroed[9] &= 0xF8;
    zeroed[10] = 0x00;
    zeroed[11] = 0x00;
    crc_extracted == ftx_compute_crc(&zeroed, 96 - 14)
}

/// Copies the 77 payload bits out of a 91-bit message.
pub fn ftx_strip_crc(a91: &[u8; FTX_LDPC_K_BYTES]) -> [u8; FTX_PAYLOAD_BYTES] {
    let mut payload = [0u8; FTX_PAYLOAD_BYTES];
    payload.copy_from_slice(&a91[..FTX_PAYLOAD_BYTES]);
    payload[9] &= 0xF8;
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: [u8; FTX_PAYLOAD_BYTES] =
        [0x09, 0x5e, 0x3c, 0x2a, 0x71, 0x80, 0x11, 0x9f, 0x44, 0x08];

    #[test]
    fn added_crc_verifies() {
        let a91 = ftx_add_crc(&PAYLOAD);
        assert!(ftx_check_crc(&a91));
        assert_eq!(ftx_strip_crc(&a91), PAYLOAD);
        assert!(ftx_extract_crc(&a91) < (1 << 14));
    }

    #[test]
    fn single_bit_flips_are_detected() {
        let a91 = ftx_add_crc(&PAYLOAD);
        for bit in 0..FTX_LDPC_K {
            let mut corrupt = a91;
            corrupt[bit / 8] ^= 0x80 >> (bit % 8);
            assert!(!ftx_check_crc(&corrupt), "flip at bit {} went unnoticed", bit);
        }
    }

    #[test]
    fn crc_ignores_bits_past_the_payload() {
        let mut payload = PAYLOAD;
        payload[9] |= 0x07;
        assert_eq!(ftx_add_crc(&payload), ftx_add_crc(&PAYLOAD));
    }
}
