//! Hardware key generator and key parsing helpers.

use crate::{CryptoError, Result};

/// Public constant of the console's hardware key generator.
const GENERATOR_CONSTANT: u128 = 0x1FF9E9AAC5FE0408024591DC5D52768A;

/// Combine a per-slot keyX with a per-title keyY into a normal key.
///
/// This is the console's hardware key scrambler:
/// `normal = rotl128((rotl128(keyX, 2) ^ keyY) + C, 87)`
/// where all values are interpreted as big-endian 128-bit integers.
pub fn scramble_normal_key(key_x: &[u8; 16], key_y: &[u8; 16]) -> [u8; 16] {
    let x = u128::from_be_bytes(*key_x);
    let y = u128::from_be_bytes(*key_y);
    let normal = (x.rotate_left(2) ^ y)
        .wrapping_add(GENERATOR_CONSTANT)
        .rotate_left(87);
    normal.to_be_bytes()
}

/// Parse a 32-character hex string into a 16-byte key.
pub fn parse_key_hex(hex_str: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid hex: {e}")))?;

    if bytes.len() != 16 {
        return Err(CryptoError::InvalidKeyFormat(format!(
            "key must be 16 bytes, got {}",
            bytes.len()
        )));
    }

    let mut key = [0u8; 16];
    key.copy_from_slice(&bytes);
    Ok(key)
}
