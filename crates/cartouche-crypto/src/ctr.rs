//! Seekable AES-128-CTR for cartridge container decryption.
//!
//! Container images encrypt the extended header, the section table and every
//! section as one continuous keystream per region. Extracting a single
//! section therefore requires seeking the keystream to the section's byte
//! position before applying it; [`apply_keystream_at`] does exactly that.

use cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};

use crate::{CryptoError, Result};

/// AES-128 in CTR mode with a big-endian 128-bit counter block.
pub type Aes128Ctr = ::ctr::Ctr128BE<aes::Aes128>;

/// Apply the AES-CTR keystream to `data` in place, starting `offset` bytes
/// into the keystream defined by `key` and the initial counter block `ctr`.
pub fn apply_keystream_at(
    data: &mut [u8],
    key: &[u8; 16],
    ctr: &[u8; 16],
    offset: u64,
) -> Result<()> {
    let mut cipher = Aes128Ctr::new(key.into(), ctr.into());
    cipher
        .try_seek(offset)
        .map_err(|_| CryptoError::KeystreamOutOfRange)?;
    cipher
        .try_apply_keystream(data)
        .map_err(|_| CryptoError::KeystreamOutOfRange)?;

    Ok(())
}

/// Decrypt an in-memory buffer in place.
///
/// `offset` is the byte position of `data` within the encrypted region's
/// keystream, not within the buffer.
pub fn decrypt_ctr(data: &mut [u8], key: &[u8; 16], ctr: &[u8; 16], offset: u64) -> Result<()> {
    apply_keystream_at(data, key, ctr, offset)
}

/// Encrypt an in-memory buffer in place.
///
/// Uses the same keystream as [`decrypt_ctr`] (CTR mode is symmetric).
pub fn encrypt_ctr(data: &mut [u8], key: &[u8; 16], ctr: &[u8; 16], offset: u64) -> Result<()> {
    apply_keystream_at(data, key, ctr, offset)
}
