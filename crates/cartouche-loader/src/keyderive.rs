//! Key and counter derivation for encrypted containers.
//!
//! Different firmware generations changed both the counter-construction
//! convention (header version 0/2 vs 1) and the key-isolation policy between
//! code and data (`flags[3]`). Every branch must be reproduced exactly: a
//! wrong counter or slot decrypts to garbage without any other symptom.

use cartouche_crypto::{KeyProvider, KeySlot};
use cartouche_formats::{BLOCK_SIZE, NcchHeader};
use tracing::{debug, error};

use crate::error::{LoadError, LoadResult};

/// Byte offset of the extended header within the container, used for the
/// version-1 counter suffix.
const EXHEADER_CTR_OFFSET: u32 = 0x200;

/// One derived (key, initial counter block) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMaterial {
    /// AES-128 key.
    pub key: [u8; 16],
    /// Initial counter block; section decryption additionally seeks the
    /// keystream to the section's byte position.
    pub ctr: [u8; 16],
}

/// The four independent key/counter pairs of an encrypted container.
#[derive(Debug, Clone, Copy)]
pub struct NcchKeys {
    /// Extended header region.
    pub exheader: KeyMaterial,
    /// Section table and generic sections.
    pub exefs: KeyMaterial,
    /// The distinguished `.code` section.
    pub exefs_code: KeyMaterial,
    /// Secondary filesystem region.
    pub romfs: KeyMaterial,
}

/// Counter for header versions 0 and 2: reversed partition id, region type
/// in byte 8.
fn counter_v0(partition_id: &[u8; 8], region_type: u8) -> [u8; 16] {
    let mut ctr = [0u8; 16];
    for (dst, src) in ctr.iter_mut().zip(partition_id.iter().rev()) {
        *dst = *src;
    }
    ctr[8] = region_type;
    ctr
}

/// Counter for header version 1: forward partition id, big-endian region
/// byte offset in bytes 12..16.
fn counter_v1(partition_id: &[u8; 8], region_offset: u32) -> [u8; 16] {
    let mut ctr = [0u8; 16];
    ctr[..8].copy_from_slice(partition_id);
    ctr[12..16].copy_from_slice(&region_offset.to_be_bytes());
    ctr
}

/// Derive the four key/counter pairs for an encrypted container.
///
/// `provider` is consulted only outside fixed-key mode; any unavailable slot
/// or unsupported scheme fails with [`LoadError::Encrypted`].
pub fn derive_ncch_keys(
    header: &NcchHeader,
    provider: &impl KeyProvider,
) -> LoadResult<NcchKeys> {
    let partition_id = &header.partition_id;

    let (exheader_ctr, exefs_ctr, romfs_ctr) = match header.version {
        0 | 2 => {
            debug!("Container header version 0/2 counters");
            (
                counter_v0(partition_id, 1),
                counter_v0(partition_id, 2),
                counter_v0(partition_id, 3),
            )
        }
        1 => {
            debug!("Container header version 1 counters");
            // The suffix is a 32-bit byte offset; large block offsets wrap
            // rather than fail, the counter is garbage either way and the
            // program-id recheck catches it.
            (
                counter_v1(partition_id, EXHEADER_CTR_OFFSET),
                counter_v1(
                    partition_id,
                    header.exefs_offset.wrapping_mul(BLOCK_SIZE as u32),
                ),
                counter_v1(
                    partition_id,
                    header.romfs_offset.wrapping_mul(BLOCK_SIZE as u32),
                ),
            )
        }
        version => {
            error!("Unknown container header version {}", version);
            return Err(LoadError::Encrypted(format!(
                "unknown container header version {version}"
            )));
        }
    };

    let (primary_key, secondary_key) = if header.is_fixed_key() {
        debug!("Fixed-key crypto");
        ([0u8; 16], [0u8; 16])
    } else {
        if header.uses_seed_crypto() {
            error!("Seed crypto is not supported");
            return Err(LoadError::Encrypted("seed crypto unsupported".to_string()));
        }

        let key_y = header.key_y();
        let primary = provider
            .derive_normal_key(KeySlot::Ncch, &key_y)
            .ok_or_else(|| {
                error!("Primary key slot {:#04x} unavailable", KeySlot::Ncch.id());
                LoadError::Encrypted(format!(
                    "key slot {:#04x} unavailable",
                    KeySlot::Ncch.id()
                ))
            })?;

        let secondary_slot = match header.crypto_method() {
            0x00 => {
                debug!("Standard crypto");
                None
            }
            0x01 => {
                debug!("7.x crypto");
                Some(KeySlot::Ncch7x)
            }
            0x0A => {
                debug!("Secure3 crypto");
                Some(KeySlot::NcchSecure3)
            }
            0x0B => {
                debug!("Secure4 crypto");
                Some(KeySlot::NcchSecure4)
            }
            method => {
                error!("Unknown crypto method {:#04x}", method);
                return Err(LoadError::Encrypted(format!(
                    "unknown crypto method {method:#04x}"
                )));
            }
        };

        let secondary = match secondary_slot {
            None => primary,
            Some(slot) => provider.derive_normal_key(slot, &key_y).ok_or_else(|| {
                error!("Key slot {:#04x} unavailable", slot.id());
                LoadError::Encrypted(format!("key slot {:#04x} unavailable", slot.id()))
            })?,
        };

        (primary, secondary)
    };

    Ok(NcchKeys {
        exheader: KeyMaterial {
            key: primary_key,
            ctr: exheader_ctr,
        },
        exefs: KeyMaterial {
            key: primary_key,
            ctr: exefs_ctr,
        },
        exefs_code: KeyMaterial {
            key: secondary_key,
            ctr: exefs_ctr,
        },
        romfs: KeyMaterial {
            key: secondary_key,
            ctr: romfs_ctr,
        },
    })
}
