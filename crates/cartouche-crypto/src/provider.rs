//! Key-slot storage and the provider trait injected into loaders.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::keys::{parse_key_hex, scramble_normal_key};
use crate::{CryptoError, Result};

/// Hardware key slots used by cartridge containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeySlot {
    /// Primary container slot (extended header and section table).
    Ncch = 0x2C,
    /// Alternate slot introduced by the 7.x firmware generation.
    Ncch7x = 0x25,
    /// Alternate "secure 3" slot.
    NcchSecure3 = 0x18,
    /// Alternate "secure 4" slot.
    NcchSecure4 = 0x1B,
}

impl KeySlot {
    /// Look up a slot by its hardware id.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x2C => Some(Self::Ncch),
            0x25 => Some(Self::Ncch7x),
            0x18 => Some(Self::NcchSecure3),
            0x1B => Some(Self::NcchSecure4),
            _ => None,
        }
    }

    /// The hardware slot id.
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Source of per-slot normal keys.
///
/// Implementations combine the caller-supplied keyY with whatever per-slot
/// material they hold. Returning `None` means the slot cannot produce a key,
/// which the loader reports as an encryption failure.
pub trait KeyProvider {
    /// Derive the normal key for `slot` using the given keyY, or report the
    /// slot as unavailable.
    fn derive_normal_key(&self, slot: KeySlot, key_y: &[u8; 16]) -> Option<[u8; 16]>;
}

/// In-memory key-slot store.
///
/// Holds per-slot keyX values (scrambled with the supplied keyY on demand)
/// and optional preset normal keys, which take precedence when both exist.
#[derive(Debug, Default)]
pub struct SlotKeyStore {
    key_x: HashMap<KeySlot, [u8; 16]>,
    normal: HashMap<KeySlot, [u8; 16]>,
}

impl SlotKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the keyX for a slot.
    pub fn set_key_x(&mut self, slot: KeySlot, key_x: [u8; 16]) {
        self.key_x.insert(slot, key_x);
    }

    /// Set a fixed normal key for a slot, bypassing the scrambler.
    pub fn set_normal_key(&mut self, slot: KeySlot, key: [u8; 16]) {
        self.normal.insert(slot, key);
    }

    /// Number of slots with any key material.
    pub fn slot_count(&self) -> usize {
        let mut slots: Vec<_> = self.key_x.keys().collect();
        slots.extend(self.normal.keys());
        slots.sort_unstable_by_key(|s| s.id());
        slots.dedup();
        slots.len()
    }

    /// Load slot keys from a key file.
    ///
    /// Each line is `slot0x2CKeyX=<32 hex chars>` or `slot0x2CKeyN=<32 hex
    /// chars>`; blank lines and `#` comments are skipped, malformed lines are
    /// warned about and skipped.
    pub fn load_key_file(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)?;
        let loaded = self.load_keys(&content);
        info!("Loaded {} slot keys from {}", loaded, path.display());
        Ok(loaded)
    }

    /// Load slot keys from key-file text. Returns the number of keys taken.
    pub fn load_keys(&mut self, content: &str) -> usize {
        let mut loaded = 0;

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }

            match self.parse_key_line(line) {
                Ok(()) => loaded += 1,
                Err(e) => {
                    warn!("Skipping key line {}: {}", line_num + 1, e);
                }
            }
        }

        loaded
    }

    fn parse_key_line(&mut self, line: &str) -> Result<()> {
        let (name, hex_str) = line
            .split_once('=')
            .ok_or_else(|| CryptoError::InvalidKeyFormat("missing '='".to_string()))?;

        let name = name.trim();
        let rest = name
            .strip_prefix("slot0x")
            .ok_or_else(|| CryptoError::InvalidKeyFormat(format!("bad key name: {name}")))?;

        let (id_str, kind) = rest.split_at(rest.len().saturating_sub(4));
        let slot_id = u8::from_str_radix(id_str, 16)
            .map_err(|_| CryptoError::InvalidKeyFormat(format!("bad slot id: {name}")))?;
        let slot = KeySlot::from_id(slot_id)
            .ok_or_else(|| CryptoError::InvalidKeyFormat(format!("unknown slot: {name}")))?;

        let key = parse_key_hex(hex_str)?;
        match kind {
            "KeyX" => self.set_key_x(slot, key),
            "KeyN" => self.set_normal_key(slot, key),
            _ => {
                return Err(CryptoError::InvalidKeyFormat(format!(
                    "unknown key kind: {name}"
                )));
            }
        }

        debug!("Loaded {} for slot {:#04x}", kind, slot_id);
        Ok(())
    }
}

impl KeyProvider for SlotKeyStore {
    fn derive_normal_key(&self, slot: KeySlot, key_y: &[u8; 16]) -> Option<[u8; 16]> {
        if let Some(normal) = self.normal.get(&slot) {
            return Some(*normal);
        }
        self.key_x
            .get(&slot)
            .map(|key_x| scramble_normal_key(key_x, key_y))
    }
}
