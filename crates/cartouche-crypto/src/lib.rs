//! Cryptographic operations for cartridge container loading
//!
//! This crate provides the primitives the container loader needs to decrypt
//! cartridge images:
//!
//! - **AES-128-CTR**: seekable keystream decryption, so a section can be
//!   decrypted starting at an arbitrary byte offset within the stream
//! - **Key scrambler**: the console's hardware key generator, combining a
//!   per-slot keyX with a per-title keyY into a working normal key
//! - **Key storage**: an in-memory slot store and a trait for custom backends
//!
//! # Key Storage
//!
//! Loaders take a [`KeyProvider`] rather than a concrete store, so key
//! material lifecycle stays outside the loading pipeline:
//!
//! ```
//! use cartouche_crypto::{KeyProvider, KeySlot, SlotKeyStore};
//!
//! let mut store = SlotKeyStore::new();
//! store.set_key_x(KeySlot::Ncch, [0u8; 16]);
//!
//! let key_y = [1u8; 16];
//! assert!(store.derive_normal_key(KeySlot::Ncch, &key_y).is_some());
//! assert!(store.derive_normal_key(KeySlot::Ncch7x, &key_y).is_none());
//! ```

pub mod ctr;
pub mod error;
pub mod keys;
pub mod provider;

pub use ctr::{decrypt_ctr, encrypt_ctr};
pub use error::CryptoError;
pub use keys::scramble_normal_key;
pub use provider::{KeyProvider, KeySlot, SlotKeyStore};

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
