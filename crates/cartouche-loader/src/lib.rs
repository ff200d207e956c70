//! Encrypted cartridge container loader
//!
//! Given a cartridge image (a bare NCCH container, or an NCSD wrapper whose
//! first partition is loaded), this crate derives the per-region AES keys,
//! decrypts and validates the extended header, loads the section table and
//! extracts named sections, handing back in-memory artifacts ready for an
//! execution-setup stage:
//!
//! ```no_run
//! use cartouche_crypto::SlotKeyStore;
//! use cartouche_loader::{FileSource, NcchLoader};
//!
//! # fn main() -> Result<(), cartouche_loader::LoadError> {
//! let mut loader = NcchLoader::new(FileSource::new("title.cci"), SlotKeyStore::new())?;
//! let executable = loader.load()?;
//! println!(
//!     "{}: entry {:#010x}, {} bytes of code",
//!     executable.name,
//!     executable.entry_point,
//!     executable.code.len()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! Key material comes from an injected [`KeyProvider`]; the loader itself
//! never stores keys. All operations are synchronous and the loader owns its
//! stream exclusively — except [`NcchLoader::locate_romfs`], which opens an
//! independent stream so downstream filesystem consumption does not disturb
//! the loader's cursor.
//!
//! [`KeyProvider`]: cartouche_crypto::KeyProvider

pub mod error;
pub mod keyderive;
pub mod loader;
pub mod source;

pub use error::{LoadError, LoadResult};
pub use keyderive::{KeyMaterial, NcchKeys, derive_ncch_keys};
pub use loader::{LoadedExecutable, NcchLoader, RomFsLocation, Segment};
pub use source::{CartSource, FileSource, MemorySource};
