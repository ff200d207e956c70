//! Binary format parsers for cartridge container images
//!
//! This crate provides the on-disk structures of the cartridge executable
//! format and the codecs needed to interpret them:
//!
//! - **NCCH**: the container header (and the NCSD wrapper magic)
//! - **Extended header**: segment layout, capabilities and execution
//!   parameters of the contained executable
//! - **ExeFS**: the named-section table
//! - **LZSS**: the backward-referencing decompressor used for `.code`
//!
//! Parsing is explicit and endianness-aware (`binrw`, little-endian
//! throughout); no structure is reinterpreted from raw memory. Headers keep
//! their write support so fixtures can be built symmetrically.

pub mod error;
pub mod exefs;
pub mod exheader;
pub mod lzss;
pub mod ncch;

pub use error::{FormatError, FormatResult};
pub use exefs::{EXEFS_HEADER_SIZE, ExeFsHeader, ExeFsSection, MAX_SECTIONS};
pub use exheader::{EXHEADER_SIZE, ExHeader};
pub use ncch::{
    BLOCK_SIZE, NCCH_HEADER_SIZE, NCCH_MAGIC, NCSD_FIRST_PARTITION_OFFSET, NCSD_MAGIC, NcchHeader,
};

/// Memory page size used for segment layout arithmetic.
pub const PAGE_SIZE: u32 = 0x1000;
