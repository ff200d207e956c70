//! Container (NCCH) header parsing.
//!
//! A cartridge image is either a bare NCCH container or an NCSD wrapper
//! holding several of them. Both carry their magic at offset 0x100 of a
//! 0x200-byte header, so the loader reads one header, inspects the magic and
//! re-reads from [`NCSD_FIRST_PARTITION_OFFSET`] when it finds the wrapper.
//! Only the first (bootable) partition of a wrapper is honored.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::error::{FormatError, FormatResult};

/// Magic of an inner executable container.
pub const NCCH_MAGIC: [u8; 4] = *b"NCCH";

/// Magic of the outer multi-container wrapper.
pub const NCSD_MAGIC: [u8; 4] = *b"NCSD";

/// Size of the container header in bytes.
pub const NCCH_HEADER_SIZE: usize = 0x200;

/// Block unit for offset and size fields.
pub const BLOCK_SIZE: u64 = 0x200;

/// Byte offset of the first partition inside an NCSD wrapper.
pub const NCSD_FIRST_PARTITION_OFFSET: u64 = 0x4000;

/// Container header (0x200 bytes, little-endian).
///
/// Offset and size fields are stored in [`BLOCK_SIZE`] units.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct NcchHeader {
    /// RSA signature over the header; its first 16 bytes double as the
    /// container keyY.
    pub signature: [u8; 0x100],
    /// `NCCH` for a container, `NCSD` for the outer wrapper.
    pub magic: [u8; 4],
    /// Content size in blocks.
    pub content_size: u32,
    /// Partition id, kept as raw bytes: counter construction uses both byte
    /// orders depending on the header version.
    pub partition_id: [u8; 8],
    /// Maker code.
    pub maker_code: [u8; 2],
    /// Header version; selects the counter-construction scheme.
    pub version: u16,
    /// Seed verification word.
    pub seed_check: u32,
    /// Program id.
    pub program_id: u64,
    /// Logo region hash.
    #[brw(pad_before = 0x10)]
    pub logo_region_hash: [u8; 0x20],
    /// Product code.
    pub product_code: [u8; 0x10],
    /// Extended header hash.
    pub exheader_hash: [u8; 0x20],
    /// Extended header size in bytes.
    pub exheader_size: u32,
    /// Crypto and content flags. `flags[3]` selects the secondary key slot,
    /// `flags[7]` bit 0 is fixed-key mode and bit 5 seed mode.
    #[brw(pad_before = 4)]
    pub flags: [u8; 8],
    /// Plain region offset in blocks.
    pub plain_region_offset: u32,
    /// Plain region size in blocks.
    pub plain_region_size: u32,
    /// Logo region offset in blocks.
    pub logo_region_offset: u32,
    /// Logo region size in blocks.
    pub logo_region_size: u32,
    /// Section table (ExeFS) offset in blocks.
    pub exefs_offset: u32,
    /// Section table (ExeFS) size in blocks.
    pub exefs_size: u32,
    /// ExeFS hash region size in blocks.
    pub exefs_hash_region_size: u32,
    /// Secondary filesystem (RomFS) offset in blocks.
    #[brw(pad_before = 4)]
    pub romfs_offset: u32,
    /// Secondary filesystem (RomFS) size in blocks.
    pub romfs_size: u32,
    /// RomFS hash region size in blocks.
    pub romfs_hash_region_size: u32,
    /// ExeFS superblock hash.
    #[brw(pad_before = 4)]
    pub exefs_super_block_hash: [u8; 0x20],
    /// RomFS superblock hash.
    pub romfs_super_block_hash: [u8; 0x20],
}

impl NcchHeader {
    /// Decode a header from exactly [`NCCH_HEADER_SIZE`] bytes.
    ///
    /// The magic is not validated here; the loader inspects it to decide
    /// between bare-container and wrapper handling.
    pub fn parse(data: &[u8]) -> FormatResult<Self> {
        if data.len() < NCCH_HEADER_SIZE {
            return Err(FormatError::TruncatedData {
                expected: NCCH_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        Ok(Self::read(&mut cursor)?)
    }

    /// Encode the header back to its 0x200-byte form.
    pub fn to_bytes(&self) -> FormatResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(NCCH_HEADER_SIZE));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// The container keyY: the first 16 bytes of the signature field.
    pub fn key_y(&self) -> [u8; 16] {
        let mut key_y = [0u8; 16];
        key_y.copy_from_slice(&self.signature[..16]);
        key_y
    }

    /// Fixed-key mode: every region is encrypted with the all-zero key.
    pub fn is_fixed_key(&self) -> bool {
        self.flags[7] & 0x01 != 0
    }

    /// Seed-derived keyY mode (unsupported).
    pub fn uses_seed_crypto(&self) -> bool {
        self.flags[7] & 0x20 != 0
    }

    /// Secondary key-slot selector for the code section and RomFS.
    pub fn crypto_method(&self) -> u8 {
        self.flags[3]
    }

    /// Section table offset in bytes, relative to the container base.
    pub fn exefs_byte_offset(&self) -> u64 {
        u64::from(self.exefs_offset) * BLOCK_SIZE
    }

    /// Section table size in bytes.
    pub fn exefs_byte_size(&self) -> u64 {
        u64::from(self.exefs_size) * BLOCK_SIZE
    }

    /// RomFS offset in bytes, relative to the container base.
    pub fn romfs_byte_offset(&self) -> u64 {
        u64::from(self.romfs_offset) * BLOCK_SIZE
    }

    /// RomFS size in bytes.
    pub fn romfs_byte_size(&self) -> u64 {
        u64::from(self.romfs_size) * BLOCK_SIZE
    }
}

impl Default for NcchHeader {
    fn default() -> Self {
        Self {
            signature: [0; 0x100],
            magic: NCCH_MAGIC,
            content_size: 0,
            partition_id: [0; 8],
            maker_code: [0; 2],
            version: 0,
            seed_check: 0,
            program_id: 0,
            logo_region_hash: [0; 0x20],
            product_code: [0; 0x10],
            exheader_hash: [0; 0x20],
            exheader_size: 0,
            flags: [0; 8],
            plain_region_offset: 0,
            plain_region_size: 0,
            logo_region_offset: 0,
            logo_region_size: 0,
            exefs_offset: 0,
            exefs_size: 0,
            exefs_hash_region_size: 0,
            romfs_offset: 0,
            romfs_size: 0,
            romfs_hash_region_size: 0,
            exefs_super_block_hash: [0; 0x20],
            romfs_super_block_hash: [0; 0x20],
        }
    }
}
