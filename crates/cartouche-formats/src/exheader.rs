//! Extended header (executable metadata block) parsing.
//!
//! The extended header immediately follows the container header and is
//! usually encrypted as one 0x800-byte CTR stream. The loader therefore
//! works on an owned buffer it can decrypt in place, and parses (or
//! re-parses) it with [`ExHeader::parse`]. Whether the block is already
//! cleartext is decided by comparing [`ExHeader::program_id`] against the
//! container header's program id.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::error::{FormatError, FormatResult};

/// Size of the extended header on disk.
pub const EXHEADER_SIZE: usize = 0x800;

/// Number of kernel capability descriptor words.
pub const KERNEL_CAPABILITY_COUNT: usize = 28;

/// Layout of one executable segment.
#[derive(Debug, Clone, Copy, Default, BinRead, BinWrite)]
#[brw(little)]
pub struct CodeSegmentInfo {
    /// Virtual address the segment maps at.
    pub address: u32,
    /// Maximum page count.
    pub num_max_pages: u32,
    /// Segment size in bytes.
    pub code_size: u32,
}

/// Code set description: name, segment layout and stack/bss sizes.
#[derive(Debug, Clone, Default, BinRead, BinWrite)]
#[brw(little)]
pub struct CodeSetInfo {
    /// Process name, zero-padded.
    pub name: [u8; 8],
    /// Flag byte; bit 0 means the `.code` section is LZSS-compressed.
    #[brw(pad_before = 5)]
    pub flag: u8,
    /// Remaster version.
    pub remaster_version: u16,
    /// Text segment.
    pub text: CodeSegmentInfo,
    /// Stack size in bytes.
    pub stack_size: u32,
    /// Read-only segment.
    pub ro: CodeSegmentInfo,
    /// Data segment.
    #[brw(pad_before = 4)]
    pub data: CodeSegmentInfo,
    /// Zero-initialized data size in bytes.
    pub bss_size: u32,
}

/// System-local capabilities of the access control info.
#[derive(Debug, Clone, Default, BinRead, BinWrite)]
#[brw(little)]
pub struct SystemLocalCaps {
    /// Program id; must match the container header's after decryption.
    pub program_id: u64,
    /// Required kernel core version.
    pub core_version: u32,
    /// Flag byte 0: ideal processor (bits 0-1), affinity mask (bits 2-3),
    /// system mode (bits 4-7).
    #[brw(pad_before = 2)]
    pub flags0: u8,
    /// Declared thread priority.
    pub priority: u8,
    /// Resource-limit category.
    #[brw(pad_before = 0x15F)]
    pub resource_limit_category: u8,
}

impl SystemLocalCaps {
    /// Preferred CPU core.
    pub fn ideal_processor(&self) -> u8 {
        self.flags0 & 0x03
    }

    /// Declared memory system mode.
    pub fn system_mode(&self) -> u8 {
        self.flags0 >> 4
    }
}

/// Parsed extended header.
///
/// Only the regions the loader consumes are decoded; the dependency list,
/// storage info and the trailing access descriptor are skipped over.
#[derive(Debug, Clone, Default, BinRead, BinWrite)]
#[brw(little)]
pub struct ExHeader {
    /// Code set info at offset 0.
    pub codeset: CodeSetInfo,
    /// System-local capabilities at offset 0x200.
    #[brw(pad_before = 0x1C0)]
    pub system_local_caps: SystemLocalCaps,
    /// Kernel capability descriptor words at offset 0x370.
    pub kernel_caps: [u32; KERNEL_CAPABILITY_COUNT],
}

impl ExHeader {
    /// Decode an extended header from a [`EXHEADER_SIZE`]-byte buffer.
    pub fn parse(data: &[u8]) -> FormatResult<Self> {
        if data.len() < EXHEADER_SIZE {
            return Err(FormatError::TruncatedData {
                expected: EXHEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        Ok(Self::read(&mut cursor)?)
    }

    /// Encode into a full [`EXHEADER_SIZE`]-byte buffer (unparsed regions
    /// zero-filled), for symmetric fixture building.
    pub fn to_bytes(&self) -> FormatResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(EXHEADER_SIZE));
        self.write(&mut cursor)?;
        let mut bytes = cursor.into_inner();
        bytes.resize(EXHEADER_SIZE, 0);
        Ok(bytes)
    }

    /// The embedded program id.
    pub fn program_id(&self) -> u64 {
        self.system_local_caps.program_id
    }

    /// Whether the `.code` section is LZSS-compressed.
    pub fn is_code_compressed(&self) -> bool {
        self.codeset.flag & 0x01 != 0
    }

    /// Process name with trailing NULs stripped.
    pub fn name(&self) -> String {
        let end = self
            .codeset
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.codeset.name.len());
        String::from_utf8_lossy(&self.codeset.name[..end]).into_owned()
    }
}
