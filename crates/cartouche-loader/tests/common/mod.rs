//! Synthetic cartridge image builder for loader tests.
//!
//! Images are assembled from the real format structures and encrypted with
//! the real CTR engine, with key material computed here independently of the
//! loader's derivation code so the pipeline is exercised end to end.

#![allow(dead_code)]

use cartouche_crypto::{encrypt_ctr, scramble_normal_key};
use cartouche_formats::exheader::CodeSegmentInfo;
use cartouche_formats::{
    EXEFS_HEADER_SIZE, EXHEADER_SIZE, ExHeader, ExeFsHeader, NCCH_HEADER_SIZE, NcchHeader,
};

pub const TEST_PROGRAM_ID: u64 = 0x0004_0000_0F80_0100;
pub const TEST_PARTITION_ID: [u8; 8] = [0x10, 0x32, 0x54, 0x76, 0x98, 0xBA, 0xDC, 0xFE];
pub const TEST_KEY_Y: [u8; 16] = [0x5A; 16];
pub const PRIMARY_KEY_X: [u8; 16] = [0x11; 16];
pub const SECURE3_KEY_X: [u8; 16] = [0x22; 16];

const BLOCK: usize = 0x200;
const EXEFS_OFFSET_BLOCKS: u32 = 5;
const NCSD_HEADER_SIZE: usize = 0x4000;

/// How the built image is encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoMode {
    /// Everything cleartext; the extended header ships decrypted.
    Cleartext,
    /// Fixed-key mode: all-zero key, flags[7] bit 0 set.
    FixedKey,
    /// Primary slot (0x2C) for every region; flags[3] = 0.
    Standard,
    /// Secure3 slot (0x18) for code and RomFS; flags[3] = 0x0A.
    Secure3,
}

/// An LZSS-compressed "ABC" × 10 (see the decompressor's unit tests for the
/// stream layout).
pub fn compressed_abc() -> Vec<u8> {
    let mut buf = vec![0x00, 0x60, 0x00, 0xF0, b'A', b'B', b'C', 0x18];
    buf.extend_from_slice(&0x0800_0010u32.to_le_bytes());
    buf.extend_from_slice(&14u32.to_le_bytes());
    buf
}

pub fn compressed_abc_plaintext() -> Vec<u8> {
    b"ABC".repeat(10)
}

pub struct CartImageBuilder {
    version: u16,
    crypto: CryptoMode,
    compressed: bool,
    wrapped: bool,
    text_pages: u32,
    bss_size: u32,
    sections: Vec<(&'static str, Vec<u8>)>,
    romfs_data: Option<Vec<u8>>,
}

impl CartImageBuilder {
    pub fn new() -> Self {
        Self {
            version: 0,
            crypto: CryptoMode::Cleartext,
            compressed: false,
            wrapped: false,
            text_pages: 8,
            bss_size: 0x0123,
            sections: Vec::new(),
            romfs_data: None,
        }
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn crypto(mut self, mode: CryptoMode) -> Self {
        self.crypto = mode;
        self
    }

    /// Mark the `.code` section as LZSS-compressed.
    pub fn compressed_code(mut self) -> Self {
        self.compressed = true;
        self
    }

    /// Wrap the container in an NCSD envelope at offset 0x4000.
    pub fn wrapped(mut self) -> Self {
        self.wrapped = true;
        self
    }

    pub fn text_pages(mut self, pages: u32) -> Self {
        self.text_pages = pages;
        self
    }

    pub fn bss_size(mut self, size: u32) -> Self {
        self.bss_size = size;
        self
    }

    pub fn section(mut self, name: &'static str, data: Vec<u8>) -> Self {
        self.sections.push((name, data));
        self
    }

    pub fn romfs(mut self, data: Vec<u8>) -> Self {
        self.romfs_data = Some(data);
        self
    }

    pub fn build(self) -> Vec<u8> {
        // Extended header
        let mut exheader = ExHeader::default();
        exheader.codeset.name.copy_from_slice(b"testproc");
        exheader.codeset.flag = u8::from(self.compressed);
        exheader.codeset.text = CodeSegmentInfo {
            address: 0x0010_0000,
            num_max_pages: self.text_pages,
            code_size: 0x7000,
        };
        exheader.codeset.stack_size = 0x4000;
        exheader.codeset.ro = CodeSegmentInfo {
            address: 0x0020_0000,
            num_max_pages: 2,
            code_size: 0x2000,
        };
        exheader.codeset.data = CodeSegmentInfo {
            address: 0x0030_0000,
            num_max_pages: 2,
            code_size: 0x2000,
        };
        exheader.codeset.bss_size = self.bss_size;
        exheader.system_local_caps.program_id = TEST_PROGRAM_ID;
        exheader.system_local_caps.core_version = 2;
        exheader.system_local_caps.flags0 = 0x21; // core 1, system mode 2
        exheader.system_local_caps.priority = 0x30;
        exheader.system_local_caps.resource_limit_category = 1;
        exheader.kernel_caps[0] = 0xFF81_1FFE;
        let mut exheader_bytes = exheader.to_bytes().expect("exheader encodes");

        // Section table and blob
        let mut table = ExeFsHeader::default();
        let mut blob = Vec::new();
        for (index, (name, data)) in self.sections.iter().enumerate() {
            let entry = &mut table.sections[index];
            entry.name[..name.len()].copy_from_slice(name.as_bytes());
            entry.offset = blob.len() as u32;
            entry.size = data.len() as u32;
            blob.extend_from_slice(data);
        }
        let mut table_bytes = table.to_bytes().expect("section table encodes");

        // Container header
        let exefs_end = EXEFS_OFFSET_BLOCKS as usize * BLOCK + EXEFS_HEADER_SIZE + blob.len();
        let romfs_offset_blocks = exefs_end.div_ceil(BLOCK) as u32 + 1;
        let romfs_size_blocks = self
            .romfs_data
            .as_ref()
            .map_or(0, |data| (0x1000 + data.len()).div_ceil(BLOCK) as u32);

        let mut header = NcchHeader {
            version: self.version,
            partition_id: TEST_PARTITION_ID,
            program_id: TEST_PROGRAM_ID,
            exefs_offset: EXEFS_OFFSET_BLOCKS,
            exefs_size: (EXEFS_HEADER_SIZE + blob.len()).div_ceil(BLOCK) as u32,
            ..NcchHeader::default()
        };
        header.signature[..16].copy_from_slice(&TEST_KEY_Y);
        if self.romfs_data.is_some() {
            header.romfs_offset = romfs_offset_blocks;
            header.romfs_size = romfs_size_blocks;
        }
        match self.crypto {
            CryptoMode::Cleartext | CryptoMode::Standard => {}
            CryptoMode::FixedKey => header.flags[7] |= 0x01,
            CryptoMode::Secure3 => header.flags[3] = 0x0A,
        }

        // Encrypt regions
        if self.crypto != CryptoMode::Cleartext {
            let (primary, secondary) = match self.crypto {
                CryptoMode::FixedKey => ([0u8; 16], [0u8; 16]),
                CryptoMode::Standard => {
                    let key = scramble_normal_key(&PRIMARY_KEY_X, &TEST_KEY_Y);
                    (key, key)
                }
                CryptoMode::Secure3 => (
                    scramble_normal_key(&PRIMARY_KEY_X, &TEST_KEY_Y),
                    scramble_normal_key(&SECURE3_KEY_X, &TEST_KEY_Y),
                ),
                CryptoMode::Cleartext => unreachable!(),
            };

            let exheader_ctr = self.region_ctr(1, 0x200);
            let exefs_ctr = self.region_ctr(2, EXEFS_OFFSET_BLOCKS * BLOCK as u32);
            // RomFS stays unencrypted in fixtures; the loader never reads it.

            encrypt_ctr(&mut exheader_bytes, &primary, &exheader_ctr, 0)
                .expect("exheader encrypts");
            encrypt_ctr(&mut table_bytes, &primary, &exefs_ctr, 0).expect("table encrypts");

            for (index, (name, _)) in self.sections.iter().enumerate() {
                let entry = table.sections[index];
                let key = if *name == ".code" { secondary } else { primary };
                let start = entry.offset as usize;
                let end = start + entry.size as usize;
                encrypt_ctr(
                    &mut blob[start..end],
                    &key,
                    &exefs_ctr,
                    u64::from(entry.offset) + EXEFS_HEADER_SIZE as u64,
                )
                .expect("section encrypts");
            }
        }

        // Assemble
        let total = if self.romfs_data.is_some() {
            (romfs_offset_blocks + romfs_size_blocks) as usize * BLOCK
        } else {
            exefs_end
        };
        let mut container = vec![0u8; total];
        container[..NCCH_HEADER_SIZE]
            .copy_from_slice(&header.to_bytes().expect("header encodes"));
        container[NCCH_HEADER_SIZE..NCCH_HEADER_SIZE + EXHEADER_SIZE]
            .copy_from_slice(&exheader_bytes);

        let exefs_pos = EXEFS_OFFSET_BLOCKS as usize * BLOCK;
        container[exefs_pos..exefs_pos + EXEFS_HEADER_SIZE].copy_from_slice(&table_bytes);
        container[exefs_pos + EXEFS_HEADER_SIZE..exefs_pos + EXEFS_HEADER_SIZE + blob.len()]
            .copy_from_slice(&blob);

        if let Some(romfs_data) = &self.romfs_data {
            let data_pos = romfs_offset_blocks as usize * BLOCK + 0x1000;
            container[data_pos..data_pos + romfs_data.len()].copy_from_slice(romfs_data);
        }

        if self.wrapped {
            let mut image = vec![0u8; NCSD_HEADER_SIZE];
            image[0x100..0x104].copy_from_slice(b"NCSD");
            image.extend_from_slice(&container);
            image
        } else {
            container
        }
    }

    /// Initial counter block for a region, computed independently of the
    /// loader's derivation code.
    fn region_ctr(&self, region_type: u8, byte_offset: u32) -> [u8; 16] {
        let mut ctr = [0u8; 16];
        match self.version {
            0 | 2 => {
                for (dst, src) in ctr.iter_mut().zip(TEST_PARTITION_ID.iter().rev()) {
                    *dst = *src;
                }
                ctr[8] = region_type;
            }
            1 => {
                ctr[..8].copy_from_slice(&TEST_PARTITION_ID);
                ctr[12..16].copy_from_slice(&byte_offset.to_be_bytes());
            }
            other => panic!("fixture builder does not support version {other}"),
        }
        ctr
    }
}
