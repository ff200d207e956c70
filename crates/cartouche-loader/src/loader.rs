//! Loader orchestrator: sequences header parsing, key derivation,
//! decryption and section extraction into one idempotent load.

use std::io::{self, Read, Seek, SeekFrom};

use cartouche_crypto::{KeyProvider, ctr::decrypt_ctr};
use cartouche_formats::{
    EXEFS_HEADER_SIZE, EXHEADER_SIZE, ExHeader, ExeFsHeader, FormatError, NCCH_HEADER_SIZE,
    NCCH_MAGIC, NCSD_FIRST_PARTITION_OFFSET, NCSD_MAGIC, NcchHeader, PAGE_SIZE, lzss,
};
use tracing::{debug, error, info};

use crate::error::{LoadError, LoadResult};
use crate::keyderive::{KeyMaterial, derive_ncch_keys};
use crate::source::CartSource;

/// Name of the distinguished code section.
const CODE_SECTION: &str = ".code";

/// Leading part of the RomFS region holding filesystem metadata the loader
/// does not consume.
const ROMFS_METADATA_SIZE: u64 = 0x1000;

/// One loadable segment of the executable image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Segment {
    /// Offset within the code image.
    pub offset: u32,
    /// Virtual address the segment maps at.
    pub addr: u32,
    /// Size in bytes (page aligned).
    pub size: u32,
}

/// Decrypted, decompressed executable image and its execution parameters,
/// ready for an execution-setup stage.
#[derive(Debug, Clone)]
pub struct LoadedExecutable {
    /// Process name from the extended header.
    pub name: String,
    /// Program id.
    pub program_id: u64,
    /// Entry point (the text segment's address).
    pub entry_point: u32,
    /// Code image: text, rodata and data back to back, extended with
    /// page-aligned zero fill for bss.
    pub code: Vec<u8>,
    /// Text segment layout.
    pub text: Segment,
    /// Read-only segment layout.
    pub rodata: Segment,
    /// Data segment layout; its size includes the bss pages.
    pub data: Segment,
    /// Kernel capability descriptor words.
    pub kernel_caps: [u32; cartouche_formats::exheader::KERNEL_CAPABILITY_COUNT],
    /// Declared thread priority.
    pub priority: u8,
    /// Stack size in bytes.
    pub stack_size: u32,
    /// Resource-limit category.
    pub resource_limit_category: u8,
    /// Preferred CPU core.
    pub ideal_processor: u8,
    /// Declared memory system mode.
    pub system_mode: u8,
}

/// Located (but unread) secondary filesystem region.
///
/// The stream is opened independently of the loader's own, positioned at
/// `offset`; consuming it does not disturb the loader.
#[derive(Debug)]
pub struct RomFsLocation<T> {
    /// Independent stream over the cartridge image.
    pub stream: T,
    /// Absolute byte offset of the filesystem data.
    pub offset: u64,
    /// Byte size of the filesystem data.
    pub size: u64,
}

/// Loader for a single cartridge container.
///
/// The load pipeline (header, key derivation, extended-header validation,
/// section table) runs at most once; every accessor triggers it on first use
/// and memoizes the result, so accessors may be called in any order.
pub struct NcchLoader<S: CartSource, P: KeyProvider> {
    source: S,
    provider: P,
    stream: S::Stream,
    ncch_offset: u64,
    header: Option<NcchHeader>,
    exheader: Option<ExHeader>,
    exefs_header: Option<ExeFsHeader>,
    exefs_key: Option<KeyMaterial>,
    exefs_code_key: Option<KeyMaterial>,
    romfs_key: Option<KeyMaterial>,
    is_compressed: bool,
    exefs_loaded: bool,
    loaded: bool,
}

/// Allocate a zeroed buffer, reporting failure instead of aborting.
fn alloc_buffer(size: usize) -> LoadResult<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(size)
        .map_err(|_| LoadError::MemoryAllocationFailed(size))?;
    buffer.resize(size, 0);
    Ok(buffer)
}

impl<S: CartSource, P: KeyProvider> NcchLoader<S, P> {
    /// Create a loader over `source`, deriving keys through `provider`.
    pub fn new(source: S, provider: P) -> LoadResult<Self> {
        let stream = source.open()?;
        Ok(Self {
            source,
            provider,
            stream,
            ncch_offset: 0,
            header: None,
            exheader: None,
            exefs_header: None,
            exefs_key: None,
            exefs_code_key: None,
            romfs_key: None,
            is_compressed: false,
            exefs_loaded: false,
            loaded: false,
        })
    }

    /// Whether [`load`](Self::load) has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Key material for the RomFS region, if the container is encrypted.
    ///
    /// The loader locates but never reads the RomFS; the filesystem stage
    /// consuming [`locate_romfs`](Self::locate_romfs) needs this to decrypt
    /// the region.
    pub fn romfs_key(&mut self) -> LoadResult<Option<&KeyMaterial>> {
        self.load_exefs()?;
        Ok(self.romfs_key.as_ref())
    }

    /// Run the header/key/extended-header/section-table pipeline once.
    fn load_exefs(&mut self) -> LoadResult<()> {
        if self.exefs_loaded {
            return Ok(());
        }

        // Reset the read pointer in case the stream has been read before.
        self.stream.seek(SeekFrom::Start(0))?;

        let mut header_buf = [0u8; NCCH_HEADER_SIZE];
        self.stream.read_exact(&mut header_buf)?;
        let mut header = NcchHeader::parse(&header_buf)?;

        // A wrapper image is just a container of containers; skip its header
        // and load the first (bootable) one.
        if header.magic == NCSD_MAGIC {
            debug!("Wrapper image: loading only the first container");
            self.ncch_offset = NCSD_FIRST_PARTITION_OFFSET;
            self.stream.seek(SeekFrom::Start(self.ncch_offset))?;
            self.stream.read_exact(&mut header_buf)?;
            header = NcchHeader::parse(&header_buf)?;
        }

        if header.magic != NCCH_MAGIC {
            error!("Unknown container magic {:02X?}", header.magic);
            return Err(FormatError::InvalidMagic(header.magic).into());
        }

        // The extended header follows the container header directly. Its
        // embedded program id doubles as the encryption probe: some
        // containers ship it cleartext, and then no decryption happens.
        let mut exheader_buf = alloc_buffer(EXHEADER_SIZE)?;
        self.stream.read_exact(&mut exheader_buf)?;
        let mut exheader = ExHeader::parse(&exheader_buf)?;

        if exheader.program_id() != header.program_id {
            info!("Extended header program id mismatch; trying to decrypt");

            let keys = derive_ncch_keys(&header, &self.provider)?;
            decrypt_ctr(
                &mut exheader_buf,
                &keys.exheader.key,
                &keys.exheader.ctr,
                0,
            )
            .map_err(|e| LoadError::Encrypted(e.to_string()))?;

            exheader = ExHeader::parse(&exheader_buf)?;
            if exheader.program_id() != header.program_id {
                error!("Extended header does not validate after decryption");
                return Err(LoadError::Encrypted(
                    "derived keys do not decrypt the extended header".to_string(),
                ));
            }

            self.exefs_key = Some(keys.exefs);
            self.exefs_code_key = Some(keys.exefs_code);
            self.romfs_key = Some(keys.romfs);
        }

        self.is_compressed = exheader.is_code_compressed();

        debug!("Name:                    {}", exheader.name());
        debug!("Program ID:              {:016X}", header.program_id);
        debug!("Code compressed:         {}", self.is_compressed);
        debug!("Entry point:             {:#010X}", exheader.codeset.text.address);
        debug!("Code size:               {:#010X}", exheader.codeset.text.code_size);
        debug!("Stack size:              {:#010X}", exheader.codeset.stack_size);
        debug!("Bss size:                {:#010X}", exheader.codeset.bss_size);
        debug!("Core version:            {}", exheader.system_local_caps.core_version);
        debug!("Thread priority:         {:#X}", exheader.system_local_caps.priority);
        debug!(
            "Resource limit category: {}",
            exheader.system_local_caps.resource_limit_category
        );
        debug!(
            "System mode:             {}",
            exheader.system_local_caps.system_mode()
        );

        // Section table; decrypted as a whole before entries mean anything.
        let exefs_offset = header.exefs_byte_offset();
        debug!("Section table offset:    {:#010X}", exefs_offset);
        debug!("Section table size:      {:#010X}", header.exefs_byte_size());

        self.stream
            .seek(SeekFrom::Start(exefs_offset + self.ncch_offset))?;
        let mut table_buf = [0u8; EXEFS_HEADER_SIZE];
        self.stream.read_exact(&mut table_buf)?;

        if let Some(key) = self.exefs_key {
            decrypt_ctr(&mut table_buf, &key.key, &key.ctr, 0)
                .map_err(|e| LoadError::Encrypted(e.to_string()))?;
        }

        self.exefs_header = Some(ExeFsHeader::parse(&table_buf)?);
        self.header = Some(header);
        self.exheader = Some(exheader);
        self.exefs_loaded = true;
        Ok(())
    }

    /// Extract a named section: locate, read, decrypt, and for a compressed
    /// `.code` section, decompress.
    fn read_section(&mut self, name: &str) -> LoadResult<Vec<u8>> {
        self.load_exefs()?;

        let (section_offset, section_size) = {
            let exefs_header = self.exefs_header.as_ref().ok_or(LoadError::NotLoaded)?;
            let section = exefs_header.section(name).ok_or(LoadError::NotUsed)?;
            debug!(
                "Section {}: offset {:#010X}, size {:#010X}",
                name, section.offset, section.size
            );
            (section.offset, section.size)
        };
        let exefs_offset = self
            .header
            .as_ref()
            .ok_or(LoadError::NotLoaded)?
            .exefs_byte_offset();

        // Section data lives after the table; entry offsets are relative to
        // the table's end.
        let file_offset = self.ncch_offset
            + exefs_offset
            + EXEFS_HEADER_SIZE as u64
            + u64::from(section_offset);
        self.stream.seek(SeekFrom::Start(file_offset))?;

        let mut buffer = alloc_buffer(section_size as usize)?;
        self.stream.read_exact(&mut buffer)?;

        let is_code = name == CODE_SECTION;
        let key = if is_code {
            self.exefs_code_key
        } else {
            self.exefs_key
        };

        if let Some(key) = key {
            // The keystream position is the section's place within the whole
            // table-plus-data stream, matching how the image was encrypted.
            let keystream_offset = u64::from(section_offset) + EXEFS_HEADER_SIZE as u64;
            decrypt_ctr(&mut buffer, &key.key, &key.ctr, keystream_offset)
                .map_err(|e| LoadError::Encrypted(e.to_string()))?;
        }

        if is_code && self.is_compressed {
            debug!("Decompressing code section");
            return Ok(lzss::decompress(&buffer)?);
        }

        Ok(buffer)
    }

    /// Load the executable once.
    ///
    /// Runs the full pipeline, extracts the code section, and returns the
    /// in-memory image. A second call is rejected with
    /// [`LoadError::AlreadyLoaded`] and performs no I/O.
    pub fn load(&mut self) -> LoadResult<LoadedExecutable> {
        if self.loaded {
            return Err(LoadError::AlreadyLoaded);
        }

        self.load_exefs()?;
        let mut code = self.read_section(CODE_SECTION)?;

        let header = self.header.as_ref().ok_or(LoadError::NotLoaded)?;
        let exheader = self.exheader.as_ref().ok_or(LoadError::NotLoaded)?;
        let codeset = &exheader.codeset;

        // Page counts and sizes come from the image; a layout that does not
        // fit the 32-bit address space is rejected, not wrapped.
        let oversized =
            || LoadError::InvalidFormat("segment layout overflows the address space".to_string());

        let text = Segment {
            offset: 0,
            addr: codeset.text.address,
            size: codeset
                .text
                .num_max_pages
                .checked_mul(PAGE_SIZE)
                .ok_or_else(oversized)?,
        };
        let rodata = Segment {
            offset: text.offset.checked_add(text.size).ok_or_else(oversized)?,
            addr: codeset.ro.address,
            size: codeset
                .ro
                .num_max_pages
                .checked_mul(PAGE_SIZE)
                .ok_or_else(oversized)?,
        };

        // Bss is zero fill appended to the page-aligned data segment.
        let bss_page_size = codeset.bss_size.checked_add(0xFFF).ok_or_else(oversized)? & !0xFFF;
        code.try_reserve_exact(bss_page_size as usize)
            .map_err(|_| LoadError::MemoryAllocationFailed(bss_page_size as usize))?;
        code.resize(code.len() + bss_page_size as usize, 0);

        let data = Segment {
            offset: rodata
                .offset
                .checked_add(rodata.size)
                .ok_or_else(oversized)?,
            addr: codeset.data.address,
            size: codeset
                .data
                .num_max_pages
                .checked_mul(PAGE_SIZE)
                .ok_or_else(oversized)?
                .checked_add(bss_page_size)
                .ok_or_else(oversized)?,
        };

        let executable = LoadedExecutable {
            name: exheader.name(),
            program_id: header.program_id,
            entry_point: text.addr,
            code,
            text,
            rodata,
            data,
            kernel_caps: exheader.kernel_caps,
            priority: exheader.system_local_caps.priority,
            stack_size: codeset.stack_size,
            resource_limit_category: exheader.system_local_caps.resource_limit_category,
            ideal_processor: exheader.system_local_caps.ideal_processor(),
            system_mode: exheader.system_local_caps.system_mode(),
        };

        info!(
            "Loaded {} ({:016X})",
            executable.name, executable.program_id
        );
        self.loaded = true;
        Ok(executable)
    }

    /// Read the decrypted, decompressed code section.
    pub fn read_code(&mut self) -> LoadResult<Vec<u8>> {
        self.read_section(CODE_SECTION)
    }

    /// Read the icon section.
    pub fn read_icon(&mut self) -> LoadResult<Vec<u8>> {
        self.read_section("icon")
    }

    /// Read the banner section.
    pub fn read_banner(&mut self) -> LoadResult<Vec<u8>> {
        self.read_section("banner")
    }

    /// Read the logo section.
    pub fn read_logo(&mut self) -> LoadResult<Vec<u8>> {
        self.read_section("logo")
    }

    /// The container's program id.
    pub fn read_program_id(&mut self) -> LoadResult<u64> {
        self.load_exefs()?;
        Ok(self.header.as_ref().ok_or(LoadError::NotLoaded)?.program_id)
    }

    /// The memory system mode declared by the extended header.
    pub fn system_mode(&mut self) -> LoadResult<u8> {
        self.load_exefs()?;
        Ok(self
            .exheader
            .as_ref()
            .ok_or(LoadError::NotLoaded)?
            .system_local_caps
            .system_mode())
    }

    /// Locate the secondary filesystem region.
    ///
    /// Returns [`LoadError::NotUsed`] when the container carries no RomFS.
    /// The returned stream is opened independently of the loader's own.
    pub fn locate_romfs(&mut self) -> LoadResult<RomFsLocation<S::Stream>> {
        self.load_exefs()?;
        let header = self.header.as_ref().ok_or(LoadError::NotLoaded)?;

        if header.romfs_offset == 0 || header.romfs_size == 0 {
            debug!("Container has no RomFS");
            return Err(LoadError::NotUsed);
        }

        // The first 0x1000 bytes of the region are filesystem metadata not
        // consumed here.
        let offset = self.ncch_offset + header.romfs_byte_offset() + ROMFS_METADATA_SIZE;
        let size = header
            .romfs_byte_size()
            .checked_sub(ROMFS_METADATA_SIZE)
            .ok_or_else(|| {
                LoadError::InvalidFormat("RomFS smaller than its metadata region".to_string())
            })?;

        debug!("RomFS offset:            {:#010X}", offset);
        debug!("RomFS size:              {:#010X}", size);

        let stream_len = self.stream.seek(SeekFrom::End(0))?;
        if stream_len < offset + size {
            return Err(LoadError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "image truncated before RomFS end",
            )));
        }

        let mut stream = self.source.open()?;
        stream.seek(SeekFrom::Start(offset))?;
        Ok(RomFsLocation {
            stream,
            offset,
            size,
        })
    }
}
