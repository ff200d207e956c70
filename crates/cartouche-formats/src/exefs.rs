//! Section table (ExeFS) parsing.
//!
//! The section table is a fixed 0x200-byte block at the container's ExeFS
//! offset: eight named entries, a reserved gap, and per-section hashes the
//! loader does not consume. Section data follows immediately after the
//! table; entry offsets are relative to the table's end.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::error::{FormatError, FormatResult};

/// Maximum number of sections in a table.
pub const MAX_SECTIONS: usize = 8;

/// Size of the section table on disk.
pub const EXEFS_HEADER_SIZE: usize = 0x200;

/// One named section entry.
#[derive(Debug, Clone, Copy, Default, BinRead, BinWrite)]
#[brw(little)]
pub struct ExeFsSection {
    /// Section name, zero-padded (".code", "icon", "banner", "logo", ...).
    pub name: [u8; 8],
    /// Byte offset relative to the end of the table.
    pub offset: u32,
    /// Byte size; zero marks an unused entry.
    pub size: u32,
}

impl ExeFsSection {
    /// Whether this entry holds a section.
    pub fn is_used(&self) -> bool {
        self.size != 0
    }

    /// Compare against a section name, honoring the zero padding.
    pub fn name_matches(&self, name: &str) -> bool {
        let bytes = name.as_bytes();
        bytes.len() <= self.name.len()
            && self.name[..bytes.len()] == *bytes
            && self.name[bytes.len()..].iter().all(|&b| b == 0)
    }
}

/// Parsed section table.
#[derive(Debug, Clone, Default, BinRead, BinWrite)]
#[brw(little)]
pub struct ExeFsHeader {
    /// The eight section entries.
    pub sections: [ExeFsSection; MAX_SECTIONS],
    /// Per-section hashes at the table's tail, in reverse entry order. Not
    /// verified by the loader.
    #[brw(pad_before = 0x80)]
    pub hashes: [[u8; 0x20]; MAX_SECTIONS],
}

impl ExeFsHeader {
    /// Decode a section table from a [`EXEFS_HEADER_SIZE`]-byte buffer.
    ///
    /// The caller decrypts the whole table first when the container is
    /// encrypted; the table has no magic of its own.
    pub fn parse(data: &[u8]) -> FormatResult<Self> {
        if data.len() < EXEFS_HEADER_SIZE {
            return Err(FormatError::TruncatedData {
                expected: EXEFS_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        Ok(Self::read(&mut cursor)?)
    }

    /// Encode back into the 0x200-byte on-disk form.
    pub fn to_bytes(&self) -> FormatResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(EXEFS_HEADER_SIZE));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Look up a used section by name.
    pub fn section(&self, name: &str) -> Option<&ExeFsSection> {
        self.sections
            .iter()
            .find(|s| s.is_used() && s.name_matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, offset: u32, size: u32) -> ExeFsSection {
        let mut section = ExeFsSection {
            offset,
            size,
            ..ExeFsSection::default()
        };
        section.name[..name.len()].copy_from_slice(name.as_bytes());
        section
    }

    #[test]
    fn test_table_round_trip() {
        let mut header = ExeFsHeader::default();
        header.sections[0] = named(".code", 0, 0x1000);
        header.sections[1] = named("icon", 0x1000, 0x36C0);
        header.hashes[7] = [0xAA; 0x20];

        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), EXEFS_HEADER_SIZE);

        let parsed = ExeFsHeader::parse(&bytes).unwrap();
        let code = parsed.section(".code").unwrap();
        assert_eq!(code.offset, 0);
        assert_eq!(code.size, 0x1000);
        let icon = parsed.section("icon").unwrap();
        assert_eq!(icon.offset, 0x1000);
        assert_eq!(parsed.hashes[7], [0xAA; 0x20]);
    }

    #[test]
    fn test_unknown_section_absent() {
        let mut header = ExeFsHeader::default();
        header.sections[0] = named(".code", 0, 0x1000);

        assert!(header.section("nope").is_none());
        // Prefix of a real name must not match
        assert!(header.section(".cod").is_none());
        // Unused entries never match, even with a name
        header.sections[1] = named("banner", 0, 0);
        assert!(header.section("banner").is_none());
    }

    #[test]
    fn test_truncated_table() {
        let err = ExeFsHeader::parse(&[0u8; 0x100]).unwrap_err();
        assert!(matches!(err, FormatError::TruncatedData { .. }));
    }
}
