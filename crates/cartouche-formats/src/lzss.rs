//! Backward LZSS decompression for `.code` sections.
//!
//! The compressed stream is decoded tail-to-head: an 8-byte footer at the
//! end of the buffer encodes where the control stream starts and stops, and
//! a separate trailing 4-byte field holds the size the output grows by. The
//! prefix of the buffer below the stop index is stored verbatim; everything
//! above it is a bitstream of literals and back-references that fills the
//! output from the end downward.
//!
//! Container images are user-supplied, so every index move is checked before
//! any access; a malformed stream yields
//! [`InvalidCompression`](FormatError::InvalidCompression), never an
//! out-of-bounds read or write.

use crate::error::{FormatError, FormatResult};

/// Compute the decompressed size of an LZSS-compressed buffer.
///
/// The last 4 bytes hold the little-endian size the buffer grows by when
/// decompressed (not the absolute output size).
pub fn decompressed_size(compressed: &[u8]) -> FormatResult<usize> {
    if compressed.len() < 8 {
        return Err(FormatError::TruncatedData {
            expected: 8,
            actual: compressed.len(),
        });
    }

    let tail: [u8; 4] = compressed[compressed.len() - 4..]
        .try_into()
        .map_err(|_| FormatError::InvalidCompression("unreachable footer read".to_string()))?;
    let extra = u32::from_le_bytes(tail) as usize;

    extra
        .checked_add(compressed.len())
        .ok_or_else(|| FormatError::InvalidCompression("output size overflows".to_string()))
}

/// Decompress a backward-LZSS buffer.
pub fn decompress(compressed: &[u8]) -> FormatResult<Vec<u8>> {
    let out_size = decompressed_size(compressed)?;
    let size = compressed.len();

    // The 8-byte footer overlaps the tail of the compressed stream: its
    // first u32 packs the stop distance (low 24 bits) and the control-stream
    // start distance (top byte), both measured back from the end.
    let footer: [u8; 4] = compressed[size - 8..size - 4]
        .try_into()
        .map_err(|_| FormatError::InvalidCompression("unreachable footer read".to_string()))?;
    let top_and_bottom = u32::from_le_bytes(footer);
    let top = ((top_and_bottom >> 24) & 0xFF) as usize;
    let bottom = (top_and_bottom & 0x00FF_FFFF) as usize;

    let mut index = size.checked_sub(top).ok_or_else(|| {
        FormatError::InvalidCompression(format!("start index {top} beyond buffer"))
    })?;
    let stop_index = size.checked_sub(bottom).ok_or_else(|| {
        FormatError::InvalidCompression(format!("stop index {bottom} beyond buffer"))
    })?;

    let mut decompressed = Vec::new();
    decompressed
        .try_reserve_exact(out_size)
        .map_err(|_| FormatError::AllocationFailed(out_size))?;
    decompressed.resize(out_size, 0);

    // The verbatim prefix (and any tail bytes never reached by the stream)
    // come straight from the compressed data.
    decompressed[..size].copy_from_slice(compressed);

    let mut out = out_size;

    while index > stop_index {
        index -= 1;
        let mut control = compressed[index];

        for _ in 0..8 {
            if index <= stop_index || index == 0 || out == 0 {
                break;
            }

            if control & 0x80 != 0 {
                if index < 2 {
                    return Err(FormatError::InvalidCompression(
                        "back-reference truncated".to_string(),
                    ));
                }
                index -= 2;

                let pair =
                    usize::from(compressed[index]) | (usize::from(compressed[index + 1]) << 8);
                let segment_size = ((pair >> 12) & 0x0F) + 3;
                let segment_offset = (pair & 0x0FFF) + 2;

                if out < segment_size {
                    return Err(FormatError::InvalidCompression(
                        "back-reference underflows output".to_string(),
                    ));
                }

                for _ in 0..segment_size {
                    let src = out + segment_offset;
                    if src >= out_size {
                        return Err(FormatError::InvalidCompression(
                            "back-reference outside output".to_string(),
                        ));
                    }
                    let data = decompressed[src];
                    out -= 1;
                    decompressed[out] = data;
                }
            } else {
                // Literal: out > 0 and index > stop_index >= 0 hold here.
                index -= 1;
                out -= 1;
                decompressed[out] = compressed[index];
            }

            control <<= 1;
        }
    }

    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// "ABC" repeated ten times, compressed as three literals plus two
    /// back-references of distance 3.
    fn sample_compressed() -> Vec<u8> {
        let mut buf = vec![
            0x00, 0x60, // back-reference: length 9, distance 2+0
            0x00, 0xF0, // back-reference: length 18, distance 2+0
            b'A', b'B', b'C', // literals, read backward
            0x18, // control byte: 3 literals then 2 back-references
        ];
        // Footer: control stream starts 8 bytes from the end, stops at 16
        // bytes from the end (the whole buffer), output grows by 14.
        buf.extend_from_slice(&0x0800_0010u32.to_le_bytes());
        buf.extend_from_slice(&14u32.to_le_bytes());
        buf
    }

    #[test]
    fn test_decompressed_size() {
        let compressed = sample_compressed();
        assert_eq!(decompressed_size(&compressed).unwrap(), 30);
    }

    #[test]
    fn test_decompress_known_plaintext() {
        let decompressed = decompress(&sample_compressed()).unwrap();
        assert_eq!(decompressed, b"ABC".repeat(10));
    }

    #[test]
    fn test_verbatim_prefix_survives() {
        // top == bottom == 8: no control stream at all, the output is the
        // buffer itself plus the declared growth (zero here).
        let mut buf = b"stored plaintext".to_vec();
        buf.extend_from_slice(&0x0800_0008u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());

        let decompressed = decompress(&buf).unwrap();
        assert_eq!(decompressed, buf);
    }

    #[test]
    fn test_corrupt_stop_index_rejected() {
        let mut compressed = sample_compressed();
        // Stop distance larger than the buffer: must fail cleanly.
        let len = compressed.len();
        compressed[len - 8..len - 4].copy_from_slice(&0x08FF_FFFFu32.to_le_bytes());

        let err = decompress(&compressed).unwrap_err();
        assert!(matches!(err, FormatError::InvalidCompression(_)));
    }

    #[test]
    fn test_corrupt_start_index_rejected() {
        let mut compressed = sample_compressed();
        let len = compressed.len();
        // Start distance (top byte) beyond a 16-byte buffer.
        compressed[len - 8..len - 4].copy_from_slice(&0xFF00_0010u32.to_le_bytes());

        let err = decompress(&compressed).unwrap_err();
        assert!(matches!(err, FormatError::InvalidCompression(_)));
    }

    #[test]
    fn test_back_reference_outside_output_rejected() {
        // A single back-reference whose source lands past the output end.
        let mut buf = vec![
            0xFF, 0x6F, // length 9, distance 2 + 0xFFF
            0x80, // control: one back-reference
        ];
        buf.extend_from_slice(&0x0800_000Bu32.to_le_bytes());
        buf.extend_from_slice(&20u32.to_le_bytes());

        let err = decompress(&buf).unwrap_err();
        assert!(matches!(err, FormatError::InvalidCompression(_)));
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        let err = decompress(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, FormatError::TruncatedData { .. }));
    }
}
