//! The fixed Multiboot2 header record and the search for it. The header
//! must start at an 8-byte-aligned offset within the first 32 KiB of the
//! image file; everything after it up to `header_length` bytes is the tag
//! stream.

use crate::{read_full, ImageRead, ParseError};

/// Magic constant identifying a Multiboot2 header.
pub const MAGIC: u32 = 0xE852_50D6;

/// Architecture id for protected-mode i386.
pub const ARCH_I386: u32 = 0;

/// The header must be completely contained within the first 32 KiB of
/// the image.
pub const SEARCH_LIMIT: u32 = 32 * 1024;

/// Alignment of the header and of every tag in the stream.
pub const ALIGN: u32 = 8;

/// The fixed header record at the start of the tag region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub architecture: u32,
    /// Total length of header record plus tag stream, in bytes.
    pub header_length: u32,
    pub checksum: u32,
}

impl Header {
    /// Encoded size of the header record.
    pub const SIZE: u32 = 16;

    /// Scan the image in aligned 8-byte steps until a chunk leads with
    /// the header magic, returning the offset it was found at. Running
    /// past [`SEARCH_LIMIT`] or off the end of the file means the image
    /// is not Multiboot2-compliant.
    pub fn locate(file: &mut impl ImageRead) -> Result<u32, ParseError> {
        file.seek(0)?;

        let mut chunk = [0u8; ALIGN as usize];
        let mut offset = 0;
        while offset < SEARCH_LIMIT {
            if !read_full(file, &mut chunk)? {
                return Err(ParseError::MagicNotFound);
            }

            if u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) == MAGIC {
                return Ok(offset);
            }
            offset += ALIGN;
        }

        Err(ParseError::MagicNotFound)
    }

    /// Read the fixed header record at `offset`. A short read here is
    /// fatal; a file that ends inside its own header describes nothing.
    pub fn read_at(file: &mut impl ImageRead, offset: u32) -> Result<Header, ParseError> {
        file.seek(offset)?;

        let mut raw = [0u8; Self::SIZE as usize];
        if !read_full(file, &mut raw)? {
            return Err(ParseError::TruncatedHeader);
        }

        Ok(Self {
            magic: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            architecture: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            header_length: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
            checksum: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
        })
    }

    /// The `magic`, `architecture`, `header_length` and `checksum` fields
    /// must have an unsigned sum of zero. The loader reports a mismatch
    /// but does not reject the image over it.
    pub fn checksum_ok(&self) -> bool {
        self.magic
            .wrapping_add(self.architecture)
            .wrapping_add(self.header_length)
            .wrapping_add(self.checksum)
            == 0
    }

    /// Byte count of the tag stream following the fixed record.
    pub fn tag_region_length(&self) -> u32 {
        self.header_length.saturating_sub(Self::SIZE)
    }
}
