//! This crate contains the structures used to parse the Multiboot2 header
//! embedded in a kernel image, as defined in the corresponding
//! specification:
//!
//! https://www.gnu.org/software/grub/manual/multiboot2/multiboot.html (version 2.0)
//!
//! Only the parts a loader needs to place and start a kernel are
//! implemented: locating the header, walking the tag stream for the
//! address and entry tags, and streaming the image to its load address.
//! All other tags are skipped, as the specification demands.

#![no_std]

#[cfg(test)]
extern crate std;

mod header;
mod tags;

pub use header::*;
pub use tags::*;

use types::PhysAddr;

/// Failure reported by the host environment's file primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoError;

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("file I/O failure")
    }
}

/// Read access to the boot image. Implemented over DOS file handles on
/// the real target and over in-memory buffers in tests.
pub trait ImageRead {
    /// Move the read position to `offset` bytes from the start of the
    /// file.
    fn seek(&mut self, offset: u32) -> Result<(), IoError>;

    /// Read up to `buf.len()` bytes, returning how many were actually
    /// read. Zero means end of file. Whether a short read is an error is
    /// for the caller to decide: fatal while parsing headers and tags,
    /// the expected terminator while streaming the image body.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;
}

/// Violations of the boot-image format, and I/O failures hit while
/// parsing it. All of these are terminal; there is no partial result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// No header magic within the first [`SEARCH_LIMIT`] bytes.
    MagicNotFound,
    /// The file ended in the middle of the fixed header record.
    TruncatedHeader,
    /// The file ended in the middle of a tag or its payload.
    TruncatedTag,
    /// A tag declared a size smaller than the tag prelude itself.
    BadTagSize(u32),
    /// A tag's aligned span extends past the declared header length.
    TagOverrun,
    /// The address tag declares `load_addr > header_addr`, or maps the
    /// image start to before the beginning of the file.
    BadLoadPlan,
    Io(IoError),
}

impl From<IoError> for ParseError {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MagicNotFound => f.write_str("no Multiboot2 header in the first 32 KiB"),
            Self::TruncatedHeader => f.write_str("file ends inside the header record"),
            Self::TruncatedTag => f.write_str("file ends inside a header tag"),
            Self::BadTagSize(size) => write!(f, "tag size {size} is smaller than a tag header"),
            Self::TagOverrun => f.write_str("tag extends past the declared header length"),
            Self::BadLoadPlan => f.write_str("address tag maps the image outside the file"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

/// Read until `buf` is full. `Ok(false)` means the file ended first; the
/// caller maps that to the truncation error fitting its context.
pub(crate) fn read_full(file: &mut impl ImageRead, buf: &mut [u8]) -> Result<bool, IoError> {
    let mut filled = 0;
    while filled < buf.len() {
        let count = file.read(&mut buf[filled..])?;
        if count == 0 {
            return Ok(false);
        }
        filled += count;
    }
    Ok(true)
}

/// Where in the file the kernel bytes start and where they belong in
/// physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    pub file_offset: u32,
    pub destination: PhysAddr,
}

impl LoadPlan {
    /// Derive the load plan from the address tag. The header's offset in
    /// the file and its self-declared physical address are both known, so
    /// their difference maps every physical address the image declares to
    /// a file position.
    pub fn new(address: &AddressTag, header_offset: u32) -> Result<Self, ParseError> {
        let skew = address
            .header_addr
            .checked_sub(address.load_addr)
            .ok_or(ParseError::BadLoadPlan)?;
        let file_offset = header_offset.checked_sub(skew).ok_or(ParseError::BadLoadPlan)?;

        Ok(Self {
            file_offset,
            destination: address.load_addr,
        })
    }
}

/// Chunk size used when streaming the image to its destination.
pub const STREAM_CHUNK: usize = 16 * 1024;

/// Stream the kernel image from `plan.file_offset` onwards, forwarding
/// one `scratch`-sized chunk and its destination address at a time to
/// `sink`. A short read terminates the stream: past the headers, end of
/// file is the expected way for an image to end, not an error. An image
/// reaching the top of the 32-bit address space ends there; nothing
/// further could be placed anyway. Returns the total number of bytes
/// forwarded.
pub fn stream(
    file: &mut impl ImageRead,
    plan: LoadPlan,
    scratch: &mut [u8],
    mut sink: impl FnMut(PhysAddr, &[u8]),
) -> Result<u32, IoError> {
    file.seek(plan.file_offset)?;

    let mut destination = plan.destination;
    let mut total = 0u32;
    loop {
        let count = file.read(scratch)?;
        if count == 0 {
            break;
        }

        sink(destination, &scratch[..count]);
        total += count as u32;

        if count < scratch.len() {
            break;
        }
        destination = match destination.checked_add(count as u32) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(total)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::{ImageRead, IoError};

    /// In-memory stand-in for a kernel image file.
    pub struct SliceImage<'a> {
        data: &'a [u8],
        pos: usize,
    }

    impl<'a> SliceImage<'a> {
        pub fn new(data: &'a [u8]) -> Self {
            Self { data, pos: 0 }
        }

        pub fn position(&self) -> usize {
            self.pos
        }
    }

    impl ImageRead for SliceImage<'_> {
        fn seek(&mut self, offset: u32) -> Result<(), IoError> {
            self.pos = offset as usize;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
            let available = self.data.len().saturating_sub(self.pos);
            let count = buf.len().min(available);
            buf[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
            self.pos += count;
            Ok(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::SliceImage;
    use super::{stream, AddressTag, LoadPlan, ParseError};
    use std::vec::Vec;
    use types::PhysAddr;

    fn address_tag(header_addr: u32, load_addr: u32) -> AddressTag {
        AddressTag {
            header_addr: PhysAddr::new(header_addr),
            load_addr: PhysAddr::new(load_addr),
            load_end_addr: PhysAddr::new(0),
            bss_end_addr: PhysAddr::new(0),
        }
    }

    #[test]
    fn load_plan_skew() {
        // Header found 512 bytes into the file and declared to live 512
        // bytes above the load address: the image starts at offset 0.
        let plan = LoadPlan::new(&address_tag(0x10_0200, 0x10_0000), 512).unwrap();
        assert_eq!(plan.file_offset, 0);
        assert_eq!(plan.destination, PhysAddr::new(0x10_0000));
    }

    #[test]
    fn load_plan_rejects_inverted_addresses() {
        assert_eq!(
            LoadPlan::new(&address_tag(0x10_0000, 0x10_0200), 512),
            Err(ParseError::BadLoadPlan)
        );
    }

    #[test]
    fn load_plan_rejects_offset_before_file_start() {
        // Skew of 1024 but the header sits at offset 512.
        assert_eq!(
            LoadPlan::new(&address_tag(0x10_0400, 0x10_0000), 512),
            Err(ParseError::BadLoadPlan)
        );
    }

    #[test]
    fn stream_chunks_and_stops_on_short_read() {
        let data: Vec<u8> = (0u8..20).collect();
        let mut file = SliceImage::new(&data);
        let plan = LoadPlan {
            file_offset: 4,
            destination: PhysAddr::new(0x10_0000),
        };

        let mut scratch = [0u8; 8];
        let mut chunks = Vec::new();
        let total = stream(&mut file, plan, &mut scratch, |dest, bytes| {
            chunks.push((dest, bytes.to_vec()));
        })
        .unwrap();

        assert_eq!(total, 16);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].0, PhysAddr::new(0x10_0000));
        assert_eq!(chunks[0].1, &data[4..12]);
        assert_eq!(chunks[1].0, PhysAddr::new(0x10_0008));
        assert_eq!(chunks[1].1, &data[12..20]);
    }

    #[test]
    fn stream_stops_at_the_top_of_the_address_space() {
        let data = [0xEEu8; 20];
        let mut file = SliceImage::new(&data);
        let plan = LoadPlan {
            file_offset: 0,
            destination: PhysAddr::new(0xffff_fff8),
        };

        let mut scratch = [0u8; 8];
        let mut chunks = Vec::new();
        let total = stream(&mut file, plan, &mut scratch, |dest, bytes| {
            chunks.push((dest, bytes.len()));
        })
        .unwrap();

        // Only the chunk that still fits below 4 GiB is forwarded.
        assert_eq!(total, 8);
        assert_eq!(chunks, [(PhysAddr::new(0xffff_fff8), 8)]);
    }

    #[test]
    fn stream_of_nothing_is_empty() {
        let data = [0u8; 4];
        let mut file = SliceImage::new(&data);
        let plan = LoadPlan {
            file_offset: 4,
            destination: PhysAddr::new(0x10_0000),
        };

        let mut scratch = [0u8; 8];
        let total = stream(&mut file, plan, &mut scratch, |_, _| {
            panic!("no bytes expected");
        })
        .unwrap();
        assert_eq!(total, 0);
    }
}
