//! The tag stream that follows the fixed header record. Every tag starts
//! with a common type/flags/size prelude and occupies its declared size
//! padded up to 8-byte alignment; unknown types are skipped without
//! interpreting their payload, so images using newer tags keep loading.

use crate::{read_full, Header, ImageRead, ParseError, ALIGN};
use types::PhysAddr;

/// Tag type declaring the image's physical placement.
pub const TAG_ADDRESS: u16 = 2;

/// Tag type declaring the kernel entry point.
pub const TAG_ENTRY: u16 = 3;

/// Size of the common tag prelude.
const TAG_HEADER_SIZE: u32 = 8;

/// The common prelude every tag starts with.
#[derive(Debug, Clone, Copy)]
pub struct TagHeader {
    pub kind: u16,
    pub flags: u16,
    /// Declared size of the tag including this prelude, before padding.
    pub size: u32,
}

/// Physical placement of the image as declared by the address tag. All
/// fields are absolute physical addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressTag {
    /// Where the header record itself is meant to end up in memory. Must
    /// not lie below `load_addr`; the difference between the two
    /// localizes the whole image within the file.
    pub header_addr: PhysAddr,
    /// Start of the loadable portion of the image.
    pub load_addr: PhysAddr,
    /// End of the loadable data; zero means the data runs to the end of
    /// the file.
    pub load_end_addr: PhysAddr,
    /// End of the zero-fill region following the data.
    pub bss_end_addr: PhysAddr,
}

/// The kernel entry point as declared by the entry tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTag {
    pub entry_addr: PhysAddr,
}

/// The two tags the loader cares about, if the image declares them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImageTags {
    pub address: Option<AddressTag>,
    pub entry: Option<EntryTag>,
}

/// Walk the tag stream of `header`, found at `header_offset` in the
/// file.
///
/// The walk keeps strict accounting against the declared region length:
/// every tag consumes its aligned span, a span reaching past the
/// remainder is a format violation, and the loop ends exactly when the
/// remainder hits zero. The first address and entry tags win; duplicates
/// are skipped like any unknown tag. On success the file position rests
/// at the aligned end of the last tag.
pub fn walk(
    file: &mut impl ImageRead,
    header: &Header,
    header_offset: u32,
) -> Result<ImageTags, ParseError> {
    let mut remaining = header.tag_region_length();
    let mut pos = header_offset + Header::SIZE;
    let mut tags = ImageTags::default();

    file.seek(pos)?;
    while remaining > 0 {
        let tag = read_tag_header(file)?;
        if tag.size < TAG_HEADER_SIZE {
            return Err(ParseError::BadTagSize(tag.size));
        }

        // Tags start 8-aligned, so the aligned end works out to start
        // plus the aligned size. The size comes straight from the file;
        // one large enough to wrap the padding arithmetic cannot fit any
        // region either.
        let span = tag
            .size
            .checked_add(ALIGN - 1)
            .ok_or(ParseError::TagOverrun)?
            & !(ALIGN - 1);
        if span > remaining {
            return Err(ParseError::TagOverrun);
        }
        remaining -= span;

        match tag.kind {
            TAG_ADDRESS if tags.address.is_none() => tags.address = Some(read_address_tag(file)?),
            TAG_ENTRY if tags.entry.is_none() => tags.entry = Some(read_entry_tag(file)?),
            _ => {}
        }

        pos = pos.checked_add(span).ok_or(ParseError::TagOverrun)?;
        file.seek(pos)?;
    }

    Ok(tags)
}

fn read_tag_header(file: &mut impl ImageRead) -> Result<TagHeader, ParseError> {
    let mut raw = [0u8; TAG_HEADER_SIZE as usize];
    if !read_full(file, &mut raw)? {
        return Err(ParseError::TruncatedTag);
    }

    Ok(TagHeader {
        kind: u16::from_le_bytes([raw[0], raw[1]]),
        flags: u16::from_le_bytes([raw[2], raw[3]]),
        size: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
    })
}

fn read_address_tag(file: &mut impl ImageRead) -> Result<AddressTag, ParseError> {
    let mut raw = [0u8; 16];
    if !read_full(file, &mut raw)? {
        return Err(ParseError::TruncatedTag);
    }

    Ok(AddressTag {
        header_addr: le32(&raw[0..4]).into(),
        load_addr: le32(&raw[4..8]).into(),
        load_end_addr: le32(&raw[8..12]).into(),
        bss_end_addr: le32(&raw[12..16]).into(),
    })
}

fn read_entry_tag(file: &mut impl ImageRead) -> Result<EntryTag, ParseError> {
    let mut raw = [0u8; 4];
    if !read_full(file, &mut raw)? {
        return Err(ParseError::TruncatedTag);
    }

    Ok(EntryTag {
        entry_addr: le32(&raw).into(),
    })
}

fn le32(raw: &[u8]) -> u32 {
    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}
