//! Segment descriptors and the small global descriptor table the
//! protected-mode switch loads. The table pairs 16-bit aliases of the
//! loader's own segments, so the transition code keeps executing across
//! the mode flip, with flat 4 GiB segments for the kernel.

use bitflags::bitflags;
use types::PhysAddr;

bitflags! {
    /// The access byte of a segment descriptor.
    pub struct Access: u8 {
        const ACCESSED = 1 << 0;
        /// Readable for code segments, writable for data segments.
        const READ_WRITE = 1 << 1;
        const DIRECTION = 1 << 2;
        const EXECUTABLE = 1 << 3;
        /// Code or data segment, as opposed to a system descriptor.
        const SEGMENT = 1 << 4;
        const PRESENT = 1 << 7;
    }
}

bitflags! {
    /// The flags nibble of a segment descriptor.
    pub struct Flags: u8 {
        const AVAILABLE = 1 << 0;
        const LONG_MODE = 1 << 1;
        /// 32-bit default operand size.
        const DEFAULT_32 = 1 << 2;
        /// Limit counted in 4 KiB pages instead of bytes.
        const GRANULARITY = 1 << 3;
    }
}

/// One segment descriptor in unpacked form. [`encode`] scatters the
/// fields into the interleaved 8-byte layout the CPU expects.
///
/// [`encode`]: SegmentDescriptor::encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub base: u32,
    /// 20-bit limit, in bytes or pages depending on
    /// [`Flags::GRANULARITY`].
    pub limit: u32,
    pub access: Access,
    pub flags: Flags,
}

impl SegmentDescriptor {
    /// 16-bit code segment aliasing the loader's running code, so the
    /// instruction after the mode flip still fetches correctly.
    pub fn real_alias_code(base: PhysAddr) -> Self {
        Self {
            base: base.get(),
            limit: 0xffff,
            access: Access::PRESENT | Access::SEGMENT | Access::EXECUTABLE | Access::READ_WRITE,
            flags: Flags::empty(),
        }
    }

    /// 16-bit data segment aliasing the loader's data segment.
    pub fn real_alias_data(base: PhysAddr) -> Self {
        Self {
            base: base.get(),
            limit: 0xffff,
            access: Access::PRESENT | Access::SEGMENT | Access::READ_WRITE,
            flags: Flags::empty(),
        }
    }

    /// Flat 32-bit data segment covering all 4 GiB.
    pub fn flat_data() -> Self {
        Self {
            base: 0,
            limit: 0xf_ffff,
            access: Access::PRESENT | Access::SEGMENT | Access::READ_WRITE,
            flags: Flags::GRANULARITY | Flags::DEFAULT_32,
        }
    }

    /// Flat 32-bit code segment covering all 4 GiB.
    pub fn flat_code() -> Self {
        Self {
            base: 0,
            limit: 0xf_ffff,
            access: Access::PRESENT | Access::SEGMENT | Access::EXECUTABLE | Access::READ_WRITE,
            flags: Flags::GRANULARITY | Flags::DEFAULT_32,
        }
    }

    /// Pack into the descriptor's wire layout: limit and base split
    /// across non-contiguous bit ranges, access byte at bit 40, flags
    /// nibble at bit 52.
    pub fn encode(&self) -> u64 {
        (self.limit as u64 & 0xffff)
            | ((self.base as u64 & 0xffff) << 16)
            | (((self.base as u64 >> 16) & 0xff) << 32)
            | ((self.access.bits() as u64) << 40)
            | (((self.limit as u64 >> 16) & 0xf) << 48)
            | (((self.flags.bits() as u64) & 0xf) << 52)
            | (((self.base as u64 >> 24) & 0xff) << 56)
    }

    /// Reassemble the unpacked form from an encoded descriptor.
    pub fn decode(raw: u64) -> Self {
        Self {
            base: ((raw >> 16) & 0xffff) as u32
                | (((raw >> 32) & 0xff) as u32) << 16
                | (((raw >> 56) & 0xff) as u32) << 24,
            limit: (raw & 0xffff) as u32 | (((raw >> 48) & 0xf) as u32) << 16,
            access: Access::from_bits_truncate(((raw >> 40) & 0xff) as u8),
            flags: Flags::from_bits_truncate(((raw >> 52) & 0xf) as u8),
        }
    }
}

/// Value loaded into GDTR: the table's byte length minus one, and its
/// linear base address.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct GdtPointer {
    pub limit: u16,
    pub base: u32,
}

/// A descriptor table under construction. Entry 0 is the mandatory null
/// descriptor; [`push`] hands out the selector for each added entry.
///
/// [`push`]: DescriptorTable::push
pub struct DescriptorTable {
    entries: [u64; Self::CAPACITY],
    len: usize,
}

impl DescriptorTable {
    const CAPACITY: usize = 8;

    pub const fn new() -> Self {
        Self {
            entries: [0; Self::CAPACITY],
            len: 1,
        }
    }

    /// Append a descriptor, returning its selector.
    pub fn push(&mut self, descriptor: SegmentDescriptor) -> u16 {
        assert!(self.len < Self::CAPACITY);
        let selector = (self.len * 8) as u16;
        self.entries[self.len] = descriptor.encode();
        self.len += 1;
        selector
    }

    pub fn entries(&self) -> &[u64] {
        &self.entries[..self.len]
    }

    /// GDTR value for this table once it lives at linear address `base`.
    pub fn pointer(&self, base: PhysAddr) -> GdtPointer {
        GdtPointer {
            limit: (self.len * 8 - 1) as u16,
            base: base.get(),
        }
    }
}

/// Selectors into the table [`loader_table`] builds, fixed by its entry
/// order. The transition code references these by value.
pub mod selectors {
    /// 16-bit alias of the loader's code segment.
    pub const CODE16: u16 = 0x08;
    /// 16-bit alias of the loader's data segment.
    pub const DATA16: u16 = 0x10;
    /// Flat 4 GiB data segment.
    pub const FLAT_DATA: u16 = 0x18;
    /// Flat 4 GiB code segment the kernel is entered through.
    pub const FLAT_CODE: u16 = 0x20;
}

/// Build the five-entry table the handoff loads: null, 16-bit aliases of
/// the loader's own segments, then the flat kernel segments.
pub fn loader_table(code_base: PhysAddr, data_base: PhysAddr) -> DescriptorTable {
    let mut table = DescriptorTable::new();
    let code16 = table.push(SegmentDescriptor::real_alias_code(code_base));
    let data16 = table.push(SegmentDescriptor::real_alias_data(data_base));
    let flat_data = table.push(SegmentDescriptor::flat_data());
    let flat_code = table.push(SegmentDescriptor::flat_code());

    debug_assert_eq!(code16, selectors::CODE16);
    debug_assert_eq!(data16, selectors::DATA16);
    debug_assert_eq!(flat_data, selectors::FLAT_DATA);
    debug_assert_eq!(flat_code, selectors::FLAT_CODE);
    table
}

#[cfg(test)]
mod tests {
    use super::{loader_table, selectors, DescriptorTable, SegmentDescriptor};
    use types::PhysAddr;

    #[test]
    fn flat_data_matches_reference_encoding() {
        assert_eq!(SegmentDescriptor::flat_data().encode(), 0x00cf_9200_0000_ffff);
    }

    #[test]
    fn flat_code_matches_reference_encoding() {
        assert_eq!(SegmentDescriptor::flat_code().encode(), 0x00cf_9a00_0000_ffff);
    }

    #[test]
    fn real_alias_scatters_the_base() {
        let raw = SegmentDescriptor::real_alias_code(PhysAddr::new(0x0123_4567)).encode();
        // limit 0xffff, base bits in their three islands, access 0x9a,
        // flags nibble clear.
        assert_eq!(raw, 0x0100_9a23_4567_ffff);
    }

    #[test]
    fn decode_inverts_encode() {
        for descriptor in [
            SegmentDescriptor::flat_code(),
            SegmentDescriptor::flat_data(),
            SegmentDescriptor::real_alias_code(PhysAddr::new(0xdead_be00)),
            SegmentDescriptor::real_alias_data(PhysAddr::new(0x0009_f000)),
        ] {
            assert_eq!(SegmentDescriptor::decode(descriptor.encode()), descriptor);
        }
    }

    #[test]
    fn table_starts_with_a_null_descriptor() {
        let table = loader_table(PhysAddr::new(0x1_0000), PhysAddr::new(0x2_0000));
        assert_eq!(table.entries()[0], 0);
        assert_eq!(table.entries().len(), 5);
    }

    #[test]
    fn selectors_match_entry_order() {
        let mut table = DescriptorTable::new();
        assert_eq!(table.push(SegmentDescriptor::flat_data()), selectors::CODE16);
        assert_eq!(table.push(SegmentDescriptor::flat_data()), selectors::DATA16);
        assert_eq!(table.push(SegmentDescriptor::flat_data()), selectors::FLAT_DATA);
        assert_eq!(table.push(SegmentDescriptor::flat_data()), selectors::FLAT_CODE);
    }

    #[test]
    fn pointer_limit_is_byte_length_minus_one() {
        let table = loader_table(PhysAddr::new(0), PhysAddr::new(0));
        let pointer = table.pointer(PhysAddr::new(0x7c00));
        let limit = pointer.limit;
        let base = pointer.base;
        assert_eq!(limit, 5 * 8 - 1);
        assert_eq!(base, 0x7c00);
    }
}
