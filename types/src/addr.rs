use core::fmt::{Debug, Display, Formatter, Result};

/// A 32-bit physical address. Real-mode code cannot dereference these
/// directly; they are produced from [`RealPtr`] values or parsed out of a
/// boot image, and are only ever consumed by the mode-switch routines
/// that can actually reach high memory.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PhysAddr(u32);

impl PhysAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// The address `count` bytes further up, or `None` past the top of
    /// the 32-bit address space.
    pub const fn checked_add(self, count: u32) -> Option<Self> {
        match self.0.checked_add(count) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Byte distance down to `other`, or `None` if `other` lies above
    /// `self`.
    pub const fn checked_sub(self, other: PhysAddr) -> Option<u32> {
        self.0.checked_sub(other.0)
    }

    /// Round up to the next multiple of `align`, which must be a power of
    /// two.
    pub const fn align_up(self, align: u32) -> Self {
        Self((self.0 + align - 1) & !(align - 1))
    }
}

impl From<u32> for PhysAddr {
    fn from(addr: u32) -> Self {
        Self(addr)
    }
}

impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl Display for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A real-mode far pointer. The linear address covered by
/// `segment:offset` is `segment * 16 + offset`, which stays within the
/// first megabyte plus change, exactly the range real-mode code can
/// touch on its own.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RealPtr {
    pub segment: u16,
    pub offset: u16,
}

impl RealPtr {
    pub const fn new(segment: u16, offset: u16) -> Self {
        Self { segment, offset }
    }

    pub const fn linear(self) -> PhysAddr {
        PhysAddr::new(((self.segment as u32) << 4) + self.offset as u32)
    }
}

impl Debug for RealPtr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{:04x}:{:04x}", self.segment, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::{PhysAddr, RealPtr};

    #[test]
    fn linear_conversion() {
        assert_eq!(RealPtr::new(0, 0x510).linear(), PhysAddr::new(0x510));
        // The wraparound alias cell: 0xffff0 + 0x520 lies above 1 MiB.
        assert_eq!(RealPtr::new(0xffff, 0x520).linear(), PhysAddr::new(0x10_0510));
    }

    #[test]
    fn align_up() {
        assert_eq!(PhysAddr::new(0).align_up(8), PhysAddr::new(0));
        assert_eq!(PhysAddr::new(1).align_up(8), PhysAddr::new(8));
        assert_eq!(PhysAddr::new(24).align_up(8), PhysAddr::new(24));
        assert_eq!(PhysAddr::new(25).align_up(8), PhysAddr::new(32));
    }

    #[test]
    fn checked_add() {
        assert_eq!(
            PhysAddr::new(0x10_0000).checked_add(0x400),
            Some(PhysAddr::new(0x10_0400))
        );
        assert_eq!(PhysAddr::new(0xffff_fffc).checked_add(8), None);
    }

    #[test]
    fn checked_sub() {
        let high = PhysAddr::new(0x10_0000);
        let low = PhysAddr::new(0xf_fe00);
        assert_eq!(high.checked_sub(low), Some(0x200));
        assert_eq!(low.checked_sub(high), None);
    }
}
