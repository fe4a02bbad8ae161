//! Human-readable byte counts for log output.

use core::fmt::{Display, Formatter, Result};

/// Displays a byte count in the largest unit that still gives a little
/// precision (values below ten of a unit stay in the smaller one).
pub struct ByteSize(pub u64);

impl Display for ByteSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self.0 {
            b if b < 10 * 1024 => write!(f, "{b} B"),
            kb if kb < 10 * 1024u64.pow(2) => write!(f, "{} KiB", kb >> 10),
            mb if mb < 10 * 1024u64.pow(3) => write!(f, "{} MiB", mb >> 20),
            gb => write!(f, "{} GiB", gb >> 30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ByteSize;
    use std::format;

    #[test]
    fn unit_selection() {
        assert_eq!(format!("{}", ByteSize(4823)), "4823 B");
        assert_eq!(format!("{}", ByteSize(16 * 1024)), "16 KiB");
        assert_eq!(format!("{}", ByteSize(3 * 1024 * 1024 * 1024)), "3 GiB");
    }
}
