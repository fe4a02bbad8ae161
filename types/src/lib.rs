//! Address value types shared between the loader and the boot-image
//! parser: physical addresses as the protected-mode side sees them, and
//! real-mode segment:offset pointers with their linear conversion.

#![no_std]

#[cfg(test)]
extern crate std;

mod addr;
pub mod fmt;

pub use addr::{PhysAddr, RealPtr};
