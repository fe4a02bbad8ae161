//! DOS-hosted Multiboot2 loader. The loader runs as an ordinary real-mode
//! program, opens the A20 address line, parses the kernel image's
//! Multiboot2 header to find out where the image belongs and where it
//! starts, builds the descriptor table the switch to protected mode
//! requires, and hands control to the kernel. On success the handoff
//! never returns.
//!
//! All hardware and host services are reached through the narrow traits
//! in [`hal`], so everything above them runs unmodified against the
//! simulated backends used by the tests.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod a20;
pub mod boot;
pub mod gdt;
pub mod hal;
pub mod logging;
