//! Narrow seams between the loader core and the real-mode host: port
//! I/O, the wraparound probe cells, BIOS services and the assembly
//! mode-switch routines. The real backend lives in [`x86`]; tests supply
//! simulated implementations of the same traits.

use crate::gdt::GdtPointer;
use types::PhysAddr;

pub mod x86;

/// The two memory cells used to detect address wraparound: a low
/// reserved cell and the location that aliases it while the A20 line is
/// held low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCell {
    /// 0000:0510, a cell only ROM BASIC ever used.
    Low,
    /// ffff:0520, physical 0x100510, an alias of `Low` iff A20 is off.
    HighAlias,
}

/// Hardware and host services of the real-mode environment.
pub trait Platform {
    /// Read a byte from an I/O port.
    fn inb(&mut self, port: u16) -> u8;

    /// Write a byte to an I/O port.
    fn outb(&mut self, port: u16, value: u8);

    /// Peek one of the wraparound probe cells.
    fn read_cell(&mut self, cell: ProbeCell) -> u8;

    /// Poke one of the wraparound probe cells.
    fn write_cell(&mut self, cell: ProbeCell, value: u8);

    /// Ask the BIOS to move the A20 gate (INT 15h AX=2401h/2400h). The
    /// call reports nothing trustworthy, so callers re-probe the line
    /// instead of inspecting a result.
    fn bios_set_gate(&mut self, enable: bool);

    /// Linear base address of the currently executing code segment.
    fn code_base(&mut self) -> PhysAddr;

    /// Linear base address of the loader's data segment.
    fn data_base(&mut self) -> PhysAddr;

    /// Linear address of a buffer owned by the loader.
    fn linear_address(&mut self, ptr: *const u8) -> PhysAddr;

    /// Run `body` with maskable interrupts suppressed, restoring them on
    /// every exit path. The i8042 transaction must not interleave with
    /// an interrupt-driven keyboard service touching the same
    /// controller.
    fn interrupts_suppressed<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> R
    where
        Self: Sized;
}

/// Returned by [`ModeSwitch::exec`]: the only way that call ever comes
/// back is that the kernel could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct HandoffReturned;

/// The protected-mode transition routines, implemented in assembly on
/// the real target.
pub trait ModeSwitch {
    /// Whether the machine is already in protected mode. The loader must
    /// not run once that is the case: rebuilding descriptor tables under
    /// a running protected-mode environment is unsafe.
    fn is_protected_mode(&mut self) -> bool;

    /// Copy `data` to physical address `dest`, which may lie above the
    /// range real-mode addressing can reach.
    fn load_high(&mut self, dest: PhysAddr, data: &[u8]);

    /// Load the descriptor table, flip the mode bit and jump to the
    /// kernel entry point, passing `boot_info` along. On success this
    /// never returns.
    fn exec(&mut self, gdt: &GdtPointer, boot_info: PhysAddr, entry: PhysAddr) -> HandoffReturned;
}
