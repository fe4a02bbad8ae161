//! Real-mode backend: port I/O, BIOS and DOS services, and the linkage
//! to the assembly mode-switch routines. Everything in here is specific
//! to running as a 16-bit DOS program on x86.

// Only compile this module when building for the real target.
#![cfg(target_arch = "x86")]

use super::{HandoffReturned, ModeSwitch, Platform, ProbeCell};
use crate::gdt::GdtPointer;
use core::arch::asm;
use mboot2::{ImageRead, IoError};
use types::{PhysAddr, RealPtr};

pub struct DosPlatform;

impl DosPlatform {
    pub const fn new() -> Self {
        Self
    }

    const fn cell(cell: ProbeCell) -> RealPtr {
        match cell {
            ProbeCell::Low => RealPtr::new(0x0000, 0x0510),
            ProbeCell::HighAlias => RealPtr::new(0xffff, 0x0520),
        }
    }
}

impl Platform for DosPlatform {
    fn inb(&mut self, port: u16) -> u8 {
        let value: u8;
        unsafe {
            asm!(
                "inb %dx, %al",
                in("dx") port,
                out("al") value,
                options(att_syntax, nomem, nostack)
            );
        }
        value
    }

    fn outb(&mut self, port: u16, value: u8) {
        unsafe {
            asm!(
                "outb %al, %dx",
                in("al") value,
                in("dx") port,
                options(att_syntax, nomem, nostack)
            );
        }
    }

    fn read_cell(&mut self, cell: ProbeCell) -> u8 {
        let ptr = Self::cell(cell);
        let value: u8;
        unsafe {
            asm!(
                "push %es",
                "mov {seg:x}, %es",
                "mov %es:({off:x}), {value}",
                "pop %es",
                seg = in(reg) ptr.segment,
                off = in(reg) ptr.offset,
                value = out(reg_byte) value,
                options(att_syntax)
            );
        }
        value
    }

    fn write_cell(&mut self, cell: ProbeCell, value: u8) {
        let ptr = Self::cell(cell);
        unsafe {
            asm!(
                "push %es",
                "mov {seg:x}, %es",
                "mov {value}, %es:({off:x})",
                "pop %es",
                seg = in(reg) ptr.segment,
                off = in(reg) ptr.offset,
                value = in(reg_byte) value,
                options(att_syntax)
            );
        }
    }

    fn bios_set_gate(&mut self, enable: bool) {
        let request: u16 = if enable { 0x2401 } else { 0x2400 };
        unsafe {
            asm!(
                "int $0x15",
                inout("ax") request => _,
                options(att_syntax)
            );
        }
    }

    fn code_base(&mut self) -> PhysAddr {
        let segment: u16;
        unsafe {
            asm!("mov %cs, {:x}", out(reg) segment, options(att_syntax, nomem, nostack));
        }
        RealPtr::new(segment, 0).linear()
    }

    fn data_base(&mut self) -> PhysAddr {
        RealPtr::new(data_segment(), 0).linear()
    }

    fn linear_address(&mut self, ptr: *const u8) -> PhysAddr {
        RealPtr::new(data_segment(), ptr as usize as u16).linear()
    }

    fn interrupts_suppressed<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> R {
        unsafe {
            asm!("cli", options(nomem, nostack));
        }
        let result = body(self);
        unsafe {
            asm!("sti", options(nomem, nostack));
        }
        result
    }
}

fn data_segment() -> u16 {
    let segment: u16;
    unsafe {
        asm!("mov %ds, {:x}", out(reg) segment, options(att_syntax, nomem, nostack));
    }
    segment
}

// Assembly routines from the mode-switch translation unit linked into
// the DOS build. `protmode_os_exec` does not return when the kernel
// starts; the process it would return into no longer exists.
extern "C" {
    fn protmode_is_prot() -> u16;
    fn protmode_loadhigh(dest: u32, src: *const u8, len: u16);
    fn protmode_os_exec(gdt: *const GdtPointer, boot_info: u32, entry: u32);
}

pub struct RealModeSwitch;

impl ModeSwitch for RealModeSwitch {
    fn is_protected_mode(&mut self) -> bool {
        unsafe { protmode_is_prot() != 0 }
    }

    fn load_high(&mut self, dest: PhysAddr, data: &[u8]) {
        unsafe { protmode_loadhigh(dest.get(), data.as_ptr(), data.len() as u16) }
    }

    fn exec(&mut self, gdt: &GdtPointer, boot_info: PhysAddr, entry: PhysAddr) -> HandoffReturned {
        unsafe { protmode_os_exec(gdt, boot_info.get(), entry.get()) }
        HandoffReturned
    }
}

/// A file opened through the DOS INT 21h handle interface.
pub struct DosFile {
    handle: u16,
}

impl DosFile {
    /// Open `name` read-only. DOS wants an ASCIIZ path in DS:DX.
    pub fn open(name: &str) -> Result<Self, IoError> {
        let mut path = [0u8; 64];
        if name.len() >= path.len() {
            return Err(IoError);
        }
        path[..name.len()].copy_from_slice(name.as_bytes());

        let handle: u16;
        let failed: u16;
        unsafe {
            asm!(
                "int $0x21",
                "sbb {failed:x}, {failed:x}",
                inout("ax") 0x3d00u16 => handle,
                in("dx") path.as_ptr() as usize as u16,
                failed = out(reg) failed,
                options(att_syntax)
            );
        }

        if failed != 0 {
            return Err(IoError);
        }
        Ok(Self { handle })
    }
}

impl ImageRead for DosFile {
    fn seek(&mut self, offset: u32) -> Result<(), IoError> {
        let failed: u16;
        unsafe {
            asm!(
                "int $0x21",
                "sbb {failed:x}, {failed:x}",
                inout("ax") 0x4200u16 => _, // AL=0: from start of file
                in("bx") self.handle,
                in("cx") (offset >> 16) as u16,
                inout("dx") offset as u16 => _,
                failed = out(reg) failed,
                options(att_syntax)
            );
        }

        if failed != 0 {
            return Err(IoError);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let count: u16;
        let failed: u16;
        unsafe {
            asm!(
                "int $0x21",
                "sbb {failed:x}, {failed:x}",
                inout("ax") 0x3f00u16 => count,
                in("bx") self.handle,
                in("cx") buf.len() as u16,
                in("dx") buf.as_mut_ptr() as usize as u16,
                failed = out(reg) failed,
                options(att_syntax)
            );
        }

        if failed != 0 {
            return Err(IoError);
        }
        Ok(count as usize)
    }
}

impl Drop for DosFile {
    fn drop(&mut self) {
        unsafe {
            asm!(
                "int $0x21",
                inout("ax") 0x3e00u16 => _,
                in("bx") self.handle,
                options(att_syntax)
            );
        }
    }
}

/// Print one character on the DOS console.
pub fn console_putc(byte: u8) {
    unsafe {
        asm!(
            "int $0x21",
            inout("ax") 0x0200u16 => _,
            in("dx") byte as u16,
            options(att_syntax)
        );
    }
}

/// Terminate the process with `code` through DOS.
pub fn exit(code: u8) -> ! {
    unsafe {
        asm!(
            "int $0x21",
            in("ax") 0x4c00u16 | code as u16,
            options(att_syntax, noreturn)
        );
    }
}
