//! The boot sequence itself: verify the machine is still in real mode,
//! open the A20 line, parse and stream the kernel image, build the
//! descriptor table and hand control over. The only successful outcome
//! is that control never comes back; every returned value is a failure,
//! and failure paths put the A20 line back the way it was found.

use crate::a20::{self, A20Error};
use crate::gdt;
use crate::hal::{ModeSwitch, Platform};
use core::convert::Infallible;
use log::{debug, info, warn};
use mboot2::{stream, Header, ImageRead, IoError, LoadPlan, ParseError};
use types::fmt::ByteSize;

/// Reasons the boot sequence can give control back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// The machine is already in protected mode; the loader must not
    /// touch descriptor tables under a running protected-mode
    /// environment.
    ProtectedModeActive,
    /// The A20 line could not be brought into the required state.
    A20(A20Error),
    /// The image violates the boot-image format.
    Format(ParseError),
    /// The image carries no address tag, so it cannot be placed.
    MissingAddressTag,
    /// The image carries no entry tag, so it cannot be started.
    MissingEntryTag,
    /// A file operation failed outside of parsing.
    Io(IoError),
    /// The mode-switch routine came back instead of starting the kernel.
    HandoffReturned,
}

impl From<A20Error> for BootError {
    fn from(err: A20Error) -> Self {
        Self::A20(err)
    }
}

impl From<ParseError> for BootError {
    fn from(err: ParseError) -> Self {
        Self::Format(err)
    }
}

impl From<IoError> for BootError {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl core::fmt::Display for BootError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ProtectedModeActive => f.write_str("CPU is already in protected mode"),
            Self::A20(err) => write!(f, "{err}"),
            Self::Format(err) => write!(f, "bad kernel image: {err}"),
            Self::MissingAddressTag => f.write_str("kernel image declares no address tag"),
            Self::MissingEntryTag => f.write_str("kernel image declares no entry tag"),
            Self::Io(err) => write!(f, "{err}"),
            Self::HandoffReturned => f.write_str("protected-mode handoff returned"),
        }
    }
}

/// Minimal boot information block passed to the kernel: total size 16,
/// reserved, and one terminating end tag of type 0 and size 8.
pub(crate) const BOOT_INFO: [u32; 4] = [16, 0, 0, 8];

/// Run the whole boot sequence against `image`, using `scratch` as the
/// staging buffer for the copy to high memory.
///
/// Returns only on failure; the `Infallible` success type records that.
/// The A20 line is restored to its initial state before any error is
/// reported, so a failed boot leaves the machine as it found it.
pub fn run<P: Platform, M: ModeSwitch, F: ImageRead>(
    platform: &mut P,
    switch: &mut M,
    image: &mut F,
    scratch: &mut [u8],
) -> Result<Infallible, BootError> {
    if switch.is_protected_mode() {
        return Err(BootError::ProtectedModeActive);
    }

    let was_enabled = a20::probe(platform);
    if !was_enabled {
        a20::enable(platform)?;
        debug!("A20 line enabled");
    }

    let result = load_and_exec(platform, switch, image, scratch);

    // Only reached on failure. Close the line again if this run opened
    // it; a restore failure is worth a warning but must not mask the
    // original error.
    if !was_enabled {
        if let Err(err) = a20::disable(platform) {
            warn!("could not restore A20 line: {err}");
        }
    }
    result
}

fn load_and_exec<P: Platform, M: ModeSwitch, F: ImageRead>(
    platform: &mut P,
    switch: &mut M,
    image: &mut F,
    scratch: &mut [u8],
) -> Result<Infallible, BootError> {
    let header_offset = Header::locate(image)?;
    let header = Header::read_at(image, header_offset)?;
    debug!("Multiboot2 header at file offset {header_offset:#x}");
    if !header.checksum_ok() {
        warn!("header checksum mismatch, continuing anyway");
    }

    let tags = mboot2::walk(image, &header, header_offset)?;
    let address = tags.address.ok_or(BootError::MissingAddressTag)?;
    let entry = tags.entry.ok_or(BootError::MissingEntryTag)?;

    let plan = LoadPlan::new(&address, header_offset)?;
    let total = stream(image, plan, scratch, |dest, bytes| {
        switch.load_high(dest, bytes);
    })?;
    info!(
        "loaded {} at {} (entry {})",
        ByteSize(total as u64),
        plan.destination,
        entry.entry_addr
    );

    let table = gdt::loader_table(platform.code_base(), platform.data_base());
    let pointer = table.pointer(platform.linear_address(table.entries().as_ptr() as *const u8));

    let boot_info = BOOT_INFO;
    let boot_info_addr = platform.linear_address(boot_info.as_ptr() as *const u8);

    let _returned = switch.exec(&pointer, boot_info_addr, entry.entry_addr);
    Err(BootError::HandoffReturned)
}
