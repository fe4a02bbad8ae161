//! DOS program entry: wires the real backends into the boot sequence.
//! Exits with status 0 only in the impossible case that the handoff
//! machinery reports success by returning; any failure prints its reason
//! and exits with status 1.

#![cfg_attr(target_arch = "x86", no_std)]
#![cfg_attr(target_arch = "x86", no_main)]

#[cfg(target_arch = "x86")]
mod dos {
    use core::ptr::addr_of_mut;
    use dosboot::hal::x86::{exit, DosFile, DosPlatform, RealModeSwitch};
    use dosboot::{boot, logging};
    use mboot2::STREAM_CHUNK;

    /// Name of the kernel image, looked up in the working directory.
    const KERNEL_IMAGE: &str = "kernel.elf";

    /// Staging buffer for the copy to high memory. Static so it never
    /// competes with the tiny real-mode stack.
    static mut SCRATCH: [u8; STREAM_CHUNK] = [0; STREAM_CHUNK];

    /// Called by the startup stub once DOS has handed the process its
    /// segments.
    #[no_mangle]
    pub extern "C" fn loader_main() -> ! {
        logging::initialize_console_log();
        log::info!("dosboot {}", env!("CARGO_PKG_VERSION"));

        let mut platform = DosPlatform::new();
        let mut switch = RealModeSwitch;
        let mut image = match DosFile::open(KERNEL_IMAGE) {
            Ok(file) => file,
            Err(err) => {
                log::error!("cannot open {KERNEL_IMAGE}: {err}");
                exit(1);
            }
        };

        let scratch = unsafe { &mut *addr_of_mut!(SCRATCH) };
        match boot::run(&mut platform, &mut switch, &mut image, scratch) {
            Ok(never) => match never {},
            Err(err) => {
                log::error!("boot failed: {err}");
                exit(1);
            }
        }
    }

    #[panic_handler]
    fn panic(reason: &core::panic::PanicInfo) -> ! {
        log::error!("loader panic: {reason}");
        exit(1);
    }
}

/// The loader only does something useful as a real-mode DOS program.
/// Hosted builds exist so the test suite can run.
#[cfg(not(target_arch = "x86"))]
fn main() {
    eprintln!("dosboot must be built for a 16-bit x86 DOS target");
    std::process::exit(1);
}
