//! A20 line negotiation. With the gate held low the machine wraps
//! physical addresses above 1 MiB back into low memory, so not a single
//! byte of the kernel can go to high memory until the line is open.
//! Toggling runs through an ordered fallback: the BIOS service first,
//! then a read-modify-write of the keyboard controller's output port.
//! After every attempt the wraparound probe is the arbiter of success,
//! since neither mechanism reports anything worth trusting.

use crate::hal::{Platform, ProbeCell};
use bitflags::bitflags;

/// i8042 status/command port.
const STATUS_PORT: u16 = 0x64;

/// i8042 data port.
const DATA_PORT: u16 = 0x60;

const CMD_DISABLE_KEYBOARD: u8 = 0xAD;
const CMD_READ_OUTPUT_PORT: u8 = 0xD0;
const CMD_WRITE_OUTPUT_PORT: u8 = 0xD1;
const CMD_ENABLE_KEYBOARD: u8 = 0xAE;

/// A20 enable bit in the controller's output port.
const OUTPUT_PORT_A20: u8 = 0x02;

/// Upper bound on status polls before the controller is declared dead.
const POLL_BUDGET: u32 = 65_536;

bitflags! {
    /// i8042 status register bits the negotiation cares about.
    struct Status: u8 {
        /// A byte is waiting to be read from the data port.
        const OUTPUT_FULL = 0x01;
        /// The controller has not consumed the last byte sent to it.
        const INPUT_FULL = 0x02;
    }
}

/// Failure to move the A20 line into the requested state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum A20Error {
    /// The keyboard controller never became ready within the poll
    /// budget.
    ControllerTimeout,
    /// Both the BIOS service and the controller fallback left the line
    /// in the wrong state.
    LineUnchanged { wanted_enabled: bool },
}

impl core::fmt::Display for A20Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ControllerTimeout => f.write_str("keyboard controller not responding"),
            Self::LineUnchanged { wanted_enabled: true } => {
                f.write_str("A20 line cannot be enabled")
            }
            Self::LineUnchanged { wanted_enabled: false } => {
                f.write_str("A20 line cannot be disabled")
            }
        }
    }
}

/// Non-destructively test whether the A20 line is enabled.
///
/// Writes distinct sentinels through the low probe cell and its 1 MiB
/// alias: if the alias write shows through the low cell, addresses still
/// wrap and the line is disabled. The low cell's original value is
/// restored before returning, so two consecutive probes agree and leave
/// no trace.
pub fn probe(hw: &mut impl Platform) -> bool {
    let saved = hw.read_cell(ProbeCell::Low);

    hw.write_cell(ProbeCell::Low, 0x00);
    hw.write_cell(ProbeCell::HighAlias, 0xff);
    let enabled = hw.read_cell(ProbeCell::Low) != hw.read_cell(ProbeCell::HighAlias);

    hw.write_cell(ProbeCell::Low, saved);
    enabled
}

/// Open the A20 line. A no-op when the probe already reports it open.
pub fn enable(hw: &mut impl Platform) -> Result<(), A20Error> {
    negotiate(hw, true)
}

/// Close the A20 line again; the mirror of [`enable`].
pub fn disable(hw: &mut impl Platform) -> Result<(), A20Error> {
    negotiate(hw, false)
}

fn negotiate(hw: &mut impl Platform, want_enabled: bool) -> Result<(), A20Error> {
    if probe(hw) == want_enabled {
        return Ok(());
    }

    // First stage: the BIOS service.
    hw.bios_set_gate(want_enabled);
    if probe(hw) == want_enabled {
        return Ok(());
    }

    // Second stage: the keyboard controller's output port.
    set_line_via_i8042(hw, want_enabled)?;
    if probe(hw) == want_enabled {
        return Ok(());
    }

    Err(A20Error::LineUnchanged { wanted_enabled: want_enabled })
}

/// Read-modify-write of the controller's output port. The whole
/// transaction runs with interrupts suppressed: an interrupt-driven
/// keyboard service grabbing the controller mid-transaction would
/// corrupt it.
fn set_line_via_i8042(hw: &mut impl Platform, enable: bool) -> Result<(), A20Error> {
    hw.interrupts_suppressed(|hw| {
        send_command(hw, CMD_DISABLE_KEYBOARD)?;

        send_command(hw, CMD_READ_OUTPUT_PORT)?;
        let value = read_data(hw)?;

        let value = if enable {
            value | OUTPUT_PORT_A20
        } else {
            value & !OUTPUT_PORT_A20
        };
        send_command(hw, CMD_WRITE_OUTPUT_PORT)?;
        send_data(hw, value)?;

        send_command(hw, CMD_ENABLE_KEYBOARD)
    })
}

fn send_command(hw: &mut impl Platform, command: u8) -> Result<(), A20Error> {
    wait_input_clear(hw)?;
    hw.outb(STATUS_PORT, command);
    Ok(())
}

fn send_data(hw: &mut impl Platform, data: u8) -> Result<(), A20Error> {
    wait_input_clear(hw)?;
    hw.outb(DATA_PORT, data);
    Ok(())
}

fn read_data(hw: &mut impl Platform) -> Result<u8, A20Error> {
    for _ in 0..POLL_BUDGET {
        if Status::from_bits_truncate(hw.inb(STATUS_PORT)).contains(Status::OUTPUT_FULL) {
            return Ok(hw.inb(DATA_PORT));
        }
    }
    Err(A20Error::ControllerTimeout)
}

fn wait_input_clear(hw: &mut impl Platform) -> Result<(), A20Error> {
    for _ in 0..POLL_BUDGET {
        if !Status::from_bits_truncate(hw.inb(STATUS_PORT)).contains(Status::INPUT_FULL) {
            return Ok(());
        }
    }
    Err(A20Error::ControllerTimeout)
}

#[cfg(test)]
mod tests {
    use super::{disable, enable, probe, A20Error};
    use crate::hal::fake::{FakePlatform, Op};

    #[test]
    fn probe_is_idempotent_and_restores_the_cell() {
        for gate in [false, true] {
            let mut hw = FakePlatform::new(gate);
            let before = hw.low_cell();

            assert_eq!(probe(&mut hw), gate);
            assert_eq!(probe(&mut hw), gate);
            assert_eq!(hw.low_cell(), before);
        }
    }

    #[test]
    fn enable_is_a_noop_when_line_already_open() {
        let mut hw = FakePlatform::new(true);
        enable(&mut hw).unwrap();

        // Only probe-cell traffic; no BIOS call, no port access.
        assert!(hw.ops.iter().all(|op| matches!(
            op,
            Op::CellRead(_) | Op::CellWrite(_, _)
        )));
    }

    #[test]
    fn enable_via_bios_skips_the_controller() {
        let mut hw = FakePlatform::new(false);
        enable(&mut hw).unwrap();

        assert!(hw.gate);
        assert!(hw.ops.contains(&Op::BiosGate(true)));
        assert!(hw.port_writes().is_empty());
    }

    #[test]
    fn dead_bios_falls_back_to_controller_protocol() {
        let mut hw = FakePlatform::new(false);
        hw.bios_works = false;

        enable(&mut hw).unwrap();

        assert!(hw.gate);
        assert!(probe(&mut hw));
        // The exact transaction, in order: disable keyboard, read output
        // port, write it back with the A20 bit set, re-enable keyboard.
        assert_eq!(
            hw.port_writes(),
            [
                (0x64, 0xAD),
                (0x64, 0xD0),
                (0x64, 0xD1),
                (0x60, 0x02),
                (0x64, 0xAE),
            ]
        );
    }

    #[test]
    fn controller_transaction_is_a_critical_section() {
        let mut hw = FakePlatform::new(false);
        hw.bios_works = false;

        enable(&mut hw).unwrap();

        let irq_off = hw.ops.iter().position(|op| *op == Op::IrqOff).unwrap();
        let irq_on = hw.ops.iter().position(|op| *op == Op::IrqOn).unwrap();
        let first_write = hw
            .ops
            .iter()
            .position(|op| matches!(op, Op::PortWrite(_, _)))
            .unwrap();
        let last_write = hw
            .ops
            .iter()
            .rposition(|op| matches!(op, Op::PortWrite(_, _)))
            .unwrap();
        assert!(irq_off < first_write);
        assert!(last_write < irq_on);
    }

    #[test]
    fn stuck_controller_times_out() {
        let mut hw = FakePlatform::new(false);
        hw.bios_works = false;
        hw.controller_ready = false;

        assert_eq!(enable(&mut hw), Err(A20Error::ControllerTimeout));
    }

    #[test]
    fn unchanged_line_after_both_stages_is_an_error() {
        let mut hw = FakePlatform::new(false);
        hw.bios_works = false;
        hw.gate_wired = false;

        assert_eq!(
            enable(&mut hw),
            Err(A20Error::LineUnchanged { wanted_enabled: true })
        );
    }

    #[test]
    fn disable_mirrors_enable() {
        let mut hw = FakePlatform::new(true);
        hw.bios_works = false;

        disable(&mut hw).unwrap();

        assert!(!hw.gate);
        assert_eq!(
            hw.port_writes(),
            [
                (0x64, 0xAD),
                (0x64, 0xD0),
                (0x64, 0xD1),
                (0x60, 0x00),
                (0x64, 0xAE),
            ]
        );
    }
}
