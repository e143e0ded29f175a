//! Buffer descriptor table (BDT) entries
//!
//! The module implements a RAL-compatible interface for working
//! with buffer descriptors. Each descriptor is two words: a status
//! word, and the physical address of the packet buffer.
//!
//! Software prepares the status word, then hands the descriptor to the
//! SIE by setting `UOWN`. The SIE clears `UOWN` when the transaction
//! completes, and reports the byte count and PID in the same word.

#![allow(non_snake_case, non_upper_case_globals)]

use crate::ral::{self, field, VCell};
use usb_device::UsbDirection;

/// The BDT base must be aligned to this many bytes
pub const BDT_ALIGNMENT: usize = 512;

#[repr(C)]
pub struct BufferDescriptor {
    STAT: VCell<u32>,
    ADR: VCell<u32>,
}

impl BufferDescriptor {
    pub const fn new() -> Self {
        BufferDescriptor {
            STAT: VCell::new(0),
            ADR: VCell::new(0),
        }
    }

    /// Zero both words
    pub fn clear(&self) {
        self.STAT.write(0);
        self.ADR.write(0);
    }

    /// Bind the descriptor to the buffer at `address`
    pub fn set_buffer(&self, address: u32) {
        self.ADR.write(address);
    }

    pub fn buffer(&self) -> u32 {
        self.ADR.read()
    }

    /// Clear the PID field that the SIE wrote back last time
    pub fn clear_pid(&self) {
        ral::modify_reg!(crate::bdt, self, STAT, PID: 0);
    }

    /// Describe the next packet
    ///
    /// The descriptor remains owned by software.
    pub fn prepare(&self, toggle: Toggle, byte_count: usize) {
        debug_assert!(!self.is_owned(), "Descriptor is still owned by the SIE");
        ral::modify_reg!(crate::bdt, self, STAT,
            UOWN: 0,
            DATA01: toggle as u32,
            BC: byte_count as u32
        );
    }

    /// Hand the descriptor to the SIE
    pub fn set_owned(&self) {
        ral::modify_reg!(crate::bdt, self, STAT, UOWN: 1);
    }

    /// Take the descriptor back from the SIE
    ///
    /// Leaves the toggle, byte count, and PID as they are.
    pub fn release(&self) {
        ral::modify_reg!(crate::bdt, self, STAT, UOWN: 0);
    }

    /// Indicates if the SIE owns this descriptor
    pub fn is_owned(&self) -> bool {
        ral::read_reg!(crate::bdt, self, STAT, UOWN == 1)
    }

    /// The requested byte count, or the transferred byte count once the
    /// SIE releases the descriptor
    pub fn byte_count(&self) -> usize {
        ral::read_reg!(crate::bdt, self, STAT, BC) as usize
    }

    pub fn toggle(&self) -> Toggle {
        if ral::read_reg!(crate::bdt, self, STAT, DATA01 == 1) {
            Toggle::Data1
        } else {
            Toggle::Data0
        }
    }

    pub fn pid(&self) -> Pid {
        Pid::from_raw(ral::read_reg!(crate::bdt, self, STAT, PID))
    }

    /// Release the descriptor the way the SIE does
    #[cfg(test)]
    pub(crate) fn complete(&self, pid: Pid, byte_count: usize) {
        ral::modify_reg!(crate::bdt, self, STAT,
            UOWN: 0,
            PID: pid.raw(),
            BC: byte_count as u32
        );
    }
}

/// Status word fields
///
/// `PID` overlaps the software-only `KEEP`, `NINC`, `DTS`, and `BSTALL`
/// bits. The host never sets those, so we only name the PID.
pub mod STAT {
    use super::field;
    field!(BC, 16, 10);
    field!(UOWN, 7, 1);
    field!(DATA01, 6, 1);
    field!(PID, 2, 4);
}

/// Data toggle synchronization
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u32)]
pub enum Toggle {
    Data0 = 0,
    Data1 = 1,
}

impl Toggle {
    /// Returns the other toggle
    pub const fn flip(self) -> Self {
        match self {
            Toggle::Data0 => Toggle::Data1,
            Toggle::Data1 => Toggle::Data0,
        }
    }
}

/// Packet identifier written back by the SIE
///
/// For IN tokens, this is the data PID that the device sent. For SETUP
/// and OUT tokens, this is the device's handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Pid {
    /// Cleared by software; nothing written back yet
    Cleared,
    Ack,
    Nak,
    Stall,
    Data0,
    Data1,
    /// Bus timeout or any other value
    Other(u8),
}

impl Pid {
    pub fn from_raw(raw: u32) -> Self {
        match raw & 0xF {
            0x0 => Pid::Cleared,
            0x2 => Pid::Ack,
            0xA => Pid::Nak,
            0xE => Pid::Stall,
            0x3 => Pid::Data0,
            0xB => Pid::Data1,
            other => Pid::Other(other as u8),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Pid::Cleared => 0x0,
            Pid::Ack => 0x2,
            Pid::Nak => 0xA,
            Pid::Stall => 0xE,
            Pid::Data0 => 0x3,
            Pid::Data1 => 0xB,
            Pid::Other(raw) => (raw & 0xF) as u32,
        }
    }
}

/// Index of a descriptor in the table
///
/// There's one descriptor per direction; the SIE doesn't ping-pong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Slot {
    /// Device to host
    Rx = 0,
    /// Host to device
    Tx = 1,
}

/// Number of descriptors in the table
pub const SLOT_COUNT: usize = 2;

impl Slot {
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl From<UsbDirection> for Slot {
    fn from(direction: UsbDirection) -> Self {
        match direction {
            UsbDirection::In => Slot::Rx,
            UsbDirection::Out => Slot::Tx,
        }
    }
}

const _: [(); 1] = [(); (core::mem::size_of::<BufferDescriptor>() == 8) as usize];
