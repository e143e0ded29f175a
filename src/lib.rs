//! A USB host for boot keyboards on Microchip USB OTG SIEs
//!
//! `sie-usbh` drives a single boot-protocol keyboard through the serial
//! interface engine (SIE) of a PIC32MX-style USB OTG module. It resets the
//! bus, enumerates the keyboard, and polls its interrupt endpoint. Every
//! Enter press advances an LED pattern that the host sends back to the
//! keyboard.
//!
//! The host never uses interrupts. It hands buffer descriptors to the SIE,
//! and spins on the SIE's completion flags.
//!
//! To interface the library, you must define a safe implementation of
//! [`Peripherals`], and allocate a [`DescriptorStore`]. See [`Host`] for
//! an example.

#![no_std]

#[cfg(test)]
extern crate std;

#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

mod bdt;
mod buffer;
mod config;
mod control;
mod descriptor;
mod enumeration;
mod host;
mod keyboard;
mod ral;
mod sie;
#[cfg(test)]
mod sim;
mod state;
mod transfer;

pub use bdt::{Pid, Slot, Toggle};
pub use config::Config;
pub use control::{hid, DataToggle, SetupPacket, MAX_PACKET_SIZE};
pub use descriptor::DeviceDescriptor;
pub use enumeration::{Enumeration, State};
pub use host::{Host, Speed};
pub use keyboard::{BootReport, KeyState, Keyboard, Probe, ProbePoint};
pub use ral::usb::USB1;
pub use sie::{Interrupts, Sie, Token, TokenPid, Usb};
pub use state::{DescriptorStore, Descriptors, Snapshot};
pub use transfer::{Completion, Engine};

/// A type that owns the USB register block
///
/// # Safety
///
/// `Peripherals` should only be implemented on a type that owns the SIE
/// registers. The returned pointer is assumed to be valid, and will be
/// cast to a register definition.
///
/// # Example
///
/// ```
/// use sie_usbh::{Peripherals, USB1};
///
/// struct Usb1(());
///
/// impl Usb1 {
///     /// # Safety
///     ///
///     /// Only call once.
///     unsafe fn take() -> Self {
///         Usb1(())
///     }
/// }
///
/// unsafe impl Peripherals for Usb1 {
///     fn usb(&self) -> *const () {
///         USB1.cast()
///     }
/// }
///
/// let usb1 = unsafe { Usb1::take() };
/// assert_eq!(usb1.usb(), 0xBF88_5040 as *const ());
/// ```
pub unsafe trait Peripherals {
    /// Returns the address of the SIE registers
    fn usb(&self) -> *const ();
}
