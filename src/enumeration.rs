//! Enumeration of the attached keyboard
//!
//! Enumeration is a fixed sequence of standard requests. The host doesn't
//! validate the responses; a boot keyboard accepts every one of them.

use crate::{
    config::Config,
    control::SetupPacket,
    descriptor::DeviceDescriptor,
    sie::Sie,
    transfer::Engine,
};
use embedded_hal::delay::DelayNs;
use usb_device::Result;

/// The address assigned to the keyboard
pub const DEVICE_ADDRESS: u8 = 1;
/// The configuration value selected after addressing
pub const CONFIGURATION_VALUE: u8 = 1;
/// The interface that carries the boot protocol
pub const BOOT_INTERFACE: u8 = 0;

/// Enumeration progress
///
/// Each state names what has completed. States advance in declaration
/// order, and `InterfaceSet` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum State {
    /// Bus reset; the device answers on address 0
    DefaultAddress,
    /// The device descriptor was captured
    DescriptorRead,
    /// The device answers on [`DEVICE_ADDRESS`]
    AddressAssigned,
    Configured,
    InterfaceSet,
}

/// Drives the device from its default address to the boot interface
#[derive(Debug)]
pub struct Enumeration {
    state: State,
    descriptor: Option<DeviceDescriptor>,
}

impl Enumeration {
    pub const fn new() -> Self {
        Enumeration {
            state: State::DefaultAddress,
            descriptor: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The captured device descriptor, once read
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::InterfaceSet
    }

    /// Perform the next transition
    ///
    /// Returns the new state. Stepping a complete enumeration does nothing.
    pub fn step<S: Sie, D: DelayNs>(
        &mut self,
        engine: &mut Engine<'_, S>,
        delay: &mut D,
        config: &Config,
    ) -> Result<State> {
        let next = match self.state {
            State::DefaultAddress => {
                engine.sie_mut().enable_control_endpoint();
                engine.sie_mut().set_device_address(0);

                let mut raw = [0; DeviceDescriptor::LENGTH];
                let setup = SetupPacket::get_device_descriptor(DeviceDescriptor::LENGTH as u16);
                let received = engine.control_in(&setup, &mut raw)?;
                if received < DeviceDescriptor::LENGTH {
                    warn!("Short device descriptor: {=usize} bytes", received);
                }

                let descriptor = DeviceDescriptor::from_bytes(raw);
                info!(
                    "DEVICE {=u16:#x}:{=u16:#x} EP0 {=u8}",
                    descriptor.vendor_id(),
                    descriptor.product_id(),
                    descriptor.max_packet_size_0()
                );
                self.descriptor = Some(descriptor);
                State::DescriptorRead
            }
            State::DescriptorRead => {
                engine.control_no_data(&SetupPacket::set_address(DEVICE_ADDRESS))?;
                // The device switches addresses after the status stage.
                delay.delay_ms(config.set_address_settle_ms);
                engine.sie_mut().set_device_address(DEVICE_ADDRESS);
                debug!("ADDRESS {=u8}", DEVICE_ADDRESS);
                State::AddressAssigned
            }
            State::AddressAssigned => {
                engine.control_no_data(&SetupPacket::set_configuration(CONFIGURATION_VALUE))?;
                debug!("CONFIGURED");
                State::Configured
            }
            State::Configured => {
                engine.control_no_data(&SetupPacket::set_interface(BOOT_INTERFACE, 0))?;
                debug!("INTERFACE {=u8}", BOOT_INTERFACE);
                State::InterfaceSet
            }
            State::InterfaceSet => State::InterfaceSet,
        };
        self.state = next;
        Ok(next)
    }

    /// Step until the boot interface is selected
    pub fn run<S: Sie, D: DelayNs>(
        &mut self,
        engine: &mut Engine<'_, S>,
        delay: &mut D,
        config: &Config,
    ) -> Result<()> {
        while !self.is_complete() {
            self.step(engine, delay, config)?;
        }
        Ok(())
    }
}

impl Default for Enumeration {
    fn default() -> Self {
        Self::new()
    }
}
