//! Control transfers on endpoint 0
//!
//! A control transfer is a SETUP transaction, an optional data stage, and
//! a zero-length status transaction in the opposite direction.

use crate::{
    bdt::{Slot, Toggle},
    sie::{Sie, Token},
    transfer::Engine,
};
use usb_device::{
    control::{Recipient, Request, RequestType},
    descriptor::descriptor_type,
    Result, UsbDirection, UsbError,
};

/// The byte count armed for every IN packet
pub const MAX_PACKET_SIZE: usize = 64;

/// HID class requests
pub mod hid {
    pub const SET_REPORT: u8 = 0x09;

    /// The high byte of a report request's `wValue`
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
    #[repr(u8)]
    pub enum ReportType {
        Input = 1,
        Output = 2,
        Feature = 3,
    }
}

/// An 8 byte SETUP packet, in wire order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct SetupPacket([u8; SetupPacket::LENGTH]);

impl SetupPacket {
    pub const LENGTH: usize = 8;

    pub fn get_device_descriptor(length: u16) -> Self {
        Self::from(Request {
            direction: UsbDirection::In,
            request_type: RequestType::Standard,
            recipient: Recipient::Device,
            request: Request::GET_DESCRIPTOR,
            value: (descriptor_type::DEVICE as u16) << 8,
            index: 0,
            length,
        })
    }

    pub fn set_address(address: u8) -> Self {
        Self::standard_out(Recipient::Device, Request::SET_ADDRESS, address as u16, 0)
    }

    pub fn set_configuration(configuration: u8) -> Self {
        Self::standard_out(
            Recipient::Device,
            Request::SET_CONFIGURATION,
            configuration as u16,
            0,
        )
    }

    pub fn set_interface(interface: u8, alternate_setting: u8) -> Self {
        Self::standard_out(
            Recipient::Interface,
            Request::SET_INTERFACE,
            alternate_setting as u16,
            interface as u16,
        )
    }

    pub fn set_report(
        report_type: hid::ReportType,
        report_id: u8,
        interface: u8,
        length: u16,
    ) -> Self {
        Self::from(Request {
            direction: UsbDirection::Out,
            request_type: RequestType::Class,
            recipient: Recipient::Interface,
            request: hid::SET_REPORT,
            value: ((report_type as u16) << 8) | report_id as u16,
            index: interface as u16,
            length,
        })
    }

    fn standard_out(recipient: Recipient, request: u8, value: u16, index: u16) -> Self {
        Self::from(Request {
            direction: UsbDirection::Out,
            request_type: RequestType::Standard,
            recipient,
            request,
            value,
            index,
            length: 0,
        })
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    /// `wLength`, the size of the data stage
    pub fn length(&self) -> u16 {
        u16::from_le_bytes([self.0[6], self.0[7]])
    }

    pub fn direction(&self) -> UsbDirection {
        if self.0[0] & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }
}

impl From<Request> for SetupPacket {
    fn from(request: Request) -> Self {
        let request_type = request.direction as u8
            | (request.request_type as u8) << 5
            | request.recipient as u8;
        let value = request.value.to_le_bytes();
        let index = request.index.to_le_bytes();
        let length = request.length.to_le_bytes();
        SetupPacket([
            request_type,
            request.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ])
    }
}

/// Data toggles for the packets of an OUT data stage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum DataToggle {
    /// Start with DATA1, and flip after every packet
    Alternating,
    /// Use the same toggle for every packet
    Fixed(Toggle),
}

impl DataToggle {
    fn first(self) -> Toggle {
        match self {
            DataToggle::Alternating => Toggle::Data1,
            DataToggle::Fixed(toggle) => toggle,
        }
    }

    fn next(self, toggle: Toggle) -> Toggle {
        match self {
            DataToggle::Alternating => toggle.flip(),
            DataToggle::Fixed(toggle) => toggle,
        }
    }
}

impl<S: Sie> Engine<'_, S> {
    /// Run a control transfer that reads `setup.length()` bytes
    ///
    /// The data stage ends early when the device sends a short packet.
    /// Returns the number of bytes written to `buffer`.
    pub fn control_in(&mut self, setup: &SetupPacket, buffer: &mut [u8]) -> Result<usize> {
        let length = setup.length() as usize;
        if buffer.len() < length {
            return Err(UsbError::BufferOverflow);
        }

        self.setup(setup)?;
        if length == 0 {
            self.status(UsbDirection::In)?;
            return Ok(0);
        }

        let mut received = 0;
        let mut toggle = Toggle::Data1;
        while received < length {
            self.arm(Slot::Rx, toggle, MAX_PACKET_SIZE);
            let completion = self.run_transaction(Token::input(0))?;
            let count = completion.byte_count.min(length - received);
            self.descriptors()
                .rx()
                .volatile_read(&mut buffer[received..received + count]);
            received += count;
            toggle = toggle.flip();
            if completion.byte_count != self.ep0_max_packet_size() {
                break;
            }
        }

        self.status(UsbDirection::Out)?;
        Ok(received)
    }

    /// Run a control transfer that writes `setup.length()` bytes of `data`
    pub fn control_out(
        &mut self,
        setup: &SetupPacket,
        data: &[u8],
        toggles: DataToggle,
    ) -> Result<()> {
        let length = setup.length() as usize;
        if data.len() < length {
            return Err(UsbError::BufferOverflow);
        }

        self.setup(setup)?;
        let mut toggle = toggles.first();
        for packet in data[..length].chunks(self.ep0_max_packet_size()) {
            self.descriptors().tx().volatile_write(packet);
            self.arm(Slot::Tx, toggle, packet.len());
            self.run_transaction(Token::output(0))?;
            toggle = toggles.next(toggle);
        }

        self.status(UsbDirection::In)
    }

    /// Run a control transfer without a data stage
    pub fn control_no_data(&mut self, setup: &SetupPacket) -> Result<()> {
        self.setup(setup)?;
        self.status(UsbDirection::In)
    }

    /// SETUP stage; always DATA0
    fn setup(&mut self, setup: &SetupPacket) -> Result<()> {
        trace!("SETUP {=[u8]:x}", &setup.as_bytes()[..]);
        self.descriptors().tx().volatile_write(setup.as_bytes());
        self.arm(Slot::Tx, Toggle::Data0, SetupPacket::LENGTH);
        self.run_transaction(Token::setup(0))?;
        Ok(())
    }

    /// Zero-length status stage in `direction`
    fn status(&mut self, direction: UsbDirection) -> Result<()> {
        match direction {
            UsbDirection::In => {
                self.arm(Slot::Rx, Toggle::Data1, 0);
                self.run_transaction(Token::input(0))?;
            }
            UsbDirection::Out => {
                self.arm(Slot::Tx, Toggle::Data0, 0);
                self.run_transaction(Token::output(0))?;
            }
        }
        Ok(())
    }
}
