//! Serial interface engine (SIE) access
//!
//! The protocol code drives the SIE through the [`Sie`] trait. [`Usb`]
//! implements it over the real registers.

use crate::{bdt::Slot, ral};
use usb_device::UsbDirection;

bitflags::bitflags! {
    /// Host-mode interrupt flags (U1IR)
    ///
    /// The flags are set regardless of the interrupt enables, so the
    /// host polls them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupts : u32 {
        const STALL = 1 << 7;
        const ATTACH = 1 << 6;
        const RESUME = 1 << 5;
        const IDLE = 1 << 4;
        /// Transaction complete
        const TRN = 1 << 3;
        const SOF = 1 << 2;
        const ERROR = 1 << 1;
        const DETACH = 1 << 0;
    }
}

/// Token PIDs that the host issues
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum TokenPid {
    Out = 0x1,
    In = 0x9,
    Setup = 0xD,
}

/// A token for one endpoint of the attached device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Token {
    pid: TokenPid,
    endpoint: u8,
}

impl Token {
    /// # Panics
    ///
    /// Panics if `endpoint` is not a valid endpoint number.
    pub const fn new(pid: TokenPid, endpoint: u8) -> Self {
        assert!(endpoint < 16, "Endpoint number out of range");
        Token { pid, endpoint }
    }

    pub const fn setup(endpoint: u8) -> Self {
        Self::new(TokenPid::Setup, endpoint)
    }

    pub const fn input(endpoint: u8) -> Self {
        Self::new(TokenPid::In, endpoint)
    }

    pub const fn output(endpoint: u8) -> Self {
        Self::new(TokenPid::Out, endpoint)
    }

    pub const fn pid(self) -> TokenPid {
        self.pid
    }

    pub const fn endpoint(self) -> u8 {
        self.endpoint
    }

    /// The direction of the data packet that follows the token
    pub const fn direction(self) -> UsbDirection {
        match self.pid {
            TokenPid::In => UsbDirection::In,
            TokenPid::Out | TokenPid::Setup => UsbDirection::Out,
        }
    }

    /// The descriptor that describes the data packet
    pub fn slot(self) -> Slot {
        Slot::from(self.direction())
    }

    /// The U1TOK encoding
    pub const fn raw(self) -> u8 {
        ((self.pid as u8) << 4) | self.endpoint
    }
}

/// Host access to a serial interface engine
///
/// Methods map onto one register operation each. The protocol code decides
/// when to call them.
pub trait Sie {
    /// Turn on the USB module
    fn power_on(&mut self);
    /// Publish the BDT base address
    fn set_bdt_address(&mut self, address: u32);
    /// Enter host mode, with pull-downs on both data lines
    fn enable_host(&mut self);
    /// Set the SOF threshold, in byte times
    fn set_sof_threshold(&mut self, threshold: u8);
    /// Enable or disable SOF generation
    fn set_sof_enabled(&mut self, enable: bool);
    /// Enable interrupt generation for `flags`
    fn enable_interrupts(&mut self, flags: Interrupts);
    /// Returns the pending interrupt flags
    fn pending(&self) -> Interrupts;
    /// Clear the pending `flags`
    fn acknowledge(&mut self, flags: Interrupts);
    /// Indicates if the bus is in the J state
    fn is_jstate(&self) -> bool;
    /// Select low-speed (`true`) or full-speed (`false`) signaling
    fn set_low_speed(&mut self, low_speed: bool);
    /// Drive (`true`) or release (`false`) bus reset
    fn set_bus_reset(&mut self, reset: bool);
    /// Allow SETUP, IN, and OUT transactions through endpoint 0
    fn enable_control_endpoint(&mut self);
    /// Set the address of the device that receives tokens
    fn set_device_address(&mut self, address: u8);
    /// Issue a token
    fn issue_token(&mut self, token: Token);
}

/// The SIE, backed by its registers
pub struct Usb {
    usb: ral::usb::Instance,
}

impl Usb {
    /// Take ownership of the SIE registers
    pub fn new<P: crate::Peripherals>(peripherals: P) -> Self {
        // Safety: Peripherals implementers own the register block.
        let usb = unsafe { ral::usb::Instance::new(peripherals.usb()) };
        // No ping-pong buffering; one descriptor per direction.
        ral::modify_reg!(ral::usb, usb, U1CNFG1, PPB: 0);
        Usb { usb }
    }
}

impl Sie for Usb {
    fn power_on(&mut self) {
        ral::modify_reg!(ral::usb, self.usb, U1PWRC, USBPWR: 1);
    }

    fn set_bdt_address(&mut self, address: u32) {
        ral::write_reg!(ral::usb, self.usb, U1BDTP1, BDTPTRL: address >> 9);
        ral::write_reg!(ral::usb, self.usb, U1BDTP2, BDTPTRH: address >> 16);
        ral::write_reg!(ral::usb, self.usb, U1BDTP3, BDTPTRU: address >> 24);
    }

    fn enable_host(&mut self) {
        ral::modify_reg!(ral::usb, self.usb, U1CON, HOSTEN: 1);
        ral::modify_reg!(ral::usb, self.usb, U1OTGCON,
            DPPULDWN: 1,
            DMPULDWN: 1,
            DPPULUP: 0,
            DMPULUP: 0
        );
    }

    fn set_sof_threshold(&mut self, threshold: u8) {
        ral::write_reg!(ral::usb, self.usb, U1SOF, CNT: threshold as u32);
    }

    fn set_sof_enabled(&mut self, enable: bool) {
        ral::modify_reg!(ral::usb, self.usb, U1CON, SOFEN: enable as u32);
    }

    fn enable_interrupts(&mut self, flags: Interrupts) {
        ral::modify_reg!(ral::usb, self.usb, U1IE, |ie| ie | flags.bits());
    }

    fn pending(&self) -> Interrupts {
        Interrupts::from_bits_truncate(ral::read_reg!(ral::usb, self.usb, U1IR))
    }

    fn acknowledge(&mut self, flags: Interrupts) {
        ral::write_reg!(ral::usb, self.usb, U1IR, flags.bits());
    }

    fn is_jstate(&self) -> bool {
        ral::read_reg!(ral::usb, self.usb, U1CON, JSTATE == 1)
    }

    fn set_low_speed(&mut self, low_speed: bool) {
        ral::modify_reg!(ral::usb, self.usb, U1ADDR, LSPDEN: low_speed as u32);
        ral::modify_reg!(ral::usb, self.usb, U1EP0, LSPD: low_speed as u32);
    }

    fn set_bus_reset(&mut self, reset: bool) {
        ral::modify_reg!(ral::usb, self.usb, U1CON, USBRST: reset as u32);
    }

    fn enable_control_endpoint(&mut self) {
        ral::modify_reg!(ral::usb, self.usb, U1EP0,
            EPCONDIS: 0,
            EPRXEN: 1,
            EPTXEN: 1,
            EPHSHK: 1
        );
    }

    fn set_device_address(&mut self, address: u8) {
        ral::modify_reg!(ral::usb, self.usb, U1ADDR, DEVADDR: address as u32);
    }

    fn issue_token(&mut self, token: Token) {
        ral::write_reg!(ral::usb, self.usb, U1TOK,
            PID: token.pid() as u32,
            EP: token.endpoint() as u32
        );
    }
}
