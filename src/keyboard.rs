//! Boot keyboard polling, with LED feedback
//!
//! Every Enter press advances a 3-bit LED pattern, and the host sends the
//! new pattern to the keyboard as an output report.

use crate::{
    bdt::{Slot, Toggle},
    control::{hid::ReportType, DataToggle, SetupPacket, MAX_PACKET_SIZE},
    enumeration::BOOT_INTERFACE,
    sie::{Sie, Token},
    transfer::Engine,
};
use usb_device::Result;

/// The keyboard's interrupt IN endpoint
pub const INTERRUPT_ENDPOINT: u8 = 1;
/// Usage ID of the Enter key
pub const ENTER: u8 = 0x28;
/// Usage ID reported when no key is pressed
pub const NO_KEY: u8 = 0x00;
/// The LED pattern wraps at this value
pub const LED_PATTERNS: u8 = 8;

/// An 8 byte boot keyboard input report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct BootReport([u8; BootReport::LENGTH]);

impl BootReport {
    pub const LENGTH: usize = 8;

    pub const fn new(raw: [u8; Self::LENGTH]) -> Self {
        BootReport(raw)
    }

    pub const fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    /// Modifier key bitmap
    pub fn modifiers(&self) -> u8 {
        self.0[0]
    }

    /// The six key slots
    pub fn keys(&self) -> &[u8] {
        &self.0[2..]
    }

    /// The first key slot
    pub fn primary_key(&self) -> u8 {
        self.0[2]
    }
}

/// Enter key and LED state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct KeyState {
    enter_pressed: bool,
    led_pattern: u8,
}

impl KeyState {
    pub const fn new() -> Self {
        KeyState {
            enter_pressed: false,
            led_pattern: 0,
        }
    }

    pub fn enter_pressed(&self) -> bool {
        self.enter_pressed
    }

    /// Always less than [`LED_PATTERNS`]
    pub fn led_pattern(&self) -> u8 {
        self.led_pattern
    }

    /// Track the primary key of a report
    ///
    /// Returns the new LED pattern when Enter goes down. Holding Enter, or
    /// pressing any other key, changes nothing. Only a report without keys
    /// releases Enter.
    pub fn update(&mut self, key: u8) -> Option<u8> {
        match key {
            ENTER if !self.enter_pressed => {
                self.enter_pressed = true;
                self.led_pattern = (self.led_pattern + 1) % LED_PATTERNS;
                Some(self.led_pattern)
            }
            NO_KEY => {
                self.enter_pressed = false;
                None
            }
            _ => None,
        }
    }
}

/// Points in a poll where a debug pin might toggle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ProbePoint {
    /// The interrupt IN descriptor is armed
    Armed,
    /// A report arrived
    Received,
    /// The LED report is about to go out
    LedUpdate,
}

/// Observes a poll, typically by toggling GPIOs for a logic analyzer
///
/// `()` observes nothing.
pub trait Probe {
    fn toggle(&mut self, point: ProbePoint) {
        let _ = point;
    }
}

impl Probe for () {}

/// Polls the keyboard's interrupt endpoint
#[derive(Debug, Default)]
pub struct Keyboard {
    state: KeyState,
}

impl Keyboard {
    pub const fn new() -> Self {
        Keyboard {
            state: KeyState::new(),
        }
    }

    pub fn state(&self) -> &KeyState {
        &self.state
    }

    /// Read one input report
    ///
    /// An Enter press also sends the next LED pattern, before returning.
    /// Blocks until the keyboard answers.
    pub fn poll<S: Sie, P: Probe>(
        &mut self,
        engine: &mut Engine<'_, S>,
        probe: &mut P,
    ) -> Result<BootReport> {
        engine.arm(Slot::Rx, Toggle::Data1, MAX_PACKET_SIZE);
        probe.toggle(ProbePoint::Armed);
        let completion = engine.run_transaction(Token::input(INTERRUPT_ENDPOINT))?;
        probe.toggle(ProbePoint::Received);

        let mut raw = [0; BootReport::LENGTH];
        let count = completion.byte_count.min(BootReport::LENGTH);
        engine.descriptors().rx().volatile_read(&mut raw[..count]);
        let report = BootReport::new(raw);
        debug!("REPORT {=[u8]:x}", &report.as_bytes()[..]);

        if let Some(pattern) = self.state.update(report.primary_key()) {
            probe.toggle(ProbePoint::LedUpdate);
            let setup = SetupPacket::set_report(ReportType::Output, 0, BOOT_INTERFACE, 1);
            engine.control_out(&setup, &[pattern], DataToggle::Fixed(Toggle::Data1))?;
            info!("LED {=u8}", pattern);
        }
        Ok(report)
    }
}
