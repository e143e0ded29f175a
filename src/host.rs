//! The keyboard host
//!
//! [`Host`] brings up the bus, enumerates the keyboard, and then polls it.

use crate::{
    config::Config,
    descriptor::DeviceDescriptor,
    enumeration::{Enumeration, State},
    keyboard::{BootReport, KeyState, Keyboard, Probe},
    sie::{Interrupts, Sie},
    state::{DescriptorStore, Snapshot},
    transfer::Engine,
};
use embedded_hal::delay::DelayNs;
use usb_device::Result;

/// Signaling speed of the attached device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Speed {
    Low,
    Full,
}

/// A USB host for one boot keyboard
///
/// After you create a `Host` with [`new()`](Host::new), call
/// [`initialize()`](Host::initialize) once, then call
/// [`poll_keyboard()`](Host::poll_keyboard) in a loop.
///
/// ```no_run
/// use sie_usbh::{Config, DescriptorStore, Host, Peripherals, Usb};
/// # use embedded_hal::delay::DelayNs;
/// # struct Delay;
/// # impl DelayNs for Delay { fn delay_ns(&mut self, _: u32) {} }
///
/// struct Pic32;
/// unsafe impl Peripherals for Pic32 {
///     fn usb(&self) -> *const () {
///         sie_usbh::USB1.cast()
///     }
/// }
///
/// static DESCRIPTORS: DescriptorStore = DescriptorStore::new();
///
/// let mut host = Host::new(Usb::new(Pic32), &DESCRIPTORS, Delay, Config::new());
/// host.initialize().unwrap();
/// loop {
///     let report = host.poll_keyboard(&mut ()).unwrap();
///     # let _ = report;
/// }
/// ```
pub struct Host<'a, S, D> {
    engine: Engine<'a, S>,
    delay: D,
    config: Config,
    speed: Option<Speed>,
    enumeration: Enumeration,
    keyboard: Keyboard,
}

impl<'a, S: Sie, D: DelayNs> Host<'a, S, D> {
    /// Create a host that drives `sie`
    ///
    /// # Panics
    ///
    /// Panics if `store` has already been assigned to another host.
    pub fn new(sie: S, store: &'a DescriptorStore, delay: D, config: Config) -> Self {
        let descriptors = store.take().expect("Descriptor store already assigned");
        Host {
            engine: Engine::new(sie, descriptors, &config),
            delay,
            config,
            speed: None,
            enumeration: Enumeration::new(),
            keyboard: Keyboard::new(),
        }
    }

    /// Publish the descriptors, wait for a device, and reset it
    ///
    /// Blocks until a device attaches. Returns the device's speed.
    pub fn bring_up(&mut self) -> Result<Speed> {
        self.engine.initialize();

        let sie = self.engine.sie_mut();
        sie.power_on();
        sie.enable_host();
        sie.set_sof_threshold(self.config.sof_threshold);
        sie.set_sof_enabled(false);

        sie.acknowledge(Interrupts::ATTACH);
        sie.enable_interrupts(Interrupts::ATTACH);
        debug!("WAITING FOR ATTACH");
        self.engine.wait_for(Interrupts::ATTACH, None)?;
        self.engine.sie_mut().acknowledge(Interrupts::ATTACH);
        self.delay.delay_ms(self.config.attach_settle_ms);

        let speed = if self.engine.sie().is_jstate() {
            Speed::Full
        } else {
            Speed::Low
        };
        self.engine.sie_mut().set_low_speed(speed == Speed::Low);
        info!("ATTACHED {}", speed);

        self.engine.sie_mut().set_bus_reset(true);
        self.delay.delay_ms(self.config.reset_ms);
        self.engine.sie_mut().set_bus_reset(false);
        debug!("RESET");

        self.engine.sie_mut().set_sof_enabled(true);
        self.delay.delay_ms(self.config.reset_recovery_ms);

        self.speed = Some(speed);
        Ok(speed)
    }

    /// Run enumeration to completion
    pub fn enumerate(&mut self) -> Result<()> {
        self.enumeration
            .run(&mut self.engine, &mut self.delay, &self.config)
    }

    /// Bring up the bus, then enumerate the keyboard
    pub fn initialize(&mut self) -> Result<Speed> {
        let speed = self.bring_up()?;
        self.enumerate()?;
        Ok(speed)
    }

    /// Read the next keyboard report
    ///
    /// Call after [`initialize()`](Host::initialize). `probe` observes the
    /// poll; pass `&mut ()` to ignore it.
    pub fn poll_keyboard<P: Probe>(&mut self, probe: &mut P) -> Result<BootReport> {
        self.keyboard.poll(&mut self.engine, probe)
    }

    /// The speed detected by [`bring_up()`](Host::bring_up)
    pub fn speed(&self) -> Option<Speed> {
        self.speed
    }

    pub fn enumeration_state(&self) -> State {
        self.enumeration.state()
    }

    pub fn device_descriptor(&self) -> Option<&DeviceDescriptor> {
        self.enumeration.descriptor()
    }

    pub fn key_state(&self) -> &KeyState {
        self.keyboard.state()
    }

    /// Addresses of the descriptor table and staging buffers
    pub fn snapshot(&self) -> Snapshot {
        self.engine.descriptors().snapshot()
    }

    pub fn sie(&self) -> &S {
        self.engine.sie()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod test {
    use super::{Host, Speed};
    use crate::{
        bdt::Toggle,
        config::Config,
        enumeration::State,
        sie::Interrupts,
        sim::{self, Device, Event},
        state::DescriptorStore,
    };
    use usb_device::UsbError;

    #[test]
    #[should_panic(expected = "Descriptor store already assigned")]
    fn store_assigned_once() {
        let store = DescriptorStore::new();
        let log = sim::log();
        let _first = Host::new(
            Device::new(&store, log.clone()),
            &store,
            sim::Delay::new(log.clone()),
            Config::new(),
        );
        let _second = Host::new(
            Device::new(&store, log.clone()),
            &store,
            sim::Delay::new(log),
            Config::new(),
        );
    }

    #[test]
    fn bring_up_order() {
        let store = DescriptorStore::new();
        let log = sim::log();
        let mut host = Host::new(
            Device::new(&store, log.clone()),
            &store,
            sim::Delay::new(log.clone()),
            Config::new(),
        );
        assert_eq!(host.speed(), None);
        assert_eq!(host.bring_up(), Ok(Speed::Low));
        assert_eq!(host.speed(), Some(Speed::Low));

        let snapshot = host.snapshot();
        assert_eq!(
            sim::events(&log),
            [
                Event::BdtAddress(snapshot.bdt_address),
                Event::PowerOn,
                Event::HostEnabled,
                Event::SofThreshold(0x4A),
                Event::Sof(false),
                Event::Acknowledge(Interrupts::ATTACH),
                Event::InterruptsEnabled(Interrupts::ATTACH),
                Event::Acknowledge(Interrupts::ATTACH),
                Event::Delay(100),
                Event::LowSpeed(true),
                Event::Reset(true),
                Event::Delay(50),
                Event::Reset(false),
                Event::Sof(true),
                Event::Delay(10),
            ]
        );
    }

    #[test]
    fn full_speed_from_jstate() {
        let store = DescriptorStore::new();
        let log = sim::log();
        let mut host = Host::new(
            Device::new(&store, log.clone()).full_speed(),
            &store,
            sim::Delay::new(log.clone()),
            Config::new(),
        );
        assert_eq!(host.bring_up(), Ok(Speed::Full));
        assert!(sim::events(&log).contains(&Event::LowSpeed(false)));
    }

    #[test]
    fn end_to_end() {
        let store = DescriptorStore::new();
        let log = sim::log();
        let device = Device::new(&store, log.clone())
            .queue_report([0, 0, 0x28, 0, 0, 0, 0, 0])
            .queue_report([0; 8]);
        let mut host = Host::new(device, &store, sim::Delay::new(log.clone()), Config::new());

        host.initialize().unwrap();
        assert_eq!(host.enumeration_state(), State::InterfaceSet);
        assert_eq!(
            host.device_descriptor().unwrap().as_bytes(),
            &sim::KEYBOARD_DESCRIPTOR
        );

        let transactions = sim::transactions(&log);
        let tokens: std::vec::Vec<u8> = transactions.iter().map(|t| t.token).collect();
        assert_eq!(
            tokens,
            [
                // GET_DESCRIPTOR
                0xD0, 0x90, 0x90, 0x10, //
                // SET_ADDRESS
                0xD0, 0x90, //
                // SET_CONFIGURATION
                0xD0, 0x90, //
                // SET_INTERFACE
                0xD0, 0x90,
            ]
        );
        let setups: std::vec::Vec<&[u8]> = transactions
            .iter()
            .filter(|t| t.token == 0xD0)
            .map(|t| &t.data[..])
            .collect();
        assert_eq!(
            setups,
            [
                &[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00][..],
                &[0x00, 0x05, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00][..],
                &[0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00][..],
                &[0x01, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00][..],
            ]
        );
        assert!(transactions
            .iter()
            .filter(|t| t.token == 0xD0)
            .all(|t| t.toggle == Toggle::Data0));

        let events = sim::events(&log);
        let reset_released = events
            .iter()
            .position(|event| *event == Event::Reset(false))
            .unwrap();
        let first_token = events
            .iter()
            .position(|event| matches!(event, Event::Token(_)))
            .unwrap();
        assert!(reset_released < first_token);

        host.poll_keyboard(&mut ()).unwrap();
        host.poll_keyboard(&mut ()).unwrap();
        assert_eq!(host.key_state().led_pattern(), 1);
        assert_eq!(host.sie().leds(), [1]);
        assert!(sim::transactions(&log)
            .iter()
            .filter(|t| t.token == 0x91)
            .all(|t| t.address == 1));
    }

    #[test]
    fn timeout_surfaces_from_enumeration() {
        let store = DescriptorStore::new();
        let log = sim::log();
        let config = Config {
            transaction_timeout: Some(50),
            ..Config::new()
        };
        let device = Device::new(&store, log.clone()).unresponsive(10_000);
        let mut host = Host::new(device, &store, sim::Delay::new(log), config);

        assert_eq!(host.bring_up(), Ok(Speed::Low));
        assert_eq!(host.enumerate(), Err(UsbError::WouldBlock));
        assert_eq!(host.enumeration_state(), State::DefaultAddress);

        // Trying again times out again.
        assert_eq!(host.enumerate(), Err(UsbError::WouldBlock));
        assert_eq!(host.enumeration_state(), State::DefaultAddress);
    }

    #[test]
    fn enumeration_resumes_after_timeout() {
        let store = DescriptorStore::new();
        let log = sim::log();
        let config = Config {
            transaction_timeout: Some(50),
            ..Config::new()
        };
        let device = Device::new(&store, log.clone()).drop_tokens(1);
        let mut host = Host::new(device, &store, sim::Delay::new(log.clone()), config);

        assert_eq!(host.bring_up(), Ok(Speed::Low));
        assert_eq!(host.enumerate(), Err(UsbError::WouldBlock));
        assert_eq!(host.enumeration_state(), State::DefaultAddress);

        assert_eq!(host.enumerate(), Ok(()));
        assert_eq!(host.enumeration_state(), State::InterfaceSet);
        assert_eq!(
            host.device_descriptor().unwrap().as_bytes(),
            &sim::KEYBOARD_DESCRIPTOR
        );

        // The abandoned SETUP, then the full sequence from the start.
        let tokens: std::vec::Vec<u8> = sim::transactions(&log).iter().map(|t| t.token).collect();
        assert!(tokens.starts_with(&[0xD0, 0xD0, 0x90]));
    }
}
