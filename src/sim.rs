//! A simulated SIE with a boot keyboard attached
//!
//! The device shares the descriptor store with the host, and answers
//! each token synchronously: it reads the armed descriptor, moves the
//! payload through the staging buffers, and releases the descriptor with
//! a PID and byte count like the real SIE. Everything the host does to the
//! SIE lands in a shared event log.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    vec::Vec,
};

use crate::{
    bdt::{Pid, Slot, Toggle},
    keyboard::{Probe, ProbePoint},
    sie::{Interrupts, Sie, Token, TokenPid},
    state::{DescriptorStore, Descriptors},
};

/// A low-speed keyboard with an 8 byte EP0
pub const KEYBOARD_DESCRIPTOR: [u8; 18] = [
    0x12, 0x01, 0x10, 0x01, 0x00, 0x00, 0x00, 0x08, 0x6D, 0x04, 0x1C, 0xC3, 0x00, 0x49, 0x01,
    0x02, 0x00, 0x01,
];

/// A token, as the device saw it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// U1TOK value
    pub token: u8,
    /// Device address at the time of the token
    pub address: u8,
    pub toggle: Toggle,
    /// Byte count armed by the host
    pub byte_count: usize,
    /// Payload sent by the host
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    PowerOn,
    BdtAddress(u32),
    HostEnabled,
    SofThreshold(u8),
    Sof(bool),
    InterruptsEnabled(Interrupts),
    Acknowledge(Interrupts),
    LowSpeed(bool),
    Reset(bool),
    ControlEndpoint,
    Address(u8),
    Token(Transaction),
    /// Milliseconds
    Delay(u32),
    Probe(ProbePoint),
}

pub type Log = Rc<RefCell<Vec<Event>>>;

pub fn log() -> Log {
    Log::default()
}

pub fn events(log: &Log) -> Vec<Event> {
    log.borrow().clone()
}

pub fn transactions(log: &Log) -> Vec<Transaction> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::Token(transaction) => Some(transaction.clone()),
            _ => None,
        })
        .collect()
}

const GET_DESCRIPTOR: [u8; 2] = [0x80, 0x06];
const SET_REPORT: [u8; 2] = [0x21, 0x09];

pub struct Device<'a> {
    hardware: Descriptors<'a>,
    log: Log,
    pending: Cell<Interrupts>,
    polls: Cell<u32>,
    poll_limit: u32,
    responsive: bool,
    /// Tokens still to be ignored before answering
    dropped: usize,
    jstate: bool,
    address: u8,
    chunks: Vec<usize>,
    /// Descriptor bytes sent so far, while a descriptor read is underway
    sent: Option<usize>,
    last_setup: [u8; 8],
    /// Request that the device refuses
    stalled_request: Option<[u8; 2]>,
    /// The current control transfer was refused
    stalling: bool,
    reports: VecDeque<Vec<u8>>,
    leds: Vec<u8>,
}

impl<'a> Device<'a> {
    pub fn new(store: &'a DescriptorStore, log: Log) -> Self {
        Device {
            hardware: store.hardware(),
            log,
            pending: Cell::new(Interrupts::empty()),
            polls: Cell::new(0),
            poll_limit: 1_000_000,
            responsive: true,
            dropped: 0,
            jstate: false,
            address: 0,
            chunks: std::vec![8, 10],
            sent: None,
            last_setup: [0; 8],
            stalled_request: None,
            stalling: false,
            reports: VecDeque::new(),
            leds: Vec::new(),
        }
    }

    /// Answer descriptor reads with packets of these sizes
    pub fn split_descriptor(mut self, chunks: &[usize]) -> Self {
        self.chunks = chunks.to_vec();
        self
    }

    pub fn full_speed(mut self) -> Self {
        self.jstate = true;
        self
    }

    /// Never complete a token, and panic after `poll_limit` flag polls
    pub fn unresponsive(mut self, poll_limit: u32) -> Self {
        self.responsive = false;
        self.poll_limit = poll_limit;
        self
    }

    /// Ignore the first `count` tokens, then answer normally
    pub fn drop_tokens(mut self, count: usize) -> Self {
        self.dropped = count;
        self
    }

    /// STALL every stage of control transfers that start with `request`
    ///
    /// `request` is the bmRequestType and bRequest pair.
    pub fn stall_request(mut self, request: [u8; 2]) -> Self {
        self.stalled_request = Some(request);
        self
    }

    /// Set interrupt flags, as the SIE would on its own
    pub fn raise(&self, flags: Interrupts) {
        self.pending.set(self.pending.get() | flags);
    }

    pub fn queue_report(self, report: [u8; 8]) -> Self {
        self.queue_short_report(&report)
    }

    pub fn queue_short_report(mut self, report: &[u8]) -> Self {
        self.reports.push_back(report.to_vec());
        self
    }

    /// LED patterns received through SET_REPORT
    pub fn leds(&self) -> Vec<u8> {
        self.leds.clone()
    }

    fn push(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }

    fn respond(&mut self, token: Token) {
        let rx = self.hardware.descriptor(Slot::Rx);
        let tx = self.hardware.descriptor(Slot::Tx);
        match (token.pid(), token.endpoint()) {
            (TokenPid::Setup, 0) => {
                self.hardware.tx().volatile_read(&mut self.last_setup);
                self.stalling = self
                    .stalled_request
                    .is_some_and(|request| self.last_setup.starts_with(&request));
                if self.stalling {
                    self.sent = None;
                    tx.complete(Pid::Stall, 0);
                    return;
                }
                self.sent = self.last_setup.starts_with(&GET_DESCRIPTOR).then_some(0);
                tx.complete(Pid::Ack, tx.byte_count());
            }
            (TokenPid::In, 0) if self.stalling => rx.complete(Pid::Stall, 0),
            (TokenPid::Out, 0) if self.stalling => tx.complete(Pid::Stall, 0),
            (TokenPid::In, 0) => match self.sent {
                Some(sent) => {
                    let index = self
                        .chunks
                        .iter()
                        .scan(0, |total, chunk| {
                            let start = *total;
                            *total += chunk;
                            Some(start)
                        })
                        .position(|start| start == sent)
                        .expect("IN at an unexpected descriptor offset");
                    let end = (sent + self.chunks[index]).min(KEYBOARD_DESCRIPTOR.len());
                    let packet = &KEYBOARD_DESCRIPTOR[sent..end];
                    self.hardware.rx().volatile_write(packet);
                    let pid = match rx.toggle() {
                        Toggle::Data0 => Pid::Data0,
                        Toggle::Data1 => Pid::Data1,
                    };
                    rx.complete(pid, packet.len());
                    self.sent = (end < KEYBOARD_DESCRIPTOR.len()).then_some(end);
                }
                None => rx.complete(Pid::Data1, 0),
            },
            (TokenPid::Out, 0) => {
                if self.last_setup.starts_with(&SET_REPORT) && tx.byte_count() > 0 {
                    let mut led = [0];
                    self.hardware.tx().volatile_read(&mut led);
                    self.leds.push(led[0]);
                }
                tx.complete(Pid::Ack, tx.byte_count());
            }
            (TokenPid::In, 1) => {
                let report = self.reports.pop_front().expect("No report queued");
                self.hardware.rx().volatile_write(&report);
                rx.complete(Pid::Data1, report.len());
            }
            (pid, endpoint) => panic!("Unexpected {pid:?} token for EP{endpoint}"),
        }
    }
}

impl Sie for Device<'_> {
    fn power_on(&mut self) {
        self.push(Event::PowerOn);
    }

    fn set_bdt_address(&mut self, address: u32) {
        self.push(Event::BdtAddress(address));
    }

    fn enable_host(&mut self) {
        self.push(Event::HostEnabled);
    }

    fn set_sof_threshold(&mut self, threshold: u8) {
        self.push(Event::SofThreshold(threshold));
    }

    fn set_sof_enabled(&mut self, enable: bool) {
        self.push(Event::Sof(enable));
    }

    fn enable_interrupts(&mut self, flags: Interrupts) {
        self.push(Event::InterruptsEnabled(flags));
        // The keyboard is always plugged in.
        if flags.contains(Interrupts::ATTACH) {
            self.pending.set(self.pending.get() | Interrupts::ATTACH);
        }
    }

    fn pending(&self) -> Interrupts {
        let polls = self.polls.get() + 1;
        assert!(polls <= self.poll_limit, "still polling after {polls} polls");
        self.polls.set(polls);
        self.pending.get()
    }

    fn acknowledge(&mut self, flags: Interrupts) {
        self.push(Event::Acknowledge(flags));
        self.pending.set(self.pending.get() - flags);
    }

    fn is_jstate(&self) -> bool {
        self.jstate
    }

    fn set_low_speed(&mut self, low_speed: bool) {
        self.push(Event::LowSpeed(low_speed));
    }

    fn set_bus_reset(&mut self, reset: bool) {
        self.push(Event::Reset(reset));
    }

    fn enable_control_endpoint(&mut self) {
        self.push(Event::ControlEndpoint);
    }

    fn set_device_address(&mut self, address: u8) {
        self.push(Event::Address(address));
        self.address = address;
    }

    fn issue_token(&mut self, token: Token) {
        let bd = self.hardware.descriptor(token.slot());
        assert!(bd.is_owned(), "Token issued for a descriptor that software owns");
        assert_eq!(bd.pid(), Pid::Cleared, "Descriptor armed without clearing the PID");

        let mut data = std::vec![0; bd.byte_count()];
        if token.slot() == Slot::Tx {
            self.hardware.tx().volatile_read(&mut data);
        } else {
            data.clear();
        }
        self.push(Event::Token(Transaction {
            token: token.raw(),
            address: self.address,
            toggle: bd.toggle(),
            byte_count: bd.byte_count(),
            data,
        }));

        if self.dropped > 0 {
            self.dropped -= 1;
        } else if self.responsive {
            self.respond(token);
            self.pending.set(self.pending.get() | Interrupts::TRN);
        }
    }
}

/// Logs delays instead of waiting
pub struct Delay {
    log: Log,
}

impl Delay {
    pub fn new(log: Log) -> Self {
        Delay { log }
    }
}

impl embedded_hal::delay::DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        self.log.borrow_mut().push(Event::Delay(ns / 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.log.borrow_mut().push(Event::Delay(ms));
    }
}

/// Logs probe points
pub struct Recorder {
    log: Log,
}

impl Recorder {
    pub fn new(log: Log) -> Self {
        Recorder { log }
    }
}

impl Probe for Recorder {
    fn toggle(&mut self, point: ProbePoint) {
        self.log.borrow_mut().push(Event::Probe(point));
    }
}
