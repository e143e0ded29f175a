//! Single transactions through the descriptor table
//!
//! A transaction is one token, one optional data packet, and one
//! handshake. Software arms a descriptor, hands it to the SIE, writes the
//! token, and then spins on the transaction-complete flag. There's one
//! transaction in flight at a time.

use crate::{
    bdt::{Pid, Slot, Toggle},
    config::Config,
    sie::{Interrupts, Sie, Token},
    state::{Descriptors, Snapshot},
};
use usb_device::{Result, UsbError};

/// What the SIE reported for a finished transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Completion {
    /// Data PID for IN tokens, handshake for SETUP and OUT tokens
    pub pid: Pid,
    /// Number of bytes moved in the data packet
    pub byte_count: usize,
}

/// Owns the SIE and the descriptors, and runs transactions
pub struct Engine<'a, S> {
    sie: S,
    descriptors: Descriptors<'a>,
    ep0_max_packet_size: usize,
    timeout: Option<u32>,
}

impl<'a, S: Sie> Engine<'a, S> {
    pub fn new(sie: S, descriptors: Descriptors<'a>, config: &Config) -> Self {
        Engine {
            sie,
            descriptors,
            ep0_max_packet_size: (config.ep0_max_packet_size as usize).max(1),
            timeout: config.transaction_timeout,
        }
    }

    /// Reset the descriptor table, and publish it to the SIE
    ///
    /// Call this before any transaction.
    pub fn initialize(&mut self) -> Snapshot {
        let snapshot = self.descriptors.initialize();
        self.sie.set_bdt_address(snapshot.bdt_address);
        debug!(
            "BDT {=usize} bytes at {=u32:#x}; TX {=u32:#x}; RX {=u32:#x}",
            snapshot.bdt_size,
            snapshot.bdt_address,
            snapshot.tx_address,
            snapshot.rx_address
        );
        snapshot
    }

    pub fn sie(&self) -> &S {
        &self.sie
    }

    pub fn sie_mut(&mut self) -> &mut S {
        &mut self.sie
    }

    pub fn descriptors(&self) -> &Descriptors<'a> {
        &self.descriptors
    }

    pub(crate) fn ep0_max_packet_size(&self) -> usize {
        self.ep0_max_packet_size
    }

    /// Describe the next packet for `slot`
    ///
    /// Clears the PID left over from the previous transaction. The SIE
    /// must not own the descriptor.
    pub fn arm(&mut self, slot: Slot, toggle: Toggle, byte_count: usize) {
        let bd = self.descriptors.descriptor(slot);
        bd.clear_pid();
        bd.prepare(toggle, byte_count);
    }

    /// Run one transaction with the descriptor armed for `token`
    ///
    /// Blocks until the SIE signals completion. If the configuration has a
    /// transaction timeout, returns `WouldBlock` once the poll limit is
    /// reached. The descriptor is back in software's hands either way, so
    /// the caller may arm it again.
    pub fn run_transaction(&mut self, token: Token) -> Result<Completion> {
        // A completion flag left over from an abandoned transaction would
        // end the wait early.
        self.sie.acknowledge(Interrupts::TRN);
        self.descriptors.descriptor(token.slot()).set_owned();
        self.sie.issue_token(token);

        if let Err(err) = self.wait_for(Interrupts::TRN, self.timeout) {
            self.descriptors.descriptor(token.slot()).release();
            self.sie.acknowledge(Interrupts::TRN);
            warn!("Gave up on token {=u8:#x}", token.raw());
            return Err(err);
        }
        self.sie.acknowledge(Interrupts::TRN);

        let bd = self.descriptors.descriptor(token.slot());
        let completion = Completion {
            pid: bd.pid(),
            byte_count: bd.byte_count(),
        };
        trace!(
            "TOKEN {=u8:#x} {} {=usize}",
            token.raw(),
            completion.pid,
            completion.byte_count
        );
        if completion.pid == Pid::Stall {
            warn!("STALL on token {=u8:#x}", token.raw());
        }
        Ok(completion)
    }

    /// Spin until all `flags` are pending
    ///
    /// `limit` bounds the number of polls. `None` never gives up.
    pub(crate) fn wait_for(&self, flags: Interrupts, limit: Option<u32>) -> Result<()> {
        let mut polls: u32 = 0;
        while !self.sie.pending().contains(flags) {
            if limit.is_some_and(|limit| polls >= limit) {
                return Err(UsbError::WouldBlock);
            }
            polls = polls.saturating_add(1);
            core::hint::spin_loop();
        }
        Ok(())
    }
}
