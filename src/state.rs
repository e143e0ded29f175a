//! Static state shared with the SIE
//!
//! The descriptor table and the two staging buffers are the only memory
//! that the SIE touches. They're allocated once, typically in a `static`,
//! and handed to exactly one host.

use core::{
    marker::PhantomData,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    bdt::{BufferDescriptor, Slot, BDT_ALIGNMENT, SLOT_COUNT},
    buffer::{Buffer, StagingMemory},
};

/// The buffer descriptor table
///
/// One descriptor per direction. The SIE requires the 512 byte alignment.
#[repr(C, align(512))]
struct Bdt([BufferDescriptor; SLOT_COUNT]);

const _: () = assert!(core::mem::align_of::<Bdt>() == BDT_ALIGNMENT);

/// Descriptors and staging buffers for a host.
///
/// Allocate a `static` object and supply it to your host constructor.
/// A store can only be assigned once; the host constructor panics otherwise.
///
/// ```
/// use sie_usbh::DescriptorStore;
///
/// static DESCRIPTORS: DescriptorStore = DescriptorStore::new();
/// ```
pub struct DescriptorStore {
    bdt: Bdt,
    tx: StagingMemory,
    rx: StagingMemory,
    taken: AtomicBool,
}

unsafe impl Sync for DescriptorStore {}

impl DescriptorStore {
    pub const fn new() -> Self {
        DescriptorStore {
            bdt: Bdt([BufferDescriptor::new(), BufferDescriptor::new()]),
            tx: StagingMemory::new(),
            rx: StagingMemory::new(),
            taken: AtomicBool::new(false),
        }
    }

    /// Acquire the descriptors.
    ///
    /// Returns `None` if the descriptors were already taken.
    pub(crate) fn take(&self) -> Option<Descriptors<'_>> {
        (!self.taken.swap(true, Ordering::SeqCst)).then(|| self.view())
    }

    /// The SIE's view of the same memory
    #[cfg(test)]
    pub(crate) fn hardware(&self) -> Descriptors<'_> {
        self.view()
    }

    fn view(&self) -> Descriptors<'_> {
        Descriptors {
            bdt: &self.bdt.0,
            // Safety: all buffer access is volatile. Software only touches a
            // staging buffer while the SIE doesn't own its descriptor.
            tx: unsafe { self.tx.buffer() },
            rx: unsafe { self.rx.buffer() },
            _store: PhantomData,
        }
    }
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Addresses and sizes of the store, for diagnostics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Snapshot {
    /// Size of the descriptor table, in bytes
    pub bdt_size: usize,
    pub bdt_address: u32,
    pub tx_address: u32,
    pub rx_address: u32,
}

/// Exclusive access to the descriptors and staging buffers
pub struct Descriptors<'a> {
    bdt: &'a [BufferDescriptor; SLOT_COUNT],
    tx: Buffer,
    rx: Buffer,
    _store: PhantomData<&'a DescriptorStore>,
}

impl Descriptors<'_> {
    /// Zero the descriptors, and bind each to its staging buffer
    ///
    /// Returns the snapshot that the caller publishes to the SIE.
    pub fn initialize(&mut self) -> Snapshot {
        for bd in self.bdt.iter() {
            bd.clear();
        }
        let snapshot = self.snapshot();
        self.descriptor(Slot::Tx).set_buffer(snapshot.tx_address);
        self.descriptor(Slot::Rx).set_buffer(snapshot.rx_address);
        snapshot
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            bdt_size: core::mem::size_of_val(self.bdt),
            bdt_address: physical_address(self.bdt.as_ptr() as usize),
            tx_address: physical_address(self.tx.as_ptr_mut() as usize),
            rx_address: physical_address(self.rx.as_ptr_mut() as usize),
        }
    }

    pub fn descriptor(&self, slot: Slot) -> &BufferDescriptor {
        &self.bdt[slot.index()]
    }

    /// Host to device staging buffer
    pub fn tx(&self) -> &Buffer {
        &self.tx
    }

    /// Device to host staging buffer
    pub fn rx(&self) -> &Buffer {
        &self.rx
    }
}

/// Translate a KSEG0 / KSEG1 address to the physical address the SIE uses
fn physical_address(addr: usize) -> u32 {
    (addr & 0x1FFF_FFFF) as u32
}
