//! Register access layer for the USB OTG serial interface engine (SIE)
//!
//! The register block follows the PIC32MX layout. Every register owns a
//! 16-byte slot; the three words after the register are its CLR, SET, and
//! INV aliases. We only use the primary word, and update fields with
//! read-modify-write.
//!
//! Field modules follow the RAL conventions, so they work with the
//! `ral-registers` macros. The same conventions describe the words of a
//! buffer descriptor (see the `bdt` module).

#![allow(non_snake_case, non_upper_case_globals)]

use core::cell::UnsafeCell;

pub use ral_registers::{modify_reg, read_reg, write_reg, RWRegister};

/// Volatile memory cell that conforms to the RAL's register API
///
/// Used for memory that's shared with the SIE, but isn't a register.
#[repr(transparent)]
pub struct VCell<T>(UnsafeCell<T>);

impl<T> VCell<T> {
    pub const fn new(val: T) -> Self {
        VCell(UnsafeCell::new(val))
    }
}

impl<T: Copy> VCell<T> {
    #[inline(always)]
    pub fn read(&self) -> T {
        // Safety: pointer from UnsafeCell is valid and aligned.
        unsafe { self.0.get().read_volatile() }
    }
    #[inline(always)]
    pub fn write(&self, val: T) {
        // Safety: pointer from UnsafeCell is valid and aligned.
        unsafe { self.0.get().write_volatile(val) }
    }
}

/// Defines a field module, `$width` bits wide, starting at `$offset`
macro_rules! field {
    ($name:ident, $offset:expr, $width:expr) => {
        pub mod $name {
            pub const offset: u32 = $offset;
            pub const mask: u32 = ((1u32 << $width) - 1) << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {}
        }
    };
}

pub(crate) use field;

/// USB OTG SIE registers
pub mod usb {
    use super::RWRegister;
    use core::ops::Deref;

    /// USB1 register block address, as seen through KSEG1.
    pub const USB1: *const RegisterBlock = 0xBF88_5040 as *const _;

    #[repr(C)]
    pub struct RegisterBlock {
        pub U1OTGIR: RWRegister<u32>,
        _reserved0: [u32; 3],
        pub U1OTGIE: RWRegister<u32>,
        _reserved1: [u32; 3],
        pub U1OTGSTAT: RWRegister<u32>,
        _reserved2: [u32; 3],
        pub U1OTGCON: RWRegister<u32>,
        _reserved3: [u32; 3],
        pub U1PWRC: RWRegister<u32>,
        // Aliases, then a hole up to U1IR.
        _reserved4: [u32; 95],
        pub U1IR: RWRegister<u32>,
        _reserved5: [u32; 3],
        pub U1IE: RWRegister<u32>,
        _reserved6: [u32; 3],
        pub U1EIR: RWRegister<u32>,
        _reserved7: [u32; 3],
        pub U1EIE: RWRegister<u32>,
        _reserved8: [u32; 3],
        pub U1STAT: RWRegister<u32>,
        _reserved9: [u32; 3],
        pub U1CON: RWRegister<u32>,
        _reserved10: [u32; 3],
        pub U1ADDR: RWRegister<u32>,
        _reserved11: [u32; 3],
        pub U1BDTP1: RWRegister<u32>,
        _reserved12: [u32; 3],
        pub U1FRML: RWRegister<u32>,
        _reserved13: [u32; 3],
        pub U1FRMH: RWRegister<u32>,
        _reserved14: [u32; 3],
        pub U1TOK: RWRegister<u32>,
        _reserved15: [u32; 3],
        pub U1SOF: RWRegister<u32>,
        _reserved16: [u32; 3],
        pub U1BDTP2: RWRegister<u32>,
        _reserved17: [u32; 3],
        pub U1BDTP3: RWRegister<u32>,
        _reserved18: [u32; 3],
        pub U1CNFG1: RWRegister<u32>,
        _reserved19: [u32; 7],
        pub U1EP0: RWRegister<u32>,
        // U1EP1 through U1EP15 are unused by the host.
        _reserved20: [u32; 63],
    }

    const _: () = assert!(core::mem::size_of::<RegisterBlock>() == 0x3C0);

    /// An owned handle to the SIE registers
    pub struct Instance {
        addr: *const RegisterBlock,
    }

    impl Instance {
        /// # Safety
        ///
        /// `addr` must point to a SIE register block, and the caller must
        /// not create another `Instance` for the same block.
        pub(crate) const unsafe fn new(addr: *const ()) -> Self {
            Instance { addr: addr.cast() }
        }
    }

    impl Deref for Instance {
        type Target = RegisterBlock;
        fn deref(&self) -> &RegisterBlock {
            // Safety: see Instance::new.
            unsafe { &*self.addr }
        }
    }

    pub mod U1OTGCON {
        field!(DPPULUP, 7, 1);
        field!(DMPULUP, 6, 1);
        field!(DPPULDWN, 5, 1);
        field!(DMPULDWN, 4, 1);
        field!(OTGEN, 2, 1);
    }

    pub mod U1PWRC {
        field!(USUSPEND, 1, 1);
        field!(USBPWR, 0, 1);
    }

    /// Host-mode interrupt flags. Write 1 to clear.
    pub mod U1IR {
        field!(STALLIF, 7, 1);
        field!(ATTACHIF, 6, 1);
        field!(RESUMEIF, 5, 1);
        field!(IDLEIF, 4, 1);
        field!(TRNIF, 3, 1);
        field!(SOFIF, 2, 1);
        field!(UERRIF, 1, 1);
        field!(DETACHIF, 0, 1);
    }

    pub mod U1IE {
        field!(STALLIE, 7, 1);
        field!(ATTACHIE, 6, 1);
        field!(RESUMEIE, 5, 1);
        field!(IDLEIE, 4, 1);
        field!(TRNIE, 3, 1);
        field!(SOFIE, 2, 1);
        field!(UERRIE, 1, 1);
        field!(DETACHIE, 0, 1);
    }

    pub mod U1CON {
        field!(JSTATE, 7, 1);
        field!(SE0, 6, 1);
        field!(TOKBUSY, 5, 1);
        field!(USBRST, 4, 1);
        field!(HOSTEN, 3, 1);
        field!(RESUME, 2, 1);
        field!(PPBRST, 1, 1);
        field!(SOFEN, 0, 1);
    }

    pub mod U1ADDR {
        field!(LSPDEN, 7, 1);
        field!(DEVADDR, 0, 7);
    }

    /// BDT base address bits 15:9
    pub mod U1BDTP1 {
        field!(BDTPTRL, 1, 7);
    }

    /// BDT base address bits 23:16
    pub mod U1BDTP2 {
        field!(BDTPTRH, 0, 8);
    }

    /// BDT base address bits 31:24
    pub mod U1BDTP3 {
        field!(BDTPTRU, 0, 8);
    }

    pub mod U1TOK {
        field!(PID, 4, 4);
        field!(EP, 0, 4);
    }

    pub mod U1SOF {
        field!(CNT, 0, 8);
    }

    pub mod U1CNFG1 {
        field!(UOEMON, 6, 1);
        field!(PPB, 0, 2);
    }

    pub mod U1EP0 {
        field!(LSPD, 7, 1);
        field!(RETRYDIS, 6, 1);
        field!(EPCONDIS, 4, 1);
        field!(EPRXEN, 3, 1);
        field!(EPTXEN, 2, 1);
        field!(EPSTALL, 1, 1);
        field!(EPHSHK, 0, 1);
    }
}
