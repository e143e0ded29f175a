//! The device descriptor captured during enumeration

/// A standard device descriptor
///
/// The host keeps the raw bytes for diagnostics. Fields that the device
/// didn't send read as zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct DeviceDescriptor {
    raw: [u8; DeviceDescriptor::LENGTH],
}

impl DeviceDescriptor {
    /// `bLength` of a device descriptor
    pub const LENGTH: usize = 18;

    pub const fn from_bytes(raw: [u8; Self::LENGTH]) -> Self {
        DeviceDescriptor { raw }
    }

    pub const fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.raw
    }

    fn word(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.raw[offset], self.raw[offset + 1]])
    }

    pub fn length(&self) -> u8 {
        self.raw[0]
    }

    pub fn descriptor_type(&self) -> u8 {
        self.raw[1]
    }

    /// `bcdUSB`
    pub fn usb_release(&self) -> u16 {
        self.word(2)
    }

    pub fn device_class(&self) -> u8 {
        self.raw[4]
    }

    pub fn device_subclass(&self) -> u8 {
        self.raw[5]
    }

    pub fn device_protocol(&self) -> u8 {
        self.raw[6]
    }

    /// `bMaxPacketSize0`
    pub fn max_packet_size_0(&self) -> u8 {
        self.raw[7]
    }

    pub fn vendor_id(&self) -> u16 {
        self.word(8)
    }

    pub fn product_id(&self) -> u16 {
        self.word(10)
    }

    /// `bcdDevice`
    pub fn device_release(&self) -> u16 {
        self.word(12)
    }

    pub fn num_configurations(&self) -> u8 {
        self.raw[17]
    }
}
