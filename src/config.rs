//! Host timings and limits

/// Timings and limits for bring-up and transfers
///
/// The defaults work for a boot keyboard on a full-speed SIE.
///
/// ```
/// use sie_usbh::Config;
///
/// const CONFIG: Config = Config {
///     transaction_timeout: Some(100_000),
///     ..Config::new()
/// };
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Config {
    /// SOF threshold, in byte times
    pub sof_threshold: u8,
    /// Wait between attach and speed classification, in milliseconds
    pub attach_settle_ms: u32,
    /// How long the host drives bus reset, in milliseconds
    pub reset_ms: u32,
    /// Wait after SOF starts, before enumeration, in milliseconds
    pub reset_recovery_ms: u32,
    /// Wait between SET_ADDRESS and the first addressed transaction
    pub set_address_settle_ms: u32,
    /// EP0 max packet size
    ///
    /// An IN data stage keeps going while the device answers with packets
    /// of exactly this size.
    pub ep0_max_packet_size: u16,
    /// Poll limit for a single transaction
    ///
    /// `None` waits forever.
    pub transaction_timeout: Option<u32>,
}

impl Config {
    pub const fn new() -> Self {
        Config {
            sof_threshold: 0x4A,
            attach_settle_ms: 100,
            reset_ms: 50,
            reset_recovery_ms: 10,
            set_address_settle_ms: 2,
            ep0_max_packet_size: 8,
            transaction_timeout: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
