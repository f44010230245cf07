/// Bitrates (bit/s) every CAN transceiver is expected to support.
pub static STANDARD_BITRATES: &[u32] = &[
    1_000_000, 800_000, 500_000, 250_000, 125_000, 100_000, 50_000, 20_000, 10_000,
];

/// Identity and bus settings of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Stable device index, used to look the controller up in a `DeviceTable`.
    pub index: u32,
    /// Nominal bitrate in bit/s, passed to the driver on activation.
    pub bitrate: u32,
    pub name: &'static str,
}

impl Config {
    pub const fn new(index: u32, bitrate: u32) -> Self {
        Config {
            index,
            bitrate,
            name: "can",
        }
    }

    pub const fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn is_standard_bitrate(&self) -> bool {
        STANDARD_BITRATES.contains(&self.bitrate)
    }
}
