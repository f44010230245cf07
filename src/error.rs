use core::fmt;

/// Result codes of the controller API.
///
/// `Timeout`, `Cancelled` and `BusDown` are the three ways a blocking call can end without
/// data, and stay distinct so callers can branch on the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    AlreadyInited,
    NotInited,
    NotUp,
    CapacityExceeded,
    NotFound,
    Timeout,
    Cancelled,
    BusDown,
    WouldBlock,
    DeviceError,
}

pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            Error::AlreadyInited => "Controller is already initialized",
            Error::NotInited => "Controller is not initialized",
            Error::NotUp => "Controller is not up",
            Error::CapacityExceeded => "Filter bank is full",
            Error::NotFound => "No such filter or no queue bound to it",
            Error::Timeout => "Timed out",
            Error::Cancelled => "Filter was removed while waiting",
            Error::BusDown => "Controller went down while waiting",
            Error::WouldBlock => "Operation would block",
            Error::DeviceError => "Peripheral driver rejected the operation",
        };

        f.write_str(text)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
