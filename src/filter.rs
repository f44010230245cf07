use embedded_can::{Frame, Id};

use crate::message::{raw_id, Message};

const STANDARD_MASK: u32 = 0x7FF;
const EXTENDED_MASK: u32 = 0x1FFF_FFFF;

/// Acceptance rule for incoming frames.
///
/// A message matches when the identifier bits selected by `mask` are equal, the frame format
/// (standard/extended) is the same, and, for remote-only filters, the message is a remote frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Filter {
    id: u32,
    mask: u32,
    extended: bool,
    rtr_only: bool,
}

impl Filter {
    /// Constructs a filter that only accepts frames with the provided identifier.
    pub fn from_id(id: impl Into<Id>) -> Self {
        match id.into() {
            Id::Standard(id) => Self::new(id.as_raw() as u32, STANDARD_MASK, false),
            Id::Extended(id) => Self::new(id.as_raw(), EXTENDED_MASK, true),
        }
    }

    /// Constructs a filter from an identifier/mask pair.
    ///
    /// Only bits set in `mask` are compared. Bits above the identifier width are ignored.
    pub fn from_mask(id: impl Into<Id>, mask: u32) -> Self {
        let id = id.into();
        match id {
            Id::Standard(_) => Self::new(raw_id(id), mask & STANDARD_MASK, false),
            Id::Extended(_) => Self::new(raw_id(id), mask & EXTENDED_MASK, true),
        }
    }

    /// Constructs a filter that accepts every frame of one format.
    pub fn accept_all(extended: bool) -> Self {
        Self::new(0, 0, extended)
    }

    /// Restricts the filter to remote frames.
    pub fn rtr_only(mut self) -> Self {
        self.rtr_only = true;
        self
    }

    fn new(id: u32, mask: u32, extended: bool) -> Self {
        Filter {
            id: id & mask,
            mask,
            extended,
            rtr_only: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn is_rtr_only(&self) -> bool {
        self.rtr_only
    }

    #[inline]
    pub fn matches(&self, message: &Message) -> bool {
        (message.raw_id() & self.mask) == self.id
            && message.is_extended() == self.extended
            && (!self.rtr_only || message.is_remote_frame())
    }
}
