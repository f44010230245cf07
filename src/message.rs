use embedded_can::{Frame, Id};

/// Maximum payload of a classic CAN frame.
pub const MAX_DLC: usize = 8;

/// One classic CAN frame.
///
/// Immutable once built: construct through [`Frame::new`] or [`Frame::new_remote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    id: Id,
    data: [u8; MAX_DLC],
    dlc: u8,
    is_remote: bool,
}

impl Message {
    /// Identifier as a plain number, without the extended tag.
    #[inline]
    pub fn raw_id(&self) -> u32 {
        raw_id(self.id)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Message {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "Message {{ id: {=u32:#x}, extended: {=bool}, remote: {=bool}, data: {=[u8]} }}",
            self.raw_id(),
            self.is_extended(),
            self.is_remote,
            self.data()
        )
    }
}

impl Frame for Message {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DLC {
            return None;
        }
        let mut frame_data = [0; MAX_DLC];
        frame_data[0..data.len()].copy_from_slice(data);
        Some(Message {
            id: id.into(),
            data: frame_data,
            dlc: data.len() as u8,
            is_remote: false,
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > MAX_DLC {
            return None;
        }
        Some(Message {
            id: id.into(),
            data: [0; MAX_DLC],
            dlc: dlc as u8,
            is_remote: true,
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.is_remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    /// Remote frames carry a length but no payload.
    fn data(&self) -> &[u8] {
        if self.is_remote {
            &[]
        } else {
            &self.data[0..self.dlc as usize]
        }
    }
}

#[inline]
pub(crate) fn raw_id(id: Id) -> u32 {
    match id {
        Id::Standard(id) => id.as_raw() as u32,
        Id::Extended(id) => id.as_raw(),
    }
}
