use crate::message::Message;

/// Register-level CAN peripheral.
///
/// The driver is owned by its `Controller` and only ever called under the controller lock.
/// It reports received frames by calling `Controller::on_frame_received` and freed transmit
/// mailboxes by calling `Controller::on_tx_complete`, both from its interrupt handler and never
/// from inside one of the methods below.
pub trait Driver {
    type Error: core::fmt::Debug;

    /// Number of acceptance filters the peripheral provides.
    fn filter_capacity(&self) -> usize;

    /// Enables reception and transmission at the given bitrate.
    fn activate(&mut self, bitrate: u32) -> Result<(), Self::Error>;

    fn deactivate(&mut self);

    /// Puts a frame in a free transmit mailbox.
    ///
    /// Returns `nb::Error::WouldBlock` if every mailbox is occupied. Callable from task and
    /// interrupt context.
    fn submit_frame(&mut self, message: &Message) -> nb::Result<(), Self::Error>;
}

/// Interrupt-side entry points of a controller, for drivers that keep a `&'static` to it.
pub trait IrqHandler: Sync {
    /// One frame was received.
    fn on_frame_received(&self, message: &Message);

    /// A transmit mailbox became free.
    fn on_tx_complete(&self);
}
