//! Interrupt-context delivery of one received frame to its matching targets.

use crate::error::Result;
use crate::message::Message;
use crate::queue::RxSink;

/// Controller handle given to callbacks.
///
/// Only non-blocking operations are offered, since callbacks run in interrupt context.
pub trait Bus {
    /// Stable device index from the controller configuration.
    fn index(&self) -> u32;

    fn bitrate(&self) -> u32;

    /// Submits a frame without blocking, see `Controller::send_isr`.
    fn send_isr(&self, message: &Message) -> Result<()>;
}

/// Synchronous message handler invoked from interrupt context.
///
/// Must not block and must return quickly. Returning `true` marks the message as consumed;
/// `false` passes it on to the queue bound to the same filter, if any.
pub trait Callback: Sync {
    fn on_message(&self, bus: &dyn Bus, message: &Message) -> bool;
}

impl<F> Callback for F
where
    F: Fn(&dyn Bus, &Message) -> bool + Sync,
{
    fn on_message(&self, bus: &dyn Bus, message: &Message) -> bool {
        self(bus, message)
    }
}

/// Where messages accepted by one filter go.
#[derive(Clone, Copy)]
pub struct DeliveryTarget<'a> {
    pub(crate) callback: Option<&'a dyn Callback>,
    pub(crate) queue: Option<&'a dyn RxSink>,
}

impl<'a> DeliveryTarget<'a> {
    pub fn callback(callback: &'a dyn Callback) -> Self {
        DeliveryTarget {
            callback: Some(callback),
            queue: None,
        }
    }

    pub fn queue(queue: &'a dyn RxSink) -> Self {
        DeliveryTarget {
            callback: None,
            queue: Some(queue),
        }
    }

    /// Callback first; the queue receives whatever the callback does not consume.
    pub fn both(callback: &'a dyn Callback, queue: &'a dyn RxSink) -> Self {
        DeliveryTarget {
            callback: Some(callback),
            queue: Some(queue),
        }
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn has_queue(&self) -> bool {
        self.queue.is_some()
    }
}

/// Outcome of one dispatch, for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub consumed: u32,
    pub queued: u32,
    pub dropped: u32,
}

/// Hands `message` to each target in order.
///
/// Never fails: a message a queue refuses, because it is full or detached, counts as dropped.
pub fn deliver(bus: &dyn Bus, targets: &[DeliveryTarget<'_>], message: &Message) -> Delivery {
    let mut delivery = Delivery::default();
    for target in targets {
        if let Some(callback) = target.callback {
            if callback.on_message(bus, message) {
                delivery.consumed += 1;
                continue;
            }
        }
        if let Some(queue) = target.queue {
            if queue.push(message) {
                delivery.queued += 1;
            } else {
                delivery.dropped += 1;
            }
        }
    }
    delivery
}
