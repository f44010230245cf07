use heapless::Vec;

use crate::dispatcher::{Callback, DeliveryTarget};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::message::Message;
use crate::queue::RxSink;

/// Handle of a registered filter. Never reused by the registry that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilterId(u32);

impl FilterId {
    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

pub struct Entry<'a> {
    pub id: FilterId,
    pub filter: Filter,
    pub target: DeliveryTarget<'a>,
}

/// Registered filters of one controller, in registration order.
///
/// Holds at most `N` entries, further limited at runtime to the filter-bank size of the
/// peripheral. The registry itself does no locking: the controller keeps it behind the same
/// mutex the dispatcher reads it through, so a lookup sees either the old or the new set.
pub struct FilterRegistry<'a, const N: usize> {
    entries: Vec<Entry<'a>, N>,
    capacity: usize,
    next_id: u32,
}

impl<'a, const N: usize> FilterRegistry<'a, N> {
    pub fn new(capacity: usize) -> Self {
        FilterRegistry {
            entries: Vec::new(),
            capacity: capacity.min(N),
            next_id: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry<'a>> {
        self.entries.iter()
    }

    /// Appends a filter. On failure the registry is left untouched.
    pub fn register(&mut self, filter: Filter, target: DeliveryTarget<'a>) -> Result<FilterId> {
        if self.entries.len() >= self.capacity {
            return Err(Error::CapacityExceeded);
        }
        let id = FilterId(self.next_id);
        self.entries
            .push(Entry { id, filter, target })
            .map_err(|_| Error::CapacityExceeded)?;
        self.next_id = self.next_id.wrapping_add(1);
        if let Some(queue) = target.queue {
            queue.attach();
        }
        Ok(id)
    }

    /// Removes a filter and wakes any task blocked on its queue with `Cancelled`.
    pub fn deregister(&mut self, id: FilterId) -> Result<Filter> {
        let position = self.position(id).ok_or(Error::NotFound)?;
        let entry = self.entries.remove(position);
        if let Some(queue) = entry.target.queue {
            queue.close(Error::Cancelled);
        }
        Ok(entry.filter)
    }

    /// Removes every filter, as [`FilterRegistry::deregister`] does.
    pub fn clear(&mut self) {
        while let Some(entry) = self.entries.pop() {
            if let Some(queue) = entry.target.queue {
                queue.close(Error::Cancelled);
            }
        }
    }

    pub fn set_callback(&mut self, id: FilterId, callback: Option<&'a dyn Callback>) -> Result<()> {
        let position = self.position(id).ok_or(Error::NotFound)?;
        self.entries[position].target.callback = callback;
        Ok(())
    }

    pub fn queue_of(&self, id: FilterId) -> Option<&'a dyn RxSink> {
        self.position(id)
            .and_then(|position| self.entries[position].target.queue)
    }

    /// Targets of every filter matching `message`, first registered first.
    pub fn lookup_matches(&self, message: &Message) -> Vec<DeliveryTarget<'a>, N> {
        let mut targets = Vec::new();
        for entry in self.entries.iter().filter(|e| e.filter.matches(message)) {
            // cannot fail, there are never more matches than entries
            let _ = targets.push(entry.target);
        }
        targets
    }

    /// Resets every bound queue, waking their waiters with `reason`.
    pub(crate) fn reset_queues(&self, reason: Error) {
        for entry in self.entries.iter() {
            if let Some(queue) = entry.target.queue {
                queue.reset(reason);
            }
        }
    }

    fn position(&self, id: FilterId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }
}
