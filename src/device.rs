use heapless::Vec;

use crate::error::{Error, Result};

/// Startup-built table of statically allocated devices, keyed by their stable index.
///
/// Devices are registered once and never removed.
pub struct DeviceTable<'a, T: ?Sized, const N: usize> {
    devices: Vec<(u32, &'a T), N>,
}

impl<'a, T: ?Sized, const N: usize> DeviceTable<'a, T, N> {
    pub const fn new() -> Self {
        DeviceTable {
            devices: Vec::new(),
        }
    }

    pub fn register(&mut self, index: u32, device: &'a T) -> Result<()> {
        if self.get(index).is_some() {
            return Err(Error::AlreadyInited);
        }
        self.devices
            .push((index, device))
            .map_err(|_| Error::CapacityExceeded)
    }

    pub fn get(&self, index: u32) -> Option<&'a T> {
        self.devices
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, device)| *device)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &'a T)> + '_ {
        self.devices.iter().map(|(i, device)| (*i, *device))
    }
}

impl<'a, T: ?Sized, const N: usize> Default for DeviceTable<'a, T, N> {
    fn default() -> Self {
        Self::new()
    }
}
