#![allow(dead_code)]

use canctl::std_kernel::StdKernel;
use canctl::{Config, Controller, Driver, Frame, Message, RxQueue, StandardId};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

pub const FILTER_BANKS: usize = 4;

pub type TestController<'a> = Controller<'a, CriticalSectionRawMutex, StdKernel, MockDriver, 8>;
pub type TestQueue<const N: usize> = RxQueue<CriticalSectionRawMutex, StdKernel, N>;

#[derive(Debug, PartialEq)]
pub struct Rejected;

/// Peripheral stand-in with a configurable number of free transmit mailboxes.
pub struct MockDriver {
    pub filter_banks: usize,
    pub active: bool,
    pub bitrate: Option<u32>,
    pub refuse_activation: bool,
    pub free_mailboxes: usize,
    pub sent: Vec<Message>,
}

impl Default for MockDriver {
    fn default() -> Self {
        MockDriver {
            filter_banks: FILTER_BANKS,
            active: false,
            bitrate: None,
            refuse_activation: false,
            free_mailboxes: 3,
            sent: Vec::new(),
        }
    }
}

impl Driver for MockDriver {
    type Error = Rejected;

    fn filter_capacity(&self) -> usize {
        self.filter_banks
    }

    fn activate(&mut self, bitrate: u32) -> Result<(), Self::Error> {
        if self.refuse_activation {
            return Err(Rejected);
        }
        self.active = true;
        self.bitrate = Some(bitrate);
        Ok(())
    }

    fn deactivate(&mut self) {
        self.active = false;
    }

    fn submit_frame(&mut self, message: &Message) -> nb::Result<(), Self::Error> {
        if !self.active {
            return Err(nb::Error::Other(Rejected));
        }
        if self.free_mailboxes == 0 {
            return Err(nb::Error::WouldBlock);
        }
        self.free_mailboxes -= 1;
        self.sent.push(*message);
        Ok(())
    }
}

pub fn controller<'a>() -> TestController<'a> {
    Controller::new(Config::new(0, 500_000).with_name("can0"), MockDriver::default())
}

pub fn up_controller<'a>() -> TestController<'a> {
    let controller = controller();
    controller.init().unwrap();
    controller.up().unwrap();
    controller
}

pub fn std_id(id: u16) -> StandardId {
    StandardId::new(id).unwrap()
}

pub fn message(id: u16, data: &[u8]) -> Message {
    Message::new(std_id(id), data).unwrap()
}
