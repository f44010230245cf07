//! # canctl
//!
//! A hardware-agnostic CAN controller layer for RTOS targets. A peripheral driver is wrapped in
//! a [`Controller`] that offers the device lifecycle (`init`, `up`, `down`, `deinit`),
//! per-identifier filters, and blocking or interrupt-safe send and receive.
//!
//! Received frames are matched against every registered [`Filter`] in registration order. Each
//! match is delivered to the filter's target: a [`Callback`] run directly in interrupt context,
//! an [`RxQueue`] a task blocks on, or both (callback first, the queue gets what the callback
//! does not consume).
//!
//! Blocking calls take a timeout in scheduler [`Ticks`] and suspend on the [`Semaphore`] of the
//! [`Kernel`] port. With the `std` feature, [`std_kernel::StdKernel`] maps tasks to threads.
#![cfg_attr(not(feature = "std"), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
pub mod controller;
pub mod device;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod filter;
pub mod kernel;
pub mod message;
pub mod queue;
pub mod registry;
#[cfg(feature = "std")]
pub mod std_kernel;

pub use config::Config;
pub use controller::{Controller, State, Stats};
pub use device::DeviceTable;
pub use dispatcher::{Bus, Callback, DeliveryTarget};
pub use driver::{Driver, IrqHandler};
pub use error::{Error, Result};
pub use filter::Filter;
pub use kernel::{Kernel, Semaphore, Ticks, MAX_DELAY};
pub use message::Message;
pub use queue::{OverflowPolicy, RxQueue, RxSink};
pub use registry::{FilterId, FilterRegistry};

pub use embedded_can::{ExtendedId, Frame, Id, StandardId};
