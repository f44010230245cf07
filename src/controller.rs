use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::Config;
use crate::dispatcher::{self, Bus, Callback, DeliveryTarget};
use crate::driver::{Driver, IrqHandler};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::kernel::{Deadline, Kernel, Semaphore, Ticks};
use crate::message::Message;
use crate::registry::{FilterId, FilterRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Uninitialized,
    Initialized,
    Up,
    Down,
}

/// Controller-wide counters. All of them wrap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    /// Frames received while up.
    pub rx_frames: u32,
    /// Received frames no filter matched.
    pub unmatched_frames: u32,
    /// Deliveries a queue did not take: it was full, or no longer bound to a filter.
    pub queue_drops: u32,
    /// Frames accepted by the driver.
    pub tx_frames: u32,
}

struct TxWaiters {
    count: usize,
    epoch: u32,
}

struct Inner<'a, D, const F: usize> {
    state: State,
    driver: D,
    registry: FilterRegistry<'a, F>,
    tx: TxWaiters,
    stats: Stats,
}

impl<'a, D: Driver, const F: usize> Inner<'a, D, F> {
    fn submit_isr(&mut self, message: &Message) -> Result<()> {
        self.ensure_up()?;
        match self.driver.submit_frame(message) {
            Ok(()) => {
                self.stats.tx_frames = self.stats.tx_frames.wrapping_add(1);
                Ok(())
            }
            Err(nb::Error::WouldBlock) => Err(Error::WouldBlock),
            Err(nb::Error::Other(_)) => Err(Error::DeviceError),
        }
    }
}

impl<'a, D, const F: usize> Inner<'a, D, F> {
    fn ensure_up(&self) -> Result<()> {
        match self.state {
            State::Up => Ok(()),
            _ => Err(Error::NotUp),
        }
    }

    fn ensure_inited(&self) -> Result<()> {
        match self.state {
            State::Uninitialized => Err(Error::NotInited),
            _ => Ok(()),
        }
    }
}

/// One CAN controller: lifecycle, filter registry and the transmit path.
///
/// Every method takes `&self`, so a controller can live in a `static` shared between tasks
/// and the peripheral's interrupt handler. State is kept behind a blocking mutex `M`; with
/// `CriticalSectionRawMutex` the interrupt is masked while the registry is read or changed.
///
/// Up to `F` filters can be registered, fewer if the driver reports a smaller filter bank.
pub struct Controller<'a, M: RawMutex, K: Kernel, D: Driver, const F: usize> {
    config: Config,
    inner: Mutex<M, RefCell<Inner<'a, D, F>>>,
    tx_ready: K::Semaphore,
}

impl<'a, M, K, D, const F: usize> Controller<'a, M, K, D, F>
where
    M: RawMutex,
    K: Kernel,
    D: Driver,
{
    pub fn new(config: Config, driver: D) -> Self {
        let registry = FilterRegistry::new(driver.filter_capacity());
        Controller {
            config,
            inner: Mutex::new(RefCell::new(Inner {
                state: State::Uninitialized,
                driver,
                registry,
                tx: TxWaiters { count: 0, epoch: 0 },
                stats: Stats::default(),
            })),
            tx_ready: K::Semaphore::default(),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner<'a, D, F>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> State {
        self.with_inner(|inner| inner.state)
    }

    pub fn stats(&self) -> Stats {
        self.with_inner(|inner| inner.stats)
    }

    pub fn filter_count(&self) -> usize {
        self.with_inner(|inner| inner.registry.len())
    }

    pub fn filter_capacity(&self) -> usize {
        self.with_inner(|inner| inner.registry.capacity())
    }

    /// Number of tasks blocked in [`Controller::send`].
    pub fn pending_senders(&self) -> usize {
        self.with_inner(|inner| inner.tx.count)
    }

    /// Runs `f` on the driver under the controller lock.
    pub fn with_driver<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        self.with_inner(|inner| f(&mut inner.driver))
    }

    pub fn init(&self) -> Result<()> {
        self.with_inner(|inner| {
            if inner.state != State::Uninitialized {
                return Err(Error::AlreadyInited);
            }
            inner.state = State::Initialized;
            Ok(())
        })?;
        info!("{}: initialized", self.config.name);
        Ok(())
    }

    /// Returns to `Uninitialized`, removing every filter.
    ///
    /// Tasks blocked on a filter queue are woken with `Cancelled`. A controller that is still
    /// up is taken down first.
    pub fn deinit(&self) -> Result<()> {
        self.with_inner(|inner| {
            inner.ensure_inited()?;
            if inner.state == State::Up {
                self.go_down(inner);
            }
            inner.registry.clear();
            inner.state = State::Uninitialized;
            Ok(())
        })?;
        info!("{}: deinitialized", self.config.name);
        Ok(())
    }

    pub fn up(&self) -> Result<()> {
        let bitrate = self.config.bitrate;
        let result = self.with_inner(|inner| match inner.state {
            State::Uninitialized => Err(Error::NotInited),
            State::Up => Ok(()),
            State::Initialized | State::Down => match inner.driver.activate(bitrate) {
                Ok(()) => {
                    inner.state = State::Up;
                    Ok(())
                }
                Err(_) => Err(Error::DeviceError),
            },
        });
        match result {
            Ok(()) => info!("{}: up at {} bit/s", self.config.name, bitrate),
            Err(Error::DeviceError) => warn!("{}: driver refused activation", self.config.name),
            Err(_) => {}
        }
        result
    }

    /// Stops bus activity.
    ///
    /// Every task blocked in `send` or `recv` returns `BusDown`, queued messages are discarded.
    /// Registered filters stay in place.
    pub fn down(&self) -> Result<()> {
        self.with_inner(|inner| {
            inner.ensure_up()?;
            self.go_down(inner);
            Ok(())
        })?;
        info!("{}: down", self.config.name);
        Ok(())
    }

    fn go_down(&self, inner: &mut Inner<'a, D, F>) {
        inner.driver.deactivate();
        inner.state = State::Down;
        inner.tx.epoch = inner.tx.epoch.wrapping_add(1);
        for _ in 0..inner.tx.count {
            self.tx_ready.give();
        }
        inner.registry.reset_queues(Error::BusDown);
    }

    pub fn register_filter(&self, filter: Filter, target: DeliveryTarget<'a>) -> Result<FilterId> {
        let id = self.with_inner(|inner| {
            inner.ensure_inited()?;
            inner.registry.register(filter, target)
        });
        match id {
            Ok(id) => debug!(
                "{}: filter {} id {:#x} mask {:#x}",
                self.config.name,
                id.as_raw(),
                filter.id(),
                filter.mask()
            ),
            Err(Error::CapacityExceeded) => warn!("{}: filter bank full", self.config.name),
            Err(_) => {}
        }
        id
    }

    /// Removes a filter. Tasks blocked in `recv` on it return `Cancelled`.
    pub fn deregister_filter(&self, id: FilterId) -> Result<()> {
        self.with_inner(|inner| inner.registry.deregister(id))?;
        debug!("{}: removed filter {}", self.config.name, id.as_raw());
        Ok(())
    }

    /// Attaches, replaces or (with `None`) removes the callback of a filter.
    pub fn set_callback(&self, id: FilterId, callback: Option<&'a dyn Callback>) -> Result<()> {
        self.with_inner(|inner| inner.registry.set_callback(id, callback))
    }

    /// Transmits a frame, blocking for up to `timeout` ticks while all mailboxes are busy.
    ///
    /// A `timeout` of zero tries exactly once and returns `Timeout` if no mailbox is free.
    pub fn send(&self, message: &Message, timeout: Ticks) -> Result<()> {
        let deadline = Deadline::<K>::after(timeout);
        let epoch = self.with_inner(|inner| {
            inner.ensure_up()?;
            inner.tx.count += 1;
            Ok(inner.tx.epoch)
        })?;

        let result = loop {
            let submitted = self.with_inner(|inner| {
                if inner.tx.epoch != epoch {
                    return Some(Err(Error::BusDown));
                }
                match inner.driver.submit_frame(message) {
                    Ok(()) => Some(Ok(())),
                    Err(nb::Error::WouldBlock) => None,
                    Err(nb::Error::Other(_)) => Some(Err(Error::DeviceError)),
                }
            });
            if let Some(result) = submitted {
                break result;
            }
            match deadline.remaining() {
                Some(left) => {
                    self.tx_ready.take(left);
                }
                None => break Err(Error::Timeout),
            }
        };

        self.with_inner(|inner| {
            inner.tx.count -= 1;
            if result.is_ok() {
                inner.stats.tx_frames = inner.stats.tx_frames.wrapping_add(1);
            }
        });
        result
    }

    /// Transmits a frame without blocking. Safe to call from interrupt context.
    pub fn send_isr(&self, message: &Message) -> Result<()> {
        self.with_inner(|inner| inner.submit_isr(message))
    }

    /// Receives the next message from the queue bound to filter `id`.
    ///
    /// Blocks for up to `timeout` ticks; zero polls once. Ends early with `Cancelled` if the
    /// filter is removed and with `BusDown` if the controller goes down.
    pub fn recv(&self, id: FilterId, timeout: Ticks) -> Result<Message> {
        let (queue, ready) = self.with_inner(|inner| {
            inner.ensure_up()?;
            let queue = inner.registry.queue_of(id).ok_or(Error::NotFound)?;
            Ok((queue, queue.begin_wait()))
        })?;
        match ready {
            Ok(message) => Ok(message),
            Err(ticket) => queue.wait(ticket, timeout),
        }
    }

    /// Takes one queued message of filter `id` without blocking.
    pub fn recv_isr(&self, id: FilterId) -> Result<Message> {
        let queue = self.with_inner(|inner| {
            inner.ensure_up()?;
            inner.registry.queue_of(id).ok_or(Error::NotFound)
        })?;
        queue.try_pop().ok_or(Error::WouldBlock)
    }

    /// Dispatches a received frame to every matching filter, in registration order.
    ///
    /// Called by the driver from interrupt context. The whole delivery happens inside one
    /// critical section, so once `down`, `deregister_filter` or `deinit` returns no callback
    /// or queue push of an earlier lookup can still run. Callbacks run without the registry
    /// borrowed and may reply through the [`Bus`] they are given.
    pub fn on_frame_received(&self, message: &Message) {
        self.inner.lock(|cell| {
            let targets = {
                let mut inner = cell.borrow_mut();
                if inner.state != State::Up {
                    return;
                }
                inner.stats.rx_frames = inner.stats.rx_frames.wrapping_add(1);
                let targets = inner.registry.lookup_matches(message);
                if targets.is_empty() {
                    inner.stats.unmatched_frames = inner.stats.unmatched_frames.wrapping_add(1);
                    return;
                }
                targets
            };

            let bus = LockedBus {
                config: &self.config,
                inner: cell,
            };
            let delivery = dispatcher::deliver(&bus, &targets, message);
            trace!(
                "{}: id {:#x} consumed {} queued {} dropped {}",
                self.config.name,
                message.raw_id(),
                delivery.consumed,
                delivery.queued,
                delivery.dropped
            );
            if delivery.dropped > 0 {
                let mut inner = cell.borrow_mut();
                inner.stats.queue_drops = inner.stats.queue_drops.wrapping_add(delivery.dropped);
            }
        })
    }

    /// Wakes one task blocked in [`Controller::send`]. Called by the driver from interrupt
    /// context once a transmit mailbox is free again.
    pub fn on_tx_complete(&self) {
        if self.with_inner(|inner| inner.tx.count > 0) {
            self.tx_ready.give();
        }
    }
}

/// Bus handle for callbacks running inside [`Controller::on_frame_received`], where the
/// controller lock is already held.
struct LockedBus<'c, 'a, D, const F: usize> {
    config: &'c Config,
    inner: &'c RefCell<Inner<'a, D, F>>,
}

impl<'c, 'a, D: Driver, const F: usize> Bus for LockedBus<'c, 'a, D, F> {
    fn index(&self) -> u32 {
        self.config.index
    }

    fn bitrate(&self) -> u32 {
        self.config.bitrate
    }

    fn send_isr(&self, message: &Message) -> Result<()> {
        self.inner.borrow_mut().submit_isr(message)
    }
}

impl<'a, M, K, D, const F: usize> Bus for Controller<'a, M, K, D, F>
where
    M: RawMutex,
    K: Kernel,
    D: Driver,
{
    fn index(&self) -> u32 {
        self.config.index
    }

    fn bitrate(&self) -> u32 {
        self.config.bitrate
    }

    fn send_isr(&self, message: &Message) -> Result<()> {
        Controller::send_isr(self, message)
    }
}

impl<'a, M, K, D, const F: usize> IrqHandler for Controller<'a, M, K, D, F>
where
    M: RawMutex + Sync,
    K: Kernel,
    D: Driver + Send,
{
    fn on_frame_received(&self, message: &Message) {
        Controller::on_frame_received(self, message)
    }

    fn on_tx_complete(&self) {
        Controller::on_tx_complete(self)
    }
}
