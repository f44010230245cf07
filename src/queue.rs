use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;

use crate::error::{Error, Result};
use crate::kernel::{Deadline, Kernel, Semaphore, Ticks};
use crate::message::Message;

/// What a full queue does with one more message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OverflowPolicy {
    /// Keep the queued messages, discard the incoming one.
    #[default]
    DropNewest,
    /// Discard the oldest queued message to make room.
    DropOldest,
}

/// Registration of a task waiting on a queue, returned by [`RxSink::begin_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u32);

/// Receiving end of a filter, as seen by the registry and the dispatcher.
///
/// Implemented by [`RxQueue`]. `push` is the interrupt-context producer side, `wait` the
/// task-context consumer side.
pub trait RxSink: Sync {
    /// Enqueues without blocking. Returns `false` if the message was dropped.
    fn push(&self, message: &Message) -> bool;

    fn try_pop(&self) -> Option<Message>;

    /// Pops a message if one is ready, otherwise registers the caller as a waiter.
    ///
    /// Every `Err(ticket)` must be followed by exactly one call to [`RxSink::wait`].
    fn begin_wait(&self) -> core::result::Result<Message, Ticket>;

    /// Blocks until a message arrives, `timeout` elapses, or the queue is reset or closed.
    fn wait(&self, ticket: Ticket, timeout: Ticks) -> Result<Message>;

    /// Accepts messages again after [`RxSink::close`].
    fn attach(&self);

    /// Discards queued messages and wakes every waiter with `reason`.
    fn reset(&self, reason: Error);

    /// Like [`RxSink::reset`], and refuses further messages until re-attached.
    fn close(&self, reason: Error);

    fn overflows(&self) -> u32;
}

struct State<const N: usize> {
    messages: Deque<Message, N>,
    waiters: usize,
    epoch: u32,
    wake_reason: Error,
    attached: bool,
    overflows: u32,
}

/// Bounded FIFO of received messages with blocking, tick-based receive.
///
/// The queue is owned by whoever registers it on a filter; the controller only borrows it.
/// Bind a queue to one filter at a time: removing the filter closes the queue.
pub struct RxQueue<M: RawMutex, K: Kernel, const N: usize> {
    state: Mutex<M, RefCell<State<N>>>,
    ready: K::Semaphore,
    policy: OverflowPolicy,
}

impl<M: RawMutex, K: Kernel, const N: usize> RxQueue<M, K, N> {
    pub fn new() -> Self {
        Self::with_policy(OverflowPolicy::default())
    }

    pub fn with_policy(policy: OverflowPolicy) -> Self {
        RxQueue {
            state: Mutex::new(RefCell::new(State {
                messages: Deque::new(),
                waiters: 0,
                epoch: 0,
                wake_reason: Error::Cancelled,
                attached: false,
                overflows: 0,
            })),
            ready: K::Semaphore::default(),
            policy,
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.state.lock(|cell| cell.borrow().messages.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tasks currently blocked in [`RxSink::wait`].
    pub fn waiting(&self) -> usize {
        self.state.lock(|cell| cell.borrow().waiters)
    }

    /// Bumps the epoch and wakes every registered waiter.
    fn release_waiters(&self, reason: Error, detach: bool) {
        let waiters = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            state.epoch = state.epoch.wrapping_add(1);
            state.wake_reason = reason;
            state.messages.clear();
            if detach {
                state.attached = false;
            }
            state.waiters
        });
        for _ in 0..waiters {
            self.ready.give();
        }
    }
}

impl<M: RawMutex, K: Kernel, const N: usize> Default for RxQueue<M, K, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, K, const N: usize> RxSink for RxQueue<M, K, N>
where
    M: RawMutex + Sync,
    K: Kernel,
{
    fn push(&self, message: &Message) -> bool {
        let (accepted, wake) = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            if !state.attached {
                return (false, false);
            }
            if state.messages.is_full() {
                state.overflows = state.overflows.wrapping_add(1);
                match self.policy {
                    OverflowPolicy::DropNewest => return (false, false),
                    OverflowPolicy::DropOldest => {
                        state.messages.pop_front();
                    }
                }
            }
            let accepted = state.messages.push_back(*message).is_ok();
            (accepted, accepted && state.waiters > 0)
        });
        if !accepted {
            warn!("rx queue dropped id {:#x}", message.raw_id());
        }
        if wake {
            self.ready.give();
        }
        accepted
    }

    fn try_pop(&self) -> Option<Message> {
        self.state.lock(|cell| cell.borrow_mut().messages.pop_front())
    }

    fn begin_wait(&self) -> core::result::Result<Message, Ticket> {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            match state.messages.pop_front() {
                Some(message) => Ok(message),
                None => {
                    state.waiters += 1;
                    Err(Ticket(state.epoch))
                }
            }
        })
    }

    fn wait(&self, ticket: Ticket, timeout: Ticks) -> Result<Message> {
        let deadline = Deadline::<K>::after(timeout);
        loop {
            let woken = match deadline.remaining() {
                Some(left) => self.ready.take(left),
                None => false,
            };
            let outcome = self.state.lock(|cell| {
                let mut state = cell.borrow_mut();
                let outcome = if state.epoch != ticket.0 {
                    Some(Err(state.wake_reason))
                } else if let Some(message) = state.messages.pop_front() {
                    Some(Ok(message))
                } else if !woken {
                    Some(Err(Error::Timeout))
                } else {
                    // another consumer got there first
                    None
                };
                if outcome.is_some() {
                    state.waiters -= 1;
                }
                outcome
            });
            if let Some(outcome) = outcome {
                return outcome;
            }
        }
    }

    fn attach(&self) {
        self.state.lock(|cell| cell.borrow_mut().attached = true);
    }

    fn reset(&self, reason: Error) {
        self.release_waiters(reason, false);
    }

    fn close(&self, reason: Error) {
        self.release_waiters(reason, true);
    }

    fn overflows(&self) -> u32 {
        self.state.lock(|cell| cell.borrow().overflows)
    }
}
