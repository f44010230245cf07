//! Scheduler primitives the blocking calls are built on.
//!
//! The controller never blocks on anything but a [`Semaphore`] obtained through a [`Kernel`].
//! An RTOS port maps these onto its own counting semaphore and tick counter; hosted builds use
//! [`crate::std_kernel::StdKernel`].

use core::marker::PhantomData;

/// Scheduler time unit for blocking-call deadlines.
pub type Ticks = u32;

/// Wait without a deadline.
pub const MAX_DELAY: Ticks = Ticks::MAX;

/// Counting semaphore.
pub trait Semaphore: Sync {
    /// Takes one unit, blocking the calling task for at most `timeout` ticks.
    ///
    /// Returns `false` if the timeout elapsed first. `MAX_DELAY` blocks indefinitely.
    fn take(&self, timeout: Ticks) -> bool;

    /// Releases one unit and wakes the longest waiting task, if any.
    ///
    /// Must be callable from interrupt context.
    fn give(&self);
}

pub trait Kernel {
    type Semaphore: Semaphore + Default;

    /// Current tick count. Wraps around.
    fn now() -> Ticks;
}

/// Remaining budget of a blocking call.
pub(crate) struct Deadline<K> {
    start: Ticks,
    timeout: Ticks,
    _kernel: PhantomData<K>,
}

impl<K: Kernel> Deadline<K> {
    pub fn after(timeout: Ticks) -> Self {
        Deadline {
            start: K::now(),
            timeout,
            _kernel: PhantomData,
        }
    }

    /// Ticks left, or `None` once the deadline has passed.
    pub fn remaining(&self) -> Option<Ticks> {
        if self.timeout == MAX_DELAY {
            return Some(MAX_DELAY);
        }
        let elapsed = K::now().wrapping_sub(self.start);
        if elapsed >= self.timeout {
            None
        } else {
            Some(self.timeout - elapsed)
        }
    }
}
