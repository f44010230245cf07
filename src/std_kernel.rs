//! Hosted kernel port: ticks are milliseconds, tasks are threads.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use crate::kernel::{Kernel, Semaphore, Ticks, MAX_DELAY};

pub const TICK_RATE_HZ: u32 = 1000;

pub struct StdKernel;

impl Kernel for StdKernel {
    type Semaphore = StdSemaphore;

    fn now() -> Ticks {
        static START: OnceLock<Instant> = OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_millis() as Ticks
    }
}

pub fn ticks_to_duration(ticks: Ticks) -> Duration {
    Duration::from_millis(ticks as u64 * 1000 / TICK_RATE_HZ as u64)
}

#[derive(Default)]
struct State {
    count: usize,
    waiters: VecDeque<u64>,
    next_ticket: u64,
}

/// Counting semaphore that hands units to waiters in arrival order.
#[derive(Default)]
pub struct StdSemaphore {
    state: Mutex<State>,
    cond: Condvar,
}

impl StdSemaphore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn available(&self) -> usize {
        self.lock().count
    }
}

impl Semaphore for StdSemaphore {
    fn take(&self, timeout: Ticks) -> bool {
        let mut state = self.lock();
        if state.count > 0 && state.waiters.is_empty() {
            state.count -= 1;
            return true;
        }
        if timeout == 0 {
            return false;
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back(ticket);

        let deadline = (timeout != MAX_DELAY).then(|| Instant::now() + ticks_to_duration(timeout));
        loop {
            if state.count > 0 && state.waiters.front() == Some(&ticket) {
                state.waiters.pop_front();
                state.count -= 1;
                // the next waiter in line may be able to proceed as well
                self.cond.notify_all();
                return true;
            }

            match deadline {
                None => {
                    state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.waiters.retain(|t| *t != ticket);
                        self.cond.notify_all();
                        return false;
                    }
                    state = self
                        .cond
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    fn give(&self) {
        let mut state = self.lock();
        state.count += 1;
        self.cond.notify_all();
    }
}
