mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use canctl::{Bus, DeliveryTarget, Error, Filter, IrqHandler, Message, RxSink, MAX_DELAY};
use common::*;

fn wait_until(mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < Duration::from_secs(5), "condition never became true");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn blocked_recv_wakes_on_dispatch() {
    let queue = TestQueue::<4>::new();
    let can = up_controller();
    let id = can
        .register_filter(Filter::from_id(std_id(0x100)), DeliveryTarget::queue(&queue))
        .unwrap();

    thread::scope(|s| {
        let receiver = s.spawn(|| can.recv(id, MAX_DELAY));
        wait_until(|| queue.waiting() == 1);

        can.on_frame_received(&message(0x100, &[0x01, 0x02]));
        assert_eq!(receiver.join().unwrap(), Ok(message(0x100, &[0x01, 0x02])));
    });
    assert_eq!(queue.waiting(), 0);
}

#[test]
fn recv_times_out() {
    let queue = TestQueue::<4>::new();
    let can = up_controller();
    let id = can
        .register_filter(Filter::from_id(std_id(0x100)), DeliveryTarget::queue(&queue))
        .unwrap();

    let start = Instant::now();
    assert_eq!(can.recv(id, 25).err(), Some(Error::Timeout));
    assert!(start.elapsed() >= Duration::from_millis(25));
    assert_eq!(queue.waiting(), 0);
}

#[test]
fn deregister_cancels_blocked_recv() {
    let queue = TestQueue::<4>::new();
    let can = up_controller();
    let id = can
        .register_filter(Filter::from_id(std_id(0x100)), DeliveryTarget::queue(&queue))
        .unwrap();

    thread::scope(|s| {
        let receiver = s.spawn(|| can.recv(id, MAX_DELAY));
        wait_until(|| queue.waiting() == 1);

        can.deregister_filter(id).unwrap();
        assert_eq!(receiver.join().unwrap(), Err(Error::Cancelled));
    });
    assert_eq!(can.filter_count(), 0);
}

#[test]
fn down_releases_blocked_senders_and_receivers() {
    let queue = TestQueue::<4>::new();
    let can = up_controller();
    let id = can
        .register_filter(Filter::accept_all(false), DeliveryTarget::queue(&queue))
        .unwrap();
    can.with_driver(|d| d.free_mailboxes = 0);

    thread::scope(|s| {
        let receiver = s.spawn(|| can.recv(id, MAX_DELAY));
        let sender = s.spawn(|| can.send(&message(0x10, &[1]), MAX_DELAY));
        wait_until(|| queue.waiting() == 1 && can.pending_senders() == 1);

        can.down().unwrap();
        assert_eq!(receiver.join().unwrap(), Err(Error::BusDown));
        assert_eq!(sender.join().unwrap(), Err(Error::BusDown));
    });
    assert_eq!(queue.waiting(), 0);
    assert_eq!(can.pending_senders(), 0);
    assert_eq!(can.filter_count(), 1);
}

#[test]
fn tx_complete_resumes_blocked_send() {
    let can = up_controller();
    can.with_driver(|d| d.free_mailboxes = 0);

    thread::scope(|s| {
        let sender = s.spawn(|| can.send(&message(0x10, &[5]), MAX_DELAY));
        wait_until(|| can.pending_senders() == 1);

        can.with_driver(|d| d.free_mailboxes = 1);
        let irq: &dyn IrqHandler = &can;
        irq.on_tx_complete();
        assert_eq!(sender.join().unwrap(), Ok(()));
    });
    assert_eq!(can.with_driver(|d| d.sent.clone()), vec![message(0x10, &[5])]);
}

#[test]
fn waiters_are_served_first_come_first_served() {
    let queue = TestQueue::<4>::new();
    let can = up_controller();
    let id = can
        .register_filter(Filter::accept_all(false), DeliveryTarget::queue(&queue))
        .unwrap();

    thread::scope(|s| {
        let first = s.spawn(|| can.recv(id, MAX_DELAY));
        wait_until(|| queue.waiting() == 1);
        // let the first receiver reach the semaphore before the second one queues up
        thread::sleep(Duration::from_millis(20));
        let second = s.spawn(|| can.recv(id, MAX_DELAY));
        wait_until(|| queue.waiting() == 2);
        thread::sleep(Duration::from_millis(20));

        can.on_frame_received(&message(0x1, &[1]));
        wait_until(|| queue.waiting() == 1);
        can.on_frame_received(&message(0x1, &[2]));

        assert_eq!(first.join().unwrap(), Ok(message(0x1, &[1])));
        assert_eq!(second.join().unwrap(), Ok(message(0x1, &[2])));
    });
}

#[test]
fn deinit_cancels_blocked_recv() {
    let queue = TestQueue::<4>::new();
    let can = up_controller();
    let id = can
        .register_filter(Filter::accept_all(false), DeliveryTarget::queue(&queue))
        .unwrap();

    thread::scope(|s| {
        let receiver = s.spawn(|| can.recv(id, MAX_DELAY));
        wait_until(|| queue.waiting() == 1);

        can.deinit().unwrap();
        assert_eq!(receiver.join().unwrap(), Err(Error::Cancelled));
    });
}

#[test]
fn interrupt_context_dispatch_from_another_thread() {
    let queue = TestQueue::<16>::new();
    let can = up_controller();
    let id = can
        .register_filter(Filter::from_mask(std_id(0x300), 0x700), DeliveryTarget::queue(&queue))
        .unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            let irq: &dyn IrqHandler = &can;
            for n in 0..10u8 {
                irq.on_frame_received(&message(0x300 + n as u16, &[n]));
                thread::sleep(Duration::from_millis(1));
            }
        });
        for n in 0..10u8 {
            let out = can.recv(id, 1000).unwrap();
            assert_eq!(out, message(0x300 + n as u16, &[n]));
        }
    });
}

/// Callback that flags its start, then holds the dispatch for a while.
fn slow_callback(entered: &AtomicBool) -> impl Fn(&dyn Bus, &Message) -> bool + Sync + '_ {
    move |_: &dyn Bus, _: &Message| {
        entered.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        false
    }
}

#[test]
fn down_during_dispatch_leaves_queues_empty() {
    let entered = AtomicBool::new(false);
    let slow = slow_callback(&entered);
    let queue = TestQueue::<4>::new();
    let can = up_controller();
    can.register_filter(Filter::from_id(std_id(0x55)), DeliveryTarget::callback(&slow))
        .unwrap();
    let id = can
        .register_filter(Filter::from_id(std_id(0x55)), DeliveryTarget::queue(&queue))
        .unwrap();

    thread::scope(|s| {
        s.spawn(|| can.on_frame_received(&message(0x55, &[0xAA])));
        wait_until(|| entered.load(Ordering::SeqCst));

        can.down().unwrap();
        assert!(queue.is_empty());
    });

    // the frame matched before down must not show up after the next up
    can.up().unwrap();
    assert_eq!(can.recv(id, 0).err(), Some(Error::Timeout));
}

#[test]
fn no_callback_runs_after_deregister_returns() {
    let entered = AtomicBool::new(false);
    let removed = AtomicBool::new(false);
    let late = AtomicBool::new(false);
    let calls = AtomicUsize::new(0);
    let slow = slow_callback(&entered);
    let watch = |_: &dyn Bus, _: &Message| {
        calls.fetch_add(1, Ordering::SeqCst);
        if removed.load(Ordering::SeqCst) {
            late.store(true, Ordering::SeqCst);
        }
        true
    };
    let can = up_controller();
    can.register_filter(Filter::from_id(std_id(0x55)), DeliveryTarget::callback(&slow))
        .unwrap();
    let watched = can
        .register_filter(Filter::from_id(std_id(0x55)), DeliveryTarget::callback(&watch))
        .unwrap();

    thread::scope(|s| {
        s.spawn(|| can.on_frame_received(&message(0x55, &[1])));
        wait_until(|| entered.load(Ordering::SeqCst));

        can.deregister_filter(watched).unwrap();
        removed.store(true, Ordering::SeqCst);
    });

    assert!(!late.load(Ordering::SeqCst));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn deinit_during_dispatch_leaves_queue_detached() {
    let entered = AtomicBool::new(false);
    let slow = slow_callback(&entered);
    let queue = TestQueue::<4>::new();
    let can = up_controller();
    can.register_filter(Filter::accept_all(false), DeliveryTarget::both(&slow, &queue))
        .unwrap();

    thread::scope(|s| {
        s.spawn(|| can.on_frame_received(&message(0x55, &[2])));
        wait_until(|| entered.load(Ordering::SeqCst));

        can.deinit().unwrap();
        assert!(queue.is_empty());
    });

    assert!(!queue.push(&message(0x55, &[3])));
    assert_eq!(can.filter_count(), 0);
}
