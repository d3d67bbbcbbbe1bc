//! Worker lifecycle primitive shared by the receiver and carrier workers.
//!
//! A worker is a long-running task with a cooperative stop signal and a
//! completion signal. Control blocks live in a static pool so they can be
//! handed to tasks as `&'static` references on both std and embedded targets.
//! `request_stop` is idempotent and non-blocking; `await_completion` returns
//! true iff the worker's loop observably exited within the bound. A false
//! return means "unknown state, proceed with caution" and never propagates
//! as an error: the control slot is leaked instead of being reused, since the
//! worker may still touch its signals.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use log::{log, Level};

pub(crate) const WORKER_CONTROL_POOL_SIZE: usize = 32;

/// Signals owned by one worker instance: cooperative stop, completion, and
/// a bring-up result for workers whose startup can fail.
pub(crate) struct WorkerControl {
    stop: Signal<CriticalSectionRawMutex, ()>,
    done: Signal<CriticalSectionRawMutex, ()>,
    ready: Signal<CriticalSectionRawMutex, bool>,
}

impl WorkerControl {
    const fn new() -> Self {
        WorkerControl {
            stop: Signal::new(),
            done: Signal::new(),
            ready: Signal::new(),
        }
    }

    pub(crate) fn request_stop(&self) {
        self.stop.signal(());
    }

    /// Resolves once a stop has been requested.
    pub(crate) async fn stopped(&self) {
        self.stop.wait().await;
    }

    /// Non-consuming check, for polling between atomic units of work.
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.signaled()
    }

    /// Called by the worker itself as the last step of its loop.
    pub(crate) fn notify_done(&self) {
        self.done.signal(());
    }

    /// Reports whether the worker's startup sequence succeeded. A worker
    /// that signals false must exit right after.
    pub(crate) fn notify_ready(&self, success: bool) {
        self.ready.signal(success);
    }

    /// Resolves with the worker's bring-up result.
    pub(crate) async fn ready(&self) -> bool {
        self.ready.wait().await
    }
}

struct PoolSlot {
    control: WorkerControl,
    claimed: AtomicBool,
}

impl PoolSlot {
    const fn new() -> Self {
        PoolSlot {
            control: WorkerControl::new(),
            claimed: AtomicBool::new(false),
        }
    }
}

static CONTROL_POOL: [PoolSlot; WORKER_CONTROL_POOL_SIZE] = [const { PoolSlot::new() }; WORKER_CONTROL_POOL_SIZE];

/// Claims a fresh control block, with both signals cleared.
pub(crate) fn acquire_control() -> Option<WorkerHandle> {
    for slot in CONTROL_POOL.iter() {
        if slot
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            slot.control.stop.reset();
            slot.control.done.reset();
            slot.control.ready.reset();
            return Some(WorkerHandle { slot });
        }
    }
    log!(Level::Error, "Worker control pool exhausted");
    None
}

/// Exclusive handle to an active worker, held by the arbiter and replaced
/// (never mutated) on restart.
pub(crate) struct WorkerHandle {
    slot: &'static PoolSlot,
}

impl WorkerHandle {
    /// The control block to hand to the worker task at spawn time.
    pub(crate) fn control(&self) -> &'static WorkerControl {
        &self.slot.control
    }

    pub(crate) fn request_stop(&self) {
        self.slot.control.request_stop();
    }

    /// Waits for the worker's completion signal. On success the control slot
    /// returns to the pool; on timeout it is leaked because the worker may
    /// still be running.
    pub(crate) async fn await_completion(self, timeout: Duration) -> bool {
        match with_timeout(timeout, self.slot.control.done.wait()).await {
            Ok(()) => {
                self.slot.claimed.store(false, Ordering::Release);
                true
            }
            Err(_) => {
                log!(Level::Warn, "Worker did not acknowledge stop within the bound; control slot leaked");
                false
            }
        }
    }

    /// Returns the slot without waiting. Only valid when the worker task was
    /// never spawned.
    pub(crate) fn release(self) {
        self.slot.claimed.store(false, Ordering::Release);
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn acquire_claims_distinct_slots() {
        let first = acquire_control().unwrap();
        let second = acquire_control().unwrap();
        assert!(!core::ptr::eq(first.control(), second.control()));
        first.release();
        second.release();
    }

    #[test]
    fn release_returns_slot_to_pool() {
        let handle = acquire_control().unwrap();
        let control = handle.control() as *const WorkerControl;
        handle.release();
        // The pool is shared between tests, so the same slot is not
        // guaranteed back; claiming and releasing again must still succeed.
        let handle = acquire_control().unwrap();
        let _ = control;
        handle.release();
    }

    #[test]
    fn request_stop_is_idempotent() {
        let handle = acquire_control().unwrap();
        handle.request_stop();
        handle.request_stop();
        block_on(handle.control().stopped());
        assert!(!handle.control().stop_requested());
        handle.release();
    }

    #[test]
    fn ready_carries_the_bring_up_result() {
        let handle = acquire_control().unwrap();
        handle.control().notify_ready(false);
        assert!(!block_on(handle.control().ready()));
        handle.control().notify_ready(true);
        assert!(block_on(handle.control().ready()));
        handle.release();
    }

    #[test]
    fn await_completion_true_once_done_is_signaled() {
        let handle = acquire_control().unwrap();
        handle.control().notify_done();
        assert!(block_on(handle.await_completion(Duration::from_secs(1))));
    }

    #[test]
    fn await_completion_false_after_timeout() {
        let handle = acquire_control().unwrap();
        // Never signal done: the bound elapses and the slot is leaked.
        assert!(!block_on(handle.await_completion(Duration::from_millis(50))));
    }
}
