//! A test-and-set spin lock.  Threads busy-wait on a single atomic flag, so there is no queue and
//! no fairness:  any spinning thread may be the next to win.  Use only for short critical sections
//! where blocking would cost more than spinning.

use std::sync::atomic::{AtomicBool, Ordering};

use biometrics::Counter;

use crate::Exclusive;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static LOCK: Counter = Counter::new("turnstile.spin_lock.lock");
static CONTENDED: Counter = Counter::new("turnstile.spin_lock.contended");

/// Register the biometrics for the spin lock.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&LOCK);
    collector.register_counter(&CONTENDED);
}

///////////////////////////////////////////// SpinLock /////////////////////////////////////////////

/// [SpinLock] provides mutual exclusion by spinning on an atomic flag.
#[derive(Debug, Default)]
pub struct SpinLock {
    held: AtomicBool,
}

impl SpinLock {
    /// Create a new, unlocked [SpinLock].
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Spin until the flag goes from clear to set on behalf of this thread.
    pub fn lock(&self) {
        LOCK.click();
        if self.held.swap(true, Ordering::Acquire) {
            CONTENDED.click();
            while self.held.swap(true, Ordering::Acquire) {
                std::hint::spin_loop();
            }
        }
    }

    /// Set the flag iff it is clear.  Returns true iff this thread now holds the lock.
    pub fn try_lock(&self) -> bool {
        !self.held.swap(true, Ordering::Acquire)
    }

    /// Clear the flag.  Must only be called by the holder.
    pub fn unlock(&self) {
        self.held.store(false, Ordering::Release);
    }
}

impl Exclusive for SpinLock {
    fn enter(&self) {
        self.lock();
    }

    fn exit(&self) {
        self.unlock();
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
