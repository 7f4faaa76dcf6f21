//! A spin lock that periodically yields the processor.
//!
//! [SpinWait] has the same contract as [crate::SpinLock], but after every `yield_every` failed
//! attempts it calls [std::thread::yield_now] to give the scheduler a chance to run the holder.
//! This trades acquisition latency for throughput when there are more spinners than cores.

use std::sync::atomic::{AtomicBool, Ordering};

use biometrics::Counter;

use crate::Exclusive;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static LOCK: Counter = Counter::new("turnstile.spin_wait.lock");
static YIELD: Counter = Counter::new("turnstile.spin_wait.yield");

/// Register the biometrics for the spin wait.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&LOCK);
    collector.register_counter(&YIELD);
}

///////////////////////////////////////////// Constants ////////////////////////////////////////////

/// Yield after this many failed attempts unless told otherwise.
pub const DEFAULT_YIELD_EVERY: u64 = 100;

///////////////////////////////////////////// SpinWait /////////////////////////////////////////////

/// Busy-wait mutual exclusion with periodic yields.
#[derive(Debug)]
pub struct SpinWait {
    held: AtomicBool,
    yield_every: u64,
}

impl SpinWait {
    /// Create a new, unlocked [SpinWait] that yields every [DEFAULT_YIELD_EVERY] failures.
    pub const fn new() -> Self {
        Self::with_yield_every(DEFAULT_YIELD_EVERY)
    }

    /// Create a new, unlocked [SpinWait] that yields every `yield_every` failures.  Zero is
    /// treated as one.
    pub const fn with_yield_every(yield_every: u64) -> Self {
        let yield_every = if yield_every == 0 { 1 } else { yield_every };
        Self {
            held: AtomicBool::new(false),
            yield_every,
        }
    }

    /// How many failed attempts happen between yields.
    pub fn yield_every(&self) -> u64 {
        self.yield_every
    }

    /// Spin, yielding periodically, until this thread holds the lock.
    pub fn lock(&self) {
        LOCK.click();
        let mut failures = 0u64;
        while self
            .held
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            failures += 1;
            if failures % self.yield_every == 0 {
                YIELD.click();
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Take the lock iff it is free right now.
    pub fn try_lock(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock.  Must only be called by the holder.
    pub fn unlock(&self) {
        self.held.store(false, Ordering::Release);
    }
}

impl Default for SpinWait {
    fn default() -> Self {
        Self::new()
    }
}

impl Exclusive for SpinWait {
    fn enter(&self) {
        self.lock();
    }

    fn exit(&self) {
        self.unlock();
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
