//! A counting semaphore built from a mutex and a condition variable.
//!
//! The semaphore tracks a number of permits.  [Semaphore::acquire] consumes one permit, blocking
//! until one is available, and [Semaphore::release] produces one permit and wakes at most one
//! waiter.  There is no upper bound on the number of permits, so releasing more than was acquired
//! grows the count.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use biometrics::Counter;

use crate::Exclusive;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static ACQUIRE: Counter = Counter::new("turnstile.semaphore.acquire");
static ACQUIRE_WAIT: Counter = Counter::new("turnstile.semaphore.wait");
static ACQUIRE_TIMEOUT: Counter = Counter::new("turnstile.semaphore.timeout");
static RELEASE: Counter = Counter::new("turnstile.semaphore.release");

/// Register the biometrics for the semaphore.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&ACQUIRE);
    collector.register_counter(&ACQUIRE_WAIT);
    collector.register_counter(&ACQUIRE_TIMEOUT);
    collector.register_counter(&RELEASE);
}

///////////////////////////////////////////// Semaphore ////////////////////////////////////////////

/// A counting semaphore.  Safe for any number of concurrent acquirers and releasers.
#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<u64>,
    available: Condvar,
}

impl Semaphore {
    /// Create a new semaphore holding `permits` permits.
    pub const fn new(permits: u64) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Block until a permit is available and take it.
    pub fn acquire(&self) {
        ACQUIRE.click();
        let permits = self.permits.lock().unwrap();
        if *permits == 0 {
            ACQUIRE_WAIT.click();
        }
        let mut permits = self.available.wait_while(permits, |p| *p == 0).unwrap();
        *permits -= 1;
    }

    /// Take a permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock().unwrap();
        if *permits > 0 {
            ACQUIRE.click();
            *permits -= 1;
            true
        } else {
            false
        }
    }

    /// Wait at most `timeout` for a permit.  Returns true iff a permit was taken.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let permits = self.permits.lock().unwrap();
        let (mut permits, _) = self
            .available
            .wait_timeout_while(permits, timeout, |p| *p == 0)
            .unwrap();
        if *permits > 0 {
            ACQUIRE.click();
            *permits -= 1;
            true
        } else {
            ACQUIRE_TIMEOUT.click();
            false
        }
    }

    /// Return one permit and wake at most one waiter.
    pub fn release(&self) {
        RELEASE.click();
        let mut permits = self.permits.lock().unwrap();
        *permits += 1;
        self.available.notify_one();
    }

    /// The number of permits at the instant of the call.
    pub fn available(&self) -> u64 {
        *self.permits.lock().unwrap()
    }
}

impl Exclusive for Semaphore {
    fn enter(&self) {
        self.acquire();
    }

    fn exit(&self) {
        self.release();
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    use super::*;

    #[test]
    fn counts_permits() {
        let sem = Semaphore::new(2);
        assert_eq!(2, sem.available());
        sem.acquire();
        sem.acquire();
        assert_eq!(0, sem.available());
        assert!(!sem.try_acquire());
        sem.release();
        assert!(sem.try_acquire());
    }

    #[test]
    fn no_upper_bound() {
        let sem = Semaphore::new(0);
        for _ in 0..10 {
            sem.release();
        }
        assert_eq!(10, sem.available());
    }

    #[test]
    fn acquire_timeout_expires() {
        let sem = Semaphore::new(0);
        let start = Instant::now();
        assert!(!sem.acquire_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn release_wakes_waiter() {
        let sem = Semaphore::new(0);
        std::thread::scope(|s| {
            let waiter = s.spawn(|| sem.acquire_timeout(Duration::from_secs(10)));
            std::thread::sleep(Duration::from_millis(10));
            sem.release();
            assert!(waiter.join().unwrap());
        });
        assert_eq!(0, sem.available());
    }

    #[test]
    fn never_exceeds_permits() {
        const PERMITS: u64 = 3;
        let sem = Semaphore::new(PERMITS);
        let inside = AtomicU64::new(0);
        let max_inside = AtomicU64::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..200 {
                        sem.acquire();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        sem.release();
                    }
                });
            }
        });
        assert!(max_inside.load(Ordering::SeqCst) <= PERMITS);
        assert_eq!(PERMITS, sem.available());
    }
}
