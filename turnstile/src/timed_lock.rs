//! A binary lock that supports acquisition with a timeout, and an all-or-nothing way to take two
//! of them.
//!
//! [TimedLock] is the fork of the dining philosophers:  a plain lock that can also be tried for a
//! bounded amount of time.  [acquire_both] takes two distinct timed locks without ever holding
//! one while blocking on the other, so callers that name the same pair in opposite orders cannot
//! deadlock against each other.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use biometrics::Counter;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static ACQUIRE: Counter = Counter::new("turnstile.timed_lock.acquire");
static TIMEOUT: Counter = Counter::new("turnstile.timed_lock.timeout");
static BOTH: Counter = Counter::new("turnstile.timed_lock.both");
static BOTH_BACKOFF: Counter = Counter::new("turnstile.timed_lock.both_backoff");

/// Register the biometrics for the timed lock.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&ACQUIRE);
    collector.register_counter(&TIMEOUT);
    collector.register_counter(&BOTH);
    collector.register_counter(&BOTH_BACKOFF);
}

///////////////////////////////////////////// TimedLock ////////////////////////////////////////////

/// A lock with blocking, immediate, and timed acquisition.
#[derive(Debug, Default)]
pub struct TimedLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl TimedLock {
    /// Create a new, free lock.
    pub const fn new() -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    /// Block until the lock is free and take it.
    pub fn acquire(&self) {
        ACQUIRE.click();
        let held = self.held.lock().unwrap();
        let mut held = self.released.wait_while(held, |h| *h).unwrap();
        *held = true;
    }

    /// Take the lock iff it is free right now.
    pub fn try_acquire_now(&self) -> bool {
        let mut held = self.held.lock().unwrap();
        if *held {
            false
        } else {
            ACQUIRE.click();
            *held = true;
            true
        }
    }

    /// Wait at most `timeout` for the lock.  Returns true iff the lock was taken.
    pub fn try_acquire(&self, timeout: Duration) -> bool {
        let held = self.held.lock().unwrap();
        let (mut held, _) = self
            .released
            .wait_timeout_while(held, timeout, |h| *h)
            .unwrap();
        if *held {
            TIMEOUT.click();
            false
        } else {
            ACQUIRE.click();
            *held = true;
            true
        }
    }

    /// Release the lock and wake one waiter.  Must only be called by the holder.
    pub fn release(&self) {
        {
            let mut held = self.held.lock().unwrap();
            *held = false;
        }
        self.released.notify_one();
    }

    /// True iff someone holds the lock at the instant of the call.
    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap()
    }
}

/////////////////////////////////////////// acquire_both ///////////////////////////////////////////

/// Take both `first` and `second` or neither.
///
/// Blocks on one lock, then only tries the other.  When the try fails it lets go and blocks on
/// the lock that was busy, so the caller never waits while holding anything.  Panics if both
/// arguments are the same lock.
pub fn acquire_both(first: &TimedLock, second: &TimedLock) {
    assert!(
        !std::ptr::eq(first, second),
        "acquire_both requires two distinct locks"
    );
    BOTH.click();
    let (mut a, mut b) = (first, second);
    loop {
        a.acquire();
        if b.try_acquire_now() {
            return;
        }
        a.release();
        BOTH_BACKOFF.click();
        std::thread::yield_now();
        std::mem::swap(&mut a, &mut b);
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn acquire_release() {
        let lock = TimedLock::new();
        assert!(!lock.is_held());
        lock.acquire();
        assert!(lock.is_held());
        assert!(!lock.try_acquire_now());
        lock.release();
        assert!(lock.try_acquire_now());
        lock.release();
    }

    #[test]
    fn try_acquire_times_out() {
        let lock = TimedLock::new();
        lock.acquire();
        let start = Instant::now();
        assert!(!lock.try_acquire(Duration::from_millis(25)));
        assert!(start.elapsed() >= Duration::from_millis(25));
        lock.release();
        assert!(lock.try_acquire(Duration::from_millis(25)));
    }

    #[test]
    fn try_acquire_sees_release() {
        let lock = TimedLock::new();
        lock.acquire();
        std::thread::scope(|s| {
            let waiter = s.spawn(|| lock.try_acquire(Duration::from_secs(10)));
            std::thread::sleep(Duration::from_millis(10));
            lock.release();
            assert!(waiter.join().unwrap());
        });
        assert!(lock.is_held());
    }

    #[test]
    #[should_panic]
    fn acquire_both_same_lock() {
        let lock = TimedLock::new();
        acquire_both(&lock, &lock);
    }

    #[test]
    fn acquire_both_opposite_orders() {
        let x = TimedLock::new();
        let y = TimedLock::new();
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..10_000 {
                    acquire_both(&x, &y);
                    y.release();
                    x.release();
                }
            });
            s.spawn(|| {
                for _ in 0..10_000 {
                    acquire_both(&y, &x);
                    x.release();
                    y.release();
                }
            });
        });
        assert!(!x.is_held());
        assert!(!y.is_held());
    }
}
