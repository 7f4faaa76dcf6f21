//! A monitor gate in the condition-variable style.
//!
//! A [Monitor] guards a single availability flag with a mutex.  [Monitor::enter] waits on a
//! condition variable until the flag is set and then clears it; [Monitor::exit] sets the flag and
//! wakes one waiter.  This is the same contract as a binary semaphore, written with the
//! wait-on-predicate idiom instead of a permit count.
//!
//! [Monitored] pairs a monitor with the data it protects so that updates can only happen inside
//! the gate.

use std::cell::UnsafeCell;
use std::fmt::{Debug, Formatter};
use std::sync::{Condvar, Mutex};

use biometrics::Counter;

use crate::Exclusive;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static ENTER: Counter = Counter::new("turnstile.monitor.enter");
static ENTER_WAIT: Counter = Counter::new("turnstile.monitor.wait");
static EXIT: Counter = Counter::new("turnstile.monitor.exit");

/// Register the biometrics for the monitor.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&ENTER);
    collector.register_counter(&ENTER_WAIT);
    collector.register_counter(&EXIT);
}

////////////////////////////////////////////// Monitor /////////////////////////////////////////////

/// A single-slot gate.  At most one thread is between `enter` and `exit` at a time.
#[derive(Debug)]
pub struct Monitor {
    available: Mutex<bool>,
    changed: Condvar,
}

impl Monitor {
    /// Create a new, open monitor.
    pub const fn new() -> Self {
        Self {
            available: Mutex::new(true),
            changed: Condvar::new(),
        }
    }

    /// Wait until the gate is open, then close it behind us.
    pub fn enter(&self) {
        ENTER.click();
        let available = self.available.lock().unwrap();
        if !*available {
            ENTER_WAIT.click();
        }
        let mut available = self.changed.wait_while(available, |a| !*a).unwrap();
        *available = false;
    }

    /// Open the gate and wake one waiter.
    pub fn exit(&self) {
        EXIT.click();
        {
            let mut available = self.available.lock().unwrap();
            *available = true;
        }
        self.changed.notify_one();
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Exclusive for Monitor {
    fn enter(&self) {
        Monitor::enter(self);
    }

    fn exit(&self) {
        Monitor::exit(self);
    }
}

///////////////////////////////////////////// Monitored ////////////////////////////////////////////

/// A value that may only be touched while holding its [Monitor].
pub struct Monitored<T> {
    monitor: Monitor,
    data: UnsafeCell<T>,
}

impl<T> Monitored<T> {
    /// Create a new monitored value.
    pub const fn new(t: T) -> Self {
        Self {
            monitor: Monitor::new(),
            data: UnsafeCell::new(t),
        }
    }

    /// Run `f` on the data while holding the monitor, returning what `f` returns.
    pub fn update<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        let _guard = self.monitor.guard();
        // The monitor admits one thread at a time, so this is the only reference.
        let data: &mut T = unsafe { &mut *self.data.get() };
        f(data)
    }

    /// Consume the monitored value and return its data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for Monitored<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Debug for Monitored<T> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(fmt, "Monitored<{}>", std::any::type_name::<T>())
    }
}

unsafe impl<T: Send> Send for Monitored<T> {}
unsafe impl<T: Send> Sync for Monitored<T> {}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
