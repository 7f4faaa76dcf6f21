#![doc = include_str!("../README.md")]

pub mod barrier;
pub mod monitor;
pub mod semaphore;
pub mod spin_lock;
pub mod spin_wait;
pub mod timed_lock;

pub use barrier::{Arrival, Barrier};
pub use monitor::{Monitor, Monitored};
pub use semaphore::Semaphore;
pub use spin_lock::SpinLock;
pub use spin_wait::SpinWait;
pub use timed_lock::{acquire_both, TimedLock};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

/// Register the biometrics of every primitive in this crate.
pub fn register_biometrics(collector: &biometrics::Collector) {
    barrier::register_biometrics(collector);
    monitor::register_biometrics(collector);
    semaphore::register_biometrics(collector);
    spin_lock::register_biometrics(collector);
    spin_wait::register_biometrics(collector);
    timed_lock::register_biometrics(collector);
}

///////////////////////////////////////////// Exclusive ////////////////////////////////////////////

/// A primitive that admits at most one thread between [Exclusive::enter] and [Exclusive::exit].
///
/// Callers must pair every `enter` with exactly one `exit` on the same thread.  Prefer
/// [Exclusive::guard], which does the pairing on drop.
pub trait Exclusive: Send + Sync {
    /// Block or spin until this thread holds the primitive.
    fn enter(&self);
    /// Give up the primitive so that another thread may enter.
    fn exit(&self);

    /// Enter and return a guard that exits when dropped.
    fn guard(&self) -> ExclusiveGuard<'_, Self>
    where
        Self: Sized,
    {
        self.enter();
        ExclusiveGuard { exclusive: self }
    }
}

impl<E: Exclusive> Exclusive for std::sync::Arc<E> {
    fn enter(&self) {
        E::enter(self)
    }

    fn exit(&self) {
        E::exit(self)
    }
}

/////////////////////////////////////////// ExclusiveGuard /////////////////////////////////////////

/// Holds an [Exclusive] primitive until dropped.
pub struct ExclusiveGuard<'a, E: Exclusive> {
    exclusive: &'a E,
}

impl<E: Exclusive> Drop for ExclusiveGuard<'_, E> {
    fn drop(&mut self) {
        self.exclusive.exit();
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
