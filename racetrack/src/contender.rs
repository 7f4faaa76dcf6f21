use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use biometrics::Counter;
use guacamole::combinators::range_to;
use guacamole::Guacamole;

use turnstile::{Barrier, Exclusive, Monitor, Semaphore, SpinLock, SpinWait};

use crate::RaceBuffer;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static WRITE: Counter = Counter::new("racetrack.contender.write");
static LAP: Counter = Counter::new("racetrack.contender.lap");

pub(crate) fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&WRITE);
    collector.register_counter(&LAP);
}

//////////////////////////////////////////////// Lap ///////////////////////////////////////////////

/// What each thread does on the track.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Lap {
    /// Writes per thread.
    pub iterations: u64,
    /// Sleep this long after each write, before letting go.
    pub work: Duration,
    /// Thread `i` draws its payload from a guacamole seeded with `seed + i`.
    pub seed: u64,
}

impl Lap {
    fn payload(&self, thread_id: usize) -> impl FnMut() -> u8 {
        let mut guac = Guacamole::new(self.seed.wrapping_add(thread_id as u64));
        move || 33 + range_to(94u8)(&mut guac)
    }

    fn work(&self) {
        if !self.work.is_zero() {
            std::thread::sleep(self.work);
        }
    }
}

impl Default for Lap {
    fn default() -> Self {
        Self {
            iterations: 100_000,
            work: Duration::ZERO,
            seed: 0,
        }
    }
}

///////////////////////////////////////////// Contender ////////////////////////////////////////////

/// A primitive on the track.
pub trait Contender: Send + Sync {
    fn name(&self) -> &str;
    /// The exact number of threads this contender must race with, if it cares.
    fn parties(&self) -> Option<usize> {
        None
    }
    /// Run one thread's share of the race.
    fn run(&self, thread_id: usize, buffer: &RaceBuffer, lap: &Lap);
}

////////////////////////////////////////// MutexContender //////////////////////////////////////////

/// The baseline:  [std::sync::Mutex].
#[derive(Debug, Default)]
pub struct MutexContender {
    mutex: Mutex<()>,
}

impl Contender for MutexContender {
    fn name(&self) -> &str {
        "mutex"
    }

    fn run(&self, thread_id: usize, buffer: &RaceBuffer, lap: &Lap) {
        let mut payload = lap.payload(thread_id);
        for _ in 0..lap.iterations {
            let byte = payload();
            let _guard = self.mutex.lock().unwrap();
            WRITE.click();
            // SAFETY:  The mutex excludes every other writer.
            unsafe {
                buffer.write(thread_id, byte);
            }
            lap.work();
        }
    }
}

//////////////////////////////////////// ExclusiveContender ////////////////////////////////////////

/// Any [Exclusive] primitive.
#[derive(Debug)]
pub struct ExclusiveContender<E: Exclusive> {
    name: String,
    exclusive: E,
}

impl<E: Exclusive> ExclusiveContender<E> {
    pub fn new(name: impl Into<String>, exclusive: E) -> Self {
        Self {
            name: name.into(),
            exclusive,
        }
    }
}

impl<E: Exclusive> Contender for ExclusiveContender<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, thread_id: usize, buffer: &RaceBuffer, lap: &Lap) {
        let mut payload = lap.payload(thread_id);
        for _ in 0..lap.iterations {
            let byte = payload();
            let _guard = self.exclusive.guard();
            WRITE.click();
            // SAFETY:  The primitive under test excludes every other writer.
            unsafe {
                buffer.write(thread_id, byte);
            }
            lap.work();
        }
    }
}

///////////////////////////////////////// BarrierContender /////////////////////////////////////////

/// Everyone writes their own slot, then waits for everyone else.
#[derive(Debug)]
pub struct BarrierContender {
    barrier: Barrier,
    laps: Arc<AtomicU64>,
}

impl BarrierContender {
    pub fn new(parties: usize) -> Self {
        let laps = Arc::new(AtomicU64::new(0));
        let laps_p = Arc::clone(&laps);
        let barrier = Barrier::with_completion(parties, move |_| {
            LAP.click();
            laps_p.fetch_add(1, Ordering::Relaxed);
        });
        Self { barrier, laps }
    }

    /// Generations completed so far.
    pub fn laps(&self) -> u64 {
        self.laps.load(Ordering::Relaxed)
    }
}

impl Contender for BarrierContender {
    fn name(&self) -> &str {
        "barrier"
    }

    fn parties(&self) -> Option<usize> {
        Some(self.barrier.parties())
    }

    fn run(&self, thread_id: usize, buffer: &RaceBuffer, lap: &Lap) {
        let mut payload = lap.payload(thread_id);
        let parties = self.barrier.parties() as u64;
        for _ in 0..lap.iterations {
            let byte = payload();
            WRITE.click();
            // SAFETY:  Only this thread writes this slot.
            unsafe {
                buffer.write_slot(thread_id, byte);
            }
            lap.work();
            let arrival = self.barrier.arrive_and_wait();
            // The leader of one generation finishes counting before it arrives at the next, and
            // the next leader cannot emerge until it does.
            if arrival.is_leader {
                // SAFETY:  See above.
                unsafe {
                    buffer.count(parties);
                }
            }
        }
    }
}

//////////////////////////////////////////// the lineup ////////////////////////////////////////////

/// Every primitive, barrier included, for a race with `threads` threads.
pub fn standard_contenders(threads: usize, yield_every: u64) -> Vec<Box<dyn Contender>> {
    vec![
        Box::new(MutexContender::default()),
        Box::new(ExclusiveContender::new("semaphore", Semaphore::new(1))),
        Box::new(BarrierContender::new(threads)),
        Box::new(ExclusiveContender::new("spin_lock", SpinLock::new())),
        Box::new(ExclusiveContender::new(
            "spin_wait",
            SpinWait::with_yield_every(yield_every),
        )),
        Box::new(ExclusiveContender::new("monitor", Monitor::new())),
    ]
}

/// The contenders worth sweeping across thread counts.
pub fn sweep_contenders(yield_every: u64) -> Vec<Box<dyn Contender>> {
    vec![
        Box::new(MutexContender::default()),
        Box::new(ExclusiveContender::new("spin_lock", SpinLock::new())),
        Box::new(ExclusiveContender::new(
            "spin_wait",
            SpinWait::with_yield_every(yield_every),
        )),
    ]
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
