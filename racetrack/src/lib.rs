#![doc = include_str!("../README.md")]

use std::fmt::{Display, Formatter};
use std::time::Duration;

use arrrg_derive::CommandLine;
use biometrics::{Counter, Moments};
use indicio::{clue, INFO};
use utilz::stopwatch::Stopwatch;

mod buffer;
mod contender;
mod demonstration;

pub use buffer::{RaceBuffer, Slot};
pub use contender::{
    standard_contenders, sweep_contenders, BarrierContender, Contender, ExclusiveContender, Lap,
    MutexContender,
};
pub use demonstration::{demonstrate, Step};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static IO_ERROR: Counter = Counter::new("racetrack.error.io");
static WORKER_PANICKED: Counter = Counter::new("racetrack.error.worker_panicked");
static RACE: Counter = Counter::new("racetrack.race");
static RACE_SECONDS: Moments = Moments::new("racetrack.race.seconds");
static THREAD_SECONDS: Moments = Moments::new("racetrack.race.thread_seconds");

/// Register the biometrics for racetrack and the primitives it races.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&IO_ERROR);
    collector.register_counter(&WORKER_PANICKED);
    collector.register_counter(&RACE);
    collector.register_moments(&RACE_SECONDS);
    collector.register_moments(&THREAD_SECONDS);
    contender::register_biometrics(collector);
    turnstile::register_biometrics(collector);
}

////////////////////////////////////////////// indicio /////////////////////////////////////////////

pub static COLLECTOR: indicio::Collector = indicio::Collector::new();

///////////////////////////////////////////// Constants ////////////////////////////////////////////

/// Thread counts visited by a sweep.
pub const SWEEP_THREADS: [usize; 5] = [2, 4, 8, 16, 32];

/////////////////////////////////////////////// Error //////////////////////////////////////////////

#[derive(Debug)]
pub enum Error {
    ZeroThreads,
    PartiesMismatch { parties: usize, threads: usize },
    WorkerPanicked { thread: usize },
    Io(std::io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::ZeroThreads => write!(f, "a race needs at least one thread"),
            Error::PartiesMismatch { parties, threads } => write!(
                f,
                "contender waits for {} parties but the race has {} threads",
                parties, threads
            ),
            Error::WorkerPanicked { thread } => write!(f, "thread {} panicked", thread),
            Error::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        IO_ERROR.click();
        Self::Io(err)
    }
}

//////////////////////////////////////////// RaceOptions ///////////////////////////////////////////

#[derive(Clone, CommandLine, Debug, Eq, PartialEq)]
pub struct RaceOptions {
    #[arrrg(optional, "Threads on the track.", "N")]
    pub threads: usize,
    #[arrrg(optional, "Writes per thread.", "N")]
    pub iterations: u64,
    #[arrrg(optional, "Microseconds of simulated work per write.", "US")]
    pub work_us: u64,
    #[arrrg(optional, "Failed attempts between yields for the spin wait.", "N")]
    pub yield_every: u64,
    #[arrrg(optional, "Guacamole seed for the payload.", "SEED")]
    pub seed: u64,
    #[arrrg(flag, "Race mutex, spin lock, and spin wait at 2, 4, 8, 16, and 32 threads.")]
    pub sweep: bool,
    #[arrrg(flag, "Show the monitor handing out turns.")]
    pub demonstrate: bool,
    #[arrrg(flag, "Log each race as it finishes.")]
    pub verbose: bool,
    #[arrrg(optional, "Write biometrics to this file when done.", "PATH")]
    pub metrics: Option<String>,
}

impl RaceOptions {
    pub fn lap(&self) -> Lap {
        Lap {
            iterations: self.iterations,
            work: Duration::from_micros(self.work_us),
            seed: self.seed,
        }
    }
}

impl Default for RaceOptions {
    fn default() -> Self {
        Self {
            threads: 5,
            iterations: 100_000,
            work_us: 0,
            yield_every: turnstile::spin_wait::DEFAULT_YIELD_EVERY,
            seed: 0,
            sweep: false,
            demonstrate: false,
            verbose: false,
            metrics: None,
        }
    }
}

//////////////////////////////////////////// RaceResult ////////////////////////////////////////////

/// The timings and final state of one race.
#[derive(Clone, Debug, PartialEq)]
pub struct RaceResult {
    pub contender: String,
    pub threads: usize,
    pub iterations: u64,
    /// Wall-clock seconds from the first spawn to the last join.
    pub seconds: f64,
    /// Wall-clock seconds each thread spent on the track.
    pub thread_seconds: Vec<f64>,
    pub total_writes: u64,
    pub slots: Vec<Slot>,
}

impl RaceResult {
    /// The writes a correct primitive must account for.
    pub fn expected_writes(&self) -> u64 {
        self.threads as u64 * self.iterations
    }

    pub fn slowest_thread(&self) -> f64 {
        self.thread_seconds.iter().copied().fold(0.0, f64::max)
    }

    pub fn fastest_thread(&self) -> f64 {
        self.thread_seconds
            .iter()
            .copied()
            .reduce(f64::min)
            .unwrap_or(0.0)
    }
}

impl Display for RaceResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "{:<10} {:>3} threads {:>12.3} ms  (threads {:.3}..{:.3} ms)  writes {}/{}",
            self.contender,
            self.threads,
            self.seconds * 1_000.0,
            self.fastest_thread() * 1_000.0,
            self.slowest_thread() * 1_000.0,
            self.total_writes,
            self.expected_writes()
        )
    }
}

/////////////////////////////////////////////// race ///////////////////////////////////////////////

/// Race `threads` threads through `contender` and time them.
pub fn race(contender: &dyn Contender, threads: usize, lap: &Lap) -> Result<RaceResult, Error> {
    RACE.click();
    if threads == 0 {
        return Err(Error::ZeroThreads);
    }
    if let Some(parties) = contender.parties() {
        if parties != threads {
            return Err(Error::PartiesMismatch { parties, threads });
        }
    }
    let mut buffer = RaceBuffer::new(threads);
    let stopwatch = Stopwatch::default();
    let thread_seconds = std::thread::scope(|s| -> Result<Vec<f64>, Error> {
        let mut handles = Vec::with_capacity(threads);
        for thread_id in 0..threads {
            let buffer = &buffer;
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", contender.name(), thread_id))
                .spawn_scoped(s, move || {
                    let stopwatch = Stopwatch::default();
                    contender.run(thread_id, buffer, lap);
                    stopwatch.since()
                })?;
            handles.push(handle);
        }
        let mut thread_seconds = Vec::with_capacity(threads);
        for (thread, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(seconds) => {
                    THREAD_SECONDS.add(seconds);
                    thread_seconds.push(seconds);
                }
                Err(_) => {
                    WORKER_PANICKED.click();
                    return Err(Error::WorkerPanicked { thread });
                }
            }
        }
        Ok(thread_seconds)
    })?;
    let seconds = stopwatch.since();
    RACE_SECONDS.add(seconds);
    let result = RaceResult {
        contender: contender.name().to_string(),
        threads,
        iterations: lap.iterations,
        seconds,
        thread_seconds,
        total_writes: buffer.total_writes(),
        slots: buffer.snapshot(),
    };
    let contender_name = result.contender.clone();
    let threads = threads as u64;
    clue!(COLLECTOR, INFO, {
        contender: contender_name,
        threads: threads,
        seconds: seconds,
    });
    Ok(result)
}

/// Race every standard contender at the configured thread count.
pub fn compare(options: &RaceOptions) -> Result<Vec<RaceResult>, Error> {
    // The barrier contender is built with one party per thread.
    if options.threads == 0 {
        return Err(Error::ZeroThreads);
    }
    let lap = options.lap();
    let mut results = Vec::new();
    for contender in standard_contenders(options.threads, options.yield_every) {
        results.push(race(contender.as_ref(), options.threads, &lap)?);
    }
    Ok(results)
}

/// Race the sweep contenders at every thread count in [SWEEP_THREADS].
pub fn sweep(options: &RaceOptions) -> Result<Vec<RaceResult>, Error> {
    let lap = options.lap();
    let mut results = Vec::new();
    for threads in SWEEP_THREADS {
        for contender in sweep_contenders(options.yield_every) {
            results.push(race(contender.as_ref(), threads, &lap)?);
        }
    }
    Ok(results)
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
