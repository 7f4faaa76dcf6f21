//! A reusable, cyclic barrier.
//!
//! A [Barrier] is constructed for a fixed number of parties.  Each call to
//! [Barrier::arrive_and_wait] counts one arrival in the current generation.  The arrival that
//! brings the count to zero is the leader:  it runs the optional completion action, resets the
//! count, advances the generation, and wakes everyone else.  Every other arrival waits for the
//! generation to differ from the one it observed on arrival, so a wakeup from a stale generation
//! can never release a thread early and a fast thread re-arriving can never be counted twice.

use std::fmt::{Debug, Formatter};
use std::sync::{Condvar, Mutex};

use biometrics::Counter;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static ARRIVE: Counter = Counter::new("turnstile.barrier.arrive");
static GENERATION: Counter = Counter::new("turnstile.barrier.generation");
static COMPLETION: Counter = Counter::new("turnstile.barrier.completion");

/// Register the biometrics for the barrier.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&ARRIVE);
    collector.register_counter(&GENERATION);
    collector.register_counter(&COMPLETION);
}

////////////////////////////////////////////// Arrival /////////////////////////////////////////////

/// What a thread learns when it passes the barrier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Arrival {
    /// The generation this arrival belonged to.  Generations count from zero.
    pub generation: u64,
    /// True for exactly one arrival per generation:  the one that completed it.
    pub is_leader: bool,
}

/////////////////////////////////////////// BarrierState ///////////////////////////////////////////

#[derive(Debug)]
struct BarrierState {
    remaining: usize,
    generation: u64,
}

////////////////////////////////////////////// Barrier /////////////////////////////////////////////

type Completion = Box<dyn Fn(u64) + Send + Sync>;

/// A cyclic barrier for a fixed number of parties.
pub struct Barrier {
    total: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
    completion: Option<Completion>,
}

impl Barrier {
    /// Create a barrier for `total` parties.  Panics if `total` is zero.
    pub fn new(total: usize) -> Self {
        assert!(total > 0, "a barrier needs at least one party");
        Self {
            total,
            state: Mutex::new(BarrierState {
                remaining: total,
                generation: 0,
            }),
            released: Condvar::new(),
            completion: None,
        }
    }

    /// Create a barrier that calls `completion` with the completed generation exactly once per
    /// generation.  The leader calls it before any other party is released.  The completion must
    /// not call back into the barrier.
    pub fn with_completion<F: Fn(u64) + Send + Sync + 'static>(total: usize, completion: F) -> Self {
        let mut barrier = Self::new(total);
        barrier.completion = Some(Box::new(completion));
        barrier
    }

    /// The number of parties that must arrive to complete a generation.
    pub fn parties(&self) -> usize {
        self.total
    }

    /// The generation currently accepting arrivals.
    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap().generation
    }

    /// Arrive at the barrier and block until all parties of this generation have arrived.
    pub fn arrive_and_wait(&self) -> Arrival {
        ARRIVE.click();
        let mut state = self.state.lock().unwrap();
        let generation = state.generation;
        state.remaining -= 1;
        if state.remaining == 0 {
            if let Some(completion) = &self.completion {
                COMPLETION.click();
                completion(generation);
            }
            GENERATION.click();
            state.remaining = self.total;
            state.generation += 1;
            self.released.notify_all();
            Arrival {
                generation,
                is_leader: true,
            }
        } else {
            let _state = self
                .released
                .wait_while(state, |s| s.generation == generation)
                .unwrap();
            Arrival {
                generation,
                is_leader: false,
            }
        }
    }
}

impl Debug for Barrier {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.debug_struct("Barrier")
            .field("total", &self.total)
            .field("state", &self.state)
            .field("completion", &self.completion.is_some())
            .finish()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn single_party_never_blocks() {
        let barrier = Barrier::new(1);
        for generation in 0..10 {
            let arrival = barrier.arrive_and_wait();
            assert_eq!(generation, arrival.generation);
            assert!(arrival.is_leader);
        }
        assert_eq!(10, barrier.generation());
    }

    #[test]
    #[should_panic]
    fn zero_parties() {
        Barrier::new(0);
    }

    #[test]
    fn nobody_passes_early() {
        const PARTIES: usize = 5;
        let barrier = Barrier::new(PARTIES);
        let arrived = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..PARTIES {
                s.spawn(|| {
                    arrived.fetch_add(1, Ordering::SeqCst);
                    barrier.arrive_and_wait();
                    assert_eq!(PARTIES, arrived.load(Ordering::SeqCst));
                });
            }
        });
    }

    #[test]
    fn one_leader_per_generation() {
        const PARTIES: usize = 4;
        const GENERATIONS: u64 = 100;
        let barrier = Barrier::new(PARTIES);
        let leaders = AtomicU64::new(0);
        std::thread::scope(|s| {
            for _ in 0..PARTIES {
                s.spawn(|| {
                    for generation in 0..GENERATIONS {
                        let arrival = barrier.arrive_and_wait();
                        assert_eq!(generation, arrival.generation);
                        if arrival.is_leader {
                            leaders.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });
        assert_eq!(GENERATIONS, leaders.load(Ordering::SeqCst));
        assert_eq!(GENERATIONS, barrier.generation());
    }

    #[test]
    fn completion_runs_before_release() {
        const PARTIES: usize = 3;
        const GENERATIONS: u64 = 50;
        let completed = Arc::new(AtomicU64::new(0));
        let completed_p = Arc::clone(&completed);
        let barrier = Barrier::with_completion(PARTIES, move |generation| {
            assert_eq!(generation, completed_p.fetch_add(1, Ordering::SeqCst));
        });
        std::thread::scope(|s| {
            for _ in 0..PARTIES {
                s.spawn(|| {
                    for generation in 0..GENERATIONS {
                        barrier.arrive_and_wait();
                        assert!(completed.load(Ordering::SeqCst) > generation);
                    }
                });
            }
        });
        assert_eq!(GENERATIONS, completed.load(Ordering::SeqCst));
    }
}
