//! Decide whether a set of threads came home or got stuck.
//!
//! Threads blocked in circular wait never observe a stop flag, so the only way to tell a slow
//! philosopher from a deadlocked one is to give them a bounded grace period and look at who is
//! still running when it expires.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use biometrics::Counter;
use indicio::{clue, ERROR};

use crate::COLLECTOR;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static POLL: Counter = Counter::new("symposium.watchdog.poll");
static DEADLOCK: Counter = Counter::new("symposium.watchdog.deadlock");

pub(crate) fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&POLL);
    collector.register_counter(&DEADLOCK);
}

////////////////////////////////////////////// Verdict /////////////////////////////////////////////

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// Every thread finished within the grace period.
    Finished,
    /// These threads, by index, were still running when the grace period expired.
    Deadlocked { stuck: Vec<usize> },
}

impl Verdict {
    pub fn is_deadlocked(&self) -> bool {
        matches!(self, Verdict::Deadlocked { .. })
    }
}

///////////////////////////////////////////// Watchdog /////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Watchdog {
    grace: Duration,
    poll: Duration,
}

impl Watchdog {
    /// A watchdog that checks every `poll` for at most `grace`.  A zero poll is raised to one
    /// millisecond.
    pub fn new(grace: Duration, poll: Duration) -> Self {
        let poll = std::cmp::max(poll, Duration::from_millis(1));
        Self { grace, poll }
    }

    /// Wait for every handle to finish, or for the grace period to expire.  Never joins.
    pub fn await_termination<T>(&self, handles: &[JoinHandle<T>]) -> Verdict {
        let start = Instant::now();
        loop {
            POLL.click();
            let stuck: Vec<usize> = handles
                .iter()
                .enumerate()
                .filter(|(_, h)| !h.is_finished())
                .map(|(idx, _)| idx)
                .collect();
            if stuck.is_empty() {
                return Verdict::Finished;
            }
            let elapsed = start.elapsed();
            if elapsed >= self.grace {
                DEADLOCK.click();
                let stuck_count = stuck.len() as u64;
                let grace_ms = self.grace.as_millis() as u64;
                clue!(COLLECTOR, ERROR, {
                    deadlock: stuck_count,
                    grace_ms: grace_ms,
                });
                return Verdict::Deadlocked { stuck };
            }
            std::thread::sleep(std::cmp::min(self.poll, self.grace - elapsed));
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn finished_threads() {
        let handles: Vec<_> = (0..4).map(|x| std::thread::spawn(move || x)).collect();
        let watchdog = Watchdog::new(Duration::from_secs(5), Duration::from_millis(5));
        assert_eq!(Verdict::Finished, watchdog.await_termination(&handles));
        let sum: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(6, sum);
    }

    #[test]
    fn stuck_threads() {
        let release = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();
        for idx in 0..3 {
            let release = Arc::clone(&release);
            handles.push(std::thread::spawn(move || {
                while idx != 1 && !release.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }));
        }
        let watchdog = Watchdog::new(Duration::from_millis(100), Duration::from_millis(10));
        let verdict = watchdog.await_termination(&handles);
        release.store(true, Ordering::Relaxed);
        assert_eq!(Verdict::Deadlocked { stuck: vec![0, 2] }, verdict);
        assert!(verdict.is_deadlocked());
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
