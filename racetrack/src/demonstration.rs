//! Watch a monitor hand out turns.
//!
//! Each thread enters the monitor, draws a character, takes the next step number, and reports it
//! before leaving.  Because the report happens inside the monitor, step numbers come out in order
//! no matter how the threads interleave.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use guacamole::combinators::range_to;
use guacamole::Guacamole;
use indicio::{clue, INFO};

use turnstile::Monitored;

use crate::{Error, COLLECTOR, WORKER_PANICKED};

/////////////////////////////////////////////// Step ///////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Step {
    pub thread: usize,
    pub ch: char,
    pub step: u64,
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "thread {}: '{}' (step {})", self.thread, self.ch, self.step)
    }
}

//////////////////////////////////////////// demonstrate ///////////////////////////////////////////

/// Run `threads` threads that each take `chars_per_thread` turns, pausing `pause` between turns.
/// `on_step` sees every step, in step order, while the monitor is held.
pub fn demonstrate<F: Fn(&Step) + Sync>(
    threads: usize,
    chars_per_thread: usize,
    pause: Duration,
    seed: u64,
    on_step: F,
) -> Result<Vec<Step>, Error> {
    if threads == 0 {
        return Err(Error::ZeroThreads);
    }
    let steps = Monitored::new(Vec::with_capacity(threads * chars_per_thread));
    std::thread::scope(|s| -> Result<(), Error> {
        let mut handles = Vec::with_capacity(threads);
        for thread in 0..threads {
            let steps = &steps;
            let on_step = &on_step;
            let handle = std::thread::Builder::new()
                .name(format!("demonstrate-{}", thread))
                .spawn_scoped(s, move || {
                    let mut guac = Guacamole::new(seed.wrapping_add(thread as u64));
                    for _ in 0..chars_per_thread {
                        let ch = char::from(33 + range_to(94u8)(&mut guac));
                        steps.update(|steps| {
                            let step = Step {
                                thread,
                                ch,
                                step: steps.len() as u64,
                            };
                            on_step(&step);
                            steps.push(step);
                        });
                        std::thread::sleep(pause);
                    }
                })?;
            handles.push(handle);
        }
        for (thread, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                WORKER_PANICKED.click();
                return Err(Error::WorkerPanicked { thread });
            }
        }
        Ok(())
    })?;
    let steps = steps.into_inner();
    let count = steps.len() as u64;
    clue!(COLLECTOR, INFO, {
        demonstrated: count,
    });
    Ok(steps)
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn steps_are_ordered_and_complete() {
        let seen = Mutex::new(Vec::new());
        let steps = demonstrate(4, 10, Duration::from_millis(1), 42, |step| {
            seen.lock().unwrap().push(*step);
        })
        .unwrap();
        assert_eq!(40, steps.len());
        for (idx, step) in steps.iter().enumerate() {
            assert_eq!(idx as u64, step.step);
            assert!(('!'..='~').contains(&step.ch));
        }
        for thread in 0..4 {
            assert_eq!(10, steps.iter().filter(|s| s.thread == thread).count());
        }
        assert_eq!(steps, seen.into_inner().unwrap());
    }

    #[test]
    fn zero_threads() {
        assert!(matches!(
            demonstrate(0, 10, Duration::ZERO, 0, |_| {}),
            Err(Error::ZeroThreads)
        ));
    }

    #[test]
    fn display() {
        let step = Step {
            thread: 3,
            ch: '#',
            step: 17,
        };
        assert_eq!("thread 3: '#' (step 17)", step.to_string());
    }
}
