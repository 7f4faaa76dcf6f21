use std::sync::Arc;
use std::time::Duration;

use biometrics::Counter;
use guacamole::combinators::uniform;
use guacamole::Guacamole;
use indicio::{clue, INFO};

use turnstile::{acquire_both, Exclusive};

use crate::{State, Strategy, Table, TableOptions, COLLECTOR};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static THINK: Counter = Counter::new("symposium.philosopher.think");
static HUNGRY: Counter = Counter::new("symposium.philosopher.hungry");
static EAT: Counter = Counter::new("symposium.philosopher.eat");
static FORK_TIMEOUT: Counter = Counter::new("symposium.philosopher.fork_timeout");
static BACKOFF: Counter = Counter::new("symposium.philosopher.backoff");
static WENT_HUNGRY: Counter = Counter::new("symposium.philosopher.went_hungry");
static LEFT_TABLE: Counter = Counter::new("symposium.philosopher.left_table");

pub(crate) fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&THINK);
    collector.register_counter(&HUNGRY);
    collector.register_counter(&EAT);
    collector.register_counter(&FORK_TIMEOUT);
    collector.register_counter(&BACKOFF);
    collector.register_counter(&WENT_HUNGRY);
    collector.register_counter(&LEFT_TABLE);
}

////////////////////////////////////////////// Timing //////////////////////////////////////////////

/// How long philosophers think and eat, and how patient they are with forks.  All ranges are
/// inclusive milliseconds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Timing {
    pub think_ms: (u64, u64),
    pub eat_ms: (u64, u64),
    pub fork_timeout: Duration,
    pub backoff: Duration,
    pub max_attempts: u64,
}

impl From<&TableOptions> for Timing {
    fn from(options: &TableOptions) -> Self {
        Self {
            think_ms: (options.think_min_ms, options.think_max_ms),
            eat_ms: (options.eat_min_ms, options.eat_max_ms),
            fork_timeout: Duration::from_millis(options.fork_timeout_ms),
            backoff: Duration::from_millis(options.backoff_ms),
            max_attempts: options.max_attempts,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::from(&TableOptions::default())
    }
}

//////////////////////////////////////////// Philosopher ///////////////////////////////////////////

/// One diner.  Runs on its own thread until the table stops.
pub struct Philosopher {
    id: usize,
    table: Arc<Table>,
    timing: Timing,
    guac: Guacamole,
    verbose: bool,
}

impl Philosopher {
    pub fn new(id: usize, table: Arc<Table>, timing: Timing, seed: u64) -> Self {
        assert!(id < table.philosophers());
        Self {
            id,
            table,
            timing,
            guac: Guacamole::new(seed),
            verbose: false,
        }
    }

    /// Log every state transition.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Think, get hungry, and try to eat until the table stops.
    pub fn dine(mut self, strategy: Strategy) {
        while !self.table.is_stopped() {
            self.think();
            if self.table.is_stopped() {
                break;
            }
            self.transition(State::Hungry);
            HUNGRY.click();
            match strategy {
                Strategy::Naive => self.naive(),
                Strategy::DualLock => self.dual_lock(),
                Strategy::TimedBackoff => self.timed_backoff(),
                Strategy::SingleTable => self.single_table(),
                Strategy::Ordered => self.ordered(),
                Strategy::Admission => self.admission(),
            }
        }
        LEFT_TABLE.click();
        let philosopher = self.id as u64;
        let meals = self.table.meals()[self.id];
        clue!(COLLECTOR, INFO, {
            left_table: philosopher,
            meals: meals,
        });
    }

    fn transition(&self, state: State) {
        self.table.set_state(self.id, state);
        if self.verbose {
            let philosopher = self.id as u64;
            clue!(COLLECTOR, INFO, {
                philosopher: philosopher,
                state: state.name(),
            });
        }
    }

    // Inclusive of both ends, except that u64::MAX is never drawn from a wider range.
    fn draw_ms(&mut self, (min, max): (u64, u64)) -> u64 {
        uniform(min, max.saturating_add(1))(&mut self.guac)
    }

    fn pause(&mut self, range: (u64, u64)) {
        let ms = self.draw_ms(range);
        std::thread::sleep(Duration::from_millis(ms));
    }

    fn think(&mut self) {
        THINK.click();
        self.transition(State::Thinking);
        self.pause(self.timing.think_ms);
    }

    // Both forks must be held by the caller.
    fn eat(&mut self) {
        EAT.click();
        self.table.start_eating();
        self.transition(State::Eating);
        self.pause(self.timing.eat_ms);
        self.table.finish_eating(self.id);
        self.transition(State::Thinking);
    }

    fn naive(&mut self) {
        let table = Arc::clone(&self.table);
        let (left, right) = (table.left_fork(self.id), table.right_fork(self.id));
        left.acquire();
        if let Some(rendezvous) = table.rendezvous() {
            rendezvous.arrive_and_wait();
        }
        right.acquire();
        self.eat();
        right.release();
        left.release();
    }

    fn dual_lock(&mut self) {
        let table = Arc::clone(&self.table);
        let (left, right) = (table.left_fork(self.id), table.right_fork(self.id));
        acquire_both(left, right);
        self.eat();
        right.release();
        left.release();
    }

    fn timed_backoff(&mut self) {
        let table = Arc::clone(&self.table);
        let (left, right) = (table.left_fork(self.id), table.right_fork(self.id));
        for attempt in 0..self.timing.max_attempts {
            if attempt > 0 {
                if table.is_stopped() {
                    break;
                }
                BACKOFF.click();
                std::thread::sleep(self.timing.backoff);
            }
            if !left.try_acquire(self.timing.fork_timeout) {
                FORK_TIMEOUT.click();
                continue;
            }
            if !right.try_acquire(self.timing.fork_timeout) {
                FORK_TIMEOUT.click();
                left.release();
                continue;
            }
            self.eat();
            right.release();
            left.release();
            return;
        }
        WENT_HUNGRY.click();
        table.went_hungry(self.id);
        self.transition(State::Thinking);
        let philosopher = self.id as u64;
        let attempts = self.timing.max_attempts;
        clue!(COLLECTOR, INFO, {
            went_hungry: philosopher,
            attempts: attempts,
        });
    }

    fn single_table(&mut self) {
        let table = Arc::clone(&self.table);
        let (left, right) = (table.left_fork(self.id), table.right_fork(self.id));
        let _seat = table.seating().guard();
        left.acquire();
        right.acquire();
        self.eat();
        right.release();
        left.release();
    }

    fn ordered(&mut self) {
        let table = Arc::clone(&self.table);
        let (left, right) = (table.left_fork(self.id), table.right_fork(self.id));
        let (first, second) = if self.id % 2 == 0 {
            (left, right)
        } else {
            (right, left)
        };
        first.acquire();
        second.acquire();
        self.eat();
        second.release();
        first.release();
    }

    fn admission(&mut self) {
        let table = Arc::clone(&self.table);
        if !table.admit() {
            return;
        }
        let (left, right) = (table.left_fork(self.id), table.right_fork(self.id));
        acquire_both(left, right);
        self.eat();
        right.release();
        left.release();
        table.dismiss();
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> Timing {
        Timing {
            think_ms: (0, 1),
            eat_ms: (0, 1),
            fork_timeout: Duration::from_millis(1),
            backoff: Duration::from_millis(1),
            max_attempts: 2,
        }
    }

    #[test]
    fn timing_from_options() {
        let timing = Timing::default();
        assert_eq!((100, 500), timing.think_ms);
        assert_eq!((200, 400), timing.eat_ms);
        assert_eq!(Duration::from_millis(100), timing.fork_timeout);
        assert_eq!(3, timing.max_attempts);
    }

    #[test]
    fn stopped_table_means_no_meals() {
        let table = Arc::new(Table::new(2, 1));
        table.stop();
        Philosopher::new(0, Arc::clone(&table), quick(), 1).dine(Strategy::Ordered);
        assert_eq!(vec![0, 0], table.meals());
    }

    #[test]
    fn timed_backoff_goes_hungry_when_forks_are_taken() {
        let table = Arc::new(Table::new(2, 1));
        table.left_fork(0).acquire();
        let mut philosopher = Philosopher::new(0, Arc::clone(&table), quick(), 1);
        philosopher.timed_backoff();
        table.left_fork(0).release();
        assert_eq!(vec![1, 0], table.hungry());
        assert_eq!(vec![0, 0], table.meals());
        assert!(!table.left_fork(0).is_held());
        assert!(!table.right_fork(0).is_held());
    }

    #[test]
    fn timed_backoff_releases_left_when_right_is_taken() {
        let table = Arc::new(Table::new(3, 1));
        table.right_fork(0).acquire();
        let mut philosopher = Philosopher::new(0, Arc::clone(&table), quick(), 1);
        philosopher.timed_backoff();
        assert!(!table.left_fork(0).is_held());
        table.right_fork(0).release();
        assert_eq!(1, table.hungry()[0]);
    }

    #[test]
    fn draws_stay_in_range() {
        let table = Arc::new(Table::new(2, 1));
        let mut philosopher = Philosopher::new(0, table, quick(), 3);
        for _ in 0..1_000 {
            let ms = philosopher.draw_ms((2, 4));
            assert!((2..=4).contains(&ms), "{}", ms);
        }
        assert_eq!(7, philosopher.draw_ms((7, 7)));
        assert_eq!(u64::MAX, philosopher.draw_ms((u64::MAX, u64::MAX)));
        assert!(philosopher.draw_ms((u64::MAX - 1, u64::MAX)) >= u64::MAX - 1);
    }

    #[test]
    fn eating_publishes_each_state_once() {
        let table = Arc::new(Table::new(2, 1));
        let mut philosopher = Philosopher::new(1, Arc::clone(&table), quick(), 5);
        philosopher.transition(State::Hungry);
        assert_eq!(State::Hungry, table.state(1));
        philosopher.eat();
        assert_eq!(State::Thinking, table.state(1));
        assert_eq!(vec![0, 1], table.meals());
        assert_eq!(1, table.most_eating());
    }

    #[test]
    fn every_strategy_eats_alone() {
        for strategy in Strategy::ALL {
            let table = Arc::new(Table::new(2, 1));
            let mut philosopher = Philosopher::new(1, Arc::clone(&table), quick(), 7);
            match strategy {
                Strategy::Naive => philosopher.naive(),
                Strategy::DualLock => philosopher.dual_lock(),
                Strategy::TimedBackoff => philosopher.timed_backoff(),
                Strategy::SingleTable => philosopher.single_table(),
                Strategy::Ordered => philosopher.ordered(),
                Strategy::Admission => philosopher.admission(),
            }
            assert_eq!(vec![0, 1], table.meals(), "{}", strategy);
            assert!(!table.left_fork(1).is_held());
            assert!(!table.right_fork(1).is_held());
            assert_eq!(1, table.seating().available());
        }
    }
}
