#![doc = include_str!("../README.md")]

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use arrrg_derive::CommandLine;
use biometrics::Counter;

mod harness;
mod philosopher;
mod table;
mod watchdog;

pub use harness::{run, run_all, Report};
pub use philosopher::{Philosopher, Timing};
pub use table::Table;
pub use watchdog::{Verdict, Watchdog};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static IO_ERROR: Counter = Counter::new("symposium.error.io");
static INVALID_OPTIONS: Counter = Counter::new("symposium.error.invalid_options");
static WORKER_PANICKED: Counter = Counter::new("symposium.error.worker_panicked");

/// Register the biometrics for symposium and the primitives it sits on.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&IO_ERROR);
    collector.register_counter(&INVALID_OPTIONS);
    collector.register_counter(&WORKER_PANICKED);
    harness::register_biometrics(collector);
    philosopher::register_biometrics(collector);
    table::register_biometrics(collector);
    watchdog::register_biometrics(collector);
    turnstile::register_biometrics(collector);
}

////////////////////////////////////////////// indicio /////////////////////////////////////////////

pub static COLLECTOR: indicio::Collector = indicio::Collector::new();

/////////////////////////////////////////////// Error //////////////////////////////////////////////

#[derive(Debug)]
pub enum Error {
    TooFewPhilosophers { philosophers: usize },
    InvalidMaxEating { max_eating: usize, philosophers: usize },
    EmptyRange { what: &'static str, min: u64, max: u64 },
    NoAttempts,
    UnknownStrategy { what: String },
    WorkerPanicked { philosopher: usize },
    Io(std::io::Error),
}

impl Error {
    fn invalid(self) -> Self {
        INVALID_OPTIONS.click();
        self
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::TooFewPhilosophers { philosophers } => {
                write!(f, "need at least two philosophers; got {}", philosophers)
            }
            Error::InvalidMaxEating {
                max_eating,
                philosophers,
            } => write!(
                f,
                "max-eating must be in [1, {}); got {}",
                philosophers, max_eating
            ),
            Error::EmptyRange { what, min, max } => {
                write!(f, "{} range is empty: min={} > max={}", what, min, max)
            }
            Error::NoAttempts => write!(f, "timed-backoff needs at least one attempt"),
            Error::UnknownStrategy { what } => write!(f, "unknown strategy {:?}", what),
            Error::WorkerPanicked { philosopher } => {
                write!(f, "philosopher {} panicked", philosopher)
            }
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

///////////////////////////////////////////// Strategy /////////////////////////////////////////////

/// How a hungry philosopher goes about taking its forks.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Strategy {
    /// Left, then right.  Deadlock-prone.
    Naive,
    /// Both forks at once, all or nothing.
    DualLock,
    /// Each fork with a timeout; retry a bounded number of times, then go hungry.
    TimedBackoff,
    /// One philosopher at the table at a time.
    SingleTable,
    /// Even philosophers take left first; odd philosophers take right first.
    #[default]
    Ordered,
    /// A bounded number of philosophers may reach for forks at once.
    Admission,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::Naive,
        Strategy::DualLock,
        Strategy::TimedBackoff,
        Strategy::SingleTable,
        Strategy::Ordered,
        Strategy::Admission,
    ];

    /// The strategy's number, counting from one.
    pub fn number(&self) -> usize {
        match self {
            Strategy::Naive => 1,
            Strategy::DualLock => 2,
            Strategy::TimedBackoff => 3,
            Strategy::SingleTable => 4,
            Strategy::Ordered => 5,
            Strategy::Admission => 6,
        }
    }

    /// The name used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Naive => "naive",
            Strategy::DualLock => "dual-lock",
            Strategy::TimedBackoff => "timed-backoff",
            Strategy::SingleTable => "single-table",
            Strategy::Ordered => "ordered",
            Strategy::Admission => "admission",
        }
    }

    /// A one-line description, suitable for a legend.
    pub fn describe(&self) -> &'static str {
        match self {
            Strategy::Naive => "left fork then right fork; risks deadlock",
            Strategy::DualLock => "both forks at once; safe with good throughput",
            Strategy::TimedBackoff => "forks with timeouts and retries; may go hungry",
            Strategy::SingleTable => "one philosopher at the table; safe but serial",
            Strategy::Ordered => "even left-first, odd right-first; simple and safe",
            Strategy::Admission => "bounded number of eaters; tunable load",
        }
    }

    /// True iff the strategy can never leave the table in circular wait.
    pub fn is_deadlock_free(&self) -> bool {
        !matches!(self, Strategy::Naive)
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for strategy in Strategy::ALL {
            if s == strategy.name() || s == strategy.number().to_string() {
                return Ok(strategy);
            }
        }
        Err(Error::UnknownStrategy {
            what: s.to_string(),
        }
        .invalid())
    }
}

/////////////////////////////////////////////// State //////////////////////////////////////////////

/// Where a philosopher is in its cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum State {
    #[default]
    Thinking,
    Hungry,
    Eating,
}

impl State {
    fn as_u8(self) -> u8 {
        match self {
            State::Thinking => 0,
            State::Hungry => 1,
            State::Eating => 2,
        }
    }

    fn from_u8(x: u8) -> Self {
        match x {
            1 => State::Hungry,
            2 => State::Eating,
            _ => State::Thinking,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            State::Thinking => "thinking",
            State::Hungry => "hungry",
            State::Eating => "eating",
        }
    }
}

/////////////////////////////////////////// TableOptions ///////////////////////////////////////////

/// Everything needed to set a table and run it.
#[derive(Clone, CommandLine, Debug, Eq, PartialEq)]
pub struct TableOptions {
    #[arrrg(optional, "Number of philosophers (and forks) at the table.", "N")]
    pub philosophers: usize,
    #[arrrg(optional, "Fork strategy:  a name or a number from 1 to 6.", "STRATEGY")]
    pub strategy: Strategy,
    #[arrrg(optional, "Milliseconds to let the philosophers dine.", "MS")]
    pub duration_ms: u64,
    #[arrrg(optional, "Most philosophers reaching for forks at once (admission only).", "N")]
    pub max_eating: usize,
    #[arrrg(optional, "Shortest think in milliseconds.", "MS")]
    pub think_min_ms: u64,
    #[arrrg(optional, "Longest think in milliseconds.", "MS")]
    pub think_max_ms: u64,
    #[arrrg(optional, "Shortest meal in milliseconds.", "MS")]
    pub eat_min_ms: u64,
    #[arrrg(optional, "Longest meal in milliseconds.", "MS")]
    pub eat_max_ms: u64,
    #[arrrg(optional, "Milliseconds to wait for each fork (timed-backoff only).", "MS")]
    pub fork_timeout_ms: u64,
    #[arrrg(optional, "Milliseconds to back off between attempts (timed-backoff only).", "MS")]
    pub backoff_ms: u64,
    #[arrrg(optional, "Attempts per hunger before going hungry (timed-backoff only).", "N")]
    pub max_attempts: u64,
    #[arrrg(optional, "Milliseconds to wait for philosophers to stop before calling deadlock.", "MS")]
    pub grace_ms: u64,
    #[arrrg(optional, "Milliseconds between watchdog checks.", "MS")]
    pub poll_ms: u64,
    #[arrrg(optional, "Guacamole seed; zero picks one from the clock.", "SEED")]
    pub seed: u64,
    #[arrrg(flag, "Make the naive strategy deadlock every time.")]
    pub force_deadlock: bool,
    #[arrrg(flag, "Log every state transition.")]
    pub verbose: bool,
    #[arrrg(optional, "Write biometrics to this file after the run.", "PATH")]
    pub metrics: Option<String>,
}

impl TableOptions {
    /// A copy of these options with a different strategy.
    pub fn with_strategy(&self, strategy: Strategy) -> Self {
        Self {
            strategy,
            ..self.clone()
        }
    }

    /// Check the options for the configured strategy.
    pub fn validate(&self) -> Result<(), Error> {
        if self.philosophers < 2 {
            return Err(Error::TooFewPhilosophers {
                philosophers: self.philosophers,
            }
            .invalid());
        }
        if self.strategy == Strategy::Admission
            && (self.max_eating == 0 || self.max_eating >= self.philosophers)
        {
            return Err(Error::InvalidMaxEating {
                max_eating: self.max_eating,
                philosophers: self.philosophers,
            }
            .invalid());
        }
        for (what, min, max) in [
            ("think", self.think_min_ms, self.think_max_ms),
            ("eat", self.eat_min_ms, self.eat_max_ms),
        ] {
            if min > max {
                return Err(Error::EmptyRange { what, min, max }.invalid());
            }
        }
        if self.strategy == Strategy::TimedBackoff && self.max_attempts == 0 {
            return Err(Error::NoAttempts.invalid());
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    /// The configured seed, or one drawn from the clock when the configured seed is zero.
    pub fn seed(&self) -> u64 {
        if self.seed != 0 {
            return self.seed;
        }
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            philosophers: 5,
            strategy: Strategy::default(),
            duration_ms: 5_000,
            max_eating: 2,
            think_min_ms: 100,
            think_max_ms: 500,
            eat_min_ms: 200,
            eat_max_ms: 400,
            fork_timeout_ms: 100,
            backoff_ms: 100,
            max_attempts: 3,
            grace_ms: 2_000,
            poll_ms: 100,
            seed: 0,
            force_deadlock: false,
            verbose: false,
            metrics: None,
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_from_str() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy, strategy.name().parse::<Strategy>().unwrap());
            assert_eq!(
                strategy,
                strategy.number().to_string().parse::<Strategy>().unwrap()
            );
            assert_eq!(strategy.name(), strategy.to_string());
        }
        assert!("7".parse::<Strategy>().is_err());
        assert!("polite".parse::<Strategy>().is_err());
    }

    #[test]
    fn strategies_are_numbered_in_order() {
        for (idx, strategy) in Strategy::ALL.iter().enumerate() {
            assert_eq!(idx + 1, strategy.number());
        }
        assert!(!Strategy::Naive.is_deadlock_free());
        assert!(Strategy::Ordered.is_deadlock_free());
    }

    #[test]
    fn state_round_trip() {
        for state in [State::Thinking, State::Hungry, State::Eating] {
            assert_eq!(state, State::from_u8(state.as_u8()));
        }
    }

    #[test]
    fn defaults_validate() {
        for strategy in Strategy::ALL {
            TableOptions::default()
                .with_strategy(strategy)
                .validate()
                .unwrap();
        }
    }

    #[test]
    fn validate_rejects() {
        let options = TableOptions {
            philosophers: 1,
            ..TableOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(Error::TooFewPhilosophers { philosophers: 1 })
        ));
        let options = TableOptions {
            strategy: Strategy::Admission,
            max_eating: 5,
            ..TableOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(Error::InvalidMaxEating { .. })
        ));
        // max-eating is irrelevant to the other strategies.
        let options = TableOptions {
            max_eating: 5,
            ..TableOptions::default()
        };
        assert!(options.validate().is_ok());
        let options = TableOptions {
            eat_min_ms: 10,
            eat_max_ms: 5,
            ..TableOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(Error::EmptyRange { what: "eat", .. })
        ));
        let options = TableOptions {
            strategy: Strategy::TimedBackoff,
            max_attempts: 0,
            ..TableOptions::default()
        };
        assert!(matches!(options.validate(), Err(Error::NoAttempts)));
    }

    #[test]
    fn seed_is_never_zero_when_configured() {
        let options = TableOptions {
            seed: 42,
            ..TableOptions::default()
        };
        assert_eq!(42, options.seed());
    }
}
