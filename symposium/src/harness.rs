use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use biometrics::Counter;
use indicio::{clue, INFO};

use crate::{
    Error, Philosopher, Strategy, Table, TableOptions, Timing, Verdict, Watchdog, COLLECTOR,
    WORKER_PANICKED,
};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static RUN: Counter = Counter::new("symposium.harness.run");
static RUN_DEADLOCKED: Counter = Counter::new("symposium.harness.run_deadlocked");

pub(crate) fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&RUN);
    collector.register_counter(&RUN_DEADLOCKED);
}

////////////////////////////////////////////// Report //////////////////////////////////////////////

/// What happened at the table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Report {
    pub strategy: Strategy,
    pub meals: Vec<u64>,
    pub hungry: Vec<u64>,
    pub most_eating: u64,
    /// The admission cap and the most philosophers ever admitted, for the admission strategy.
    pub admission: Option<(usize, usize)>,
    /// Philosophers still running when the watchdog gave up on them.
    pub stuck: Vec<usize>,
    pub elapsed: Duration,
}

impl Report {
    pub fn philosophers(&self) -> usize {
        self.meals.len()
    }

    pub fn deadlocked(&self) -> bool {
        !self.stuck.is_empty()
    }

    pub fn total_meals(&self) -> u64 {
        self.meals.iter().sum()
    }

    /// Meals per philosopher, on average.
    pub fn mean_meals(&self) -> f64 {
        if self.meals.is_empty() {
            return 0.0;
        }
        self.total_meals() as f64 / self.meals.len() as f64
    }

    pub fn total_hungry(&self) -> u64 {
        self.hungry.iter().sum()
    }

    /// True iff everyone ate and every count is within `tolerance` of the mean, where tolerance
    /// is a fraction of the mean.
    pub fn is_balanced(&self, tolerance: f64) -> bool {
        let mean = self.mean_meals();
        if mean <= 0.0 {
            return false;
        }
        self.meals
            .iter()
            .all(|m| (*m as f64 - mean).abs() <= tolerance * mean)
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(
            f,
            "strategy {} ({}): {} philosophers for {:?}",
            self.strategy.number(),
            self.strategy,
            self.philosophers(),
            self.elapsed
        )?;
        for (id, meals) in self.meals.iter().enumerate() {
            write!(f, "  philosopher {}: {} meals", id, meals)?;
            if self.hungry[id] > 0 {
                write!(f, ", went hungry {} times", self.hungry[id])?;
            }
            writeln!(f)?;
        }
        writeln!(
            f,
            "  total meals: {} (average {:.1})",
            self.total_meals(),
            self.mean_meals()
        )?;
        writeln!(f, "  most eating at once: {}", self.most_eating)?;
        if let Some((max_eating, most_admitted)) = self.admission {
            writeln!(f, "  admitted at once: {} of {}", most_admitted, max_eating)?;
        }
        if self.deadlocked() {
            write!(f, "  DEADLOCK: philosophers {:?} never left the table", self.stuck)?;
        } else {
            write!(f, "  every philosopher left the table")?;
        }
        Ok(())
    }
}

//////////////////////////////////////////////// run ///////////////////////////////////////////////

/// Seat the philosophers, let them dine for the configured duration, and report.
///
/// A deadlocked run is not an error:  the report names the stuck philosophers and their threads
/// are left behind.
pub fn run(options: &TableOptions) -> Result<Report, Error> {
    RUN.click();
    options.validate()?;
    let strategy = options.strategy;
    let mut table = Table::new(options.philosophers, options.max_eating);
    if options.force_deadlock && strategy == Strategy::Naive {
        table = table.with_rendezvous();
    }
    let table = Arc::new(table);
    let timing = Timing::from(options);
    let seed = options.seed();
    let philosophers = options.philosophers as u64;
    let duration_ms = options.duration_ms;
    clue!(COLLECTOR, INFO, {
        strategy: strategy.name(),
        philosophers: philosophers,
        duration_ms: duration_ms,
        seed: seed,
    });
    let start = Instant::now();
    let mut handles = Vec::with_capacity(options.philosophers);
    for id in 0..options.philosophers {
        let philosopher = Philosopher::new(
            id,
            Arc::clone(&table),
            timing.clone(),
            seed.wrapping_add(id as u64),
        )
        .verbose(options.verbose);
        let spawned = std::thread::Builder::new()
            .name(format!("philosopher-{}", id))
            .spawn(move || philosopher.dine(strategy));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                table.stop();
                return Err(err.into());
            }
        }
    }
    std::thread::sleep(options.duration());
    table.stop();
    let watchdog = Watchdog::new(options.grace(), options.poll());
    let stuck = match watchdog.await_termination(&handles) {
        Verdict::Finished => {
            for (id, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    WORKER_PANICKED.click();
                    return Err(Error::WorkerPanicked { philosopher: id });
                }
            }
            vec![]
        }
        Verdict::Deadlocked { stuck } => {
            RUN_DEADLOCKED.click();
            // The stuck threads hold their own reference to the table; let them be.
            drop(handles);
            stuck
        }
    };
    let admission = if strategy == Strategy::Admission {
        Some((table.max_eating(), table.most_admitted()))
    } else {
        None
    };
    let report = Report {
        strategy,
        meals: table.meals(),
        hungry: table.hungry(),
        most_eating: table.most_eating(),
        admission,
        stuck,
        elapsed: start.elapsed(),
    };
    let total_meals = report.total_meals();
    let stuck_count = report.stuck.len() as u64;
    clue!(COLLECTOR, INFO, {
        strategy: strategy.name(),
        total_meals: total_meals,
        stuck: stuck_count,
    });
    Ok(report)
}

/// Run every strategy in turn with otherwise identical options.
pub fn run_all(options: &TableOptions) -> Result<Vec<Report>, Error> {
    let mut reports = Vec::with_capacity(Strategy::ALL.len());
    for strategy in Strategy::ALL {
        reports.push(run(&options.with_strategy(strategy))?);
    }
    Ok(reports)
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn report(meals: Vec<u64>) -> Report {
        Report {
            strategy: Strategy::Ordered,
            hungry: vec![0; meals.len()],
            meals,
            most_eating: 2,
            admission: None,
            stuck: vec![],
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn balanced() {
        assert!(report(vec![10, 11, 9, 10, 10]).is_balanced(0.2));
        assert!(!report(vec![10, 11, 9, 10, 1]).is_balanced(0.2));
        assert!(!report(vec![0, 0, 0]).is_balanced(1.0));
        assert!(!report(vec![]).is_balanced(1.0));
    }

    #[test]
    fn display() {
        let mut r = report(vec![3, 4]);
        r.hungry[1] = 2;
        let text = r.to_string();
        assert!(text.starts_with("strategy 5 (ordered): 2 philosophers"));
        assert!(text.contains("philosopher 1: 4 meals, went hungry 2 times"));
        assert!(text.contains("total meals: 7 (average 3.5)"));
        assert!(text.contains("every philosopher left the table"));
        r.stuck = vec![0, 1];
        assert!(r.to_string().contains("DEADLOCK"));
    }

    #[test]
    fn invalid_options_are_rejected_before_seating() {
        let options = TableOptions {
            philosophers: 0,
            ..TableOptions::default()
        };
        assert!(matches!(
            run(&options),
            Err(Error::TooFewPhilosophers { philosophers: 0 })
        ));
    }
}
