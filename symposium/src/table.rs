use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};

use biometrics::Counter;

use turnstile::{Barrier, Semaphore, TimedLock};

use crate::State;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static ADMIT: Counter = Counter::new("symposium.table.admit");
static ADMIT_WAIT: Counter = Counter::new("symposium.table.admit_wait");
static DISMISS: Counter = Counter::new("symposium.table.dismiss");
static STOP: Counter = Counter::new("symposium.table.stop");

pub(crate) fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&ADMIT);
    collector.register_counter(&ADMIT_WAIT);
    collector.register_counter(&DISMISS);
    collector.register_counter(&STOP);
}

///////////////////////////////////////////// Admission ////////////////////////////////////////////

#[derive(Debug, Default)]
struct Admission {
    admitted: usize,
    high_water: usize,
}

/////////////////////////////////////////////// Table //////////////////////////////////////////////

/// The state shared by everyone at the table.
///
/// There are as many forks as philosophers.  Philosopher `i` has fork `i` on its left and fork
/// `(i + 1) % n` on its right.  Meal counts live here rather than with the philosophers so they
/// remain readable when philosophers never come home.
#[derive(Debug)]
pub struct Table {
    forks: Vec<TimedLock>,
    stop: AtomicBool,
    seating: Semaphore,
    max_eating: usize,
    admission: Mutex<Admission>,
    admission_changed: Condvar,
    eating: AtomicU64,
    most_eating: AtomicU64,
    meals: Vec<AtomicU64>,
    hungry: Vec<AtomicU64>,
    states: Vec<AtomicU8>,
    rendezvous: Option<Barrier>,
}

impl Table {
    /// Set a table for `philosophers` with room for `max_eating` concurrent eaters under
    /// admission control.
    pub fn new(philosophers: usize, max_eating: usize) -> Self {
        Self {
            forks: (0..philosophers).map(|_| TimedLock::new()).collect(),
            stop: AtomicBool::new(false),
            seating: Semaphore::new(1),
            max_eating,
            admission: Mutex::new(Admission::default()),
            admission_changed: Condvar::new(),
            eating: AtomicU64::new(0),
            most_eating: AtomicU64::new(0),
            meals: (0..philosophers).map(|_| AtomicU64::new(0)).collect(),
            hungry: (0..philosophers).map(|_| AtomicU64::new(0)).collect(),
            states: (0..philosophers)
                .map(|_| AtomicU8::new(State::Thinking.as_u8()))
                .collect(),
            rendezvous: None,
        }
    }

    /// Make every philosopher wait for every other after picking up its first fork.  Under the
    /// naive strategy this guarantees circular wait.
    pub fn with_rendezvous(mut self) -> Self {
        self.rendezvous = Some(Barrier::new(self.forks.len()));
        self
    }

    pub fn philosophers(&self) -> usize {
        self.forks.len()
    }

    pub fn max_eating(&self) -> usize {
        self.max_eating
    }

    /// The fork on philosopher `id`'s left.
    pub fn left_fork(&self, id: usize) -> &TimedLock {
        &self.forks[id]
    }

    /// The fork on philosopher `id`'s right.
    pub fn right_fork(&self, id: usize) -> &TimedLock {
        &self.forks[(id + 1) % self.forks.len()]
    }

    pub(crate) fn rendezvous(&self) -> Option<&Barrier> {
        self.rendezvous.as_ref()
    }

    /// The one-permit semaphore that seats a single philosopher at a time.
    pub fn seating(&self) -> &Semaphore {
        &self.seating
    }

    /// Ask every philosopher to leave once its current cycle completes.
    pub fn stop(&self) {
        STOP.click();
        self.stop.store(true, Ordering::Release);
        // Wake anyone blocked on admission so they can observe the stop.
        let _admission = self.admission.lock().unwrap();
        self.admission_changed.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Block until fewer than `max_eating` philosophers are admitted, then take a slot.  Returns
    /// false without taking a slot if the table stops first.
    pub fn admit(&self) -> bool {
        ADMIT.click();
        let mut admission = self.admission.lock().unwrap();
        while admission.admitted >= self.max_eating {
            if self.is_stopped() {
                return false;
            }
            ADMIT_WAIT.click();
            admission = self.admission_changed.wait(admission).unwrap();
        }
        admission.admitted += 1;
        admission.high_water = std::cmp::max(admission.high_water, admission.admitted);
        true
    }

    /// Give back an admission slot and wake every waiter.
    pub fn dismiss(&self) {
        DISMISS.click();
        let mut admission = self.admission.lock().unwrap();
        assert!(admission.admitted > 0, "dismiss without admit");
        admission.admitted -= 1;
        self.admission_changed.notify_all();
    }

    /// The most philosophers ever admitted at once.
    pub fn most_admitted(&self) -> usize {
        self.admission.lock().unwrap().high_water
    }

    pub(crate) fn set_state(&self, id: usize, state: State) {
        self.states[id].store(state.as_u8(), Ordering::Relaxed);
    }

    /// What philosopher `id` was last seen doing.
    pub fn state(&self, id: usize) -> State {
        State::from_u8(self.states[id].load(Ordering::Relaxed))
    }

    // Callers own the state stores; these only keep the tallies.
    pub(crate) fn start_eating(&self) {
        let now = self.eating.fetch_add(1, Ordering::AcqRel) + 1;
        self.most_eating.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn finish_eating(&self, id: usize) {
        self.eating.fetch_sub(1, Ordering::AcqRel);
        self.meals[id].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn went_hungry(&self, id: usize) {
        self.hungry[id].fetch_add(1, Ordering::Relaxed);
    }

    /// The most philosophers ever eating at once.
    pub fn most_eating(&self) -> u64 {
        self.most_eating.load(Ordering::Acquire)
    }

    /// Meals eaten by each philosopher so far.
    pub fn meals(&self) -> Vec<u64> {
        self.meals
            .iter()
            .map(|m| m.load(Ordering::Relaxed))
            .collect()
    }

    /// Times each philosopher gave up on its forks so far.
    pub fn hungry(&self) -> Vec<u64> {
        self.hungry
            .iter()
            .map(|h| h.load(Ordering::Relaxed))
            .collect()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn forks_form_a_ring() {
        let table = Table::new(5, 2);
        for id in 0..5 {
            assert!(std::ptr::eq(
                table.right_fork(id),
                table.left_fork((id + 1) % 5)
            ));
        }
        assert!(std::ptr::eq(table.right_fork(4), table.left_fork(0)));
    }

    #[test]
    fn meals_and_hunger_are_tracked() {
        let table = Table::new(3, 2);
        table.start_eating();
        table.start_eating();
        table.finish_eating(1);
        table.finish_eating(2);
        table.went_hungry(0);
        assert_eq!(vec![0, 1, 1], table.meals());
        assert_eq!(vec![1, 0, 0], table.hungry());
        assert_eq!(2, table.most_eating());
        // Tallies leave the published state alone.
        assert_eq!(State::Thinking, table.state(1));
        table.set_state(1, State::Eating);
        assert_eq!(State::Eating, table.state(1));
    }

    #[test]
    fn admission_is_bounded() {
        let table = Arc::new(Table::new(5, 2));
        assert!(table.admit());
        assert!(table.admit());
        let table_p = Arc::clone(&table);
        let third = std::thread::spawn(move || {
            let admitted = table_p.admit();
            if admitted {
                table_p.dismiss();
            }
            admitted
        });
        std::thread::sleep(Duration::from_millis(50));
        assert!(!third.is_finished());
        table.dismiss();
        assert!(third.join().unwrap());
        table.dismiss();
        assert_eq!(2, table.most_admitted());
    }

    #[test]
    fn stop_releases_admission_waiters() {
        let table = Arc::new(Table::new(3, 1));
        assert!(table.admit());
        let table_p = Arc::clone(&table);
        let waiter = std::thread::spawn(move || table_p.admit());
        std::thread::sleep(Duration::from_millis(50));
        table.stop();
        assert!(!waiter.join().unwrap());
        table.dismiss();
    }
}
