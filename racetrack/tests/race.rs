use std::time::Duration;

use racetrack::{
    compare, race, standard_contenders, sweep_contenders, BarrierContender, Contender, Lap,
    RaceOptions,
};

fn lap(iterations: u64, seed: u64) -> Lap {
    Lap {
        iterations,
        work: Duration::ZERO,
        seed,
    }
}

#[test]
fn every_contender_accounts_for_every_write() {
    for threads in [1, 3, 5] {
        let lap = lap(2_000, threads as u64);
        for contender in standard_contenders(threads, 100) {
            let result = race(contender.as_ref(), threads, &lap).unwrap();
            assert_eq!(result.expected_writes(), result.total_writes, "{}", result);
            assert_eq!(threads, result.slots.len());
            assert_eq!(threads, result.thread_seconds.len());
            for slot in result.slots.iter() {
                assert_eq!(2_000, slot.writes, "{}", result);
                assert!((33..127).contains(&slot.last), "{}", result);
            }
            assert!(result.seconds >= result.slowest_thread());
        }
    }
}

#[test]
fn sweep_contenders_survive_oversubscription() {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        * 4;
    for contender in sweep_contenders(1) {
        let result = race(contender.as_ref(), threads, &lap(500, 9)).unwrap();
        assert_eq!(result.expected_writes(), result.total_writes, "{}", result);
    }
}

#[test]
fn barrier_completion_runs_once_per_lap() {
    let contender = BarrierContender::new(4);
    let result = race(&contender, 4, &lap(250, 1)).unwrap();
    assert_eq!(250, contender.laps());
    assert_eq!(1_000, result.total_writes);
    assert_eq!("barrier", contender.name());
}

#[test]
fn seeds_determine_payloads() {
    let contender = BarrierContender::new(2);
    let first = race(&contender, 2, &lap(100, 5)).unwrap();
    let contender = BarrierContender::new(2);
    let second = race(&contender, 2, &lap(100, 5)).unwrap();
    assert_eq!(first.slots, second.slots);
}

#[test]
fn simulated_work_slows_the_race() {
    let lap = Lap {
        iterations: 20,
        work: Duration::from_millis(1),
        seed: 0,
    };
    let contenders = standard_contenders(2, 100);
    let result = race(contenders[0].as_ref(), 2, &lap).unwrap();
    // Forty writes, each holding the mutex for a millisecond.
    assert!(result.seconds >= 0.040, "{}", result);
}

#[test]
fn compare_runs_the_standard_lineup() {
    let options = RaceOptions {
        threads: 3,
        iterations: 500,
        ..RaceOptions::default()
    };
    let results = compare(&options).unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.contender.as_str()).collect();
    assert_eq!(
        vec!["mutex", "semaphore", "barrier", "spin_lock", "spin_wait", "monitor"],
        names
    );
    assert!(results.iter().all(|r| r.total_writes == 1_500));
}
