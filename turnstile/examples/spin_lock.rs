use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use turnstile::{Exclusive, SpinLock, SpinWait};

fn worker<E: Exclusive>(lock: &E, counter: &AtomicU64, target: u64) {
    loop {
        let _guard = lock.guard();
        // The lock orders these; relaxed is enough.
        let x = counter.load(Ordering::Relaxed);
        if x >= target {
            return;
        }
        counter.store(x + 1, Ordering::Relaxed);
    }
}

fn race<E: Exclusive + 'static>(name: &str, lock: E) {
    // Configure the experiment.
    const NUMBER_OF_THREADS: u64 = 4;
    const TARGET: u64 = 10_000_000;
    // Spawn all threads.
    let lock = Arc::new(lock);
    let counter = Arc::new(AtomicU64::new(0));
    let start = std::time::Instant::now();
    let mut threads = Vec::new();
    for _ in 0..NUMBER_OF_THREADS {
        let lock = Arc::clone(&lock);
        let counter = Arc::clone(&counter);
        threads.push(std::thread::spawn(move || {
            worker(&*lock, &counter, TARGET);
        }));
    }
    // Join all threads.
    for thread in threads.into_iter() {
        thread.join().unwrap();
    }
    println!(
        "{}: {} increments in {:?}",
        name,
        counter.load(Ordering::Relaxed),
        start.elapsed()
    );
}

fn main() {
    race("spin_lock", SpinLock::new());
    race("spin_wait", SpinWait::new());
}
