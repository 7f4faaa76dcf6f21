use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use turnstile::{Barrier, Monitored};

////////////////////////////////////////////// Threads /////////////////////////////////////////////

static DONE: AtomicBool = AtomicBool::new(false);
static STOP: AtomicBool = AtomicBool::new(false);

fn worker_thread(id: usize, log: Arc<Monitored<Vec<String>>>, barrier: Arc<Barrier>) {
    let mut seq_no = 0u64;
    loop {
        log.update(|log| log.push(format!("thread={} seq_no={}", id, seq_no)));
        seq_no += 1;
        barrier.arrive_and_wait();
        // STOP only changes inside the completion, so every party sees the same value here.
        if STOP.load(Ordering::Relaxed) {
            return;
        }
    }
}

fn main() {
    const THREADS: usize = 4;
    // Build the shared state.
    let log = Arc::new(Monitored::new(Vec::new()));
    let barrier = Arc::new(Barrier::with_completion(THREADS, |generation| {
        if DONE.load(Ordering::Relaxed) {
            STOP.store(true, Ordering::Relaxed);
        }
        if generation % 1000 == 0 {
            println!("phase {} complete", generation);
        }
    }));
    // Spawn the theads.
    let mut threads = Vec::new();
    for id in 0..THREADS {
        let log = Arc::clone(&log);
        let barrier = Arc::clone(&barrier);
        threads.push(std::thread::spawn(move || {
            worker_thread(id, log, barrier);
        }));
    }
    std::thread::sleep(std::time::Duration::from_millis(1_000));
    DONE.store(true, Ordering::Relaxed);
    for thread in threads.into_iter() {
        let _ = thread.join();
    }
    let entries = log.update(|log| log.len());
    println!("{} entries over {} phases", entries, barrier.generation());
}
