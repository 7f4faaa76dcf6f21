use std::fs::File;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arrrg::CommandLine;
use biometrics::{Collector, PlainTextEmitter};
use indicio::stdio::StdioEmitter;
use indicio::{clue, ALWAYS, ERROR, INFO};

use racetrack::{compare, demonstrate, register_biometrics, sweep, Error, RaceOptions, COLLECTOR};

fn emit_biometrics(path: &str) -> Result<(), Error> {
    let collector = Collector::new();
    register_biometrics(&collector);
    let mut emitter = PlainTextEmitter::new(File::create(path)?);
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    collector.emit(&mut emitter, now)?;
    Ok(())
}

fn exec(options: &RaceOptions) -> Result<(), Error> {
    println!(
        "comparing primitives ({} threads, {} iterations, {}us of work):",
        options.threads, options.iterations, options.work_us
    );
    for result in compare(options)? {
        println!("{}", result);
    }
    if options.sweep {
        println!();
        println!("sweeping thread counts ({} iterations):", options.iterations);
        for result in sweep(options)? {
            println!("{}", result);
        }
    }
    if options.demonstrate {
        println!();
        println!("monitor demonstration ({} threads, 10 characters each):", options.threads);
        demonstrate(
            options.threads,
            10,
            Duration::from_millis(10),
            options.seed,
            |step| println!("{}", step),
        )?;
    }
    Ok(())
}

fn main() {
    let (options, free) = RaceOptions::from_command_line_relaxed("Usage: racetrack [OPTIONS]");
    if !free.is_empty() {
        eprintln!("command takes no positional arguments");
        std::process::exit(1);
    }
    // indicio
    let emitter = Arc::new(StdioEmitter);
    COLLECTOR.register(emitter);
    COLLECTOR.set_verbosity(if options.verbose { INFO } else { ERROR });
    clue!(COLLECTOR, ALWAYS, {
        new_process: std::env::args().map(String::from).collect::<Vec<_>>(),
    });
    if let Err(err) = exec(&options) {
        eprintln!("racetrack: {}", err);
        std::process::exit(1);
    }
    if let Some(path) = options.metrics.as_ref() {
        if let Err(err) = emit_biometrics(path) {
            eprintln!("could not write biometrics: {}", err);
        }
    }
}
