use std::fs::File;
use std::sync::Arc;
use std::time::SystemTime;

use arrrg::CommandLine;
use biometrics::{Collector, PlainTextEmitter};
use indicio::stdio::StdioEmitter;
use indicio::{clue, ALWAYS, ERROR, INFO};

use symposium::{register_biometrics, run, run_all, Error, Report, Strategy, TableOptions, COLLECTOR};

fn legend() {
    println!("strategies:");
    for strategy in Strategy::ALL {
        println!(
            "  {} {:<14} {}",
            strategy.number(),
            strategy.name(),
            strategy.describe()
        );
    }
    println!();
}

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

fn exec(options: &TableOptions, all: bool) -> Result<Vec<Report>, Error> {
    if all {
        run_all(options)
    } else {
        Ok(vec![run(options)?])
    }
}

fn main() {
    let (options, free) =
        TableOptions::from_command_line_relaxed("Usage: symposium [OPTIONS] [all]");
    let all = match free.as_slice() {
        [] => false,
        [x] if x == "all" => true,
        _ => {
            eprintln!("command takes at most one positional argument: all");
            std::process::exit(1);
        }
    };
    // indicio
    let emitter = Arc::new(StdioEmitter);
    COLLECTOR.register(emitter);
    COLLECTOR.set_verbosity(if options.verbose { INFO } else { ERROR });
    clue!(COLLECTOR, ALWAYS, {
        new_process: std::env::args().map(String::from).collect::<Vec<_>>(),
    });
    legend();
    let reports = match exec(&options, all) {
        Ok(reports) => reports,
        Err(err) => {
            eprintln!("symposium: {}", err);
            std::process::exit(1);
        }
    };
    for report in reports.iter() {
        println!("{}\n", report);
    }
    if let Some(path) = options.metrics.as_ref() {
        if let Err(err) = emit_biometrics(path) {
            eprintln!("could not write biometrics: {}", err);
        }
    }
    // Deadlocked philosophers never leave; exiting takes them with us.
    if reports.iter().any(Report::deadlocked) {
        std::process::exit(1);
    }
}
