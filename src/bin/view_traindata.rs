//! Prints a plain-text summary table for the NDJSON stats log written
//! by `grid_agent_train --stats <path>` (ported from `view_traindata.py`).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use grid_agent::train::TrainData;

#[derive(Parser, Debug)]
#[command(about = "Summarize a training run's NDJSON stats log")]
struct Args {
    /// Path to the stats file written by `grid_agent_train --stats <path>`.
    stats: PathBuf,
}

fn main() -> ExitCode {
    match run(&Args::parse().stats) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &PathBuf) -> Result<(), grid_agent::Error> {
    let reader = BufReader::new(File::open(path)?);

    println!(
        "{:>10} {:>14} {:>16} {:>10} {:>10}",
        "iter", "mean_value", "max_value_diff", "changed", "changed%"
    );
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TrainData = serde_json::from_str(&line)
            .map_err(|err| grid_agent::Error::Config(format!("malformed stats line: {err}")))?;
        println!(
            "{:>10} {:>14.6} {:>16.6} {:>10} {:>9.2}%",
            record.iteration_number,
            record.mean_value,
            record.max_value_diff,
            record.changed_actions_number,
            record.changed_actions_percentage * 100.0,
        );
    }
    Ok(())
}
