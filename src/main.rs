use LatticeCP::task_parser::CellTask;
use log::{LevelFilter, error, info};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::process::ExitCode;

const USAGE: &str = "Usage: LatticeCP [task.json] [--report report.json] [--verbose]";

pub fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let config = ConfigBuilder::new().set_time_level(LevelFilter::Off).build();
    if let Err(e) = TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto) {
        eprintln!("Could not set up the terminal logger: {}", e);
    }

    let report_path = args
        .iter()
        .position(|a| a == "--report")
        .and_then(|i| args.get(i + 1))
        .cloned();
    let task_path = args
        .iter()
        .enumerate()
        .find(|(i, a)| {
            !a.starts_with('-') && (*i == 0 || args[*i - 1] != "--report")
        })
        .map(|(_, a)| a.clone());

    let task = match task_path {
        Some(path) => CellTask::from_file(&path),
        None => {
            info!("No task file given, running the built-in UO2 pin cell");
            CellTask::uo2_pin_cell()
        }
    };

    let result = task.and_then(|task| {
        let report = task.run()?;
        report.print();
        if let Some(path) = &report_path {
            report.save(path)?;
        }
        Ok(())
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", USAGE);
            ExitCode::FAILURE
        }
    }
}
