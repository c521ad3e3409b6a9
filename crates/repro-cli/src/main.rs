use std::error::Error;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use repro_core::ReproError;
use tracing_subscriber::EnvFilter;

use commands::{
    config::{self, ConfigArgs},
    discover::{self, DiscoverArgs},
    doctor::{self, DoctorArgs},
    paper::{self, PaperArgs},
    run::{self, RunArgs},
};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "repro", about = "Reproducibility pipeline orchestrator")]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover, run and postprocess every experiment.
    Run(RunArgs),
    /// Print the ordered experiment list.
    Discover(DiscoverArgs),
    /// Rebuild the paper and file its documents.
    Paper(PaperArgs),
    /// Check external tools and the expected layout.
    Doctor(DoctorArgs),
    /// Print the effective configuration as TOML.
    Config(ConfigArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Exit status for a failed command: the runner's own code when it fits.
fn exit_status(err: &(dyn Error + 'static)) -> ExitCode {
    match err.downcast_ref::<ReproError>() {
        Some(repro @ ReproError::Runner(_)) => {
            eprintln!("{}", repro.info().message);
            let code = repro
                .exit_code()
                .and_then(|code| u8::try_from(code).ok())
                .filter(|code| *code != 0)
                .unwrap_or(1);
            ExitCode::from(code)
        }
        _ => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let result = match cli.command {
        Command::Run(args) => run::run(&args),
        Command::Discover(args) => discover::run(&args),
        Command::Paper(args) => paper::run(&args),
        Command::Doctor(args) => doctor::run(&args),
        Command::Config(args) => config::run(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => exit_status(err.as_ref()),
    }
}
