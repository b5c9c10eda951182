//! Runs measurement scripts and writes the results file.

use clap::Parser;
use measure_core::config::Config;
use measure_core::script::run_files;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "measure")]
#[command(version, about = "Quantities with units and errors, from script files")]
struct Cli {
    /// Script files, executed in order. Results go next to the first one.
    #[arg(required = true)]
    scripts: Vec<PathBuf>,

    /// JSON configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "measure_core=debug" } else { "measure_core=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = match cli.config.as_deref().map(Config::from_json_file).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_files(&cli.scripts, config) {
        Ok((interpreter, results)) => {
            for entry in &interpreter.output.entries {
                println!("{}\n", entry);
            }
            println!("Results written to {}", results.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
