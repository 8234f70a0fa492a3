//! Keepsake CLI - maintenance commands for the persistent memoization cache

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use keepsake::cache::{bootstrap, ClearScope, Storage};
use keepsake::cli::{Cli, Command};

/// Logs go to stderr; `RUST_LOG` overrides the default `warn` level
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = cli.cache_config()?;

    match &cli.command {
        Command::Path => {
            let path = bootstrap::default_path(&config)?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Clear { scope } => {
            let storage = Storage::bootstrap(&config);
            match storage.clear(&ClearScope::parse(scope)) {
                Some(removed) => {
                    let location = storage
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    println!(
                        "Deleted {} entr{} from '{}'",
                        removed,
                        if removed == 1 { "y" } else { "ies" },
                        location
                    );
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("Cache database is not available");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
