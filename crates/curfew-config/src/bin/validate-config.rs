//! Config validation CLI tool
//!
//! Validates a curfew configuration file and reports any errors.

use curfew_config::{ConfigError, NextBlock};
use curfew_util::{DataPaths, RunMode};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = DataPaths::from_env().config();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a curfew configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match curfew_config::load_validated_config(&config_path, RunMode::from_env()) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Enabled: {}", config.enabled);
            println!("  Check interval: {}s", config.check_interval);
            match config.overall_limit() {
                Some(limit) => println!("  Overall limit: {}s", limit),
                None => println!("  Overall limit: none"),
            }
            println!("  Warning thresholds: {:?}", config.warning_thresholds());

            if config.has_apps() {
                println!();
                println!("Apps:");
                for (app, limit) in &config.time_limits.dedicated {
                    println!("  - {}: {}s", app, limit);
                }
            }

            if !config.blocked_hours.is_empty() {
                println!();
                println!("Blocked hours:");
                for range in &config.blocked_hours {
                    println!("  - {} to {}", range.start, range.end);
                }
                let now = curfew_util::now();
                match curfew_config::minutes_until_next_block(&now, &config.blocked_hours) {
                    NextBlock::AlreadyBlocked => println!("  (currently blocked)"),
                    NextBlock::Upcoming { minutes, start } => {
                        println!("  (next block at {} in {} minutes)", start, minutes)
                    }
                    NextBlock::NoneScheduled => {}
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("JSON parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::NotAnObject => {
                    eprintln!("The top level must be a JSON object");
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
            }
            ExitCode::from(1)
        }
    }
}
