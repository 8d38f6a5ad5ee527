//! Config validation CLI tool
//!
//! Validates a fitstreak configuration file and reports any errors.

use fitstreak_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a fitstreak configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match fitstreak_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", fitstreak_config::CURRENT_CONFIG_VERSION);
            println!("  Weekly goal: {} days", policy.weekly_goal);
            println!("  Grace window: {} days", policy.grace_days);
            println!("  UTC offset: {} minutes", policy.utc_offset_minutes);
            println!("  Strategy: {}", policy.strategy);
            println!("  Max retries: {}", policy.max_retries);
            println!("  Data dir: {}", policy.storage.data_dir.display());
            println!();
            println!("Milestones:");
            for badge in &policy.milestones {
                println!("  - {:>4} days: {}", badge.threshold, badge.label);
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                fitstreak_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                fitstreak_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                fitstreak_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                fitstreak_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        fitstreak_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
