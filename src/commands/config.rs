use colored::*;
use eyre::Result;
use std::path::PathBuf;

use crate::cli::{ConfigAction, OutputFormat};
use fanlog::config::Config;

pub fn run(action: ConfigAction, explicit: Option<&PathBuf>, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
        ConfigAction::Path => path(explicit),
    }
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        OutputFormat::Text => {
            println!("{}", "fanlog configuration".bold());
            println!();

            println!("log_level: {}", config.log_level.as_filter());
            println!("lifecycle: {}", config.lifecycle);
            println!();

            println!("{}:", "executor".cyan());
            println!("  worker_threads: {}", config.executor.worker_threads);
            println!();

            println!("{}:", "queue".cyan());
            println!("  directory: {}", config.queue.resolved_directory().display());
            println!();

            println!("{}:", "upload".cyan());
            println!("  timeout_secs: {}", config.upload.timeout_secs);
            println!("  background_timeout_secs: {}", config.upload.background_timeout_secs);
            println!("  retry_concurrency: {}", config.upload.retry_concurrency);
            println!();

            if !config.defaults.is_empty() {
                println!("{}:", "defaults".cyan());
                for (key, value) in &config.defaults {
                    println!("  {}: {}", key, value);
                }
                println!();
            }

            println!("{}:", "channels".cyan());
            if config.channels.is_empty() {
                println!("  {}", "(none)".dimmed());
            }
            for channel in &config.channels {
                println!("  {} [{}] {}", channel.name().green(), channel.kind(), channel.target().dimmed());
            }
        }
    }

    Ok(())
}

fn path(explicit: Option<&PathBuf>) -> Result<()> {
    match Config::locate(explicit) {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("{} No config file found, using defaults", "ℹ".blue());
            eprintln!("  Searched:");
            for (origin, path) in Config::candidate_paths() {
                eprintln!("    {} ({})", path.display(), origin.dimmed());
            }
        }
    }
    Ok(())
}
