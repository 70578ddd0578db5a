use colored::*;
use eyre::Result;
use serde::Serialize;

use crate::cli::OutputFormat;
use fanlog::config::Config;

#[derive(Serialize)]
struct ChannelInfo<'a> {
    name: &'a str,
    kind: &'static str,
    target: String,
}

pub fn run(format: OutputFormat, config: &Config) -> Result<()> {
    let channels: Vec<ChannelInfo> = config
        .channels
        .iter()
        .map(|c| ChannelInfo {
            name: c.name(),
            kind: c.kind(),
            target: c.target(),
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&channels)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&channels)?),
        OutputFormat::Text => {
            if channels.is_empty() {
                println!("{} No channels configured", "ℹ".blue());
                return Ok(());
            }
            println!("{} ({}):", "Channels".bold(), channels.len());
            for channel in &channels {
                println!(
                    "  {} {:<6} {}",
                    channel.name.green(),
                    channel.kind.cyan(),
                    channel.target.dimmed()
                );
            }
        }
    }
    Ok(())
}
