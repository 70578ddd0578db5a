use colored::*;
use eyre::{Context, Result};
use std::time::Duration;

use fanlog::bridge::Lifecycle;
use fanlog::config::Config;
use fanlog::dispatcher::Route;
use fanlog::logger::Logger;
use fanlog::payload::{Fields, MESSAGE_KEY, Message};

pub struct LogArgs {
    pub message: String,
    pub channels: Vec<String>,
    pub event_type: Option<String>,
    pub fields: Vec<(String, String)>,
    pub wait: u64,
    pub quiet: bool,
}

pub fn run(args: LogArgs, config: &Config) -> Result<()> {
    let logger = Logger::from_config(config).context("Failed to build logger")?;

    for name in &args.channels {
        if !logger.channel_exists(name) {
            eprintln!("{} Unknown channel '{}', skipping", "⚠".yellow(), name);
        }
    }

    if config.lifecycle {
        logger.post(Lifecycle::Launched.notification());
    }

    let route = if args.channels.is_empty() {
        Route::All
    } else {
        Route::Channels(args.channels)
    };
    let message = build_message(args.message, args.fields);
    let payload = logger.dispatch(message, args.event_type.as_deref(), &route);

    if config.lifecycle {
        logger.post(Lifecycle::WillTerminate.notification());
    }

    let drained = logger.flush(Duration::from_secs(args.wait));
    if !drained {
        log::warn!("Timed out after {}s waiting for delivery", args.wait);
        eprintln!("{} Some deliveries were still running after {}s", "⚠".yellow(), args.wait);
    }

    if !args.quiet {
        println!("{} {}", "✓".green(), payload.event_id().unwrap_or("-"));
    }
    Ok(())
}

/// Plain text when there are no fields, so text-capable channels get the bare message
///
/// With `key=value` fields the message becomes one field among them; values
/// that parse as JSON keep their type.
fn build_message(message: String, pairs: Vec<(String, String)>) -> Message {
    if pairs.is_empty() {
        return Message::Text(message);
    }
    let mut fields = Fields::new();
    fields.insert(MESSAGE_KEY.to_string(), serde_json::Value::String(message));
    for (key, raw) in pairs {
        let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
        fields.insert(key, value);
    }
    Message::Fields(fields)
}
