use colored::*;
use eyre::Result;
use serde::Serialize;

use crate::cli::{OutputFormat, PendingAction};
use fanlog::config::Config;
use fanlog::queue::PendingQueue;
use fanlog::session::UploadSession;

#[derive(Serialize)]
struct PendingEntry {
    id: String,
    method: String,
    url: String,
    enqueued_at: String,
    event_type: Option<String>,
}

pub fn run(action: PendingAction, quiet: bool, config: &Config) -> Result<()> {
    let queue = PendingQueue::new(config.queue.resolved_directory());
    match action {
        PendingAction::List { format } => list(&queue, OutputFormat::resolve(format)),
        PendingAction::Retry => retry(&queue, quiet, config),
        PendingAction::Purge { yes } => purge(&queue, yes, quiet),
    }
}

fn list(queue: &PendingQueue, format: OutputFormat) -> Result<()> {
    let mut entries = Vec::new();
    let mut unreadable = 0;
    for item in queue.pending_items() {
        match item.load() {
            Ok(record) => entries.push(PendingEntry {
                event_type: record.payload.event_type().map(str::to_string),
                id: record.id,
                method: record.method,
                url: record.url,
                enqueued_at: record.enqueued_at.to_rfc3339(),
            }),
            Err(e) => {
                log::warn!("Skipping pending item {}: {}", item.id(), e);
                unreadable += 1;
            }
        }
    }
    entries.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() && unreadable == 0 {
                println!("{} No pending events in {}", "✓".green(), queue.directory().display());
                return Ok(());
            }
            println!("{} ({}):", "Pending events".bold(), entries.len());
            for entry in &entries {
                println!(
                    "  {} {} {} {}",
                    entry.enqueued_at.dimmed(),
                    entry.method.cyan(),
                    entry.url,
                    entry.event_type.as_deref().unwrap_or("-").yellow()
                );
            }
            if unreadable > 0 {
                println!("  {} {} unreadable file(s) left in place", "⚠".yellow(), unreadable);
            }
        }
    }
    Ok(())
}

fn retry(queue: &PendingQueue, quiet: bool, config: &Config) -> Result<()> {
    let session = UploadSession::new(config.upload.session_config());
    let report = session.retry_pending(queue);

    if !quiet {
        println!(
            "{} Delivered {}, failed {}, skipped {}",
            if report.failed == 0 { "✓".green() } else { "⚠".yellow() },
            report.delivered,
            report.failed,
            report.skipped
        );
    }
    if report.failed > 0 {
        eyre::bail!("{} pending event(s) could not be delivered", report.failed);
    }
    Ok(())
}

fn purge(queue: &PendingQueue, yes: bool, quiet: bool) -> Result<()> {
    let count = queue.len();
    if count == 0 {
        if !quiet {
            println!("{} Nothing to purge", "✓".green());
        }
        return Ok(());
    }
    if !yes {
        eyre::bail!("Refusing to delete {} pending event(s) without --yes", count);
    }

    let removed = queue.purge()?;
    if !quiet {
        println!("{} Removed {} pending event(s)", "✓".green(), removed);
    }
    Ok(())
}
