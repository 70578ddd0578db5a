//! Upload session for HTTP delivery
//!
//! Two transports live here: a foreground agent used for immediate sends and
//! a background agent used by retry passes over the pending queue. Both are
//! created on first use and shared by every channel that holds the session.

use once_cell::sync::OnceCell;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use ureq::Agent;

use crate::payload::Payload;
use crate::queue::{PendingFile, PendingQueue};

pub const DEFAULT_METHOD: &str = "POST";

/// Result of one send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The remote answered with a 2xx status
    Success,
    /// Anything else, with a human-readable reason
    Failure(String),
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Success)
    }
}

/// Counts from one retry pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub delivered: usize,
    pub failed: usize,
    /// Records that could not be read or parsed; left in place
    pub skipped: usize,
}

impl RetryReport {
    pub fn total(&self) -> usize {
        self.delivered + self.failed + self.skipped
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timeout: Duration,
    pub background_timeout: Duration,
    pub retry_concurrency: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            background_timeout: Duration::from_secs(120),
            retry_concurrency: 4,
        }
    }
}

/// Shared HTTP transports
pub struct UploadSession {
    config: SessionConfig,
    foreground: OnceCell<Agent>,
    background: OnceCell<Agent>,
}

impl UploadSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            foreground: OnceCell::new(),
            background: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn foreground(&self) -> &Agent {
        self.foreground.get_or_init(|| {
            log::debug!("Creating foreground upload agent");
            build_agent(self.config.timeout)
        })
    }

    fn background(&self) -> &Agent {
        self.background.get_or_init(|| {
            log::debug!("Creating background upload agent");
            build_agent(self.config.background_timeout)
        })
    }

    /// Send one payload on the foreground transport
    ///
    /// Failures are reported, never retried here.
    pub fn send(&self, payload: &Payload, url: &str, method: &str) -> SendOutcome {
        deliver(self.foreground(), payload, url, method)
    }

    /// Attempt delivery of every pending file on the background transport
    ///
    /// A file is deleted only after its own content was accepted by the remote.
    pub fn retry_pending(&self, queue: &PendingQueue) -> RetryReport {
        let items: Vec<PendingFile> = queue.pending_items().collect();
        if items.is_empty() {
            return RetryReport::default();
        }

        let workers = self.config.retry_concurrency.max(1).min(items.len());
        log::info!("Retrying {} pending event(s) with {} worker(s)", items.len(), workers);

        let work = Mutex::new(items.into_iter());
        let report = Mutex::new(RetryReport::default());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let next = match work.lock() {
                            Ok(mut guard) => guard.next(),
                            Err(_) => None,
                        };
                        let Some(item) = next else { break };
                        let result = self.retry_item(queue, &item);
                        if let Ok(mut report) = report.lock() {
                            match result {
                                ItemResult::Delivered => report.delivered += 1,
                                ItemResult::Failed => report.failed += 1,
                                ItemResult::Skipped => report.skipped += 1,
                            }
                        }
                    }
                });
            }
        });

        let report = match report.into_inner() {
            Ok(report) => report,
            Err(poisoned) => poisoned.into_inner(),
        };
        log::info!(
            "Retry pass finished: {} delivered, {} failed, {} skipped",
            report.delivered,
            report.failed,
            report.skipped
        );
        report
    }

    fn retry_item(&self, queue: &PendingQueue, item: &PendingFile) -> ItemResult {
        let record = match item.load() {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping unreadable pending event {}: {:#}", item.id(), e);
                return ItemResult::Skipped;
            }
        };

        match deliver(self.background(), &record.payload, &record.url, &record.method) {
            SendOutcome::Success => {
                if let Err(e) = queue.remove(item) {
                    log::warn!("Delivered {} but could not remove it: {:#}", item.id(), e);
                }
                ItemResult::Delivered
            }
            SendOutcome::Failure(reason) => {
                log::debug!("Pending event {} still undeliverable: {}", item.id(), reason);
                ItemResult::Failed
            }
        }
    }
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("config", &self.config)
            .field("foreground", &self.foreground.get().is_some())
            .field("background", &self.background.get().is_some())
            .finish()
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

enum ItemResult {
    Delivered,
    Failed,
    Skipped,
}

fn build_agent(timeout: Duration) -> Agent {
    let config = Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    Agent::new_with_config(config)
}

fn deliver(agent: &Agent, payload: &Payload, url: &str, method: &str) -> SendOutcome {
    let body = match payload.to_json() {
        Ok(body) => body,
        Err(e) => return SendOutcome::Failure(format!("Failed to serialize payload: {}", e)),
    };

    let method = match ureq::http::Method::from_bytes(method.to_uppercase().as_bytes()) {
        Ok(method) => method,
        Err(e) => return SendOutcome::Failure(format!("Invalid HTTP method '{}': {}", method, e)),
    };

    let request = match ureq::http::Request::builder()
        .method(method)
        .uri(url)
        .header("Content-Type", "application/json")
        .body(body)
    {
        Ok(request) => request,
        Err(e) => return SendOutcome::Failure(format!("Invalid request for {}: {}", url, e)),
    };

    let response = match agent.run(request) {
        Ok(response) => response,
        Err(e) => return SendOutcome::Failure(format!("HTTP request failed: {}", e)),
    };

    // Reading the body to the end returns the connection to the agent's pool
    let status = response.status();
    if let Err(e) = response.into_body().read_to_vec() {
        log::debug!("Could not drain response body from {}: {}", url, e);
    }

    if status.is_success() {
        SendOutcome::Success
    } else {
        SendOutcome::Failure(format!("HTTP status {}", status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Message, PayloadBuilder};
    use std::net::TcpListener;
    use tempfile::TempDir;

    fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}/events", port)
    }

    fn payload() -> Payload {
        PayloadBuilder::default().build(&Message::from("hello"), None)
    }

    #[test]
    fn test_send_to_closed_port_fails() {
        let session = UploadSession::default();
        let outcome = session.send(&payload(), &closed_port_url(), "POST");
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_invalid_method_fails() {
        let session = UploadSession::default();
        let outcome = session.send(&payload(), "http://127.0.0.1:1/", "NOT A METHOD");
        assert!(matches!(outcome, SendOutcome::Failure(reason) if reason.contains("Invalid HTTP method")));
    }

    #[test]
    fn test_retry_empty_queue() {
        let temp = TempDir::new().unwrap();
        let queue = PendingQueue::new(temp.path().to_path_buf());
        let report = UploadSession::default().retry_pending(&queue);
        assert_eq!(report, RetryReport::default());
    }

    #[test]
    fn test_retry_failure_leaves_item() {
        let temp = TempDir::new().unwrap();
        let queue = PendingQueue::new(temp.path().to_path_buf());
        let item = queue.enqueue(&payload(), &closed_port_url(), "POST").unwrap();
        let before = std::fs::read(item.path()).unwrap();

        let report = UploadSession::default().retry_pending(&queue);

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(std::fs::read(item.path()).unwrap(), before);
    }

    #[test]
    fn test_retry_skips_corrupt_record() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("broken.json"), "{not json").unwrap();
        let queue = PendingQueue::new(temp.path().to_path_buf());

        let report = UploadSession::default().retry_pending(&queue);

        assert_eq!(report.skipped, 1);
        assert_eq!(queue.len(), 1);
    }
}
