//! Integration tests for event delivery
//!
//! These tests drive a real `Logger` against a local HTTP responder:
//! - Immediate sends that succeed leave nothing behind
//! - Failed sends persist exactly one pending item
//! - Deferred channels persist without touching the network
//! - Retry passes drain the queue once the collector accepts
//! - Routed logging and bridged notifications reach the right channels
//! - Sequential sends share one pooled connection

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use fanlog::payload::PayloadBuilder;
use fanlog::{
    DefaultFields, DeliveryMode, Logger, LoggerOptions, Message, Notification, SessionConfig, SourceId, UploadSession,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

/// Minimal HTTP/1.1 collector that records request bodies
struct Collector {
    url: String,
    status: Arc<AtomicU16>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
    connections: Arc<AtomicUsize>,
}

impl Collector {
    fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/events", listener.local_addr().unwrap());
        let status = Arc::new(AtomicU16::new(status));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_connections = connections.clone();
        let accept_status = status.clone();
        let accept_requests = requests.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                accept_connections.fetch_add(1, Ordering::SeqCst);
                let status = accept_status.clone();
                let requests = accept_requests.clone();
                thread::spawn(move || serve(stream, status, requests));
            }
        });

        Self {
            url,
            status,
            requests,
            connections,
        }
    }

    fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    fn bodies(&self) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| serde_json::from_str(body).unwrap())
            .collect()
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn methods(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }
}

fn serve(stream: TcpStream, status: Arc<AtomicU16>, requests: Arc<Mutex<Vec<(String, String)>>>) {
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
            return;
        }
        let method = request_line.split_whitespace().next().unwrap_or_default().to_string();

        let mut content_length = 0usize;
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).unwrap_or(0) == 0 {
                return;
            }
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }

        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).is_err() {
            return;
        }

        let code = status.load(Ordering::SeqCst);
        // Record before answering so a completed send is always visible
        requests
            .lock()
            .unwrap()
            .push((method, String::from_utf8_lossy(&body).to_string()));

        let response = format!("HTTP/1.1 {} Test\r\nContent-Length: 0\r\n\r\n", code);
        if writer.write_all(response.as_bytes()).is_err() {
            return;
        }
    }
}

fn logger(queue_dir: &Path) -> Logger {
    Logger::new(LoggerOptions {
        defaults: DefaultFields::standard(),
        worker_threads: 2,
        queue_dir: queue_dir.to_path_buf(),
        session: SessionConfig {
            timeout: Duration::from_secs(5),
            background_timeout: Duration::from_secs(5),
            retry_concurrency: 2,
        },
    })
    .unwrap()
}

fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_immediate_success_leaves_queue_empty() {
    let temp = TempDir::new().unwrap();
    let collector = Collector::start(200);
    let logger = logger(temp.path());
    logger.add_http_channel(&collector.url, "post", DeliveryMode::Immediate, "collector");

    let payload = logger.log_event_type("signed in", "auth");
    assert!(logger.flush(WAIT));

    assert!(logger.pending_items().is_empty());
    let bodies = collector.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["message"], "signed in");
    assert_eq!(bodies[0]["event_type"], "auth");
    assert_eq!(bodies[0]["event_id"].as_str(), payload.event_id());
    assert_eq!(collector.methods(), vec!["POST".to_string()]);
}

#[test]
fn test_failed_send_persists_exactly_one_item() {
    let temp = TempDir::new().unwrap();
    let collector = Collector::start(503);
    let logger = logger(temp.path());
    logger.add_http_channel(&collector.url, "PUT", DeliveryMode::Immediate, "collector");

    let payload = logger.log("will retry");
    assert!(logger.flush(WAIT));

    let items = logger.pending_items();
    assert_eq!(items.len(), 1);
    let record = items[0].load().unwrap();
    assert_eq!(record.url, collector.url);
    assert_eq!(record.method, "PUT");
    assert_eq!(record.payload.event_id(), payload.event_id());
    assert_eq!(record.payload.message(), Some("will retry"));
}

#[test]
fn test_retry_delivers_and_empties_queue() {
    let temp = TempDir::new().unwrap();
    let collector = Collector::start(500);
    let logger = logger(temp.path());
    logger.add_http_channel(&collector.url, "POST", DeliveryMode::Immediate, "collector");

    logger.log("first");
    logger.log("second");
    assert!(logger.flush(WAIT));
    assert_eq!(logger.pending_items().len(), 2);

    // Still failing: nothing is removed
    let report = logger.retry_pending();
    assert_eq!(report.failed, 2);
    assert_eq!(logger.pending_items().len(), 2);

    collector.set_status(200);
    let report = logger.retry_pending();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 0);
    assert!(logger.pending_items().is_empty());

    let mut delivered: Vec<String> = collector
        .bodies()
        .iter()
        .filter_map(|b| b["message"].as_str().map(str::to_string))
        .collect();
    delivered.sort();
    delivered.dedup();
    assert_eq!(delivered, vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn test_deferred_channel_waits_for_retry() {
    let temp = TempDir::new().unwrap();
    let collector = Collector::start(200);
    let logger = logger(temp.path());
    logger.add_http_channel(&collector.url, "POST", DeliveryMode::Deferred, "batch");

    logger.log("later");
    assert!(logger.flush(WAIT));
    assert_eq!(logger.pending_items().len(), 1);
    assert!(collector.bodies().is_empty());

    logger.spawn_retry_pass();
    assert!(logger.flush(WAIT));
    assert!(logger.pending_items().is_empty());
    assert_eq!(collector.bodies().len(), 1);
}

#[test]
fn test_routed_logging_reaches_only_named_channels() {
    let temp = TempDir::new().unwrap();
    let collector = Collector::start(200);
    let logger = logger(&temp.path().join("pending"));
    let file = temp.path().join("events.jsonl");
    logger.add_file_channel(file.clone(), "file");
    logger.add_http_channel(&collector.url, "POST", DeliveryMode::Immediate, "collector");

    logger.log_to_channel("local only", "file");
    logger.log_to_channels("both", &["file", "collector", "missing"]);
    logger.log("everywhere");
    assert!(logger.flush(WAIT));

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 3);

    let mut remote: Vec<String> = collector
        .bodies()
        .iter()
        .filter_map(|b| b["message"].as_str().map(str::to_string))
        .collect();
    remote.sort();
    assert_eq!(remote, vec!["both".to_string(), "everywhere".to_string()]);
}

#[test]
fn test_removed_channel_receives_nothing() {
    let temp = TempDir::new().unwrap();
    let logger = logger(&temp.path().join("pending"));
    let file = temp.path().join("events.jsonl");
    logger.add_file_channel(file.clone(), "file");

    logger.log("kept");
    assert!(logger.flush(WAIT));
    logger.remove_channel("file");
    assert!(!logger.channel_exists("file"));
    logger.log("dropped");
    assert!(logger.flush(WAIT));

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["message"], "kept");
}

#[test]
fn test_notification_logging_by_source() {
    let temp = TempDir::new().unwrap();
    let logger = logger(&temp.path().join("pending"));
    let file = temp.path().join("events.jsonl");
    logger.add_file_channel(file.clone(), "file");

    let a = SourceId::next();
    let b = SourceId::next();
    logger.start_logging_notification("sync.done", Some(a));
    logger.start_logging_notification("sync.done", Some(b));
    logger.stop_logging_notification("sync.done", Some(a));
    assert!(!logger.is_logging_notification("sync.done", Some(a)));
    assert!(logger.is_logging_notification("sync.done", Some(b)));

    logger.post(Notification::new("sync.done").from_source(a));
    logger.post(Notification::new("sync.done").from_source(b).with_info("items", 12));
    assert!(logger.flush(WAIT));

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["event_type"], "sync.done");
    assert_eq!(lines[0]["source"], b.as_u64());
    assert_eq!(lines[0]["user_info"]["items"], 12);
}

#[test]
fn test_channel_notifications_are_posted() {
    let temp = TempDir::new().unwrap();
    let logger = logger(&temp.path().join("pending"));
    let file = temp.path().join("events.jsonl");
    logger.add_file_channel(file.clone(), "file");
    logger.start_logging_notification_name(fanlog::CHANNEL_ADDED_NOTIFICATION);

    logger.add_file_channel(temp.path().join("other.jsonl"), "other");
    assert!(logger.flush(WAIT));

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["event_type"], fanlog::CHANNEL_ADDED_NOTIFICATION);
    assert_eq!(lines[0]["user_info"][fanlog::CHANNEL_NAME_KEY], "other");
}

#[test]
fn test_session_reuses_connection() {
    let collector = Collector::start(200);
    let session = UploadSession::new(SessionConfig {
        timeout: Duration::from_secs(5),
        background_timeout: Duration::from_secs(5),
        retry_concurrency: 1,
    });
    let builder = PayloadBuilder::default();

    for i in 0..3 {
        let payload = builder.build(&Message::from(format!("send {}", i)), None);
        assert!(session.send(&payload, &collector.url, "POST").is_success());
    }

    collector.set_status(500);
    let payload = builder.build(&Message::from("rejected"), None);
    assert!(!session.send(&payload, &collector.url, "POST").is_success());
    let payload = builder.build(&Message::from("after rejection"), None);
    collector.set_status(200);
    assert!(session.send(&payload, &collector.url, "POST").is_success());

    assert_eq!(collector.bodies().len(), 5);
    assert_eq!(collector.connections(), 1);
}
