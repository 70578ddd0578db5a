//! Event-logging facade with multi-channel fan-out
//!
//! Application code logs through a [`Logger`]; each event is merged with the
//! default payload fields and delivered, on a background worker pool, to every
//! registered [`Channel`] (or a named subset). Named notifications can be
//! bridged into the same stream. HTTP channels persist events they could not
//! deliver and a later retry pass sends them, removing each file only after
//! the remote accepted it.
//!
//! ```no_run
//! use fanlog::{DeliveryMode, Logger, LoggerOptions};
//!
//! let logger = Logger::new(LoggerOptions::default())?;
//! logger.add_file_channel("/tmp/events.jsonl".into(), "file");
//! logger.add_http_channel("https://collector.example/events", "POST", DeliveryMode::Immediate, "collector");
//! logger.log("service started");
//! logger.log_event_type("user signed in", "auth");
//! # Ok::<(), eyre::Report>(())
//! ```

pub mod bridge;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod logger;
pub mod notify;
pub mod payload;
pub mod queue;
pub mod registry;
pub mod session;

pub use bridge::{Lifecycle, NotificationBridge, PayloadConstructor};
pub use channel::{Channel, DeliveryMode, FileChannel, HttpChannel, WriterChannel};
pub use config::{ChannelConfig, Config, LogLevel};
pub use dispatcher::Route;
pub use logger::{Logger, LoggerOptions};
pub use notify::{Notification, NotificationCenter, ObserverToken, SourceId};
pub use payload::{DefaultFields, Fields, Message, Payload};
pub use queue::{PendingFile, PendingQueue, PendingRecord};
pub use registry::{CHANNEL_ADDED_NOTIFICATION, CHANNEL_NAME_KEY, CHANNEL_REMOVED_NOTIFICATION, ChannelRegistry};
pub use session::{RetryReport, SendOutcome, SessionConfig, UploadSession};
