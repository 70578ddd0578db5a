//! The logging facade
//!
//! [`Logger`] owns the channel registry, dispatcher, notification bridge,
//! pending queue and upload session, and exposes the whole public surface:
//! channel management, logging, notification logging and retry control.
//!
//! A logger is an ordinary value. Code that wants one process-wide instance
//! can [`Logger::install`] it once and reach it through [`Logger::shared`].

use eyre::{Result, eyre};
use once_cell::sync::OnceCell;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::bridge::{NotificationBridge, PayloadConstructor};
use crate::channel::{Channel, DeliveryMode, FileChannel, HttpChannel, WriterChannel};
use crate::config::{ChannelConfig, Config};
use crate::dispatcher::{Dispatcher, Route};
use crate::executor::Executor;
use crate::notify::{Notification, NotificationCenter, SourceId};
use crate::payload::{DefaultFields, Fields, Message, Payload, PayloadBuilder};
use crate::queue::{PendingFile, PendingQueue};
use crate::registry::ChannelRegistry;
use crate::session::{RetryReport, SessionConfig, UploadSession};

static SHARED: OnceCell<Logger> = OnceCell::new();

/// Construction options for a [`Logger`]
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub defaults: DefaultFields,
    pub worker_threads: usize,
    pub queue_dir: PathBuf,
    pub session: SessionConfig,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            defaults: DefaultFields::standard(),
            worker_threads: 4,
            queue_dir: PendingQueue::default_dir(),
            session: SessionConfig::default(),
        }
    }
}

impl LoggerOptions {
    pub fn from_config(config: &Config) -> Self {
        let mut defaults = DefaultFields::standard();
        for (key, value) in &config.defaults {
            defaults = defaults.with_field(key, value.clone());
        }
        Self {
            defaults,
            worker_threads: config.executor.worker_threads,
            queue_dir: config.queue.resolved_directory(),
            session: config.upload.session_config(),
        }
    }
}

pub struct Logger {
    center: Arc<NotificationCenter>,
    dispatcher: Arc<Dispatcher>,
    bridge: NotificationBridge,
    queue: Arc<PendingQueue>,
    session: Arc<UploadSession>,
}

impl Logger {
    pub fn new(options: LoggerOptions) -> Result<Self> {
        Self::with_notification_center(options, Arc::new(NotificationCenter::new()))
    }

    /// Build a logger that observes (and announces channel changes on) `center`
    pub fn with_notification_center(options: LoggerOptions, center: Arc<NotificationCenter>) -> Result<Self> {
        let registry = Arc::new(ChannelRegistry::new(center.clone()));
        let executor = Executor::new(options.worker_threads)?;
        let dispatcher = Arc::new(Dispatcher::new(registry, PayloadBuilder::new(options.defaults), executor));
        let bridge = NotificationBridge::new(center.clone(), &dispatcher);

        Ok(Self {
            center,
            dispatcher,
            bridge,
            queue: Arc::new(PendingQueue::new(options.queue_dir)),
            session: Arc::new(UploadSession::new(options.session)),
        })
    }

    /// Build a logger from configuration and register its channels
    pub fn from_config(config: &Config) -> Result<Self> {
        let logger = Self::new(LoggerOptions::from_config(config))?;
        for channel in &config.channels {
            logger.add_configured_channel(channel);
        }
        if config.lifecycle {
            logger.start_logging_application_lifecycle_notifications();
        }
        Ok(logger)
    }

    /// Install `logger` as the process-wide instance
    ///
    /// Fails if one is already installed.
    pub fn install(logger: Logger) -> Result<&'static Logger> {
        SHARED
            .set(logger)
            .map_err(|_| eyre!("A shared logger is already installed"))?;
        SHARED.get().ok_or_else(|| eyre!("Shared logger vanished after install"))
    }

    /// The process-wide instance, created with default options on first use
    pub fn shared() -> Result<&'static Logger> {
        SHARED.get_or_try_init(|| Logger::new(LoggerOptions::default()))
    }

    // Channels

    pub fn add_configured_channel(&self, config: &ChannelConfig) {
        match config {
            ChannelConfig::File { name, path } => self.add_file_channel(Config::expand_path(path), name),
            ChannelConfig::Stdout { name, plain_text } => {
                self.add_channel(Arc::new(WriterChannel::stdout().with_plain_text(*plain_text)), name)
            }
            ChannelConfig::Http {
                name,
                url,
                method,
                mode,
            } => self.add_http_channel(url, method, *mode, name),
        }
    }

    pub fn add_channel(&self, channel: Arc<dyn Channel>, name: &str) {
        self.registry().add(channel, name);
    }

    pub fn add_file_channel(&self, path: PathBuf, name: &str) {
        self.add_channel(Arc::new(FileChannel::new(path)), name);
    }

    pub fn add_writer_channel(&self, out: Box<dyn Write + Send>, name: &str) {
        self.add_channel(Arc::new(WriterChannel::new(out)), name);
    }

    /// Register an HTTP channel sharing this logger's session and queue
    pub fn add_http_channel(&self, url: &str, method: &str, mode: DeliveryMode, name: &str) {
        let channel = HttpChannel::new(url, self.session.clone(), self.queue.clone())
            .with_method(method)
            .with_mode(mode);
        self.add_channel(Arc::new(channel), name);
    }

    pub fn remove_channel(&self, name: &str) {
        self.registry().remove(name);
    }

    pub fn channel_exists(&self, name: &str) -> bool {
        self.registry().exists(name)
    }

    pub fn channel(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.registry().get(name)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.registry().names()
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        self.dispatcher.registry()
    }

    // Logging

    /// Log to every registered channel
    pub fn log(&self, message: impl Into<Message>) -> Arc<Payload> {
        self.dispatcher.dispatch(message.into(), None, &Route::All)
    }

    /// Log to every registered channel with an explicit event type
    pub fn log_event_type(&self, message: impl Into<Message>, event_type: &str) -> Arc<Payload> {
        self.dispatcher.dispatch(message.into(), Some(event_type), &Route::All)
    }

    /// Log only to the named channels; unknown names are skipped
    pub fn log_to_channels<S: AsRef<str>>(&self, message: impl Into<Message>, names: &[S]) -> Arc<Payload> {
        let names = names.iter().map(|n| n.as_ref().to_string()).collect();
        self.dispatcher.dispatch(message.into(), None, &Route::Channels(names))
    }

    pub fn log_to_channel(&self, message: impl Into<Message>, name: &str) -> Arc<Payload> {
        self.log_to_channels(message, &[name])
    }

    /// Log with an optional event type to an explicit route
    pub fn dispatch(&self, message: impl Into<Message>, event_type: Option<&str>, route: &Route) -> Arc<Payload> {
        self.dispatcher.dispatch(message.into(), event_type, route)
    }

    /// Wait for queued deliveries to finish, up to `timeout`
    pub fn flush(&self, timeout: Duration) -> bool {
        self.dispatcher.flush(timeout)
    }

    // Default payload

    pub fn default_payload(&self) -> Fields {
        self.dispatcher.builder().defaults()
    }

    pub fn set_default_field(&self, key: &str, value: impl Into<serde_json::Value>) {
        self.dispatcher.builder().set_default(key, value.into());
    }

    pub fn remove_default_field(&self, key: &str) -> Option<serde_json::Value> {
        self.dispatcher.builder().remove_default(key)
    }

    // Notifications

    pub fn notification_center(&self) -> &Arc<NotificationCenter> {
        &self.center
    }

    /// Convenience for `notification_center().post(..)`
    pub fn post(&self, notification: Notification) {
        self.center.post(notification);
    }

    pub fn start_logging_application_lifecycle_notifications(&self) {
        self.bridge.start_lifecycle();
    }

    pub fn start_logging_notification_name(&self, name: &str) {
        self.bridge.start(name, None, None);
    }

    pub fn start_logging_notification(&self, name: &str, source: Option<SourceId>) {
        self.bridge.start(name, source, None);
    }

    pub fn start_logging_notification_with<F>(&self, name: &str, source: Option<SourceId>, constructor: F)
    where
        F: Fn(&Notification) -> Fields + Send + Sync + 'static,
    {
        let constructor: PayloadConstructor = Arc::new(constructor);
        self.bridge.start(name, source, Some(constructor));
    }

    /// Stop logging `name` for every source
    pub fn stop_logging_notification_name(&self, name: &str) {
        self.bridge.stop_name(name);
    }

    /// Stop logging `name` for one source only
    pub fn stop_logging_notification(&self, name: &str, source: Option<SourceId>) {
        self.bridge.stop(name, source);
    }

    pub fn stop_logging_all_notifications(&self) {
        self.bridge.stop_all();
    }

    pub fn is_logging_notification(&self, name: &str, source: Option<SourceId>) -> bool {
        self.bridge.is_logging(name, source)
    }

    // Pending delivery

    pub fn pending_queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    pub fn session(&self) -> &Arc<UploadSession> {
        &self.session
    }

    pub fn pending_items(&self) -> Vec<PendingFile> {
        self.queue.pending_items().collect()
    }

    /// Run a retry pass on the calling thread
    pub fn retry_pending(&self) -> RetryReport {
        self.session.retry_pending(&self.queue)
    }

    /// Run a retry pass on the worker pool
    pub fn spawn_retry_pass(&self) {
        let session = self.session.clone();
        let queue = self.queue.clone();
        self.dispatcher.executor().execute(move || {
            session.retry_pending(&queue);
        });
    }

    pub fn purge_pending(&self) -> Result<usize> {
        self.queue.purge()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("channels", &self.channel_names())
            .field("subscriptions", &self.bridge.len())
            .field("queue", &self.queue.directory())
            .finish()
    }
}
