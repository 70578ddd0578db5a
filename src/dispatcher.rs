//! Fan-out of events to channels

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use crate::channel::Channel;
use crate::executor::Executor;
use crate::payload::{Message, Payload, PayloadBuilder};
use crate::registry::ChannelRegistry;

/// Which channels a log call goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    All,
    Channels(Vec<String>),
}

/// Builds payloads and hands one delivery job per channel to the executor
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ChannelRegistry>,
    builder: PayloadBuilder,
    executor: Executor,
}

impl Dispatcher {
    pub fn new(registry: Arc<ChannelRegistry>, builder: PayloadBuilder, executor: Executor) -> Self {
        Self {
            registry,
            builder,
            executor,
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn builder(&self) -> &PayloadBuilder {
        &self.builder
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Build the payload and queue delivery to every routed channel
    ///
    /// Returns the payload that was dispatched. Unknown channel names in the
    /// route are skipped.
    pub fn dispatch(&self, message: Message, event_type: Option<&str>, route: &Route) -> Arc<Payload> {
        let payload = Arc::new(self.builder.build(&message, event_type));

        let targets = match route {
            Route::All => self.registry.snapshot(),
            Route::Channels(names) => self.registry.resolve(names),
        };

        if targets.is_empty() {
            log::trace!("No channels for event {:?}", payload.event_id());
            return payload;
        }

        let text: Option<Arc<str>> = message.as_text().map(Arc::from);
        for (name, channel) in targets {
            let payload = payload.clone();
            let text = text.clone();
            self.executor
                .execute(move || deliver(&name, channel.as_ref(), text.as_deref(), &payload));
        }

        payload
    }

    pub fn flush(&self, timeout: Duration) -> bool {
        self.executor.flush(timeout)
    }
}

/// Invoke one channel, keeping its failures to itself
fn deliver(name: &str, channel: &dyn Channel, text: Option<&str>, payload: &Payload) {
    let result = catch_unwind(AssertUnwindSafe(|| match text {
        Some(text) if channel.accepts_text() => channel.log_event(text),
        _ => channel.log(payload),
    }));

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("Channel '{}' failed to log event: {:#}", name, e),
        Err(_) => log::error!("Channel '{}' panicked while logging an event", name),
    }
}
