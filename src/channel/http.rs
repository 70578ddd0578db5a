//! HTTP channel with durable fallback
//!
//! Immediate mode sends on the session's foreground transport and persists
//! the payload to the pending queue when the send fails. Deferred mode skips
//! the send and persists straight away; the next retry pass delivers it.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Channel;
use crate::payload::Payload;
use crate::queue::PendingQueue;
use crate::session::{DEFAULT_METHOD, SendOutcome, UploadSession};

/// When an HTTP channel talks to the network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Send now, persist on failure
    #[default]
    Immediate,
    /// Persist now, deliver on the next retry pass
    Deferred,
}

pub struct HttpChannel {
    url: String,
    method: String,
    mode: DeliveryMode,
    session: Arc<UploadSession>,
    queue: Arc<PendingQueue>,
}

impl HttpChannel {
    pub fn new(url: &str, session: Arc<UploadSession>, queue: Arc<PendingQueue>) -> Self {
        Self {
            url: url.to_string(),
            method: DEFAULT_METHOD.to_string(),
            mode: DeliveryMode::Immediate,
            session,
            queue,
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_uppercase();
        self
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    fn persist(&self, payload: &Payload) -> Result<()> {
        self.queue
            .enqueue(payload, &self.url, &self.method)
            .with_context(|| format!("Event for {} could not be persisted and is lost", self.url))?;
        Ok(())
    }
}

impl Channel for HttpChannel {
    fn log(&self, payload: &Payload) -> Result<()> {
        if self.mode == DeliveryMode::Deferred {
            return self.persist(payload);
        }

        match self.session.send(payload, &self.url, &self.method) {
            SendOutcome::Success => Ok(()),
            SendOutcome::Failure(reason) => {
                log::info!("Delivery to {} failed ({}), queued for retry", self.url, reason);
                self.persist(payload)
            }
        }
    }
}
