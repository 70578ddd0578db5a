//! Delivery channels
//!
//! A channel is anything that can take an event payload somewhere:
//! - File - appends JSON lines to a path
//! - Writer - writes JSON lines to any `Write` (stdout, sockets, buffers)
//! - HTTP - sends to an endpoint, persisting failures for a later retry pass

pub mod file;
pub mod http;
pub mod writer;

pub use file::FileChannel;
pub use http::{DeliveryMode, HttpChannel};
pub use writer::WriterChannel;

use eyre::Result;

use crate::payload::Payload;

/// A pluggable delivery target
///
/// Implementations must be callable from several worker threads at once.
pub trait Channel: Send + Sync {
    /// Deliver a structured payload
    fn log(&self, payload: &Payload) -> Result<()>;

    /// Whether this channel wants plain-text messages through `log_event`
    fn accepts_text(&self) -> bool {
        false
    }

    /// Deliver a plain-text message; only called when `accepts_text` is true
    fn log_event(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}
