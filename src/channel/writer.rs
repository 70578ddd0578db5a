//! Channel over an arbitrary output stream

use eyre::{Context, Result};
use std::io::Write;
use std::sync::Mutex;

use super::Channel;
use crate::payload::Payload;

/// Writes events to any `Write` implementation
///
/// Structured payloads are written as JSON lines. With `plain_text` enabled,
/// plain-string messages are written as-is instead of wrapped in a payload.
pub struct WriterChannel {
    out: Mutex<Box<dyn Write + Send>>,
    plain_text: bool,
}

impl WriterChannel {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            plain_text: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn with_plain_text(mut self, plain_text: bool) -> Self {
        self.plain_text = plain_text;
        self
    }

    fn write_line(&self, line: &str) -> Result<()> {
        let mut out = self.out.lock().map_err(|_| eyre::eyre!("Writer channel lock poisoned"))?;
        writeln!(out, "{}", line).context("Failed to write event")?;
        out.flush().context("Failed to flush output")?;
        Ok(())
    }
}

impl Channel for WriterChannel {
    fn log(&self, payload: &Payload) -> Result<()> {
        let json = payload.to_json().context("Failed to serialize event")?;
        self.write_line(&json)
    }

    fn accepts_text(&self) -> bool {
        self.plain_text
    }

    fn log_event(&self, message: &str) -> Result<()> {
        self.write_line(message)
    }
}
