//! Event payloads and the builder that stamps them
//!
//! Every event is a flat, ordered JSON mapping. The builder merges the
//! configured default fields with whatever the caller supplied, then stamps
//! the reserved keys (`event_id`, `timestamp`, `event_type`).

use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

/// Ordered key/value mapping used for payloads and default fields
pub type Fields = IndexMap<String, serde_json::Value>;

pub const EVENT_ID_KEY: &str = "event_id";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const EVENT_TYPE_KEY: &str = "event_type";
pub const MESSAGE_KEY: &str = "message";

/// Event type used when the caller does not name one
pub const DEFAULT_EVENT_TYPE: &str = "log";

/// What the caller hands to `log`
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A plain string message
    Text(String),
    /// A structured mapping
    Fields(Fields),
}

impl Message {
    /// The plain text, if this is a text message
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Fields(_) => None,
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<Fields> for Message {
    fn from(fields: Fields) -> Self {
        Message::Fields(fields)
    }
}

impl From<serde_json::Value> for Message {
    /// Objects become field maps; any other JSON value is logged as its text form
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Message::Fields(map.into_iter().collect()),
            serde_json::Value::String(text) => Message::Text(text),
            other => Message::Text(other.to_string()),
        }
    }
}

/// An immutable event payload
///
/// There are no mutable accessors; channels receive it behind a shared
/// reference and may only read or serialize it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    fields: Fields,
}

impl Payload {
    /// Wrap an already-built field map
    pub fn from_fields(fields: Fields) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn event_id(&self) -> Option<&str> {
        self.get_str(EVENT_ID_KEY)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.get_str(EVENT_TYPE_KEY)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.get_str(TIMESTAMP_KEY)
    }

    pub fn message(&self) -> Option<&str> {
        self.get_str(MESSAGE_KEY)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.fields)
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }
}

/// Default fields merged into every event
///
/// `standard()` seeds the locale, a per-logger session id and the process id;
/// configuration and callers may add or override keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultFields {
    fields: Fields,
}

impl DefaultFields {
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }

    pub fn standard() -> Self {
        let mut fields = Fields::new();
        fields.insert("locale".to_string(), serde_json::Value::String(detect_locale()));
        fields.insert("session_id".to_string(), serde_json::Value::String(generate_id()));
        fields.insert("process_id".to_string(), serde_json::Value::from(std::process::id()));
        Self { fields }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

/// Builds payloads from defaults plus caller input
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    defaults: RwLock<DefaultFields>,
}

impl PayloadBuilder {
    pub fn new(defaults: DefaultFields) -> Self {
        Self {
            defaults: RwLock::new(defaults),
        }
    }

    /// Snapshot of the current default fields
    pub fn defaults(&self) -> Fields {
        match self.defaults.read() {
            Ok(guard) => guard.fields.clone(),
            Err(poisoned) => poisoned.into_inner().fields.clone(),
        }
    }

    pub fn set_default(&self, key: &str, value: serde_json::Value) {
        let mut guard = match self.defaults.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.fields.insert(key.to_string(), value);
    }

    pub fn remove_default(&self, key: &str) -> Option<serde_json::Value> {
        let mut guard = match self.defaults.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.fields.shift_remove(key)
    }

    /// Merge defaults and caller input into a new payload
    ///
    /// Caller fields override defaults; reserved keys override both.
    pub fn build(&self, message: &Message, event_type: Option<&str>) -> Payload {
        let mut fields = Fields::new();
        fields.insert(EVENT_ID_KEY.to_string(), serde_json::Value::String(generate_id()));
        fields.insert(
            TIMESTAMP_KEY.to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        fields.insert(
            EVENT_TYPE_KEY.to_string(),
            serde_json::Value::String(event_type.unwrap_or(DEFAULT_EVENT_TYPE).to_string()),
        );

        for (key, value) in self.defaults() {
            fields.entry(key).or_insert(value);
        }

        match message {
            Message::Text(text) => {
                fields.insert(MESSAGE_KEY.to_string(), serde_json::Value::String(text.clone()));
            }
            Message::Fields(extra) => {
                for (key, value) in extra {
                    if is_reserved(key) && key != MESSAGE_KEY {
                        continue;
                    }
                    fields.insert(key.clone(), value.clone());
                }
            }
        }

        // A caller-supplied event_type field counts when no explicit one was given
        if event_type.is_none()
            && let Message::Fields(extra) = message
            && let Some(value) = extra.get(EVENT_TYPE_KEY)
        {
            fields.insert(EVENT_TYPE_KEY.to_string(), value.clone());
        }

        Payload::from_fields(fields)
    }
}

fn is_reserved(key: &str) -> bool {
    matches!(key, EVENT_ID_KEY | TIMESTAMP_KEY | EVENT_TYPE_KEY | MESSAGE_KEY)
}

/// Random v4 UUID, used for event, session and pending-file ids
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

fn detect_locale() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .map(|value| value.split('.').next().unwrap_or("").to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "en_US".to_string())
}
