//! Topic-keyed publish/subscribe bus
//!
//! Observers register for a notification name, optionally scoped to a single
//! source. `post` invokes every matching observer on the posting thread after
//! the observer table lock has been released, so observers may add or remove
//! observers (or post) from inside their callback.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::payload::Fields;

/// Identity of an object that posts notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

static NEXT_SOURCE: AtomicU64 = AtomicU64::new(1);

impl SourceId {
    /// Allocate a fresh process-unique source identity
    pub fn next() -> Self {
        Self(NEXT_SOURCE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

/// A single firing
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub name: String,
    pub source: Option<SourceId>,
    pub user_info: Fields,
}

impl Notification {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: None,
            user_info: Fields::new(),
        }
    }

    pub fn from_source(mut self, source: SourceId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_info(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.user_info.insert(key.to_string(), value.into());
        self
    }
}

/// Handle returned by `add_observer`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

pub type ObserverFn = Arc<dyn Fn(&Notification) + Send + Sync>;

struct Observer {
    token: ObserverToken,
    name: String,
    source: Option<SourceId>,
    callback: ObserverFn,
}

impl Observer {
    fn matches(&self, notification: &Notification) -> bool {
        self.name == notification.name && (self.source.is_none() || self.source == notification.source)
    }
}

/// Publish/subscribe bus keyed by notification name
#[derive(Default)]
pub struct NotificationCenter {
    observers: RwLock<Vec<Observer>>,
    next_token: AtomicU64,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `name`, optionally only for firings from `source`
    pub fn add_observer<F>(&self, name: &str, source: Option<SourceId>, callback: F) -> ObserverToken
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let token = ObserverToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let observer = Observer {
            token,
            name: name.to_string(),
            source,
            callback: Arc::new(callback),
        };

        let mut observers = match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        observers.push(observer);
        log::trace!("Observer {:?} added for '{}'", token, name);
        token
    }

    /// Unregister an observer; returns false if the token was unknown
    pub fn remove_observer(&self, token: ObserverToken) -> bool {
        let mut observers = match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = observers.len();
        observers.retain(|o| o.token != token);
        before != observers.len()
    }

    /// Deliver a notification to every matching observer
    pub fn post(&self, notification: Notification) {
        let matched: Vec<ObserverFn> = {
            let observers = match self.observers.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            observers
                .iter()
                .filter(|o| o.matches(&notification))
                .map(|o| o.callback.clone())
                .collect()
        };

        log::trace!("Posting '{}' to {} observer(s)", notification.name, matched.len());
        for callback in matched {
            callback(&notification);
        }
    }

    pub fn observer_count(&self) -> usize {
        match self.observers.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(center: &NotificationCenter, name: &str, source: Option<SourceId>) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        center.add_observer(name, source, move |n| sink.lock().unwrap().push(n.name.clone()));
        seen
    }

    #[test]
    fn test_post_reaches_matching_observer() {
        let center = NotificationCenter::new();
        let seen = recorder(&center, "ping", None);

        center.post(Notification::new("ping"));
        center.post(Notification::new("pong"));

        assert_eq!(*seen.lock().unwrap(), vec!["ping".to_string()]);
    }

    #[test]
    fn test_source_scoping() {
        let center = NotificationCenter::new();
        let a = SourceId::next();
        let b = SourceId::next();
        let scoped = recorder(&center, "ping", Some(a));
        let unscoped = recorder(&center, "ping", None);

        center.post(Notification::new("ping").from_source(a));
        center.post(Notification::new("ping").from_source(b));
        center.post(Notification::new("ping"));

        assert_eq!(scoped.lock().unwrap().len(), 1);
        assert_eq!(unscoped.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_remove_observer() {
        let center = NotificationCenter::new();
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        let token = center.add_observer("ping", None, move |_| *sink.lock().unwrap() += 1);

        center.post(Notification::new("ping"));
        assert!(center.remove_observer(token));
        assert!(!center.remove_observer(token));
        center.post(Notification::new("ping"));

        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(center.observer_count(), 0);
    }

    #[test]
    fn test_observer_may_reenter_center() {
        let center = Arc::new(NotificationCenter::new());
        let inner = center.clone();
        center.add_observer("outer", None, move |_| inner.post(Notification::new("inner")));
        let seen = recorder(&center, "inner", None);

        center.post(Notification::new("outer"));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
