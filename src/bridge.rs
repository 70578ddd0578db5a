//! Notification-to-event bridge
//!
//! Turns notifications posted on a [`NotificationCenter`] into logged events.
//! The observer only checks that the subscription is still active and hands
//! the firing to the executor; payload construction and dispatch happen there,
//! so the posting thread never waits on channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::dispatcher::{Dispatcher, Route};
use crate::notify::{Notification, NotificationCenter, ObserverToken, SourceId};
use crate::payload::{Fields, Message};

/// Builds event fields from a notification
pub type PayloadConstructor = Arc<dyn Fn(&Notification) -> Fields + Send + Sync>;

/// Application lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Launched,
    BecameActive,
    WillResignActive,
    EnteredBackground,
    WillEnterForeground,
    WillTerminate,
    MemoryWarning,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 7] = [
        Lifecycle::Launched,
        Lifecycle::BecameActive,
        Lifecycle::WillResignActive,
        Lifecycle::EnteredBackground,
        Lifecycle::WillEnterForeground,
        Lifecycle::WillTerminate,
        Lifecycle::MemoryWarning,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Lifecycle::Launched => "app.launched",
            Lifecycle::BecameActive => "app.became_active",
            Lifecycle::WillResignActive => "app.will_resign_active",
            Lifecycle::EnteredBackground => "app.entered_background",
            Lifecycle::WillEnterForeground => "app.will_enter_foreground",
            Lifecycle::WillTerminate => "app.will_terminate",
            Lifecycle::MemoryWarning => "app.memory_warning",
        }
    }

    pub fn notification(&self) -> Notification {
        Notification::new(self.name())
    }
}

/// Default constructor: the notification name, its source, and any user info
pub fn default_constructor(notification: &Notification) -> Fields {
    let mut fields = Fields::new();
    fields.insert(
        "notification".to_string(),
        serde_json::Value::String(notification.name.clone()),
    );
    if let Some(source) = notification.source {
        fields.insert("source".to_string(), serde_json::Value::from(source.as_u64()));
    }
    if !notification.user_info.is_empty() {
        let info: serde_json::Map<String, serde_json::Value> = notification
            .user_info
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields.insert("user_info".to_string(), serde_json::Value::Object(info));
    }
    fields
}

type SubscriptionKey = (String, Option<SourceId>);

struct Subscription {
    token: ObserverToken,
    active: Arc<AtomicBool>,
}

pub struct NotificationBridge {
    center: Arc<NotificationCenter>,
    dispatcher: Weak<Dispatcher>,
    subscriptions: Mutex<HashMap<SubscriptionKey, Subscription>>,
}

impl NotificationBridge {
    pub fn new(center: Arc<NotificationCenter>, dispatcher: &Arc<Dispatcher>) -> Self {
        Self {
            center,
            dispatcher: Arc::downgrade(dispatcher),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<SubscriptionKey, Subscription>> {
        match self.subscriptions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start logging `name` (from `source`, or from anyone when `None`)
    ///
    /// Replaces any existing subscription for the same (name, source) pair.
    pub fn start(&self, name: &str, source: Option<SourceId>, constructor: Option<PayloadConstructor>) {
        let constructor = constructor.unwrap_or_else(|| Arc::new(default_constructor) as PayloadConstructor);
        let active = Arc::new(AtomicBool::new(true));

        let observer_active = active.clone();
        let dispatcher = self.dispatcher.clone();
        let callback = move |notification: &Notification| {
            if !observer_active.load(Ordering::Acquire) {
                return;
            }
            let Some(dispatcher) = dispatcher.upgrade() else {
                return;
            };

            let notification = notification.clone();
            let active = observer_active.clone();
            let constructor = constructor.clone();
            let worker = dispatcher.clone();
            dispatcher.executor().execute(move || {
                if !active.load(Ordering::Acquire) {
                    log::trace!("Dropping '{}' for a cancelled subscription", notification.name);
                    return;
                }
                let fields = constructor(&notification);
                worker.dispatch(Message::Fields(fields), Some(notification.name.as_str()), &Route::All);
            });
        };

        let mut subscriptions = self.subscriptions();
        let key = (name.to_string(), source);
        if let Some(previous) = subscriptions.remove(&key) {
            cancel(&self.center, previous);
        }
        let token = self.center.add_observer(name, source, callback);
        subscriptions.insert(key, Subscription { token, active });
        log::debug!("Logging notification '{}' (source: {:?})", name, source);
    }

    /// Subscribe to every lifecycle notification with the default constructor
    pub fn start_lifecycle(&self) {
        for event in Lifecycle::ALL {
            self.start(event.name(), None, None);
        }
    }

    /// Stop every subscription for `name`, whatever its source
    pub fn stop_name(&self, name: &str) -> usize {
        let mut subscriptions = self.subscriptions();
        let keys: Vec<SubscriptionKey> = subscriptions.keys().filter(|(n, _)| n == name).cloned().collect();
        for key in &keys {
            if let Some(subscription) = subscriptions.remove(key) {
                cancel(&self.center, subscription);
            }
        }
        keys.len()
    }

    /// Stop exactly the (name, source) subscription
    pub fn stop(&self, name: &str, source: Option<SourceId>) -> bool {
        match self.subscriptions().remove(&(name.to_string(), source)) {
            Some(subscription) => {
                cancel(&self.center, subscription);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) -> usize {
        let drained: Vec<Subscription> = self.subscriptions().drain().map(|(_, s)| s).collect();
        let count = drained.len();
        for subscription in drained {
            cancel(&self.center, subscription);
        }
        count
    }

    pub fn is_logging(&self, name: &str, source: Option<SourceId>) -> bool {
        self.subscriptions().contains_key(&(name.to_string(), source))
    }

    pub fn len(&self) -> usize {
        self.subscriptions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions().is_empty()
    }
}

fn cancel(center: &NotificationCenter, subscription: Subscription) {
    subscription.active.store(false, Ordering::Release);
    center.remove_observer(subscription.token);
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::executor::Executor;
    use crate::payload::{DefaultFields, Payload, PayloadBuilder};
    use crate::registry::ChannelRegistry;
    use std::time::Duration;

    #[derive(Default)]
    struct Recording(Mutex<Vec<Payload>>);

    impl Channel for Recording {
        fn log(&self, payload: &Payload) -> eyre::Result<()> {
            self.0.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    fn setup() -> (Arc<NotificationCenter>, Arc<Dispatcher>, NotificationBridge, Arc<Recording>) {
        let center = Arc::new(NotificationCenter::new());
        let registry = Arc::new(ChannelRegistry::new(center.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            PayloadBuilder::new(DefaultFields::default()),
            Executor::new(2).unwrap(),
        ));
        let recording = Arc::new(Recording::default());
        dispatcher.registry().add(recording.clone(), "rec");
        let bridge = NotificationBridge::new(center.clone(), &dispatcher);
        (center, dispatcher, bridge, recording)
    }

    #[test]
    fn test_notification_becomes_event() {
        let (center, dispatcher, bridge, recording) = setup();
        bridge.start("user.signed_in", None, None);

        center.post(Notification::new("user.signed_in").with_info("user", "ada"));
        assert!(dispatcher.flush(Duration::from_secs(5)));

        let payloads = recording.0.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].event_type(), Some("user.signed_in"));
        assert_eq!(payloads[0].get_str("notification"), Some("user.signed_in"));
        assert_eq!(payloads[0].get("user_info").unwrap()["user"], "ada");
    }

    #[test]
    fn test_custom_constructor() {
        let (center, dispatcher, bridge, recording) = setup();
        let constructor: PayloadConstructor = Arc::new(|n: &Notification| {
            let mut fields = Fields::new();
            fields.insert("custom".to_string(), serde_json::json!(n.name.len()));
            fields
        });
        bridge.start("abc", None, Some(constructor));

        center.post(Notification::new("abc"));
        assert!(dispatcher.flush(Duration::from_secs(5)));

        assert_eq!(recording.0.lock().unwrap()[0].get("custom"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_resubscribe_replaces_observer() {
        let (center, dispatcher, bridge, recording) = setup();
        bridge.start("tick", None, None);
        bridge.start("tick", None, None);

        assert_eq!(bridge.len(), 1);
        // Registry notifications have no observers, so only the bridge's remains
        assert_eq!(center.observer_count(), 1);

        center.post(Notification::new("tick"));
        assert!(dispatcher.flush(Duration::from_secs(5)));
        assert_eq!(recording.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stop_one_source_keeps_other() {
        let (center, dispatcher, bridge, recording) = setup();
        let a = SourceId::next();
        let b = SourceId::next();
        bridge.start("tick", Some(a), None);
        bridge.start("tick", Some(b), None);

        assert!(bridge.stop("tick", Some(a)));
        center.post(Notification::new("tick").from_source(a));
        center.post(Notification::new("tick").from_source(b));
        assert!(dispatcher.flush(Duration::from_secs(5)));

        let payloads = recording.0.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].get("source"), Some(&serde_json::json!(b.as_u64())));
    }

    #[test]
    fn test_stop_name_and_stop_all() {
        let (center, dispatcher, bridge, recording) = setup();
        bridge.start("a", None, None);
        bridge.start("a", Some(SourceId::next()), None);
        bridge.start("b", None, None);

        assert_eq!(bridge.stop_name("a"), 2);
        assert!(bridge.is_logging("b", None));
        assert_eq!(bridge.stop_all(), 1);
        assert!(bridge.is_empty());

        center.post(Notification::new("a"));
        center.post(Notification::new("b"));
        assert!(dispatcher.flush(Duration::from_secs(5)));
        assert!(recording.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_lifecycle_names() {
        let (center, dispatcher, bridge, recording) = setup();
        bridge.start_lifecycle();
        assert_eq!(bridge.len(), Lifecycle::ALL.len());

        center.post(Lifecycle::WillTerminate.notification());
        assert!(dispatcher.flush(Duration::from_secs(5)));
        assert_eq!(
            recording.0.lock().unwrap()[0].get_str("notification"),
            Some("app.will_terminate")
        );
    }
}
