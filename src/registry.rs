//! Channel registry
//!
//! Name-keyed table of channels. Mutations take the write lock; lookups share
//! the read lock. Changes are announced on the notification center after the
//! lock has been released.

use indexmap::IndexMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::channel::Channel;
use crate::notify::{Notification, NotificationCenter, SourceId};

pub const CHANNEL_ADDED_NOTIFICATION: &str = "fanlog.channel_added";
pub const CHANNEL_REMOVED_NOTIFICATION: &str = "fanlog.channel_removed";
/// `user_info` key carrying the channel name
pub const CHANNEL_NAME_KEY: &str = "channel";

pub struct ChannelRegistry {
    channels: RwLock<IndexMap<String, Arc<dyn Channel>>>,
    center: Arc<NotificationCenter>,
    source: SourceId,
}

impl ChannelRegistry {
    pub fn new(center: Arc<NotificationCenter>) -> Self {
        Self {
            channels: RwLock::new(IndexMap::new()),
            center,
            source: SourceId::next(),
        }
    }

    /// Source id stamped on this registry's notifications
    pub fn source(&self) -> SourceId {
        self.source
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<dyn Channel>>> {
        match self.channels.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Arc<dyn Channel>>> {
        match self.channels.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `channel` under `name`, replacing any previous entry
    pub fn add(&self, channel: Arc<dyn Channel>, name: &str) {
        let replaced = {
            let mut channels = self.write();
            // Replacement moves the name to the end, as remove-then-add would
            let replaced = channels.shift_remove(name);
            channels.insert(name.to_string(), channel);
            replaced.is_some()
        };

        if replaced {
            log::debug!("Channel '{}' replaced", name);
            self.announce(CHANNEL_REMOVED_NOTIFICATION, name);
        } else {
            log::debug!("Channel '{}' added", name);
        }
        self.announce(CHANNEL_ADDED_NOTIFICATION, name);
    }

    /// Remove the channel under `name`; absent names are ignored
    pub fn remove(&self, name: &str) -> Option<Arc<dyn Channel>> {
        let removed = self.write().shift_remove(name);
        if removed.is_some() {
            log::debug!("Channel '{}' removed", name);
            self.announce(CHANNEL_REMOVED_NOTIFICATION, name);
        }
        removed
    }

    pub fn exists(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Every (name, channel) pair at this instant
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn Channel>)> {
        self.read()
            .iter()
            .map(|(name, channel)| (name.clone(), channel.clone()))
            .collect()
    }

    /// Resolve the subset of `names` that is currently registered
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Vec<(String, Arc<dyn Channel>)> {
        let channels = self.read();
        let mut resolved: Vec<(String, Arc<dyn Channel>)> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if resolved.iter().any(|(seen, _)| seen == name) {
                continue;
            }
            match channels.get(name) {
                Some(channel) => resolved.push((name.to_string(), channel.clone())),
                None => log::debug!("Skipping unknown channel '{}'", name),
            }
        }
        resolved
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn announce(&self, notification: &str, name: &str) {
        self.center.post(
            Notification::new(notification)
                .from_source(self.source)
                .with_info(CHANNEL_NAME_KEY, name),
        );
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.names())
            .field("source", &self.source)
            .finish()
    }
}
