//! Process-wide map from channel key to its running worker. Grounded on the
//! `getChannel`/`delChannel` package-level map in `app/channel.go`, turned
//! into an explicit, lifecycled value per the "process-wide state does not
//! require globals" design note rather than a static.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::channel::ChannelHandle;
use crate::dispatch::Dispatch;

pub struct ChannelRegistry {
    dispatch: Arc<Dispatch>,
    channels: Mutex<HashMap<String, Arc<ChannelHandle>>>,
}

impl ChannelRegistry {
    pub fn new(dispatch: Arc<Dispatch>) -> Arc<Self> {
        Arc::new(Self { dispatch, channels: Mutex::new(HashMap::new()) })
    }

    /// Returns the channel for `key`, spawning a fresh worker if none is
    /// currently registered.
    pub fn get_or_create(self: &Arc<Self>, key: &str) -> Arc<ChannelHandle> {
        let mut channels = self.channels.lock();
        if let Some(existing) = channels.get(key) {
            if existing.is_alive() {
                return existing.clone();
            }
        }
        let handle = ChannelHandle::spawn(key.to_string(), self.dispatch.clone(), Arc::downgrade(self));
        channels.insert(key.to_string(), handle.clone());
        handle
    }

    pub fn get(&self, key: &str) -> Option<Arc<ChannelHandle>> {
        self.channels.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &str) {
        self.channels.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_reuses_live_channel() {
        let registry = ChannelRegistry::new(Arc::new(Dispatch::new()));
        let a = registry.get_or_create("k1");
        let b = registry.get_or_create("k1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_the_entry() {
        let registry = ChannelRegistry::new(Arc::new(Dispatch::new()));
        registry.get_or_create("k1");
        registry.remove("k1");
        assert!(registry.is_empty());
    }
}
