//! Shared lookup cache.
//!
//! One [`TtlCache`] is shared by every adapter. Keys are namespaced by
//! [`CacheClass`], and each class has its own default lifetime: channel
//! identities rarely change, liveness must stay fresh across a multi-step
//! clip flow, and chat room ids live as long as a broadcast session.

mod ttl;

pub use ttl::TtlCache;

use std::time::Duration;

use crate::platforms::ChannelIdentity;

/// Semantic class of a cached lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheClass {
    Identity,
    Liveness,
    ChatRoom,
}

impl CacheClass {
    fn prefix(self) -> &'static str {
        match self {
            CacheClass::Identity => "identity",
            CacheClass::Liveness => "live",
            CacheClass::ChatRoom => "chat-room",
        }
    }

    /// Namespaced cache key for `id`.
    pub fn key(self, id: &str) -> String {
        format!("{}:{}", self.prefix(), id.to_lowercase())
    }
}

/// Default lifetimes per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub identity: Duration,
    pub liveness: Duration,
    pub chat_room: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            identity: Duration::from_secs(6 * 60 * 60),
            liveness: Duration::from_secs(30),
            chat_room: Duration::from_secs(5 * 60),
        }
    }
}

impl CacheTtls {
    pub fn for_class(&self, class: CacheClass) -> Duration {
        match class {
            CacheClass::Identity => self.identity,
            CacheClass::Liveness => self.liveness,
            CacheClass::ChatRoom => self.chat_room,
        }
    }
}

/// Values stored in the shared cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Identity(ChannelIdentity),
    Liveness(bool),
    ChatRoom(String),
}

/// Typed access to the shared cache.
#[derive(Clone, Default)]
pub struct LookupCache {
    inner: TtlCache<CachedValue>,
    ttls: CacheTtls,
}

impl LookupCache {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            inner: TtlCache::new(),
            ttls,
        }
    }

    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    pub fn identity(&self, name: &str) -> Option<ChannelIdentity> {
        match self.inner.get(&CacheClass::Identity.key(name))? {
            CachedValue::Identity(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn store_identity(&self, name: &str, identity: ChannelIdentity) {
        self.store(CacheClass::Identity, name, CachedValue::Identity(identity));
    }

    pub fn liveness(&self, id: &str) -> Option<bool> {
        match self.inner.get(&CacheClass::Liveness.key(id))? {
            CachedValue::Liveness(live) => Some(live),
            _ => None,
        }
    }

    pub fn store_liveness(&self, id: &str, live: bool) {
        self.store(CacheClass::Liveness, id, CachedValue::Liveness(live));
    }

    pub fn chat_room(&self, key: &str) -> Option<String> {
        match self.inner.get(&CacheClass::ChatRoom.key(key))? {
            CachedValue::ChatRoom(room) => Some(room),
            _ => None,
        }
    }

    pub fn store_chat_room(&self, key: &str, room: String) {
        self.store(CacheClass::ChatRoom, key, CachedValue::ChatRoom(room));
    }

    pub fn invalidate(&self, class: CacheClass, id: &str) -> bool {
        self.inner.invalidate(&class.key(id))
    }

    /// The underlying store, for sweeping and inspection.
    pub fn raw(&self) -> &TtlCache<CachedValue> {
        &self.inner
    }

    fn store(&self, class: CacheClass, id: &str, value: CachedValue) {
        self.inner
            .set(class.key(id), value, self.ttls.for_class(class));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_keys_are_namespaced_and_lowercased() {
        assert_eq!(CacheClass::Identity.key("Alice"), "identity:alice");
        assert_eq!(CacheClass::Liveness.key("123"), "live:123");
        assert_eq!(CacheClass::ChatRoom.key("UCx"), "chat-room:ucx");
    }

    #[tokio::test(start_paused = true)]
    async fn test_classes_use_their_own_lifetimes() {
        let cache = LookupCache::new(CacheTtls {
            identity: Duration::from_secs(3600),
            liveness: Duration::from_secs(30),
            chat_room: Duration::from_secs(300),
        });

        let identity = ChannelIdentity {
            id: "42".into(),
            login: "alice".into(),
            display_name: "Alice".into(),
        };
        cache.store_identity("alice", identity.clone());
        cache.store_liveness("42", true);
        cache.store_chat_room("alice", "chat-1".into());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.liveness("42"), None);
        assert_eq!(cache.chat_room("alice").as_deref(), Some("chat-1"));
        assert_eq!(cache.identity("ALICE"), Some(identity));

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(cache.chat_room("alice"), None);
        assert!(cache.identity("alice").is_some());
    }

    #[tokio::test]
    async fn test_invalidate_chat_room() {
        let cache = LookupCache::default();
        cache.store_chat_room("video:abc", "chat-1".into());

        assert!(cache.invalidate(CacheClass::ChatRoom, "video:abc"));
        assert_eq!(cache.chat_room("video:abc"), None);
    }
}
