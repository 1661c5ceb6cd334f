//! Named stores, subscriptions and change notification.

use crate::error::{ReflowError, Result};
use crate::node::Node;
use crate::types::{Identity, Tier, WatchPath};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;
use tracing::debug;

use super::backend::Backend;
use super::path;
use super::types::{Notification, StoreState, Subscription, PERM_KEY};

/// Owns every named store and the subscriptions on them.
///
/// Writes return the notifications they trigger instead of invoking
/// callbacks, so the caller can dispatch them with no borrow held on the hub.
pub struct StoreHub {
    stores: HashMap<String, StoreState>,
    /// Subscriptions per store, in insertion order.
    subscriptions: HashMap<String, Vec<Subscription>>,
    volatile: Box<dyn Backend>,
    durable: Box<dyn Backend>,
}

impl StoreHub {
    pub fn new(volatile: Box<dyn Backend>, durable: Box<dyn Backend>) -> Self {
        Self {
            stores: HashMap::new(),
            subscriptions: HashMap::new(),
            volatile,
            durable,
        }
    }

    fn backend(&self, tier: Tier) -> &dyn Backend {
        match tier {
            Tier::Volatile => self.volatile.as_ref(),
            Tier::Durable => self.durable.as_ref(),
        }
    }

    /// Create every store in `definitions` and seed the ones whose backing
    /// was empty.
    ///
    /// Each definition is an object; its `perm` flag selects the durable tier
    /// and stays part of the seeded value.
    pub fn init_stores(&mut self, definitions: &Value) -> Result<Vec<Notification>> {
        let definitions = definitions.as_object().ok_or_else(|| {
            ReflowError::InvalidArgument("store definitions must be a mapping".into())
        })?;

        let mut notifications = Vec::new();
        for (name, definition) in definitions {
            if !definition.is_object() {
                return Err(ReflowError::InvalidArgument(format!(
                    "definition of store {:?} must be a mapping",
                    name
                )));
            }
            let perm = definition
                .get(PERM_KEY)
                .and_then(Value::as_bool)
                .unwrap_or(false);

            if self.create_store(name, Tier::from_perm(perm))? {
                notifications.extend(self.save_to_store(name, None, definition.clone())?);
            }
        }
        Ok(notifications)
    }

    /// Create a store, loading its value from the backing tier.
    ///
    /// An existing store keeps its tier. A value already held by the backing
    /// replaces the in-memory value; otherwise the backing is initialised to
    /// an empty object. Returns true if the backing was empty.
    pub fn create_store(&mut self, name: &str, tier: Tier) -> Result<bool> {
        let tier = self
            .stores
            .entry(name.to_string())
            .or_insert_with(|| StoreState {
                tier,
                value: Value::Object(Map::new()),
            })
            .tier;

        match self.backend(tier).get(name)? {
            Some(raw) => {
                let value: Value = serde_json::from_str(&raw)
                    .map_err(|e| ReflowError::Deserialization(e.to_string()))?;
                if let Some(state) = self.stores.get_mut(name) {
                    state.value = value;
                }
                debug!(store = name, ?tier, "loaded store from backing");
                Ok(false)
            }
            None => {
                self.backend(tier).set(name, "{}")?;
                debug!(store = name, ?tier, "created empty store");
                Ok(true)
            }
        }
    }

    /// Read `path` from a store. `None` if the store, the path or the value is absent.
    pub fn load(&self, store: &str, path: &str) -> Option<Value> {
        let state = self.stores.get(store)?;
        match path::get(&state.value, path) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.clone()),
        }
    }

    /// The whole value of a store.
    pub fn value(&self, store: &str) -> Option<&Value> {
        self.stores.get(store).map(|s| &s.value)
    }

    pub fn tier(&self, store: &str) -> Option<Tier> {
        self.stores.get(store).map(|s| s.tier)
    }

    /// Subscribe `subscriber` to writes on `store` matching `path`.
    ///
    /// Returns false if an equal subscription already exists.
    pub fn register_for_updates(
        &mut self,
        subscriber: Identity,
        node: Weak<RefCell<Node>>,
        callback: &str,
        store: &str,
        path: WatchPath,
    ) -> bool {
        let subscription = Subscription {
            subscriber,
            callback: callback.to_string(),
            store: store.to_string(),
            path,
            node,
        };

        let subs = self.subscriptions.entry(store.to_string()).or_default();
        if subs.iter().any(|s| s.same_as(&subscription)) {
            return false;
        }
        subs.push(subscription);
        true
    }

    /// Write `value` at `path` (`None` replaces the whole store), persist the
    /// store to its tier, and return the notifications to dispatch.
    ///
    /// The returned list is taken before any callback runs.
    pub fn save_to_store(
        &mut self,
        store: &str,
        path: Option<&str>,
        value: Value,
    ) -> Result<Vec<Notification>> {
        let state = self
            .stores
            .get_mut(store)
            .ok_or_else(|| ReflowError::StoreNotFound(store.to_string()))?;

        match path {
            None => state.value = value,
            Some(p) => path::set(&mut state.value, p, value)?,
        }

        let tier = state.tier;
        let raw = serde_json::to_string(&state.value)?;
        self.backend(tier).set(store, &raw)?;

        let notifications: Vec<Notification> = self
            .subscriptions
            .get(store)
            .map(|subs| {
                subs.iter()
                    .filter(|s| s.path.matches(path))
                    .map(Notification::from)
                    .collect()
            })
            .unwrap_or_default();

        debug!(store, ?path, ?tier, notified = notifications.len(), "saved store");
        Ok(notifications)
    }

    /// Remove every subscription owned by `identity`. Returns how many were removed.
    pub fn clean(&mut self, identity: Identity) -> usize {
        let mut removed = 0;
        for subs in self.subscriptions.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.subscriber != identity);
            removed += before - subs.len();
        }
        removed
    }

    /// Subscriptions on `store`, in insertion order.
    pub fn subscriptions(&self, store: &str) -> &[Subscription] {
        self.subscriptions
            .get(store)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use serde_json::json;

    fn hub() -> (StoreHub, MemoryBackend, MemoryBackend) {
        let volatile = MemoryBackend::new();
        let durable = MemoryBackend::new();
        let hub = StoreHub::new(Box::new(volatile.clone()), Box::new(durable.clone()));
        (hub, volatile, durable)
    }

    fn subscribe(hub: &mut StoreHub, who: Identity, callback: &str, path: &str) -> bool {
        hub.register_for_updates(who, Weak::new(), callback, "prefs", WatchPath::from(path))
    }

    fn callbacks(notifications: &[Notification]) -> Vec<&str> {
        notifications.iter().map(|n| n.callback.as_str()).collect()
    }

    #[test]
    fn test_init_and_load() {
        let (mut hub, _, _) = hub();
        hub.init_stores(&json!({"prefs": {"perm": true, "theme": "dark"}}))
            .unwrap();

        assert_eq!(hub.load("prefs", "theme"), Some(json!("dark")));
        assert_eq!(hub.load("prefs", "perm"), Some(json!(true)));
        assert_eq!(hub.load("prefs", "missing"), None);
        assert_eq!(hub.load("nope", "theme"), None);
        assert_eq!(hub.tier("prefs"), Some(Tier::Durable));
    }

    #[test]
    fn test_save_rejects_runaway_index() {
        let (mut hub, volatile, _) = hub();
        hub.init_stores(&json!({"feed": {"list": []}})).unwrap();
        let who = Identity::generate();
        hub.register_for_updates(who, Weak::new(), "onAny", "feed", WatchPath::All);

        let result = hub.save_to_store("feed", Some("list.18446744073709551615"), json!(1));
        assert!(matches!(result, Err(ReflowError::InvalidArgument(_))));
        assert_eq!(hub.value("feed"), Some(&json!({"list": []})));
        let raw = volatile.get("feed").unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Value>(&raw).unwrap(), json!({"list": []}));
    }

    #[test]
    fn test_init_does_not_reseed_existing_backing() {
        let (mut hub, _, durable) = hub();
        durable.set("prefs", r#"{"perm":true,"theme":"light"}"#).unwrap();

        hub.init_stores(&json!({"prefs": {"perm": true, "theme": "dark"}}))
            .unwrap();
        assert_eq!(hub.load("prefs", "theme"), Some(json!("light")));
    }

    #[test]
    fn test_volatile_store_stays_out_of_durable_tier() {
        let (mut hub, volatile, durable) = hub();
        hub.init_stores(&json!({"session": {"perm": false, "token": "t"}}))
            .unwrap();
        hub.save_to_store("session", Some("token"), json!("u")).unwrap();

        assert!(volatile.contains("session"));
        assert!(!durable.contains("session"));
        let raw = volatile.get("session").unwrap().unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["token"], "u");
    }

    #[test]
    fn test_create_store_is_idempotent() {
        let (mut hub, _, _) = hub();
        assert!(hub.create_store("prefs", Tier::Durable).unwrap());
        hub.save_to_store("prefs", Some("a"), json!(1)).unwrap();

        // Backing now holds a value, which wins over memory.
        assert!(!hub.create_store("prefs", Tier::Volatile).unwrap());
        assert_eq!(hub.load("prefs", "a"), Some(json!(1)));
        assert_eq!(hub.tier("prefs"), Some(Tier::Durable));
    }

    #[test]
    fn test_notify_exact_path_and_all() {
        let (mut hub, _, _) = hub();
        hub.init_stores(&json!({"prefs": {"perm": true}})).unwrap();

        let who = Identity::generate();
        subscribe(&mut hub, who, "onTheme", "theme");
        subscribe(&mut hub, who, "onLang", "lang");
        subscribe(&mut hub, who, "onAny", "all");

        let sent = hub.save_to_store("prefs", Some("theme"), json!("light")).unwrap();
        assert_eq!(callbacks(&sent), vec!["onTheme", "onAny"]);

        let sent = hub.save_to_store("prefs", Some("lang"), json!("de")).unwrap();
        assert_eq!(callbacks(&sent), vec!["onLang", "onAny"]);

        let sent = hub.save_to_store("prefs", None, json!({})).unwrap();
        assert_eq!(callbacks(&sent), vec!["onAny"]);
    }

    #[test]
    fn test_whole_value_watch() {
        let (mut hub, _, _) = hub();
        hub.init_stores(&json!({"prefs": {}})).unwrap();
        hub.register_for_updates(
            Identity::generate(),
            Weak::new(),
            "onReset",
            "prefs",
            WatchPath::Whole,
        );

        assert!(hub.save_to_store("prefs", Some("x"), json!(1)).unwrap().is_empty());
        let sent = hub.save_to_store("prefs", None, json!({})).unwrap();
        assert_eq!(callbacks(&sent), vec!["onReset"]);
    }

    #[test]
    fn test_save_without_subscribers() {
        let (mut hub, _, _) = hub();
        hub.init_stores(&json!({"prefs": {}})).unwrap();
        let sent = hub.save_to_store("prefs", Some("a.b"), json!(2)).unwrap();
        assert!(sent.is_empty());
        assert_eq!(hub.load("prefs", "a.b"), Some(json!(2)));
    }

    #[test]
    fn test_save_to_unknown_store() {
        let (mut hub, _, _) = hub();
        let result = hub.save_to_store("nope", None, json!({}));
        assert!(matches!(result, Err(ReflowError::StoreNotFound(_))));
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let (mut hub, _, _) = hub();
        let who = Identity::generate();
        assert!(subscribe(&mut hub, who, "cb", "theme"));
        assert!(!subscribe(&mut hub, who, "cb", "theme"));
        assert!(subscribe(&mut hub, who, "cb", "lang"));
        assert_eq!(hub.subscription_count(), 2);
    }

    #[test]
    fn test_clean_removes_only_subscriber() {
        let (mut hub, _, _) = hub();
        let a = Identity::generate();
        let b = Identity::generate();
        subscribe(&mut hub, a, "cb", "theme");
        subscribe(&mut hub, b, "cb", "theme");
        hub.register_for_updates(a, Weak::new(), "cb", "other", WatchPath::All);

        assert_eq!(hub.clean(a), 2);
        assert_eq!(hub.subscription_count(), 1);
        assert_eq!(hub.subscriptions("prefs")[0].subscriber, b);
    }

    #[test]
    fn test_init_rejects_non_mapping() {
        let (mut hub, _, _) = hub();
        assert!(matches!(
            hub.init_stores(&json!([1])),
            Err(ReflowError::InvalidArgument(_))
        ));
        assert!(matches!(
            hub.init_stores(&json!({"prefs": 3})),
            Err(ReflowError::InvalidArgument(_))
        ));
    }
}
