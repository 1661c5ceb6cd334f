//! Subscription types for store change notification.

use crate::node::{Node, NodeRef};
use crate::types::{Identity, Tier, WatchPath};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Weak;

/// Key under which a store definition declares its tier.
pub const PERM_KEY: &str = "perm";

/// In-memory state of one named store.
#[derive(Clone, Debug)]
pub struct StoreState {
    pub tier: Tier,
    pub value: Value,
}

/// A component's interest in writes to one store.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub subscriber: Identity,
    pub callback: String,
    pub store: String,
    pub path: WatchPath,
    pub(crate) node: Weak<RefCell<Node>>,
}

impl Subscription {
    /// Value equality on (subscriber, callback, store, path).
    pub fn same_as(&self, other: &Subscription) -> bool {
        self.subscriber == other.subscriber
            && self.callback == other.callback
            && self.store == other.store
            && self.path == other.path
    }
}

/// A callback to invoke after a store write.
#[derive(Clone, Debug)]
pub struct Notification {
    pub subscriber: Identity,
    pub callback: String,
    node: Weak<RefCell<Node>>,
}

impl Notification {
    /// The subscribed node, if it is still alive.
    pub fn node(&self) -> Option<NodeRef> {
        self.node.upgrade()
    }
}

impl From<&Subscription> for Notification {
    fn from(sub: &Subscription) -> Self {
        Self {
            subscriber: sub.subscriber,
            callback: sub.callback.clone(),
            node: Weak::clone(&sub.node),
        }
    }
}
