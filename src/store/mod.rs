//! Path-addressed shared stores with change subscriptions.
//!
//! Each store is a JSON value persisted to one of two tiers (volatile or
//! durable) on every write. Components subscribe to a path within a store,
//! to whole-value replacement, or to every write (`"all"`). A write reports
//! the subscriptions it matched in insertion order.
//!
//! # Example
//!
//! ```ignore
//! let mut hub = StoreHub::new(Box::new(MemoryBackend::new()), Box::new(MemoryBackend::new()));
//! hub.init_stores(&json!({"prefs": {"perm": true, "theme": "dark"}}))?;
//!
//! hub.register_for_updates(identity, weak_node, "onThemeChange", "prefs", "theme".into());
//! for notification in hub.save_to_store("prefs", Some("theme"), json!("light"))? {
//!     // invoke notification.callback on notification.node()
//! }
//! ```

mod backend;
mod hub;
pub mod path;
mod types;

pub use backend::{Backend, FileBackend, MemoryBackend};
pub use hub::StoreHub;
pub use types::{Notification, StoreState, Subscription, PERM_KEY};
