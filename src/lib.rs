//! # Reflow
//!
//! A reconciliation engine for trees of template-driven components.
//!
//! ## Core Concepts
//!
//! - **Nodes**: Component instances holding a template, properties, and named child slots
//! - **Registry**: Identity table that fingerprints nodes so unchanged ones skip rendering
//! - **Templates**: `${name}` placeholders resolved from properties; slot names are left for mounting
//! - **Stores**: Named JSON values in a volatile or durable tier, with path subscriptions
//! - **Mount surface**: Where resolved markup and child wrappers are attached
//!
//! ## Example
//!
//! ```ignore
//! use reflow::{MemorySurface, Node, Runtime};
//! use serde_json::json;
//!
//! let surface = MemorySurface::new();
//! let runtime = Runtime::new(surface.clone());
//!
//! let app = Node::new(Rc::new(App), Properties::new())
//!     .with_property("title", "Hello")
//!     .with_child("list", ChildSlot::new(|| Rc::new(List)))
//!     .into_ref();
//! runtime.render(&app)?;
//!
//! runtime.init_stores(&json!({"prefs": {"perm": true, "theme": "dark"}}))?;
//! runtime.register_for_updates(&app, "onThemeChange", "prefs", "theme")?;
//! runtime.save_to_store("prefs", Some("theme"), json!("light"))?;
//! ```

pub mod error;
pub mod mount;
pub mod node;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod template;
pub mod types;

// Re-exports
pub use error::{ReflowError, Result};
pub use mount::{MemorySurface, MountSurface, Placeholder, TargetId};
pub use node::{ChildSlot, ChildSlots, Component, Factory, Node, NodeRef};
pub use registry::{snapshot, Entry, Registry, Snapshot, Teardown};
pub use runtime::{Runtime, RuntimeConfig, PARENT_HASH_PROP, PARENT_INDEX_PROP};
pub use store::{
    Backend, FileBackend, MemoryBackend, Notification, StoreHub, StoreState, Subscription,
    PERM_KEY,
};
pub use template::TemplateResolver;
pub use types::*;
