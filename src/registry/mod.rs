//! Node registry: identity assignment, change detection and subtree pruning.
//!
//! Every rendered node has an entry keyed by its [`Identity`](crate::Identity)
//! holding the node, the markup it last resolved to and a fingerprint of its
//! state at that moment. A render proceeds only when a fresh fingerprint
//! differs from the stored one.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::new();
//!
//! if registry.check_node(&node.borrow()) {
//!     let identity = registry.add_node(&node, markup);
//!     // mount, then recurse into children
//! }
//! ```

mod fingerprint;
mod manager;

pub use fingerprint::{snapshot, Snapshot};
pub use manager::{Entry, Registry, Teardown};
