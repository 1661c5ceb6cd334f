//! Registry of rendered nodes.

use crate::mount::TargetId;
use crate::node::{Node, NodeRef};
use crate::types::Identity;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

use super::fingerprint::{snapshot, Snapshot};

/// Collaborators notified while a node is torn down.
pub trait Teardown {
    /// Drop every store subscription owned by `identity`.
    fn release_subscriptions(&mut self, identity: Identity);

    /// Detach every event binding owned by `identity` and drop its mount target.
    fn detach(&mut self, identity: Identity, target: Option<TargetId>);
}

/// A registered node.
pub struct Entry {
    /// The live node.
    pub node: NodeRef,
    /// Markup resolved by the last successful render.
    pub rendered: String,
    /// Fingerprint of the node at its last registration.
    pub snapshot: Snapshot,
    /// Parent identity captured at registration, so scans need no borrow.
    parent: Option<Identity>,
    /// Set when the last render did not complete.
    stale: bool,
}

impl Entry {
    pub fn parent(&self) -> Option<Identity> {
        self.parent
    }
}

/// Identity table and change detector for the component tree.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<Identity, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `node` with its resolved markup.
    ///
    /// Assigns an identity on first registration. The parent's snapshot is
    /// refreshed so a change to this child shows up in the parent's next
    /// check.
    pub fn add_node(&mut self, node: &NodeRef, rendered: String) -> Identity {
        let (identity, parent, snapshot) = {
            let mut node = node.borrow_mut();
            let identity = match node.identity {
                Some(identity) => identity,
                None => {
                    let identity = Identity::generate();
                    node.identity = Some(identity);
                    trace!(%identity, component = node.name(), "assigned identity");
                    identity
                }
            };
            (identity, node.parent_identity, snapshot(&node))
        };

        self.entries.insert(
            identity,
            Entry {
                node: NodeRef::clone(node),
                rendered,
                snapshot,
                parent,
                stale: false,
            },
        );

        if let Some(parent) = parent {
            self.refresh(parent);
        }

        identity
    }

    /// Force the next check of `identity` to report a change, until it is
    /// registered again. Returns false if it is not registered.
    pub fn invalidate(&mut self, identity: Identity) -> bool {
        match self.entries.get_mut(&identity) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    /// Re-snapshot a registered node. Returns false if it is not registered.
    pub fn refresh(&mut self, identity: Identity) -> bool {
        match self.entries.get_mut(&identity) {
            Some(entry) => {
                entry.snapshot = snapshot(&entry.node.borrow());
                true
            }
            None => false,
        }
    }

    /// Whether `node` must render: unregistered, invalidated, or changed
    /// since last registration.
    pub fn check_node(&self, node: &Node) -> bool {
        match node.identity.and_then(|identity| self.entries.get(&identity)) {
            Some(entry) => entry.stale || entry.snapshot != snapshot(node),
            None => true,
        }
    }

    /// Remove one entry, detaching its events. Absent identities are ignored.
    pub fn remove_node(&mut self, identity: Identity, teardown: &mut dyn Teardown) {
        if let Some(entry) = self.entries.remove(&identity) {
            let target = entry.node.try_borrow().ok().and_then(|n| n.mount_target);
            teardown.detach(identity, target);
        }
    }

    pub fn find(&self, identity: Identity) -> Option<&Entry> {
        self.entries.get(&identity)
    }

    /// Markup of the last render of `identity`.
    pub fn rendered(&self, identity: Identity) -> Option<&str> {
        self.entries.get(&identity).map(|e| e.rendered.as_str())
    }

    pub fn contains(&self, identity: Identity) -> bool {
        self.entries.contains_key(&identity)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities whose parent is `parent`.
    ///
    /// Scans every entry.
    pub fn find_children(&self, parent: Identity) -> Vec<Identity> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.parent == Some(parent))
            .map(|(identity, _)| *identity)
            .collect()
    }

    /// Kill every registered child of `node` whose slot is not in `active`.
    ///
    /// Returns the identities of the removed subtree roots.
    pub fn clean(
        &mut self,
        node: &Node,
        active: &[String],
        teardown: &mut dyn Teardown,
    ) -> Vec<Identity> {
        let Some(identity) = node.identity else {
            return Vec::new();
        };

        let still_referenced: HashSet<Identity> = node
            .child_slots
            .iter()
            .filter(|(name, _)| active.iter().any(|a| a == name))
            .filter_map(|(_, slot)| slot.identity())
            .collect();

        let diff: Vec<Identity> = self
            .find_children(identity)
            .into_iter()
            .filter(|child| !still_referenced.contains(child))
            .collect();

        for child in &diff {
            self.kill_children(*child, teardown);
        }

        if !diff.is_empty() {
            debug!(%identity, removed = diff.len(), "pruned unreferenced children");
        }
        diff
    }

    /// Tear down `identity` and its whole subtree.
    pub fn kill_children(&mut self, identity: Identity, teardown: &mut dyn Teardown) {
        if !self.contains(identity) {
            return;
        }

        let children = self.find_children(identity);

        teardown.release_subscriptions(identity);
        self.remove_node(identity, teardown);
        trace!(%identity, "removed node");

        for child in children {
            self.kill_children(child, teardown);
        }
    }
}
