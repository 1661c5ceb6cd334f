//! Runtime tying the registry, template resolver, stores and mount surface
//! together into the render cycle.

use crate::error::{ReflowError, Result};
use crate::mount::{MountSurface, TargetId};
use crate::node::{ChildSlot, Node, NodeRef};
use crate::registry::{Registry, Teardown};
use crate::store::{Backend, FileBackend, MemoryBackend, Notification, StoreHub};
use crate::template::TemplateResolver;
use crate::types::{clone_properties, Identity, PropValue, WatchPath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Ref, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, trace};

/// Property injected into a child with its parent's identity.
pub const PARENT_HASH_PROP: &str = "parentHash";

/// Property injected into a child with its slot position.
pub const PARENT_INDEX_PROP: &str = "parentIndex";

/// Runtime configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory of the durable tier. `None` keeps durable stores in memory.
    pub durable_path: Option<PathBuf>,

    /// Durable value cache size (number of stores).
    pub cache_size: usize,

    /// Whether to create the durable directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            durable_path: None,
            cache_size: 64,
            create_if_missing: true,
        }
    }
}

/// Removes a pruned node's subscriptions, events and target.
struct Sweep<'a> {
    stores: &'a mut StoreHub,
    surface: &'a mut dyn MountSurface,
}

impl Teardown for Sweep<'_> {
    fn release_subscriptions(&mut self, identity: Identity) {
        let removed = self.stores.clean(identity);
        if removed > 0 {
            trace!(%identity, removed, "released subscriptions");
        }
    }

    fn detach(&mut self, identity: Identity, target: Option<TargetId>) {
        self.surface.detach_all_events(identity);
        if let Some(target) = target {
            self.surface.remove_target(target);
        }
    }
}

/// The render orchestrator.
///
/// Single-threaded. Every method takes `&self` and holds its internal borrows
/// only for the duration of one step, so hooks and store callbacks can call
/// back into the runtime while a render or a store write is in progress.
pub struct Runtime {
    registry: RefCell<Registry>,
    stores: RefCell<StoreHub>,
    surface: RefCell<Box<dyn MountSurface>>,
}

impl Runtime {
    /// Create a runtime with both store tiers held in memory.
    pub fn new(surface: impl MountSurface + 'static) -> Self {
        Self::with_backends(surface, MemoryBackend::new(), MemoryBackend::new())
    }

    /// Create a runtime from configuration.
    pub fn open(config: RuntimeConfig, surface: impl MountSurface + 'static) -> Result<Self> {
        let durable: Box<dyn Backend> = match &config.durable_path {
            Some(path) => Box::new(FileBackend::open_or_create(
                path,
                config.cache_size,
                config.create_if_missing,
            )?),
            None => Box::new(MemoryBackend::new()),
        };

        Ok(Self::from_parts(
            Box::new(surface),
            Box::new(MemoryBackend::new()),
            durable,
        ))
    }

    /// Create a runtime over explicit volatile and durable backends.
    pub fn with_backends(
        surface: impl MountSurface + 'static,
        volatile: impl Backend + 'static,
        durable: impl Backend + 'static,
    ) -> Self {
        Self::from_parts(Box::new(surface), Box::new(volatile), Box::new(durable))
    }

    fn from_parts(
        surface: Box<dyn MountSurface>,
        volatile: Box<dyn Backend>,
        durable: Box<dyn Backend>,
    ) -> Self {
        Self {
            registry: RefCell::new(Registry::new()),
            stores: RefCell::new(StoreHub::new(volatile, durable)),
            surface: RefCell::new(surface),
        }
    }

    /// Read access to the registry.
    pub fn registry(&self) -> Ref<'_, Registry> {
        self.registry.borrow()
    }

    /// Read access to the stores.
    pub fn stores(&self) -> Ref<'_, StoreHub> {
        self.stores.borrow()
    }

    /// Run `f` against the mount surface.
    pub fn with_surface<R>(&self, f: impl FnOnce(&mut dyn MountSurface) -> R) -> R {
        f(self.surface.borrow_mut().as_mut())
    }

    // --- Render Cycle ---

    /// Render `node` and its referenced children if it changed since its
    /// last registration. Returns the node's identity.
    pub fn render(&self, node: &NodeRef) -> Result<Identity> {
        let must_render = self.registry.borrow().check_node(&node.borrow());
        if !must_render {
            if let Some(identity) = node.borrow().identity {
                trace!(%identity, "unchanged, skipping render");
                return Ok(identity);
            }
        }

        // Resolve from copies so computed values may read the node.
        let (template, properties, slots, component) = {
            let n = node.borrow();
            (
                n.template.clone(),
                n.properties.clone(),
                n.child_slots.clone(),
                n.component(),
            )
        };
        let resolver = TemplateResolver::new(&template, &properties, &slots);
        let markup = resolver.parse();
        let used = resolver.used_children();

        let identity = self.registry.borrow_mut().add_node(node, markup.clone());
        let target = self.mount(node, &markup);
        debug!(%identity, component = component.name(), ?target, "rendered");

        let finished = component
            .after_self_mount(self, node)
            .and_then(|_| self.render_children(node, identity, target, &used))
            .and_then(|_| component.after_children_mounted(self, node))
            .and_then(|_| component.on_safe_to_register_events(self, node));

        if let Err(e) = finished {
            // The next render starts over.
            self.registry.borrow_mut().invalidate(identity);
            debug!(%identity, error = %e, "render incomplete");
            return Err(e);
        }
        Ok(identity)
    }

    /// Write `markup` into the node's target, creating a root target if the
    /// node has none yet.
    fn mount(&self, node: &NodeRef, markup: &str) -> TargetId {
        let existing = node.borrow().mount_target;
        let mut surface = self.surface.borrow_mut();
        match existing {
            Some(target) => {
                surface.set_content(target, markup);
                target
            }
            None => {
                let target = surface.create_target(node.borrow().name());
                surface.set_content(target, markup);
                surface.insert_at_root(target);
                node.borrow_mut().mount_target = Some(target);
                target
            }
        }
    }

    fn render_children(
        &self,
        node: &NodeRef,
        identity: Identity,
        target: TargetId,
        used: &[String],
    ) -> Result<()> {
        {
            let mut registry = self.registry.borrow_mut();
            let mut stores = self.stores.borrow_mut();
            let mut surface = self.surface.borrow_mut();
            let mut sweep = Sweep {
                stores: &mut stores,
                surface: surface.as_mut(),
            };
            registry.clean(&node.borrow(), used, &mut sweep);
        }

        let slots = node.borrow().child_slots.clone();
        for (index, (name, slot)) in slots.iter().enumerate() {
            if !used.iter().any(|u| u == name) {
                continue;
            }

            let child = self.child_for(slot, identity, index);
            let child_target = self.child_target(&child);

            {
                let mut surface = self.surface.borrow_mut();
                if let Some(placeholder) = surface.locate_placeholder(target, name) {
                    surface.replace_placeholder(&placeholder, child_target);
                }
            }

            let child_identity = self.render(&child)?;

            if let Some(declared) = node.borrow_mut().child_slots.get_mut(name) {
                declared.identity = Some(child_identity);
            }
            self.registry.borrow_mut().refresh(identity);
        }

        Ok(())
    }

    /// The registered child of a slot, or a fresh instance.
    fn child_for(&self, slot: &ChildSlot, parent: Identity, index: usize) -> NodeRef {
        let existing = slot.identity().and_then(|id| {
            self.registry
                .borrow()
                .find(id)
                .map(|entry| NodeRef::clone(&entry.node))
        });
        if let Some(child) = existing {
            return child;
        }

        let mut props = clone_properties(slot.props());
        props.insert(PARENT_HASH_PROP.to_string(), parent.to_string().into());
        props.insert(PARENT_INDEX_PROP.to_string(), index.into());
        Node::child_of(slot.instantiate(), props, parent, index).into_ref()
    }

    fn child_target(&self, child: &NodeRef) -> TargetId {
        if let Some(target) = child.borrow().mount_target {
            return target;
        }
        let target = self
            .surface
            .borrow_mut()
            .create_target(child.borrow().name());
        child.borrow_mut().mount_target = Some(target);
        target
    }

    // --- Node Mutation ---

    /// Merge properties into `node` and render it.
    pub fn set_properties(
        &self,
        node: &NodeRef,
        props: impl IntoIterator<Item = (String, PropValue)>,
    ) -> Result<Identity> {
        node.borrow_mut().merge_properties(props);
        self.render(node)
    }

    /// Merge properties from a JSON object into `node` and render it.
    ///
    /// Fails with `InvalidArgument` if `props` is not an object.
    pub fn set_properties_json(&self, node: &NodeRef, props: Value) -> Result<Identity> {
        node.borrow_mut().merge_properties_json(props)?;
        self.render(node)
    }

    /// Replace the template of `node` and render it.
    pub fn set_template(&self, node: &NodeRef, template: impl Into<String>) -> Result<Identity> {
        node.borrow_mut().set_template(template);
        self.render(node)
    }

    /// Merge slot declarations into `node` (`None` deletes a slot) and render it.
    pub fn set_child_slots(
        &self,
        node: &NodeRef,
        slots: impl IntoIterator<Item = (String, Option<ChildSlot>)>,
    ) -> Result<Identity> {
        node.borrow_mut().merge_child_slots(slots)?;
        self.render(node)
    }

    /// Tear down `node` and its whole rendered subtree.
    ///
    /// Returns false if the node is not registered.
    pub fn destroy(&self, node: &NodeRef) -> bool {
        let Some(identity) = node.borrow().identity else {
            return false;
        };
        if !self.registry.borrow().contains(identity) {
            return false;
        }

        {
            let mut registry = self.registry.borrow_mut();
            let mut stores = self.stores.borrow_mut();
            let mut surface = self.surface.borrow_mut();
            let mut sweep = Sweep {
                stores: &mut stores,
                surface: surface.as_mut(),
            };
            registry.kill_children(identity, &mut sweep);
        }

        node.borrow_mut().mount_target = None;
        debug!(%identity, "destroyed tree");
        true
    }

    // --- Stores ---

    /// Create and seed stores from `{name: {perm, ...initial}}` definitions.
    pub fn init_stores(&self, definitions: &Value) -> Result<()> {
        let notifications = self.stores.borrow_mut().init_stores(definitions)?;
        self.dispatch(notifications)
    }

    /// Read `path` from `store`.
    pub fn load(&self, store: &str, path: &str) -> Option<Value> {
        self.stores.borrow().load(store, path)
    }

    /// Subscribe a rendered node's `callback` to writes on `store` at `path`
    /// (`"all"` for every write).
    ///
    /// Returns false if the same subscription already exists.
    pub fn register_for_updates(
        &self,
        node: &NodeRef,
        callback: &str,
        store: &str,
        path: impl Into<WatchPath>,
    ) -> Result<bool> {
        let identity = {
            let n = node.borrow();
            n.identity.ok_or_else(|| {
                ReflowError::InvalidArgument(format!(
                    "component {} must be rendered before it can subscribe",
                    n.name()
                ))
            })?
        };

        Ok(self.stores.borrow_mut().register_for_updates(
            identity,
            Rc::downgrade(node),
            callback,
            store,
            path.into(),
        ))
    }

    /// Write `value` at `path` in `store` (`None` replaces the whole value),
    /// persist it, and run every matching callback before returning.
    pub fn save_to_store(&self, store: &str, path: Option<&str>, value: Value) -> Result<()> {
        let notifications = self.stores.borrow_mut().save_to_store(store, path, value)?;
        self.dispatch(notifications)
    }

    /// Invoke callbacks from a snapshot of matching subscriptions. A
    /// subscriber pruned by an earlier callback is skipped.
    fn dispatch(&self, notifications: Vec<Notification>) -> Result<()> {
        for notification in notifications {
            if !self.registry.borrow().contains(notification.subscriber) {
                continue;
            }
            let Some(node) = notification.node() else {
                continue;
            };
            let component = node.borrow().component();
            trace!(subscriber = %notification.subscriber, callback = %notification.callback, "store callback");
            component.on_store_update(&notification.callback, self, &node)?;
        }
        Ok(())
    }
}
