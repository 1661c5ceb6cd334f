//! Component nodes and child slot declarations.

use crate::error::{ReflowError, Result};
use crate::mount::TargetId;
use crate::runtime::Runtime;
use crate::types::{Identity, PropValue, Properties};
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a node.
///
/// The application owns root nodes; the registry keeps child nodes alive
/// for as long as they are registered.
pub type NodeRef = Rc<RefCell<Node>>;

/// Builds the component behind a child slot.
pub type Factory = Rc<dyn Fn() -> Rc<dyn Component>>;

/// Application-defined behavior of a node.
///
/// Hooks run with no borrow held on the node, so they may freely call back
/// into the runtime (set properties, render, write stores).
pub trait Component {
    /// Name given to the wrapper target of this component.
    fn name(&self) -> &str;

    /// Template with `${name}` placeholders.
    fn template(&self) -> String;

    /// Called once the node's own markup has been mounted.
    fn after_self_mount(&self, _runtime: &Runtime, _node: &NodeRef) -> Result<()> {
        Ok(())
    }

    /// Called after every referenced child has been rendered.
    fn after_children_mounted(&self, _runtime: &Runtime, _node: &NodeRef) -> Result<()> {
        Ok(())
    }

    /// Called last in a render cycle, once the whole subtree is mounted.
    fn on_safe_to_register_events(&self, _runtime: &Runtime, _node: &NodeRef) -> Result<()> {
        Ok(())
    }

    /// Named callback invoked when a watched store path changes.
    fn on_store_update(&self, callback: &str, _runtime: &Runtime, _node: &NodeRef) -> Result<()> {
        tracing::debug!(component = self.name(), callback, "store callback not handled");
        Ok(())
    }
}

/// Declaration of a named child slot.
#[derive(Clone)]
pub struct ChildSlot {
    factory: Factory,
    props: Properties,
    pub(crate) identity: Option<Identity>,
}

impl ChildSlot {
    /// Declare a slot whose child is built by `factory`.
    pub fn new(factory: impl Fn() -> Rc<dyn Component> + 'static) -> Self {
        Self {
            factory: Rc::new(factory),
            props: Properties::new(),
            identity: None,
        }
    }

    /// Static properties handed to the child when it is first created.
    pub fn with_props(mut self, props: Properties) -> Self {
        self.props = props;
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn props(&self) -> &Properties {
        &self.props
    }

    /// Identity of the child last rendered into this slot.
    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    pub(crate) fn instantiate(&self) -> Rc<dyn Component> {
        (self.factory)()
    }
}

impl fmt::Debug for ChildSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildSlot")
            .field("props", &self.props)
            .field("identity", &self.identity)
            .finish()
    }
}

/// Child slots in declaration order.
#[derive(Clone, Debug, Default)]
pub struct ChildSlots {
    slots: Vec<(String, ChildSlot)>,
}

impl ChildSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ChildSlot> {
        self.slots.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ChildSlot> {
        self.slots.iter_mut().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert a slot, keeping the position of an existing slot of the same name.
    pub fn insert(&mut self, name: impl Into<String>, slot: ChildSlot) {
        let name = name.into();
        match self.get_mut(&name) {
            Some(existing) => *existing = slot,
            None => self.slots.push((name, slot)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ChildSlot> {
        let pos = self.slots.iter().position(|(n, _)| n == name)?;
        Some(self.slots.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChildSlot)> {
        self.slots.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A component instance in the tree.
pub struct Node {
    pub(crate) identity: Option<Identity>,
    pub(crate) component: Rc<dyn Component>,
    pub(crate) template: String,
    pub(crate) properties: Properties,
    pub(crate) child_slots: ChildSlots,
    pub(crate) parent_identity: Option<Identity>,
    pub(crate) parent_index: usize,
    pub(crate) mount_target: Option<TargetId>,
}

impl Node {
    /// Create a root node.
    pub fn new(component: Rc<dyn Component>, properties: Properties) -> Self {
        let template = component.template();
        Self {
            identity: None,
            component,
            template,
            properties,
            child_slots: ChildSlots::new(),
            parent_identity: None,
            parent_index: 0,
            mount_target: None,
        }
    }

    /// Create a node mounted into slot `index` of `parent`.
    pub(crate) fn child_of(
        component: Rc<dyn Component>,
        properties: Properties,
        parent: Identity,
        index: usize,
    ) -> Self {
        let mut node = Self::new(component, properties);
        node.parent_identity = Some(parent);
        node.parent_index = index;
        node
    }

    pub fn with_child(mut self, name: impl Into<String>, slot: ChildSlot) -> Self {
        self.child_slots.insert(name, slot);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn into_ref(self) -> NodeRef {
        Rc::new(RefCell::new(self))
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    pub fn component(&self) -> Rc<dyn Component> {
        Rc::clone(&self.component)
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropValue> {
        self.properties.get(key)
    }

    pub fn child_slots(&self) -> &ChildSlots {
        &self.child_slots
    }

    pub fn parent_identity(&self) -> Option<Identity> {
        self.parent_identity
    }

    pub fn parent_index(&self) -> usize {
        self.parent_index
    }

    pub fn mount_target(&self) -> Option<TargetId> {
        self.mount_target
    }

    /// Replace the template. Slots it no longer references are pruned on
    /// the next render.
    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
    }

    /// Merge properties into the existing mapping.
    pub fn merge_properties(&mut self, props: impl IntoIterator<Item = (String, PropValue)>) {
        self.properties.extend(props);
    }

    /// Merge properties from a JSON object.
    pub fn merge_properties_json(&mut self, props: Value) -> Result<()> {
        match props {
            Value::Object(map) => {
                self.merge_properties(map.into_iter().map(|(k, v)| (k, PropValue::Literal(v))));
                Ok(())
            }
            other => Err(ReflowError::InvalidArgument(format!(
                "properties must be a mapping of key value pairs, got {}",
                other
            ))),
        }
    }

    /// Merge slot declarations; `None` deletes the slot.
    ///
    /// All names are validated before anything is applied.
    pub fn merge_child_slots(
        &mut self,
        slots: impl IntoIterator<Item = (String, Option<ChildSlot>)>,
    ) -> Result<()> {
        let slots: Vec<_> = slots.into_iter().collect();
        if let Some((name, _)) = slots.iter().find(|(name, _)| !is_slot_name(name)) {
            return Err(ReflowError::InvalidArgument(format!(
                "invalid child slot name {:?}",
                name
            )));
        }

        for (name, slot) in slots {
            match slot {
                Some(slot) => self.child_slots.insert(name, slot),
                None => {
                    self.child_slots.remove(&name);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("identity", &self.identity)
            .field("parent_identity", &self.parent_identity)
            .field("parent_index", &self.parent_index)
            .field("child_slots", &self.child_slots)
            .finish()
    }
}

/// A slot name must be addressable by a `${name}` placeholder.
fn is_slot_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('}')
}
