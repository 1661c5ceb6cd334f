//! In-memory mount surface.

use crate::template::token;
use crate::types::Identity;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::warn;

use super::{MountSurface, Placeholder, TargetId};

/// A piece of a target's content.
#[derive(Clone, Debug)]
enum Segment {
    Text(String),
    Child(TargetId),
}

struct Target {
    name: String,
    segments: Vec<Segment>,
    parent: Option<TargetId>,
}

#[derive(Default)]
struct SurfaceState {
    next_id: u64,
    targets: HashMap<TargetId, Target>,
    roots: Vec<TargetId>,
    events: HashMap<Identity, Vec<String>>,
    /// Number of content writes, for observing render work.
    writes: usize,
}

impl SurfaceState {
    /// Unhook `target` from its parent or the root list.
    fn detach(&mut self, target: TargetId) {
        self.roots.retain(|r| *r != target);
        let parent = self.targets.get_mut(&target).and_then(|t| t.parent.take());
        if let Some(parent) = parent.and_then(|p| self.targets.get_mut(&p)) {
            parent
                .segments
                .retain(|s| !matches!(s, Segment::Child(c) if *c == target));
        }
    }

    fn locate(&self, within: TargetId, slot: &str) -> Option<usize> {
        let token = token(slot);
        self.targets
            .get(&within)?
            .segments
            .iter()
            .position(|s| matches!(s, Segment::Text(t) if t.contains(&token)))
    }

    /// Whether `ancestor` is `target` or one of its parents.
    fn is_ancestor(&self, ancestor: TargetId, target: TargetId) -> bool {
        let mut current = Some(target);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.targets.get(&id).and_then(|t| t.parent);
        }
        false
    }

    fn write_content(&self, id: TargetId, out: &mut String) {
        if let Some(target) = self.targets.get(&id) {
            for segment in &target.segments {
                match segment {
                    Segment::Text(text) => out.push_str(text),
                    Segment::Child(child) => self.write_markup(*child, out),
                }
            }
        }
    }

    fn write_markup(&self, id: TargetId, out: &mut String) {
        if let Some(target) = self.targets.get(&id) {
            out.push_str(&format!("<div class=\"{}\">", target.name));
            self.write_content(id, out);
            out.push_str("</div>");
        }
    }
}

/// Mount surface holding a tree of wrapper targets in memory.
///
/// Each target's content is a list of text runs and mounted child targets.
/// Clones share the same tree.
#[derive(Clone, Default)]
pub struct MemorySurface {
    state: Rc<RefCell<SurfaceState>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattened markup of every root, in root order.
    pub fn markup(&self) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        for root in &state.roots {
            state.write_markup(*root, &mut out);
        }
        out
    }

    /// Flattened markup of one target including its wrapper.
    pub fn target_markup(&self, target: TargetId) -> Option<String> {
        let state = self.state.borrow();
        state.targets.get(&target)?;
        let mut out = String::new();
        state.write_markup(target, &mut out);
        Some(out)
    }

    /// Flattened content of one target, without its wrapper.
    pub fn content(&self, target: TargetId) -> Option<String> {
        let state = self.state.borrow();
        state.targets.get(&target)?;
        let mut out = String::new();
        state.write_content(target, &mut out);
        Some(out)
    }

    pub fn roots(&self) -> Vec<TargetId> {
        self.state.borrow().roots.clone()
    }

    pub fn parent_of(&self, target: TargetId) -> Option<TargetId> {
        self.state.borrow().targets.get(&target)?.parent
    }

    pub fn target_count(&self) -> usize {
        self.state.borrow().targets.len()
    }

    /// Number of `set_content` calls so far.
    pub fn writes(&self) -> usize {
        self.state.borrow().writes
    }

    /// Record an event binding owned by `identity`.
    pub fn bind_event(&self, identity: Identity, event: impl Into<String>) {
        self.state
            .borrow_mut()
            .events
            .entry(identity)
            .or_default()
            .push(event.into());
    }

    /// Event bindings owned by `identity`.
    pub fn events(&self, identity: Identity) -> Vec<String> {
        self.state
            .borrow()
            .events
            .get(&identity)
            .cloned()
            .unwrap_or_default()
    }
}

impl MountSurface for MemorySurface {
    fn create_target(&mut self, name: &str) -> TargetId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = TargetId(state.next_id);
        state.targets.insert(
            id,
            Target {
                name: name.to_string(),
                segments: Vec::new(),
                parent: None,
            },
        );
        id
    }

    fn set_content(&mut self, target: TargetId, markup: &str) {
        let mut state = self.state.borrow_mut();
        let Some(old) = state.targets.get_mut(&target).map(|t| {
            std::mem::replace(&mut t.segments, vec![Segment::Text(markup.to_string())])
        }) else {
            return;
        };

        for segment in old {
            if let Segment::Child(child) = segment {
                if let Some(child) = state.targets.get_mut(&child) {
                    child.parent = None;
                }
            }
        }
        state.writes += 1;
    }

    fn insert_at_root(&mut self, target: TargetId) {
        let mut state = self.state.borrow_mut();
        if !state.targets.contains_key(&target) {
            return;
        }
        state.detach(target);
        state.roots.insert(0, target);
    }

    fn locate_placeholder(&self, within: TargetId, slot: &str) -> Option<Placeholder> {
        let position = self.state.borrow().locate(within, slot)?;
        Some(Placeholder {
            target: within,
            slot: slot.to_string(),
            position,
        })
    }

    fn replace_placeholder(&mut self, placeholder: &Placeholder, child: TargetId) {
        let mut state = self.state.borrow_mut();
        if !state.targets.contains_key(&child) || !state.targets.contains_key(&placeholder.target) {
            return;
        }
        if state.is_ancestor(child, placeholder.target) {
            warn!(?child, target = ?placeholder.target, "refusing to mount a target inside itself");
            return;
        }

        state.detach(child);

        // Detaching may shift positions inside the same target.
        let Some(position) = state.locate(placeholder.target, &placeholder.slot) else {
            return;
        };
        let token = token(&placeholder.slot);

        if let Some(target) = state.targets.get_mut(&placeholder.target) {
            let text = match &target.segments[position] {
                Segment::Text(text) => text.clone(),
                Segment::Child(_) => return,
            };
            let Some(at) = text.find(&token) else {
                return;
            };
            let before = text[..at].to_string();
            let after = text[at + token.len()..].to_string();
            target.segments.splice(
                position..=position,
                [
                    Segment::Text(before),
                    Segment::Child(child),
                    Segment::Text(after),
                ],
            );
        }

        if let Some(child) = state.targets.get_mut(&child) {
            child.parent = Some(placeholder.target);
        }
    }

    fn detach_all_events(&mut self, identity: Identity) {
        self.state.borrow_mut().events.remove(&identity);
    }

    fn remove_target(&mut self, target: TargetId) {
        let mut state = self.state.borrow_mut();
        state.detach(target);
        if let Some(removed) = state.targets.remove(&target) {
            for segment in removed.segments {
                if let Segment::Child(child) = segment {
                    if let Some(child) = state.targets.get_mut(&child) {
                        child.parent = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_content_and_markup() {
        let mut surface = MemorySurface::new();
        let root = surface.create_target("App");
        surface.set_content(root, "<h1>Hi</h1>");
        surface.insert_at_root(root);

        assert_eq!(surface.markup(), "<div class=\"App\"><h1>Hi</h1></div>");
        assert_eq!(surface.writes(), 1);
    }

    #[test]
    fn test_roots_are_prepended() {
        let mut surface = MemorySurface::new();
        let a = surface.create_target("A");
        let b = surface.create_target("B");
        surface.insert_at_root(a);
        surface.insert_at_root(b);
        assert_eq!(surface.roots(), vec![b, a]);
    }

    #[test]
    fn test_placeholder_replacement() {
        let mut surface = MemorySurface::new();
        let root = surface.create_target("App");
        let child = surface.create_target("Item");
        surface.set_content(root, "<ul>${item}</ul>${item}");
        surface.set_content(child, "<li>x</li>");
        surface.insert_at_root(root);

        let placeholder = surface.locate_placeholder(root, "item").unwrap();
        surface.replace_placeholder(&placeholder, child);

        assert_eq!(
            surface.content(root).unwrap(),
            "<ul><div class=\"Item\"><li>x</li></div></ul>${item}"
        );
        assert_eq!(surface.parent_of(child), Some(root));
        assert_eq!(
            surface.target_markup(child).unwrap(),
            "<div class=\"Item\"><li>x</li></div>"
        );
        assert!(surface.target_markup(TargetId(999)).is_none());
        assert!(surface.locate_placeholder(root, "missing").is_none());
    }

    #[test]
    fn test_set_content_detaches_children() {
        let mut surface = MemorySurface::new();
        let root = surface.create_target("App");
        let child = surface.create_target("Item");
        surface.set_content(root, "${item}");
        let placeholder = surface.locate_placeholder(root, "item").unwrap();
        surface.replace_placeholder(&placeholder, child);

        surface.set_content(root, "fresh ${item}");
        assert_eq!(surface.parent_of(child), None);
        assert_eq!(surface.content(root).unwrap(), "fresh ${item}");

        // The same child can be mounted again into the new content.
        let placeholder = surface.locate_placeholder(root, "item").unwrap();
        surface.replace_placeholder(&placeholder, child);
        assert_eq!(
            surface.content(root).unwrap(),
            "fresh <div class=\"Item\"></div>"
        );
    }

    #[test]
    fn test_refuses_self_mount() {
        let mut surface = MemorySurface::new();
        let root = surface.create_target("App");
        surface.set_content(root, "${me}");
        let placeholder = surface.locate_placeholder(root, "me").unwrap();
        surface.replace_placeholder(&placeholder, root);
        assert_eq!(surface.content(root).unwrap(), "${me}");
    }

    #[test]
    fn test_events_detach() {
        let mut surface = MemorySurface::new();
        let id = Identity::generate();
        surface.bind_event(id, "click");
        surface.bind_event(id, "hover");
        assert_eq!(surface.events(id), vec!["click", "hover"]);

        surface.detach_all_events(id);
        assert!(surface.events(id).is_empty());
    }

    #[test]
    fn test_remove_target() {
        let mut surface = MemorySurface::new();
        let root = surface.create_target("App");
        surface.insert_at_root(root);
        surface.remove_target(root);
        assert!(surface.roots().is_empty());
        assert_eq!(surface.target_count(), 0);
        assert_eq!(surface.markup(), "");
    }
}
