//! The surface resolved markup is mounted into.
//!
//! The engine never touches a concrete rendering surface. It creates one
//! wrapper target per component, writes resolved markup into it, and swaps
//! each child slot placeholder for the child's wrapper. A renderer plugs in
//! by implementing [`MountSurface`]; [`MemorySurface`] keeps the whole tree
//! in memory.

mod memory;

pub use memory::MemorySurface;

use crate::types::Identity;

/// Handle to a wrapper target on a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u64);

/// A located `${slot}` placeholder inside a target's content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placeholder {
    /// Target whose content holds the placeholder.
    pub target: TargetId,
    /// Slot name the placeholder refers to.
    pub slot: String,
    /// Surface-defined position of the placeholder inside `target`.
    pub position: usize,
}

/// Mount-target operations the render cycle relies on.
pub trait MountSurface {
    /// Create a detached wrapper target for a component named `name`.
    fn create_target(&mut self, name: &str) -> TargetId;

    /// Replace the content of `target`. Previously mounted children are detached.
    fn set_content(&mut self, target: TargetId, markup: &str);

    /// Attach `target` at the root of the surface, before existing roots.
    fn insert_at_root(&mut self, target: TargetId);

    /// Find the first `${slot}` placeholder in the content of `within`.
    fn locate_placeholder(&self, within: TargetId, slot: &str) -> Option<Placeholder>;

    /// Swap a located placeholder for `child`, moving `child` if it is
    /// mounted elsewhere.
    fn replace_placeholder(&mut self, placeholder: &Placeholder, child: TargetId);

    /// Detach every event binding owned by `identity`.
    fn detach_all_events(&mut self, identity: Identity);

    /// Detach `target` from wherever it is mounted and forget it.
    fn remove_target(&mut self, target: TargetId);
}
