//! Core types for the reconciliation engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Ref, RefCell, RefMut};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Stable identity of a registered node.
///
/// Assigned on first registration and never reused for the lifetime of the
/// process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(pub Uuid);

impl Identity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Identity(Uuid::new_v4())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}...)", &self.0.simple().to_string()[..8])
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A zero-argument callable whose result is inserted into a template.
///
/// Returning `None` inserts the empty string.
#[derive(Clone)]
pub struct Computed(Rc<dyn Fn() -> Option<String>>);

impl Computed {
    pub fn new(f: impl Fn() -> Option<String> + 'static) -> Self {
        Computed(Rc::new(f))
    }

    /// Invoke the callable.
    pub fn call(&self) -> Option<String> {
        (self.0)()
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Computed(..)")
    }
}

/// A property mapping with reference semantics.
///
/// Several properties (or the mapping itself) may point at the same cell, so
/// the graph can contain cycles.
#[derive(Clone, Default)]
pub struct SharedProps(Rc<RefCell<Properties>>);

impl SharedProps {
    pub fn new(props: Properties) -> Self {
        SharedProps(Rc::new(RefCell::new(props)))
    }

    pub fn borrow(&self) -> Ref<'_, Properties> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Properties> {
        self.0.borrow_mut()
    }

    /// Address of the shared cell, used as its reference identity.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &SharedProps) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedProps({:#x})", self.addr())
    }
}

/// A property value.
#[derive(Clone, Debug)]
pub enum PropValue {
    /// Plain data, inserted as text.
    Literal(Value),

    /// Callable invoked at resolution time.
    Computed(Computed),

    /// Mapping shared by reference.
    Shared(SharedProps),
}

impl PropValue {
    /// Wrap a closure as a computed value.
    pub fn computed(f: impl Fn() -> Option<String> + 'static) -> Self {
        PropValue::Computed(Computed::new(f))
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, PropValue::Computed(_))
    }

    /// Text inserted for this value by a plain substitution.
    pub fn to_text(&self) -> String {
        match self {
            PropValue::Literal(value) => coerce(value),
            PropValue::Computed(computed) => computed.call().unwrap_or_default(),
            PropValue::Shared(_) => "[object Object]".to_string(),
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            PropValue::Literal(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        PropValue::Literal(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Literal(Value::String(value))
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Literal(Value::Bool(value))
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Literal(Value::from(value))
    }
}

impl From<usize> for PropValue {
    fn from(value: usize) -> Self {
        PropValue::Literal(Value::from(value))
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Literal(Value::from(value))
    }
}

impl From<Computed> for PropValue {
    fn from(value: Computed) -> Self {
        PropValue::Computed(value)
    }
}

impl From<SharedProps> for PropValue {
    fn from(value: SharedProps) -> Self {
        PropValue::Shared(value)
    }
}

/// Property mapping of a node, in insertion order.
///
/// Re-inserting an existing key replaces its value in place.
pub type Properties = IndexMap<String, PropValue>;

/// Structural clone of a property mapping.
///
/// Shared cells are duplicated, keeping aliasing and cycles intact inside the
/// copy. Computed values keep pointing at the same closure.
pub fn clone_properties(props: &Properties) -> Properties {
    let mut copies = HashMap::new();
    clone_with(props, &mut copies)
}

fn clone_with(props: &Properties, copies: &mut HashMap<usize, SharedProps>) -> Properties {
    props
        .iter()
        .map(|(key, value)| {
            let value = match value {
                PropValue::Shared(shared) => {
                    if let Some(copy) = copies.get(&shared.addr()) {
                        PropValue::Shared(copy.clone())
                    } else {
                        let copy = SharedProps::default();
                        copies.insert(shared.addr(), copy.clone());
                        let inner = clone_with(&shared.borrow(), copies);
                        *copy.borrow_mut() = inner;
                        PropValue::Shared(copy)
                    }
                }
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Coerce a literal to the text a substitution inserts.
pub fn coerce(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Persistence tier backing a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// Session-scoped.
    Volatile,
    /// Long-term.
    Durable,
}

impl Tier {
    pub fn from_perm(perm: bool) -> Self {
        if perm {
            Tier::Durable
        } else {
            Tier::Volatile
        }
    }
}

/// Which writes a subscription listens to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WatchPath {
    /// Every write to the store.
    All,
    /// Writes replacing the whole store value.
    Whole,
    /// Writes to exactly this path.
    Path(String),
}

impl WatchPath {
    /// Check whether a write at `written` (`None` = whole value) is observed.
    pub fn matches(&self, written: Option<&str>) -> bool {
        match (self, written) {
            (WatchPath::All, _) => true,
            (WatchPath::Whole, None) => true,
            (WatchPath::Path(p), Some(w)) => p == w,
            _ => false,
        }
    }
}

impl From<&str> for WatchPath {
    fn from(path: &str) -> Self {
        if path == "all" {
            WatchPath::All
        } else {
            WatchPath::Path(path.to_string())
        }
    }
}

impl From<Option<&str>> for WatchPath {
    fn from(path: Option<&str>) -> Self {
        match path {
            Some(path) => WatchPath::from(path),
            None => WatchPath::Whole,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_unique() {
        let a = Identity::generate();
        let b = Identity::generate();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }

    #[test]
    fn test_coerce_literals() {
        assert_eq!(coerce(&json!("Ada")), "Ada");
        assert_eq!(coerce(&json!(3)), "3");
        assert_eq!(coerce(&json!(1.5)), "1.5");
        assert_eq!(coerce(&json!(true)), "true");
        assert_eq!(coerce(&json!([1, null, "x"])), "1,,x");
        assert_eq!(coerce(&json!({"a": 1})), "[object Object]");
    }

    #[test]
    fn test_watch_path_matching() {
        assert!(WatchPath::from("all").matches(Some("theme")));
        assert!(WatchPath::from("all").matches(None));
        assert!(WatchPath::from("theme").matches(Some("theme")));
        assert!(!WatchPath::from("theme").matches(Some("lang")));
        assert!(!WatchPath::from("theme").matches(None));
        assert!(WatchPath::from(None).matches(None));
    }

    #[test]
    fn test_clone_properties_keeps_computed() {
        let mut props = Properties::new();
        props.insert("count".into(), PropValue::computed(|| Some("3".into())));
        props.insert("name".into(), "Ada".into());

        let copy = clone_properties(&props);
        assert_eq!(copy["count"].to_text(), "3");
        assert_eq!(copy["name"].to_text(), "Ada");
    }

    #[test]
    fn test_properties_keep_insertion_order() {
        let mut props = Properties::new();
        props.insert("zeta".into(), "1".into());
        props.insert("alpha".into(), PropValue::computed(|| None));
        props.insert("mid".into(), json!(2).into());
        props.insert("zeta".into(), "3".into());

        let keys: Vec<_> = props.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(props["zeta"].as_literal(), Some(&json!("3")));
        assert!(props["alpha"].is_computed());
        assert!(props["alpha"].as_literal().is_none());
        assert!(!props["mid"].is_computed());

        let copy = clone_properties(&props);
        let copied: Vec<_> = copy.keys().map(String::as_str).collect();
        assert_eq!(copied, keys);
    }

    #[test]
    fn test_clone_properties_duplicates_shared_cycles() {
        let shared = SharedProps::default();
        shared
            .borrow_mut()
            .insert("self".into(), PropValue::Shared(shared.clone()));
        let mut props = Properties::new();
        props.insert("graph".into(), PropValue::Shared(shared.clone()));

        let copy = clone_properties(&props);
        let PropValue::Shared(copied) = &copy["graph"] else {
            panic!("expected shared value");
        };
        assert!(!copied.ptr_eq(&shared));

        let inner = copied.borrow();
        let PropValue::Shared(back) = &inner["self"] else {
            panic!("expected shared value");
        };
        assert!(back.ptr_eq(copied));
    }
}
