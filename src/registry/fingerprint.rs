//! Cycle-guarded fingerprints of node state.
//!
//! A node is encoded into a tagged JSON tree and hashed with SHA-256:
//!
//! - `["lit", value]` for literal properties
//! - `["fn"]` for computed properties and slot factories
//! - `["map", {..}]` for shared mappings
//! - `["ref", identity]` for identity-bearing back-references
//!
//! Shared mappings are tracked by address. A mapping already visited during
//! the current pass is omitted on every later visit, so two graphs that only
//! differ past such a point produce the same fingerprint. Callers treat that
//! as "unchanged".

use crate::node::Node;
use crate::types::{Identity, PropValue, Properties};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Fingerprint of a node at registration time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Snapshot(String);

impl Snapshot {
    /// Hex-encoded digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Compute the fingerprint of a node's own fields.
///
/// The mount target is not part of the fingerprint.
pub fn snapshot(node: &Node) -> Snapshot {
    let mut guard = Guard::default();

    let children: Map<String, Value> = node
        .child_slots
        .iter()
        .map(|(name, slot)| {
            let encoded = json!({
                "factory": ["fn"],
                "props": guard.encode_map(slot.props()),
                "identity": reference(slot.identity()),
            });
            (name.to_string(), encoded)
        })
        .collect();

    let encoded = json!({
        "identity": reference(node.identity),
        "template": node.template,
        "properties": guard.encode_map(&node.properties),
        "children": children,
        "parent": reference(node.parent_identity),
        "parent_index": node.parent_index,
    });

    let mut hasher = Sha256::new();
    hasher.update(encoded.to_string().as_bytes());
    Snapshot(hex::encode(hasher.finalize()))
}

fn reference(identity: Option<Identity>) -> Value {
    match identity {
        Some(identity) => json!(["ref", identity.to_string()]),
        None => Value::Null,
    }
}

/// Addresses of shared mappings visited during one encoding pass.
#[derive(Default)]
struct Guard {
    seen: HashSet<usize>,
}

impl Guard {
    fn encode_map(&mut self, props: &Properties) -> Value {
        let mut out = Map::new();
        for (key, value) in props {
            if let Some(encoded) = self.encode(value) {
                out.insert(key.clone(), encoded);
            }
        }
        Value::Object(out)
    }

    /// Encode one value, or `None` if it was already visited.
    fn encode(&mut self, value: &PropValue) -> Option<Value> {
        match value {
            PropValue::Literal(literal) => Some(json!(["lit", literal])),
            PropValue::Computed(_) => Some(json!(["fn"])),
            PropValue::Shared(shared) => {
                if !self.seen.insert(shared.addr()) {
                    return None;
                }
                let inner = self.encode_map(&shared.borrow());
                Some(json!(["map", inner]))
            }
        }
    }
}
