//! Dotted path addressing into JSON values.
//!
//! `"a.b.0"` walks object keys and array indices. The empty path addresses
//! the value itself.

use crate::error::{ReflowError, Result};
use serde_json::Value;

/// How far past the end of an array a write may reach. The gap is filled
/// with nulls.
pub const MAX_ARRAY_GAP: usize = 1024;

/// Look up `path` inside `value`.
pub fn get<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Set `path` inside `target`, creating intermediate containers.
///
/// Missing intermediates become arrays for numeric segments and objects
/// otherwise. A scalar sitting on the path is replaced. An array index more
/// than [`MAX_ARRAY_GAP`] past the end is rejected before anything changes.
pub fn set(target: &mut Value, path: &str, value: Value) -> Result<()> {
    if path.is_empty() {
        *target = value;
        return Ok(());
    }
    check_growth(target, path)?;

    let mut current = target;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let slot = child_mut(current, segment);
        if segments.peek().is_none() {
            *slot = value;
            break;
        }
        current = slot;
    }
    Ok(())
}

/// Walk `path` the way `set` will and bound every array it would grow.
fn check_growth(target: &Value, path: &str) -> Result<()> {
    let mut current = Some(target);
    for segment in path.split('.') {
        let index = segment.parse::<usize>().ok();
        current = match (current, index) {
            (Some(Value::Object(map)), _) => map.get(segment),
            (Some(Value::Array(items)), Some(index)) => {
                within_gap(path, index, items.len())?;
                items.get(index)
            }
            // A fresh array is created for this segment.
            (Some(Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)), Some(index))
            | (None, Some(index)) => {
                within_gap(path, index, 0)?;
                None
            }
            _ => None,
        };
    }
    Ok(())
}

fn within_gap(path: &str, index: usize, len: usize) -> Result<()> {
    if index > len.saturating_add(MAX_ARRAY_GAP) {
        return Err(ReflowError::InvalidArgument(format!(
            "index {} in path {:?} is too far past the end of an array of length {}",
            index, path, len
        )));
    }
    Ok(())
}

fn child_mut<'v>(current: &'v mut Value, segment: &str) -> &'v mut Value {
    let index = segment.parse::<usize>().ok();
    if !current.is_object() && !current.is_array() {
        *current = match index {
            Some(_) => Value::Array(Vec::new()),
            None => Value::Null,
        };
    }

    match (current, index) {
        (Value::Array(items), Some(index)) => {
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        (current, _) => {
            if !current.is_object() {
                *current = Value::Null;
            }
            // Indexing null with a key turns it into an object.
            &mut current[segment]
        }
    }
}
