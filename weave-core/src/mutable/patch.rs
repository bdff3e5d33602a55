//! JSON Patch Entries
//!
//! Mutations made through a patch-tracked [`MutableObject`](super::MutableObject)
//! are recorded as a small subset of RFC 6902: `add`, `remove`, `replace`
//! and `move`. Paths are lists of string segments rather than JSON
//! pointers; array indices are rendered as decimal strings.
//!
//! [`apply_patch`] replays a recorded sequence against a plain JSON tree.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Remove,
    Replace,
    Move,
}

/// One recorded edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Vec<String>>,
}

impl PatchOp {
    pub fn add(path: Vec<String>, value: Json) -> Self {
        Self {
            op: PatchOpKind::Add,
            path,
            value: Some(value),
            from: None,
        }
    }

    pub fn remove(path: Vec<String>) -> Self {
        Self {
            op: PatchOpKind::Remove,
            path,
            value: None,
            from: None,
        }
    }

    pub fn replace(path: Vec<String>, value: Json) -> Self {
        Self {
            op: PatchOpKind::Replace,
            path,
            value: Some(value),
            from: None,
        }
    }

    pub fn moved(from: Vec<String>, path: Vec<String>) -> Self {
        Self {
            op: PatchOpKind::Move,
            path,
            value: None,
            from: Some(from),
        }
    }

    /// The same entry, relative to the parent that holds it under `key`.
    pub fn prefixed(mut self, key: &str) -> Self {
        self.path.insert(0, key.to_string());
        if let Some(from) = &mut self.from {
            from.insert(0, key.to_string());
        }
        self
    }
}

/// Apply `ops` in order to `target`.
///
/// An empty path addresses the root. On arrays, `add` inserts (the segment
/// `"-"` appends) and `remove` shifts the tail down. Stops at the first
/// entry whose path does not resolve.
pub fn apply_patch(target: &mut Json, ops: &[PatchOp]) -> Result<()> {
    for op in ops {
        apply_one(target, op)?;
    }
    Ok(())
}

fn apply_one(target: &mut Json, op: &PatchOp) -> Result<()> {
    match op.op {
        PatchOpKind::Add => insert(target, &op.path, payload(op)?, false),
        PatchOpKind::Replace => insert(target, &op.path, payload(op)?, true),
        PatchOpKind::Remove => remove(target, &op.path).map(drop),
        PatchOpKind::Move => {
            let from = op.from.as_deref().ok_or_else(|| not_found(&op.path))?;
            let value = remove(target, from)?;
            insert(target, &op.path, value, false)
        }
    }
}

fn payload(op: &PatchOp) -> Result<Json> {
    op.value.clone().ok_or_else(|| not_found(&op.path))
}

fn not_found(path: &[String]) -> Error {
    Error::PathNotFound {
        path: path.to_vec(),
    }
}

/// Resolve all but the last segment.
fn parent_mut<'a>(target: &'a mut Json, path: &'a [String]) -> Result<(&'a mut Json, &'a str)> {
    let (last, parents) = path.split_last().ok_or_else(|| not_found(path))?;
    let mut cursor = target;
    for segment in parents {
        cursor = match cursor {
            Json::Object(map) => map.get_mut(segment.as_str()),
            Json::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        }
        .ok_or_else(|| not_found(path))?;
    }
    Ok((cursor, last.as_str()))
}

fn insert(target: &mut Json, path: &[String], value: Json, replace: bool) -> Result<()> {
    if path.is_empty() {
        *target = value;
        return Ok(());
    }
    let (parent, key) = parent_mut(target, path)?;
    match parent {
        Json::Object(map) => {
            if replace && !map.contains_key(key) {
                return Err(not_found(path));
            }
            map.insert(key.to_string(), value);
            Ok(())
        }
        Json::Array(items) => {
            let index = if key == "-" {
                items.len()
            } else {
                key.parse::<usize>().map_err(|_| not_found(path))?
            };
            if replace {
                let slot = items.get_mut(index).ok_or_else(|| not_found(path))?;
                *slot = value;
            } else if index <= items.len() {
                items.insert(index, value);
            } else {
                return Err(not_found(path));
            }
            Ok(())
        }
        _ => Err(not_found(path)),
    }
}

fn remove(target: &mut Json, path: &[String]) -> Result<Json> {
    if path.is_empty() {
        return Ok(std::mem::take(target));
    }
    let (parent, key) = parent_mut(target, path)?;
    match parent {
        Json::Object(map) => map.remove(key).ok_or_else(|| not_found(path)),
        Json::Array(items) => {
            let index = key
                .parse::<usize>()
                .ok()
                .filter(|i| *i < items.len())
                .ok_or_else(|| not_found(path))?;
            Ok(items.remove(index))
        }
        _ => Err(not_found(path)),
    }
}
