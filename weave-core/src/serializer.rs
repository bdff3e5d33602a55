//! Wire Format
//!
//! Serializes mutable trees so revisions survive a transport boundary.
//!
//! Every wrapped node carries its revision under the reserved key
//! `"$revision"`. Arrays cannot hold extra keys, so a wrapped array is
//! written as an object holding the revision and the elements under
//! `"$items"`:
//!
//! ```json
//! {"$revision": 12, "todos": {"$revision": 9, "$items": [{"$revision": 4, "done": false}]}}
//! ```
//!
//! Deserializing re-wraps every node that carries a revision and seeds it
//! with that revision, so a signal holding the result compares equal to the
//! sender's state until either side mutates it. Nested containers that were
//! never wrapped on the sending side come back as plain nodes.
//!
//! The same structure can be encoded as MessagePack.

use std::sync::Arc;

use serde_json::{Map as JsonMap, Value as Json};

use crate::error::{Error, Result};
use crate::mutable::{Container, MutableObject, Node, Prop, Value};
use crate::revision::{Revision, RevisionCounter};

/// Key holding the revision of a wrapped node.
pub const REVISION_KEY: &str = "$revision";

/// Key holding the elements of a wrapped array.
pub const ITEMS_KEY: &str = "$items";

/// Serialize a mutable tree to JSON.
pub fn serialize(object: &MutableObject) -> Result<String> {
    Ok(serde_json::to_string(&encode_node(object.node()))?)
}

/// Serialize a mutable tree to MessagePack.
pub fn to_msgpack(object: &MutableObject) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(&encode_node(object.node()))?)
}

/// Deserialize JSON produced by [`serialize`], using the shared revision
/// counter and no patch recording.
pub fn deserialize(input: &str) -> Result<Prop> {
    Decoder::default().decode_str(input)
}

/// Deserialize MessagePack produced by [`to_msgpack`].
pub fn from_msgpack(input: &[u8]) -> Result<Prop> {
    Decoder::default().decode_slice(input)
}

fn encode_node(node: &Node) -> Json {
    let revision = MutableObject::existing(node).map(|m| Json::from(m.revision().raw()));
    match node.snapshot() {
        Container::Array(items) => {
            let items: Vec<Json> = items.iter().map(encode_value).collect();
            match revision {
                Some(revision) => {
                    let mut out = JsonMap::new();
                    out.insert(REVISION_KEY.to_string(), revision);
                    out.insert(ITEMS_KEY.to_string(), Json::Array(items));
                    Json::Object(out)
                }
                None => Json::Array(items),
            }
        }
        Container::Object(map) => {
            let mut out = JsonMap::new();
            if let Some(revision) = revision {
                out.insert(REVISION_KEY.to_string(), revision);
            }
            for (key, value) in &map {
                out.insert(key.clone(), encode_value(value));
            }
            Json::Object(out)
        }
    }
}

fn encode_value(value: &Value) -> Json {
    match value {
        Value::Node(node) => encode_node(node),
        other => other.to_json(),
    }
}

/// Rebuilds mutable trees from the wire format.
///
/// Objects are wrapped with the decoder's revision counter, which is
/// advanced past every revision it sees.
pub struct Decoder {
    counter: Arc<RevisionCounter>,
    make_patch: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            counter: RevisionCounter::shared(),
            make_patch: false,
        }
    }
}

impl Decoder {
    pub fn new(counter: Arc<RevisionCounter>) -> Self {
        Self {
            counter,
            make_patch: false,
        }
    }

    /// Record patches on the rebuilt objects.
    pub fn with_make_patch(mut self, make_patch: bool) -> Self {
        self.make_patch = make_patch;
        self
    }

    pub fn decode_str(&self, input: &str) -> Result<Prop> {
        self.decode(serde_json::from_str(input)?)
    }

    pub fn decode_slice(&self, input: &[u8]) -> Result<Prop> {
        self.decode(rmp_serde::from_slice(input)?)
    }

    /// Rebuild a value from its wire JSON.
    pub fn decode(&self, json: Json) -> Result<Prop> {
        Ok(match self.decode_value(json)? {
            Value::Node(node) => match MutableObject::existing(&node) {
                Some(object) => Prop::Mutable(object),
                None => Prop::Value(Value::Node(node)),
            },
            other => Prop::Value(other),
        })
    }

    fn decode_value(&self, json: Json) -> Result<Value> {
        match json {
            Json::Object(mut map) => {
                let revision = map
                    .remove(REVISION_KEY)
                    .map(parse_revision)
                    .transpose()?;
                let node = match map.remove(ITEMS_KEY) {
                    Some(Json::Array(items)) if revision.is_some() => Node::array(
                        items
                            .into_iter()
                            .map(|item| self.decode_value(item))
                            .collect::<Result<_>>()?,
                    ),
                    Some(other) if revision.is_some() => return Err(Error::InvalidRevision(other)),
                    items => {
                        if let Some(items) = items {
                            map.insert(ITEMS_KEY.to_string(), items);
                        }
                        Node::object(
                            map.into_iter()
                                .map(|(key, value)| Ok((key, self.decode_value(value)?)))
                                .collect::<Result<_>>()?,
                        )
                    }
                };
                if let Some(revision) = revision {
                    self.wrap(&node, revision);
                }
                Ok(Value::Node(node))
            }
            Json::Array(items) => Ok(Value::Node(Node::array(
                items
                    .into_iter()
                    .map(|item| self.decode_value(item))
                    .collect::<Result<_>>()?,
            ))),
            primitive => Ok(Value::from(primitive)),
        }
    }

    fn wrap(&self, node: &Node, revision: Revision) {
        let object = MutableObject::with_counter(node.clone(), self.make_patch, Arc::clone(&self.counter));
        object.set_revision(revision);
        object.adopt_wrapped_children();
    }
}

fn parse_revision(json: Json) -> Result<Revision> {
    json.as_u64()
        .map(Revision::from_raw)
        .ok_or(Error::InvalidRevision(json))
}
