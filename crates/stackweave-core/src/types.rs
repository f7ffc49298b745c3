//! Core value types for the resource graph
//!
//! Defines:
//! - [`NodeId`], the declared identifier of a resource node
//! - [`Reference`], a deferred `node.attribute` value
//! - [`Value`], literal property data plus the deferred forms

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Map key marking a deferred reference
pub const REF_KEY: &str = "$ref";
/// Map key marking a deferred concatenation
pub const JOIN_KEY: &str = "$join";

/// Identifier of a resource node, unique within one graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from any string-like value
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&NodeId> for NodeId {
    fn from(value: &NodeId) -> Self {
        value.clone()
    }
}

/// A promise that `node.attribute` becomes concrete once `node` is realized
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reference {
    /// Target node
    pub node: NodeId,
    /// Output attribute of the target node's kind
    pub attribute: String,
}

impl Reference {
    /// Create a reference to `node.attribute`
    #[must_use]
    pub fn new(node: impl Into<NodeId>, attribute: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.attribute)
    }
}

/// A property value
///
/// Literals mirror JSON. `Ref` and `Join` are deferred: they are replaced
/// by placeholder tokens during resolution.
///
/// Documents write references as
/// `{ "$ref": { "node": "data", "attribute": "identifier" } }` and joins as
/// `{ "$join": ["https://", { "$ref": ... }] }`. The deferred forms take no
/// other keys, and literal maps may not use `$ref` or `$join` as keys, so
/// every value decodes to exactly what was encoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ValueRepr")]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean literal
    Bool(bool),
    /// Numeric literal
    Number(serde_json::Number),
    /// String literal
    String(String),
    /// Ordered list
    List(Vec<Value>),
    /// Deferred attribute of another node
    Ref {
        /// Referenced attribute
        reference: Reference,
    },
    /// String concatenation of resolved parts
    Join {
        /// Parts, concatenated in order
        join: Vec<Value>,
    },
    /// String-keyed map (sorted keys)
    Map(BTreeMap<String, Value>),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => items.serialize(serializer),
            Self::Ref { reference } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(REF_KEY, reference)?;
                map.end()
            }
            Self::Join { join } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(JOIN_KEY, join)?;
                map.end()
            }
            Self::Map(entries) => entries.serialize(serializer),
        }
    }
}

/// Wire shape of [`Value`]; tried in variant order
#[derive(Deserialize)]
#[serde(untagged)]
enum ValueRepr {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Ref(RefForm),
    Join(JoinForm),
    Map(BTreeMap<String, Value>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RefForm {
    #[serde(rename = "$ref")]
    reference: Reference,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JoinForm {
    #[serde(rename = "$join")]
    join: Vec<Value>,
}

impl TryFrom<ValueRepr> for Value {
    type Error = String;

    fn try_from(repr: ValueRepr) -> Result<Self, Self::Error> {
        Ok(match repr {
            ValueRepr::Null => Self::Null,
            ValueRepr::Bool(b) => Self::Bool(b),
            ValueRepr::Number(n) => Self::Number(n),
            ValueRepr::String(s) => Self::String(s),
            ValueRepr::List(items) => Self::List(items),
            ValueRepr::Ref(form) => Self::Ref {
                reference: form.reference,
            },
            ValueRepr::Join(form) => Self::Join { join: form.join },
            ValueRepr::Map(entries) => {
                if let Some(key) = entries.keys().find(|key| *key == REF_KEY || *key == JOIN_KEY) {
                    return Err(format!(
                        "`{key}` must be the only key of its map and hold a valid deferred value"
                    ));
                }
                Self::Map(entries)
            }
        })
    }
}

impl Value {
    /// Deferred reference to `node.attribute`
    #[must_use]
    pub fn reference(node: impl Into<NodeId>, attribute: impl Into<String>) -> Self {
        Self::Ref {
            reference: Reference::new(node, attribute),
        }
    }

    /// Concatenation of parts
    #[must_use]
    pub fn join(parts: impl IntoIterator<Item = Value>) -> Self {
        Self::Join {
            join: parts.into_iter().collect(),
        }
    }

    /// List of values
    #[must_use]
    pub fn list(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Map from key/value pairs
    #[must_use]
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// `true` for [`Value::Null`]
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// String literal contents, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer contents, if this is an integral number
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// The reference, if this value is a bare reference
    #[must_use]
    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Ref { reference } => Some(reference),
            _ => None,
        }
    }

    /// Collect every reference reachable from this value, in traversal order
    #[must_use]
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Ref { reference } => out.push(reference),
            Self::Join { join: items } | Self::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Map(entries) => {
                for item in entries.values() {
                    item.collect_references(out);
                }
            }
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => {}
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(value.into())
    }
}

impl From<Reference> for Value {
    fn from(reference: Reference) -> Self {
        Self::Ref { reference }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Join node ids for display in error messages
pub(crate) fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
