//! Resource nodes
//!
//! A [`ResourceNode`] is created exactly once, through
//! [`Graph::create_node`](crate::graph::Graph::create_node), from a
//! [`NodeDeclaration`]. After that it is never mutated.

use crate::kind::ResourceKind;
use crate::types::{NodeId, Reference, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Declaration of a node before it enters a graph
///
/// ```rust,ignore
/// let decl = NodeDeclaration::new(ResourceKind::ObjectStore, "data")
///     .with_property("visibility", "private")
///     .with_dependency("secret");
/// graph.create_node(decl)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDeclaration {
    pub(crate) id: NodeId,
    pub(crate) kind: ResourceKind,
    pub(crate) properties: BTreeMap<String, Value>,
    pub(crate) depends_on: BTreeSet<NodeId>,
}

impl NodeDeclaration {
    /// Start a declaration of `kind` named `id`
    #[must_use]
    pub fn new(kind: ResourceKind, id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Set a property, replacing any earlier value for the key
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set several properties
    #[must_use]
    pub fn with_properties<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.properties
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Add an explicit dependency
    #[must_use]
    pub fn with_dependency(mut self, node: impl Into<NodeId>) -> Self {
        self.depends_on.insert(node.into());
        self
    }

    /// Declared id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Declared kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Required properties of the kind that are absent or null, in schema order
    #[must_use]
    pub fn missing_required(&self) -> Vec<String> {
        self.kind
            .schema()
            .required
            .iter()
            .filter(|key| self.properties.get(**key).map_or(true, Value::is_null))
            .map(|key| (*key).to_string())
            .collect()
    }
}

/// A typed, attribute-bearing unit of the graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceNode {
    id: NodeId,
    kind: ResourceKind,
    ordinal: usize,
    properties: BTreeMap<String, Value>,
    depends_on: BTreeSet<NodeId>,
}

impl ResourceNode {
    pub(crate) fn from_declaration(decl: NodeDeclaration, ordinal: usize) -> Self {
        Self {
            id: decl.id,
            kind: decl.kind,
            ordinal,
            properties: decl.properties,
            depends_on: decl.depends_on,
        }
    }

    /// Node id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Node kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Declaration index within its graph
    #[inline]
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Declared properties
    #[inline]
    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// A single property
    #[inline]
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Explicit dependencies
    #[inline]
    #[must_use]
    pub fn depends_on(&self) -> &BTreeSet<NodeId> {
        &self.depends_on
    }

    /// Every reference held in the node's properties, paired with the
    /// property key it appears under
    pub fn references(&self) -> impl Iterator<Item = (&str, &Reference)> + '_ {
        self.properties.iter().flat_map(|(key, value)| {
            value
                .references()
                .into_iter()
                .map(move |reference| (key.as_str(), reference))
        })
    }
}
