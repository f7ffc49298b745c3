//! The declared resource graph
//!
//! A [`Graph`] is an explicit value threaded through every builder call:
//! nodes, outputs, routes, edge origins, policy attachments and derived
//! edges all live here. Nothing is registered in ambient state.

use crate::edge::{EdgeOrigin, Route};
use crate::error::DeclarationError;
use crate::kind::ResourceKind;
use crate::node::{NodeDeclaration, ResourceNode};
use crate::policy::{BroadGrantReport, PolicyAttachment, PolicyGrant, PolicyOrigin};
use crate::types::{NodeId, Value};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Why one node depends on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeReason {
    /// Listed in `depends_on`
    Explicit,
    /// A property holds a reference to the dependency
    Reference,
    /// A policy statement of the principal scopes to the dependency
    PolicyResource,
    /// Schedule fires the dependency
    ScheduleTarget,
    /// Api route dispatches to the dependency
    RouteTarget,
    /// Distribution serves the dependency as origin
    EdgeOrigin,
}

/// A dependency edge: `from` must be applied after `to`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Dependent node
    pub from: NodeId,
    /// Dependency
    pub to: NodeId,
    /// Origin of the edge
    pub reason: EdgeReason,
}

/// An exported value of the synthesized stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Literal or deferred value
    pub value: Value,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Cross-stack export name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_name: Option<String>,
}

impl Output {
    /// Output carrying `value`
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            description: None,
            export_name: None,
        }
    }

    /// With description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// With export name
    #[must_use]
    pub fn with_export_name(mut self, export_name: impl Into<String>) -> Self {
        self.export_name = Some(export_name.into());
        self
    }
}

/// The set of declared resources plus outputs and derived wiring
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: IndexMap<NodeId, ResourceNode>,
    outputs: IndexMap<String, Output>,
    routes: Vec<Route>,
    origins: Vec<EdgeOrigin>,
    policies: Vec<PolicyAttachment>,
    derived_edges: IndexSet<DependencyEdge>,
    tags: BTreeMap<String, String>,
}

impl Graph {
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node
    ///
    /// The node receives the next declaration ordinal. Fails if the id is
    /// taken or any required property of the kind is absent; the error
    /// lists every missing key.
    pub fn create_node(&mut self, decl: NodeDeclaration) -> Result<NodeId, DeclarationError> {
        if self.nodes.contains_key(decl.id()) {
            return Err(DeclarationError::DuplicateId {
                id: decl.id().clone(),
            });
        }

        let missing = decl.missing_required();
        if !missing.is_empty() {
            return Err(DeclarationError::MissingRequiredProperty {
                id: decl.id().clone(),
                kind: decl.kind(),
                missing,
            });
        }

        let ordinal = self.nodes.len();
        let node = ResourceNode::from_declaration(decl, ordinal);
        let id = node.id().clone();
        tracing::trace!(node = %id, kind = %node.kind(), ordinal, "node declared");
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Look up a node
    #[inline]
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    /// Whether `id` is declared
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> + '_ {
        self.nodes.values()
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by declaration ordinal
    #[must_use]
    pub fn node_at(&self, ordinal: usize) -> Option<&ResourceNode> {
        self.nodes.get_index(ordinal).map(|(_, node)| node)
    }

    pub(crate) fn require_node(&self, id: &NodeId) -> Result<&ResourceNode, DeclarationError> {
        self.nodes
            .get(id)
            .ok_or_else(|| DeclarationError::UnknownNode { id: id.clone() })
    }

    pub(crate) fn require_kind(
        &self,
        id: &NodeId,
        expected: ResourceKind,
    ) -> Result<&ResourceNode, DeclarationError> {
        let node = self.require_node(id)?;
        if node.kind() != expected {
            return Err(DeclarationError::KindMismatch {
                id: id.clone(),
                expected,
                found: node.kind(),
            });
        }
        Ok(node)
    }

    /// Declare an exported value
    pub fn add_output(
        &mut self,
        name: impl Into<String>,
        output: Output,
    ) -> Result<(), DeclarationError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(DeclarationError::DuplicateOutput { name });
        }
        self.outputs.insert(name, output);
        Ok(())
    }

    /// Outputs in declaration order
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &IndexMap<String, Output> {
        &self.outputs
    }

    /// Attach a tag applied to every resource of the stack
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Stack-wide tags
    #[inline]
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Record a policy built for a principal
    ///
    /// Every node referenced by a statement resource becomes a derived
    /// `PolicyResource` edge from the principal, so the principal is applied
    /// after everything its policy names.
    pub fn attach_policy(
        &mut self,
        grant: PolicyGrant,
        origin: PolicyOrigin,
    ) -> Result<(), DeclarationError> {
        self.require_node(&grant.principal)?;

        let targets: BTreeSet<NodeId> = grant
            .statements
            .iter()
            .flat_map(|statement| statement.resources.iter())
            .flat_map(Value::references)
            .map(|reference| reference.node.clone())
            .collect();

        for target in targets {
            if target != grant.principal {
                self.add_derived_edge(grant.principal.clone(), target, EdgeReason::PolicyResource);
            }
        }

        self.policies.push(PolicyAttachment {
            principal: grant.principal,
            origin,
            statements: grant.statements,
            broad_grants: grant.broad_grants,
        });
        Ok(())
    }

    /// Policy attachments in attachment order
    #[inline]
    #[must_use]
    pub fn policies(&self) -> &[PolicyAttachment] {
        &self.policies
    }

    /// Every broad grant recorded so far
    #[must_use]
    pub fn broad_grant_report(&self) -> BroadGrantReport {
        BroadGrantReport::from_entries(
            self.policies
                .iter()
                .flat_map(|attachment| attachment.broad_grants.iter().cloned())
                .collect(),
        )
    }

    /// Registered routes
    #[inline]
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Registered edge origins
    #[inline]
    #[must_use]
    pub fn origins(&self) -> &[EdgeOrigin] {
        &self.origins
    }

    /// Edges generated by builders (routes, schedules, origins, policies)
    #[inline]
    #[must_use]
    pub fn derived_edges(&self) -> &IndexSet<DependencyEdge> {
        &self.derived_edges
    }

    pub(crate) fn push_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub(crate) fn push_origin(&mut self, origin: EdgeOrigin) {
        self.origins.push(origin);
    }

    pub(crate) fn add_derived_edge(&mut self, from: NodeId, to: NodeId, reason: EdgeReason) {
        self.derived_edges.insert(DependencyEdge { from, to, reason });
    }

    /// Every dependency edge of the graph, deterministic order
    ///
    /// For each node in declaration order: explicit dependencies (sorted),
    /// then property references (property order), then derived edges
    /// (insertion order). Duplicate `(from, to, reason)` triples are dropped.
    #[must_use]
    pub fn dependency_edges(&self) -> Vec<DependencyEdge> {
        let mut derived_by_source: IndexMap<&NodeId, Vec<&DependencyEdge>> = IndexMap::new();
        for edge in &self.derived_edges {
            derived_by_source.entry(&edge.from).or_default().push(edge);
        }

        let mut edges: IndexSet<DependencyEdge> = IndexSet::new();

        for node in self.nodes.values() {
            for dep in node.depends_on() {
                edges.insert(DependencyEdge {
                    from: node.id().clone(),
                    to: dep.clone(),
                    reason: EdgeReason::Explicit,
                });
            }
            for (_, reference) in node.references() {
                edges.insert(DependencyEdge {
                    from: node.id().clone(),
                    to: reference.node.clone(),
                    reason: EdgeReason::Reference,
                });
            }
            if let Some(derived) = derived_by_source.get(node.id()) {
                for edge in derived {
                    edges.insert((*edge).clone());
                }
            }
        }

        edges.into_iter().collect()
    }

    /// Distinct dependencies of every node that has any, in the order of
    /// [`dependency_edges`](Self::dependency_edges)
    #[must_use]
    pub fn dependency_map(edges: &[DependencyEdge]) -> IndexMap<&NodeId, IndexSet<&NodeId>> {
        let mut map: IndexMap<&NodeId, IndexSet<&NodeId>> = IndexMap::new();
        for edge in edges {
            map.entry(&edge.from).or_default().insert(&edge.to);
        }
        map
    }

    /// Distinct dependencies of one node, in the order of
    /// [`dependency_edges`](Self::dependency_edges)
    #[must_use]
    pub fn dependencies_of(&self, id: &NodeId) -> Vec<NodeId> {
        let deps: IndexSet<NodeId> = self
            .dependency_edges()
            .into_iter()
            .filter(|edge| &edge.from == id)
            .map(|edge| edge.to)
            .collect();
        deps.into_iter().collect()
    }
}
