//! Declarative graph documents
//!
//! A [`GraphDocument`] is the serde form of a builder call sequence, so a
//! stack can be written in YAML or JSON. Loading replays the calls in a
//! fixed order (nodes, schedules, routes, origins, policies, outputs, tags)
//! and collects every rejected call instead of stopping at the first.

use crate::edge::{EdgeRouter, HttpMethod, OriginKind};
use crate::error::DeclarationError;
use crate::graph::{Graph, Output};
use crate::kind::ResourceKind;
use crate::node::NodeDeclaration;
use crate::policy::{AccessPolicyBuilder, Grant, PolicyOrigin};
use crate::schedule::ScheduleBinder;
use crate::types::{NodeId, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// A node entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Node id
    pub id: NodeId,
    /// Kind name, parsed leniently
    pub kind: String,
    /// Properties
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Explicit dependencies
    #[serde(default)]
    pub depends_on: BTreeSet<NodeId>,
}

/// A schedule entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Schedule node id
    pub id: NodeId,
    /// Cadence in seconds
    pub cadence_seconds: i64,
    /// Compute function fired
    pub target: NodeId,
}

/// A route entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Public api
    pub api: NodeId,
    /// Path
    pub path: String,
    /// Method name
    pub method: String,
    /// Compute function
    pub target: NodeId,
}

/// An origin entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginEntry {
    /// Distribution
    pub distribution: NodeId,
    /// Origin type
    pub kind: OriginKind,
    /// Origin node
    pub origin: NodeId,
}

/// A policy entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Principal
    pub principal: NodeId,
    /// Grants
    pub grants: Vec<Grant>,
}

/// A whole graph as data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Nodes in declaration order
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    /// Schedules
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
    /// Routes
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    /// Distribution origins
    #[serde(default)]
    pub edges: Vec<OriginEntry>,
    /// Declared policies
    #[serde(default)]
    pub policies: Vec<PolicyEntry>,
    /// Outputs
    #[serde(default)]
    pub outputs: IndexMap<String, Output>,
    /// Stack tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl GraphDocument {
    /// Parse a JSON document
    ///
    /// # Errors
    /// Malformed JSON or an unexpected shape.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Build the graph, collecting every rejected call
    ///
    /// # Errors
    /// Every `DeclarationError`, in document order.
    pub fn into_graph(self) -> Result<Graph, Vec<DeclarationError>> {
        let mut graph = Graph::new();
        let mut errors = Vec::new();

        for entry in self.nodes {
            let kind = match entry.kind.parse::<ResourceKind>() {
                Ok(kind) => kind,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };
            let mut decl = NodeDeclaration::new(kind, entry.id).with_properties(entry.properties);
            for dep in entry.depends_on {
                decl = decl.with_dependency(dep);
            }
            if let Err(err) = graph.create_node(decl) {
                errors.push(err);
            }
        }

        for entry in self.schedules {
            let result = u64::try_from(entry.cadence_seconds)
                .ok()
                .filter(|seconds| *seconds > 0)
                .ok_or_else(|| DeclarationError::InvalidCadence {
                    schedule: entry.id.clone(),
                    seconds: entry.cadence_seconds,
                })
                .and_then(|seconds| {
                    ScheduleBinder::bind(&mut graph, entry.id, Duration::from_secs(seconds), entry.target)
                });
            if let Err(err) = result {
                errors.push(err);
            }
        }

        for entry in self.routes {
            let result = entry
                .method
                .parse::<HttpMethod>()
                .and_then(|method| EdgeRouter::add_route(&mut graph, entry.api, entry.path, method, entry.target));
            if let Err(err) = result {
                errors.push(err);
            }
        }

        for entry in self.edges {
            if let Err(err) = EdgeRouter::attach_edge(&mut graph, entry.distribution, entry.kind, entry.origin) {
                errors.push(err);
            }
        }

        for entry in self.policies {
            if let Err(err) =
                AccessPolicyBuilder::attach(&mut graph, &entry.principal, &entry.grants, PolicyOrigin::Declared)
            {
                errors.push(err);
            }
        }

        for (name, output) in self.outputs {
            if let Err(err) = graph.add_output(name, output) {
                errors.push(err);
            }
        }

        for (key, value) in self.tags {
            graph.add_tag(key, value);
        }

        if errors.is_empty() {
            tracing::debug!(nodes = graph.len(), "document loaded");
            Ok(graph)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_every_error() {
        let doc = GraphDocument::from_json(
            r#"{
                "nodes": [
                    { "id": "a", "kind": "Secret", "properties": { "name": "a" } },
                    { "id": "a", "kind": "Secret", "properties": { "name": "again" } },
                    { "id": "b", "kind": "Queue" },
                    { "id": "c", "kind": "ComputeFunction" }
                ],
                "routes": [
                    { "api": "api", "path": "/chat", "method": "FETCH", "target": "c" }
                ]
            }"#,
        )
        .unwrap();

        let errors = doc.into_graph().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert_eq!(errors[0], DeclarationError::DuplicateId { id: "a".into() });
        assert_eq!(errors[1], DeclarationError::UnknownKind { kind: "Queue".into() });
        assert!(matches!(errors[2], DeclarationError::MissingRequiredProperty { .. }));
        assert!(matches!(errors[3], DeclarationError::InvalidMethod { .. }));
    }

    #[test]
    fn test_negative_cadence_rejected() {
        let doc = GraphDocument {
            schedules: vec![ScheduleEntry {
                id: "tick".into(),
                cadence_seconds: -60,
                target: "fetcher".into(),
            }],
            ..GraphDocument::default()
        };
        assert_eq!(
            doc.into_graph().unwrap_err(),
            vec![DeclarationError::InvalidCadence {
                schedule: "tick".into(),
                seconds: -60,
            }]
        );
    }

    #[test]
    fn test_grant_document_form() {
        let doc = GraphDocument::from_json(
            r#"{
                "nodes": [
                    { "id": "data", "kind": "object_store", "properties": { "visibility": "private" } },
                    { "id": "role", "kind": "AccessRole", "properties": { "trustedPrincipal": "lambda.amazonaws.com" } }
                ],
                "policies": [
                    { "principal": "role", "grants": [
                        { "actions": ["read"], "scope": "node", "node": "data" },
                        { "actions": ["bedrock:InvokeModel"], "scope": "unscoped", "justification": "model class" }
                    ] }
                ],
                "tags": { "Project": "demo" }
            }"#,
        )
        .unwrap();

        let graph = doc.into_graph().unwrap();
        assert_eq!(graph.policies()[0].statements.len(), 3);
        assert_eq!(graph.broad_grant_report().len(), 1);
        assert_eq!(graph.tags()["Project"], "demo");
    }
}
