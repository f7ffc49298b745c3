//! The emitted deployment artifact

use crate::edge::{EdgeOrigin, HttpMethod};
use crate::error::SynthesisError;
use crate::graph::{DependencyEdge, Graph};
use crate::kind::ResourceKind;
use crate::policy::BroadGrantReport;
use crate::reference::{ResolvedPolicy, ResolvedValues};
use crate::types::NodeId;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Property on a `PublicApi` node copied onto each of its routes
pub const CORS_PROPERTY: &str = "cors";

/// A resource descriptor with every deferred value substituted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNode {
    /// Node id
    pub id: NodeId,
    /// Kind
    pub kind: ResourceKind,
    /// Creation ordinal; placeholders refer to it
    pub ordinal: usize,
    /// Distinct dependencies, all earlier in the artifact
    pub depends_on: Vec<NodeId>,
    /// Resolved properties
    pub properties: BTreeMap<String, JsonValue>,
}

/// An exported value after resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedOutput {
    /// Literal or placeholder value
    pub value: JsonValue,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Export name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_name: Option<String>,
}

/// A route with the api's CORS settings applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRoute {
    /// Public api
    pub api: NodeId,
    /// Path
    pub path: String,
    /// Method
    pub method: HttpMethod,
    /// Compute function
    pub target: NodeId,
    /// CORS settings of the api, identical across its routes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<JsonValue>,
}

/// Ordered, fully resolved stack description
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Nodes in apply order
    pub ordered_nodes: Vec<ResolvedNode>,
    /// Outputs in declaration order
    pub outputs: IndexMap<String, ResolvedOutput>,
    /// Policy attachments in attachment order
    pub policies: Vec<ResolvedPolicy>,
    /// Routes in registration order
    pub routes: Vec<ResolvedRoute>,
    /// Distribution origins
    pub origins: Vec<EdgeOrigin>,
    /// Every dependency edge
    pub edges: Vec<DependencyEdge>,
    /// Audit list of `"*"` grants
    pub broad_grant_report: BroadGrantReport,
    /// Stack-wide tags
    pub tags: BTreeMap<String, String>,
    /// Hex sha256 of the canonical JSON of every other field
    pub digest: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactBody<'a> {
    ordered_nodes: &'a [ResolvedNode],
    outputs: &'a IndexMap<String, ResolvedOutput>,
    policies: &'a [ResolvedPolicy],
    routes: &'a [ResolvedRoute],
    origins: &'a [EdgeOrigin],
    edges: &'a [DependencyEdge],
    broad_grant_report: &'a BroadGrantReport,
    tags: &'a BTreeMap<String, String>,
}

impl Artifact {
    /// Assemble from a graph, its apply order and its resolved values
    pub(crate) fn assemble(
        graph: &Graph,
        order: &[NodeId],
        mut resolved: ResolvedValues,
    ) -> Result<Self, SynthesisError> {
        let edges = graph.dependency_edges();
        let deps = Graph::dependency_map(&edges);

        let ordered_nodes = order
            .iter()
            .filter_map(|id| {
                let node = graph.node(id)?;
                Some(ResolvedNode {
                    id: id.clone(),
                    kind: node.kind(),
                    ordinal: node.ordinal(),
                    depends_on: deps
                        .get(id)
                        .map(|targets| targets.iter().map(|&to| to.clone()).collect())
                        .unwrap_or_default(),
                    properties: resolved.nodes.swap_remove(id).unwrap_or_default(),
                })
            })
            .collect::<Vec<_>>();

        let outputs = graph
            .outputs()
            .iter()
            .map(|(name, output)| {
                let value = resolved.outputs.swap_remove(name).unwrap_or(JsonValue::Null);
                (
                    name.clone(),
                    ResolvedOutput {
                        value,
                        description: output.description.clone(),
                        export_name: output.export_name.clone(),
                    },
                )
            })
            .collect();

        let cors_by_api: HashMap<&NodeId, &JsonValue> = ordered_nodes
            .iter()
            .filter_map(|node| Some((&node.id, node.properties.get(CORS_PROPERTY)?)))
            .collect();
        let routes = graph
            .routes()
            .iter()
            .map(|route| ResolvedRoute {
                api: route.api.clone(),
                path: route.path.clone(),
                method: route.method,
                target: route.target.clone(),
                cors: cors_by_api.get(&route.api).map(|&cors| cors.clone()),
            })
            .collect();

        let mut artifact = Self {
            ordered_nodes,
            outputs,
            policies: resolved.policies,
            routes,
            origins: graph.origins().to_vec(),
            edges,
            broad_grant_report: graph.broad_grant_report(),
            tags: graph.tags().clone(),
            digest: String::new(),
        };
        artifact.digest = artifact.compute_digest()?;
        Ok(artifact)
    }

    fn compute_digest(&self) -> Result<String, SynthesisError> {
        let body = ArtifactBody {
            ordered_nodes: &self.ordered_nodes,
            outputs: &self.outputs,
            policies: &self.policies,
            routes: &self.routes,
            origins: &self.origins,
            edges: &self.edges,
            broad_grant_report: &self.broad_grant_report,
            tags: &self.tags,
        };
        let bytes = serde_json::to_vec(&body).map_err(|e| SynthesisError::Encoding(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Whether `digest` matches the current contents
    #[must_use]
    pub fn verify_digest(&self) -> bool {
        self.compute_digest().is_ok_and(|digest| digest == self.digest)
    }

    /// Position of a node in apply order
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.ordered_nodes.iter().position(|node| node.id.as_str() == id)
    }

    /// Resolved node by id
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&ResolvedNode> {
        self.ordered_nodes.iter().find(|node| node.id.as_str() == id)
    }

    /// Resolved output by name
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&ResolvedOutput> {
        self.outputs.get(name)
    }

    /// Pretty JSON rendering
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
