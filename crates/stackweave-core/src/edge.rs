//! Public surfaces: api routes and distribution origins
//!
//! A route binds `(path, method)` on a `PublicApi` to a `ComputeFunction`.
//! Registering one also grants the api permission to invoke the function,
//! once per `(api, function)` pair. An origin binds an `EdgeDistribution`
//! to the static storage or api it serves.

use crate::error::DeclarationError;
use crate::graph::{EdgeReason, Graph};
use crate::kind::ResourceKind;
use crate::policy::{AccessPolicyBuilder, Grant, PolicyOrigin};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// HTTP method of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// OPTIONS
    Options,
    /// HEAD
    Head,
    /// Any method
    Any,
}

impl HttpMethod {
    /// Upper-case method name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::Any => "ANY",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = DeclarationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            "HEAD" => Ok(Self::Head),
            "ANY" => Ok(Self::Any),
            _ => Err(DeclarationError::InvalidMethod {
                method: s.to_string(),
            }),
        }
    }
}

/// `(path, method)` on an api dispatching to a compute function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Public api
    pub api: NodeId,
    /// Rooted path, e.g. `/chat`
    pub path: String,
    /// Method
    pub method: HttpMethod,
    /// Compute function handling the route
    pub target: NodeId,
}

/// What a distribution fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// An `ObjectStore` served as static content
    StaticStorage,
    /// A `PublicApi`
    PublicApi,
}

impl OriginKind {
    /// Node kind an origin of this type must have
    #[must_use]
    pub const fn expected_kind(self) -> ResourceKind {
        match self {
            Self::StaticStorage => ResourceKind::ObjectStore,
            Self::PublicApi => ResourceKind::PublicApi,
        }
    }
}

/// A distribution serving an origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeOrigin {
    /// `EdgeDistribution` node
    pub distribution: NodeId,
    /// Origin type
    pub kind: OriginKind,
    /// Origin node
    pub origin: NodeId,
}

/// Registers routes and origins on a graph
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeRouter;

impl EdgeRouter {
    /// Register `method path` on `api`, handled by `target`
    ///
    /// # Errors
    /// - `InvalidPath` if `path` does not start with `/`
    /// - `UnknownNode` / `KindMismatch` if `api` is not a PublicApi or
    ///   `target` not a ComputeFunction
    /// - `DuplicateRoute` if `(path, method)` is already registered on `api`
    pub fn add_route(
        graph: &mut Graph,
        api: impl Into<NodeId>,
        path: impl Into<String>,
        method: HttpMethod,
        target: impl Into<NodeId>,
    ) -> Result<(), DeclarationError> {
        let api = api.into();
        let path = path.into();
        let target = target.into();

        if !path.starts_with('/') {
            return Err(DeclarationError::InvalidPath { path });
        }
        graph.require_kind(&api, ResourceKind::PublicApi)?;
        graph.require_kind(&target, ResourceKind::ComputeFunction)?;

        if graph
            .routes()
            .iter()
            .any(|route| route.api == api && route.path == path && route.method == method)
        {
            return Err(DeclarationError::DuplicateRoute { api, path, method });
        }

        let first_for_pair = !graph
            .routes()
            .iter()
            .any(|route| route.api == api && route.target == target);

        if first_for_pair {
            AccessPolicyBuilder::attach(
                graph,
                &api,
                &[Grant::on(target.clone(), ["invoke"])],
                PolicyOrigin::RouteInvoke { api: api.clone() },
            )?;
            graph.add_derived_edge(api.clone(), target.clone(), EdgeReason::RouteTarget);
        }

        tracing::debug!(api = %api, method = %method, path = %path, target = %target, "route registered");
        graph.push_route(Route {
            api,
            path,
            method,
            target,
        });
        Ok(())
    }

    /// Front `origin` with `distribution`
    ///
    /// # Errors
    /// `UnknownNode` / `KindMismatch` if `distribution` is not an
    /// EdgeDistribution or `origin` does not match `kind`.
    pub fn attach_edge(
        graph: &mut Graph,
        distribution: impl Into<NodeId>,
        kind: OriginKind,
        origin: impl Into<NodeId>,
    ) -> Result<(), DeclarationError> {
        let distribution = distribution.into();
        let origin = origin.into();

        graph.require_kind(&distribution, ResourceKind::EdgeDistribution)?;
        graph.require_kind(&origin, kind.expected_kind())?;

        graph.add_derived_edge(distribution.clone(), origin.clone(), EdgeReason::EdgeOrigin);
        tracing::debug!(distribution = %distribution, origin = %origin, ?kind, "edge origin attached");
        graph.push_origin(EdgeOrigin {
            distribution,
            kind,
            origin,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeDeclaration;
    use crate::types::Value;

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph
            .create_node(
                NodeDeclaration::new(ResourceKind::AccessRole, "role")
                    .with_property("trustedPrincipal", "lambda.amazonaws.com"),
            )
            .unwrap();
        for id in ["chatbot", "health"] {
            graph
                .create_node(
                    NodeDeclaration::new(ResourceKind::ComputeFunction, id)
                        .with_property("runtime", "python3.11")
                        .with_property("handler", "index.handler")
                        .with_property("role", Value::reference("role", "handle")),
                )
                .unwrap();
        }
        graph
            .create_node(NodeDeclaration::new(ResourceKind::PublicApi, "api").with_property("name", "chat-api"))
            .unwrap();
        graph
    }

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(
            "FETCH".parse::<HttpMethod>(),
            Err(DeclarationError::InvalidMethod {
                method: "FETCH".into()
            })
        );
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut graph = graph();
        EdgeRouter::add_route(&mut graph, "api", "/chat", HttpMethod::Post, "chatbot").unwrap();
        let err = EdgeRouter::add_route(&mut graph, "api", "/chat", HttpMethod::Post, "health").unwrap_err();

        assert_eq!(
            err,
            DeclarationError::DuplicateRoute {
                api: "api".into(),
                path: "/chat".into(),
                method: HttpMethod::Post,
            }
        );
        assert_eq!(graph.routes().len(), 1);
    }

    #[test]
    fn test_same_path_other_method_allowed() {
        let mut graph = graph();
        EdgeRouter::add_route(&mut graph, "api", "/chat", HttpMethod::Post, "chatbot").unwrap();
        EdgeRouter::add_route(&mut graph, "api", "/chat", HttpMethod::Options, "chatbot").unwrap();

        assert_eq!(graph.routes().len(), 2);
        // one invoke grant per (api, function)
        assert_eq!(graph.policies().len(), 1);
    }

    #[test]
    fn test_relative_path_rejected() {
        let mut graph = graph();
        assert!(matches!(
            EdgeRouter::add_route(&mut graph, "api", "chat", HttpMethod::Post, "chatbot"),
            Err(DeclarationError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_route_target_must_be_function() {
        let mut graph = graph();
        assert!(matches!(
            EdgeRouter::add_route(&mut graph, "api", "/chat", HttpMethod::Post, "role"),
            Err(DeclarationError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_attach_edge_checks_origin_kind() {
        let mut graph = graph();
        graph
            .create_node(
                NodeDeclaration::new(ResourceKind::EdgeDistribution, "cdn")
                    .with_property("defaultRootObject", "index.html"),
            )
            .unwrap();

        assert!(matches!(
            EdgeRouter::attach_edge(&mut graph, "cdn", OriginKind::StaticStorage, "api"),
            Err(DeclarationError::KindMismatch { .. })
        ));
        EdgeRouter::attach_edge(&mut graph, "cdn", OriginKind::PublicApi, "api").unwrap();
        assert_eq!(graph.origins().len(), 1);
        assert_eq!(graph.dependencies_of(&"cdn".into()), vec![NodeId::new("api")]);
    }
}
