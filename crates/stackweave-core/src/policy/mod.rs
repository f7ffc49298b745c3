//! Least-privilege access synthesis
//!
//! [`AccessPolicyBuilder`] turns grants (actions on a target) into
//! [`PolicyStatement`]s scoped as narrowly as the target kind allows:
//!
//! - node targets scope to the node's scope attribute, or its child path
//! - external targets scope to a fixed identifier declared outside the graph
//! - unscoped targets scope to `"*"` and land in the [`BroadGrantReport`]
//!
//! Broad grants are never dropped; each must carry a justification, which
//! the synthesizer checks.

pub mod catalog;

use crate::error::DeclarationError;
use crate::graph::Graph;
use crate::kind::ResourceKind;
use crate::types::{NodeId, Value};
use catalog::ActionScope;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Literal resource for unscoped statements
pub const WILDCARD: &str = "*";

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Permit the actions
    Allow,
    /// Forbid the actions
    Deny,
}

/// An allow/deny rule over a resource scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatement {
    /// Effect
    pub effect: Effect,
    /// Actions, sorted
    pub actions: BTreeSet<String>,
    /// Resource scopes; literals or deferred values
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    /// Allow statement
    #[must_use]
    pub fn allow(
        actions: impl IntoIterator<Item = impl Into<String>>,
        resources: impl IntoIterator<Item = Value>,
    ) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().collect(),
        }
    }

    /// Whether any resource is the literal wildcard
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.resources
            .iter()
            .any(|resource| resource.as_str() == Some(WILDCARD))
    }
}

/// What a grant applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum GrantTarget {
    /// A node of the graph
    Node {
        /// Target node
        node: NodeId,
    },
    /// A resource declared outside the graph, by fixed identifier
    External {
        /// Kind used to check and scope the actions
        kind: ResourceKind,
        /// Fixed identifier of the resource
        identifier: String,
    },
    /// A resource with no graph kind, such as a knowledge base
    Foreign {
        /// Fixed identifier naming the resource type of every action
        identifier: String,
    },
    /// Class-level actions with no per-instance identifier
    Unscoped {
        /// Why the broad grant is needed
        #[serde(default)]
        justification: String,
    },
}

/// A request for actions on one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Concrete actions or access aliases (`read`, `write`, …)
    pub actions: Vec<String>,
    /// Target
    #[serde(flatten)]
    pub target: GrantTarget,
}

impl Grant {
    /// Grant on a node of the graph
    #[must_use]
    pub fn on(node: impl Into<NodeId>, actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            target: GrantTarget::Node { node: node.into() },
        }
    }

    /// Grant on a resource outside the graph
    #[must_use]
    pub fn external(
        kind: ResourceKind,
        identifier: impl Into<String>,
        actions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            target: GrantTarget::External {
                kind,
                identifier: identifier.into(),
            },
        }
    }

    /// Grant on a resource that has no graph kind
    #[must_use]
    pub fn foreign(identifier: impl Into<String>, actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            target: GrantTarget::Foreign {
                identifier: identifier.into(),
            },
        }
    }

    /// Broad grant of class-level actions
    #[must_use]
    pub fn unscoped(
        actions: impl IntoIterator<Item = impl Into<String>>,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            target: GrantTarget::Unscoped {
                justification: justification.into(),
            },
        }
    }
}

/// An access statement whose scope is unbounded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadGrant {
    /// Principal receiving the grant
    pub principal: NodeId,
    /// Actions granted on `"*"`
    pub actions: Vec<String>,
    /// Why no narrower scope is possible
    pub justification: String,
}

impl BroadGrant {
    /// Whether the justification has content
    #[inline]
    #[must_use]
    pub fn is_justified(&self) -> bool {
        !self.justification.trim().is_empty()
    }
}

/// Audit ledger of every broad grant in a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadGrantReport {
    entries: Vec<BroadGrant>,
}

impl BroadGrantReport {
    pub(crate) fn from_entries(entries: Vec<BroadGrant>) -> Self {
        Self { entries }
    }

    /// Entries in attachment order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[BroadGrant] {
        &self.entries
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no broad grants
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries lacking a justification
    pub fn unjustified(&self) -> impl Iterator<Item = &BroadGrant> + '_ {
        self.entries.iter().filter(|entry| !entry.is_justified())
    }
}

/// Why a policy exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyOrigin {
    /// Declared by the stack author
    Declared,
    /// Generated so a schedule can invoke its target
    ScheduleInvoke {
        /// Schedule rule
        schedule: NodeId,
    },
    /// Generated so an api can invoke a route target
    RouteInvoke {
        /// Public api
        api: NodeId,
    },
}

/// Statements built for one principal, not yet attached to a graph
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyGrant {
    /// Principal receiving the statements
    pub principal: NodeId,
    /// Statements
    pub statements: Vec<PolicyStatement>,
    /// Broad grants among the statements
    pub broad_grants: Vec<BroadGrant>,
}

impl PolicyGrant {
    /// Empty grant for `principal`
    #[must_use]
    pub fn new(principal: impl Into<NodeId>) -> Self {
        Self {
            principal: principal.into(),
            statements: Vec::new(),
            broad_grants: Vec::new(),
        }
    }

    /// With a hand-built statement
    #[must_use]
    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }
}

/// A policy recorded in a graph
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyAttachment {
    /// Principal
    pub principal: NodeId,
    /// Declared or derived
    pub origin: PolicyOrigin,
    /// Statements
    pub statements: Vec<PolicyStatement>,
    /// Broad grants among the statements
    pub broad_grants: Vec<BroadGrant>,
}

/// Builds least-privilege statements against a graph
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicyBuilder<'g> {
    graph: &'g Graph,
}

impl<'g> AccessPolicyBuilder<'g> {
    /// Builder reading kinds from `graph`
    #[must_use]
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Build statements binding `principal` to every grant
    ///
    /// One statement per (grant, scope) pair, instance scope before child
    /// scope. Unscoped grants produce one `"*"` statement and one
    /// [`BroadGrant`] each.
    ///
    /// # Errors
    /// - `UnknownNode` if the principal or a node target is undeclared
    /// - `InvalidPrincipal` if the principal kind has no identity
    /// - `EmptyActions` for a grant without actions
    /// - `UnsupportedAction` for an action the target kind does not know
    pub fn build_policy(
        &self,
        principal: &NodeId,
        grants: &[Grant],
    ) -> Result<PolicyGrant, DeclarationError> {
        let principal_node = self.graph.require_node(principal)?;
        if !principal_node.kind().is_principal() {
            return Err(DeclarationError::InvalidPrincipal {
                id: principal.clone(),
                kind: principal_node.kind(),
            });
        }

        let mut policy = PolicyGrant::new(principal.clone());

        for grant in grants {
            if grant.actions.is_empty() {
                return Err(DeclarationError::EmptyActions {
                    principal: principal.clone(),
                });
            }

            match &grant.target {
                GrantTarget::Node { node } => {
                    let kind = self.graph.require_node(node)?.kind();
                    let attribute = kind.schema().scope_attribute;
                    for (scope, actions) in group_by_scope(kind, &grant.actions)? {
                        let instance = Value::reference(node.clone(), attribute);
                        let resource = match scope {
                            ActionScope::Instance => instance,
                            ActionScope::Child => Value::join([instance, Value::from("/*")]),
                        };
                        policy
                            .statements
                            .push(PolicyStatement::allow(actions, [resource]));
                    }
                }
                GrantTarget::External { kind, identifier } => {
                    for (scope, actions) in group_by_scope(*kind, &grant.actions)? {
                        let resource = match scope {
                            ActionScope::Instance => identifier.clone(),
                            ActionScope::Child => format!("{identifier}/*"),
                        };
                        policy
                            .statements
                            .push(PolicyStatement::allow(actions, [Value::from(resource)]));
                    }
                }
                GrantTarget::Foreign { identifier } => {
                    let actions: BTreeSet<String> = grant.actions.iter().cloned().collect();
                    if let Some(action) = actions.iter().find(|action| {
                        !catalog::foreign_resource_type(action)
                            .is_some_and(|resource_type| identifier.contains(&format!(":{resource_type}/")))
                    }) {
                        return Err(DeclarationError::UnsupportedAction {
                            action: action.clone(),
                            kind: identifier.clone(),
                        });
                    }
                    policy
                        .statements
                        .push(PolicyStatement::allow(actions, [Value::from(identifier.clone())]));
                }
                GrantTarget::Unscoped { justification } => {
                    let actions: BTreeSet<String> = grant.actions.iter().cloned().collect();
                    if let Some(action) = actions
                        .iter()
                        .find(|action| catalog::unscoped_reason(action).is_none())
                    {
                        return Err(DeclarationError::UnsupportedAction {
                            action: action.clone(),
                            kind: "unscoped resources".to_string(),
                        });
                    }
                    policy.broad_grants.push(BroadGrant {
                        principal: principal.clone(),
                        actions: actions.iter().cloned().collect(),
                        justification: justification.clone(),
                    });
                    policy
                        .statements
                        .push(PolicyStatement::allow(actions, [Value::from(WILDCARD)]));
                }
            }
        }

        Ok(policy)
    }

    /// Build and attach in one step
    pub fn attach(
        graph: &mut Graph,
        principal: &NodeId,
        grants: &[Grant],
        origin: PolicyOrigin,
    ) -> Result<(), DeclarationError> {
        let policy = AccessPolicyBuilder::new(graph).build_policy(principal, grants)?;
        graph.attach_policy(policy, origin)
    }
}

/// Expand aliases and bucket concrete actions by scope
fn group_by_scope(
    kind: ResourceKind,
    actions: &[String],
) -> Result<BTreeMap<ActionScope, BTreeSet<String>>, DeclarationError> {
    let mut grouped: BTreeMap<ActionScope, BTreeSet<String>> = BTreeMap::new();
    for requested in actions {
        for action in catalog::expand(kind, requested) {
            let scope = catalog::scope_for(kind, &action).ok_or_else(|| {
                DeclarationError::UnsupportedAction {
                    action: action.clone(),
                    kind: kind.to_string(),
                }
            })?;
            grouped.entry(scope).or_default().insert(action);
        }
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeDeclaration;

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph
            .create_node(
                NodeDeclaration::new(ResourceKind::ObjectStore, "data")
                    .with_property("visibility", "private"),
            )
            .unwrap();
        graph
            .create_node(
                NodeDeclaration::new(ResourceKind::AccessRole, "role")
                    .with_property("trustedPrincipal", "lambda.amazonaws.com"),
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_object_store_grant_scopes_to_instance_and_children() {
        let graph = graph();
        let policy = AccessPolicyBuilder::new(&graph)
            .build_policy(&"role".into(), &[Grant::on("data", ["read", "write"])])
            .unwrap();

        assert_eq!(policy.statements.len(), 2);
        assert_eq!(
            policy.statements[0],
            PolicyStatement::allow(["s3:ListBucket"], [Value::reference("data", "identifier")])
        );
        assert_eq!(
            policy.statements[1],
            PolicyStatement::allow(
                ["s3:GetObject", "s3:GetObjectVersion", "s3:PutObject"],
                [Value::join([
                    Value::reference("data", "identifier"),
                    Value::from("/*")
                ])]
            )
        );
        assert!(policy.broad_grants.is_empty());
    }

    #[test]
    fn test_unsupported_action_names_kind() {
        let graph = graph();
        let err = AccessPolicyBuilder::new(&graph)
            .build_policy(&"role".into(), &[Grant::on("data", ["lambda:InvokeFunction"])])
            .unwrap_err();

        assert_eq!(
            err,
            DeclarationError::UnsupportedAction {
                action: "lambda:InvokeFunction".into(),
                kind: "ObjectStore".into(),
            }
        );
    }

    #[test]
    fn test_unscoped_grant_records_broad_grant() {
        let graph = graph();
        let policy = AccessPolicyBuilder::new(&graph)
            .build_policy(
                &"role".into(),
                &[Grant::unscoped(["bedrock:InvokeModel"], "model class access")],
            )
            .unwrap();

        assert_eq!(policy.broad_grants.len(), 1);
        assert!(policy.statements[0].is_wildcard());
        assert!(policy.broad_grants[0].is_justified());
    }

    #[test]
    fn test_unscoped_grant_rejects_scoped_action() {
        let graph = graph();
        let err = AccessPolicyBuilder::new(&graph)
            .build_policy(&"role".into(), &[Grant::unscoped(["s3:GetObject"], "why not")])
            .unwrap_err();
        assert!(matches!(err, DeclarationError::UnsupportedAction { .. }));
    }

    #[test]
    fn test_external_grant_uses_fixed_identifier() {
        let graph = graph();
        let policy = AccessPolicyBuilder::new(&graph)
            .build_policy(
                &"role".into(),
                &[Grant::external(
                    ResourceKind::ObjectStore,
                    "arn:aws:s3:::archive",
                    ["s3:GetObject"],
                )],
            )
            .unwrap();

        assert_eq!(
            policy.statements[0].resources,
            vec![Value::from("arn:aws:s3:::archive/*")]
        );
    }

    #[test]
    fn test_foreign_grant_scopes_to_knowledge_base() {
        let graph = graph();
        let arn = "arn:aws:bedrock:ap-northeast-2:123456789012:knowledge-base/PGQV3JXPET";
        let policy = AccessPolicyBuilder::new(&graph)
            .build_policy(
                &"role".into(),
                &[Grant::foreign(arn, ["bedrock:RetrieveAndGenerate", "bedrock:Retrieve"])],
            )
            .unwrap();

        assert_eq!(policy.statements.len(), 1);
        assert_eq!(policy.statements[0].resources, vec![Value::from(arn)]);
        assert!(!policy.statements[0].is_wildcard());
        assert!(policy.broad_grants.is_empty());
    }

    #[test]
    fn test_foreign_grant_must_name_its_resource_type() {
        let graph = graph();
        let builder = AccessPolicyBuilder::new(&graph);

        for (identifier, action) in [
            ("*", "bedrock:Retrieve"),
            ("arn:aws:bedrock:*::foundation-model/*", "bedrock:Retrieve"),
            ("arn:aws:bedrock:ap-northeast-2:1:knowledge-base/KB", "s3:GetObject"),
        ] {
            let err = builder
                .build_policy(&"role".into(), &[Grant::foreign(identifier, [action])])
                .unwrap_err();
            assert!(
                matches!(err, DeclarationError::UnsupportedAction { .. }),
                "{identifier} {action}: {err}"
            );
        }
    }

    #[test]
    fn test_bucket_cannot_be_principal() {
        let graph = graph();
        let err = AccessPolicyBuilder::new(&graph)
            .build_policy(&"data".into(), &[Grant::on("data", ["read"])])
            .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidPrincipal { .. }));
    }

    #[test]
    fn test_attach_adds_policy_resource_edge() {
        let mut graph = graph();
        AccessPolicyBuilder::attach(
            &mut graph,
            &"role".into(),
            &[Grant::on("data", ["read"])],
            PolicyOrigin::Declared,
        )
        .unwrap();

        assert_eq!(graph.policies().len(), 1);
        assert_eq!(graph.dependencies_of(&"role".into()), vec![NodeId::new("data")]);
    }
}
