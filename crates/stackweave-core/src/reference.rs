//! Reference checking and placeholder substitution
//!
//! A [`Reference`] names an output attribute of another node. Resolution
//! never invents values: each reference becomes a [`Placeholder`] token
//! keyed by the target's creation ordinal, which the deployment executor
//! replaces once the target exists.

use crate::error::Violation;
use crate::graph::Graph;
use crate::policy::{Effect, PolicyOrigin};
use crate::types::{NodeId, Reference, Value};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Token standing in for a deferred attribute: `${<ordinal>:<node>.<attribute>}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placeholder {
    /// Creation ordinal of the target node
    pub ordinal: usize,
    /// Target node
    pub node: NodeId,
    /// Output attribute
    pub attribute: String,
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}:{}.{}}}", self.ordinal, self.node, self.attribute)
    }
}

/// A policy statement with concrete or placeholder resources
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStatement {
    /// Effect
    pub effect: Effect,
    /// Actions, sorted
    pub actions: BTreeSet<String>,
    /// Resources
    pub resources: Vec<JsonValue>,
}

/// A policy attachment after resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPolicy {
    /// Principal
    pub principal: NodeId,
    /// Why the policy exists
    pub origin: PolicyOrigin,
    /// Statements
    pub statements: Vec<ResolvedStatement>,
}

/// Every deferred value of a graph, resolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedValues {
    /// Node properties, in resolution order
    pub nodes: IndexMap<NodeId, BTreeMap<String, JsonValue>>,
    /// Outputs, in declaration order
    pub outputs: IndexMap<String, JsonValue>,
    /// Policies, in attachment order
    pub policies: Vec<ResolvedPolicy>,
}

/// Checks and resolves the references of one graph
#[derive(Debug, Clone, Copy)]
pub struct ReferenceResolver<'g> {
    graph: &'g Graph,
}

impl<'g> ReferenceResolver<'g> {
    /// Resolver over `graph`
    #[must_use]
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Every dangling or ill-typed reference in the graph
    ///
    /// Covers node properties, explicit dependencies, policy resources and
    /// output values, in that order.
    #[must_use]
    pub fn check(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        for node in self.graph.nodes() {
            let from = node.id().to_string();
            for (_, reference) in node.references() {
                if let Err(violation) = self.placeholder(&from, reference) {
                    violations.push(violation);
                }
            }
            for dep in node.depends_on() {
                if !self.graph.contains(dep) {
                    violations.push(Violation::DanglingReference {
                        from: from.clone(),
                        target: dep.clone(),
                    });
                }
            }
        }

        for attachment in self.graph.policies() {
            let from = format!("policy:{}", attachment.principal);
            for statement in &attachment.statements {
                for reference in statement.resources.iter().flat_map(Value::references) {
                    if let Err(violation) = self.placeholder(&from, reference) {
                        violations.push(violation);
                    }
                }
            }
        }

        for (name, output) in self.graph.outputs() {
            let from = format!("output:{name}");
            for reference in output.value.references() {
                if let Err(violation) = self.placeholder(&from, reference) {
                    violations.push(violation);
                }
            }
        }

        violations
    }

    /// Placeholder for `reference`, checked against the graph
    ///
    /// # Errors
    /// `DanglingReference` or `UnknownAttribute`, attributed to `from`.
    pub fn placeholder(&self, from: &str, reference: &Reference) -> Result<Placeholder, Violation> {
        let target = self
            .graph
            .node(&reference.node)
            .ok_or_else(|| Violation::DanglingReference {
                from: from.to_string(),
                target: reference.node.clone(),
            })?;

        if !target.kind().produces(&reference.attribute) {
            return Err(Violation::UnknownAttribute {
                from: from.to_string(),
                target: reference.node.clone(),
                kind: target.kind(),
                attribute: reference.attribute.clone(),
            });
        }

        Ok(Placeholder {
            ordinal: target.ordinal(),
            node: reference.node.clone(),
            attribute: reference.attribute.clone(),
        })
    }

    /// Resolve one value
    ///
    /// References become placeholder strings; joins become the
    /// concatenation of their resolved parts.
    ///
    /// # Errors
    /// The first bad reference found.
    pub fn resolve_value(&self, from: &str, value: &Value) -> Result<JsonValue, Violation> {
        Ok(match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => JsonValue::Number(n.clone()),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.resolve_value(from, item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.resolve_value(from, item)?)))
                    .collect::<Result<_, Violation>>()?,
            ),
            Value::Ref { reference } => JsonValue::String(self.placeholder(from, reference)?.to_string()),
            Value::Join { join } => {
                let mut out = String::new();
                for part in join {
                    match self.resolve_value(from, part)? {
                        JsonValue::String(s) => out.push_str(&s),
                        JsonValue::Null => {}
                        other => out.push_str(&other.to_string()),
                    }
                }
                JsonValue::String(out)
            }
        })
    }

    /// Resolve everything, nodes in declaration order
    ///
    /// # Errors
    /// Every bad reference, batched.
    pub fn resolve(&self) -> Result<ResolvedValues, Vec<Violation>> {
        let order: Vec<NodeId> = self.graph.nodes().map(|node| node.id().clone()).collect();
        self.resolve_in(&order)
    }

    /// Resolve everything, nodes in `order`
    ///
    /// Ids in `order` that are not in the graph are reported as dangling.
    ///
    /// # Errors
    /// Every bad reference, batched.
    pub fn resolve_in(&self, order: &[NodeId]) -> Result<ResolvedValues, Vec<Violation>> {
        let mut resolved = ResolvedValues::default();
        let mut violations = Vec::new();

        for id in order {
            let Some(node) = self.graph.node(id) else {
                violations.push(Violation::DanglingReference {
                    from: "order".to_string(),
                    target: id.clone(),
                });
                continue;
            };
            let from = id.to_string();
            let mut properties = BTreeMap::new();
            for (key, value) in node.properties() {
                match self.resolve_value(&from, value) {
                    Ok(json) => {
                        properties.insert(key.clone(), json);
                    }
                    Err(violation) => violations.push(violation),
                }
            }
            resolved.nodes.insert(id.clone(), properties);
        }

        for (name, output) in self.graph.outputs() {
            match self.resolve_value(&format!("output:{name}"), &output.value) {
                Ok(json) => {
                    resolved.outputs.insert(name.clone(), json);
                }
                Err(violation) => violations.push(violation),
            }
        }

        for attachment in self.graph.policies() {
            let from = format!("policy:{}", attachment.principal);
            let mut statements = Vec::with_capacity(attachment.statements.len());
            for statement in &attachment.statements {
                let mut resources = Vec::with_capacity(statement.resources.len());
                for resource in &statement.resources {
                    match self.resolve_value(&from, resource) {
                        Ok(json) => resources.push(json),
                        Err(violation) => violations.push(violation),
                    }
                }
                statements.push(ResolvedStatement {
                    effect: statement.effect,
                    actions: statement.actions.clone(),
                    resources,
                });
            }
            resolved.policies.push(ResolvedPolicy {
                principal: attachment.principal.clone(),
                origin: attachment.origin.clone(),
                statements,
            });
        }

        if violations.is_empty() {
            Ok(resolved)
        } else {
            Err(violations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Output;
    use crate::kind::ResourceKind;
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
                    .with_property("trustedPrincipal", "lambda.amazonaws.com")
                    .with_property(
                        "bucketPath",
                        Value::join([Value::reference("data", "identifier"), Value::from("/*")]),
                    ),
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_placeholder_token_format() {
        let placeholder = Placeholder {
            ordinal: 3,
            node: "data".into(),
            attribute: "identifier".into(),
        };
        assert_eq!(placeholder.to_string(), "${3:data.identifier}");
    }

    #[test]
    fn test_join_resolves_to_concatenation() {
        let graph = graph();
        let resolved = ReferenceResolver::new(&graph).resolve().unwrap();

        assert_eq!(
            resolved.nodes[&NodeId::new("role")]["bucketPath"],
            JsonValue::String("${0:data.identifier}/*".into())
        );
    }

    #[test]
    fn test_check_reports_dangling_and_unknown_attribute() {
        let mut graph = graph();
        graph
            .add_output("Missing", Output::new(Value::reference("ghost", "url")))
            .unwrap();
        graph
            .add_output("Wrong", Output::new(Value::reference("data", "url")))
            .unwrap();

        let violations = ReferenceResolver::new(&graph).check();
        assert_eq!(
            violations,
            vec![
                Violation::DanglingReference {
                    from: "output:Missing".into(),
                    target: "ghost".into(),
                },
                Violation::UnknownAttribute {
                    from: "output:Wrong".into(),
                    target: "data".into(),
                    kind: ResourceKind::ObjectStore,
                    attribute: "url".into(),
                },
            ]
        );
    }

    #[test]
    fn test_check_reports_undeclared_dependency() {
        let mut graph = graph();
        graph
            .create_node(
                NodeDeclaration::new(ResourceKind::Secret, "secret")
                    .with_property("name", "token")
                    .with_dependency("nowhere"),
            )
            .unwrap();

        assert_eq!(
            ReferenceResolver::new(&graph).check(),
            vec![Violation::DanglingReference {
                from: "secret".into(),
                target: "nowhere".into(),
            }]
        );
    }

    #[test]
    fn test_resolve_in_follows_given_order() {
        let graph = graph();
        let resolved = ReferenceResolver::new(&graph)
            .resolve_in(&["role".into(), "data".into()])
            .unwrap();
        let ids: Vec<&str> = resolved.nodes.keys().map(NodeId::as_str).collect();
        assert_eq!(ids, vec!["role", "data"]);
    }
}
