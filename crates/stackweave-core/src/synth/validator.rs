//! Graph-level invariant checks
//!
//! Every check runs and every violation is collected; nothing
//! short-circuits, so one run reports the whole batch.

use crate::error::Violation;
use crate::graph::Graph;
use crate::kind::ResourceKind;
use crate::policy::catalog;
use crate::reference::ReferenceResolver;
use crate::schedule::{CADENCE_PROPERTY, TARGET_PROPERTY};
use crate::types::Value;

/// Validator over one graph
#[derive(Debug, Clone, Copy)]
pub struct GraphValidator<'g> {
    graph: &'g Graph,
}

impl<'g> GraphValidator<'g> {
    /// Validator over `graph`
    #[must_use]
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Run every check
    #[must_use]
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = ReferenceResolver::new(self.graph).check();
        violations.extend(self.check_schedules());
        violations.extend(self.check_routes());
        violations.extend(self.check_policies());
        violations
    }

    fn check_schedules(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        for node in self
            .graph
            .nodes()
            .filter(|node| node.kind() == ResourceKind::ScheduleRule)
        {
            let cadence = node.property(CADENCE_PROPERTY);
            if !cadence.and_then(Value::as_i64).is_some_and(|seconds| seconds > 0) {
                violations.push(Violation::InvalidCadence {
                    schedule: node.id().clone(),
                    value: cadence.map_or_else(|| "missing".to_string(), describe),
                });
            }

            // dangling targets are reported by the reference check
            if let Some(reference) = node.property(TARGET_PROPERTY).and_then(Value::as_reference) {
                if let Some(target) = self.graph.node(&reference.node) {
                    if target.kind() != ResourceKind::ComputeFunction {
                        violations.push(Violation::ScheduleTargetNotCompute {
                            schedule: node.id().clone(),
                            target: reference.node.clone(),
                        });
                    }
                }
            }
        }

        violations
    }

    fn check_routes(&self) -> Vec<Violation> {
        self.graph
            .routes()
            .iter()
            .filter(|route| {
                self.graph
                    .node(&route.target)
                    .map_or(true, |node| node.kind() != ResourceKind::ComputeFunction)
            })
            .map(|route| Violation::RouteTargetNotCompute {
                api: route.api.clone(),
                path: route.path.clone(),
                target: route.target.clone(),
            })
            .collect()
    }

    fn check_policies(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        for attachment in self.graph.policies() {
            let principal = &attachment.principal;
            match self.graph.node(principal) {
                Some(node) if !node.kind().is_principal() => {
                    violations.push(Violation::InvalidPrincipal {
                        principal: principal.clone(),
                        kind: node.kind(),
                    });
                }
                Some(_) => {}
                None => violations.push(Violation::DanglingReference {
                    from: format!("policy:{principal}"),
                    target: principal.clone(),
                }),
            }

            for statement in &attachment.statements {
                if statement.actions.is_empty() {
                    violations.push(Violation::EmptyActions {
                        principal: principal.clone(),
                    });
                }
                if statement.is_wildcard() {
                    for action in &statement.actions {
                        if catalog::unscoped_reason(action).is_none() {
                            violations.push(Violation::WildcardNotPermitted {
                                principal: principal.clone(),
                                action: action.clone(),
                            });
                        }
                    }
                }
            }
        }

        for grant in self.graph.broad_grant_report().unjustified() {
            violations.push(Violation::MissingJustification {
                principal: grant.principal.clone(),
                actions: grant.actions.clone(),
            });
        }

        violations
    }
}

fn describe(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}
