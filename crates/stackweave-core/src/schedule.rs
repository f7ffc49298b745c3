//! Time-based triggers
//!
//! [`ScheduleBinder::bind`] declares a `ScheduleRule` node firing a compute
//! function at a fixed cadence. The binding is explicit in the graph: a
//! `ScheduleTarget` edge to the function and an invoke grant for the
//! schedule's identity.

use crate::error::DeclarationError;
use crate::graph::{EdgeReason, Graph};
use crate::kind::ResourceKind;
use crate::node::NodeDeclaration;
use crate::policy::{AccessPolicyBuilder, Grant, PolicyOrigin};
use crate::types::{NodeId, Value};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Property carrying the cadence in whole seconds
pub const CADENCE_PROPERTY: &str = "cadenceSeconds";
/// Property carrying the target reference
pub const TARGET_PROPERTY: &str = "target";

/// A bound schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    /// Schedule node id
    pub id: NodeId,
    /// Interval between invocations
    pub cadence: Duration,
    /// Compute function fired
    pub target: NodeId,
}

impl ScheduleRule {
    /// `rate(...)` expression for the cadence
    #[must_use]
    pub fn expression(&self) -> String {
        rate_expression(self.cadence)
    }
}

/// Binds schedules to compute functions
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleBinder;

impl ScheduleBinder {
    /// Declare a schedule `id` firing `target` every `cadence`
    ///
    /// Cadence is truncated to whole seconds.
    ///
    /// # Errors
    /// - `InvalidCadence` if the cadence is under one second
    /// - `UnknownNode` / `KindMismatch` if `target` is not a declared
    ///   ComputeFunction
    /// - `DuplicateId` if `id` is taken
    pub fn bind(
        graph: &mut Graph,
        id: impl Into<NodeId>,
        cadence: Duration,
        target: impl Into<NodeId>,
    ) -> Result<ScheduleRule, DeclarationError> {
        let id = id.into();
        let target = target.into();

        let seconds = cadence.as_secs();
        if seconds == 0 {
            return Err(DeclarationError::InvalidCadence {
                schedule: id,
                seconds: 0,
            });
        }
        graph.require_kind(&target, ResourceKind::ComputeFunction)?;

        let rule = ScheduleRule {
            id: id.clone(),
            cadence: Duration::from_secs(seconds),
            target: target.clone(),
        };

        let description = format!("Fire {target} {}", rule.expression());
        graph.create_node(
            NodeDeclaration::new(ResourceKind::ScheduleRule, id.clone())
                .with_property(CADENCE_PROPERTY, seconds)
                .with_property("expression", rule.expression())
                .with_property(TARGET_PROPERTY, Value::reference(target.clone(), "handle"))
                .with_property("description", description),
        )?;
        graph.add_derived_edge(id.clone(), target.clone(), EdgeReason::ScheduleTarget);

        AccessPolicyBuilder::attach(
            graph,
            &id,
            &[Grant::on(target, ["invoke"])],
            PolicyOrigin::ScheduleInvoke { schedule: id.clone() },
        )?;

        tracing::debug!(schedule = %rule.id, target = %rule.target, expression = %rule.expression(), "schedule bound");
        Ok(rule)
    }
}

/// Render a cadence as a `rate(...)` expression, using the largest whole
/// unit (hours, minutes, seconds)
#[must_use]
pub fn rate_expression(cadence: Duration) -> String {
    let seconds = cadence.as_secs();
    let (amount, unit) = if seconds % 3600 == 0 {
        (seconds / 3600, "hour")
    } else if seconds % 60 == 0 {
        (seconds / 60, "minute")
    } else {
        (seconds, "second")
    };
    let plural = if amount == 1 { "" } else { "s" };
    format!("rate({amount} {unit}{plural})")
}
