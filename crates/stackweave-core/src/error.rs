//! Error types for graph declaration and synthesis
//!
//! Three layers:
//! - [`DeclarationError`]: raised by a single builder call (create a node,
//!   bind a schedule, register a route, build a policy)
//! - [`Violation`]: a graph-level invariant breach found while validating,
//!   ordering or resolving; always collected in batches
//! - [`SynthesisError`]: what a synthesis run returns, carrying the whole
//!   batch so a caller can present every problem at once

use crate::edge::HttpMethod;
use crate::kind::ResourceKind;
use crate::synth::state::{Stage, SynthesisState};
use crate::types::{join_ids, NodeId};

/// A builder call was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    /// Node id already present in the graph
    #[error("duplicate node id `{id}`")]
    DuplicateId {
        /// Id declared twice
        id: NodeId,
    },

    /// Kind name is not in the fixed catalog
    #[error("unknown resource kind `{kind}`")]
    UnknownKind {
        /// Name as written
        kind: String,
    },

    /// Required properties absent from a declaration (all of them listed)
    #[error("node `{id}` ({kind}) is missing required properties: {}", .missing.join(", "))]
    MissingRequiredProperty {
        /// Declared node
        id: NodeId,
        /// Its kind
        kind: ResourceKind,
        /// Absent keys, in schema order
        missing: Vec<String>,
    },

    /// A builder call named a node that has not been declared
    #[error("node `{id}` is not declared")]
    UnknownNode {
        /// Id that was looked up
        id: NodeId,
    },

    /// A builder call named a node of the wrong kind
    #[error("node `{id}` is a {found}, expected {expected}")]
    KindMismatch {
        /// Node named by the call
        id: NodeId,
        /// Kind the call needs
        expected: ResourceKind,
        /// Kind the node was declared with
        found: ResourceKind,
    },

    /// Node kind has no execution identity
    #[error("node `{id}` ({kind}) cannot be the principal of a grant")]
    InvalidPrincipal {
        /// Would-be principal
        id: NodeId,
        /// Its kind
        kind: ResourceKind,
    },

    /// Action not recognized for the target kind
    #[error("action `{action}` is not supported on {kind}")]
    UnsupportedAction {
        /// Action or alias as written
        action: String,
        /// Target kind, or `*` for wildcard grants
        kind: String,
    },

    /// Grant listed no actions
    #[error("grant for `{principal}` names no actions")]
    EmptyActions {
        /// Grantee
        principal: NodeId,
    },

    /// `(path, method)` already registered on the api
    #[error("route {method} {path} is already registered on `{api}`")]
    DuplicateRoute {
        /// Public api
        api: NodeId,
        /// Route path
        path: String,
        /// Route method
        method: HttpMethod,
    },

    /// Route path is not rooted
    #[error("route path `{path}` must start with '/'")]
    InvalidPath {
        /// Path as given
        path: String,
    },

    /// Method name not recognized
    #[error("unknown HTTP method `{method}`")]
    InvalidMethod {
        /// Method as given
        method: String,
    },

    /// Schedule cadence is zero or negative
    #[error("schedule `{schedule}` has non-positive cadence ({seconds}s)")]
    InvalidCadence {
        /// Schedule node
        schedule: NodeId,
        /// Rejected cadence
        seconds: i64,
    },

    /// Output name declared twice
    #[error("output `{name}` is already declared")]
    DuplicateOutput {
        /// Output name
        name: String,
    },
}

/// A graph invariant breach found during synthesis
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    /// Reference or dependency names a node absent from the graph
    #[error("`{from}` refers to undeclared node `{target}`")]
    DanglingReference {
        /// Referring node, policy or output
        from: String,
        /// Missing node
        target: NodeId,
    },

    /// Referenced attribute is not produced by the target's kind
    #[error("`{from}` refers to `{target}.{attribute}`, but {kind} does not produce `{attribute}`")]
    UnknownAttribute {
        /// Referring node, policy or output
        from: String,
        /// Referenced node
        target: NodeId,
        /// Kind of the referenced node
        kind: ResourceKind,
        /// Attribute asked for
        attribute: String,
    },

    /// Dependency cycle; every node of the strongly connected component
    #[error("cyclic dependency between: {}", join_ids(.involved))]
    CyclicDependency {
        /// Members of the cycle, in declaration order
        involved: Vec<NodeId>,
    },

    /// Schedule cadence missing, non-numeric or not positive
    #[error("schedule `{schedule}` has invalid cadence `{value}`")]
    InvalidCadence {
        /// Schedule node
        schedule: NodeId,
        /// Cadence as declared
        value: String,
    },

    /// Schedule target is not a compute function
    #[error("schedule `{schedule}` targets `{target}`, which is not a ComputeFunction")]
    ScheduleTargetNotCompute {
        /// Schedule node
        schedule: NodeId,
        /// Node it fires
        target: NodeId,
    },

    /// Route dispatches to something other than a compute function
    #[error("route {path} on `{api}` targets `{target}`, which is not a ComputeFunction")]
    RouteTargetNotCompute {
        /// Public api
        api: NodeId,
        /// Route path
        path: String,
        /// Node the route dispatches to
        target: NodeId,
    },

    /// Policy principal is not an identity-bearing kind
    #[error("policy principal `{principal}` ({kind}) has no execution identity")]
    InvalidPrincipal {
        /// Policy principal
        principal: NodeId,
        /// Its kind
        kind: ResourceKind,
    },

    /// Statement with an empty action set
    #[error("policy for `{principal}` contains a statement without actions")]
    EmptyActions {
        /// Policy principal
        principal: NodeId,
    },

    /// Wildcard resource on an action that has a narrower scope
    #[error("policy for `{principal}` scopes `{action}` to \"*\" but the action has a per-resource scope")]
    WildcardNotPermitted {
        /// Policy principal
        principal: NodeId,
        /// Scoped action granted on `*`
        action: String,
    },

    /// Broad grant recorded without a justification
    #[error("broad grant of [{}] to `{principal}` has no justification", .actions.join(", "))]
    MissingJustification {
        /// Grantee
        principal: NodeId,
        /// Actions granted on `*`
        actions: Vec<String>,
    },
}

/// Result of a failed synthesis run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// Builder calls were rejected before the graph was complete
    #[error("{} declaration error(s): {}", .0.len(), summarize(.0))]
    Declaration(Vec<DeclarationError>),

    /// Graph invariants failed during a synthesis stage
    #[error("synthesis failed during {stage} with {} violation(s): {}", .violations.len(), summarize(.violations))]
    Failed {
        /// Stage that found the violations
        stage: Stage,
        /// Every violation of that stage
        violations: Vec<Violation>,
    },

    /// Artifact body could not be serialized for digesting
    #[error("artifact encoding failed: {0}")]
    Encoding(String),

    /// Synthesizer driven through a transition its state machine forbids
    #[error("illegal synthesis transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// State the synthesizer was in
        from: SynthesisState,
        /// State it was asked to enter
        to: SynthesisState,
    },
}

impl SynthesisError {
    /// Violations carried by a failed stage (empty for other variants)
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Failed { violations, .. } => violations,
            _ => &[],
        }
    }

    /// Declaration errors carried by this error (empty for other variants)
    #[must_use]
    pub fn declaration_errors(&self) -> &[DeclarationError] {
        match self {
            Self::Declaration(errors) => errors,
            _ => &[],
        }
    }

    /// `true` if this error came from builder calls
    #[inline]
    #[must_use]
    pub fn is_declaration(&self) -> bool {
        matches!(self, Self::Declaration(_))
    }

    /// `true` if any violation is a dependency cycle
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.violations()
            .iter()
            .any(|v| matches!(v, Violation::CyclicDependency { .. }))
    }
}

impl From<DeclarationError> for SynthesisError {
    fn from(value: DeclarationError) -> Self {
        Self::Declaration(vec![value])
    }
}

impl From<Vec<DeclarationError>> for SynthesisError {
    fn from(value: Vec<DeclarationError>) -> Self {
        Self::Declaration(value)
    }
}

fn summarize<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
