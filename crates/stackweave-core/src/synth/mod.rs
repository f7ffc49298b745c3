//! Graph synthesis
//!
//! [`Synthesizer::run`] drives a complete graph through validation,
//! ordering and resolution and emits an [`Artifact`]. The run is pure: the
//! same graph always yields the same artifact, digest included.
//!
//! ```rust,ignore
//! let artifact = synthesize(&graph)?;
//! assert!(artifact.position("data") < artifact.position("fetcher"));
//! ```

pub mod artifact;
pub mod order;
pub mod state;
pub mod validator;

pub use artifact::{Artifact, ResolvedNode, ResolvedOutput, ResolvedRoute};
pub use order::stable_topological_order;
pub use state::{Stage, SynthesisState};
pub use validator::GraphValidator;

use crate::error::{SynthesisError, Violation};
use crate::graph::Graph;
use crate::reference::ReferenceResolver;

/// Runs the synthesis state machine over a graph
#[derive(Debug, Clone)]
pub struct Synthesizer {
    state: SynthesisState,
    history: Vec<SynthesisState>,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer {
    /// Fresh synthesizer in `Empty`
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SynthesisState::Empty,
            history: vec![SynthesisState::Empty],
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> SynthesisState {
        self.state
    }

    /// Every state visited, in order
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[SynthesisState] {
        &self.history
    }

    fn transition(&mut self, to: SynthesisState) -> Result<(), SynthesisError> {
        state::validate_transition(self.state, to)?;
        tracing::debug!(from = %self.state, to = %to, "synthesis transition");
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    fn fail(&mut self, stage: Stage, violations: Vec<Violation>) -> SynthesisError {
        for violation in &violations {
            tracing::debug!(%stage, %violation, "violation");
        }
        self.abort(SynthesisError::Failed { stage, violations })
    }

    /// Move to `Failed` and hand back `err`, or the transition error if the
    /// run can no longer fail
    fn abort(&mut self, err: SynthesisError) -> SynthesisError {
        match self.transition(SynthesisState::Failed) {
            Ok(()) => err,
            Err(illegal) => illegal,
        }
    }

    /// Synthesize `graph`
    ///
    /// A synthesizer runs once; a second call fails with
    /// `IllegalTransition`.
    ///
    /// # Errors
    /// - `Failed { stage, violations }` with every violation of the first
    ///   stage that found any
    /// - `IllegalTransition` when reused
    pub fn run(&mut self, graph: &Graph) -> Result<Artifact, SynthesisError> {
        self.transition(SynthesisState::Declaring)?;
        self.transition(SynthesisState::Validating)?;

        let violations = GraphValidator::new(graph).validate();
        if !violations.is_empty() {
            return Err(self.fail(Stage::Validating, violations));
        }

        self.transition(SynthesisState::Ordering)?;
        let order = match stable_topological_order(graph) {
            Ok(order) => order,
            Err(violations) => return Err(self.fail(Stage::Ordering, violations)),
        };

        self.transition(SynthesisState::Resolving)?;
        let resolved = match ReferenceResolver::new(graph).resolve_in(&order) {
            Ok(resolved) => resolved,
            Err(violations) => return Err(self.fail(Stage::Resolving, violations)),
        };

        let artifact = match Artifact::assemble(graph, &order, resolved) {
            Ok(artifact) => artifact,
            Err(err) => return Err(self.abort(err)),
        };
        self.transition(SynthesisState::Emitted)?;

        for grant in artifact.broad_grant_report.entries() {
            tracing::warn!(
                principal = %grant.principal,
                actions = ?grant.actions,
                justification = %grant.justification,
                "broad grant on \"*\""
            );
        }
        tracing::info!(
            nodes = artifact.ordered_nodes.len(),
            outputs = artifact.outputs.len(),
            policies = artifact.policies.len(),
            broad_grants = artifact.broad_grant_report.len(),
            digest = %artifact.digest,
            "artifact emitted"
        );
        Ok(artifact)
    }
}

/// One-shot synthesis
///
/// # Errors
/// See [`Synthesizer::run`].
pub fn synthesize(graph: &Graph) -> Result<Artifact, SynthesisError> {
    Synthesizer::new().run(graph)
}
