//! Synthesis lifecycle
//!
//! `Empty -> Declaring -> Validating -> Ordering -> Resolving -> Emitted`,
//! with `Failed` reachable from the three checking stages. `Emitted` and
//! `Failed` are terminal.

use crate::error::SynthesisError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one synthesis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SynthesisState {
    /// Nothing declared yet
    Empty,
    /// Builder calls in progress
    Declaring,
    /// Collecting invariant violations
    Validating,
    /// Computing the apply order
    Ordering,
    /// Substituting placeholders
    Resolving,
    /// Artifact produced
    Emitted,
    /// Stopped with violations
    Failed,
}

/// Stage a failed run stopped in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Invariant checks
    Validating,
    /// Topological ordering
    Ordering,
    /// Reference resolution
    Resolving,
}

impl Stage {
    /// Lifecycle state matching this stage
    #[must_use]
    pub const fn state(self) -> SynthesisState {
        match self {
            Self::Validating => SynthesisState::Validating,
            Self::Ordering => SynthesisState::Ordering,
            Self::Resolving => SynthesisState::Resolving,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validating => "validation",
            Self::Ordering => "ordering",
            Self::Resolving => "resolution",
        })
    }
}

impl fmt::Display for SynthesisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// States reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: SynthesisState) -> Vec<SynthesisState> {
    use SynthesisState::*;
    match from {
        Empty => vec![Declaring],
        Declaring => vec![Validating],
        Validating => vec![Ordering, Failed],
        Ordering => vec![Resolving, Failed],
        Resolving => vec![Emitted, Failed],
        Emitted | Failed => vec![],
    }
}

/// Check a single transition against the table
///
/// # Errors
/// `IllegalTransition` if `to` is not reachable from `from`.
pub fn validate_transition(from: SynthesisState, to: SynthesisState) -> Result<(), SynthesisError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SynthesisError::IllegalTransition { from, to })
    }
}
