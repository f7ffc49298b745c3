//! Stackweave core
//!
//! Deterministic synthesis of a resource dependency graph into an ordered,
//! resolved deployment artifact:
//! 1. **Declaration**: build a [`Graph`] through explicit builder calls
//!    (nodes, schedules, routes, origins, policies, outputs)
//! 2. **Synthesis**: validate, order and resolve it into an [`Artifact`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use stackweave_core::prelude::*;
//!
//! let mut graph = Graph::new();
//! graph.create_node(
//!     NodeDeclaration::new(ResourceKind::ObjectStore, "data").with_property("visibility", "private"),
//! )?;
//! graph.create_node(
//!     NodeDeclaration::new(ResourceKind::AccessRole, "role")
//!         .with_property("trustedPrincipal", "lambda.amazonaws.com"),
//! )?;
//! AccessPolicyBuilder::attach(&mut graph, &"role".into(), &[Grant::on("data", ["read"])], PolicyOrigin::Declared)?;
//!
//! let artifact = synthesize(&graph)?;
//! ```

pub mod document;
pub mod edge;
pub mod error;
pub mod graph;
pub mod kind;
pub mod node;
pub mod policy;
pub mod reference;
pub mod schedule;
pub mod synth;
pub mod types;

// Re-exports
pub use error::*;
pub use graph::Graph;
pub use synth::{synthesize, Artifact};
pub use types::*;

/// Commonly used types
pub mod prelude {
    pub use crate::document::GraphDocument;
    pub use crate::edge::{EdgeRouter, HttpMethod, OriginKind};
    pub use crate::error::{DeclarationError, SynthesisError, Violation};
    pub use crate::graph::{EdgeReason, Graph, Output};
    pub use crate::kind::ResourceKind;
    pub use crate::node::NodeDeclaration;
    pub use crate::policy::{AccessPolicyBuilder, Grant, PolicyOrigin};
    pub use crate::schedule::ScheduleBinder;
    pub use crate::synth::{synthesize, Artifact, Synthesizer};
    pub use crate::types::{NodeId, Reference, Value};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
