//! The fixed resource catalog
//!
//! Every [`ResourceKind`] carries a static [`KindSchema`]: the properties a
//! declaration must supply, the attributes the kind produces once realized,
//! and the attribute access policies use to scope grants to an instance.

use crate::error::DeclarationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource kinds supported by the synthesizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Secret value store entry
    Secret,
    /// Object storage bucket
    ObjectStore,
    /// Assumable execution role
    AccessRole,
    /// Serverless compute function
    ComputeFunction,
    /// Public REST entry point
    PublicApi,
    /// Content-delivery distribution
    EdgeDistribution,
    /// Time-based trigger
    ScheduleRule,
}

/// Per-kind declaration and output schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSchema {
    /// Properties every declaration of this kind must carry
    pub required: &'static [&'static str],
    /// Attributes the kind produces at apply time
    pub outputs: &'static [&'static str],
    /// Output attribute that identifies a single instance in policy scopes
    pub scope_attribute: &'static str,
}

const SECRET: KindSchema = KindSchema {
    required: &["name"],
    outputs: &["handle", "name"],
    scope_attribute: "handle",
};

const OBJECT_STORE: KindSchema = KindSchema {
    required: &["visibility"],
    outputs: &["identifier", "endpoint", "name"],
    scope_attribute: "identifier",
};

const ACCESS_ROLE: KindSchema = KindSchema {
    required: &["trustedPrincipal"],
    outputs: &["handle", "name"],
    scope_attribute: "handle",
};

const COMPUTE_FUNCTION: KindSchema = KindSchema {
    required: &["runtime", "handler", "role"],
    outputs: &["handle", "name"],
    scope_attribute: "handle",
};

const PUBLIC_API: KindSchema = KindSchema {
    required: &["name"],
    outputs: &["handle", "url"],
    scope_attribute: "handle",
};

const EDGE_DISTRIBUTION: KindSchema = KindSchema {
    required: &["defaultRootObject"],
    outputs: &["handle", "hostname"],
    scope_attribute: "handle",
};

const SCHEDULE_RULE: KindSchema = KindSchema {
    required: &["cadenceSeconds", "target"],
    outputs: &["handle"],
    scope_attribute: "handle",
};

impl ResourceKind {
    /// Every kind, in catalog order
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Secret,
        ResourceKind::ObjectStore,
        ResourceKind::AccessRole,
        ResourceKind::ComputeFunction,
        ResourceKind::PublicApi,
        ResourceKind::EdgeDistribution,
        ResourceKind::ScheduleRule,
    ];

    /// Static schema for this kind
    #[must_use]
    pub fn schema(self) -> &'static KindSchema {
        match self {
            ResourceKind::Secret => &SECRET,
            ResourceKind::ObjectStore => &OBJECT_STORE,
            ResourceKind::AccessRole => &ACCESS_ROLE,
            ResourceKind::ComputeFunction => &COMPUTE_FUNCTION,
            ResourceKind::PublicApi => &PUBLIC_API,
            ResourceKind::EdgeDistribution => &EDGE_DISTRIBUTION,
            ResourceKind::ScheduleRule => &SCHEDULE_RULE,
        }
    }

    /// Canonical name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Secret => "Secret",
            ResourceKind::ObjectStore => "ObjectStore",
            ResourceKind::AccessRole => "AccessRole",
            ResourceKind::ComputeFunction => "ComputeFunction",
            ResourceKind::PublicApi => "PublicApi",
            ResourceKind::EdgeDistribution => "EdgeDistribution",
            ResourceKind::ScheduleRule => "ScheduleRule",
        }
    }

    /// Whether `attribute` is in this kind's output schema
    #[inline]
    #[must_use]
    pub fn produces(self, attribute: &str) -> bool {
        self.schema().outputs.contains(&attribute)
    }

    /// Whether nodes of this kind carry an execution identity that can be
    /// the subject of access grants
    #[inline]
    #[must_use]
    pub const fn is_principal(self) -> bool {
        matches!(
            self,
            ResourceKind::AccessRole
                | ResourceKind::ComputeFunction
                | ResourceKind::PublicApi
                | ResourceKind::ScheduleRule
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = DeclarationError;

    /// Accepts the canonical name case-insensitively, with or without
    /// `_`/`-` separators (`ObjectStore`, `object_store`, `object-store`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_lowercase() == folded)
            .ok_or_else(|| DeclarationError::UnknownKind {
                kind: s.to_string(),
            })
    }
}
