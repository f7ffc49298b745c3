//! Action catalog
//!
//! Each action is listed with the scope it takes on its resource kind.
//! Unscoped actions are listed separately with the reason no narrower
//! identifier exists; only they may be granted on `"*"`.

use crate::kind::ResourceKind;

/// Minimal resource scope of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionScope {
    /// The instance itself: `{scope attribute}`
    Instance,
    /// Everything beneath the instance: `{scope attribute}/*`
    Child,
}

struct ScopedAction {
    kind: ResourceKind,
    action: &'static str,
    scope: ActionScope,
}

const fn scoped(kind: ResourceKind, action: &'static str, scope: ActionScope) -> ScopedAction {
    ScopedAction {
        kind,
        action,
        scope,
    }
}

static SCOPED_ACTIONS: &[ScopedAction] = &[
    scoped(ResourceKind::ObjectStore, "s3:ListBucket", ActionScope::Instance),
    scoped(ResourceKind::ObjectStore, "s3:GetBucketLocation", ActionScope::Instance),
    scoped(ResourceKind::ObjectStore, "s3:GetObject", ActionScope::Child),
    scoped(ResourceKind::ObjectStore, "s3:GetObjectVersion", ActionScope::Child),
    scoped(ResourceKind::ObjectStore, "s3:PutObject", ActionScope::Child),
    scoped(ResourceKind::ObjectStore, "s3:DeleteObject", ActionScope::Child),
    scoped(ResourceKind::Secret, "secretsmanager:GetSecretValue", ActionScope::Instance),
    scoped(ResourceKind::Secret, "secretsmanager:DescribeSecret", ActionScope::Instance),
    scoped(ResourceKind::ComputeFunction, "lambda:InvokeFunction", ActionScope::Instance),
    scoped(ResourceKind::ComputeFunction, "lambda:GetFunction", ActionScope::Instance),
    scoped(ResourceKind::AccessRole, "iam:PassRole", ActionScope::Instance),
    scoped(ResourceKind::PublicApi, "execute-api:Invoke", ActionScope::Child),
    scoped(ResourceKind::EdgeDistribution, "cloudfront:CreateInvalidation", ActionScope::Instance),
    scoped(ResourceKind::EdgeDistribution, "cloudfront:GetDistribution", ActionScope::Instance),
    scoped(ResourceKind::ScheduleRule, "events:DescribeRule", ActionScope::Instance),
];

static UNSCOPED_ACTIONS: &[(&str, &str)] = &[
    (
        "bedrock:InvokeModel",
        "foundation models are addressed as a class, not as stack resources",
    ),
    (
        "bedrock:InvokeModelWithResponseStream",
        "foundation models are addressed as a class, not as stack resources",
    ),
    (
        "bedrock:StartIngestionJob",
        "ingestion jobs are created at run time and have no identifier at synthesis",
    ),
    (
        "bedrock:GetIngestionJob",
        "ingestion jobs are created at run time and have no identifier at synthesis",
    ),
    (
        "bedrock:ListIngestionJobs",
        "listing is a namespace-wide operation",
    ),
    (
        "logs:CreateLogGroup",
        "log groups are created lazily by the runtime",
    ),
];

/// Actions scoped to resources that never appear as graph nodes, with the
/// resource type their identifier must name
static FOREIGN_ACTIONS: &[(&str, &str)] = &[
    ("bedrock:Retrieve", "knowledge-base"),
    ("bedrock:RetrieveAndGenerate", "knowledge-base"),
];

static ALIASES: &[(ResourceKind, &str, &[&str])] = &[
    (
        ResourceKind::ObjectStore,
        "read",
        &["s3:GetObject", "s3:GetObjectVersion", "s3:ListBucket"],
    ),
    (ResourceKind::ObjectStore, "write", &["s3:PutObject"]),
    (ResourceKind::ObjectStore, "delete", &["s3:DeleteObject"]),
    (ResourceKind::ObjectStore, "list", &["s3:ListBucket"]),
    (
        ResourceKind::Secret,
        "read",
        &["secretsmanager:GetSecretValue"],
    ),
    (
        ResourceKind::Secret,
        "describe",
        &["secretsmanager:DescribeSecret"],
    ),
    (
        ResourceKind::ComputeFunction,
        "invoke",
        &["lambda:InvokeFunction"],
    ),
    (ResourceKind::AccessRole, "pass", &["iam:PassRole"]),
    (ResourceKind::PublicApi, "invoke", &["execute-api:Invoke"]),
    (
        ResourceKind::EdgeDistribution,
        "invalidate",
        &["cloudfront:CreateInvalidation"],
    ),
    (
        ResourceKind::ScheduleRule,
        "describe",
        &["events:DescribeRule"],
    ),
];

/// Scope of `action` on `kind`, if the action applies to that kind
#[must_use]
pub fn scope_for(kind: ResourceKind, action: &str) -> Option<ActionScope> {
    SCOPED_ACTIONS
        .iter()
        .find(|entry| entry.kind == kind && entry.action == action)
        .map(|entry| entry.scope)
}

/// Documented reason an action has no per-resource scope
#[must_use]
pub fn unscoped_reason(action: &str) -> Option<&'static str> {
    UNSCOPED_ACTIONS
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, reason)| *reason)
}

/// Resource type an out-of-graph identifier must name to scope `action`
#[must_use]
pub fn foreign_resource_type(action: &str) -> Option<&'static str> {
    FOREIGN_ACTIONS
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, resource_type)| *resource_type)
}

/// Expand an access alias (`read`, `write`, …) for `kind`
///
/// Concrete action names are returned unchanged.
#[must_use]
pub fn expand(kind: ResourceKind, action: &str) -> Vec<String> {
    ALIASES
        .iter()
        .find(|(alias_kind, alias, _)| *alias_kind == kind && *alias == action)
        .map_or_else(
            || vec![action.to_string()],
            |(_, _, actions)| actions.iter().map(|a| (*a).to_string()).collect(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_store_scopes() {
        assert_eq!(
            scope_for(ResourceKind::ObjectStore, "s3:ListBucket"),
            Some(ActionScope::Instance)
        );
        assert_eq!(
            scope_for(ResourceKind::ObjectStore, "s3:GetObject"),
            Some(ActionScope::Child)
        );
        assert_eq!(scope_for(ResourceKind::Secret, "s3:GetObject"), None);
    }

    #[test]
    fn test_retrieval_is_scoped_to_knowledge_bases() {
        assert_eq!(foreign_resource_type("bedrock:Retrieve"), Some("knowledge-base"));
        assert_eq!(unscoped_reason("bedrock:Retrieve"), None);
        assert_eq!(foreign_resource_type("bedrock:InvokeModel"), None);
    }

    #[test]
    fn test_alias_expansion() {
        assert_eq!(
            expand(ResourceKind::ObjectStore, "read"),
            vec!["s3:GetObject", "s3:GetObjectVersion", "s3:ListBucket"]
        );
        assert_eq!(
            expand(ResourceKind::ObjectStore, "s3:PutObject"),
            vec!["s3:PutObject"]
        );
    }

    #[test]
    fn test_every_alias_resolves_to_scoped_actions() {
        for (kind, alias, _) in ALIASES {
            for action in expand(*kind, alias) {
                assert!(scope_for(*kind, &action).is_some(), "{kind} {alias} -> {action}");
            }
        }
    }

    #[test]
    fn test_unscoped_actions_are_documented() {
        assert!(unscoped_reason("bedrock:InvokeModel").is_some());
        assert!(unscoped_reason("s3:GetObject").is_none());
    }
}
