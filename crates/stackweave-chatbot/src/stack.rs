//! The news chatbot topology
//!
//! Two variants share the query side (role, chatbot function, api, website
//! bucket, distribution):
//! - [`StackVariant::Ingestion`] adds the ingestion secret, the versioned
//!   data bucket, the fetcher role and function, and the schedule firing it
//! - [`StackVariant::Standalone`] reads a fixed external data bucket instead

use crate::config::{ConfigError, ConfigOverlay, EnvSource, StackConfig};
use crate::contracts::{Contract, CONTRACT_PROPERTY};
use serde::{Deserialize, Serialize};
use stackweave_core::prelude::*;
use stackweave_core::schedule::TARGET_PROPERTY;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Secret holding the news-source API key
pub const INGESTION_SECRET: &str = "ingestion-secret";
/// Secret holding the Perplexity API key
pub const PERPLEXITY_SECRET: &str = "perplexity-secret";
/// Static frontend bucket
pub const WEBSITE_BUCKET: &str = "website-bucket";
/// Versioned news data bucket
pub const DATA_BUCKET: &str = "data-bucket";
/// Execution role of the chatbot
pub const CHATBOT_ROLE: &str = "chatbot-role";
/// Execution role of the fetcher
pub const FETCHER_ROLE: &str = "fetcher-role";
/// Query function
pub const CHATBOT_FUNCTION: &str = "chatbot";
/// Ingestion function
pub const FETCHER_FUNCTION: &str = "fetcher";
/// Schedule firing the fetcher
pub const FETCH_SCHEDULE: &str = "fetch-schedule";
/// Public api
pub const CHATBOT_API: &str = "chatbot-api";
/// Distribution over the website bucket
pub const WEBSITE_DISTRIBUTION: &str = "website-distribution";

/// Data bucket read by the standalone variant
pub const STANDALONE_DATA_BUCKET_ARN: &str = "arn:aws:s3:::seoul-economic-news-data-2025";

const LAMBDA_PRINCIPAL: &str = "lambda.amazonaws.com";
const BASIC_EXECUTION_POLICY: &str = "service-role/AWSLambdaBasicExecutionRole";
const PYTHON_RUNTIME: &str = "python3.11";
const LOG_RETENTION_DAYS: u32 = 7;
const CORS_HEADERS: [&str; 5] = [
    "Content-Type",
    "X-Amz-Date",
    "Authorization",
    "X-Api-Key",
    "X-Amz-Security-Token",
];

/// Which topology to declare
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackVariant {
    /// Chatbot plus scheduled ingestion
    #[default]
    Ingestion,
    /// Chatbot over an existing data bucket
    Standalone,
}

impl fmt::Display for StackVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ingestion => "ingestion",
            Self::Standalone => "standalone",
        })
    }
}

impl FromStr for StackVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ingestion" => Ok(Self::Ingestion),
            "standalone" => Ok(Self::Standalone),
            other => Err(format!("unknown stack variant `{other}` (expected ingestion or standalone)")),
        }
    }
}

/// Failures of the chatbot stack pipeline
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// Environment unusable; raised before any node exists
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Declaration or synthesis failed
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// Functions wired to triggers their contracts do not serve
    #[error("{} contract mismatch(es): {}", .0.len(), join_mismatches(.0))]
    ContractMismatch(Vec<ContractMismatch>),
}

/// A function wired to a trigger its contract does not serve
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{node}` is triggered as {expected} but declares contract {found:?}")]
pub struct ContractMismatch {
    /// Miswired function
    pub node: NodeId,
    /// Contract its trigger needs
    pub expected: Contract,
    /// Contract it declares, if any
    pub found: Option<String>,
}

fn join_mismatches(mismatches: &[ContractMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<DeclarationError> for StackError {
    fn from(value: DeclarationError) -> Self {
        Self::Synthesis(value.into())
    }
}

/// Declare the chatbot topology
///
/// # Errors
/// Any rejected builder call, as `Synthesis(Declaration(..))`.
pub fn declare_stack(config: &StackConfig, variant: StackVariant) -> Result<Graph, StackError> {
    let mut graph = Graph::new();

    // the key is seeded at deploy time; only the secret's handle is emitted
    graph.create_node(
        NodeDeclaration::new(ResourceKind::Secret, PERPLEXITY_SECRET)
            .with_property("name", "PerplexityApiKeySecret")
            .with_property("description", "Perplexity API key used by the chatbot")
            .with_property("seedFromEnvironment", crate::config::PERPLEXITY_API_KEY),
    )?;

    if variant == StackVariant::Ingestion {
        let mut secret = NodeDeclaration::new(ResourceKind::Secret, INGESTION_SECRET)
            .with_property("name", "BigKindsApiKeySecret")
            .with_property("description", "News source API key for automated data collection");
        if config.seed_ingestion_secret {
            secret = secret.with_property("seedFromEnvironment", crate::config::INGESTION_API_KEY);
        }
        graph.create_node(secret)?;
    }

    let website_bucket_name = match (variant, &config.account) {
        (StackVariant::Ingestion, Some(account)) => Value::from(format!("news-chatbot-website-v2-{account}")),
        (StackVariant::Standalone, Some(account)) => {
            Value::from(format!("news-chatbot-frontend-{account}-{}", config.region))
        }
        (_, None) => Value::Null,
    };
    graph.create_node(
        NodeDeclaration::new(ResourceKind::ObjectStore, WEBSITE_BUCKET)
            .with_property("visibility", "public-read")
            .with_property("bucketName", website_bucket_name)
            .with_property("websiteIndexDocument", "index.html")
            .with_property("removalPolicy", "destroy")
            .with_property("autoDeleteObjects", true),
    )?;

    if variant == StackVariant::Ingestion {
        let data_bucket_name = config
            .account
            .as_ref()
            .map_or(Value::Null, |account| Value::from(format!("seoul-economic-news-data-2025-{account}")));
        graph.create_node(
            NodeDeclaration::new(ResourceKind::ObjectStore, DATA_BUCKET)
                .with_property("visibility", "private")
                .with_property("bucketName", data_bucket_name)
                .with_property("versioned", true)
                .with_property("removalPolicy", "retain"),
        )?;
    }

    declare_chatbot_role(&mut graph, config, variant)?;
    if variant == StackVariant::Ingestion {
        declare_fetcher_role(&mut graph)?;
    }

    graph.create_node(
        lambda(CHATBOT_FUNCTION, CHATBOT_ROLE, Contract::Query)
            .with_property("functionName", "news-chatbot-handler")
            .with_property("description", "Answers questions from the news knowledge base")
            .with_property("code", "backend/news_chatbot")
            .with_property("timeoutSeconds", 300_u32)
            .with_property("memoryMb", 1024_u32)
            .with_property(
                "environment",
                Value::map([
                    ("PERPLEXITY_API_KEY_SECRET_ARN", Value::reference(PERPLEXITY_SECRET, "handle")),
                    ("KNOWLEDGE_BASE_ID", Value::from(config.knowledge_base_id.as_str())),
                    ("MODEL_ID", Value::from(config.model_id.as_str())),
                    ("LOG_LEVEL", Value::from("INFO")),
                ]),
            ),
    )?;

    if variant == StackVariant::Ingestion {
        graph.create_node(
            lambda(FETCHER_FUNCTION, FETCHER_ROLE, Contract::Ingestion)
                .with_property("description", "Collects news articles and syncs the knowledge base")
                .with_property("code", "backend/news_fetcher")
                .with_property("timeoutSeconds", 900_u32)
                .with_property("memoryMb", 2048_u32)
                .with_property(
                    "environment",
                    Value::map([
                        ("BIGKINDS_API_SECRET_ARN", Value::reference(INGESTION_SECRET, "handle")),
                        ("DATA_BUCKET_NAME", Value::reference(DATA_BUCKET, "name")),
                        ("KNOWLEDGE_BASE_ID", Value::from(config.knowledge_base_id.as_str())),
                        ("DATA_SOURCE_ID", Value::from(config.data_source_id.as_str())),
                    ]),
                ),
        )?;

        ScheduleBinder::bind(
            &mut graph,
            FETCH_SCHEDULE,
            Duration::from_secs(config.ingestion_cadence_minutes.saturating_mul(60)),
            FETCHER_FUNCTION,
        )?;
    }

    graph.create_node(
        NodeDeclaration::new(ResourceKind::PublicApi, CHATBOT_API)
            .with_property("name", "Seoul Economic News Chatbot API")
            .with_property("description", "API for the news chatbot")
            .with_property("stageName", "prod")
            .with_property(
                "logging",
                Value::map([
                    ("level", Value::from("INFO")),
                    ("dataTrace", Value::from(true)),
                    ("metrics", Value::from(true)),
                    ("accessLogFormat", Value::from("json-standard-fields")),
                    ("accessLogRetentionDays", Value::from(LOG_RETENTION_DAYS)),
                ]),
            )
            .with_property(
                "suppressedChecks",
                Value::list([
                    suppression("AwsSolutions-APIG2", "Request validation is handled by the chatbot function"),
                    suppression("AwsSolutions-COG4", "Authorization is not part of this api"),
                ]),
            )
            .with_property(
                "cors",
                Value::map([
                    ("allowOrigins", Value::list(["*"])),
                    ("allowMethods", Value::list(["*"])),
                    ("allowHeaders", Value::list(CORS_HEADERS)),
                ]),
            ),
    )?;
    EdgeRouter::add_route(&mut graph, CHATBOT_API, "/chat", HttpMethod::Post, CHATBOT_FUNCTION)?;
    EdgeRouter::add_route(&mut graph, CHATBOT_API, "/health", HttpMethod::Get, CHATBOT_FUNCTION)?;

    graph.create_node(
        NodeDeclaration::new(ResourceKind::EdgeDistribution, WEBSITE_DISTRIBUTION)
            .with_property("defaultRootObject", "index.html")
            .with_property("viewerProtocolPolicy", "redirect-to-https")
            .with_property("cachePolicy", "caching-disabled")
            .with_property(
                "errorResponses",
                Value::list([Value::map([
                    ("errorCode", Value::from(404_u32)),
                    ("responseCode", Value::from(200_u32)),
                    ("responsePagePath", Value::from("/index.html")),
                ])]),
            ),
    )?;
    EdgeRouter::attach_edge(&mut graph, WEBSITE_DISTRIBUTION, OriginKind::StaticStorage, WEBSITE_BUCKET)?;

    declare_outputs(&mut graph, config, variant)?;

    for (key, value) in &config.tags {
        graph.add_tag(key.clone(), value.clone());
    }

    tracing::info!(%variant, nodes = graph.len(), "chatbot stack declared");
    Ok(graph)
}

fn lambda(id: &str, role: &str, contract: Contract) -> NodeDeclaration {
    NodeDeclaration::new(ResourceKind::ComputeFunction, id)
        .with_property("runtime", PYTHON_RUNTIME)
        .with_property("handler", "index.lambda_handler")
        .with_property("role", Value::reference(role, "handle"))
        .with_property("logRetentionDays", LOG_RETENTION_DAYS)
        .with_property(CONTRACT_PROPERTY, contract.as_str())
}

fn suppression(id: &str, reason: &str) -> Value {
    Value::map([("id", Value::from(id)), ("reason", Value::from(reason))])
}

/// Knowledge base the chatbot retrieves from; any account when unpinned
fn knowledge_base_arn(config: &StackConfig) -> String {
    format!(
        "arn:aws:bedrock:{}:{}:knowledge-base/{}",
        config.region,
        config.account.as_deref().unwrap_or("*"),
        config.knowledge_base_id
    )
}

fn execution_role(id: &str, description: &str) -> NodeDeclaration {
    NodeDeclaration::new(ResourceKind::AccessRole, id)
        .with_property("trustedPrincipal", LAMBDA_PRINCIPAL)
        .with_property("description", description)
        .with_property("managedPolicies", Value::list([BASIC_EXECUTION_POLICY]))
}

fn declare_chatbot_role(graph: &mut Graph, config: &StackConfig, variant: StackVariant) -> Result<(), DeclarationError> {
    graph.create_node(
        execution_role(CHATBOT_ROLE, "Execution role of the news chatbot").with_property(
            "suppressedChecks",
            Value::list([suppression(
                "AwsSolutions-IAM5",
                "Foundation models are granted as a class and bucket objects by prefix",
            )]),
        ),
    )?;

    let mut grants = vec![
        Grant::unscoped(
            ["bedrock:InvokeModel"],
            "foundation models are addressed as a class, not as stack resources",
        ),
        Grant::foreign(
            knowledge_base_arn(config),
            ["bedrock:Retrieve", "bedrock:RetrieveAndGenerate"],
        ),
        Grant::on(PERPLEXITY_SECRET, ["read"]),
    ];
    if variant == StackVariant::Standalone {
        grants.push(Grant::external(
            ResourceKind::ObjectStore,
            STANDALONE_DATA_BUCKET_ARN,
            ["s3:GetObject", "s3:GetObjectVersion"],
        ));
    }
    AccessPolicyBuilder::attach(graph, &CHATBOT_ROLE.into(), &grants, PolicyOrigin::Declared)
}

fn declare_fetcher_role(graph: &mut Graph) -> Result<(), DeclarationError> {
    graph.create_node(execution_role(FETCHER_ROLE, "Execution role of the news fetcher"))?;

    AccessPolicyBuilder::attach(
        graph,
        &FETCHER_ROLE.into(),
        &[
            Grant::on(
                DATA_BUCKET,
                ["s3:PutObject", "s3:GetObject", "s3:DeleteObject", "s3:ListBucket"],
            ),
            Grant::on(INGESTION_SECRET, ["read"]),
            Grant::unscoped(
                ["bedrock:StartIngestionJob", "bedrock:GetIngestionJob", "bedrock:ListIngestionJobs"],
                "ingestion jobs are created at run time and cannot be named at synthesis",
            ),
        ],
        PolicyOrigin::Declared,
    )
}

fn declare_outputs(graph: &mut Graph, config: &StackConfig, variant: StackVariant) -> Result<(), DeclarationError> {
    graph.add_output(
        "ApiUrl",
        Output::new(Value::reference(CHATBOT_API, "url"))
            .with_description("News chatbot API URL")
            .with_export_name("NewsChatbotApiUrl"),
    )?;
    graph.add_output(
        "WebsiteUrl",
        Output::new(Value::join([
            Value::from("https://"),
            Value::reference(WEBSITE_DISTRIBUTION, "hostname"),
        ]))
        .with_description("News chatbot website URL")
        .with_export_name("NewsChatbotWebsiteUrl"),
    )?;
    graph.add_output(
        "KnowledgeBaseId",
        Output::new(config.knowledge_base_id.as_str())
            .with_description("Knowledge base queried by the chatbot")
            .with_export_name("NewsChatbotKnowledgeBaseId"),
    )?;
    graph.add_output(
        "ChatbotFunctionName",
        Output::new(Value::reference(CHATBOT_FUNCTION, "name"))
            .with_description("Name of the chatbot function")
            .with_export_name("NewsChatbotFunctionName"),
    )?;
    graph.add_output(
        "WebsiteBucket",
        Output::new(Value::reference(WEBSITE_BUCKET, "name"))
            .with_description("Bucket serving the frontend")
            .with_export_name("NewsChatbotWebsiteBucket"),
    )?;
    if variant == StackVariant::Ingestion {
        graph.add_output(
            "IngestionSecretHandle",
            Output::new(Value::reference(INGESTION_SECRET, "handle")).with_description("News source API key secret"),
        )?;
    }
    Ok(())
}

/// Check that schedules fire ingestion functions and routes reach query
/// functions
///
/// # Errors
/// `ContractMismatch` listing every miswired function, once per trigger
/// contract.
pub fn check_contracts(graph: &Graph) -> Result<(), StackError> {
    let schedule_targets = graph
        .nodes()
        .filter(|node| node.kind() == ResourceKind::ScheduleRule)
        .filter_map(|node| node.property(TARGET_PROPERTY).and_then(Value::as_reference))
        .map(|reference| (reference.node.clone(), Contract::Ingestion));
    let route_targets = graph
        .routes()
        .iter()
        .map(|route| (route.target.clone(), Contract::Query));

    let mut seen = HashSet::new();
    let mut mismatches = Vec::new();
    for (node, expected) in schedule_targets.chain(route_targets) {
        let found = graph
            .node(&node)
            .and_then(|n| n.property(CONTRACT_PROPERTY))
            .and_then(Value::as_str);
        if found != Some(expected.as_str()) && seen.insert((node.clone(), expected)) {
            mismatches.push(ContractMismatch {
                node,
                expected,
                found: found.map(ToString::to_string),
            });
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(StackError::ContractMismatch(mismatches))
    }
}

/// Load config, declare, check contracts and synthesize
///
/// Configuration is read first, so a missing API key fails before any
/// node is declared.
///
/// # Errors
/// The first failing step.
pub fn synthesize_stack(
    env: &impl EnvSource,
    overlay: Option<&ConfigOverlay>,
    variant: StackVariant,
) -> Result<Artifact, StackError> {
    let config = StackConfig::load(env, overlay)?;
    synthesize_with(&config, variant)
}

/// Declare, check contracts and synthesize from a loaded config
///
/// # Errors
/// The first failing step.
pub fn synthesize_with(config: &StackConfig, variant: StackVariant) -> Result<Artifact, StackError> {
    let graph = declare_stack(config, variant)?;
    check_contracts(&graph)?;
    Ok(synthesize(&graph)?)
}
